//! Integration test for the writer pool over the hourly layout.

use boom::layout::list_boom_files;
use boom::{
    BoomWriter, CombinedSplit, HourlyLayout, LogicalRecordReader, PoolConfig, SchemaRegistry,
    WriterConfig, WriterPool,
};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

const CREATED_MS: i64 = 1_357_002_000_000;

#[test]
fn test_pool_writes_one_file_per_bucket() {
    let dir = TempDir::new().unwrap();
    let layout = HourlyLayout::new(dir.path());
    let registry = SchemaRegistry::new();

    let config = PoolConfig::default()
        .with_buckets(3)
        .with_channel_capacity(16)
        .with_writer(WriterConfig::default().with_max_lines_per_block(10));
    let pool = WriterPool::new(config, |bucket, writer_config| {
        let path = layout.file_path("ingest", bucket, CREATED_MS)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        BoomWriter::create(&path, &registry, writer_config.clone())
    })
    .unwrap();

    let sources = ["web-1", "web-2", "db-1", "db-2", "cache"];
    for i in 0..200i64 {
        let source = sources[(i % 5) as usize];
        let message = format!("{} {}", source, i);
        pool.append(source, CREATED_MS + i * 37, &message).unwrap();
    }
    let stats = pool.shutdown().unwrap();
    assert_eq!(stats.lines_written, 200);
    assert_eq!(stats.lines_lost, 0);

    let files = list_boom_files(&layout.hour_dir(CREATED_MS).unwrap()).unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(
        files.iter().map(|f| f.bucket).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
    let split = CombinedSplit::whole_files(&paths).unwrap();
    let mut per_source: HashMap<String, Vec<i64>> = HashMap::new();
    let mut total = 0;
    for line in LogicalRecordReader::new(split, &registry) {
        let line = line.unwrap();
        let (source, index) = line.message.split_once(' ').unwrap();
        per_source
            .entry(source.to_string())
            .or_default()
            .push(index.parse().unwrap());
        total += 1;
    }
    assert_eq!(total, 200);

    // Each source lands in one bucket, so its lines keep their order.
    for indexes in per_source.values() {
        assert_eq!(indexes.len(), 40);
        assert!(indexes.windows(2).all(|w| w[0] < w[1]));
    }
}
