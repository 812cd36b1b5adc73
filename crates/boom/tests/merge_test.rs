//! Integration tests for merging and refiltering boom files.

use boom::container::{Codec, ContainerWriter};
use boom::filter::refilter;
use boom::lock::LockService;
use boom::{
    merge_files, merge_files_locked, BoomError, BoomWriter, CombinedSplit, FilterChain,
    InProcessLockService, LineFilter, LogBlock, LogLine, LogicalLine, LogicalRecordReader,
    MergeRewriter, RawBlockReader, SchemaRegistry, WriterConfig,
};
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write_lines(path: &Path, start_ms: i64, messages: &[&str]) {
    let registry = SchemaRegistry::new();
    let config = WriterConfig::default().with_sync_interval(64);
    let mut writer = BoomWriter::create(path, &registry, config).unwrap();
    for (i, message) in messages.iter().enumerate() {
        writer.append(start_ms + (i as i64) * 400, message).unwrap();
    }
    writer.close().unwrap();
}

fn read_all<P: AsRef<Path>>(paths: &[P]) -> Vec<LogicalLine> {
    let registry = SchemaRegistry::new();
    let split = CombinedSplit::whole_files(paths).unwrap();
    LogicalRecordReader::new(split, &registry)
        .map(|line| line.unwrap())
        .collect()
}

#[test]
fn test_merge_of_single_file_is_identity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.bm");
    write_lines(&path, 0, &["a", "b", "c", "d", "e", "f", "g"]);

    let mut rewriter = MergeRewriter::new();
    let mut merged = Vec::new();
    for span in RawBlockReader::new(CombinedSplit::whole_files(&[&path]).unwrap()) {
        merged.extend(rewriter.consume(&span.unwrap()).unwrap());
    }
    assert_eq!(merged, fs::read(&path).unwrap());
}

#[test]
fn test_merge_files_rewrites_markers() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bm");
    let b = dir.path().join("b.bm");
    let out = dir.path().join("out/merged.bm");
    write_lines(&a, 0, &["a1", "a2", "a3"]);
    write_lines(&b, 10_000, &["b1", "b2", "b3", "b4"]);

    let result = merge_files(&[&a, &b], &out).unwrap();
    assert_eq!(result.bytes_written, fs::metadata(&out).unwrap().len());
    assert!(!dir.path().join("out/merged.bm.tmp").exists());

    let expected = read_all(&[&a, &b]);
    assert_eq!(read_all(&[&out]), expected);

    let spans: Vec<_> = RawBlockReader::new(CombinedSplit::whole_files(&[&out]).unwrap())
        .map(|s| s.unwrap())
        .collect();
    assert_eq!(spans.len() as u64, result.blocks_processed);
    assert_eq!(
        spans.iter().map(|s| s.payload.len() as u64).sum::<u64>(),
        result.bytes_processed
    );
}

/// Schema text as emitted by other object container writers of log blocks.
const COMPACT_LOG_BLOCK_SCHEMA: &str = concat!(
    r#"{"type":"record","name":"logBlock","fields":[{"name":"second","type":"long"},"#,
    r#"{"name":"createTime","type":"long"},{"name":"blockNumber","type":"long"},"#,
    r#"{"name":"logLines","type":{"type":"array","items":{"type":"record","#,
    r#""name":"messageWithMillis","fields":[{"name":"ms","type":"long"},"#,
    r#"{"name":"eventId","type":"int","default":0},{"name":"message","type":"string"}]}}}]}"#
);

#[test]
fn test_merge_accepts_files_from_other_writers() {
    let dir = TempDir::new().unwrap();
    let ours = dir.path().join("ours.bm");
    let theirs = dir.path().join("theirs.bm");
    let out = dir.path().join("merged.bm");
    write_lines(&ours, 0, &["o1", "o2", "o3"]);

    let file = File::create(&theirs).unwrap();
    let mut writer =
        ContainerWriter::new(file, COMPACT_LOG_BLOCK_SCHEMA, Codec::default(), 64).unwrap();
    let mut block = LogBlock::new(20, 20_500, 1);
    block.lines.push(LogLine::new(0, 7, "t1"));
    block.lines.push(LogLine::new(250, 0, "t2"));
    writer.append_datum(&block.encode()).unwrap();
    writer.finish().unwrap();

    let registry = SchemaRegistry::new();
    let header = BoomWriter::new(Vec::new(), &registry, WriterConfig::default())
        .unwrap()
        .header()
        .clone();
    assert_eq!(header.schema, COMPACT_LOG_BLOCK_SCHEMA);

    merge_files(&[&ours, &theirs], &out).unwrap();
    let merged = read_all(&[&out]);
    assert_eq!(
        merged.iter().map(|l| l.message.as_str()).collect::<Vec<_>>(),
        vec!["o1", "o2", "o3", "t1", "t2"]
    );
    assert_eq!((merged[3].timestamp, merged[3].event_id), (20_000, 7));
    assert_eq!(merged[4].timestamp, 20_250);
}

#[test]
fn test_merge_refuses_other_schema() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bm");
    let other = dir.path().join("other.bm");
    let out = dir.path().join("merged.bm");
    write_lines(&a, 0, &["a1"]);

    let mut writer =
        ContainerWriter::new(File::create(&other).unwrap(), "\"string\"", Codec::default(), 64)
            .unwrap();
    writer.append_datum(&[0x02, b'x']).unwrap();
    writer.finish().unwrap();

    assert!(matches!(
        merge_files(&[&a, &other], &out),
        Err(BoomError::IncompatibleSchema(_))
    ));
    assert!(!out.exists());
    assert!(!dir.path().join("merged.bm.tmp").exists());
}

#[test]
fn test_merge_of_empty_inputs_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let empty = dir.path().join("empty.bm");
    fs::write(&empty, b"").unwrap();
    let out = dir.path().join("merged.bm");

    let result = merge_files(&[&empty], &out).unwrap();
    assert_eq!(result.blocks_processed, 0);
    assert!(!out.exists());
}

#[test]
fn test_locked_merge_releases_locks() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.bm");
    let out = dir.path().join("merged.bm");
    write_lines(&a, 0, &["x", "y"]);

    let locks = InProcessLockService::with_timeout(Duration::from_millis(200));
    merge_files_locked(&locks, &[&a], &out).unwrap();
    assert_eq!(locks.readers(&a), 0);
    assert!(!locks.is_write_locked(&out));

    // A held write lock on an input blocks the merge.
    locks.acquire_write(&a).unwrap();
    assert!(matches!(
        merge_files_locked(&locks, &[&a], &out),
        Err(BoomError::Lock(_))
    ));
    locks.release_write(&a).unwrap();
}

#[test]
fn test_refilter_keeps_block_identity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.bm");
    write_lines(
        &path,
        5_000,
        &["keep 1", "drop 1", "keep 2", "drop 2", "drop 3", "keep 3"],
    );
    let original = read_all(&[&path]);

    let registry = SchemaRegistry::new();
    let mut chain = FilterChain::new(vec![
        LineFilter::regex("^nothing$").unwrap(),
        LineFilter::string_match("keep"),
    ]);
    let out_path = dir.path().join("filtered.bm");
    let (_, result) = refilter(
        CombinedSplit::whole_files(&[&path]).unwrap(),
        &registry,
        &mut chain,
        File::create(&out_path).unwrap(),
        WriterConfig::default(),
    )
    .unwrap();
    assert_eq!((result.lines_read, result.lines_kept), (6, 3));
    assert_eq!(chain.match_counts(), vec![3, 0]);

    let filtered = read_all(&[&out_path]);
    let expected: Vec<(i64, String, i64, i64)> = original
        .iter()
        .filter(|l| l.message.starts_with("keep"))
        .map(|l| (l.timestamp, l.message.clone(), l.create_time, l.block_number))
        .collect();
    let actual: Vec<(i64, String, i64, i64)> = filtered
        .iter()
        .map(|l| (l.timestamp, l.message.clone(), l.create_time, l.block_number))
        .collect();
    assert_eq!(actual, expected);
}
