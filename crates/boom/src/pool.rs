//! Bucketed writer pool.
//!
//! Writers are single-threaded, so parallel ingestion uses one writer per
//! bucket, each driven by its own worker thread:
//!
//! ```text
//!                    hash(source) % buckets
//! append(source) ──────────┬──────────────┬──────────────┐
//!                          ▼              ▼              ▼
//!                   [channel 0]     [channel 1]    [channel N-1]
//!                          │              │              │
//!                   worker thread  worker thread  worker thread
//!                   BoomWriter 0   BoomWriter 1   BoomWriter N-1
//! ```
//!
//! No writer is shared between threads. Channels are bounded, so a slow
//! bucket applies backpressure to its producers.

use crate::error::{BoomError, Result};
use crate::writer::{BoomWriter, WriterConfig, WriterStats, WriterStatsSnapshot};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Default number of buckets.
pub const DEFAULT_BUCKETS: usize = 4;

/// Default number of queued commands per bucket.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Configuration for a [`WriterPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of writers (and worker threads).
    pub buckets: usize,
    /// Configuration handed to the writer factory.
    pub writer: WriterConfig,
    /// Bound of each bucket's command queue.
    pub channel_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS,
            writer: WriterConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Sets the number of buckets.
    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    /// Sets the writer configuration.
    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// Sets the per-bucket queue bound.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<()> {
        if self.buckets == 0 {
            return Err(BoomError::InvalidConfig("buckets must be at least 1".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(BoomError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        self.writer.validate()
    }
}

enum Command {
    Line { timestamp_ms: i64, message: String },
    Flush(SyncSender<Result<()>>),
}

/// A fixed set of writers, one per bucket, each on its own thread.
pub struct WriterPool {
    senders: Vec<SyncSender<Command>>,
    workers: Vec<JoinHandle<WriterStatsSnapshot>>,
    stats: Vec<Arc<WriterStats>>,
}

impl WriterPool {
    /// Creates one writer per bucket with `factory` and starts the workers.
    ///
    /// # Examples
    /// ```rust,ignore
    /// use boom::pool::{PoolConfig, WriterPool};
    /// use boom::{BoomWriter, SchemaRegistry};
    ///
    /// let registry = SchemaRegistry::new();
    /// let pool = WriterPool::new(PoolConfig::default(), |bucket, config| {
    ///     let path = layout.file_path("ingest", bucket, now_ms)?;
    ///     BoomWriter::create(&path, &registry, config.clone())
    /// })?;
    /// pool.append("host-a", now_ms, "GET /index.html")?;
    /// let stats = pool.shutdown()?;
    /// ```
    pub fn new<W, F>(config: PoolConfig, mut factory: F) -> Result<Self>
    where
        W: Write + Send + 'static,
        F: FnMut(usize, &WriterConfig) -> Result<BoomWriter<W>>,
    {
        config.validate()?;

        let mut senders = Vec::with_capacity(config.buckets);
        let mut workers = Vec::with_capacity(config.buckets);
        let mut stats = Vec::with_capacity(config.buckets);

        for bucket in 0..config.buckets {
            let writer = factory(bucket, &config.writer)?;
            stats.push(Arc::clone(writer.stats()));

            let (tx, rx) = mpsc::sync_channel(config.channel_capacity);
            let handle = thread::Builder::new()
                .name(format!("boom-writer-{}", bucket))
                .spawn(move || run_worker(bucket, writer, rx))?;
            senders.push(tx);
            workers.push(handle);
        }

        debug!(buckets = config.buckets, "Started writer pool");
        Ok(Self {
            senders,
            workers,
            stats,
        })
    }

    /// Number of buckets.
    pub fn buckets(&self) -> usize {
        self.senders.len()
    }

    /// Bucket that lines from `source` are routed to.
    pub fn bucket_for(&self, source: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queues a line on the bucket of `source`, blocking while it is full.
    pub fn append(&self, source: &str, timestamp_ms: i64, message: &str) -> Result<()> {
        let bucket = self.bucket_for(source);
        self.senders[bucket]
            .send(Command::Line {
                timestamp_ms,
                message: message.to_string(),
            })
            .map_err(|_| worker_gone(bucket))
    }

    /// Flushes every writer and waits until all of them are done.
    ///
    /// Returns the first flush error; every bucket is flushed regardless.
    pub fn flush(&self) -> Result<()> {
        let mut replies = Vec::with_capacity(self.senders.len());
        for (bucket, sender) in self.senders.iter().enumerate() {
            let (tx, rx) = mpsc::sync_channel(1);
            sender
                .send(Command::Flush(tx))
                .map_err(|_| worker_gone(bucket))?;
            replies.push((bucket, rx));
        }

        let mut first_error = None;
        for (bucket, rx) in replies {
            let outcome = rx.recv().map_err(|_| worker_gone(bucket)).and_then(|r| r);
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Current counters summed over all buckets.
    pub fn stats(&self) -> WriterStatsSnapshot {
        self.stats
            .iter()
            .fold(WriterStatsSnapshot::default(), |acc, s| acc + s.snapshot())
    }

    /// Closes every writer, joins the workers and returns the final counters.
    pub fn shutdown(self) -> Result<WriterStatsSnapshot> {
        drop(self.senders);

        let mut total = WriterStatsSnapshot::default();
        for (bucket, handle) in self.workers.into_iter().enumerate() {
            total += handle.join().map_err(|_| {
                BoomError::Io(io::Error::other(format!(
                    "writer worker {} panicked",
                    bucket
                )))
            })?;
        }
        debug!(
            lines = total.lines_written,
            blocks = total.blocks_written,
            lost = total.lines_lost,
            "Writer pool shut down"
        );
        Ok(total)
    }
}

fn worker_gone(bucket: usize) -> BoomError {
    BoomError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("writer worker {} has stopped", bucket),
    ))
}

fn run_worker<W: Write>(
    bucket: usize,
    mut writer: BoomWriter<W>,
    commands: Receiver<Command>,
) -> WriterStatsSnapshot {
    for command in commands {
        match command {
            Command::Line {
                timestamp_ms,
                message,
            } => {
                // Losses are already logged and counted by the writer.
                if let Err(e) = writer.append(timestamp_ms, &message) {
                    warn!(bucket, "Append failed: {}", e);
                }
            }
            Command::Flush(reply) => {
                let _ = reply.send(writer.flush());
            }
        }
    }

    let stats = Arc::clone(writer.stats());
    if let Err(e) = writer.close() {
        error!(bucket, "Failed to close writer: {}", e);
    }
    stats.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_routing_is_stable() {
        let registry = SchemaRegistry::new();
        let pool = WriterPool::new(PoolConfig::default().with_buckets(3), |_, config| {
            BoomWriter::new(Vec::new(), &registry, config.clone())
        })
        .unwrap();

        assert_eq!(pool.buckets(), 3);
        let bucket = pool.bucket_for("host-a");
        assert!(bucket < 3);
        assert_eq!(pool.bucket_for("host-a"), bucket);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_invalid_config() {
        let registry = SchemaRegistry::new();
        let result = WriterPool::new(PoolConfig::default().with_buckets(0), |_, config| {
            BoomWriter::new(Vec::new(), &registry, config.clone())
        });
        assert!(matches!(result, Err(BoomError::InvalidConfig(_))));
    }

    #[test]
    fn test_flush_and_shutdown_counts() {
        let registry = SchemaRegistry::new();
        let pool = WriterPool::new(PoolConfig::default().with_buckets(2), |_, config| {
            BoomWriter::new(Vec::new(), &registry, config.clone())
        })
        .unwrap();

        for i in 0..10 {
            pool.append(&format!("source-{}", i), 1000 + i, "line").unwrap();
        }
        pool.flush().unwrap();
        assert_eq!(pool.stats().lines_written, 10);

        let total = pool.shutdown().unwrap();
        assert_eq!(total.lines_written, 10);
        assert_eq!(total.lines_lost, 0);
    }
}
