//! Block writer.
//!
//! [`BoomWriter`] groups incoming lines into [`LogBlock`]s and serializes
//! every sealed block into a container stream.
//!
//! # Modes
//!
//! ```text
//! Forward     append(ts, msg)
//!             seal when the second changes (before adding the line)
//!             seal when the block reaches max_lines_per_block (after)
//!
//! Reassembly  append_reassembled(ts, msg, eventId, createTime, blockNumber)
//!             seal when second, createTime or blockNumber changes
//! ```
//!
//! # Data loss
//!
//! A block that cannot be serialized or written is dropped, never retried.
//! The loss is logged, added to [`WriterStats`] and reported to the caller
//! as `BoomError::DataLossOnFlush`; the writer keeps accepting lines.
//!
//! A write that fails after part of the block reached the sink leaves a torn
//! block in the stream, and [`BoomWriter::is_torn`] turns true. Whole-file
//! readers stop with `Desync` at the torn block, so lines written after it
//! are counted in `lines_written` but are only recovered by split readers
//! whose range starts past it. Callers that need every counted line readable
//! should close the writer and start a new file once it is torn.

use crate::block::{split_timestamp, LogBlock, LogLine};
use crate::container::codec::{Codec, DEFAULT_DEFLATE_LEVEL};
use crate::container::writer::{
    ContainerWriter, DEFAULT_SYNC_INTERVAL, MAX_SYNC_INTERVAL, MIN_SYNC_INTERVAL,
};
use crate::container::ContainerHeader;
use crate::error::{BoomError, Result};
use crate::schema::SchemaRegistry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::{Add, AddAssign};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Default maximum number of lines in one forward-mode block.
pub const DEFAULT_MAX_LINES_PER_BLOCK: usize = 1000;

/// How block boundaries are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterMode {
    /// Time bucketing: one block per second, capped in size.
    #[default]
    Forward,
    /// Block identities are supplied with every line and kept verbatim.
    Reassembly,
}

impl WriterMode {
    /// Returns the mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Reassembly => "reassembly",
        }
    }
}

/// Configuration for a [`BoomWriter`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Forward-mode line cap per block.
    pub max_lines_per_block: usize,
    /// Deflate level (0-9).
    pub deflate_level: u32,
    /// Buffered bytes after which a container block is cut.
    pub sync_interval: usize,
    /// Operating mode.
    pub mode: WriterMode,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_lines_per_block: DEFAULT_MAX_LINES_PER_BLOCK,
            deflate_level: DEFAULT_DEFLATE_LEVEL,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            mode: WriterMode::default(),
        }
    }
}

impl WriterConfig {
    /// Sets the forward-mode line cap.
    pub fn with_max_lines_per_block(mut self, max_lines: usize) -> Self {
        self.max_lines_per_block = max_lines;
        self
    }

    /// Sets the deflate level.
    pub fn with_deflate_level(mut self, level: u32) -> Self {
        self.deflate_level = level;
        self
    }

    /// Sets the sync interval in bytes.
    pub fn with_sync_interval(mut self, bytes: usize) -> Self {
        self.sync_interval = bytes;
        self
    }

    /// Sets the operating mode.
    pub fn with_mode(mut self, mode: WriterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Codec used for container blocks.
    pub fn codec(&self) -> Codec {
        Codec::Deflate {
            level: self.deflate_level,
        }
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<()> {
        if self.max_lines_per_block == 0 {
            return Err(BoomError::InvalidConfig(
                "max_lines_per_block must be at least 1".to_string(),
            ));
        }
        if self.deflate_level > 9 {
            return Err(BoomError::InvalidConfig(format!(
                "deflate_level {} outside 0..=9",
                self.deflate_level
            )));
        }
        if !(MIN_SYNC_INTERVAL..=MAX_SYNC_INTERVAL).contains(&self.sync_interval) {
            return Err(BoomError::InvalidConfig(format!(
                "sync_interval {} outside {}..={}",
                self.sync_interval, MIN_SYNC_INTERVAL, MAX_SYNC_INTERVAL
            )));
        }
        Ok(())
    }
}

/// Counters shared between a writer and its observers.
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Lines written to the stream.
    pub lines_written: AtomicU64,
    /// Log blocks written to the stream.
    pub blocks_written: AtomicU64,
    /// Lines dropped because their block could not be written.
    pub lines_lost: AtomicU64,
    /// Log blocks dropped.
    pub blocks_lost: AtomicU64,
}

impl WriterStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a point-in-time copy of the counters.
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            lines_written: self.lines_written.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            lines_lost: self.lines_lost.load(Ordering::Relaxed),
            blocks_lost: self.blocks_lost.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`WriterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStatsSnapshot {
    /// Lines written to the stream.
    pub lines_written: u64,
    /// Log blocks written to the stream.
    pub blocks_written: u64,
    /// Lines dropped.
    pub lines_lost: u64,
    /// Log blocks dropped.
    pub blocks_lost: u64,
}

impl Add for WriterStatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            lines_written: self.lines_written + other.lines_written,
            blocks_written: self.blocks_written + other.blocks_written,
            lines_lost: self.lines_lost + other.lines_lost,
            blocks_lost: self.blocks_lost + other.blocks_lost,
        }
    }
}

impl AddAssign for WriterStatsSnapshot {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Writes log lines into one container stream.
///
/// A writer owns its stream and is driven from a single thread.
pub struct BoomWriter<W: Write> {
    container: ContainerWriter<W>,
    config: WriterConfig,
    current: Option<LogBlock>,
    block_counter: i64,
    // Sealed but still in the container buffer.
    pending_lines: u64,
    pending_blocks: u64,
    stats: Arc<WriterStats>,
}

impl BoomWriter<BufWriter<File>> {
    /// Creates (or truncates) a boom file at `path`.
    pub fn create(path: &Path, registry: &SchemaRegistry, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        let file = File::create(path)?;
        debug!(path = %path.display(), "creating boom file");
        Self::new(BufWriter::new(file), registry, config)
    }
}

impl<W: Write> BoomWriter<W> {
    /// Starts a boom stream on `inner`, writing the container header.
    pub fn new(inner: W, registry: &SchemaRegistry, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        let container = ContainerWriter::new(
            inner,
            registry.log_block_schema(),
            config.codec(),
            config.sync_interval,
        )?;
        Ok(Self {
            container,
            config,
            current: None,
            block_counter: 0,
            pending_lines: 0,
            pending_blocks: 0,
            stats: Arc::new(WriterStats::new()),
        })
    }

    /// Returns the writer's configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Returns the container header of the output stream.
    pub fn header(&self) -> &ContainerHeader {
        self.container.header()
    }

    /// Returns the shared counters.
    pub fn stats(&self) -> &Arc<WriterStats> {
        &self.stats
    }

    /// Returns true once a failed write left a partial block in the stream.
    pub fn is_torn(&self) -> bool {
        self.container.is_torn()
    }

    /// Returns the block currently being filled, if any.
    pub fn current_block(&self) -> Option<&LogBlock> {
        self.current.as_ref()
    }

    /// Appends a line in forward mode.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::WrongMode` on a reassembly writer. Returns
    /// `BoomError::DataLossOnFlush` if sealing a block failed; the new line
    /// is accepted regardless.
    pub fn append(&mut self, timestamp_ms: i64, message: &str) -> Result<()> {
        self.check_mode(WriterMode::Forward)?;
        let (second, ms_offset) = split_timestamp(timestamp_ms);

        let mut loss = None;
        if self.current.as_ref().is_some_and(|b| b.second != second) {
            debug!(second, "Flushing due to new second");
            loss = self.seal_current().err();
        }

        if self.current.is_none() {
            self.block_counter += 1;
        }
        let block_number = self.block_counter;
        let block = self.current.get_or_insert_with(|| {
            LogBlock::new(second, chrono::Utc::now().timestamp_millis(), block_number)
        });
        block.lines.push(LogLine::new(ms_offset, 0, message));

        if block.len() >= self.config.max_lines_per_block {
            debug!(
                second,
                lines = block.len(),
                "Flushing due to max lines per block"
            );
            if let Err(e) = self.seal_current() {
                loss.get_or_insert(e);
            }
        }

        loss.map_or(Ok(()), Err)
    }

    /// Appends a line in reassembly mode, keeping the supplied block identity.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::WrongMode` on a forward writer and
    /// `BoomError::DataLossOnFlush` as for [`BoomWriter::append`].
    pub fn append_reassembled(
        &mut self,
        timestamp_ms: i64,
        message: &str,
        event_id: i32,
        create_time: i64,
        block_number: i64,
    ) -> Result<()> {
        self.check_mode(WriterMode::Reassembly)?;
        let (second, ms_offset) = split_timestamp(timestamp_ms);

        let mut loss = Ok(());
        if self
            .current
            .as_ref()
            .is_some_and(|b| !b.has_identity(second, create_time, block_number))
        {
            debug!(second, create_time, block_number, "Flushing due to new block identity");
            loss = self.seal_current();
        }

        self.current
            .get_or_insert_with(|| LogBlock::new(second, create_time, block_number))
            .lines
            .push(LogLine::new(ms_offset, event_id, message));
        loss
    }

    /// Seals the open block and writes every buffered block to the stream.
    pub fn flush(&mut self) -> Result<()> {
        let sealed = self.seal_current();
        let flushed = match self.container.flush() {
            Ok(()) => {
                self.commit_pending();
                Ok(())
            }
            Err(e) => Err(self.record_loss(e)),
        };
        sealed.and(flushed)
    }

    /// Flushes and finalizes the stream, returning it.
    pub fn close(mut self) -> Result<W> {
        self.flush()?;
        let stats = self.stats.snapshot();
        debug!(
            lines = stats.lines_written,
            blocks = stats.blocks_written,
            lost = stats.lines_lost,
            "closing boom writer"
        );
        self.container.finish()
    }

    fn check_mode(&self, expected: WriterMode) -> Result<()> {
        if self.config.mode != expected {
            return Err(BoomError::WrongMode {
                expected: expected.as_str(),
                actual: self.config.mode.as_str(),
            });
        }
        Ok(())
    }

    fn seal_current(&mut self) -> Result<()> {
        let Some(block) = self.current.take() else {
            return Ok(());
        };

        self.pending_lines += block.len() as u64;
        self.pending_blocks += 1;
        match self.container.append_datum(&block.encode()) {
            Ok(()) => {
                if self.container.buffered_entries() == 0 {
                    self.commit_pending();
                }
                Ok(())
            }
            Err(e) => Err(self.record_loss(e)),
        }
    }

    fn commit_pending(&mut self) {
        let lines = std::mem::take(&mut self.pending_lines);
        let blocks = std::mem::take(&mut self.pending_blocks);
        self.stats.lines_written.fetch_add(lines, Ordering::Relaxed);
        self.stats.blocks_written.fetch_add(blocks, Ordering::Relaxed);
    }

    fn record_loss(&mut self, err: BoomError) -> BoomError {
        let lines = std::mem::take(&mut self.pending_lines);
        let blocks = std::mem::take(&mut self.pending_blocks);
        self.stats.lines_lost.fetch_add(lines, Ordering::Relaxed);
        self.stats.blocks_lost.fetch_add(blocks, Ordering::Relaxed);
        error!(lines, blocks, error = %err, "Failed to write log blocks, data lost");
        BoomError::DataLossOnFlush {
            lines,
            reason: err.to_string(),
        }
    }
}
