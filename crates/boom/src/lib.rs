//! Boom - splittable log storage
//!
//! This crate stores streams of timestamped log lines in "boom" files:
//! deflate-compressed object container files whose blocks can be located by
//! scanning for a sync marker, so large files split into independent byte
//! ranges for parallel batch processing.
//!
//! # Components
//!
//! - [`container`]: varint codec, file header, codecs and raw block access
//! - [`BoomWriter`]: batches lines into per-second blocks
//! - [`LogicalRecordReader`]: reads lines back from a split
//! - [`RawBlockReader`] / [`MergeRewriter`]: move compressed blocks between
//!   files without inflating them
//! - [`WriterPool`]: one writer per bucket, each on its own thread
//!
//! # Example
//!
//! ```rust,ignore
//! use boom::{BoomWriter, CombinedSplit, LogicalRecordReader, SchemaRegistry, WriterConfig};
//!
//! let registry = SchemaRegistry::new();
//! let mut writer = BoomWriter::create(&path, &registry, WriterConfig::default())?;
//! writer.append(1_357_000_000_123, "GET /index.html 200")?;
//! writer.close()?;
//!
//! let split = CombinedSplit::whole_files(&[&path])?;
//! for line in LogicalRecordReader::new(split, &registry) {
//!     let line = line?;
//!     println!("{} {}", line.timestamp, line.message);
//! }
//! ```

#![deny(missing_docs)]

pub mod block;
pub mod container;
pub mod error;
pub mod filter;
pub mod layout;
pub mod lock;
pub mod merge;
pub mod pool;
pub mod reader;
pub mod schema;
pub mod writer;

pub use block::{LogBlock, LogLine, LogicalLine};
pub use container::{Codec, ContainerHeader, SyncMarker};
pub use error::{BoomError, Result};
pub use filter::{FilterChain, LineFilter};
pub use layout::HourlyLayout;
pub use lock::{InProcessLockService, LockService};
pub use merge::{merge_files, merge_files_locked, MergeResult, MergeRewriter};
pub use pool::{PoolConfig, WriterPool};
pub use reader::{CombinedSplit, FileSegment, LogicalRecordReader, RawBlockReader, RawBlockSpan};
pub use schema::{LogBlockLayout, SchemaRegistry};
pub use writer::{BoomWriter, WriterConfig, WriterMode, WriterStats, WriterStatsSnapshot};
