//! Split descriptions.
//!
//! A [`CombinedSplit`] is an ordered list of byte ranges over one or more
//! boom files. Ranges are opaque: they need not start or end on a block
//! boundary, readers align them by scanning for sync markers.

use crate::error::{BoomError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A byte range of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSegment {
    /// File to read.
    pub path: PathBuf,
    /// First byte of the range.
    pub start: u64,
    /// Length of the range in bytes.
    pub length: u64,
}

impl FileSegment {
    /// Creates a segment.
    pub fn new(path: impl Into<PathBuf>, start: u64, length: u64) -> Self {
        Self {
            path: path.into(),
            start,
            length,
        }
    }

    /// Creates a segment covering an entire file.
    pub fn whole_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let length = fs::metadata(&path)?.len();
        Ok(Self::new(path, 0, length))
    }

    /// Offset one past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }
}

/// Ordered byte ranges processed as one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedSplit {
    segments: Vec<FileSegment>,
}

impl CombinedSplit {
    /// Creates a split from explicit segments.
    pub fn new(segments: Vec<FileSegment>) -> Self {
        Self { segments }
    }

    /// Creates a split covering each of `paths` from start to end.
    pub fn whole_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let segments = paths
            .iter()
            .map(|p| FileSegment::whole_file(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segments })
    }

    /// Cuts one file into consecutive ranges of at most `split_size` bytes.
    ///
    /// The ranges cover the file exactly once. A zero-length file yields a
    /// single empty range.
    pub fn split_file(path: &Path, split_size: u64) -> Result<Vec<Self>> {
        if split_size == 0 {
            return Err(BoomError::InvalidConfig("split size must be positive".to_string()));
        }
        let len = fs::metadata(path)?.len();
        if len == 0 {
            return Ok(vec![Self::new(vec![FileSegment::new(path, 0, 0)])]);
        }

        let mut splits = Vec::with_capacity(len.div_ceil(split_size) as usize);
        let mut start = 0;
        while start < len {
            let length = split_size.min(len - start);
            splits.push(Self::new(vec![FileSegment::new(path, start, length)]));
            start += length;
        }
        Ok(splits)
    }

    /// Appends a segment.
    pub fn push(&mut self, segment: FileSegment) {
        self.segments.push(segment);
    }

    /// Returns the segments in order.
    pub fn segments(&self) -> &[FileSegment] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the split has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of all segment lengths.
    pub fn total_length(&self) -> u64 {
        self.segments.iter().map(|s| s.length).sum()
    }
}

impl From<Vec<FileSegment>> for CombinedSplit {
    fn from(segments: Vec<FileSegment>) -> Self {
        Self::new(segments)
    }
}
