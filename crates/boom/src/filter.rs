//! Line filters and the refilter job.
//!
//! A [`FilterChain`] keeps a line if any of its filters accepts it. Filters
//! that match often migrate to the front of the chain, so the common case is
//! decided after one comparison.

use crate::error::{BoomError, Result};
use crate::reader::{CombinedSplit, LogicalRecordReader};
use crate::schema::SchemaRegistry;
use crate::writer::{BoomWriter, WriterConfig, WriterMode};
use regex::Regex;
use std::fmt;
use std::io::Write;
use tracing::info;

/// A single line predicate.
#[derive(Debug, Clone)]
pub enum LineFilter {
    /// Accepts lines the expression matches anywhere.
    Regex(Regex),
    /// Accepts lines containing the literal.
    StringMatch(String),
    /// Accepts every line.
    KeepAll,
    /// Accepts no line.
    DropAll,
}

impl LineFilter {
    /// Compiles a regular expression filter.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| BoomError::InvalidFilter(format!("{}: {}", pattern, e)))
    }

    /// Creates a literal substring filter.
    pub fn string_match(literal: impl Into<String>) -> Self {
        Self::StringMatch(literal.into())
    }

    /// Returns true if the line passes this filter.
    pub fn accept(&self, line: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(line),
            Self::StringMatch(literal) => line.contains(literal.as_str()),
            Self::KeepAll => true,
            Self::DropAll => false,
        }
    }
}

impl fmt::Display for LineFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(re) => write!(f, "regex({})", re.as_str()),
            Self::StringMatch(literal) => write!(f, "match({})", literal),
            Self::KeepAll => f.write_str("keep-all"),
            Self::DropAll => f.write_str("drop-all"),
        }
    }
}

/// Ordered filters with per-filter match counts.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    entries: Vec<(LineFilter, u64)>,
}

impl FilterChain {
    /// Creates a chain that evaluates `filters` in the given order.
    pub fn new(filters: Vec<LineFilter>) -> Self {
        Self {
            entries: filters.into_iter().map(|f| (f, 0)).collect(),
        }
    }

    /// Returns true if any filter accepts `line`. An empty chain accepts
    /// nothing.
    ///
    /// Evaluation stops at the first accepting filter, whose count is bumped;
    /// it then moves ahead of every predecessor with a lower count.
    pub fn accept(&mut self, line: &str) -> bool {
        let Some(mut i) = self.entries.iter().position(|(f, _)| f.accept(line)) else {
            return false;
        };
        self.entries[i].1 += 1;
        while i > 0 && self.entries[i - 1].1 < self.entries[i].1 {
            self.entries.swap(i - 1, i);
            i -= 1;
        }
        true
    }

    /// Filters in current evaluation order.
    pub fn filters(&self) -> impl Iterator<Item = &LineFilter> {
        self.entries.iter().map(|(f, _)| f)
    }

    /// Match counts in current evaluation order.
    pub fn match_counts(&self) -> Vec<u64> {
        self.entries.iter().map(|(_, n)| *n).collect()
    }
}

/// Line counts of a refilter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefilterResult {
    /// Lines read from the split.
    pub lines_read: u64,
    /// Lines written to the output.
    pub lines_kept: u64,
}

/// Copies the lines of `split` accepted by `chain` into a new boom stream.
///
/// Lines keep their original block identity: the output is written in
/// reassembly mode, whatever mode `config` names.
pub fn refilter<W: Write>(
    split: CombinedSplit,
    registry: &SchemaRegistry,
    chain: &mut FilterChain,
    out: W,
    config: WriterConfig,
) -> Result<(W, RefilterResult)> {
    let mut writer = BoomWriter::new(out, registry, config.with_mode(WriterMode::Reassembly))?;
    let mut result = RefilterResult::default();

    for line in LogicalRecordReader::new(split, registry) {
        let line = line?;
        result.lines_read += 1;
        if !chain.accept(&line.message) {
            continue;
        }
        writer.append_reassembled(
            line.timestamp,
            &line.message,
            line.event_id,
            line.create_time,
            line.block_number,
        )?;
        result.lines_kept += 1;
    }

    let out = writer.close()?;
    info!(
        read = result.lines_read,
        kept = result.lines_kept,
        "Refiltered split"
    );
    Ok((out, result))
}
