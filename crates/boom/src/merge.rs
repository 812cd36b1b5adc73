//! Merging boom files without decompressing them.
//!
//! [`MergeRewriter`] turns a stream of [`RawBlockSpan`]s harvested from many
//! files into the bytes of a single container file:
//!
//! ```text
//! first span      → header of its file (adopted as canonical)
//! every span      → COUNT | LENGTH | PAYLOAD | canonical SYNC
//! ```
//!
//! Each source file has its own random sync marker. Rewriting every block
//! with the canonical marker makes the concatenation a well-formed file.
//! Spans whose schema or codec differs from the canonical header are refused.

use crate::container::ContainerHeader;
use crate::error::{BoomError, Result};
use crate::lock::{LockService, ReadLockGuard, WriteLockGuard};
use crate::reader::{CombinedSplit, RawBlockReader, RawBlockSpan};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Rewrites raw block spans into one output stream.
#[derive(Debug, Default)]
pub struct MergeRewriter {
    canonical: Option<Arc<ContainerHeader>>,
}

impl MergeRewriter {
    /// Creates a rewriter that has not seen any span yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header adopted from the first span, if any.
    pub fn header(&self) -> Option<&ContainerHeader> {
        self.canonical.as_deref()
    }

    /// Returns the bytes to append to the output for `span`.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::IncompatibleSchema` if the span's schema or codec
    /// differs from the canonical header.
    pub fn consume(&mut self, span: &RawBlockSpan) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        let mut adopted = false;
        let canonical = Arc::clone(self.canonical.get_or_insert_with(|| {
            adopted = true;
            Arc::clone(&span.header)
        }));
        if adopted {
            debug!(header = %span.header, "Adopting canonical header");
            out.extend_from_slice(&span.header.to_bytes());
        } else if !canonical.is_compatible_with(&span.header) {
            return Err(BoomError::IncompatibleSchema(format!(
                "cannot merge {} into {}",
                span.header, canonical
            )));
        }

        if !span.is_empty() {
            out.extend_from_slice(&span.encode_block());
            out.extend_from_slice(&canonical.sync_marker);
        }
        Ok(out)
    }
}

/// Outcome of a merge job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Blocks copied to the output.
    pub blocks_processed: u64,
    /// Payload bytes copied.
    pub bytes_processed: u64,
    /// Size of the output file.
    pub bytes_written: u64,
}

/// Merges whole input files into `output`.
///
/// The result is written to a temporary file next to `output` and renamed
/// into place once complete, so `output` never holds a partial merge. If
/// every input is empty no output file is created.
///
/// # Examples
/// ```rust,ignore
/// use boom::merge::merge_files;
///
/// let result = merge_files(&[a_path, b_path], &out_path)?;
/// println!("copied {} blocks", result.blocks_processed);
/// ```
pub fn merge_files<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<MergeResult> {
    let split = CombinedSplit::whole_files(inputs)?;
    let tmp_path = tmp_path_for(output);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let written = write_merged(split, &tmp_path);
    let result = match written {
        Ok(result) => result,
        Err(e) => {
            // Best effort; the merge error is what matters.
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    if result.blocks_processed == 0 && result.bytes_written == 0 {
        let _ = fs::remove_file(&tmp_path);
        info!(output = %output.display(), "Nothing to merge");
        return Ok(result);
    }

    fs::rename(&tmp_path, output)?;
    info!(
        output = %output.display(),
        inputs = inputs.len(),
        blocks = result.blocks_processed,
        bytes = result.bytes_written,
        "Merged boom files"
    );
    Ok(result)
}

/// Runs [`merge_files`] holding read locks on every input and the write lock
/// on `output`.
pub fn merge_files_locked<L, P>(locks: &L, inputs: &[P], output: &Path) -> Result<MergeResult>
where
    L: LockService + ?Sized,
    P: AsRef<Path>,
{
    let _write = WriteLockGuard::acquire(locks, output)?;
    let _reads = inputs
        .iter()
        .map(|p| ReadLockGuard::acquire(locks, p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    merge_files(inputs, output)
}

fn tmp_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_merged(split: CombinedSplit, path: &Path) -> Result<MergeResult> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut rewriter = MergeRewriter::new();
    let mut result = MergeResult::default();

    for span in RawBlockReader::new(split) {
        let span = span?;
        let bytes = rewriter.consume(&span)?;
        out.write_all(&bytes)?;
        result.bytes_written += bytes.len() as u64;
        if !span.is_empty() {
            result.blocks_processed += 1;
            result.bytes_processed += span.payload.len() as u64;
        }
    }

    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(result)
}
