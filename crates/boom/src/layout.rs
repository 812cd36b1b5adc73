//! Hourly directory layout for boom files.
//!
//! ```text
//! {root}/YYYYMMDD/HH/{component}-{bucket}-{created_ms}.bm
//! ```
//!
//! Hours are UTC. Each writer bucket of each component produces its own
//! file, named after the time it was opened.

use crate::error::{BoomError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of boom files.
pub const BOOM_EXTENSION: &str = "bm";

/// Components parsed from a boom file name.
///
/// # Examples
/// ```rust,ignore
/// use boom::layout::BoomFileInfo;
///
/// let name = BoomFileInfo::file_name("ingest", 3, 1357000000000);
/// assert_eq!(name, "ingest-3-1357000000000.bm");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoomFileInfo {
    /// Name of the process component that wrote the file.
    pub component: String,
    /// Writer bucket.
    pub bucket: usize,
    /// Epoch millis at which the file was created.
    pub created_ms: i64,
    /// Full file path.
    pub path: PathBuf,
}

impl BoomFileInfo {
    /// Builds `{component}-{bucket}-{created_ms}.bm`.
    pub fn file_name(component: &str, bucket: usize, created_ms: i64) -> String {
        format!("{}-{}-{}.{}", component, bucket, created_ms, BOOM_EXTENSION)
    }

    /// Parses a file name into `(component, bucket, created_ms)`.
    ///
    /// The component itself may contain dashes; bucket and creation time are
    /// taken from the right.
    pub fn parse_file_name(name: &str) -> Option<(String, usize, i64)> {
        let stem = name.strip_suffix(BOOM_EXTENSION)?.strip_suffix('.')?;
        let mut parts = stem.rsplitn(3, '-');
        let created_ms = parts.next()?.parse::<i64>().ok()?;
        let bucket = parts.next()?.parse::<usize>().ok()?;
        let component = parts.next()?;
        if component.is_empty() {
            return None;
        }
        Some((component.to_string(), bucket, created_ms))
    }
}

/// Maps timestamps to hourly directories under a root.
#[derive(Debug, Clone)]
pub struct HourlyLayout {
    root: PathBuf,
}

impl HourlyLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the hour that contains `timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns `BoomError::InvalidConfig` for timestamps chrono cannot
    /// represent.
    pub fn hour_dir(&self, timestamp_ms: i64) -> Result<PathBuf> {
        let time = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            BoomError::InvalidConfig(format!("timestamp {} out of range", timestamp_ms))
        })?;
        Ok(self
            .root
            .join(time.format("%Y%m%d").to_string())
            .join(time.format("%H").to_string()))
    }

    /// Path of the file a writer bucket opens at `created_ms`.
    pub fn file_path(&self, component: &str, bucket: usize, created_ms: i64) -> Result<PathBuf> {
        Ok(self
            .hour_dir(created_ms)?
            .join(BoomFileInfo::file_name(component, bucket, created_ms)))
    }

    /// Lists the boom files in the hour containing `timestamp_ms`.
    pub fn list_hour(&self, timestamp_ms: i64) -> Result<Vec<BoomFileInfo>> {
        list_boom_files(&self.hour_dir(timestamp_ms)?)
    }
}

/// Lists boom files directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list. Files whose names do not parse
/// are ignored.
pub fn list_boom_files(dir: &Path) -> Result<Vec<BoomFileInfo>> {
    let mut files = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(err) => return Err(err.into()),
    };

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Some((component, bucket, created_ms)) = BoomFileInfo::parse_file_name(name) {
            files.push(BoomFileInfo {
                component,
                bucket,
                created_ms,
                path,
            });
        }
    }

    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hour_dir() {
        let layout = HourlyLayout::new("/data");
        // 2013-01-01T05:59:59.999Z
        assert_eq!(
            layout.hour_dir(1_357_019_999_999).unwrap(),
            PathBuf::from("/data/20130101/05")
        );
        assert_eq!(
            layout.hour_dir(-1).unwrap(),
            PathBuf::from("/data/19691231/23")
        );
    }

    #[test]
    fn test_file_name_roundtrip() {
        let name = BoomFileInfo::file_name("web-ingest", 12, 1_357_000_000_000);
        assert_eq!(name, "web-ingest-12-1357000000000.bm");
        assert_eq!(
            BoomFileInfo::parse_file_name(&name),
            Some(("web-ingest".to_string(), 12, 1_357_000_000_000))
        );
        assert_eq!(BoomFileInfo::parse_file_name("x-1-2.txt"), None);
        assert_eq!(BoomFileInfo::parse_file_name("-1-2.bm"), None);
        assert_eq!(BoomFileInfo::parse_file_name("x-a-2.bm"), None);
    }

    #[test]
    fn test_list_boom_files() {
        let dir = TempDir::new().unwrap();
        let layout = HourlyLayout::new(dir.path());
        assert!(layout.list_hour(0).unwrap().is_empty());

        let hour = layout.hour_dir(0).unwrap();
        fs::create_dir_all(&hour).unwrap();
        for name in ["b-0-5.bm", "a-1-7.bm", "notes.txt", "a-0-9.bm"] {
            fs::write(hour.join(name), b"").unwrap();
        }
        fs::create_dir(hour.join("c-0-1.bm")).unwrap();

        let names: Vec<String> = layout
            .list_hour(0)
            .unwrap()
            .into_iter()
            .map(|f| BoomFileInfo::file_name(&f.component, f.bucket, f.created_ms))
            .collect();
        assert_eq!(names, vec!["a-0-9.bm", "a-1-7.bm", "b-0-5.bm"]);
    }
}
