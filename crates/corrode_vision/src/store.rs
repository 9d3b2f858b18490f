//! On-disk heatmap store.
//!
//! Composites are written as JPEG files named
//! `gradcam_output_<unix-seconds>_<4-digit-random>.jpg` into a single
//! directory and served back by name. Names are never reused: creation is
//! exclusive and a collision draws a new suffix.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisionError};

const NAME_PREFIX: &str = "gradcam_output_";
const NAME_SUFFIX: &str = ".jpg";
const JPEG_QUALITY: u8 = 95;
const MAX_NAME_ATTEMPTS: usize = 32;

/// URL path under which stored heatmaps are served.
pub const HEATMAP_ROUTE: &str = "/heatmap";

/// When stored heatmaps are removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Remove files older than this.
    pub ttl: Option<Duration>,
    /// Keep at most this many files, newest first.
    pub max_files: Option<usize>,
}

impl RetentionPolicy {
    /// Keep everything.
    pub fn keep_all() -> Self {
        Self::default()
    }

    /// True if the policy never removes anything.
    pub fn is_unbounded(&self) -> bool {
        self.ttl.is_none() && self.max_files.is_none()
    }
}

/// A stored heatmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapRef {
    /// File name inside the store.
    pub name: String,
    /// Absolute location on disk.
    pub path: PathBuf,
}

impl HeatmapRef {
    /// Relative URL the heatmap is served under.
    pub fn url(&self) -> String {
        format!("{HEATMAP_ROUTE}/{}", self.name)
    }
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files removed.
    pub removed: usize,
    /// Files left in the store.
    pub kept: usize,
}

/// Directory of rendered heatmaps.
#[derive(Debug)]
pub struct HeatmapStore {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl HeatmapStore {
    /// Open the store at `dir`, creating the directory if needed.
    pub fn create(dir: impl Into<PathBuf>, retention: RetentionPolicy) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), ?retention, "Opened heatmap store");
        Ok(Self { dir, retention })
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retention policy.
    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Encode `image` as JPEG under a fresh unique name.
    pub fn save(&self, image: &RgbImage) -> Result<HeatmapRef> {
        let (name, path, file) = self.create_unique()?;

        let mut writer = BufWriter::new(file);
        let encoded = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(image)
            .map_err(|e| VisionError::Encode(e.to_string()));
        let encoded = encoded.and_then(|()| writer.flush().map_err(VisionError::from));

        if let Err(e) = encoded {
            drop(writer);
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        tracing::debug!(name = %name, "Saved heatmap");
        Ok(HeatmapRef { name, path })
    }

    fn create_unique(&self) -> Result<(String, PathBuf, File)> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let name = format!(
                "{NAME_PREFIX}{secs}_{}{NAME_SUFFIX}",
                rng.gen_range(1000..=9999)
            );
            let path = self.dir.join(&name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((name, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(VisionError::IoError(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not find a free heatmap name",
        )))
    }

    /// True if `name` could have been produced by [`HeatmapStore::save`].
    ///
    /// Rejects anything that could escape the store directory.
    pub fn is_valid_name(name: &str) -> bool {
        name.starts_with(NAME_PREFIX)
            && name.ends_with(NAME_SUFFIX)
            && !name.contains("..")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    }

    /// Location of an existing heatmap.
    ///
    /// # Errors
    ///
    /// [`VisionError::NotFound`] for a malformed name or a missing file.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if !Self::is_valid_name(name) {
            return Err(VisionError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(VisionError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Read a stored heatmap's JPEG bytes.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VisionError::NotFound(name.to_string()),
            _ => e.into(),
        })
    }

    /// Apply the retention policy as of `now`.
    ///
    /// Files past the TTL go first; then the oldest are removed until at most
    /// `max_files` remain. Files that are not heatmaps are ignored.
    pub fn sweep(&self, now: SystemTime) -> Result<SweepReport> {
        if self.retention.is_unbounded() {
            return Ok(SweepReport {
                removed: 0,
                kept: self.entries()?.len(),
            });
        }

        let mut entries = self.entries()?;
        // Newest first.
        entries.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        let mut kept = 0;
        for (path, modified) in entries {
            let expired = self.retention.ttl.is_some_and(|ttl| {
                now.duration_since(modified)
                    .map(|age| age > ttl)
                    .unwrap_or(false)
            });
            let over_limit = self.retention.max_files.is_some_and(|max| kept >= max);

            if expired || over_limit {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to remove heatmap"
                        );
                        kept += 1;
                    }
                }
            } else {
                kept += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, kept, "Swept heatmap store");
        }
        Ok(SweepReport { removed, kept })
    }

    fn entries(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !Self::is_valid_name(name) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            out.push((entry.path(), meta.modified()?));
        }
        Ok(out)
    }
}
