use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgba, RgbaImage};

/// Decoded pixel data of a record. Only records inside the working set
/// around the cursor are ever `Pending` or `Loaded`.
#[derive(Clone, Default)]
pub enum SourceState {
    #[default]
    Unloaded,
    /// A decode job with this token is on the worker pool.
    Pending(u64),
    Loaded(Arc<RgbaImage>),
}

impl fmt::Debug for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Unloaded => write!(f, "Unloaded"),
            SourceState::Pending(token) => write!(f, "Pending({})", token),
            SourceState::Loaded(img) => write!(f, "Loaded({}x{})", img.width(), img.height()),
        }
    }
}

/// Handle to an in-flight thumbnail render. The worker polls `cancelled`;
/// the session matches `id` before publishing a result.
#[derive(Debug, Clone)]
pub struct ThumbnailJob {
    pub id: u64,
    cancelled: Arc<AtomicBool>,
}

impl ThumbnailJob {
    pub fn new(id: u64) -> Self {
        Self { id, cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub name: String,
    pub format: ImageFormat,
    pub dimensions: (u32, u32),
    pub bytes: u64,
    pub modified: DateTime<Utc>,
    pub selected: bool,
    pub highlighted: bool,
    pub trashed: bool,
    pub(crate) source: SourceState,
    pub(crate) thumbnail: Option<Arc<RgbaImage>>,
    pub(crate) average_color: Option<Rgba<u8>>,
    pub(crate) thumbnail_job: Option<ThumbnailJob>,
}

impl ImageRecord {
    pub fn new(path: PathBuf, format: ImageFormat, dimensions: (u32, u32), bytes: u64, modified: DateTime<Utc>) -> Self {
        let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        Self {
            path,
            name,
            format,
            dimensions,
            bytes,
            modified,
            selected: false,
            highlighted: false,
            trashed: false,
            source: SourceState::Unloaded,
            thumbnail: None,
            average_color: None,
            thumbnail_job: None,
        }
    }

    pub fn source_state(&self) -> &SourceState {
        &self.source
    }

    pub fn source(&self) -> Option<&Arc<RgbaImage>> {
        match &self.source {
            SourceState::Loaded(img) => Some(img),
            _ => None,
        }
    }

    pub fn is_source_loaded(&self) -> bool {
        matches!(self.source, SourceState::Loaded(_))
    }

    /// Loaded or on its way.
    pub fn is_resident(&self) -> bool {
        !matches!(self.source, SourceState::Unloaded)
    }

    pub(crate) fn unload_source(&mut self) {
        self.source = SourceState::Unloaded;
    }

    pub fn thumbnail(&self) -> Option<&Arc<RgbaImage>> {
        self.thumbnail.as_ref()
    }

    pub fn average_color(&self) -> Option<Rgba<u8>> {
        self.average_color
    }

    pub fn thumbnail_in_flight(&self) -> bool {
        self.thumbnail_job.is_some()
    }

    pub fn extension(&self) -> String {
        extension_of(&self.path)
    }
}

impl fmt::Debug for ImageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRecord")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("dimensions", &self.dimensions)
            .field("bytes", &self.bytes)
            .field("selected", &self.selected)
            .field("highlighted", &self.highlighted)
            .field("trashed", &self.trashed)
            .field("source", &self.source)
            .field("thumbnail", &self.thumbnail.as_ref().map(|t| (t.width(), t.height())))
            .finish()
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase()
}

pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 { return format!("{} B", bytes); }
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 { return format!("{:.1} KB", kb); }
    let mb = kb / 1024.0;
    format!("{:.1} MB", mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let rec = ImageRecord::new(PathBuf::from("/tmp/pics/DSC_0001.JPG"), ImageFormat::Jpeg, (640, 480), 1234, Utc::now());
        assert_eq!(rec.name, "DSC_0001.JPG");
        assert_eq!(rec.extension(), "jpg");
        assert!(!rec.selected && !rec.highlighted && !rec.trashed);
        assert!(!rec.is_resident());
        assert!(rec.thumbnail().is_none());
        assert!(rec.average_color().is_none());
    }

    #[test]
    fn test_thumbnail_job_cancel_is_shared() {
        let job = ThumbnailJob::new(7);
        let worker_view = job.clone();
        assert!(!worker_view.is_cancelled());
        job.cancel();
        assert!(worker_view.is_cancelled(), "Cancel flag must be visible through clones");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
