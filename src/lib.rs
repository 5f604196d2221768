//! Browse a directory of images and cull them: scan, step through with a
//! cursor that keeps only its neighbourhood decoded, select, then move the
//! selected (or unselected) files to the trash in one pass.

pub mod config;
pub mod cull;
pub mod error;
pub mod logging;
pub mod pool;
pub mod record;
pub mod scanner;
pub mod state;
pub mod thumbnail;
pub mod ui;

pub use cull::{ProcessReport, Trasher};
pub use error::{ScanError, TrashError};
pub use record::ImageRecord;
pub use scanner::scan;
pub use state::{InputIntent, Notification, Session, ViewState};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use chrono::Utc;
    use image::{ImageFormat, Rgb, RgbImage};

    use crate::cull::Trasher;
    use crate::error::TrashError;
    use crate::record::ImageRecord;

    pub fn write_png(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
        RgbImage::from_pixel(width, height, Rgb(rgb)).save(path).unwrap();
    }

    pub fn write_jpeg(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
        RgbImage::from_pixel(width, height, Rgb(rgb))
            .save_with_format(path, ImageFormat::Jpeg)
            .unwrap();
    }

    /// In-memory record; nothing exists on disk.
    pub fn record(path: &str) -> ImageRecord {
        ImageRecord::new(PathBuf::from(path), ImageFormat::Png, (1, 1), 10, Utc::now())
    }

    /// Records every call and fails for the configured paths.
    #[derive(Default)]
    pub struct FakeTrasher {
        fail: HashSet<PathBuf>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl FakeTrasher {
        pub fn failing(paths: &[&str]) -> Self {
            Self::failing_paths(paths.iter().map(PathBuf::from).collect())
        }

        pub fn failing_paths(paths: Vec<PathBuf>) -> Self {
            Self { fail: paths.into_iter().collect(), calls: Mutex::new(Vec::new()) }
        }

        pub fn calls(&self) -> Vec<PathBuf> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Trasher for FakeTrasher {
        fn trash(&self, path: &Path) -> Result<(), TrashError> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            if self.fail.contains(path) {
                Err(TrashError::new(path, "permission denied"))
            } else {
                Ok(())
            }
        }
    }
}
