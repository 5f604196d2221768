use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use image::ImageFormat;
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::record::{ImageRecord, extension_of};

/// Format the decoder would use for this extension, if it can read it.
pub fn image_format(path: &Path) -> Option<ImageFormat> {
    let ext = path.extension()?.to_str()?;
    ImageFormat::from_extension(ext).filter(|f| f.reading_enabled())
}

pub fn is_image_ext(path: &Path, extensions: &[String]) -> bool {
    if image_format(path).is_none() {
        return false;
    }
    if extensions.is_empty() {
        return true;
    }
    let ext = extension_of(path);
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Scan with default settings: every readable format, no progress reporting.
pub fn scan(dir: &Path) -> Result<Vec<ImageRecord>, ScanError> {
    scan_with(dir, &ScanConfig::default(), None)
}

/// Recursively collects image records under `dir`, sorted by
/// case-insensitive path. Entries that are not images, are empty, or whose
/// header cannot be read are skipped, never reported.
pub fn scan_with(
    dir: &Path,
    config: &ScanConfig,
    progress_tx: Option<Sender<(usize, usize)>>,
) -> Result<Vec<ImageRecord>, ScanError> {
    let unreadable = |source| ScanError::Unreadable { path: dir.to_path_buf(), source };

    let metadata = fs::metadata(dir).map_err(unreadable)?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }
    // WalkDir only reports a bad root as an item error; probe it up front.
    fs::read_dir(dir).map_err(unreadable)?;

    // 1. Fast Directory Walk (Collect paths only)
    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_image_ext(entry.path(), &config.extensions) {
            candidates.push(entry.into_path());
        }
    }

    let total_files = candidates.len();
    if let Some(tx) = &progress_tx { let _ = tx.send((0, total_files)); }

    // 2. Parallel header probing
    let processed_count = AtomicUsize::new(0);
    let mut records: Vec<ImageRecord> = candidates.par_iter().filter_map(|path| {
        if let Some(prog_tx) = &progress_tx {
            let current = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if current % 50 == 0 || current == total_files {
                let _ = prog_tx.send((current, total_files));
            }
        }
        probe(path)
    }).collect();

    // 3. Final Sort
    sort_records(&mut records);

    info!("Scanned {:?}: {} images out of {} candidates", dir, records.len(), total_files);
    Ok(records)
}

fn probe(path: &Path) -> Option<ImageRecord> {
    let format = image_format(path)?;
    let metadata = fs::metadata(path).ok()?;
    let bytes = metadata.len();
    if bytes == 0 {
        debug!("Skipping empty file {:?}", path);
        return None;
    }
    let modified: DateTime<Utc> = DateTime::from(metadata.modified().unwrap_or(UNIX_EPOCH));

    let dimensions = match image::image_dimensions(path) {
        Ok(dims) => dims,
        Err(e) => {
            debug!("Skipping {:?}, no readable header: {}", path, e);
            return None;
        }
    };

    Some(ImageRecord::new(path.to_path_buf(), format, dimensions, bytes, modified))
}

/// Case-insensitive full-path order; the raw path breaks ties so the result
/// is deterministic when two paths differ only in case.
pub fn sort_records(records: &mut [ImageRecord]) {
    records.sort_by_cached_key(|r| (r.path.to_string_lossy().to_lowercase(), r.path.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_jpeg, write_png};
    use tempfile::TempDir;

    fn fixture_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_png(&root.join("b.png"), 4, 3, [255, 0, 0]);
        write_png(&root.join("A.png"), 2, 2, [0, 255, 0]);
        write_jpeg(&root.join("c.jpg"), 8, 6, [0, 0, 255]);
        fs::create_dir(root.join("Sub")).unwrap();
        write_png(&root.join("Sub").join("d.PNG"), 5, 5, [10, 10, 10]);
        fs::write(root.join("empty.png"), b"").unwrap();
        fs::write(root.join("notes.txt"), b"not an image").unwrap();
        fs::write(root.join("bogus.png"), b"definitely not png data").unwrap();
        dir
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = fixture_dir();
        let records = scan(dir.path()).unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A.png", "b.png", "c.jpg", "d.PNG"]);

        for r in &records {
            assert!(r.bytes > 0, "{:?} has zero size", r.path);
            assert!(image_format(&r.path).is_some(), "{:?} is not a known image type", r.path);
        }

        let lowered: Vec<String> = records.iter().map(|r| r.path.to_string_lossy().to_lowercase()).collect();
        let mut sorted = lowered.clone();
        sorted.sort();
        assert_eq!(lowered, sorted, "List must be in case-insensitive path order");
    }

    #[test]
    fn test_scan_reads_dimensions() {
        let dir = fixture_dir();
        let records = scan(dir.path()).unwrap();
        let c = records.iter().find(|r| r.name == "c.jpg").unwrap();
        assert_eq!(c.dimensions, (8, 6));
        assert_eq!(c.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_scan_extension_filter() {
        let dir = fixture_dir();
        let cfg = ScanConfig { extensions: vec!["png".to_string()] };
        let records = scan_with(dir.path(), &cfg, None).unwrap();
        assert!(records.iter().all(|r| r.extension() == "png"));
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_scan_progress_reaches_total() {
        let dir = fixture_dir();
        let (tx, rx) = crossbeam_channel::unbounded();
        scan_with(dir.path(), &ScanConfig::default(), Some(tx)).unwrap();
        let updates: Vec<(usize, usize)> = rx.try_iter().collect();
        let last = updates.last().copied().unwrap();
        assert_eq!(last.0, last.1, "Final progress update should be complete: {:?}", updates);
    }

    #[test]
    fn test_scan_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(scan(&missing), Err(ScanError::Unreadable { .. })));

        let file = dir.path().join("file.png");
        write_png(&file, 1, 1, [0, 0, 0]);
        assert!(matches!(scan(&file), Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_empty_dir_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(scan(dir.path()).unwrap().is_empty());
    }
}
