use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::TrashError;
use crate::record::ImageRecord;

/// Moves one file out of the image set. Runs on worker threads.
pub trait Trasher: Send + Sync {
    fn trash(&self, path: &Path) -> Result<(), TrashError>;

    fn verb(&self) -> &'static str {
        "trashed"
    }

    /// Shown when a process action leaves no image behind.
    fn all_gone_message(&self) -> &'static str {
        "All images were moved to the trash."
    }
}

/// OS trash / recycle bin.
pub struct SystemTrash;

impl Trasher for SystemTrash {
    fn trash(&self, path: &Path) -> Result<(), TrashError> {
        trash::delete(path).map_err(|e| TrashError::new(path, e))
    }
}

pub struct PermanentDelete;

impl Trasher for PermanentDelete {
    fn trash(&self, path: &Path) -> Result<(), TrashError> {
        fs::remove_file(path).map_err(|e| TrashError::new(path, e))
    }

    fn verb(&self) -> &'static str {
        "permanently deleted"
    }

    fn all_gone_message(&self) -> &'static str {
        "All images were permanently deleted."
    }
}

pub fn trasher_for(use_trash: bool) -> Arc<dyn Trasher> {
    if use_trash { Arc::new(SystemTrash) } else { Arc::new(PermanentDelete) }
}

#[derive(Debug, Clone)]
pub struct TrashOutcome {
    pub path: PathBuf,
    pub result: Result<(), TrashError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessReport {
    pub moved: usize,
    pub errors: Vec<TrashError>,
    /// Records left in the list after compaction.
    pub remaining: usize,
}

/// A record goes when its selection disagrees with what the user keeps.
pub fn should_trash(record: &ImageRecord, keep_selected: bool) -> bool {
    record.selected != keep_selected
}

pub fn targets(records: &[ImageRecord], keep_selected: bool) -> Vec<PathBuf> {
    records.iter()
        .filter(|r| !r.trashed && should_trash(r, keep_selected))
        .map(|r| r.path.clone())
        .collect()
}

/// Trashes every path, continuing past failures.
pub fn trash_all(paths: &[PathBuf], trasher: &dyn Trasher) -> Vec<TrashOutcome> {
    paths.iter().map(|path| {
        let result = trasher.trash(path);
        match &result {
            Ok(()) => info!("{} {:?}", trasher.verb(), path),
            Err(e) => warn!("{}", e),
        }
        TrashOutcome { path: path.clone(), result }
    }).collect()
}

/// Tombstone step: flags successfully trashed records, leaves failures alone.
pub fn mark_trashed(records: &mut [ImageRecord], outcomes: &[TrashOutcome]) -> ProcessReport {
    let index: HashMap<&Path, usize> = records.iter().enumerate().map(|(i, r)| (r.path.as_path(), i)).collect();
    let mut hits = Vec::new();
    let mut report = ProcessReport::default();

    for outcome in outcomes {
        match &outcome.result {
            Ok(()) => {
                if let Some(&i) = index.get(outcome.path.as_path()) {
                    hits.push(i);
                }
                report.moved += 1;
            }
            Err(e) => report.errors.push(e.clone()),
        }
    }
    for i in hits {
        records[i].trashed = true;
    }
    report.remaining = records.iter().filter(|r| !r.trashed).count();
    report
}

/// Drops tombstoned records. Returns how many were removed.
pub fn compact(records: &mut Vec<ImageRecord>) -> usize {
    let before = records.len();
    records.retain(|r| !r.trashed);
    before - records.len()
}

/// Whole process action on the calling thread.
pub fn process(records: &mut Vec<ImageRecord>, keep_selected: bool, trasher: &dyn Trasher) -> ProcessReport {
    let paths = targets(records, keep_selected);
    let outcomes = trash_all(&paths, trasher);
    let report = mark_trashed(records, &outcomes);
    compact(records);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeTrasher, record};
    use tempfile::TempDir;

    fn abc() -> Vec<ImageRecord> {
        let mut list = vec![record("/pics/A.png"), record("/pics/B.png"), record("/pics/C.png")];
        list[0].selected = true;
        list[2].selected = true;
        list
    }

    fn names(records: &[ImageRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_keep_selected_trashes_unselected() {
        let mut list = abc();
        let trasher = FakeTrasher::default();

        let report = process(&mut list, true, &trasher);

        assert_eq!(trasher.calls(), vec![PathBuf::from("/pics/B.png")]);
        assert_eq!(names(&list), vec!["A.png", "C.png"]);
        assert_eq!(report, ProcessReport { moved: 1, errors: vec![], remaining: 2 });
    }

    #[test]
    fn test_trash_selected() {
        let mut list = abc();
        let trasher = FakeTrasher::default();
        let report = process(&mut list, false, &trasher);
        assert_eq!(names(&list), vec!["B.png"]);
        assert_eq!(report.moved, 2);
    }

    #[test]
    fn test_failure_does_not_abort_loop() {
        let mut list = vec![record("/pics/A.png"), record("/pics/B.png"), record("/pics/C.png")];
        let trasher = FakeTrasher::failing(&["/pics/B.png"]);

        // Nothing selected + keep selected = everything goes
        let report = process(&mut list, true, &trasher);

        assert_eq!(trasher.calls().len(), 3, "Loop must visit every target");
        assert_eq!(names(&list), vec!["B.png"]);
        assert!(!list[0].trashed);
        assert_eq!(report.moved, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, PathBuf::from("/pics/B.png"));
    }

    #[test]
    fn test_failed_record_is_retried_next_time() {
        let mut list = vec![record("/pics/A.png"), record("/pics/B.png")];
        let trasher = FakeTrasher::failing(&["/pics/B.png"]);
        process(&mut list, true, &trasher);
        let report = process(&mut list, true, &trasher);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(trasher.calls().iter().filter(|p| p.ends_with("B.png")).count(), 2);
    }

    #[test]
    fn test_trash_everything_empties_list() {
        let mut list = abc();
        for r in &mut list { r.selected = false; }
        let report = process(&mut list, true, &FakeTrasher::default());
        assert!(list.is_empty());
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn test_mark_then_compact_are_separate() {
        let mut list = abc();
        let outcomes = vec![TrashOutcome { path: PathBuf::from("/pics/B.png"), result: Ok(()) }];

        let report = mark_trashed(&mut list, &outcomes);
        assert_eq!(list.len(), 3, "Marking must not remove anything");
        assert!(list[1].trashed);
        assert_eq!(report.remaining, 2);

        assert_eq!(compact(&mut list), 1);
        assert_eq!(names(&list), vec!["A.png", "C.png"]);
    }

    #[test]
    fn test_permanent_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.png");
        fs::write(&path, b"x").unwrap();
        PermanentDelete.trash(&path).unwrap();
        assert!(!path.exists());

        let err = PermanentDelete.trash(&path).unwrap_err();
        assert_eq!(err.path, path);
    }

    #[test]
    fn test_all_gone_message_follows_trasher() {
        assert!(SystemTrash.all_gone_message().contains("trash"));
        let msg = trasher_for(false).all_gone_message();
        assert!(msg.contains("permanently deleted"), "{}", msg);
        assert!(!msg.contains("trash"), "{}", msg);
    }
}
