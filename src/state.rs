use std::collections::{HashMap, HashSet};
use std::io;
use std::ops::RangeInclusive;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use image::RgbaImage;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ScanConfig};
use crate::cull::{self, ProcessReport, TrashOutcome, Trasher};
use crate::error::ScanError;
use crate::pool::WorkerPool;
use crate::record::{ImageRecord, SourceState, ThumbnailJob};
use crate::scanner;
use crate::thumbnail::{self, Thumbnail};

#[derive(Debug, Clone, PartialEq)]
pub enum InputIntent {
    NextItem,
    PrevItem,
    Home,
    End,
    GoTo(usize),
    ToggleSelected,
    ResetSelection,
    Process { keep_selected: bool },
    ReloadList,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Busy {
    Loading,
    Processing,
}

impl Busy {
    pub fn message(self) -> &'static str {
        match self {
            Busy::Loading => "Loading images - Please wait...",
            Busy::Processing => "Processing images...",
        }
    }
}

/// Why a session has nothing left to show.
#[derive(Debug, Clone, PartialEq)]
pub enum EndReason {
    NoImages,
    AllTrashed,
    ScanFailed(String),
}

impl EndReason {
    pub fn message(&self) -> String {
        match self {
            EndReason::NoImages => "No images were found in the selected directory.".to_string(),
            EndReason::AllTrashed => "All images were moved to the trash.".to_string(),
            EndReason::ScanFailed(e) => e.clone(),
        }
    }
}

/// Everything a front end needs to redraw after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub current: Option<usize>,
    pub highlighted: Option<usize>,
    pub count: usize,
    pub selected: usize,
    pub status: Option<String>,
    pub busy: Option<Busy>,
    pub ended: Option<EndReason>,
}

/// Results applied on the session thread, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Loaded { count: usize },
    SourceReady(usize),
    ThumbnailReady(usize),
    Processed(ProcessReport),
    Ended(EndReason),
}

enum WorkerEvent {
    ScanFinished(Result<Vec<ImageRecord>, ScanError>),
    SourceLoaded { path: PathBuf, token: u64, image: Option<RgbaImage> },
    ThumbnailFinished { path: PathBuf, job_id: u64, thumbnail: Option<Thumbnail> },
    ProcessFinished(Vec<TrashOutcome>),
}

/// Indices kept decoded around `cursor`: the cursor and its two neighbours.
pub fn working_window(cursor: usize, len: usize) -> RangeInclusive<usize> {
    let lo = cursor.saturating_sub(1);
    let hi = (cursor + 1).min(len.saturating_sub(1));
    lo..=hi
}

/// One browsing session over one directory. All list, cursor and record
/// mutation happens on the thread that owns this value; workers only send
/// `WorkerEvent`s back, applied in `pump` / `wait_idle`.
pub struct Session {
    root: PathBuf,
    scan_config: ScanConfig,
    thumbnail_height: u32,
    images: Vec<ImageRecord>,
    index_of: HashMap<PathBuf, usize>,
    current: Option<usize>,
    busy: Option<Busy>,
    ended: Option<EndReason>,
    exit_requested: bool,
    progress: (usize, usize),

    pool: WorkerPool,
    trasher: Arc<dyn Trasher>,
    active_window: Arc<RwLock<HashSet<PathBuf>>>,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
    progress_tx: Sender<(usize, usize)>,
    progress_rx: Receiver<(usize, usize)>,
    next_token: u64,
    in_flight: usize,
}

impl Session {
    pub fn new(root: impl Into<PathBuf>, config: &Config, trasher: Arc<dyn Trasher>) -> io::Result<Self> {
        let (events_tx, events_rx) = unbounded();
        let (progress_tx, progress_rx) = unbounded();
        Ok(Self {
            root: root.into(),
            scan_config: config.scan.clone(),
            thumbnail_height: config.thumbnail_height(),
            images: Vec::new(),
            index_of: HashMap::new(),
            current: None,
            busy: None,
            ended: None,
            exit_requested: false,
            progress: (0, 0),
            pool: WorkerPool::new(config.worker_threads())?,
            trasher,
            active_window: Arc::new(RwLock::new(HashSet::new())),
            events_tx,
            events_rx,
            progress_tx,
            progress_rx,
            next_token: 1,
            in_flight: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Cursor as a signed index, `-1` meaning no selection.
    pub fn cursor(&self) -> isize {
        self.current.map_or(-1, |i| i as isize)
    }

    pub fn current_image(&self) -> Option<&ImageRecord> {
        self.current.and_then(|i| self.images.get(i))
    }

    pub fn busy(&self) -> Option<Busy> {
        self.busy
    }

    pub fn ended(&self) -> Option<&EndReason> {
        self.ended.as_ref()
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn progress(&self) -> (usize, usize) {
        self.progress
    }

    pub fn trash_verb(&self) -> &'static str {
        self.trasher.verb()
    }

    /// User-facing text for `reason`, worded for the configured trasher.
    pub fn end_message(&self, reason: &EndReason) -> String {
        match reason {
            EndReason::AllTrashed => self.trasher.all_gone_message().to_string(),
            other => other.message(),
        }
    }

    pub fn selected_count(&self) -> usize {
        self.images.iter().filter(|r| r.selected).count()
    }

    pub fn status(&self) -> Option<String> {
        let i = self.current?;
        Some(format!("{} of {} — {} selected", i + 1, self.images.len(), self.selected_count()))
    }

    pub fn view(&self) -> ViewState {
        ViewState {
            current: self.current,
            highlighted: self.images.iter().position(|r| r.highlighted),
            count: self.images.len(),
            selected: self.selected_count(),
            status: self.status(),
            busy: self.busy,
            ended: self.ended.clone(),
        }
    }

    fn take_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    pub fn handle_input(&mut self, intent: InputIntent) -> ViewState {
        match intent {
            InputIntent::NextItem => self.next(),
            InputIntent::PrevItem => self.previous(),
            InputIntent::Home => self.set_cursor(0),
            InputIntent::End => self.set_cursor(self.images.len().saturating_sub(1)),
            InputIntent::GoTo(i) => self.set_cursor(i),
            InputIntent::ToggleSelected => self.toggle_selected(),
            InputIntent::ResetSelection => self.reset_selection(),
            InputIntent::Process { keep_selected } => self.process(keep_selected),
            InputIntent::ReloadList => self.load(),
            InputIntent::Quit => {
                self.exit_requested = true;
                self.view()
            }
        }
    }

    // --- Loading ---

    /// Starts a scan of the root on the worker pool. Ignored while another
    /// load or process action is running.
    pub fn load(&mut self) -> ViewState {
        if self.busy.is_some() {
            debug!("load ignored, busy with {:?}", self.busy);
            return self.view();
        }
        self.busy = Some(Busy::Loading);
        self.progress = (0, 0);

        let root = self.root.clone();
        let cfg = self.scan_config.clone();
        let tx = self.events_tx.clone();
        let prog_tx = self.progress_tx.clone();
        self.in_flight += 1;
        self.pool.execute(move || {
            let res = scanner::scan_with(&root, &cfg, Some(prog_tx));
            let _ = tx.send(WorkerEvent::ScanFinished(res));
        });
        self.view()
    }

    /// Replaces the list wholesale, e.g. with records scanned elsewhere.
    pub fn replace_images(&mut self, images: Vec<ImageRecord>) -> Vec<Notification> {
        for rec in &mut self.images {
            if let Some(job) = rec.thumbnail_job.take() { job.cancel(); }
        }
        self.images = images;
        self.reset_after_list_change()
    }

    fn reset_after_list_change(&mut self) -> Vec<Notification> {
        self.rebuild_index();
        self.current = None;
        for rec in &mut self.images {
            rec.highlighted = false;
        }
        if self.images.is_empty() {
            return vec![self.end(EndReason::NoImages)];
        }
        self.ended = None;
        self.set_cursor(0);
        vec![Notification::Loaded { count: self.images.len() }]
    }

    fn rebuild_index(&mut self) {
        self.index_of = self.images.iter().enumerate().map(|(i, r)| (r.path.clone(), i)).collect();
    }

    fn end(&mut self, reason: EndReason) -> Notification {
        info!("Session for {:?} ended: {}", self.root, reason.message());
        self.current = None;
        if let Ok(mut w) = self.active_window.write() { w.clear(); }
        self.ended = Some(reason.clone());
        Notification::Ended(reason)
    }

    // --- Cursor ---

    /// Moves the cursor and slides the working set: buffers outside
    /// `i-1..=i+1` are dropped now, missing ones inside are queued for decode.
    /// Out-of-range indices are ignored.
    pub fn set_cursor(&mut self, i: usize) -> ViewState {
        if i >= self.images.len() {
            return self.view();
        }
        if let Some(prev) = self.current.and_then(|p| self.images.get_mut(p)) {
            prev.highlighted = false;
        }
        self.current = Some(i);
        self.images[i].highlighted = true;
        self.update_working_set(i);
        self.view()
    }

    pub fn next(&mut self) -> ViewState {
        match self.current {
            Some(i) if i + 1 < self.images.len() => self.set_cursor(i + 1),
            None if !self.images.is_empty() => self.set_cursor(0),
            _ => self.view(),
        }
    }

    pub fn previous(&mut self) -> ViewState {
        match self.current {
            Some(i) if i > 0 => self.set_cursor(i - 1),
            _ => self.view(),
        }
    }

    fn update_working_set(&mut self, cursor: usize) {
        let window = working_window(cursor, self.images.len());
        if let Ok(mut w) = self.active_window.write() {
            w.clear();
            w.extend(self.images[window.clone()].iter().map(|r| r.path.clone()));
        }

        let mut to_load = Vec::new();
        for (idx, rec) in self.images.iter_mut().enumerate() {
            if window.contains(&idx) {
                if !rec.is_resident() {
                    to_load.push(idx);
                }
            } else if rec.is_resident() {
                rec.unload_source();
            }
        }
        for idx in to_load {
            let token = self.take_token();
            self.images[idx].source = SourceState::Pending(token);
            self.submit_source_load(self.images[idx].path.clone(), token);
        }
    }

    fn submit_source_load(&mut self, path: PathBuf, token: u64) {
        let tx = self.events_tx.clone();
        let window = self.active_window.clone();
        self.in_flight += 1;
        self.pool.execute(move || {
            // Skip if no longer in active window
            let wanted = window.read().map(|w| w.contains(&path)).unwrap_or(true);
            let image = if wanted {
                match thumbnail::load_rgba(&path) {
                    Ok(img) => Some(img),
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                }
            } else {
                None
            };
            let _ = tx.send(WorkerEvent::SourceLoaded { path, token, image });
        });
    }

    // --- Selection ---

    pub fn toggle_selected(&mut self) -> ViewState {
        if let Some(rec) = self.current.and_then(|i| self.images.get_mut(i)) {
            rec.selected = !rec.selected;
        }
        self.view()
    }

    pub fn reset_selection(&mut self) -> ViewState {
        for rec in &mut self.images {
            rec.selected = false;
        }
        self.view()
    }

    // --- Thumbnails ---

    /// Queues a thumbnail for record `i`. Returns false when it already has
    /// one, one is in flight, or `i` is out of range.
    pub fn request_thumbnail(&mut self, i: usize) -> bool {
        match self.images.get(i) {
            Some(rec) if rec.thumbnail.is_none() && rec.thumbnail_job.is_none() => {}
            _ => return false,
        }
        let job = ThumbnailJob::new(self.take_token());
        let rec = &mut self.images[i];
        rec.thumbnail_job = Some(job.clone());
        let path = rec.path.clone();

        let tx = self.events_tx.clone();
        let height = self.thumbnail_height;
        self.in_flight += 1;
        self.pool.execute(move || {
            let thumbnail = if job.is_cancelled() {
                None
            } else {
                match thumbnail::render(&path, height) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                }
            };
            // A cancelled job never publishes, even if rendering finished.
            let thumbnail = if job.is_cancelled() { None } else { thumbnail };
            let _ = tx.send(WorkerEvent::ThumbnailFinished { path, job_id: job.id, thumbnail });
        });
        true
    }

    /// Cancels the in-flight thumbnail of record `i`, if any. The slot is
    /// freed at once so a later request starts a fresh job.
    pub fn cancel_thumbnail(&mut self, i: usize) {
        if let Some(job) = self.images.get_mut(i).and_then(|r| r.thumbnail_job.take()) {
            debug!("Cancelled thumbnail job {} for record {}", job.id, i);
            job.cancel();
        }
    }

    // --- Process ---

    /// Trashes every record whose selection disagrees with `keep_selected`
    /// on the worker pool. The list is updated when the result is pumped.
    pub fn process(&mut self, keep_selected: bool) -> ViewState {
        if self.busy.is_some() || self.images.is_empty() {
            return self.view();
        }
        let targets = cull::targets(&self.images, keep_selected);
        info!("Processing {} of {} images (keep_selected={})", targets.len(), self.images.len(), keep_selected);
        self.busy = Some(Busy::Processing);

        let tx = self.events_tx.clone();
        let trasher = self.trasher.clone();
        self.in_flight += 1;
        self.pool.execute(move || {
            // Always report back so the session leaves Busy::Processing
            let outcomes = catch_unwind(AssertUnwindSafe(|| cull::trash_all(&targets, trasher.as_ref())))
                .unwrap_or_else(|_| {
                    error!("Trash job panicked, nothing marked as trashed");
                    Vec::new()
                });
            let _ = tx.send(WorkerEvent::ProcessFinished(outcomes));
        });
        self.view()
    }

    // --- Event application ---

    /// Applies every worker result that has arrived, without blocking.
    pub fn pump(&mut self) -> Vec<Notification> {
        self.drain_progress();
        let mut out = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            out.extend(self.apply(event));
        }
        out
    }

    /// Blocks until every queued job has reported back or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<Notification> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => out.extend(self.apply(event)),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("wait_idle timed out with {} jobs in flight", self.in_flight);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.drain_progress();
        out
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn drain_progress(&mut self) {
        while let Ok(p) = self.progress_rx.try_recv() {
            self.progress = p;
        }
    }

    fn apply(&mut self, event: WorkerEvent) -> Vec<Notification> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match event {
            WorkerEvent::ScanFinished(res) => {
                self.busy = None;
                match res {
                    Ok(images) => self.replace_images(images),
                    Err(e) => {
                        warn!("{}", e);
                        self.images.clear();
                        self.index_of.clear();
                        vec![self.end(EndReason::ScanFailed(e.to_string()))]
                    }
                }
            }
            WorkerEvent::SourceLoaded { path, token, image } => {
                let Some(&idx) = self.index_of.get(&path) else { return Vec::new() };
                let rec = &mut self.images[idx];
                if !matches!(rec.source, SourceState::Pending(t) if t == token) {
                    return Vec::new();
                }
                match image {
                    Some(img) => {
                        rec.source = SourceState::Loaded(Arc::new(img));
                        vec![Notification::SourceReady(idx)]
                    }
                    None => {
                        rec.source = SourceState::Unloaded;
                        Vec::new()
                    }
                }
            }
            WorkerEvent::ThumbnailFinished { path, job_id, thumbnail } => {
                let Some(&idx) = self.index_of.get(&path) else { return Vec::new() };
                let rec = &mut self.images[idx];
                if rec.thumbnail_job.as_ref().map(|j| j.id) != Some(job_id) {
                    return Vec::new();
                }
                rec.thumbnail_job = None;
                match thumbnail {
                    Some(t) => {
                        rec.thumbnail = Some(Arc::new(t.image));
                        rec.average_color = Some(t.average_color);
                        vec![Notification::ThumbnailReady(idx)]
                    }
                    None => Vec::new(),
                }
            }
            WorkerEvent::ProcessFinished(outcomes) => {
                self.busy = None;
                let report = cull::mark_trashed(&mut self.images, &outcomes);
                // Compaction shifts rows, so every viewport request is void.
                for rec in &mut self.images {
                    if let Some(job) = rec.thumbnail_job.take() { job.cancel(); }
                }
                cull::compact(&mut self.images);
                info!("Process done: {} moved, {} failed, {} left", report.moved, report.errors.len(), report.remaining);

                let mut out = vec![Notification::Processed(report)];
                if self.images.is_empty() {
                    self.rebuild_index();
                    out.push(self.end(EndReason::AllTrashed));
                } else {
                    out.extend(self.reset_after_list_change().into_iter().filter(|n| !matches!(n, Notification::Loaded { .. })));
                }
                out
            }
        }
    }
}
