//! The single state container behind the image-processing view.
//!
//! Every change goes through [`Workbench::dispatch`]. Long-running operations
//! (the submission queue and the status poller) report progress as actions
//! tagged with the [`Epoch`] they started in; once "clear all" bumps the
//! epoch, late actions from earlier runs are dropped instead of resurrecting
//! cleared state.

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use vision_client::{ImageUpload, ProcessId, ProcessRecord, SubmissionMetadata};

use crate::capture::CaptureSource;
use crate::gallery::{gallery_images, AutoplayDelay, Modal, ResultCard};
use crate::poller::PollBatch;
use crate::preview::{PendingFile, PreviewAllocator, PreviewManager};
use crate::submission::SubmissionBatch;

/// Threshold shown in a fresh form.
pub const DEFAULT_THRESHOLD: i64 = 220;

/// How long a notice stays up before the view dismisses it.
pub const NOTICE_TIMEOUT_MS: u64 = 5000;

/// Session counter; bumped by [`Action::Cleared`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub text: String,
}

/// Which upload of the running batch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub index: usize,
    pub total: usize,
}

impl UploadProgress {
    pub fn label(&self) -> String {
        format!("Uploading image {} of {}", self.index + 1, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub class_name: String,
    /// Raw numeric input; only 0..=255 enables submission.
    pub threshold: i64,
    pub autoplay_delay: AutoplayDelay,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            threshold: DEFAULT_THRESHOLD,
            autoplay_delay: AutoplayDelay::DEFAULT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FilesAdded {
        source: CaptureSource,
        files: Vec<ImageUpload>,
    },
    FileRemoved(usize),
    ClassNameChanged(String),
    ThresholdChanged(i64),
    AutoplayDelayChanged(AutoplayDelay),

    SubmissionStarted {
        epoch: Epoch,
        total: usize,
    },
    UploadingItem {
        epoch: Epoch,
        index: usize,
    },
    SubmissionAccepted {
        epoch: Epoch,
        id: ProcessId,
    },
    SubmissionFailed {
        epoch: Epoch,
        index: usize,
        file_name: String,
        error: String,
    },
    SubmissionFinished {
        epoch: Epoch,
        accepted: usize,
        total: usize,
    },

    NothingToPoll,
    PollStarted {
        epoch: Epoch,
    },
    StatusUpdated {
        epoch: Epoch,
        id: ProcessId,
        record: ProcessRecord,
    },
    PollFailed {
        epoch: Epoch,
        id: ProcessId,
        error: String,
    },
    PollFinished {
        epoch: Epoch,
        updated: usize,
        failed: usize,
    },

    ModalOpened(ProcessId),
    ModalNext,
    ModalPrev,
    AutoplayToggled,
    AutoplayTick,
    ModalClosed,

    NoticeDismissed(u64),
    ClearRequested,
    ClearCancelled,
    Cleared,
}

impl Action {
    fn epoch(&self) -> Option<Epoch> {
        match self {
            Self::SubmissionStarted { epoch, .. }
            | Self::UploadingItem { epoch, .. }
            | Self::SubmissionAccepted { epoch, .. }
            | Self::SubmissionFailed { epoch, .. }
            | Self::SubmissionFinished { epoch, .. }
            | Self::PollStarted { epoch }
            | Self::StatusUpdated { epoch, .. }
            | Self::PollFailed { epoch, .. }
            | Self::PollFinished { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}

/// Upload-process-poll state for one view.
pub struct Workbench<P: PreviewAllocator> {
    previews: PreviewManager<P>,
    form: FormState,
    uploading: Option<UploadProgress>,
    polling: bool,
    records: IndexMap<ProcessId, ProcessRecord>,
    results: IndexMap<ProcessId, ProcessRecord>,
    modal: Modal,
    notice: Option<Notice>,
    confirm_clear: bool,
    epoch: Epoch,
    next_notice_id: u64,
}

impl<P: PreviewAllocator> Workbench<P> {
    pub fn new(allocator: P) -> Self {
        Self {
            previews: PreviewManager::new(allocator),
            form: FormState::default(),
            uploading: None,
            polling: false,
            records: IndexMap::new(),
            results: IndexMap::new(),
            modal: Modal::Closed,
            notice: None,
            confirm_clear: false,
            epoch: Epoch::default(),
            next_notice_id: 0,
        }
    }

    pub fn dispatch(&mut self, action: Action) {
        if let Some(epoch) = action.epoch() {
            if epoch != self.epoch {
                debug!("Dropping stale action from an earlier session: {:?}", action);
                return;
            }
        }

        match action {
            Action::FilesAdded { source, files } => {
                debug!("{} file(s) added from {:?}", files.len(), source);
                self.previews.add(files);
            }
            Action::FileRemoved(index) => {
                self.previews.remove(index);
            }
            Action::ClassNameChanged(class_name) => self.form.class_name = class_name,
            Action::ThresholdChanged(threshold) => self.form.threshold = threshold,
            Action::AutoplayDelayChanged(delay) => self.form.autoplay_delay = delay,

            Action::SubmissionStarted { total, .. } => {
                self.uploading = Some(UploadProgress { index: 0, total });
            }
            Action::UploadingItem { index, .. } => {
                if let Some(progress) = self.uploading.as_mut() {
                    progress.index = index;
                }
            }
            Action::SubmissionAccepted { id, .. } => {
                info!("Process {} registered", id);
                self.records.insert(id, ProcessRecord::processing());
            }
            Action::SubmissionFailed {
                file_name, error, ..
            } => {
                self.show_notice(
                    NoticeKind::Error,
                    format!("Could not upload {}: {}", file_name, error),
                );
            }
            Action::SubmissionFinished {
                accepted, total, ..
            } => {
                self.uploading = None;
                if accepted == total {
                    self.show_notice(NoticeKind::Info, format!("All {} images were sent.", total));
                } else {
                    self.show_notice(
                        NoticeKind::Error,
                        format!("Sent {} of {} images; {} failed.", accepted, total, total - accepted),
                    );
                }
            }

            Action::NothingToPoll => {
                self.show_notice(NoticeKind::Info, "There are no processes to query.".to_string());
            }
            Action::PollStarted { .. } => self.polling = true,
            Action::StatusUpdated { id, record, .. } => {
                if record.is_complete() {
                    self.results.insert(id.clone(), record.clone());
                }
                self.records.insert(id, record);
            }
            Action::PollFailed { id, error, .. } => {
                self.show_notice(
                    NoticeKind::Error,
                    format!("Could not query process {}: {}", id, error),
                );
            }
            Action::PollFinished { updated, failed, .. } => {
                self.polling = false;
                if failed == 0 {
                    self.show_notice(
                        NoticeKind::Info,
                        format!("Status check completed ({} processes).", updated),
                    );
                } else {
                    self.show_notice(
                        NoticeKind::Error,
                        format!("Status check completed; {} of {} queries failed.", failed, updated + failed),
                    );
                }
            }

            Action::ModalOpened(id) => match self.results.get(&id) {
                Some(record) => self.modal = Modal::open(gallery_images(record)),
                None => warn!("No completed result {} to show", id),
            },
            Action::ModalNext => self.modal.next(),
            Action::ModalPrev => self.modal.prev(),
            Action::AutoplayToggled => self.modal.toggle_autoplay(),
            Action::AutoplayTick => self.modal.tick(),
            Action::ModalClosed => self.modal.close(),

            Action::NoticeDismissed(id) => {
                if self.notice.as_ref().is_some_and(|n| n.id == id) {
                    self.notice = None;
                }
            }
            Action::ClearRequested => self.confirm_clear = true,
            Action::ClearCancelled => self.confirm_clear = false,
            Action::Cleared => self.clear(),
        }
    }

    fn clear(&mut self) {
        info!(
            "Clearing {} pending files and {} processes",
            self.previews.len(),
            self.records.len()
        );
        self.previews.clear();
        self.form = FormState::default();
        self.uploading = None;
        self.polling = false;
        self.records.clear();
        self.results.clear();
        self.modal.close();
        self.notice = None;
        self.confirm_clear = false;
        self.epoch = self.epoch.next();
    }

    fn show_notice(&mut self, kind: NoticeKind, text: String) {
        match kind {
            NoticeKind::Info => info!("{}", text),
            NoticeKind::Error => warn!("{}", text),
        }
        self.next_notice_id += 1;
        self.notice = Some(Notice {
            id: self.next_notice_id,
            kind,
            text,
        });
    }

    /// Release every preview handle; called when the owning view goes away.
    pub fn teardown(&mut self) {
        self.previews.clear();
        self.modal.close();
    }

    /// Validated metadata for the current form, if it is submittable.
    pub fn metadata(&self) -> Option<SubmissionMetadata> {
        SubmissionMetadata::new(self.form.class_name.clone(), self.form.threshold).ok()
    }

    pub fn can_submit(&self) -> bool {
        self.uploading.is_none() && !self.previews.is_empty() && self.metadata().is_some()
    }

    pub fn can_poll(&self) -> bool {
        !self.polling
    }

    /// Snapshot the pending list and mark the batch as running.
    ///
    /// Returns `None` (and changes nothing) while a batch is already running,
    /// when nothing is pending, or when the form is invalid.
    pub fn start_submission(&mut self) -> Option<SubmissionBatch> {
        if !self.can_submit() {
            return None;
        }
        let metadata = self.metadata()?;
        let batch = SubmissionBatch {
            epoch: self.epoch,
            files: self.previews.uploads(),
            metadata,
        };
        self.dispatch(Action::SubmissionStarted {
            epoch: self.epoch,
            total: batch.files.len(),
        });
        Some(batch)
    }

    /// Every known process id, in registration order. With none known the
    /// user gets a notice and no batch is produced.
    pub fn start_poll(&mut self) -> Option<PollBatch> {
        if !self.can_poll() {
            return None;
        }
        if self.records.is_empty() {
            self.dispatch(Action::NothingToPoll);
            return None;
        }
        self.dispatch(Action::PollStarted { epoch: self.epoch });
        Some(PollBatch {
            epoch: self.epoch,
            ids: self.records.keys().cloned().collect(),
        })
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn pending_files(&self) -> &[PendingFile] {
        self.previews.files()
    }

    /// Position of the pending file previewed at `preview_uri`.
    pub fn pending_index(&self, preview_uri: &str) -> Option<usize> {
        self.pending_files()
            .iter()
            .position(|f| f.preview_uri() == preview_uri)
    }

    pub fn allocator(&self) -> &P {
        self.previews.allocator()
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn uploading(&self) -> Option<UploadProgress> {
        self.uploading
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn records(&self) -> &IndexMap<ProcessId, ProcessRecord> {
        &self.records
    }

    pub fn results(&self) -> &IndexMap<ProcessId, ProcessRecord> {
        &self.results
    }

    pub fn result_cards(&self) -> Vec<ResultCard> {
        self.results
            .iter()
            .map(|(id, record)| ResultCard::new(id, record))
            .collect()
    }

    pub fn result_card(&self, id: &ProcessId) -> Option<ResultCard> {
        self.results.get(id).map(|record| ResultCard::new(id, record))
    }

    pub fn modal(&self) -> &Modal {
        &self.modal
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn confirm_clear(&self) -> bool {
        self.confirm_clear
    }
}
