use tracing::{info, warn};
use vision_client::{ImageBackend, ProcessId};

use crate::workbench::{Action, Epoch};

/// Ids to query, captured when the user asks for a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollBatch {
    pub epoch: Epoch,
    pub ids: Vec<ProcessId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub queried: usize,
    pub completed: Vec<ProcessId>,
    pub failed: usize,
}

/// Query the status of every id in the batch, one after another.
///
/// Each response overwrites that id's record; completed ones are also copied
/// into the results by the store. A failed query is reported and skipped.
/// An empty batch makes no calls.
pub async fn poll_all<B: ImageBackend>(
    backend: &B,
    batch: PollBatch,
    mut dispatch: impl FnMut(Action),
) -> PollReport {
    let PollBatch { epoch, ids } = batch;
    let mut report = PollReport::default();

    if ids.is_empty() {
        dispatch(Action::NothingToPoll);
        return report;
    }

    for id in ids {
        report.queried += 1;
        match backend.fetch_status(&id).await {
            Ok(record) => {
                if record.is_complete() {
                    report.completed.push(id.clone());
                }
                dispatch(Action::StatusUpdated { epoch, id, record });
            }
            Err(e) => {
                warn!("Status query for {} failed: {}", id, e);
                report.failed += 1;
                dispatch(Action::PollFailed {
                    epoch,
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Polled {} processes: {} completed, {} failed",
        report.queried,
        report.completed.len(),
        report.failed
    );
    dispatch(Action::PollFinished {
        epoch,
        updated: report.queried - report.failed,
        failed: report.failed,
    });
    report
}
