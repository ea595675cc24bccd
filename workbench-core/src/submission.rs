use tracing::{info, warn};
use vision_client::{ImageBackend, ImageUpload, ProcessId, SubmissionMetadata};

use crate::workbench::{Action, Epoch};

/// Snapshot of the pending list taken when the user starts a submission.
#[derive(Debug, Clone)]
pub struct SubmissionBatch {
    pub epoch: Epoch,
    pub files: Vec<ImageUpload>,
    pub metadata: SubmissionMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReport {
    pub attempted: usize,
    pub accepted: Vec<ProcessId>,
    pub failed: usize,
}

/// Upload every file of the batch, one at a time and in list order.
///
/// Each upload is awaited before the next starts. A failed item is reported
/// through `dispatch` and the loop moves on; it never aborts the batch.
pub async fn submit_all<B: ImageBackend>(
    backend: &B,
    batch: SubmissionBatch,
    mut dispatch: impl FnMut(Action),
) -> SubmissionReport {
    let SubmissionBatch {
        epoch,
        files,
        metadata,
    } = batch;
    let total = files.len();
    let mut report = SubmissionReport::default();

    for (index, file) in files.iter().enumerate() {
        dispatch(Action::UploadingItem { epoch, index });
        report.attempted += 1;

        let error = match backend.submit_image(file, &metadata).await {
            Ok(response) => match response.accepted_id() {
                Some(id) => {
                    info!("{} accepted as process {} ({}/{})", file.file_name, id, index + 1, total);
                    report.accepted.push(id.clone());
                    dispatch(Action::SubmissionAccepted {
                        epoch,
                        id: id.clone(),
                    });
                    continue;
                }
                None => "backend returned no proceso_id".to_string(),
            },
            Err(e) => e.to_string(),
        };

        warn!("Upload of {} failed: {}", file.file_name, error);
        report.failed += 1;
        dispatch(Action::SubmissionFailed {
            epoch,
            index,
            file_name: file.file_name.clone(),
            error,
        });
    }

    dispatch(Action::SubmissionFinished {
        epoch,
        accepted: report.accepted.len(),
        total,
    });
    report
}
