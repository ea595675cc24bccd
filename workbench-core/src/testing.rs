//! Scripted in-memory backend for workflow tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use vision_client::{
    ApiError, ClassifyResponse, DetectionResponse, Endpoint, ImageBackend, ImageUpload, ProcessId,
    ProcessRecord, ProcessStatus, SubmissionMetadata, SubmitResponse, TrainingPoint,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Submit(String, String, u8),
    Status(String),
    Detect(String),
    Classify(Vec<u8>),
    Training,
}

/// Outcome of one scripted classification.
#[derive(Debug, Clone)]
pub enum Verdict {
    Label(&'static str),
    Blank,
    Fail,
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    accept: bool,
    next_id: u64,
    failing_uploads: BTreeSet<String>,
    id_less_uploads: BTreeSet<String>,
    statuses: BTreeMap<String, ProcessStatus>,
    detection: Option<DetectionResponse>,
    verdicts: VecDeque<Verdict>,
    training: Option<Vec<TrainingPoint>>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    script: RefCell<Script>,
}

fn server_error(endpoint: Endpoint) -> ApiError {
    ApiError::Status {
        endpoint,
        status: 500,
        body: "scripted failure".to_string(),
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.borrow().calls.clone()
    }

    /// Uploads succeed with ids `p-1`, `p-2`, ...
    pub fn accept_all(&self) {
        self.script.borrow_mut().accept = true;
    }

    pub fn fail_submission(&self, file_name: &str) {
        self.script.borrow_mut().failing_uploads.insert(file_name.to_string());
    }

    pub fn omit_id_for(&self, file_name: &str) {
        self.script.borrow_mut().id_less_uploads.insert(file_name.to_string());
    }

    /// Ids without a scripted status fail their query.
    pub fn set_status(&self, id: &str, status: ProcessStatus) {
        self.script.borrow_mut().statuses.insert(id.to_string(), status);
    }

    pub fn set_detection(&self, detection: DetectionResponse) {
        self.script.borrow_mut().detection = Some(detection);
    }

    /// Verdicts are consumed in call order; an exhausted queue fails.
    pub fn push_verdicts(&self, verdicts: impl IntoIterator<Item = Verdict>) {
        self.script.borrow_mut().verdicts.extend(verdicts);
    }

    pub fn set_training(&self, points: Vec<TrainingPoint>) {
        self.script.borrow_mut().training = Some(points);
    }
}

impl ImageBackend for ScriptedBackend {
    async fn submit_image(
        &self,
        image: &ImageUpload,
        metadata: &SubmissionMetadata,
    ) -> Result<SubmitResponse, ApiError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::Submit(
            image.file_name.clone(),
            metadata.class_name().to_string(),
            metadata.threshold_value(),
        ));
        if !script.accept || script.failing_uploads.contains(&image.file_name) {
            return Err(server_error(Endpoint::SubmitImage));
        }
        if script.id_less_uploads.contains(&image.file_name) {
            return Ok(SubmitResponse { proceso_id: None });
        }
        script.next_id += 1;
        Ok(SubmitResponse {
            proceso_id: Some(ProcessId::new(format!("p-{}", script.next_id))),
        })
    }

    async fn fetch_status(&self, id: &ProcessId) -> Result<ProcessRecord, ApiError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::Status(id.as_str().to_string()));
        let status = script
            .statuses
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| server_error(Endpoint::Status))?;
        let mut record = ProcessRecord::processing();
        record.status = status;
        Ok(record)
    }

    async fn detect_regions(&self, image: &ImageUpload) -> Result<DetectionResponse, ApiError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::Detect(image.file_name.clone()));
        script
            .detection
            .clone()
            .ok_or_else(|| server_error(Endpoint::DetectRegions))
    }

    async fn classify_region(&self, region: Vec<u8>) -> Result<ClassifyResponse, ApiError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::Classify(region));
        match script.verdicts.pop_front() {
            Some(Verdict::Label(label)) => Ok(ClassifyResponse {
                prediccion_clase: Some(label.to_string()),
            }),
            Some(Verdict::Blank) => Ok(ClassifyResponse {
                prediccion_clase: None,
            }),
            Some(Verdict::Fail) | None => Err(server_error(Endpoint::ClassifyRegion)),
        }
    }

    async fn training_points(&self) -> Result<Vec<TrainingPoint>, ApiError> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::Training);
        script
            .training
            .clone()
            .ok_or_else(|| server_error(Endpoint::TrainingData))
    }
}
