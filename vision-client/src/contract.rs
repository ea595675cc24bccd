//! Typed request and response shapes for the image-processing backend.
//!
//! The backend answers with loosely structured JSON. Everything that crosses
//! the wire is decoded here into explicit types so that a schema mismatch is
//! reported as a [`ContractError`] instead of surfacing later as a missing
//! field in the UI.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ContractError;

/// Status assigned locally to a submission the backend just accepted.
pub const STATUS_PROCESSING: &str = "procesando";

/// Completion sentinel returned by `/estado/{id}`.
pub const STATUS_COMPLETED: &str = "completado";

/// Suffix shared by every base64 image field in a status record.
pub const IMAGE_FIELD_SUFFIX: &str = "_image_b64";

/// Correlation identifier issued by the backend for one processing job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binary payload of one image file, shared cheaply between the pending list and in-flight uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
}

impl ImageUpload {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Per-file metadata sent alongside every submitted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionMetadata {
    class_name: String,
    threshold_value: u8,
}

impl SubmissionMetadata {
    /// Class name must contain a non-whitespace character; threshold must fit in 0..=255.
    pub fn new(class_name: impl Into<String>, threshold: i64) -> Result<Self, ContractError> {
        let class_name = class_name.into();
        if class_name.trim().is_empty() {
            return Err(ContractError::BlankClassName);
        }
        let threshold_value =
            u8::try_from(threshold).map_err(|_| ContractError::ThresholdOutOfRange(threshold))?;

        Ok(Self {
            class_name,
            threshold_value,
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn threshold_value(&self) -> u8 {
        self.threshold_value
    }

    /// Body of the multipart `metadata` field.
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "class_name": self.class_name,
            "threshold_value": self.threshold_value,
        })
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub proceso_id: Option<ProcessId>,
}

impl SubmitResponse {
    /// The correlation id, if the backend actually issued one.
    pub fn accepted_id(&self) -> Option<&ProcessId> {
        self.proceso_id.as_ref().filter(|id| !id.as_str().is_empty())
    }
}

/// Backend job status. Unknown values are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessStatus {
    Processing,
    Completed,
    Other(String),
}

impl ProcessStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Processing => STATUS_PROCESSING,
            Self::Completed => STATUS_COMPLETED,
            Self::Other(status) => status,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<String> for ProcessStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            STATUS_PROCESSING => Self::Processing,
            STATUS_COMPLETED => Self::Completed,
            _ => Self::Other(status),
        }
    }
}

impl From<ProcessStatus> for String {
    fn from(status: ProcessStatus) -> Self {
        match status {
            ProcessStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The eight image artifacts a completed record may carry, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKey {
    Grayscale,
    MedianFiltered,
    Binary,
    KmeansSegmented,
    InvertedBinary,
    RedMasked,
    GreenMasked,
    BlueMasked,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 8] = [
        Self::Grayscale,
        Self::MedianFiltered,
        Self::Binary,
        Self::KmeansSegmented,
        Self::InvertedBinary,
        Self::RedMasked,
        Self::GreenMasked,
        Self::BlueMasked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale_image_b64",
            Self::MedianFiltered => "median_filtered_image_b64",
            Self::Binary => "binary_image_b64",
            Self::KmeansSegmented => "kmeans_segmented_image_b64",
            Self::InvertedBinary => "inverted_binary_image_b64",
            Self::RedMasked => "R_masked_image_b64",
            Self::GreenMasked => "G_masked_image_b64",
            Self::BlueMasked => "B_masked_image_b64",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Human-readable caption, e.g. `Kmeans Segmented`.
    pub fn label(&self) -> String {
        artifact_label(self.as_str())
    }

    /// Short name without the `_image_b64` suffix, used for file names.
    pub fn stem(&self) -> &'static str {
        let key = self.as_str();
        key.strip_suffix(IMAGE_FIELD_SUFFIX).unwrap_or(key)
    }
}

/// Derive a caption from an artifact field name.
///
/// Strips a trailing `_image_b64`, turns every underscore into a space and
/// uppercases the first letter of each whitespace-delimited word. The rest of
/// each word is left untouched.
pub fn artifact_label(key: &str) -> String {
    let stem = key.strip_suffix(IMAGE_FIELD_SUFFIX).unwrap_or(key);

    let mut label = String::with_capacity(stem.len());
    let mut word_start = true;
    for c in stem.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_whitespace() {
            label.push(c);
            word_start = true;
        } else if word_start {
            label.extend(c.to_uppercase());
            word_start = false;
        } else {
            label.push(c);
        }
    }
    label
}

/// One job as last reported by `/estado/{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub status: ProcessStatus,
    /// Every numeric field of the response (dimensions, compactness, color summary, ...).
    pub metrics: BTreeMap<String, f64>,
    /// Known image artifacts with a non-empty payload.
    pub artifacts: BTreeMap<ArtifactKey, String>,
    /// Fields that are neither numeric nor known artifacts, kept verbatim.
    pub extra: Map<String, Value>,
}

impl ProcessRecord {
    /// Placeholder registered when a submission is accepted.
    pub fn processing() -> Self {
        Self {
            status: ProcessStatus::Processing,
            metrics: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn from_json_str(body: &str) -> Result<Self, ContractError> {
        Self::from_json(serde_json::from_str(body)?)
    }

    pub fn from_json(value: Value) -> Result<Self, ContractError> {
        let Value::Object(mut fields) = value else {
            return Err(ContractError::Schema("status record is not a JSON object".to_string()));
        };

        let status = match fields.remove("status") {
            Some(Value::String(status)) => ProcessStatus::from(status),
            Some(other) => {
                return Err(ContractError::Schema(format!(
                    "`status` must be a string, got {other}"
                )))
            }
            None => return Err(ContractError::Schema("missing `status`".to_string())),
        };

        let mut record = Self {
            status,
            ..Self::processing()
        };

        for (name, value) in fields {
            if let Some(key) = ArtifactKey::from_key(&name) {
                match value {
                    Value::String(payload) if !payload.is_empty() => {
                        record.artifacts.insert(key, payload);
                    }
                    Value::String(_) | Value::Null => {}
                    other => {
                        return Err(ContractError::Schema(format!(
                            "artifact `{name}` must be a base64 string, got {other}"
                        )))
                    }
                }
                continue;
            }

            match value.as_f64() {
                Some(number) if value.is_number() => {
                    record.metrics.insert(name, number);
                }
                _ => {
                    record.extra.insert(name, value);
                }
            }
        }

        Ok(record)
    }

    /// Flatten back into the backend's shape.
    pub fn to_json(&self) -> Value {
        let mut fields = self.extra.clone();
        fields.insert("status".to_string(), Value::String(self.status.as_str().to_string()));
        for (name, value) in &self.metrics {
            if let Some(number) = serde_json::Number::from_f64(*value) {
                fields.insert(name.clone(), Value::Number(number));
            }
        }
        for (key, payload) in &self.artifacts {
            fields.insert(key.as_str().to_string(), Value::String(payload.clone()));
        }
        Value::Object(fields)
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Height x width x channels of the analysed image.
    pub fn dimensions(&self) -> Option<(u64, u64, u64)> {
        let dim = |name: &str| self.metric(name).filter(|v| *v >= 0.0).map(|v| v as u64);
        Some((dim("dimensions_H")?, dim("dimensions_W")?, dim("dimensions_C")?))
    }

    pub fn compactness_factor(&self) -> Option<f64> {
        self.metric("compactness_factor")
    }

    pub fn unique_color_int(&self) -> Option<i64> {
        self.metric("unique_color_int").map(|v| v as i64)
    }

    pub fn artifact(&self, key: ArtifactKey) -> Option<&str> {
        self.artifacts.get(&key).map(String::as_str)
    }

    /// Present artifacts in the fixed display order.
    pub fn present_artifacts(&self) -> impl Iterator<Item = (ArtifactKey, &str)> {
        self.artifacts.iter().map(|(key, payload)| (*key, payload.as_str()))
    }
}

/// Pixel-space box as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bbox: BoundingBox,
    pub region_image_b64: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectedObjects {
    #[serde(default)]
    pub regiones: usize,
    #[serde(default)]
    pub detalles: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub proceso_id: Option<ProcessId>,
    pub objetos_detectados: DetectedObjects,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub prediccion_clase: Option<String>,
}

impl ClassifyResponse {
    pub fn label(&self) -> Option<&str> {
        self.prediccion_clase
            .as_deref()
            .filter(|label| !label.trim().is_empty())
    }
}

/// One training sample in feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPoint {
    pub compactness_factor: f64,
    pub relative_area_bbox_percent: f64,
    pub unique_color_int: f64,
    pub clase: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainingResponse {
    pub puntos: Vec<TrainingPoint>,
}

/// Decode a base64 payload, accepting either the bare payload or a `data:` URL.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let body = match payload.split_once(',') {
        Some((_, body)) => body,
        None => payload,
    };
    general_purpose::STANDARD.decode(body.trim())
}

/// `data:` URI suitable for an `<img src>`. A payload that already is one is kept as is.
pub fn data_uri(mime_type: &str, payload: &str) -> String {
    if payload.starts_with("data:") {
        return payload.to_string();
    }
    format!("data:{};base64,{}", mime_type, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_labels() {
        assert_eq!(artifact_label("R_masked_image_b64"), "R Masked");
        assert_eq!(artifact_label("inverted_binary_image_b64"), "Inverted Binary");
        assert_eq!(artifact_label("kmeans_segmented_image_b64"), "Kmeans Segmented");
        assert_eq!(ArtifactKey::Grayscale.label(), "Grayscale");
    }

    #[test]
    fn test_artifact_label_only_strips_trailing_suffix() {
        assert_eq!(artifact_label("plain_key"), "Plain Key");
        assert_eq!(artifact_label("a__b"), "A  B");
        assert_eq!(artifact_label("mixedCase_word"), "MixedCase Word");
    }

    #[test]
    fn test_artifact_keys_are_in_display_order() {
        let keys: Vec<&str> = ArtifactKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "grayscale_image_b64",
                "median_filtered_image_b64",
                "binary_image_b64",
                "kmeans_segmented_image_b64",
                "inverted_binary_image_b64",
                "R_masked_image_b64",
                "G_masked_image_b64",
                "B_masked_image_b64",
            ]
        );
        assert_eq!(ArtifactKey::RedMasked.stem(), "R_masked");
    }

    #[test]
    fn test_decode_completed_record() {
        let json = r#"{
            "status": "completado",
            "dimensions_H": 480,
            "dimensions_W": 640,
            "dimensions_C": 3,
            "compactness_factor": 0.7312,
            "unique_color_int": 8421504,
            "grayscale_image_b64": "AAAA",
            "binary_image_b64": "",
            "B_masked_image_b64": "BBBB",
            "filename": "apple.png"
        }"#;

        let record = ProcessRecord::from_json_str(json).unwrap();

        assert!(record.is_complete());
        assert_eq!(record.dimensions(), Some((480, 640, 3)));
        assert_eq!(record.compactness_factor(), Some(0.7312));
        assert_eq!(record.unique_color_int(), Some(8421504));
        assert_eq!(record.artifact(ArtifactKey::Grayscale), Some("AAAA"));
        // Empty payloads count as absent
        assert_eq!(record.artifact(ArtifactKey::Binary), None);
        let present: Vec<ArtifactKey> = record.present_artifacts().map(|(k, _)| k).collect();
        assert_eq!(present, vec![ArtifactKey::Grayscale, ArtifactKey::BlueMasked]);
        assert_eq!(record.extra.get("filename"), Some(&Value::String("apple.png".into())));
    }

    #[test]
    fn test_decode_pending_and_unknown_status() {
        let record = ProcessRecord::from_json_str(r#"{"status": "procesando"}"#).unwrap();
        assert_eq!(record.status, ProcessStatus::Processing);

        let record = ProcessRecord::from_json_str(r#"{"status": "error"}"#).unwrap();
        assert_eq!(record.status, ProcessStatus::Other("error".into()));
        assert!(!record.is_complete());
        assert_eq!(record.to_json()["status"], "error");
    }

    #[test]
    fn test_decode_rejects_schema_mismatch() {
        assert!(matches!(
            ProcessRecord::from_json_str(r#"{"detail": "not found"}"#),
            Err(ContractError::Schema(_))
        ));
        assert!(matches!(
            ProcessRecord::from_json_str(r#"{"status": 3}"#),
            Err(ContractError::Schema(_))
        ));
        assert!(matches!(
            ProcessRecord::from_json_str(r#"{"status": "completado", "grayscale_image_b64": 12}"#),
            Err(ContractError::Schema(_))
        ));
        assert!(matches!(
            ProcessRecord::from_json_str("[1, 2]"),
            Err(ContractError::Schema(_))
        ));
        assert!(matches!(
            ProcessRecord::from_json_str("<html>"),
            Err(ContractError::Json(_))
        ));
    }

    #[test]
    fn test_submission_metadata_validation() {
        let metadata = SubmissionMetadata::new("manzana", 220).unwrap();
        let json: Value = serde_json::from_str(&metadata.to_json()).unwrap();
        assert_eq!(json, serde_json::json!({"class_name": "manzana", "threshold_value": 220}));

        assert!(matches!(
            SubmissionMetadata::new("   ", 10),
            Err(ContractError::BlankClassName)
        ));
        assert!(matches!(
            SubmissionMetadata::new("pera", 256),
            Err(ContractError::ThresholdOutOfRange(256))
        ));
        assert!(matches!(
            SubmissionMetadata::new("pera", -1),
            Err(ContractError::ThresholdOutOfRange(-1))
        ));
        assert!(SubmissionMetadata::new("pera", 0).is_ok());
        assert!(SubmissionMetadata::new("pera", 255).is_ok());
    }

    #[test]
    fn test_submit_response_without_id() {
        let response: SubmitResponse = serde_json::from_str(r#"{"detail": "bad image"}"#).unwrap();
        assert_eq!(response.accepted_id(), None);

        let response: SubmitResponse = serde_json::from_str(r#"{"proceso_id": ""}"#).unwrap();
        assert_eq!(response.accepted_id(), None);

        let response: SubmitResponse = serde_json::from_str(r#"{"proceso_id": "p-1"}"#).unwrap();
        assert_eq!(response.accepted_id(), Some(&ProcessId::new("p-1")));
    }

    #[test]
    fn test_decode_detection_response() {
        let json = r#"{
            "proceso_id": "det-9",
            "objetos_detectados": {
                "regiones": 2,
                "detalles": [
                    {"bbox": [10, 20, 110, 220], "region_image_b64": "AAAA"},
                    {"bbox": [5.5, 6, 7, 8], "region_image_b64": "BBBB"}
                ]
            }
        }"#;

        let response: DetectionResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.objetos_detectados.regiones, 2);
        let first = &response.objetos_detectados.detalles[0];
        assert_eq!(first.bbox.width(), 100.0);
        assert_eq!(first.bbox.height(), 200.0);
        assert_eq!(response.objetos_detectados.detalles[1].bbox.x1, 5.5);
    }

    #[test]
    fn test_classify_response_label() {
        let response: ClassifyResponse = serde_json::from_str(r#"{"prediccion_clase": "pera"}"#).unwrap();
        assert_eq!(response.label(), Some("pera"));

        let response: ClassifyResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(response.label(), None);
    }

    #[test]
    fn test_decode_base64_payload_accepts_data_urls() {
        assert_eq!(decode_base64_payload("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_payload("data:image/jpeg;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_base64_payload("***").is_err());
    }

    #[test]
    fn test_data_uri_keeps_existing_uri() {
        assert_eq!(data_uri("image/png", "AAAA"), "data:image/png;base64,AAAA");
        assert_eq!(
            data_uri("image/png", "data:image/jpeg;base64,AAAA"),
            "data:image/jpeg;base64,AAAA"
        );
    }
}
