//! Detect-then-classify workflow behind the region classifier view.

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use vision_client::{
    decode_base64_payload, ApiError, ImageBackend, ImageUpload, ProcessId, Region,
};

use crate::annotate::BoxAnnotation;
use crate::preview::{PreviewAllocator, PreviewManager};

/// Label used when a region could not be classified.
pub const UNKNOWN_CLASS: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRegion {
    pub region: Region,
    pub label: String,
}

/// Everything learned about one image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionAnalysis {
    pub process_id: Option<ProcessId>,
    pub regions: Vec<ClassifiedRegion>,
    /// Count per label, in first-seen order.
    pub class_counts: IndexMap<String, usize>,
}

impl RegionAnalysis {
    pub fn annotations(&self) -> Vec<BoxAnnotation> {
        self.regions
            .iter()
            .map(|r| BoxAnnotation::new(&r.region.bbox, r.label.clone()))
            .collect()
    }
}

/// Detect regions in `image`, then classify each one in detection order.
///
/// Only the detection call can fail the whole run. A region whose payload
/// does not decode, whose classification fails, or which comes back without
/// a label is counted as [`UNKNOWN_CLASS`].
pub async fn analyze_image<B: ImageBackend>(
    backend: &B,
    image: &ImageUpload,
) -> Result<RegionAnalysis, ApiError> {
    let detection = backend.detect_regions(image).await?;
    let mut analysis = RegionAnalysis {
        process_id: detection.proceso_id,
        ..Default::default()
    };

    for (i, region) in detection.objetos_detectados.detalles.into_iter().enumerate() {
        let label = match classify(backend, &region).await {
            Ok(Some(label)) => label,
            Ok(None) => {
                debug!("Region {} came back without a class", i);
                UNKNOWN_CLASS.to_string()
            }
            Err(e) => {
                warn!("Classification of region {} failed: {}", i, e);
                UNKNOWN_CLASS.to_string()
            }
        };
        *analysis.class_counts.entry(label.clone()).or_insert(0) += 1;
        analysis.regions.push(ClassifiedRegion { region, label });
    }

    info!(
        "Classified {} regions into {} classes",
        analysis.regions.len(),
        analysis.class_counts.len()
    );
    Ok(analysis)
}

async fn classify<B: ImageBackend>(
    backend: &B,
    region: &Region,
) -> Result<Option<String>, ApiError> {
    let bytes = decode_base64_payload(&region.region_image_b64)?;
    let response = backend.classify_region(bytes).await?;
    Ok(response.label().map(str::to_string))
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionState {
    Empty,
    Analyzing,
    Ready(RegionAnalysis),
    Failed(String),
}

/// Identifies one analysis run; results from older runs are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunId(u64);

/// View state for the region classifier: the chosen image (with its preview)
/// and the latest analysis.
pub struct RegionSession<P: PreviewAllocator> {
    image: PreviewManager<P>,
    state: RegionState,
    run: u64,
}

impl<P: PreviewAllocator> RegionSession<P> {
    pub fn new(allocator: P) -> Self {
        Self {
            image: PreviewManager::new(allocator),
            state: RegionState::Empty,
            run: 0,
        }
    }

    /// Replace the image and drop all prior region and class state before
    /// any request for the new image is issued.
    pub fn begin(&mut self, image: ImageUpload) -> RunId {
        self.image.clear();
        self.image.add([image]);
        self.run += 1;
        self.state = RegionState::Analyzing;
        RunId(self.run)
    }

    /// Store the outcome of `run`. Returns false if a newer run superseded it.
    pub fn finish(&mut self, run: RunId, outcome: Result<RegionAnalysis, ApiError>) -> bool {
        if run.0 != self.run {
            debug!("Discarding region analysis from superseded run {}", run.0);
            return false;
        }
        self.state = match outcome {
            Ok(analysis) => RegionState::Ready(analysis),
            Err(e) => {
                warn!("Region detection failed: {}", e);
                RegionState::Failed(e.to_string())
            }
        };
        true
    }

    pub fn image(&self) -> Option<&ImageUpload> {
        self.image.files().first().map(|f| &f.image)
    }

    pub fn preview_uri(&self) -> Option<&str> {
        self.image.files().first().map(|f| f.preview_uri())
    }

    pub fn state(&self) -> &RegionState {
        &self.state
    }

    pub fn analysis(&self) -> Option<&RegionAnalysis> {
        match &self.state {
            RegionState::Ready(analysis) => Some(analysis),
            _ => None,
        }
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.state, RegionState::Analyzing)
    }

    pub fn teardown(&mut self) {
        self.image.clear();
        self.state = RegionState::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::InMemoryPreviews;
    use crate::testing::{Call, ScriptedBackend, Verdict};
    use vision_client::{BoundingBox, DetectedObjects, DetectionResponse};

    fn region(x1: f64, payload: &str) -> Region {
        Region {
            bbox: BoundingBox::from([x1, 0.0, x1 + 10.0, 10.0]),
            region_image_b64: payload.to_string(),
        }
    }

    fn detection(regions: Vec<Region>) -> DetectionResponse {
        DetectionResponse {
            proceso_id: Some(ProcessId::new("det-1")),
            objetos_detectados: DetectedObjects {
                regiones: regions.len(),
                detalles: regions,
            },
        }
    }

    fn photo() -> ImageUpload {
        ImageUpload::new("fruit.jpg", "image/jpeg", vec![1u8, 2, 3])
    }

    #[tokio::test]
    async fn test_regions_are_classified_in_detection_order() {
        let backend = ScriptedBackend::new();
        // "AQI=" -> [1, 2], "Aw==" -> [3]
        backend.set_detection(detection(vec![
            region(0.0, "AQI="),
            region(20.0, "data:image/jpeg;base64,Aw=="),
            region(40.0, "AQI="),
        ]));
        backend.push_verdicts([
            Verdict::Label("manzana"),
            Verdict::Label("pera"),
            Verdict::Label("manzana"),
        ]);

        let analysis = analyze_image(&backend, &photo()).await.unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                Call::Detect("fruit.jpg".into()),
                Call::Classify(vec![1, 2]),
                Call::Classify(vec![3]),
                Call::Classify(vec![1, 2]),
            ]
        );
        let counts: Vec<(&str, usize)> = analysis
            .class_counts
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(counts, vec![("manzana", 2), ("pera", 1)]);
        assert_eq!(analysis.process_id, Some(ProcessId::new("det-1")));
        assert_eq!(analysis.annotations()[1].label, "pera");
        assert_eq!(analysis.annotations()[1].label_x, 26.0);
    }

    #[tokio::test]
    async fn test_failed_classification_is_unknown() {
        let backend = ScriptedBackend::new();
        backend.set_detection(detection(vec![
            region(0.0, "AQI="),
            region(10.0, "!!not base64!!"),
            region(20.0, "AQI="),
            region(30.0, "AQI="),
        ]));
        backend.push_verdicts([Verdict::Fail, Verdict::Blank, Verdict::Label("pera")]);

        let analysis = analyze_image(&backend, &photo()).await.unwrap();

        let labels: Vec<&str> = analysis.regions.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["unknown", "unknown", "unknown", "pera"]);
        assert_eq!(analysis.class_counts[UNKNOWN_CLASS], 3);
        // The undecodable payload never reaches the classifier
        assert_eq!(backend.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_detection_failure_fails_the_run() {
        let backend = ScriptedBackend::new();
        assert!(analyze_image(&backend, &photo()).await.is_err());
        assert_eq!(backend.calls(), vec![Call::Detect("fruit.jpg".into())]);
    }

    #[test]
    fn test_new_image_replaces_prior_state() {
        let previews = InMemoryPreviews::new();
        let mut session = RegionSession::new(previews.clone());

        let first = session.begin(photo());
        assert!(session.finish(first, Ok(RegionAnalysis::default())));
        assert!(session.analysis().is_some());

        let second = session.begin(ImageUpload::new("b.jpg", "image/jpeg", vec![9u8]));
        assert!(session.is_analyzing());
        assert!(session.analysis().is_none());
        assert_eq!(previews.live_count(), 1);
        assert_eq!(session.image().map(|i| i.file_name.as_str()), Some("b.jpg"));

        // A late result for the first image is ignored
        assert!(!session.finish(first, Ok(RegionAnalysis::default())));
        assert!(session.is_analyzing());

        assert!(session.finish(second, Ok(RegionAnalysis::default())));
        session.teardown();
        assert_eq!(previews.live_count(), 0);
        assert_eq!(session.state(), &RegionState::Empty);
    }
}
