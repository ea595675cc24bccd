use std::time::Duration;

use vision_client::{data_uri, ProcessId, ProcessRecord};

/// Artifacts are PNGs.
const ARTIFACT_MIME: &str = "image/png";

/// One viewable artifact of a completed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub source_uri: String,
    pub label: String,
}

/// Present artifacts of a record, in the fixed key order. Absent keys are skipped.
pub fn gallery_images(record: &ProcessRecord) -> Vec<GalleryImage> {
    record
        .present_artifacts()
        .map(|(key, payload)| GalleryImage {
            source_uri: data_uri(ARTIFACT_MIME, payload),
            label: key.label(),
        })
        .collect()
}

/// Summary shown for one completed record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCard {
    pub id: ProcessId,
    pub status: String,
    pub dimensions: Option<String>,
    pub compactness_factor: Option<String>,
    pub unique_color_int: Option<i64>,
    pub thumbnails: Vec<GalleryImage>,
}

impl ResultCard {
    pub fn new(id: &ProcessId, record: &ProcessRecord) -> Self {
        Self {
            id: id.clone(),
            status: record.status.to_string(),
            dimensions: record
                .dimensions()
                .map(|(h, w, c)| format!("{} x {} x {}", h, w, c)),
            compactness_factor: record.compactness_factor().map(|v| format!("{:.2}", v)),
            unique_color_int: record.unique_color_int(),
            thumbnails: gallery_images(record),
        }
    }
}

/// Delay between automatic advances of the modal viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoplayDelay(Duration);

impl AutoplayDelay {
    pub const DEFAULT: Self = Self(Duration::from_millis(1000));
    pub const MIN: Self = Self(Duration::from_millis(100));

    /// Values below [`AutoplayDelay::MIN`] are raised to it.
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms).max(Self::MIN.0))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }
}

impl Default for AutoplayDelay {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Lightbox over one record's artifacts.
///
/// Navigation wraps in both directions. Autoplay only advances while the
/// modal is open; closing discards the image set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Modal {
    #[default]
    Closed,
    Open {
        images: Vec<GalleryImage>,
        index: usize,
        autoplay: bool,
    },
}

impl Modal {
    /// Open at the first image with autoplay off. An empty set stays closed.
    pub fn open(images: Vec<GalleryImage>) -> Self {
        if images.is_empty() {
            return Self::Closed;
        }
        Self::Open {
            images,
            index: 0,
            autoplay: false,
        }
    }

    pub fn close(&mut self) {
        *self = Self::Closed;
    }

    pub fn next(&mut self) {
        if let Self::Open { images, index, .. } = self {
            *index = (*index + 1) % images.len();
        }
    }

    pub fn prev(&mut self) {
        if let Self::Open { images, index, .. } = self {
            *index = (*index + images.len() - 1) % images.len();
        }
    }

    pub fn toggle_autoplay(&mut self) {
        if let Self::Open { autoplay, .. } = self {
            *autoplay = !*autoplay;
        }
    }

    /// Timer callback: advance only if autoplay is still on.
    pub fn tick(&mut self) {
        if self.autoplay_active() {
            self.next();
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// True exactly when an autoplay timer should be armed.
    pub fn autoplay_active(&self) -> bool {
        matches!(self, Self::Open { autoplay: true, .. })
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Open { index, .. } => Some(*index),
            Self::Closed => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Open { images, .. } => images.len(),
            Self::Closed => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current(&self) -> Option<&GalleryImage> {
        match self {
            Self::Open { images, index, .. } => images.get(*index),
            Self::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision_client::ArtifactKey;

    fn record_with(keys: &[ArtifactKey]) -> ProcessRecord {
        let mut record = ProcessRecord::processing();
        for key in keys {
            record.artifacts.insert(*key, format!("{}-payload", key.stem()));
        }
        record
    }

    fn images(n: usize) -> Vec<GalleryImage> {
        (0..n)
            .map(|i| GalleryImage {
                source_uri: format!("data:{}", i),
                label: format!("Image {}", i),
            })
            .collect()
    }

    #[test]
    fn test_gallery_skips_absent_keys_in_fixed_order() {
        // Inserted out of order on purpose
        let record = record_with(&[
            ArtifactKey::BlueMasked,
            ArtifactKey::Grayscale,
            ArtifactKey::KmeansSegmented,
        ]);

        let gallery = gallery_images(&record);

        let labels: Vec<&str> = gallery.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Grayscale", "Kmeans Segmented", "B Masked"]);
        assert_eq!(gallery[0].source_uri, "data:image/png;base64,grayscale-payload");
    }

    #[test]
    fn test_next_wraps_around() {
        let mut modal = Modal::open(images(4));
        for _ in 0..4 {
            modal.next();
        }
        assert_eq!(modal.index(), Some(0));
    }

    #[test]
    fn test_prev_from_first_goes_to_last() {
        let mut modal = Modal::open(images(5));
        modal.prev();
        assert_eq!(modal.index(), Some(4));
        modal.next();
        assert_eq!(modal.index(), Some(0));
    }

    #[test]
    fn test_open_resets_index_and_autoplay() {
        let modal = Modal::open(images(3));
        assert_eq!(modal.index(), Some(0));
        assert!(!modal.autoplay_active());
        assert_eq!(modal.current().map(|g| g.label.as_str()), Some("Image 0"));
    }

    #[test]
    fn test_open_with_no_images_stays_closed() {
        let modal = Modal::open(Vec::new());
        assert!(!modal.is_open());
        assert!(modal.current().is_none());
    }

    #[test]
    fn test_tick_advances_only_with_autoplay() {
        let mut modal = Modal::open(images(3));
        modal.tick();
        assert_eq!(modal.index(), Some(0));

        modal.toggle_autoplay();
        assert!(modal.autoplay_active());
        modal.tick();
        modal.tick();
        modal.tick();
        assert_eq!(modal.index(), Some(0));
        modal.tick();
        assert_eq!(modal.index(), Some(1));

        modal.toggle_autoplay();
        modal.tick();
        assert_eq!(modal.index(), Some(1));
    }

    #[test]
    fn test_close_discards_images_and_stops_autoplay() {
        let mut modal = Modal::open(images(2));
        modal.toggle_autoplay();
        modal.close();

        assert!(!modal.is_open());
        assert!(!modal.autoplay_active());
        assert_eq!(modal.len(), 0);
        modal.tick();
        modal.next();
        assert_eq!(modal, Modal::Closed);
    }

    #[test]
    fn test_autoplay_delay_floor() {
        assert_eq!(AutoplayDelay::default().as_millis(), 1000);
        assert_eq!(AutoplayDelay::from_millis(20), AutoplayDelay::MIN);
        assert_eq!(AutoplayDelay::from_millis(2500).as_millis(), 2500);
    }

    #[test]
    fn test_result_card_summary() {
        let mut record = record_with(&[ArtifactKey::Binary]);
        record.metrics.insert("dimensions_H".into(), 480.0);
        record.metrics.insert("dimensions_W".into(), 640.0);
        record.metrics.insert("dimensions_C".into(), 3.0);
        record.metrics.insert("compactness_factor".into(), 0.756);

        let card = ResultCard::new(&ProcessId::new("p-7"), &record);

        assert_eq!(card.dimensions.as_deref(), Some("480 x 640 x 3"));
        assert_eq!(card.compactness_factor.as_deref(), Some("0.76"));
        assert_eq!(card.unique_color_int, None);
        assert_eq!(card.thumbnails.len(), 1);
    }
}
