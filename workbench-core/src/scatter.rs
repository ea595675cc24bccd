//! Training data shaped for the 3D feature-space scatter.

use indexmap::IndexMap;
use vision_client::TrainingPoint;

pub const AXIS_TITLES: [&str; 3] = [
    "Compactness Factor",
    "Relative Area (%)",
    "Unique Color (RGB combined)",
];

const PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
    "#F8B88B", "#ABEBC6",
];

/// Colour of the `index`-th class; cycles through a fixed palette.
pub fn series_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

pub type Vec3 = [f64; 3];

fn position(point: &TrainingPoint) -> Vec3 {
    [
        point.compactness_factor,
        point.relative_area_bbox_percent,
        point.unique_color_int,
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotPoint {
    pub position: Vec3,
    pub hover: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub class: String,
    pub color: &'static str,
    pub points: Vec<PlotPoint>,
}

/// Marker at the mean of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub class: String,
    pub color: &'static str,
    pub position: Vec3,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPlot {
    pub series: Vec<Series>,
    pub prototypes: Vec<Prototype>,
    pub bounds: FeatureBounds,
}

impl TrainingPlot {
    /// Group points by class (first-appearance order) and add one prototype per class.
    pub fn from_points(points: &[TrainingPoint]) -> Self {
        let mut groups: IndexMap<&str, Vec<&TrainingPoint>> = IndexMap::new();
        for point in points {
            groups.entry(point.clase.as_str()).or_default().push(point);
        }

        let mut series = Vec::with_capacity(groups.len());
        let mut prototypes = Vec::with_capacity(groups.len());
        for (i, (class, members)) in groups.iter().enumerate() {
            let color = series_color(i);
            series.push(Series {
                class: class.to_string(),
                color,
                points: members
                    .iter()
                    .map(|p| PlotPoint {
                        position: position(p),
                        hover: format!(
                            "Class: {}\nCompactness: {:.2}\nRelative Area: {:.2}%",
                            p.clase, p.compactness_factor, p.relative_area_bbox_percent
                        ),
                    })
                    .collect(),
            });

            let n = members.len() as f64;
            let mut mean = [0.0; 3];
            for p in members {
                let pos = position(p);
                for axis in 0..3 {
                    mean[axis] += pos[axis] / n;
                }
            }
            prototypes.push(Prototype {
                class: class.to_string(),
                color,
                position: mean,
                label: format!("Prototype {}", class),
            });
        }

        Self {
            series,
            prototypes,
            bounds: FeatureBounds::from_positions(points.iter().map(position)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Per-axis extent of the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl FeatureBounds {
    pub fn from_positions(positions: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for p in positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        for axis in 0..3 {
            if min[axis] > max[axis] {
                min[axis] = 0.0;
                max[axis] = 0.0;
            }
        }
        Self { min, max }
    }

    /// Map into the cube `[-1, 1]^3`. A flat axis maps to 0.
    pub fn normalize(&self, p: Vec3) -> Vec3 {
        let mut out = [0.0; 3];
        for axis in 0..3 {
            let span = self.max[axis] - self.min[axis];
            if span > f64::EPSILON {
                out[axis] = (p[axis] - self.min[axis]) / span * 2.0 - 1.0;
            }
        }
        out
    }
}

/// Orbit camera for drawing the normalised cube on a 2D surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera3d {
    pub yaw: f64,
    pub pitch: f64,
}

impl Default for Camera3d {
    fn default() -> Self {
        Self {
            yaw: 0.6,
            pitch: 0.4,
        }
    }
}

impl Camera3d {
    const PITCH_LIMIT: f64 = 1.5;

    pub fn rotate(&mut self, d_yaw: f64, d_pitch: f64) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Orthographic projection of a normalised point. Returns screen-space
    /// `(x, y)` in `[-√3, √3]` with y pointing up, plus depth for sorting.
    pub fn project(&self, p: Vec3) -> (f64, f64, f64) {
        let [x, y, z] = p;
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();

        // Feature z (colour) is drawn as the vertical axis
        let rx = x * cy - y * sy;
        let ry = x * sy + y * cy;
        let screen_y = z * cp - ry * sp;
        let depth = z * sp + ry * cp;
        (rx, screen_y, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(class: &str, c: f64, area: f64, color: f64) -> TrainingPoint {
        TrainingPoint {
            compactness_factor: c,
            relative_area_bbox_percent: area,
            unique_color_int: color,
            clase: class.to_string(),
        }
    }

    #[test]
    fn test_series_follow_first_appearance() {
        let plot = TrainingPlot::from_points(&[
            point("pera", 0.5, 10.0, 100.0),
            point("manzana", 0.7, 20.0, 200.0),
            point("pera", 0.3, 30.0, 300.0),
        ]);

        let classes: Vec<&str> = plot.series.iter().map(|s| s.class.as_str()).collect();
        assert_eq!(classes, vec!["pera", "manzana"]);
        assert_eq!(plot.series[0].points.len(), 2);
        assert_eq!(plot.series[0].color, "#FF6B6B");
        assert_eq!(plot.series[1].color, "#4ECDC4");
        assert_eq!(
            plot.series[0].points[0].hover,
            "Class: pera\nCompactness: 0.50\nRelative Area: 10.00%"
        );
    }

    #[test]
    fn test_prototype_is_class_mean() {
        let plot = TrainingPlot::from_points(&[
            point("pera", 0.5, 10.0, 100.0),
            point("manzana", 0.7, 20.0, 200.0),
            point("pera", 0.3, 30.0, 300.0),
        ]);

        let pera = &plot.prototypes[0];
        assert_eq!(pera.label, "Prototype pera");
        assert!((pera.position[0] - 0.4).abs() < 1e-9);
        assert!((pera.position[1] - 20.0).abs() < 1e-9);
        assert!((pera.position[2] - 200.0).abs() < 1e-9);
        assert_eq!(plot.prototypes[1].position, [0.7, 20.0, 200.0]);
    }

    #[test]
    fn test_empty_data() {
        let plot = TrainingPlot::from_points(&[]);
        assert!(plot.is_empty());
        assert_eq!(plot.bounds.normalize([5.0, 5.0, 5.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_maps_extremes_to_cube() {
        let bounds = FeatureBounds::from_positions([[0.0, 10.0, 7.0], [1.0, 30.0, 7.0]]);
        assert_eq!(bounds.normalize([0.0, 10.0, 7.0]), [-1.0, -1.0, 0.0]);
        assert_eq!(bounds.normalize([1.0, 30.0, 7.0]), [1.0, 1.0, 0.0]);
        assert_eq!(bounds.normalize([0.5, 20.0, 7.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_camera_front_view() {
        let camera = Camera3d {
            yaw: 0.0,
            pitch: 0.0,
        };
        let (x, y, _) = camera.project([0.5, 0.0, -0.25]);
        assert!((x - 0.5).abs() < 1e-9);
        assert!((y + 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera3d::default();
        camera.rotate(0.0, 10.0);
        assert_eq!(camera.pitch, 1.5);
    }

    #[tokio::test]
    async fn test_plot_from_backend_training_set() {
        use crate::testing::{Call, ScriptedBackend};
        use vision_client::ImageBackend;

        let backend = ScriptedBackend::new();
        backend.set_training(vec![
            point("manzana", 0.2, 10.0, 50.0),
            point("manzana", 0.4, 30.0, 150.0),
        ]);

        let points = backend.training_points().await.unwrap();
        let plot = TrainingPlot::from_points(&points);

        assert_eq!(backend.calls(), vec![Call::Training]);
        assert_eq!(plot.prototypes.len(), 1);
        assert_eq!(plot.prototypes[0].label, "Prototype manzana");
        let [c, area, color] = plot.prototypes[0].position;
        assert!((c - 0.3).abs() < 1e-9);
        assert!((area - 20.0).abs() < 1e-9);
        assert!((color - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_training_load_failure_is_reported() {
        use crate::testing::ScriptedBackend;
        use vision_client::ImageBackend;

        let backend = ScriptedBackend::new();
        assert!(backend.training_points().await.is_err());
    }
}
