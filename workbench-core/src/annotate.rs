use std::io::Cursor;

use image::{ImageFormat, ImageResult, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use vision_client::BoundingBox;

/// Box outline colour as a CSS string (canvas) and as RGBA (raster).
pub const BOX_COLOR_CSS: &str = "#ef4444";
pub const BOX_COLOR: Rgba<u8> = Rgba([0xef, 0x44, 0x44, 0xff]);
pub const LINE_WIDTH: u32 = 3;
pub const LABEL_FONT: &str = "bold 16px sans-serif";

/// Label offset from the box's top-left corner.
const LABEL_OFFSET: (f64, f64) = (6.0, 20.0);

/// Geometry and text for one labelled box.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxAnnotation {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
    pub label_x: f64,
    pub label_y: f64,
}

impl BoxAnnotation {
    pub fn new(bbox: &BoundingBox, label: impl Into<String>) -> Self {
        Self {
            x: bbox.x1,
            y: bbox.y1,
            width: bbox.width(),
            height: bbox.height(),
            label: label.into(),
            label_x: bbox.x1 + LABEL_OFFSET.0,
            label_y: bbox.y1 + LABEL_OFFSET.1,
        }
    }
}

/// Decode `image_bytes` and outline every box on it.
///
/// Labels are not rasterised here; the canvas view draws them as text.
pub fn render_boxes(image_bytes: &[u8], boxes: &[BoxAnnotation]) -> ImageResult<RgbaImage> {
    let mut canvas = image::load_from_memory(image_bytes)?.to_rgba8();
    for annotation in boxes {
        outline(&mut canvas, annotation);
    }
    Ok(canvas)
}

fn outline(canvas: &mut RgbaImage, annotation: &BoxAnnotation) {
    let x = annotation.x.round() as i32;
    let y = annotation.y.round() as i32;
    let width = annotation.width.round().max(1.0) as u32;
    let height = annotation.height.round().max(1.0) as u32;

    // Thick stroke as nested 1px rectangles, centred on the box edge
    let half = (LINE_WIDTH / 2) as i32;
    for offset in -half..=half {
        let w = width as i32 - 2 * offset;
        let h = height as i32 - 2 * offset;
        if w <= 0 || h <= 0 {
            continue;
        }
        let rect = Rect::at(x + offset, y + offset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }
}

pub fn encode_png(image: &RgbaImage) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
