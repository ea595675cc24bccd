use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};
use workbench_core::annotate::{BOX_COLOR_CSS, LABEL_FONT, LINE_WIDTH};
use workbench_core::scatter::{series_color, AXIS_TITLES};
use workbench_core::{BoxAnnotation, Camera3d, TrainingPlot};

fn context_2d(canvas: &HtmlCanvasElement) -> Option<CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .ok()
        .flatten()?
        .dyn_into::<CanvasRenderingContext2d>()
        .ok()
}

/// Draw the analysed image at its natural size with every box outlined and labelled.
pub fn render_annotated(canvas: &HtmlCanvasElement, image: &HtmlImageElement, boxes: &[BoxAnnotation]) {
    let Some(context) = context_2d(canvas) else {
        return;
    };

    canvas.set_width(image.natural_width());
    canvas.set_height(image.natural_height());
    let _ = context.draw_image_with_html_image_element(image, 0.0, 0.0);

    context.set_stroke_style_str(BOX_COLOR_CSS);
    context.set_fill_style_str(BOX_COLOR_CSS);
    context.set_line_width(LINE_WIDTH as f64);
    context.set_font(LABEL_FONT);

    for annotation in boxes {
        context.stroke_rect(annotation.x, annotation.y, annotation.width, annotation.height);
        let _ = context.fill_text(&annotation.label, annotation.label_x, annotation.label_y);
    }
}

/// Draw the training scatter: cube edges, axis titles, class points and prototypes.
pub fn render_scatter(canvas: &HtmlCanvasElement, plot: &TrainingPlot, camera: &Camera3d) {
    let Some(context) = context_2d(canvas) else {
        return;
    };

    let width = canvas.width() as f64;
    let height = canvas.height() as f64;

    context.clear_rect(0.0, 0.0, width, height);
    context.set_fill_style_str("white");
    context.fill_rect(0.0, 0.0, width, height);

    if plot.is_empty() {
        context.set_fill_style_str("#999");
        context.set_font("20px sans-serif");
        let _ = context.fill_text("No training data", width / 2.0 - 80.0, height / 2.0);
        return;
    }

    // Projected coordinates stay within ±√3
    let scale = width.min(height) / (2.0 * 1.8);
    let to_screen = |(x, y, _): (f64, f64, f64)| (width / 2.0 + x * scale, height / 2.0 - y * scale);

    // Cube wireframe
    context.set_stroke_style_str("#ddd");
    context.set_line_width(1.0);
    let corners: Vec<[f64; 3]> = (0..8)
        .map(|i| {
            let c = |bit: usize| if i & bit == 0 { -1.0 } else { 1.0 };
            [c(1), c(2), c(4)]
        })
        .collect();
    for (i, a) in corners.iter().enumerate() {
        for (j, b) in corners.iter().enumerate().skip(i + 1) {
            // Edges join corners that differ in exactly one coordinate
            if (i ^ j).count_ones() == 1 {
                let (x1, y1) = to_screen(camera.project(*a));
                let (x2, y2) = to_screen(camera.project(*b));
                context.begin_path();
                context.move_to(x1, y1);
                context.line_to(x2, y2);
                context.stroke();
            }
        }
    }

    // Axis titles at the positive end of each axis
    context.set_fill_style_str("#333");
    context.set_font("12px sans-serif");
    for (axis, title) in AXIS_TITLES.iter().enumerate() {
        let mut tip = [-1.0; 3];
        tip[axis] = 1.15;
        let (x, y) = to_screen(camera.project(tip));
        let _ = context.fill_text(title, x, y);
    }

    // Points, far to near
    let mut marks: Vec<(f64, f64, f64, &str)> = Vec::new();
    for series in &plot.series {
        for point in &series.points {
            let projected = camera.project(plot.bounds.normalize(point.position));
            let (x, y) = to_screen(projected);
            marks.push((projected.2, x, y, series.color));
        }
    }
    marks.sort_by(|a, b| a.0.total_cmp(&b.0));

    context.set_global_alpha(0.8);
    for (_, x, y, color) in &marks {
        context.set_fill_style_str(color);
        context.begin_path();
        let _ = context.arc(*x, *y, 4.0, 0.0, std::f64::consts::TAU);
        context.fill();
    }
    context.set_global_alpha(1.0);

    // Prototypes as outlined diamonds with their label
    context.set_line_width(2.0);
    context.set_font("bold 12px sans-serif");
    for prototype in &plot.prototypes {
        let (x, y) = to_screen(camera.project(plot.bounds.normalize(prototype.position)));
        context.set_fill_style_str(prototype.color);
        context.set_stroke_style_str("#000");
        context.begin_path();
        context.move_to(x, y - 9.0);
        context.line_to(x + 9.0, y);
        context.line_to(x, y + 9.0);
        context.line_to(x - 9.0, y);
        context.close_path();
        context.fill();
        context.stroke();
        context.set_fill_style_str("#000");
        let _ = context.fill_text(&prototype.label, x + 12.0, y - 6.0);
    }

    // Legend
    context.set_font("13px sans-serif");
    for (i, series) in plot.series.iter().enumerate() {
        let y = 20.0 + i as f64 * 18.0;
        context.set_fill_style_str(series_color(i));
        context.fill_rect(10.0, y - 10.0, 12.0, 12.0);
        context.set_fill_style_str("#333");
        let _ = context.fill_text(&series.class, 28.0, y);
    }
}

/// Hover text of the point nearest to `(px, py)` within `radius` pixels.
pub fn hit_test(
    canvas: &HtmlCanvasElement,
    plot: &TrainingPlot,
    camera: &Camera3d,
    px: f64,
    py: f64,
    radius: f64,
) -> Option<String> {
    let width = canvas.width() as f64;
    let height = canvas.height() as f64;
    let scale = width.min(height) / (2.0 * 1.8);

    let mut best: Option<(f64, &str)> = None;
    for series in &plot.series {
        for point in &series.points {
            let (x, y, _) = camera.project(plot.bounds.normalize(point.position));
            let (sx, sy) = (width / 2.0 + x * scale, height / 2.0 - y * scale);
            let d = (sx - px).hypot(sy - py);
            if d <= radius && best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, &point.hover));
            }
        }
    }
    best.map(|(_, hover)| hover.to_string())
}
