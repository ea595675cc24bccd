use leptos::prelude::*;
use leptos::task::spawn_local;
use vision_client::{BackendClient, BackendConfig, ImageBackend};
use web_sys::MouseEvent;
use workbench_core::{Camera3d, TrainingPlot};

use crate::canvas::{hit_test, render_scatter};

/// Radians of rotation per dragged pixel.
const DRAG_SENSITIVITY: f64 = 0.01;
const HOVER_RADIUS: f64 = 6.0;

/// 3D scatter of the classifier's training set, one colour per class.
#[component]
pub fn TrainingScatter() -> impl IntoView {
    let Some(config) = use_context::<BackendConfig>() else {
        return view! { <p class="error">"Backend URL is not configured."</p> }.into_any();
    };

    let plot = RwSignal::new(None::<Result<TrainingPlot, String>>);
    let camera = RwSignal::new(Camera3d::default());
    let drag = RwSignal::new(None::<(i32, i32)>);
    let hover = RwSignal::new(None::<String>);
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    spawn_local(async move {
        let backend = BackendClient::new(config);
        let loaded = backend
            .training_points()
            .await
            .map(|points| TrainingPlot::from_points(&points))
            .map_err(|e| e.to_string());
        plot.try_set(Some(loaded));
    });

    Effect::new(move |_| {
        let camera = camera.get();
        let Some(canvas) = canvas_ref.get() else {
            return;
        };
        plot.with(|p| {
            if let Some(Ok(plot)) = p {
                render_scatter(&canvas, plot, &camera);
            }
        });
    });

    let on_mouse_move = move |ev: MouseEvent| {
        let (x, y) = (ev.offset_x(), ev.offset_y());
        if let Some((px, py)) = drag.get_untracked() {
            camera.update(|c| {
                c.rotate(
                    (x - px) as f64 * DRAG_SENSITIVITY,
                    (y - py) as f64 * DRAG_SENSITIVITY,
                )
            });
            drag.set(Some((x, y)));
            return;
        }
        let Some(canvas) = canvas_ref.get_untracked() else {
            return;
        };
        let text = plot.with_untracked(|p| match p {
            Some(Ok(plot)) => hit_test(
                &canvas,
                plot,
                &camera.get_untracked(),
                x as f64,
                y as f64,
                HOVER_RADIUS,
            ),
            _ => None,
        });
        hover.set(text);
    };

    view! {
        <div class="container">
            <header>
                <h1>"Training Data"</h1>
                <p>"Feature space of the training set. Drag to rotate, hover a point for details."</p>
            </header>

            {move || plot.with(|p| match p {
                None => Some(view! { <p class="stats">"Loading training data..."</p> }.into_any()),
                Some(Err(e)) => Some(view! { <div class="error">{format!("Could not load training data: {}", e)}</div> }.into_any()),
                Some(Ok(_)) => None,
            })}

            <div class="canvas-container">
                <canvas
                    node_ref=canvas_ref
                    width="800"
                    height="600"
                    style="border: 1px solid #ccc;"
                    on:mousedown=move |ev: MouseEvent| drag.set(Some((ev.offset_x(), ev.offset_y())))
                    on:mouseup=move |_| drag.set(None)
                    on:mouseleave=move |_| {
                        drag.set(None);
                        hover.set(None);
                    }
                    on:mousemove=on_mouse_move
                />
            </div>

            {move || hover.get().map(|text| view! { <pre class="tooltip">{text}</pre> })}
        </div>
    }
    .into_any()
}
