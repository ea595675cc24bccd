use leptos::prelude::*;
use leptos::task::spawn_local;
use vision_client::{data_uri, BackendClient, BackendConfig, REGION_MIME_TYPE};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::HtmlImageElement;
use workbench_core::{analyze_image, RegionSession, RegionState};

use crate::browser::{event_files, read_file};
use crate::canvas::render_annotated;
use crate::previews::BrowserPreviews;

/// Detect objects in one image and label each with the classifier.
#[component]
pub fn RegionClassifier() -> impl IntoView {
    let Some(config) = use_context::<BackendConfig>() else {
        return view! { <p class="error">"Backend URL is not configured."</p> }.into_any();
    };

    let session = RwSignal::new_local(RegionSession::new(BrowserPreviews));
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    let on_file_change = move |ev: web_sys::Event| {
        let Some(file) = event_files(&ev).and_then(|files| files.get(0)) else {
            return;
        };
        let config = config.clone();
        spawn_local(async move {
            let image = match read_file(&file).await {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!("Could not read {}: {:?}", file.name(), e);
                    return;
                }
            };
            let Some(run) = session.try_update(|s| s.begin(image.clone())) else {
                return;
            };
            let backend = BackendClient::new(config);
            let outcome = analyze_image(&backend, &image).await;
            session.try_update(|s| s.finish(run, outcome));
        });
    };

    // Redraw once the analysis is in and the preview has loaded
    Effect::new(move |_| {
        let Some((uri, boxes)) = session.with(|s| {
            let uri = s.preview_uri()?.to_string();
            Some((uri, s.analysis()?.annotations()))
        }) else {
            return;
        };
        let Some(canvas) = canvas_ref.get() else {
            return;
        };
        let Ok(image) = HtmlImageElement::new() else {
            return;
        };
        let loaded = image.clone();
        let onload = Closure::once_into_js(move || render_annotated(&canvas, &loaded, &boxes));
        image.set_onload(Some(onload.unchecked_ref()));
        image.set_src(&uri);
    });

    on_cleanup(move || {
        session.try_update(|s| s.teardown());
    });

    view! {
        <div class="container">
            <header>
                <h1>"Region Classifier"</h1>
                <p>"Detect objects in an image and classify each region"</p>
            </header>

            <div class="controls">
                <div class="file-upload">
                    <label for="region-input">"Image:"</label>
                    <input type="file" id="region-input" accept="image/*" on:change=on_file_change/>
                </div>
            </div>

            {move || session.with(|s| match s.state() {
                RegionState::Empty => None,
                RegionState::Analyzing => Some(view! { <p class="stats">"Analyzing..."</p> }.into_any()),
                RegionState::Failed(e) => Some(view! { <div class="error">{format!("Detection failed: {}", e)}</div> }.into_any()),
                RegionState::Ready(analysis) => {
                    let counts = analysis
                        .class_counts
                        .iter()
                        .map(|(class, n)| view! { <li>{format!("{}: {}", class, n)}</li> })
                        .collect_view();
                    Some(view! {
                        <div class="stats">
                            <p>"Regions: " {analysis.regions.len()}</p>
                            <ul>{counts}</ul>
                        </div>
                    }.into_any())
                }
            })}

            <div class="canvas-container">
                <canvas node_ref=canvas_ref style="border: 1px solid #ccc; max-width: 100%;"/>
            </div>

            <div class="results-list">
                {move || session.with(|s| {
                    s.analysis()
                        .map(|analysis| {
                            analysis
                                .regions
                                .iter()
                                .map(|r| {
                                    let src = data_uri(REGION_MIME_TYPE, &r.region.region_image_b64);
                                    view! {
                                        <div class="result-card">
                                            <img src=src alt=r.label.clone()/>
                                            <p>{r.label.clone()}</p>
                                        </div>
                                    }
                                })
                                .collect_view()
                        })
                })}
            </div>
        </div>
    }
    .into_any()
}
