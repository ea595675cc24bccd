use js_sys::{Array, Object, Reflect};
use leptos::prelude::*;
use leptos::task::spawn_local;
use tracing::warn;
use vision_client::ImageUpload;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    CanvasRenderingContext2d, HtmlCanvasElement, HtmlVideoElement, MediaDeviceInfo,
    MediaDeviceKind, MediaDevices, MediaStream, MediaStreamConstraints, MediaStreamTrack,
};
use workbench_core::{CameraController, CameraDevice, CameraFrame, CameraPhase, StreamSource};

use crate::browser::{document, now_ms};

fn media_devices() -> Result<MediaDevices, JsValue> {
    web_sys::window()
        .ok_or_else(|| JsValue::from_str("no window"))?
        .navigator()
        .media_devices()
}

async fn enumerate_cameras() -> Result<Vec<CameraDevice>, JsValue> {
    let list = JsFuture::from(media_devices()?.enumerate_devices()?).await?;
    let list: Array = list.dyn_into()?;
    Ok(list
        .iter()
        .filter_map(|d| d.dyn_into::<MediaDeviceInfo>().ok())
        .filter(|d| d.kind() == MediaDeviceKind::Videoinput)
        .map(|d| CameraDevice {
            device_id: d.device_id(),
            label: d.label(),
        })
        .collect())
}

async fn open_stream(source: &StreamSource) -> Result<MediaStream, JsValue> {
    let video = Object::new();
    match source {
        StreamSource::Device(id) => {
            let exact = Object::new();
            Reflect::set(&exact, &"exact".into(), &JsValue::from_str(id))?;
            Reflect::set(&video, &"deviceId".into(), &exact)?;
        }
        StreamSource::Environment => {
            Reflect::set(&video, &"facingMode".into(), &"environment".into())?;
        }
    }
    let constraints = MediaStreamConstraints::new();
    constraints.set_video(&video);

    let promise = media_devices()?.get_user_media_with_constraints(&constraints)?;
    JsFuture::from(promise).await?.dyn_into()
}

fn stop_tracks(stream: &MediaStream) {
    for track in stream.get_tracks().iter() {
        if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
            track.stop();
        }
    }
}

/// Copy the current video frame through an off-screen canvas.
fn grab_frame(video: &HtmlVideoElement) -> Result<CameraFrame, JsValue> {
    let (width, height) = (video.video_width(), video.video_height());
    let canvas: HtmlCanvasElement = document()
        .ok_or_else(|| JsValue::from_str("no document"))?
        .create_element("canvas")?
        .dyn_into()?;
    canvas.set_width(width);
    canvas.set_height(height);

    let context: CanvasRenderingContext2d = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("no 2d context"))?
        .dyn_into()?;
    context.draw_image_with_html_video_element(video, 0.0, 0.0)?;
    let data = context.get_image_data(0.0, 0.0, width as f64, height as f64)?;

    Ok(CameraFrame {
        width,
        height,
        rgba: data.data().0,
    })
}

/// Live camera with a device picker; every capture is handed to `on_capture`.
#[component]
pub fn CameraPanel(on_capture: Callback<ImageUpload>) -> impl IntoView {
    let controller = RwSignal::new(CameraController::new());
    let stream = StoredValue::new_local(None::<MediaStream>);
    let error = RwSignal::new(None::<String>);
    let video_ref = NodeRef::<leptos::html::Video>::new();

    // Enumerated once per mount
    spawn_local(async move {
        match enumerate_cameras().await {
            Ok(devices) => {
                controller.try_update(|c| c.devices_enumerated(devices));
            }
            Err(e) => warn!("Could not list cameras: {:?}", e),
        }
    });

    let stop = move || {
        stream.try_update_value(|s| {
            if let Some(media) = s.take() {
                stop_tracks(&media);
            }
        });
        if let Some(video) = video_ref.get_untracked() {
            video.set_src_object(None);
        }
        controller.try_update(|c| c.stop());
    };

    let start = move || {
        let Some(request) = controller.try_update(|c| c.start()).flatten() else {
            return;
        };
        error.set(None);
        spawn_local(async move {
            match open_stream(&request.source).await {
                Ok(media) => {
                    // Stopped, restarted or unmounted while permission was pending
                    let current = controller.try_with_untracked(|c| c.accepts_stream(request.session));
                    if current != Some(true) {
                        stop_tracks(&media);
                        return;
                    }
                    match stream.try_update_value(|s| s.replace(media.clone())) {
                        None => {
                            stop_tracks(&media);
                            return;
                        }
                        Some(Some(previous)) => stop_tracks(&previous),
                        Some(None) => {}
                    }
                    let Some(video) = video_ref.get_untracked() else {
                        return;
                    };
                    video.set_src_object(Some(&media));
                    let played = match video.play() {
                        Ok(promise) => JsFuture::from(promise).await.map(drop),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = played {
                        warn!("Could not play camera stream: {:?}", e);
                    }
                }
                Err(e) => {
                    warn!("Camera access denied: {:?}", e);
                    controller.try_update(|c| c.start_failed(request.session));
                    error.try_set(Some("Could not access the camera.".to_string()));
                }
            }
        });
    };

    let capture = move |_| {
        let Some(video) = video_ref.get_untracked() else {
            return;
        };
        let result = grab_frame(&video)
            .map_err(|e| format!("{:?}", e))
            .and_then(|frame| {
                controller
                    .with_untracked(|c| c.capture(frame, now_ms()))
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(upload) => on_capture.run(upload),
            Err(e) => {
                warn!("Capture failed: {}", e);
                error.set(Some(e));
            }
        }
    };

    on_cleanup(stop);

    let streaming = move || controller.with(|c| c.phase() == CameraPhase::Streaming);

    view! {
        <div class="camera-panel">
            <div class="camera-controls">
                <select
                    disabled=streaming
                    on:change=move |ev| {
                        let id = event_target_value(&ev);
                        controller.update(|c| {
                            c.select_device(id);
                        });
                    }
                >
                    {move || {
                        controller.with(|c| {
                            let selected = c.selected().map(str::to_string);
                            c.devices()
                                .iter()
                                .map(|d| {
                                    let is_selected = selected.as_deref() == Some(d.device_id.as_str());
                                    view! {
                                        <option value=d.device_id.clone() selected=is_selected>
                                            {d.display_label()}
                                        </option>
                                    }
                                })
                                .collect_view()
                        })
                    }}
                </select>
                <button on:click=move |_| if streaming() { stop() } else { start() }>
                    {move || if streaming() { "Stop camera" } else { "Start camera" }}
                </button>
                <button on:click=capture disabled=move || !streaming()>
                    "Capture"
                </button>
            </div>
            <video
                node_ref=video_ref
                autoplay=true
                playsinline=true
                muted=true
                style:display=move || if streaming() { "block" } else { "none" }
                class="camera-feed"
            />
            {move || error.get().map(|e| view! { <p class="camera-error">{e}</p> })}
        </div>
    }
}
