use std::time::Duration;

use leptos::prelude::*;
use leptos::task::spawn_local;
use vision_client::{BackendClient, BackendConfig, ImageUpload};
use web_sys::FileList;
use workbench_core::{
    poll_all, submit_all, Action, AutoplayDelay, CaptureSource, NoticeKind, Workbench,
    DEFAULT_THRESHOLD, NOTICE_TIMEOUT_MS,
};

use crate::browser::{drop_files, event_files, read_file_list};
use crate::camera::CameraPanel;
use crate::previews::BrowserPreviews;

/// Upload, process and poll page.
#[component]
pub fn ImageProcessor() -> impl IntoView {
    let Some(config) = use_context::<BackendConfig>() else {
        return view! { <p class="error">"Backend URL is not configured."</p> }.into_any();
    };

    let store = RwSignal::new_local(Workbench::new(BrowserPreviews));
    let dispatch = move |action: Action| {
        store.try_update(|w| w.dispatch(action));
    };

    let add_files = move |files: FileList, source: CaptureSource| {
        spawn_local(async move {
            let uploads = read_file_list(files).await;
            if !uploads.is_empty() {
                dispatch(Action::FilesAdded {
                    source,
                    files: uploads,
                });
            }
        });
    };

    let on_capture = Callback::new(move |upload: ImageUpload| {
        dispatch(Action::FilesAdded {
            source: CaptureSource::Camera,
            files: vec![upload],
        });
    });

    let submit_config = config.clone();
    let on_submit = move |_| {
        let Some(batch) = store.try_update(|w| w.start_submission()).flatten() else {
            return;
        };
        let backend = BackendClient::new(submit_config.clone());
        spawn_local(async move {
            submit_all(&backend, batch, dispatch).await;
        });
    };

    let on_poll = move |_| {
        let Some(batch) = store.try_update(|w| w.start_poll()).flatten() else {
            return;
        };
        let backend = BackendClient::new(config.clone());
        spawn_local(async move {
            poll_all(&backend, batch, dispatch).await;
        });
    };

    // Notices dismiss themselves; a newer notice is never hidden by an older timer
    let notice_id = Memo::new(move |_| store.with(|w| w.notice().map(|n| n.id)));
    Effect::new(move |_| {
        if let Some(id) = notice_id.get() {
            set_timeout(
                move || dispatch(Action::NoticeDismissed(id)),
                Duration::from_millis(NOTICE_TIMEOUT_MS),
            );
        }
    });

    // One pending autoplay timer at most; re-armed after every advance and
    // cleared on every exit path
    let autoplay = Memo::new(move |_| {
        store.with(|w| {
            w.modal()
                .autoplay_active()
                .then(|| (w.form().autoplay_delay, w.modal().index()))
        })
    });
    let timer = StoredValue::new(None::<TimeoutHandle>);
    Effect::new(move |_| {
        if let Some(handle) = timer.get_value() {
            handle.clear();
        }
        let next = autoplay.get().and_then(|(delay, _)| {
            set_timeout_with_handle(
                move || dispatch(Action::AutoplayTick),
                delay.as_duration(),
            )
            .ok()
        });
        timer.set_value(next);
    });

    on_cleanup(move || {
        if let Some(handle) = timer.try_get_value().flatten() {
            handle.clear();
        }
        store.try_update(|w| w.teardown());
    });

    // Lists re-render only when their entries change, not on every action
    let pending = Memo::new(move |_| {
        store.with(|w| {
            w.pending_files()
                .iter()
                .map(|f| (f.preview_uri().to_string(), f.image.file_name.clone()))
                .collect::<Vec<_>>()
        })
    });
    let result_ids = Memo::new(move |_| store.with(|w| w.results().keys().cloned().collect::<Vec<_>>()));
    let modal = Memo::new(move |_| {
        store.with(|w| {
            let modal = w.modal();
            modal.current().cloned().map(|image| {
                (
                    image,
                    modal.index().unwrap_or(0),
                    modal.len(),
                    modal.autoplay_active(),
                )
            })
        })
    });

    // Threshold text resets to the default only when the session is cleared
    let epoch = Memo::new(move |_| store.with(|w| w.epoch()));

    view! {
        <div class="container">
            <header>
                <h1>"Image Processing"</h1>
                <p>"Upload or photograph images, send them for processing and inspect the results"</p>
            </header>

            <div class="controls">
                <div
                    class="drop-zone"
                    on:dragover=|ev: web_sys::DragEvent| ev.prevent_default()
                    on:drop=move |ev: web_sys::DragEvent| {
                        ev.prevent_default();
                        if let Some(files) = drop_files(&ev) {
                            add_files(files, CaptureSource::DragDrop);
                        }
                    }
                >
                    <label for="file-input">"Drop images here or pick them:"</label>
                    <input
                        type="file"
                        id="file-input"
                        accept="image/*"
                        multiple=true
                        on:change=move |ev| {
                            if let Some(files) = event_files(&ev) {
                                add_files(files, CaptureSource::FilePicker);
                            }
                        }
                    />
                </div>

                <CameraPanel on_capture=on_capture/>

                <div class="threshold-control">
                    <label for="class-name">"Class name:"</label>
                    <input
                        type="text"
                        id="class-name"
                        prop:value=move || store.with(|w| w.form().class_name.clone())
                        on:input=move |ev| dispatch(Action::ClassNameChanged(event_target_value(&ev)))
                    />
                </div>

                <div class="threshold-control">
                    <label for="threshold">"Threshold (0-255):"</label>
                    <input
                        type="number"
                        id="threshold"
                        min="0"
                        max="255"
                        prop:value=move || {
                            epoch.track();
                            DEFAULT_THRESHOLD.to_string()
                        }
                        on:input=move |ev| {
                            // Unparseable input is out of range and disables submission
                            let value = event_target_value(&ev).trim().parse::<i64>().unwrap_or(-1);
                            dispatch(Action::ThresholdChanged(value));
                        }
                    />
                </div>

                <div class="threshold-control">
                    <label for="autoplay-delay">"Autoplay delay (ms):"</label>
                    <input
                        type="number"
                        id="autoplay-delay"
                        min=AutoplayDelay::MIN.as_millis().to_string()
                        step="100"
                        prop:value=move || store.with(|w| w.form().autoplay_delay.as_millis().to_string())
                        on:change=move |ev| {
                            if let Ok(ms) = event_target_value(&ev).trim().parse::<u64>() {
                                dispatch(Action::AutoplayDelayChanged(AutoplayDelay::from_millis(ms)));
                            }
                        }
                    />
                </div>

                <button
                    class="action-button"
                    on:click=on_submit
                    disabled=move || store.with(|w| !w.can_submit())
                >
                    {move || store.with(|w| match w.uploading() {
                        Some(progress) => progress.label(),
                        None => "Send images".to_string(),
                    })}
                </button>
                <button
                    class="action-button"
                    on:click=on_poll
                    disabled=move || store.with(|w| !w.can_poll())
                >
                    {move || if store.with(|w| w.is_polling()) { "Checking..." } else { "Check status" }}
                </button>
                <button class="clear-button" on:click=move |_| dispatch(Action::ClearRequested)>
                    "Clear all"
                </button>
            </div>

            <div class="pending-files">
                <h2>"Pending images"</h2>
                <For
                    each=move || pending.get()
                    key=|(uri, _)| uri.clone()
                    children=move |(uri, name)| {
                        let preview = uri.clone();
                        view! {
                            <div class="pending-file">
                                <img src=preview alt=name.clone()/>
                                <span>{name}</span>
                                <button on:click=move |_| {
                                    // Indices shift as files are removed
                                    if let Some(index) = store.with_untracked(|w| w.pending_index(&uri)) {
                                        dispatch(Action::FileRemoved(index));
                                    }
                                }>
                                    "Remove"
                                </button>
                            </div>
                        }
                    }
                />
            </div>

            <div class="stats">
                <p>"Tracked processes: " {move || store.with(|w| w.records().len())}</p>
                <p>"Completed: " {move || result_ids.with(Vec::len)}</p>
            </div>

            <div class="results-list">
                <h2>"Results"</h2>
                <For
                    each=move || result_ids.get()
                    key=|id| id.clone()
                    children=move |id| {
                        store.with_untracked(|w| w.result_card(&id)).map(|card| {
                            let id = card.id.clone();
                            view! {
                                <div
                                    class="result-card"
                                    on:click=move |_| dispatch(Action::ModalOpened(id.clone()))
                                >
                                    <h3>{format!("Process {}", card.id)}</h3>
                                    <p>"Status: " {card.status}</p>
                                    {card.dimensions.map(|d| view! { <p>"Dimensions: " {d}</p> })}
                                    {card.compactness_factor.map(|c| view! { <p>"Compactness: " {c}</p> })}
                                    {card.unique_color_int.map(|u| view! { <p>"Unique colour: " {u}</p> })}
                                    <div class="thumbnails">
                                        {card.thumbnails
                                            .into_iter()
                                            .map(|g| view! { <img src=g.source_uri alt=g.label.clone() title=g.label/> })
                                            .collect_view()}
                                    </div>
                                </div>
                            }
                        })
                    }
                />
            </div>

            {move || {
                modal.get().map(|(image, index, len, playing)| {
                    let position = format!("{} / {}", index + 1, len);
                    view! {
                        <div class="modal-overlay">
                            <div class="modal">
                                <h3>{image.label.clone()}</h3>
                                <img src=image.source_uri alt=image.label/>
                                <p>{position}</p>
                                <div class="modal-controls">
                                    <button on:click=move |_| dispatch(Action::ModalPrev)>"Previous"</button>
                                    <button on:click=move |_| dispatch(Action::AutoplayToggled)>
                                        {if playing { "Pause" } else { "Play" }}
                                    </button>
                                    <button on:click=move |_| dispatch(Action::ModalNext)>"Next"</button>
                                    <button on:click=move |_| dispatch(Action::ModalClosed)>"Close"</button>
                                </div>
                            </div>
                        </div>
                    }
                })
            }}

            <Show when=move || store.with(|w| w.confirm_clear())>
                <div class="modal-overlay">
                    <div class="modal">
                        <p>"Remove all pending images, processes and results?"</p>
                        <button on:click=move |_| dispatch(Action::Cleared)>"Clear"</button>
                        <button on:click=move |_| dispatch(Action::ClearCancelled)>"Cancel"</button>
                    </div>
                </div>
            </Show>

            {move || {
                store.with(|w| {
                    w.notice().map(|notice| {
                        let id = notice.id;
                        let class = match notice.kind {
                            NoticeKind::Info => "notice",
                            NoticeKind::Error => "notice error",
                        };
                        view! {
                            <div class=class>
                                <span>{notice.text.clone()}</span>
                                <button on:click=move |_| dispatch(Action::NoticeDismissed(id))>"×"</button>
                            </div>
                        }
                    })
                })
            }}
        </div>
    }
    .into_any()
}
