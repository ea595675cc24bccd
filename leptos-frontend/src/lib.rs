use leptos::prelude::*;
use leptos_meta::*;
use leptos_router::components::{Route, Router, Routes, A};
use leptos_router::path;
use tracing::{error, info};
use vision_client::BackendConfig;
use wasm_bindgen::prelude::*;

mod browser;
mod camera;
mod canvas;
mod previews;
mod processor;
mod regions;
mod training;

use processor::ImageProcessor;
use regions::RegionClassifier;
use training::TrainingScatter;

#[component]
pub fn App() -> impl IntoView {
    provide_meta_context();

    match BackendConfig::from_build_env() {
        Ok(config) => {
            info!("Using backend at {}", config.base_url());
            provide_context(config);
        }
        Err(e) => error!("{}", e),
    }

    view! {
        <Stylesheet id="leptos" href="/pkg/leptos-frontend.css"/>
        <Title text="Image Classification Workbench"/>
        <Router>
            <nav class="top-nav">
                <A href="/">"Process images"</A>
                <A href="/regions">"Classify regions"</A>
                <A href="/training">"Training data"</A>
            </nav>
            <main>
                <Routes fallback=|| "Page not found.">
                    <Route path=path!("/") view=ImageProcessor/>
                    <Route path=path!("/regions") view=RegionClassifier/>
                    <Route path=path!("/training") view=TrainingScatter/>
                </Routes>
            </main>
        </Router>
    }
}

#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    browser::init_logging();
    leptos::mount::mount_to_body(App);
}
