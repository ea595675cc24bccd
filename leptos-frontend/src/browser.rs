//! Thin helpers over the DOM APIs the pages share.

use std::io;

use js_sys::Uint8Array;
use tracing_subscriber::fmt::MakeWriter;
use vision_client::ImageUpload;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{File, FileList};

/// Route `tracing` output to the browser console.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(ConsoleMakeWriter)
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time()
        .try_init();
}

struct ConsoleMakeWriter;

/// Buffers one formatted event and logs it on drop.
struct ConsoleWriter(Vec<u8>);

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.0);
        let line = line.trim_end();
        if !line.is_empty() {
            web_sys::console::log_1(&JsValue::from_str(line));
        }
    }
}

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter(Vec::new())
    }
}

/// Milliseconds since the Unix epoch, from the JS clock.
pub fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

pub async fn read_file(file: &File) -> Result<ImageUpload, JsValue> {
    let buffer = JsFuture::from(file.array_buffer()).await?;
    let bytes = Uint8Array::new(&buffer).to_vec();
    Ok(ImageUpload::new(file.name(), file.type_(), bytes))
}

/// Read every file of a picker or drop payload, skipping unreadable ones.
pub async fn read_file_list(files: FileList) -> Vec<ImageUpload> {
    let mut uploads = Vec::with_capacity(files.length() as usize);
    for i in 0..files.length() {
        let Some(file) = files.get(i) else { continue };
        match read_file(&file).await {
            Ok(upload) => uploads.push(upload),
            Err(e) => tracing::warn!("Could not read {}: {:?}", file.name(), e),
        }
    }
    uploads
}

pub fn event_files(ev: &web_sys::Event) -> Option<FileList> {
    ev.target()?
        .dyn_into::<web_sys::HtmlInputElement>()
        .ok()?
        .files()
}

pub fn drop_files(ev: &web_sys::DragEvent) -> Option<FileList> {
    ev.data_transfer()?.files()
}

pub fn document() -> Option<web_sys::Document> {
    web_sys::window()?.document()
}
