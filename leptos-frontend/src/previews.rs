use base64::{engine::general_purpose, Engine as _};
use js_sys::{Array, Uint8Array};
use tracing::warn;
use vision_client::{data_uri, ImageUpload};
use wasm_bindgen::JsValue;
use web_sys::{Blob, BlobPropertyBag, Url};
use workbench_core::{PreviewAllocator, PreviewHandle};

const OBJECT_URL_PREFIX: &str = "blob:";

/// Previews backed by `URL.createObjectURL`.
#[derive(Debug, Default)]
pub struct BrowserPreviews;

fn object_url(image: &ImageUpload) -> Result<String, JsValue> {
    let parts = Array::of1(&Uint8Array::from(&image.bytes[..]));
    let options = BlobPropertyBag::new();
    options.set_type(&image.mime_type);
    let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
    Url::create_object_url_with_blob(&blob)
}

impl PreviewAllocator for BrowserPreviews {
    fn allocate(&mut self, image: &ImageUpload) -> PreviewHandle {
        match object_url(image) {
            Ok(url) => PreviewHandle::new(url),
            Err(e) => {
                // Inline the bytes; there is nothing to revoke later
                warn!("createObjectURL failed for {}: {:?}", image.file_name, e);
                let payload = general_purpose::STANDARD.encode(&image.bytes);
                PreviewHandle::new(data_uri(&image.mime_type, &payload))
            }
        }
    }

    fn release(&mut self, handle: PreviewHandle) {
        let uri = handle.into_inner();
        if uri.starts_with(OBJECT_URL_PREFIX) {
            if let Err(e) = Url::revoke_object_url(&uri) {
                warn!("revokeObjectURL failed for {}: {:?}", uri, e);
            }
        }
    }
}
