//! Preview handles for files waiting to be submitted.
//!
//! A handle is deliberately not `Clone`: the only way to give one up is to
//! pass it by value to [`PreviewAllocator::release`], so a handle can never be
//! released twice and the owner of the pending list is the only one that can
//! release it.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, warn};
use vision_client::ImageUpload;

/// Locally resolvable reference to an in-memory file (an object URL in the browser).
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Creates and releases preview handles.
pub trait PreviewAllocator {
    fn allocate(&mut self, image: &ImageUpload) -> PreviewHandle;
    fn release(&mut self, handle: PreviewHandle);
}

/// Allocator that hands out `preview://N` handles and tracks which are live.
///
/// Clones share the same bookkeeping, so a caller can keep one to observe
/// releases performed by a manager that owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPreviews {
    inner: Rc<RefCell<Ledger>>,
}

#[derive(Debug, Default)]
struct Ledger {
    next: u64,
    live: BTreeSet<String>,
    released: usize,
}

impl InMemoryPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.inner.borrow().live.len()
    }

    pub fn released_count(&self) -> usize {
        self.inner.borrow().released
    }

    pub fn is_live(&self, uri: &str) -> bool {
        self.inner.borrow().live.contains(uri)
    }
}

impl PreviewAllocator for InMemoryPreviews {
    fn allocate(&mut self, _image: &ImageUpload) -> PreviewHandle {
        let mut ledger = self.inner.borrow_mut();
        let uri = format!("preview://{}", ledger.next);
        ledger.next += 1;
        ledger.live.insert(uri.clone());
        PreviewHandle(uri)
    }

    fn release(&mut self, handle: PreviewHandle) {
        let mut ledger = self.inner.borrow_mut();
        if ledger.live.remove(handle.as_str()) {
            ledger.released += 1;
        } else {
            warn!("Released unknown preview handle {}", handle.as_str());
        }
    }
}

/// A file waiting to be submitted, together with its preview.
#[derive(Debug)]
pub struct PendingFile {
    pub image: ImageUpload,
    preview: PreviewHandle,
}

impl PendingFile {
    pub fn preview_uri(&self) -> &str {
        self.preview.as_str()
    }
}

/// Owns the pending file list and the one live preview handle of each file.
///
/// Every handle is released exactly once: on [`remove`](Self::remove),
/// [`clear`](Self::clear), or when the manager is dropped with the view.
#[derive(Debug)]
pub struct PreviewManager<P: PreviewAllocator> {
    allocator: P,
    files: Vec<PendingFile>,
}

impl<P: PreviewAllocator> PreviewManager<P> {
    pub fn new(allocator: P) -> Self {
        Self {
            allocator,
            files: Vec::new(),
        }
    }

    pub fn add(&mut self, images: impl IntoIterator<Item = ImageUpload>) {
        for image in images {
            let preview = self.allocator.allocate(&image);
            debug!("Preview {} for {}", preview.as_str(), image.file_name);
            self.files.push(PendingFile { image, preview });
        }
    }

    /// Release the file's preview, then forget the file.
    pub fn remove(&mut self, index: usize) -> Option<ImageUpload> {
        if index >= self.files.len() {
            warn!("Ignoring removal of pending file {} (have {})", index, self.files.len());
            return None;
        }
        let PendingFile { image, preview } = self.files.remove(index);
        self.allocator.release(preview);
        Some(image)
    }

    pub fn clear(&mut self) {
        for PendingFile { preview, .. } in self.files.drain(..) {
            self.allocator.release(preview);
        }
    }

    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Snapshot of the payloads, in list order. Cheap: bytes are shared.
    pub fn uploads(&self) -> Vec<ImageUpload> {
        self.files.iter().map(|f| f.image.clone()).collect()
    }

    pub fn allocator(&self) -> &P {
        &self.allocator
    }
}

impl<P: PreviewAllocator> Drop for PreviewManager<P> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> ImageUpload {
        ImageUpload::new(name, "image/png", vec![1u8, 2, 3])
    }

    #[test]
    fn test_live_handles_track_pending_files() {
        let previews = InMemoryPreviews::new();
        let mut manager = PreviewManager::new(previews.clone());

        manager.add(vec![image("a.png"), image("b.png"), image("c.png")]);
        assert_eq!(previews.live_count(), manager.len());

        let removed = manager.remove(1).unwrap();
        assert_eq!(removed.file_name, "b.png");
        assert_eq!(previews.live_count(), 2);
        assert_eq!(manager.len(), 2);

        assert!(manager.remove(5).is_none());
        assert_eq!(previews.live_count(), 2);

        manager.add(vec![image("d.png")]);
        assert_eq!(previews.live_count(), manager.len());

        let names: Vec<&str> = manager.files().iter().map(|f| f.image.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "c.png", "d.png"]);
    }

    #[test]
    fn test_removal_releases_the_removed_files_handle() {
        let previews = InMemoryPreviews::new();
        let mut manager = PreviewManager::new(previews.clone());
        manager.add(vec![image("a.png"), image("b.png")]);

        let kept = manager.files()[1].preview_uri().to_string();
        let dropped = manager.files()[0].preview_uri().to_string();
        manager.remove(0);

        assert!(!previews.is_live(&dropped));
        assert!(previews.is_live(&kept));
    }

    #[test]
    fn test_interleaved_add_remove_never_leaks() {
        let previews = InMemoryPreviews::new();
        let mut manager = PreviewManager::new(previews.clone());

        for round in 0..20usize {
            manager.add((0..(round % 3 + 1)).map(|i| image(&format!("{round}-{i}.png"))));
            assert_eq!(previews.live_count(), manager.len());
            if round % 2 == 0 {
                manager.remove(0);
            }
            if round % 5 == 4 {
                let last = manager.len().saturating_sub(1);
                manager.remove(last);
            }
            assert_eq!(previews.live_count(), manager.len());
        }
    }

    #[test]
    fn test_drop_releases_everything() {
        let previews = InMemoryPreviews::new();
        {
            let mut manager = PreviewManager::new(previews.clone());
            manager.add(vec![image("a.png"), image("b.png")]);
            assert_eq!(previews.live_count(), 2);
        }
        assert_eq!(previews.live_count(), 0);
        assert_eq!(previews.released_count(), 2);
    }
}
