//! Upload, process and poll lifecycle for the image classification workbench.
//!
//! Everything here is independent of the browser. The Leptos views and the
//! command line driver feed user intent in as [`Action`]s and run the async
//! workflows ([`submit_all`], [`poll_all`], [`analyze_image`]) against any
//! [`vision_client::ImageBackend`].

pub mod annotate;
pub mod capture;
pub mod gallery;
pub mod poller;
pub mod preview;
pub mod regions;
pub mod scatter;
pub mod submission;
pub mod workbench;

#[cfg(test)]
mod testing;

pub use annotate::{encode_png, render_boxes, BoxAnnotation};
pub use capture::{
    CameraController, CameraDevice, CameraFrame, CameraPhase, CaptureError, CaptureSource,
    StreamRequest, StreamSource,
};
pub use gallery::{gallery_images, AutoplayDelay, GalleryImage, Modal, ResultCard};
pub use poller::{poll_all, PollBatch, PollReport};
pub use preview::{InMemoryPreviews, PendingFile, PreviewAllocator, PreviewHandle, PreviewManager};
pub use regions::{analyze_image, RegionAnalysis, RegionSession, RegionState, RunId, UNKNOWN_CLASS};
pub use scatter::{Camera3d, FeatureBounds, TrainingPlot};
pub use submission::{submit_all, SubmissionBatch, SubmissionReport};
pub use workbench::{
    Action, Epoch, FormState, Notice, NoticeKind, UploadProgress, Workbench, DEFAULT_THRESHOLD,
    NOTICE_TIMEOUT_MS,
};
