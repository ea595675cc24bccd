//! Capture sources and the camera state machine.
//!
//! Picked files, dropped files and camera snapshots all end up as
//! [`ImageUpload`]s appended through [`Action::FilesAdded`](crate::Action).
//! Nothing here validates media types; whatever the browser hands over is
//! forwarded and any problem surfaces as a backend error.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use thiserror::Error;
use tracing::{debug, info, warn};
use vision_client::ImageUpload;

pub const CAPTURE_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    FilePicker,
    DragDrop,
    Camera,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera is not streaming")]
    NotStreaming,

    #[error("camera frame is empty")]
    EmptyFrame,

    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("failed to encode frame as PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// A video input reported by device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub device_id: String,
    pub label: String,
}

impl CameraDevice {
    /// Browsers hide labels until permission is granted.
    pub fn display_label(&self) -> String {
        if self.label.trim().is_empty() {
            let short: String = self.device_id.chars().take(8).collect();
            format!("Camera {}", short)
        } else {
            self.label.clone()
        }
    }
}

/// What to ask the media API for when starting a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    Device(String),
    /// No device chosen: request the rear-facing camera.
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPhase {
    Idle,
    DeviceSelected,
    Streaming,
}

/// One RGBA frame read back from the video surface.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A stream request handed out by [`CameraController::start`]. The session
/// tells a late `getUserMedia` answer apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub source: StreamSource,
    pub session: u64,
}

/// `idle -> device-selected -> streaming -> (capture -> streaming)*`, with
/// `stop` returning to idle. The chosen device is remembered across stops.
#[derive(Debug, Clone)]
pub struct CameraController {
    devices: Vec<CameraDevice>,
    selected: Option<String>,
    phase: CameraPhase,
    session: u64,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraController {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            selected: None,
            phase: CameraPhase::Idle,
            session: 0,
        }
    }

    /// Record the result of the single enumeration done per mount and
    /// preselect the first device.
    pub fn devices_enumerated(&mut self, devices: Vec<CameraDevice>) {
        debug!("{} video input(s) found", devices.len());
        if self.selected.is_none() {
            self.selected = devices.first().map(|d| d.device_id.clone());
            if self.selected.is_some() && self.phase == CameraPhase::Idle {
                self.phase = CameraPhase::DeviceSelected;
            }
        }
        self.devices = devices;
    }

    /// Switching device is ignored while a stream is live.
    pub fn select_device(&mut self, device_id: impl Into<String>) -> bool {
        if self.is_streaming() {
            warn!("Ignoring device change while streaming");
            return false;
        }
        let device_id = device_id.into();
        if device_id.is_empty() {
            self.selected = None;
            self.phase = CameraPhase::Idle;
        } else {
            self.selected = Some(device_id);
            self.phase = CameraPhase::DeviceSelected;
        }
        true
    }

    /// Begin streaming; returns what to request from the media API, or
    /// `None` if already streaming.
    pub fn start(&mut self) -> Option<StreamRequest> {
        if self.is_streaming() {
            return None;
        }
        self.phase = CameraPhase::Streaming;
        self.session += 1;
        let source = match &self.selected {
            Some(id) => StreamSource::Device(id.clone()),
            None => StreamSource::Environment,
        };
        info!("Camera starting with {:?}", source);
        Some(StreamRequest {
            source,
            session: self.session,
        })
    }

    /// Whether a stream opened for `session` should be attached. A stream
    /// that arrives after a stop, or after a newer start, must be shut down
    /// by the caller.
    pub fn accepts_stream(&self, session: u64) -> bool {
        self.is_streaming() && self.session == session
    }

    /// The media API refused the stream; the toggle reverts and nothing is
    /// retried. Failures of superseded sessions are ignored.
    pub fn start_failed(&mut self, session: u64) {
        if !self.accepts_stream(session) {
            return;
        }
        warn!("Camera access failed");
        self.phase = self.resting_phase();
    }

    pub fn stop(&mut self) {
        if self.is_streaming() {
            info!("Camera stopped");
        }
        self.phase = CameraPhase::Idle;
    }

    fn resting_phase(&self) -> CameraPhase {
        if self.selected.is_some() {
            CameraPhase::DeviceSelected
        } else {
            CameraPhase::Idle
        }
    }

    pub fn phase(&self) -> CameraPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == CameraPhase::Streaming
    }

    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Encode the current frame as `capture_<unix-millis>.png`. The stream
    /// keeps running.
    pub fn capture(
        &self,
        frame: CameraFrame,
        timestamp_ms: u64,
    ) -> Result<ImageUpload, CaptureError> {
        if !self.is_streaming() {
            return Err(CaptureError::NotStreaming);
        }
        let png = encode_frame(frame)?;
        let file_name = format!("capture_{}.png", timestamp_ms);
        debug!("Captured {} ({} bytes)", file_name, png.len());
        Ok(ImageUpload::new(file_name, CAPTURE_MIME_TYPE, png))
    }
}

fn encode_frame(frame: CameraFrame) -> Result<Vec<u8>, CaptureError> {
    let CameraFrame {
        width,
        height,
        rgba,
    } = frame;
    if width == 0 || height == 0 {
        return Err(CaptureError::EmptyFrame);
    }
    let expected = width as usize * height as usize * 4;
    let actual = rgba.len();
    let image = RgbaImage::from_raw(width, height, rgba).ok_or(CaptureError::FrameSize {
        width,
        height,
        expected,
        actual,
    })?;

    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
