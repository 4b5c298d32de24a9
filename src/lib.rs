//! Camera capture and cropping for KYC document and face acquisition.
//!
//! A [`CaptureSession`] owns a live stream from a [`CameraBackend`], turns
//! the frame under an on-screen overlay guide into a JPEG still, and walks
//! the user through single-shot or front/back capture until they confirm.

pub mod capture;
pub mod config;
pub mod context;
pub mod crop;
pub mod encode;
pub mod error;
pub mod flow;
pub mod geometry;
pub mod session;
pub mod stream;
pub mod types;

pub use capture::{CameraBackend, NokhwaBackend, StillImageBackend, StreamRequest, VideoStream};
pub use config::{CaptureConfig, CropTuning, StreamConstraints};
pub use context::{ApplicationContext, ApplicationData, KycDocuments};
pub use crop::CropEngine;
pub use encode::EncodedImage;
pub use error::{CaptureError, Result};
pub use flow::{CaptureFlow, CaptureResult, CapturedSlot, FlowEffect, FlowState};
pub use geometry::{CropRegion, ObjectFit, OverlayGeometry, PixelRect, ScreenRect};
pub use session::{CaptureRequest, CaptureSession, SessionCloser};
pub use stream::{DeviceStreamManager, StreamStatus};
pub use types::{CaptureMode, DocumentKind, FacingMode, Phase, Side};
