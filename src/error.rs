use thiserror::Error;

/// Failures surfaced by the capture pipeline.
///
/// None of these end a session. Acquisition failures are recorded on the
/// stream manager and shown to the user with a manual retry, capture
/// failures leave the session in its live view.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Camera not supported on this device")]
    DeviceUnsupported,
    #[error("Failed to access camera: {0}")]
    Acquisition(String),
    #[error("Invalid crop area: {0}")]
    InvalidCropGeometry(String),
    #[error("No active camera stream")]
    NoActiveStream,
    #[error("{action} is not available while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("Failed to encode still: {0}")]
    Encode(String),
}

impl CaptureError {
    /// Whether the host should offer a "try again" action for this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CaptureError::DeviceUnsupported)
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Encode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
