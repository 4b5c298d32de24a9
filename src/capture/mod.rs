mod nokhwa_capture;
mod still;

pub use nokhwa_capture::NokhwaBackend;
pub use still::StillImageBackend;

use crate::config::StreamConstraints;
use crate::error::Result;
use crate::types::FacingMode;
use image::RgbImage;
use std::future::Future;

/// Parameters of one stream acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamRequest {
    pub facing: FacingMode,
    pub constraints: StreamConstraints,
}

/// Trait for platforms that can hand out live camera streams
pub trait CameraBackend {
    /// Acquire a video-only stream for the requested facing mode.
    ///
    /// Dropping the returned future before it resolves must release any
    /// device opened on its behalf.
    fn acquire(
        &self,
        request: StreamRequest,
    ) -> impl Future<Output = Result<Box<dyn VideoStream>>> + Send;
}

/// Trait for an acquired live stream
pub trait VideoStream: Send {
    /// Grab the current frame at native resolution
    fn grab_frame(&mut self) -> Result<RgbImage>;

    /// Native resolution of the frames (width, height)
    fn resolution(&self) -> (u32, u32);

    /// Halt every track. Returns once the device is released; repeated
    /// calls are no-ops.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}
