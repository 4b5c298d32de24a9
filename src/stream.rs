//! Ownership of the live camera stream for one capture session.

use crate::capture::{CameraBackend, StreamRequest, VideoStream};
use crate::config::StreamConstraints;
use crate::error::{CaptureError, Result};
use crate::types::FacingMode;
use image::RgbImage;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Snapshot published to observers whenever the stream state changes.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatus {
    pub streaming: bool,
    pub facing: FacingMode,
    pub last_error: Option<CaptureError>,
}

/// Acquires, holds and releases the camera stream.
///
/// Acquisition failures never escape as errors: they are recorded in
/// [`last_error`](Self::last_error) and published on the status channel,
/// and the caller decides whether to offer a retry.
pub struct DeviceStreamManager<B> {
    backend: B,
    constraints: StreamConstraints,
    settle: Duration,
    facing: FacingMode,
    stream: Option<Box<dyn VideoStream>>,
    last_error: Option<CaptureError>,
    status: watch::Sender<StreamStatus>,
    cancel: CancellationToken,
}

impl<B: CameraBackend> DeviceStreamManager<B> {
    pub fn new(backend: B, constraints: StreamConstraints, settle: Duration) -> Self {
        let facing = FacingMode::Environment;
        let (status, _) = watch::channel(StreamStatus {
            streaming: false,
            facing,
            last_error: None,
        });

        Self {
            backend,
            constraints,
            settle,
            facing,
            stream: None,
            last_error: None,
            status,
            cancel: CancellationToken::new(),
        }
    }

    /// Acquire a stream for `facing`, replacing any current one.
    ///
    /// If the owning session is closed before the device resolves, the
    /// acquisition is abandoned and nothing is attached.
    pub async fn start(&mut self, facing: FacingMode) {
        self.stop();
        self.facing = facing;
        self.last_error = None;

        if self.cancel.is_cancelled() {
            tracing::debug!("Not starting {} camera: session closed", facing);
            self.publish();
            return;
        }

        let request = StreamRequest {
            facing,
            constraints: self.constraints,
        };
        let acquired = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("Camera start for {} abandoned: session closed", facing);
                self.publish();
                return;
            }
            result = self.backend.acquire(request) => result,
        };

        match acquired {
            Ok(mut stream) if self.cancel.is_cancelled() => {
                tracing::debug!("Session closed while {} camera opened, releasing", facing);
                stream.stop();
            }
            Ok(stream) => {
                let (width, height) = stream.resolution();
                tracing::info!("Streaming {} camera at {}x{}", facing, width, height);
                self.stream = Some(stream);
            }
            Err(e) => {
                tracing::warn!("Error accessing camera: {}", e);
                self.last_error = Some(e);
            }
        }
        self.publish();
    }

    /// Re-acquire with the current facing mode ("try again").
    pub async fn restart(&mut self) {
        self.start(self.facing).await;
    }

    /// Halt and detach the current stream. No-op when already stopped.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::info!("Stopped {} camera", self.facing);
            self.publish();
        }
    }

    /// Stop, flip the facing mode, wait for the device to settle, restart.
    pub async fn switch_facing(&mut self) {
        self.stop();
        let facing = self.facing.flipped();
        self.facing = facing;
        self.publish();
        tracing::info!("Switching camera to {}", facing);

        if !self.settle.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.settle) => {}
            }
        }
        self.start(facing).await;
    }

    /// Grab the current frame at native resolution.
    pub fn grab_frame(&mut self) -> Result<RgbImage> {
        match self.stream.as_mut() {
            Some(stream) if stream.is_live() => stream.grab_frame(),
            _ => Err(CaptureError::NoActiveStream),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            streaming: self.is_streaming(),
            facing: self.facing,
            last_error: self.last_error.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.status.subscribe()
    }

    /// Bind to the lifetime token of a (re)opened session.
    pub fn attach(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    /// Set the facing mode the next [`restart`](Self::restart) uses, without
    /// touching the current stream.
    pub fn set_facing(&mut self, facing: FacingMode) {
        self.facing = facing;
    }

    fn publish(&self) {
        let status = self.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

impl<B> Drop for DeviceStreamManager<B> {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}
