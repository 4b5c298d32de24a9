//! A capture session: stream, crop engine and slot flow behind the user actions
//! of the capture screen.

use crate::capture::CameraBackend;
use crate::config::CaptureConfig;
use crate::crop::CropEngine;
use crate::error::{CaptureError, Result};
use crate::flow::{CaptureFlow, CaptureResult, CapturedSlot, FlowEffect, FlowState};
use crate::geometry::OverlayGeometry;
use crate::stream::{DeviceStreamManager, StreamStatus};
use crate::types::{CaptureMode, DocumentKind, FacingMode, Phase, Side};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What the host asks for when it opens the capture screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub kind: DocumentKind,
    pub mode: CaptureMode,
    pub facing: FacingMode,
}

impl CaptureRequest {
    /// Faces are always taken in one shot.
    pub fn new(kind: DocumentKind, mode: CaptureMode) -> Self {
        let mode = match (kind, mode) {
            (DocumentKind::Face, CaptureMode::FrontBack) => {
                tracing::warn!("Front/back capture requested for a face, using single mode");
                CaptureMode::Single
            }
            (_, mode) => mode,
        };
        let facing = match kind {
            DocumentKind::Face => FacingMode::User,
            DocumentKind::IdentityDocument => FacingMode::Environment,
        };
        Self { kind, mode, facing }
    }

    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }
}

/// Closes a session from outside the task driving it.
#[derive(Debug, Clone)]
pub struct SessionCloser(CancellationToken);

impl SessionCloser {
    pub fn close(&self) {
        self.0.cancel();
    }
}

pub struct CaptureSession<B: CameraBackend> {
    request: CaptureRequest,
    flow: CaptureFlow,
    stream: DeviceStreamManager<B>,
    engine: CropEngine,
    restart_delay: Duration,
    lifetime: CancellationToken,
    closed: bool,
}

impl<B: CameraBackend> CaptureSession<B> {
    /// Build a session and bring up the live stream.
    ///
    /// A failed acquisition still returns an open session; check
    /// [`last_error`](Self::last_error) and offer [`retry`](Self::retry).
    pub async fn open(backend: B, request: CaptureRequest, config: &CaptureConfig) -> Self {
        let stream =
            DeviceStreamManager::new(backend, config.stream, config.switch_settle());
        let mut session = Self {
            request,
            flow: CaptureFlow::new(request.mode),
            stream,
            engine: CropEngine::new(config.crop, config.jpeg_quality),
            restart_delay: config.restart_delay(),
            lifetime: CancellationToken::new(),
            closed: true,
        };
        session.reopen(request).await;
        session
    }

    /// Start over with a fresh flow, whatever the previous outcome.
    pub async fn reopen(&mut self, request: CaptureRequest) {
        self.stream.stop();
        self.lifetime.cancel();

        self.lifetime = CancellationToken::new();
        self.stream.attach(self.lifetime.clone());
        self.request = request;
        self.flow = CaptureFlow::new(request.mode);
        self.closed = false;

        tracing::info!(
            "Opening {:?} capture in {:?} mode",
            request.kind,
            request.mode
        );
        self.stream.start(request.facing).await;
        self.observe_close();
    }

    pub fn closer(&self) -> SessionCloser {
        SessionCloser(self.lifetime.clone())
    }

    pub fn request(&self) -> &CaptureRequest {
        &self.request
    }

    pub fn phase(&self) -> Phase {
        if self.closed || self.lifetime.is_cancelled() {
            Phase::Closed
        } else if self.flow.is_reviewing() {
            Phase::Previewing
        } else {
            Phase::Live
        }
    }

    pub fn state(&self) -> FlowState {
        self.flow.state()
    }

    pub fn active_side(&self) -> Side {
        self.flow.active_side()
    }

    pub fn slots(&self) -> &[CapturedSlot] {
        self.flow.slots()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_streaming()
    }

    pub fn last_error(&self) -> Option<&CaptureError> {
        self.stream.last_error()
    }

    pub fn status(&self) -> StreamStatus {
        self.stream.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.stream.subscribe()
    }

    /// The shutter is usable only in the live view with a running stream.
    pub fn can_capture(&self) -> bool {
        self.phase() == Phase::Live && self.flow.can_capture() && self.stream.is_streaming()
    }

    /// Take a still for the active slot.
    ///
    /// Returns `Ok(false)` when no image could be produced; the session
    /// stays live so the user can press the shutter again.
    pub fn shutter(&mut self, overlay: Option<&OverlayGeometry>) -> Result<bool> {
        self.ensure_open("capture")?;
        if !self.flow.can_capture() {
            return Err(CaptureError::InvalidTransition {
                action: "capture",
                state: self.flow.state().as_str(),
            });
        }

        let Some(image) = self.engine.capture(&mut self.stream, self.request.kind, overlay) else {
            return Ok(false);
        };
        tracing::info!(
            "Captured {} side: {:?}",
            self.flow.active_side(),
            image
        );
        let effect = self.flow.record(image)?;
        self.apply(effect)?;
        Ok(true)
    }

    pub async fn retake(&mut self) -> Result<()> {
        self.ensure_open("retake")?;
        let effect = self.flow.retake()?;
        self.apply_async(effect).await
    }

    pub async fn next_side(&mut self) -> Result<()> {
        self.ensure_open("next side")?;
        let effect = self.flow.next_side()?;
        self.apply_async(effect).await
    }

    pub async fn previous_side(&mut self) -> Result<()> {
        self.ensure_open("previous side")?;
        let effect = self.flow.previous_side()?;
        self.apply_async(effect).await
    }

    /// Re-attempt acquisition after a failure ("try again").
    pub async fn retry(&mut self) -> Result<()> {
        self.ensure_open("retry")?;
        self.stream.restart().await;
        self.observe_close();
        Ok(())
    }

    pub async fn switch_facing(&mut self) -> Result<()> {
        self.ensure_open("switch camera")?;
        if self.flow.is_reviewing() {
            // Takes effect when the live view comes back.
            self.stream.set_facing(self.stream.facing().flipped());
            return Ok(());
        }
        self.stream.switch_facing().await;
        self.observe_close();
        Ok(())
    }

    /// Hand the captured image(s) to the host and close the session.
    pub fn confirm(&mut self) -> Result<CaptureResult> {
        self.ensure_open("confirm")?;
        match self.flow.confirm()? {
            FlowEffect::Emit(result) => {
                tracing::info!("{:?} capture confirmed", self.request.kind);
                self.close();
                Ok(result)
            }
            _ => Err(CaptureError::InvalidTransition {
                action: "confirm",
                state: self.flow.state().as_str(),
            }),
        }
    }

    /// Release the camera and end the session. Safe to call repeatedly.
    pub fn close(&mut self) {
        if !self.closed {
            tracing::info!("Closing {:?} capture", self.request.kind);
        }
        self.lifetime.cancel();
        self.stream.stop();
        self.closed = true;
    }

    fn ensure_open(&mut self, action: &'static str) -> Result<()> {
        self.observe_close();
        if self.closed {
            return Err(CaptureError::InvalidTransition {
                action,
                state: "closed",
            });
        }
        Ok(())
    }

    /// Pick up a close requested through a [`SessionCloser`].
    fn observe_close(&mut self) {
        if self.lifetime.is_cancelled() && !self.closed {
            self.close();
        }
    }

    /// Apply an effect that needs no waiting. A restart has to go through
    /// [`apply_async`](Self::apply_async) and is refused here.
    fn apply(&mut self, effect: FlowEffect) -> Result<()> {
        match effect {
            FlowEffect::ReleaseStream => self.stream.stop(),
            FlowEffect::Stay | FlowEffect::Emit(_) => {}
            FlowEffect::RestartStream => {
                return Err(CaptureError::InvalidTransition {
                    action: "restart stream",
                    state: self.flow.state().as_str(),
                })
            }
        }
        Ok(())
    }

    async fn apply_async(&mut self, effect: FlowEffect) -> Result<()> {
        if effect != FlowEffect::RestartStream {
            return self.apply(effect);
        }

        if !self.restart_delay.is_zero() {
            tokio::select! {
                _ = self.lifetime.cancelled() => {
                    self.observe_close();
                    return Ok(());
                }
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }
        self.stream.restart().await;
        self.observe_close();
        Ok(())
    }
}

impl<B: CameraBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StillImageBackend;
    use image::RgbImage;

    fn config() -> CaptureConfig {
        CaptureConfig {
            restart_delay_ms: 0,
            ..CaptureConfig::default()
        }
    }

    #[tokio::test]
    async fn restart_effect_is_refused_without_waiting() {
        let backend = StillImageBackend::new(RgbImage::new(64, 64));
        let request = CaptureRequest::new(DocumentKind::Face, CaptureMode::Single);
        let mut session = CaptureSession::open(backend.clone(), request, &config()).await;
        session.stream.stop();

        assert!(matches!(
            session.apply(FlowEffect::RestartStream),
            Err(CaptureError::InvalidTransition { .. })
        ));
        assert!(!session.is_streaming());

        session.apply_async(FlowEffect::RestartStream).await.unwrap();
        assert!(session.is_streaming());
        assert_eq!(backend.live_streams(), 1);
    }

    #[tokio::test]
    async fn release_effect_stops_the_stream() {
        let backend = StillImageBackend::new(RgbImage::new(64, 64));
        let request = CaptureRequest::new(DocumentKind::IdentityDocument, CaptureMode::Single);
        let mut session = CaptureSession::open(backend.clone(), request, &config()).await;

        session.apply(FlowEffect::Stay).unwrap();
        assert!(session.is_streaming());
        session.apply(FlowEffect::ReleaseStream).unwrap();
        assert!(!session.is_streaming());
        assert_eq!(backend.live_streams(), 0);
    }
}
