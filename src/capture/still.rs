use super::{CameraBackend, StreamRequest, VideoStream};
use crate::error::{CaptureError, Result};
use anyhow::Context;
use image::{imageops, RgbImage};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A backend that streams one fixed picture.
///
/// Serves offline runs against a photo of a document and lets the session
/// logic run without hardware. Live streams are counted so callers can
/// check that no handle outlives its session.
#[derive(Debug, Clone)]
pub struct StillImageBackend {
    frame: Arc<RgbImage>,
    acquire_delay: Duration,
    failure: Option<CaptureError>,
    failures_left: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl StillImageBackend {
    pub fn new(frame: RgbImage) -> Self {
        Self {
            frame: Arc::new(frame),
            acquire_delay: Duration::ZERO,
            failure: None,
            failures_left: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load the picture to stream from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let frame = image::open(path)
            .with_context(|| format!("Failed to load still frame from {}", path.display()))?
            .to_rgb8();
        tracing::info!(
            "Loaded still frame {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self::new(frame))
    }

    /// Simulate a device that takes `delay` to open.
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Every acquisition fails with `error`.
    pub fn failing(self, error: CaptureError) -> Self {
        self.failing_times(usize::MAX, error)
    }

    /// The next `times` acquisitions fail with `error`, later ones succeed.
    /// Clones share the count.
    pub fn failing_times(mut self, times: usize, error: CaptureError) -> Self {
        self.failure = Some(error);
        self.failures_left = Arc::new(AtomicUsize::new(times));
        self
    }

    /// Take one failure off the budget, if any is left.
    fn should_fail(&self) -> bool {
        self.failure.is_some()
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                    0 => None,
                    usize::MAX => Some(left),
                    left => Some(left - 1),
                })
                .is_ok()
    }

    /// Streams acquired and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn constrained_frame(&self, request: &StreamRequest) -> Arc<RgbImage> {
        let (width, height) = self.frame.dimensions();
        let max_w = request.constraints.max_width;
        let max_h = request.constraints.max_height;
        if width <= max_w && height <= max_h {
            return Arc::clone(&self.frame);
        }

        let scale = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
        let target_w = ((width as f64 * scale).round() as u32).max(1);
        let target_h = ((height as f64 * scale).round() as u32).max(1);
        tracing::debug!(
            "Downscaling still frame {}x{} to {}x{}",
            width,
            height,
            target_w,
            target_h
        );
        Arc::new(imageops::resize(
            &*self.frame,
            target_w,
            target_h,
            imageops::FilterType::Lanczos3,
        ))
    }
}

impl CameraBackend for StillImageBackend {
    fn acquire(
        &self,
        request: StreamRequest,
    ) -> impl Future<Output = Result<Box<dyn VideoStream>>> + Send {
        let backend = self.clone();

        async move {
            if !backend.acquire_delay.is_zero() {
                tokio::time::sleep(backend.acquire_delay).await;
            }
            if backend.should_fail() {
                if let Some(error) = backend.failure.clone() {
                    return Err(error);
                }
            }

            let frame = backend.constrained_frame(&request);
            backend.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StillStream {
                frame,
                live: Arc::clone(&backend.live),
                running: true,
            }) as Box<dyn VideoStream>)
        }
    }
}

struct StillStream {
    frame: Arc<RgbImage>,
    live: Arc<AtomicUsize>,
    running: bool,
}

impl VideoStream for StillStream {
    fn grab_frame(&mut self) -> Result<RgbImage> {
        if !self.running {
            return Err(CaptureError::NoActiveStream);
        }
        Ok((*self.frame).clone())
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.running
    }
}

impl Drop for StillStream {
    fn drop(&mut self) {
        self.stop();
    }
}
