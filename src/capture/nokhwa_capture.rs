use super::{CameraBackend, StreamRequest, VideoStream};
use crate::error::{CaptureError, Result};
use crate::types::FacingMode;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::future::Future;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

const IDEAL_FPS: u32 = 30;

/// Webcams reached through nokhwa.
///
/// Desktop cameras do not report a facing direction, so each facing mode is
/// bound to a device index. Both may point at the same device.
#[derive(Debug, Clone, Copy)]
pub struct NokhwaBackend {
    user_index: u32,
    environment_index: u32,
}

impl NokhwaBackend {
    pub fn new(user_index: u32, environment_index: u32) -> Self {
        Self {
            user_index,
            environment_index,
        }
    }

    fn device_for(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::User => self.user_index,
            FacingMode::Environment => self.environment_index,
        }
    }
}

impl CameraBackend for NokhwaBackend {
    fn acquire(
        &self,
        request: StreamRequest,
    ) -> impl Future<Output = Result<Box<dyn VideoStream>>> + Send {
        let device_index = self.device_for(request.facing);

        async move {
            tracing::info!(
                "Requesting {} camera (device {}) at {}x{}",
                request.facing,
                device_index,
                request.constraints.ideal_width,
                request.constraints.ideal_height
            );

            let (ready_tx, ready_rx) = oneshot::channel();
            let (command_tx, command_rx) = mpsc::channel();

            // The camera handle is not Send; it lives and dies on this thread.
            let worker = std::thread::Builder::new()
                .name(format!("camera-{}", device_index))
                .spawn(move || camera_worker(device_index, request, ready_tx, command_rx))
                .map_err(|e| CaptureError::Acquisition(e.to_string()))?;

            match ready_rx.await {
                Ok(Ok((width, height))) => {
                    tracing::info!("Camera {} streaming at {}x{}", device_index, width, height);
                    Ok(Box::new(NokhwaStream {
                        commands: command_tx,
                        worker: Some(worker),
                        resolution: (width, height),
                    }) as Box<dyn VideoStream>)
                }
                Ok(Err(e)) => {
                    let _ = worker.join();
                    Err(e)
                }
                Err(_) => {
                    let _ = worker.join();
                    Err(CaptureError::Acquisition(
                        "camera worker exited before the stream opened".into(),
                    ))
                }
            }
        }
    }
}

enum Command {
    Grab(mpsc::SyncSender<Result<RgbImage>>),
    Stop,
}

fn camera_worker(
    device_index: u32,
    request: StreamRequest,
    ready: oneshot::Sender<Result<(u32, u32)>>,
    commands: mpsc::Receiver<Command>,
) {
    let mut camera = match open_camera(device_index, &request) {
        Ok(camera) => camera,
        Err(e) => {
            tracing::warn!("Error accessing camera {}: {}", device_index, e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let resolution = camera.resolution();
    if ready
        .send(Ok((resolution.width(), resolution.height())))
        .is_err()
    {
        // Acquisition was abandoned while the device was opening.
        tracing::debug!("Camera {} opened after its request was dropped", device_index);
        release(&mut camera, device_index);
        return;
    }

    // Ends on Stop or when the stream handle is dropped.
    for command in commands {
        match command {
            Command::Grab(reply) => {
                let _ = reply.send(decode_frame(&mut camera));
            }
            Command::Stop => break,
        }
    }

    release(&mut camera, device_index);
}

fn open_camera(device_index: u32, request: &StreamRequest) -> Result<Camera> {
    let devices = nokhwa::query(ApiBackend::Auto).map_err(|e| {
        tracing::debug!("Camera query failed: {}", e);
        CaptureError::DeviceUnsupported
    })?;
    if devices.is_empty() {
        return Err(CaptureError::DeviceUnsupported);
    }

    let constraints = request.constraints;
    let ideal = CameraFormat::new(
        Resolution::new(constraints.ideal_width, constraints.ideal_height),
        FrameFormat::MJPEG,
        IDEAL_FPS,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(ideal));

    let mut camera = Camera::new(CameraIndex::Index(device_index), requested)
        .map_err(|e| CaptureError::Acquisition(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| CaptureError::Acquisition(e.to_string()))?;

    let actual = camera.resolution();
    if actual.width() > constraints.max_width || actual.height() > constraints.max_height {
        // Cameras may ignore the closest-format hint; fall back to the ideal size.
        if let Err(e) = camera.set_resolution(Resolution::new(
            constraints.ideal_width,
            constraints.ideal_height,
        )) {
            tracing::warn!(
                "Camera {} runs at {}x{} above the {}x{} cap: {}",
                device_index,
                actual.width(),
                actual.height(),
                constraints.max_width,
                constraints.max_height,
                e
            );
        }
    }

    Ok(camera)
}

fn decode_frame(camera: &mut Camera) -> Result<RgbImage> {
    let frame = camera
        .frame()
        .map_err(|e| CaptureError::Acquisition(format!("Failed to capture frame: {}", e)))?;
    let decoded = frame
        .decode_image::<RgbFormat>()
        .map_err(|e| CaptureError::Acquisition(format!("Failed to decode frame: {}", e)))?;

    let (width, height) = (decoded.width(), decoded.height());
    RgbImage::from_raw(width, height, decoded.into_raw()).ok_or_else(|| {
        CaptureError::Acquisition(format!("Frame buffer does not match {}x{}", width, height))
    })
}

fn release(camera: &mut Camera, device_index: u32) {
    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Failed to stop camera {}: {}", device_index, e);
    }
    tracing::info!("Camera {} released", device_index);
}

/// Handle to a stream served by a camera worker thread.
struct NokhwaStream {
    commands: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    resolution: (u32, u32),
}

impl VideoStream for NokhwaStream {
    fn grab_frame(&mut self) -> Result<RgbImage> {
        if self.worker.is_none() {
            return Err(CaptureError::NoActiveStream);
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.commands
            .send(Command::Grab(reply_tx))
            .map_err(|_| CaptureError::NoActiveStream)?;
        let frame = reply_rx.recv().map_err(|_| CaptureError::NoActiveStream)??;

        self.resolution = frame.dimensions();
        Ok(frame)
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Stop);
            if worker.join().is_err() {
                tracing::warn!("Camera worker panicked while stopping");
            }
        }
    }

    fn is_live(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.stop();
    }
}
