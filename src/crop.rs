//! Turns the live frame into an encoded still, optionally limited to the
//! region under the overlay guide.

use crate::capture::CameraBackend;
use crate::config::CropTuning;
use crate::encode::EncodedImage;
use crate::error::Result;
use crate::geometry::{CropRegion, OverlayGeometry, PixelRect};
use crate::stream::DeviceStreamManager;
use crate::types::DocumentKind;
use image::{imageops, RgbImage};

#[derive(Debug, Clone)]
pub struct CropEngine {
    tuning: CropTuning,
    jpeg_quality: u8,
}

impl CropEngine {
    pub fn new(tuning: CropTuning, jpeg_quality: u8) -> Self {
        Self {
            tuning,
            jpeg_quality,
        }
    }

    /// Normalized crop for `overlay` on a frame of the given native size,
    /// corrected for `kind` and clamped to the frame.
    pub fn crop_region(
        &self,
        kind: DocumentKind,
        overlay: &OverlayGeometry,
        native_width: u32,
        native_height: u32,
    ) -> Result<CropRegion> {
        let region = overlay
            .to_region(native_width, native_height)?
            .adjusted(kind, &self.tuning)
            .clamped();
        tracing::debug!("{:?} crop region {:?}", kind, region);
        Ok(region)
    }

    /// Source-pixel rectangle for `overlay`.
    pub fn pixel_rect(
        &self,
        kind: DocumentKind,
        overlay: &OverlayGeometry,
        native_width: u32,
        native_height: u32,
    ) -> Result<PixelRect> {
        self.crop_region(kind, overlay, native_width, native_height)?
            .to_pixels(native_width, native_height)
    }

    /// Capture the current frame, or `None` when there is nothing sensible
    /// to return (no stream, degenerate crop, encoder failure).
    pub fn capture<B: CameraBackend>(
        &self,
        stream: &mut DeviceStreamManager<B>,
        kind: DocumentKind,
        overlay: Option<&OverlayGeometry>,
    ) -> Option<EncodedImage> {
        match self.try_capture(stream, kind, overlay) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::info!("Capture produced no image: {}", e);
                None
            }
        }
    }

    pub fn try_capture<B: CameraBackend>(
        &self,
        stream: &mut DeviceStreamManager<B>,
        kind: DocumentKind,
        overlay: Option<&OverlayGeometry>,
    ) -> Result<EncodedImage> {
        let frame = stream.grab_frame()?;
        self.render(&frame, kind, overlay)
    }

    /// Crop and encode an already grabbed frame.
    pub fn render(
        &self,
        frame: &RgbImage,
        kind: DocumentKind,
        overlay: Option<&OverlayGeometry>,
    ) -> Result<EncodedImage> {
        let _span = tracing::debug_span!("render_still").entered();

        let Some(overlay) = overlay else {
            return EncodedImage::jpeg(frame, self.jpeg_quality);
        };

        let (width, height) = frame.dimensions();
        let rect = self.pixel_rect(kind, overlay, width, height)?;
        tracing::debug!(
            "Cropping {}x{}+{}+{} from {}x{}",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            width,
            height
        );

        let cropped = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
        EncodedImage::jpeg(&cropped, self.jpeg_quality)
    }
}
