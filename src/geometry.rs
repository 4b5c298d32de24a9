//! Mapping from on-screen overlay guides to source-pixel crop rectangles.
//!
//! The overlay is measured in screen pixels against the video element that
//! displays the live stream. With `Cover` and `Fill` the frame spans the
//! whole element, so percentages are taken against the element box. With
//! `Contain` the frame is letterboxed and percentages are taken against the
//! content between the bars. Either way they are then multiplied by the
//! native frame size.

use crate::config::CropTuning;
use crate::error::{CaptureError, Result};
use crate::types::DocumentKind;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// A rectangle anchored at the origin.
    pub fn sized(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }
}

/// How the video element scales the native frame into its box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFit {
    /// Scale to fill the box, preserving aspect ratio; overflow is hidden.
    #[default]
    Cover,
    /// Scale to fit inside the box, preserving aspect ratio; bars on the short axis.
    Contain,
    /// Stretch to the box.
    Fill,
}

/// The guide shape and the video element it is drawn over, both in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayGeometry {
    pub video: ScreenRect,
    pub overlay: ScreenRect,
    #[serde(default)]
    pub fit: ObjectFit,
}

impl OverlayGeometry {
    pub fn new(video: ScreenRect, overlay: ScreenRect, fit: ObjectFit) -> Self {
        Self {
            video,
            overlay,
            fit,
        }
    }

    /// Screen-space rectangle the overlay percentages are measured against.
    ///
    /// The element box itself unless the frame is letterboxed (`Contain`),
    /// in which case the bars are left out.
    pub fn content_bounds(&self, native_width: u32, native_height: u32) -> Result<ScreenRect> {
        let video = self.video;
        if !(video.width > 0.0 && video.height > 0.0) || native_width == 0 || native_height == 0 {
            return Err(CaptureError::InvalidCropGeometry(format!(
                "video element {}x{} with native frame {}x{}",
                video.width, video.height, native_width, native_height
            )));
        }

        if self.fit != ObjectFit::Contain {
            return Ok(video);
        }

        let native_aspect = native_width as f64 / native_height as f64;
        let display_aspect = video.width / video.height;
        let (width, height) = if native_aspect > display_aspect {
            // Bars above and below.
            (video.width, video.width / native_aspect)
        } else {
            // Bars left and right.
            (video.height * native_aspect, video.height)
        };

        Ok(ScreenRect::new(
            video.left + (video.width - width) / 2.0,
            video.top + (video.height - height) / 2.0,
            width,
            height,
        ))
    }

    /// Overlay position and size as fractions of the native frame.
    pub fn to_region(&self, native_width: u32, native_height: u32) -> Result<CropRegion> {
        let content = self.content_bounds(native_width, native_height)?;
        let region = CropRegion {
            x: (self.overlay.left - content.left) / content.width,
            y: (self.overlay.top - content.top) / content.height,
            width: self.overlay.width / content.width,
            height: self.overlay.height / content.height,
        };
        tracing::debug!(
            "Overlay {:?} over content {:?} -> {:?}",
            self.overlay,
            content,
            region
        );
        Ok(region)
    }
}

/// A rectangle expressed as fractions (0..1) of the video frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Apply the document-specific correction, without clamping to the frame.
    pub fn adjusted(self, kind: DocumentKind, tuning: &CropTuning) -> Self {
        match kind {
            DocumentKind::Face => {
                let margin = tuning.face_margin;
                Self::new(
                    self.x - margin,
                    self.y - margin,
                    self.width + margin * 2.0,
                    self.height + margin * 2.0,
                )
            }
            DocumentKind::IdentityDocument => {
                // Vertical extent is kept as drawn.
                let width = (self.width - tuning.id_width_reduction).max(tuning.id_min_width);
                let x = (self.x + tuning.id_offset_x).min(1.0 - width);
                Self::new(x, self.y, width, self.height)
            }
        }
    }

    /// Pull the rectangle inside the unit square by shrinking it.
    ///
    /// A negative origin is moved to zero and the overhang taken off the
    /// size; anything past the far edge is cut.
    pub fn clamped(self) -> Self {
        let mut region = self;
        if region.x < 0.0 {
            region.width += region.x;
            region.x = 0.0;
        }
        if region.y < 0.0 {
            region.height += region.y;
            region.y = 0.0;
        }
        region.width = region.width.min(1.0 - region.x);
        region.height = region.height.min(1.0 - region.y);
        region
    }

    pub fn is_within_unit(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= 1.0 + f64::EPSILON
            && self.y + self.height <= 1.0 + f64::EPSILON
    }

    /// Scale to source pixels of a `native_width` x `native_height` frame.
    pub fn to_pixels(&self, native_width: u32, native_height: u32) -> Result<PixelRect> {
        let invalid = || {
            CaptureError::InvalidCropGeometry(format!(
                "{:?} against a {}x{} frame",
                self, native_width, native_height
            ))
        };

        if ![self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(invalid());
        }

        let frame_w = native_width as f64;
        let frame_h = native_height as f64;
        // Absorbs rounding left over from the screen-space division.
        let scale = |fraction: f64, extent: f64| (fraction * extent + 1e-6).floor();
        let x = scale(self.x, frame_w);
        let y = scale(self.y, frame_h);
        let width = scale(self.width, frame_w);
        let height = scale(self.height, frame_h);

        if x < 0.0 || y < 0.0 || x >= frame_w || y >= frame_h || width <= 0.0 || height <= 0.0 {
            return Err(invalid());
        }

        let x = x as u32;
        let y = y as u32;
        Ok(PixelRect {
            x,
            y,
            width: (width as u32).min(native_width - x),
            height: (height as u32).min(native_height - y),
        })
    }
}

/// A crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn assert_region(actual: CropRegion, expected: CropRegion) {
        assert!(
            close(actual.x, expected.x)
                && close(actual.y, expected.y)
                && close(actual.width, expected.width)
                && close(actual.height, expected.height),
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    fn wide_into_four_three(fit: ObjectFit) -> OverlayGeometry {
        // Full displayed width, vertical center 50%.
        OverlayGeometry::new(
            ScreenRect::sized(640.0, 480.0),
            ScreenRect::new(0.0, 120.0, 640.0, 240.0),
            fit,
        )
    }

    #[test]
    fn letterboxed_wide_video_maps_full_width() {
        let geometry = wide_into_four_three(ObjectFit::Contain);
        let region = geometry.to_region(1920, 1080).unwrap().clamped();
        let pixels = region.to_pixels(1920, 1080).unwrap();

        assert_eq!(pixels.x, 0);
        assert_eq!(pixels.width, 1920);
        // 360px of content height, bars of 60px above and below.
        assert_eq!(pixels.y, 180);
        assert_eq!(pixels.height, 720);
    }

    #[test]
    fn cover_wide_video_maps_full_native_width() {
        for fit in [ObjectFit::Cover, ObjectFit::default()] {
            let geometry = wide_into_four_three(fit);
            let pixels = geometry
                .to_region(1920, 1080)
                .unwrap()
                .clamped()
                .to_pixels(1920, 1080)
                .unwrap();
            assert_eq!(
                pixels,
                PixelRect {
                    x: 0,
                    y: 270,
                    width: 1920,
                    height: 540
                }
            );
        }
    }

    #[test]
    fn only_contain_leaves_out_bars() {
        let video = ScreenRect::new(10.0, 20.0, 640.0, 480.0);
        for fit in [ObjectFit::Cover, ObjectFit::Fill] {
            let geometry = OverlayGeometry::new(video, video, fit);
            assert_eq!(geometry.content_bounds(1920, 1080).unwrap(), video);
        }

        let tall = OverlayGeometry::new(video, video, ObjectFit::Contain);
        let content = tall.content_bounds(720, 1280).unwrap();
        assert!(close(content.height, 480.0));
        assert!(close(content.width, 270.0));
        assert!(close(content.left, 10.0 + 185.0));
    }

    #[test]
    fn fill_is_plain_percentage() {
        let geometry = wide_into_four_three(ObjectFit::Fill);
        let region = geometry.to_region(1920, 1080).unwrap();
        assert_region(region, CropRegion::new(0.0, 0.25, 1.0, 0.5));
    }

    #[test]
    fn percentages_use_the_video_element_not_the_page() {
        let geometry = OverlayGeometry::new(
            ScreenRect::new(100.0, 50.0, 400.0, 300.0),
            ScreenRect::new(200.0, 125.0, 200.0, 150.0),
            ObjectFit::Cover,
        );
        let region = geometry.to_region(800, 600).unwrap();
        assert_region(region, CropRegion::new(0.25, 0.25, 0.5, 0.5));
    }

    #[test]
    fn face_margin_expands_every_edge() {
        let region = CropRegion::new(0.3, 0.3, 0.4, 0.4)
            .adjusted(DocumentKind::Face, &CropTuning::default());
        assert_region(region, CropRegion::new(0.25, 0.25, 0.5, 0.5));
        assert_region(region.clamped(), region);
    }

    #[test]
    fn face_margin_at_edge_shrinks_instead_of_going_negative() {
        let region = CropRegion::new(0.02, 0.0, 0.96, 0.5)
            .adjusted(DocumentKind::Face, &CropTuning::default())
            .clamped();
        assert!(region.is_within_unit());
        assert!(close(region.x, 0.0));
        assert!(close(region.width, 1.0));
        assert!(close(region.y, 0.0));
        assert!(close(region.height, 0.55));
    }

    #[test]
    fn id_heuristic_shifts_and_narrows() {
        let tuning = CropTuning::default();
        let region = CropRegion::new(0.05, 0.2, 0.9, 0.6)
            .adjusted(DocumentKind::IdentityDocument, &tuning)
            .clamped();
        assert_region(region, CropRegion::new(0.4, 0.2, 0.2, 0.6));
    }

    #[test]
    fn id_heuristic_respects_width_floor() {
        let tuning = CropTuning::default();
        let region = CropRegion::new(0.3, 0.3, 0.5, 0.4)
            .adjusted(DocumentKind::IdentityDocument, &tuning)
            .clamped();
        assert!(close(region.width, 0.1));
        assert!(close(region.x, 0.65));
        assert!(close(region.height, 0.4));
    }

    #[test]
    fn id_heuristic_pulls_back_inside_right_edge() {
        let tuning = CropTuning::default();
        let region = CropRegion::new(0.8, 0.1, 0.2, 0.3)
            .adjusted(DocumentKind::IdentityDocument, &tuning)
            .clamped();
        assert!(close(region.x, 0.9));
        assert!(close(region.width, 0.1));
        assert!(region.is_within_unit());
    }

    #[test]
    fn custom_tuning_is_honoured() {
        let tuning = CropTuning {
            id_offset_x: 0.0,
            id_width_reduction: 0.0,
            ..CropTuning::default()
        };
        let region = CropRegion::new(0.1, 0.2, 0.8, 0.5)
            .adjusted(DocumentKind::IdentityDocument, &tuning);
        assert_region(region, CropRegion::new(0.1, 0.2, 0.8, 0.5));
    }

    #[test]
    fn clamped_regions_stay_inside_frame_for_inner_overlays() {
        let tuning = CropTuning::default();
        let video = ScreenRect::new(10.0, 20.0, 640.0, 480.0);
        let natives = [(1920, 1080), (1280, 720), (720, 1280), (640, 480)];
        let fits = [ObjectFit::Cover, ObjectFit::Contain, ObjectFit::Fill];
        let kinds = [DocumentKind::Face, DocumentKind::IdentityDocument];

        for &(nw, nh) in &natives {
            for &fit in &fits {
                for &kind in &kinds {
                    for step_x in 0..8 {
                        for step_y in 0..6 {
                            let left = video.left + step_x as f64 * 40.0;
                            let top = video.top + step_y as f64 * 40.0;
                            let overlay = ScreenRect::new(
                                left,
                                top,
                                video.left + video.width - left - 1.0,
                                video.top + video.height - top - 1.0,
                            );
                            let geometry = OverlayGeometry::new(video, overlay, fit);
                            let region = geometry
                                .to_region(nw, nh)
                                .unwrap()
                                .adjusted(kind, &tuning)
                                .clamped();
                            assert!(
                                region.is_within_unit(),
                                "{:?} {:?} {:?} -> {:?}",
                                fit,
                                kind,
                                overlay,
                                region
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn degenerate_regions_are_rejected() {
        assert!(matches!(
            CropRegion::new(1.2, 0.0, -0.2, 0.5).to_pixels(100, 100),
            Err(CaptureError::InvalidCropGeometry(_))
        ));
        assert!(CropRegion::new(0.0, 0.0, 0.001, 0.5).to_pixels(100, 100).is_err());
        assert!(CropRegion::new(0.0, 0.0, f64::NAN, 0.5).to_pixels(100, 100).is_err());
        assert!(CropRegion::full().to_pixels(0, 100).is_err());
    }

    #[test]
    fn zero_sized_video_element_is_rejected() {
        let geometry = OverlayGeometry::new(
            ScreenRect::sized(0.0, 480.0),
            ScreenRect::sized(10.0, 10.0),
            ObjectFit::Cover,
        );
        assert!(geometry.to_region(1920, 1080).is_err());
    }
}
