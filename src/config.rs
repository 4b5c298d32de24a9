use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Resolution preferences sent with every stream request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Per-document crop corrections, as fractions of the video frame.
///
/// The ID values were tuned against one wide-angle laptop camera and
/// should be calibrated per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropTuning {
    /// Added on every edge of a face crop.
    pub face_margin: f64,
    /// Shift applied to the left edge of an ID crop.
    pub id_offset_x: f64,
    /// Subtracted from the width of an ID crop.
    pub id_width_reduction: f64,
    /// An ID crop is never narrower than this.
    pub id_min_width: f64,
}

impl Default for CropTuning {
    fn default() -> Self {
        Self {
            face_margin: 0.05,
            id_offset_x: 0.35,
            id_width_reduction: 0.7,
            id_min_width: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub stream: StreamConstraints,
    pub crop: CropTuning,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Wait between releasing one camera and opening the other on a facing switch.
    pub switch_settle_ms: u64,
    /// Wait before re-engaging the stream after retake or side navigation.
    pub restart_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stream: StreamConstraints::default(),
            crop: CropTuning::default(),
            jpeg_quality: 80,
            switch_settle_ms: 500,
            restart_delay_ms: 100,
        }
    }
}

impl CaptureConfig {
    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture config from {}", path.display()))?;
        let config: CaptureConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse capture config {}", path.display()))?;
        config.validate()?;
        tracing::debug!("Loaded capture config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (1..=100).contains(&self.jpeg_quality),
            "jpeg_quality must be between 1 and 100, got {}",
            self.jpeg_quality
        );
        anyhow::ensure!(
            self.stream.ideal_width <= self.stream.max_width
                && self.stream.ideal_height <= self.stream.max_height,
            "ideal resolution {}x{} exceeds the cap {}x{}",
            self.stream.ideal_width,
            self.stream.ideal_height,
            self.stream.max_width,
            self.stream.max_height
        );
        let crop = &self.crop;
        for (name, value) in [
            ("face_margin", crop.face_margin),
            ("id_width_reduction", crop.id_width_reduction),
            ("id_min_width", crop.id_min_width),
        ] {
            anyhow::ensure!(
                (0.0..1.0).contains(&value),
                "{} must be within [0, 1), got {}",
                name,
                value
            );
        }
        anyhow::ensure!(
            crop.id_min_width > 0.0,
            "id_min_width must be positive"
        );
        Ok(())
    }

    pub fn switch_settle(&self) -> Duration {
        Duration::from_millis(self.switch_settle_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
