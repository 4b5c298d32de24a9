use crate::error::Result;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Serialize, Serializer};

/// A JPEG still ready for preview or upload.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl EncodedImage {
    pub const MIME: &'static str = "image/jpeg";

    /// Encode an RGB frame as JPEG at `quality` (1-100).
    pub fn jpeg(frame: &RgbImage, quality: u8) -> Result<Self> {
        let _span = tracing::debug_span!("encode_jpeg").entered();

        let mut data = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut data, quality);
        encoder.encode_image(frame)?;

        Ok(Self {
            width: frame.width(),
            height: frame.height(),
            data,
        })
    }

    /// `data:image/jpeg;base64,...`, embeddable in HTML or a JSON body.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            Self::MIME,
            BASE64_STANDARD.encode(&self.data)
        )
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodedImage({}x{}, {} bytes)",
            self.width,
            self.height,
            self.data.len()
        )
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_uri())
    }
}
