// src/services/image_codec.rs
use crate::errors::EditorError;
use crate::models::ImageMetadata;
use base64::{Engine as _, engine::general_purpose};
use image::{ColorType, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

/// An image decoded from its text form, normalized to 8-bit RGB.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: RgbImage,
    pub format: Option<ImageFormat>,
    pub color: ColorType,
    pub byte_size: usize,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Converts between base64 text (optionally `data:` URI prefixed) and rasters.
pub struct ImageCodec {
    max_bytes: usize,
}

impl ImageCodec {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn decode(&self, text: &str) -> Result<DecodedImage, EditorError> {
        let data = self.decode_bytes(text)?;

        let format = image::guess_format(&data).ok();
        let img = image::load_from_memory(&data)
            .map_err(|e| EditorError::Decode(format!("Invalid image data: {}", e)))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(EditorError::Decode("Image has zero width or height".to_string()));
        }

        Ok(DecodedImage {
            color: img.color(),
            image: img.to_rgb8(),
            format,
            byte_size: data.len(),
        })
    }

    /// Strips the optional URI prefix, base64-decodes, and enforces the size limit.
    pub fn decode_bytes(&self, text: &str) -> Result<Vec<u8>, EditorError> {
        // Line-wrapped base64 is common; the engine rejects embedded whitespace.
        let payload: String = strip_uri_prefix(text)
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        // Upper bound before decoding: 4 base64 chars encode 3 bytes.
        let estimated = payload.len() / 4 * 3;
        if estimated > self.max_bytes + 3 {
            return Err(EditorError::SizeLimitExceeded {
                actual: estimated,
                limit: self.max_bytes,
            });
        }

        let data = general_purpose::STANDARD
            .decode(&payload)
            .map_err(|e| EditorError::Decode(format!("Invalid base64 encoding: {}", e)))?;

        if data.len() > self.max_bytes {
            return Err(EditorError::SizeLimitExceeded {
                actual: data.len(),
                limit: self.max_bytes,
            });
        }

        Ok(data)
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn encode(&self, image: &RgbImage) -> Result<String, EditorError> {
        Ok(general_purpose::STANDARD.encode(self.encode_png(image)?))
    }

    pub fn encode_png(&self, image: &RgbImage) -> Result<Vec<u8>, EditorError> {
        let mut output = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| EditorError::Decode(format!("Failed to encode image: {}", e)))?;
        Ok(output)
    }

    pub fn metadata(&self, decoded: &DecodedImage) -> ImageMetadata {
        let (width, height) = decoded.dimensions();
        ImageMetadata {
            width,
            height,
            format: decoded
                .format
                .map(format_name)
                .unwrap_or_else(|| "Unknown".to_string()),
            mode: color_mode(decoded.color).to_string(),
            file_size: decoded.byte_size,
            upload_time: chrono::Utc::now(),
        }
    }

    /// Reads only the image header to report its dimensions.
    pub fn dimensions_of(&self, data: &[u8]) -> Result<(u32, u32), EditorError> {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| EditorError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| EditorError::Decode(format!("Unreadable image header: {}", e)))
    }
}

/// Everything after the first comma when the text carries a `data:...,` style prefix.
pub fn strip_uri_prefix(text: &str) -> &str {
    match text.split_once(',') {
        Some((_, rest)) => rest,
        None => text,
    }
}

/// Wraps bare base64 in a PNG data URI; URLs and data URIs pass through.
pub fn to_data_uri(text: &str) -> String {
    if text.starts_with("http://") || text.starts_with("https://") || text.starts_with("data:") {
        text.to_string()
    } else {
        format!("data:image/png;base64,{}", text)
    }
}

/// Data URI for raw image bytes, with the MIME type guessed from the content.
pub fn bytes_to_data_uri(data: &[u8]) -> String {
    let mime = image::guess_format(data)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png");
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(data))
}

fn format_name(format: ImageFormat) -> String {
    format!("{:?}", format).to_uppercase()
}

fn color_mode(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGBF",
        ColorType::Rgba32F => "RGBAF",
        _ => "unknown",
    }
}
