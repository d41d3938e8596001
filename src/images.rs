//! Re-encodes downloaded flyer images into Discord-friendly formats.
//!
//! Flyer sites serve WebP almost exclusively; uploads go out as JPEG or PNG
//! depending on what the source URL claims to be.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use std::io::Cursor;

const JPEG_QUALITY: u8 = 95;

/// A transcoded flyer page ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFlyer {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl EncodedFlyer {
    pub fn content_type(&self) -> &'static str {
        match self.filename.rsplit_once('.').map(|(_, ext)| ext) {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            _ => "application/octet-stream",
        }
    }
}

/// Decode `bytes` (any format the `image` crate knows, WebP included) and
/// re-encode. A source URL ending in `.jpg`/`.jpeg` (any case) produces JPEG
/// at quality 95; everything else produces PNG, keeping the alpha channel.
pub fn transcode(bytes: &[u8], source_url: &str) -> Result<EncodedFlyer> {
    let img = image::load_from_memory(bytes)
        .with_context(|| format!("failed to decode image from {source_url}"))?;

    let lower = source_url.to_ascii_lowercase();
    let mut out = Vec::new();
    let ext = if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        // JPEG has no alpha; flatten to RGB before encoding.
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&img.to_rgb8())?;
        "jpg"
    } else {
        img.to_rgba8()
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        "png"
    };

    Ok(EncodedFlyer {
        filename: output_filename(source_url, ext),
        bytes: out,
    })
}

/// Upload filename: the final `/`-segment of the source URL with its
/// extension swapped for `ext` (appended when the segment has none).
fn output_filename(source_url: &str, ext: &str) -> String {
    let segment = source_url.rsplit('/').next().unwrap_or_default();
    let stem = match segment.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => segment,
    };
    if stem.is_empty() {
        format!("flyer.{ext}")
    } else {
        format!("{stem}.{ext}")
    }
}
