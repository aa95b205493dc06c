//! Raster codecs for pixi layer content.
//!
//! The container format stores layer images as opaque byte blobs and records
//! the codec that produced them as a string key on the document (`"png"`,
//! `"qoi"`). This crate is the narrow boundary behind that key: one trait,
//! two implementations, and a lookup by name. The container protocol itself
//! never touches pixels; only callers that want to inspect or produce layer
//! content come through here.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;

pub type ImageResult<T> = Result<T, ImageError>;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("pixel buffer of {len} bytes does not match {width}x{height} RGBA8")]
    PixelBufferMismatch { width: u32, height: u32, len: usize },
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// Decoded raster content: tightly packed RGBA8 rows, top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RawImage {
    /// Wrap a pixel buffer. The buffer length must be exactly
    /// `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> ImageResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ImageError::PixelBufferMismatch {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// Facts about an encoded image that decoding surfaces alongside the pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Whether the codec stores channels in the sRGB color space.
    pub srgb: bool,
}

/// One named raster codec. Implementations are stateless; [`codec_for`]
/// hands out shared statics.
pub trait ImageCodec: Send + Sync {
    /// The key this codec is registered under, as stored on documents.
    fn name(&self) -> &'static str;

    /// Whether encoded output is in the sRGB color space.
    fn encodes_srgb(&self) -> bool;

    fn encode(&self, image: &RawImage) -> ImageResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> ImageResult<(RawImage, ImageInfo)>;
}

/// Look up a codec by its document key. Unknown keys yield `None`; the
/// caller decides whether that is an error.
pub fn codec_for(name: &str) -> Option<&'static dyn ImageCodec> {
    match name {
        "png" => Some(&PngCodec),
        "qoi" => Some(&QoiCodec),
        _ => None,
    }
}

pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn name(&self) -> &'static str {
        "png"
    }

    fn encodes_srgb(&self) -> bool {
        true
    }

    fn encode(&self, image: &RawImage) -> ImageResult<Vec<u8>> {
        encode_with(image, ImageFormat::Png)
    }

    fn decode(&self, bytes: &[u8]) -> ImageResult<(RawImage, ImageInfo)> {
        decode_with(bytes, self.encodes_srgb())
    }
}

pub struct QoiCodec;

impl ImageCodec for QoiCodec {
    fn name(&self) -> &'static str {
        "qoi"
    }

    fn encodes_srgb(&self) -> bool {
        true
    }

    fn encode(&self, image: &RawImage) -> ImageResult<Vec<u8>> {
        encode_with(image, ImageFormat::Qoi)
    }

    fn decode(&self, bytes: &[u8]) -> ImageResult<(RawImage, ImageInfo)> {
        decode_with(bytes, self.encodes_srgb())
    }
}

fn encode_with(image: &RawImage, format: ImageFormat) -> ImageResult<Vec<u8>> {
    // The RawImage constructor enforces the buffer length, so from_raw only
    // fails on a corrupted value; surface that as a mismatch, not a panic.
    let rgba = RgbaImage::from_raw(image.width, image.height, image.pixels.clone()).ok_or(
        ImageError::PixelBufferMismatch {
            width: image.width,
            height: image.height,
            len: image.pixels.len(),
        },
    )?;

    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(rgba).write_to(&mut Cursor::new(&mut buf), format)?;
    Ok(buf)
}

fn decode_with(bytes: &[u8], srgb: bool) -> ImageResult<(RawImage, ImageInfo)> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let raw = RawImage::new(width, height, rgba.into_raw())?;
    let info = ImageInfo {
        width,
        height,
        srgb,
    };
    Ok((raw, info))
}
