//! Shared test utilities for the vitrine test suite.
//!
//! Synthetic image builders that produce real encoded payloads in memory, so
//! backend, normalization and ingestion tests never need fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let jpeg = jpeg_bytes(400, 300, 90);
//! let avif = avif_bytes(64, 48);
//! let noise = noise_png_bytes(256, 256, 7);
//! ```

use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};

use crate::types::SourceAsset;

// =========================================================================
// Pixel sources
// =========================================================================

/// Smooth gradient: compresses well at any quality.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Deterministic xorshift noise: practically incompressible.
pub fn noise(width: u32, height: u32, seed: u32) -> RgbImage {
    let mut state = seed.max(1);
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };
    RgbImage::from_fn(width, height, |_, _| {
        let v = next();
        image::Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
    })
}

// =========================================================================
// Encoded payloads
// =========================================================================

/// A gradient JPEG of the given size and quality.
pub fn jpeg_bytes(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A noise PNG (lossless, so the noise survives into the decoder).
pub fn noise_png_bytes(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let img = noise(width, height, seed);
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A half-transparent RGBA PNG.
pub fn png_bytes_rgba(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 200, if x < width / 2 { 0 } else { 255 }])
    });
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

/// A gradient AVIF encoded with rav1e (speed 10 keeps tests quick).
pub fn avif_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(gradient(width, height)).to_rgba8();
    let mut buf = Vec::new();
    image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, 10, 80)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

// =========================================================================
// Assets
// =========================================================================

pub fn jpeg_asset(name: &str, width: u32, height: u32) -> SourceAsset {
    SourceAsset::new(name, "image/jpeg", jpeg_bytes(width, height, 90))
}

pub fn avif_asset(name: &str, width: u32, height: u32) -> SourceAsset {
    SourceAsset::new(name, "image/avif", avif_bytes(width, height))
}

