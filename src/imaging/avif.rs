//! AV1-coded HEIF (AVIF) decoding.
//!
//! The `image` crate's `"avif"` feature only provides the encoder (rav1e).
//! Decoding requires `"avif-native"`, which links the C library dav1d. Instead
//! we parse the ISO-BMFF container with `avif-parse` and decode the AV1
//! payload with `rav1d`, a pure Rust port of dav1d.
//!
//! HEVC-coded HEIC shares the container but not the codec; it fails here at
//! the parse or decode step and callers treat that as "not convertible".

use super::backend::BackendError;
use image::DynamicImage;
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib as dav1d;
use std::ptr::NonNull;

fn default_settings() -> Dav1dSettings {
    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    unsafe { dav1d::dav1d_default_settings(NonNull::from(&mut settings).cast()) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;
    settings
}

/// Open and immediately close a decoder context.
///
/// Used as the one-time capability check before the first conversion.
pub fn probe_decoder() -> Result<(), BackendError> {
    let mut settings = default_settings();
    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::DecodeFailed(format!(
            "rav1d open failed ({})",
            rc.0
        )));
    }
    unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
    Ok(())
}

/// Decode an in-memory AVIF file to an RGB bitmap.
pub fn decode_avif(data: &[u8]) -> Result<DynamicImage, BackendError> {
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(data))
        .map_err(|e| BackendError::DecodeFailed(format!("not an AV1 HEIF container: {e:?}")))?;
    decode_av1(&avif.primary_item)
}

fn decode_av1(av1_bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    let mut settings = default_settings();
    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::DecodeFailed(format!(
            "rav1d open failed ({})",
            rc.0
        )));
    }

    let mut data = Dav1dData::default();
    let buf = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::DecodeFailed("rav1d data_create failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf, av1_bytes.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(BackendError::DecodeFailed(format!(
            "rav1d send_data failed ({})",
            rc.0
        )));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::DecodeFailed(format!(
            "rav1d get_picture failed ({})",
            rc.0
        )));
    }

    let rgb = picture_to_rgb(&pic);

    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }

    let (width, height, rgb) = rgb?;
    image::RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::DecodeFailed("decoded AVIF buffer size mismatch".into()))
}

/// Borrowed view of one decoded plane.
struct Plane<'a> {
    data: &'a [u8],
    stride: usize,
    /// Bytes per sample: 1 for 8-bit, 2 for 10/12-bit.
    sample_bytes: usize,
}

impl Plane<'_> {
    fn sample(&self, x: u32, y: u32) -> f32 {
        let offset = y as usize * self.stride + x as usize * self.sample_bytes;
        if self.sample_bytes == 1 {
            self.data[offset] as f32
        } else {
            u16::from_ne_bytes([self.data[offset], self.data[offset + 1]]) as f32
        }
    }
}

fn plane(
    pic: &Dav1dPicture,
    index: usize,
    stride: usize,
    rows: usize,
    sample_bytes: usize,
) -> Result<Plane<'_>, BackendError> {
    let ptr = pic.data[index]
        .ok_or_else(|| BackendError::DecodeFailed(format!("missing plane {index}")))?;
    let data = unsafe { std::slice::from_raw_parts(ptr.as_ptr() as *const u8, stride * rows) };
    Ok(Plane {
        data,
        stride,
        sample_bytes,
    })
}

/// Convert a decoded picture to interleaved RGB8 (BT.601).
///
/// The picture must stay referenced while this runs; planes are borrowed
/// straight out of the decoder's buffers.
fn picture_to_rgb(pic: &Dav1dPicture) -> Result<(u32, u32, Vec<u8>), BackendError> {
    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let bpc = pic.p.bpc as u32;
    let layout = pic.p.layout;
    let sample_bytes = if bpc <= 8 { 1 } else { 2 };

    let (ss_x, ss_y) = match layout {
        DAV1D_PIXEL_LAYOUT_I400 | DAV1D_PIXEL_LAYOUT_I444 => (false, false),
        DAV1D_PIXEL_LAYOUT_I420 => (true, true),
        DAV1D_PIXEL_LAYOUT_I422 => (true, false),
        _ => {
            return Err(BackendError::DecodeFailed(format!(
                "unsupported AVIF pixel layout: {layout}"
            )));
        }
    };
    let monochrome = layout == DAV1D_PIXEL_LAYOUT_I400;

    if pic.stride[0] < 0 || pic.stride[1] < 0 {
        return Err(BackendError::DecodeFailed("negative plane stride".into()));
    }
    let y_stride = pic.stride[0] as usize;
    let uv_stride = pic.stride[1] as usize;
    let chroma_height = (if ss_y { height.div_ceil(2) } else { height }) as usize;

    let luma = plane(pic, 0, y_stride, height as usize, sample_bytes)?;
    let chroma = if monochrome {
        None
    } else {
        Some((
            plane(pic, 1, uv_stride, chroma_height, sample_bytes)?,
            plane(pic, 2, uv_stride, chroma_height, sample_bytes)?,
        ))
    };

    let max_val = ((1u32 << bpc) - 1) as f32;
    let center = (1u32 << (bpc - 1)) as f32;
    let scale = 255.0 / max_val;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for row in 0..height {
        for col in 0..width {
            let y = luma.sample(col, row);
            let (r, g, b) = match &chroma {
                None => (y, y, y),
                Some((u, v)) => {
                    let cx = if ss_x { col / 2 } else { col };
                    let cy = if ss_y { row / 2 } else { row };
                    let cb = u.sample(cx, cy) - center;
                    let cr = v.sample(cx, cy) - center;
                    (
                        y + 1.402 * cr,
                        y - 0.344136 * cb - 0.714136 * cr,
                        y + 1.772 * cb,
                    )
                }
            };
            rgb.push((r * scale).clamp(0.0, 255.0) as u8);
            rgb.push((g * scale).clamp(0.0, 255.0) as u8);
            rgb.push((b * scale).clamp(0.0, 255.0) as u8);
        }
    }

    Ok((width, height, rgb))
}
