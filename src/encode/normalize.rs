use image::ExtendedColorType;
use std::borrow::Cow;

use crate::error::EncodeError;
use crate::frame::{Frame, PixelFormat};

/// Pixels in a layout the `image` encoders accept directly.
pub(crate) struct Normalized<'a> {
    pub pixels: Cow<'a, [u8]>,
    pub width: u32,
    pub height: u32,
    pub color: ExtendedColorType,
}

pub(crate) fn normalize(frame: &Frame) -> Result<Normalized<'_>, EncodeError> {
    let (width, height) = (frame.width(), frame.height());
    let format = frame.format();
    let (pixels, color) = match format {
        PixelFormat::Jpeg => {
            let decoded =
                image::load_from_memory_with_format(frame.data(), image::ImageFormat::Jpeg)?;
            let rgb = decoded.into_rgb8();
            return Ok(Normalized {
                width: rgb.width(),
                height: rgb.height(),
                pixels: Cow::Owned(rgb.into_raw()),
                color: ExtendedColorType::Rgb8,
            });
        }
        PixelFormat::Rgb888 => {
            check_len(frame, 3)?;
            (Cow::Borrowed(frame.data()), ExtendedColorType::Rgb8)
        }
        PixelFormat::Grayscale => {
            check_len(frame, 1)?;
            (Cow::Borrowed(frame.data()), ExtendedColorType::L8)
        }
        PixelFormat::Rgb565 => {
            check_len(frame, 2)?;
            (
                Cow::Owned(rgb565_to_rgb(frame.data())),
                ExtendedColorType::Rgb8,
            )
        }
        PixelFormat::Yuv422 => {
            check_len(frame, 2)?;
            if width % 2 != 0 {
                return Err(EncodeError::Codec(format!(
                    "YUYV frame width {} is not even",
                    width
                )));
            }
            (
                Cow::Owned(yuyv_to_rgb(frame.data())),
                ExtendedColorType::Rgb8,
            )
        }
    };
    Ok(Normalized {
        pixels,
        width,
        height,
        color,
    })
}

fn check_len(frame: &Frame, bpp: usize) -> Result<(), EncodeError> {
    let expected = (frame.width() as usize)
        .checked_mul(frame.height() as usize)
        .and_then(|v| v.checked_mul(bpp))
        .ok_or_else(|| EncodeError::Codec("frame dimensions overflow".to_string()))?;
    if expected == 0 || frame.len() != expected {
        return Err(EncodeError::Malformed {
            format: frame.format(),
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Big-endian RGB565, the byte order camera sensors emit.
fn rgb565_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 2 * 3);
    for px in pixels.chunks_exact(2) {
        let v = u16::from_be_bytes([px[0], px[1]]);
        let r = ((v >> 11) & 0x1F) as u8;
        let g = ((v >> 5) & 0x3F) as u8;
        let b = (v & 0x1F) as u8;
        rgb.push((r << 3) | (r >> 2));
        rgb.push((g << 2) | (g >> 4));
        rgb.push((b << 3) | (b >> 2));
    }
    rgb
}

fn yuyv_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 2 * 3);
    for quad in pixels.chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
