use std::sync::Arc;

use anyhow::Context;

use crate::assets::PreparedImage;
use crate::error::DeepfryResult;

/// Decode any `image`-supported format into a premultiplied RGBA8 bitmap.
pub fn decode_image(bytes: &[u8]) -> DeepfryResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        if a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Inverse of [`premultiply_rgba8_in_place`], used on the way out to PNG.
///
/// Lossy for low alpha values; round-trips exactly for opaque pixels.
pub fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = (((px[0] as u16) * 255 + a / 2) / a).min(255) as u8;
        px[1] = (((px[1] as u16) * 255 + a / 2) / a).min(255) as u8;
        px[2] = (((px[2] as u16) * 255 + a / 2) / a).min(255) as u8;
    }
}
