//! Pixel conversions between the packed 16-bit layouts and RGBA8888.
//!
//! 16-bit pixels are stored little-endian. Bit layouts, most significant
//! first:
//!
//! | Type       | Layout                  |
//! |------------|-------------------------|
//! | `Rgb565`   | `RRRRR GGGGGG BBBBB`    |
//! | `Rgba5551` | `RRRRR GGGGG BBBBB A`   |
//! | `Rgba4444` | `RRRR GGGG BBBB AAAA`   |

use super::TextureType;

#[inline]
fn expand5(v: u16) -> u8 {
    let v = (v & 0x1f) as u8;
    (v << 3) | (v >> 2)
}

#[inline]
fn expand6(v: u16) -> u8 {
    let v = (v & 0x3f) as u8;
    (v << 2) | (v >> 4)
}

#[inline]
fn expand4(v: u16) -> u8 {
    (v & 0x0f) as u8 * 17
}

/// Decode one pixel of `tex_type` into RGBA8.
///
/// `pixel` must hold at least [`TextureType::bytes_per_pixel`] bytes.
pub fn unpack_rgba8(tex_type: TextureType, pixel: &[u8]) -> [u8; 4] {
    if tex_type == TextureType::Rgba8888 {
        return [pixel[0], pixel[1], pixel[2], pixel[3]];
    }
    let v = u16::from_le_bytes([pixel[0], pixel[1]]);
    match tex_type {
        TextureType::Rgb565 => [expand5(v >> 11), expand6(v >> 5), expand5(v), 0xff],
        TextureType::Rgba5551 => [
            expand5(v >> 11),
            expand5(v >> 6),
            expand5(v >> 1),
            if v & 1 != 0 { 0xff } else { 0 },
        ],
        TextureType::Rgba4444 => [
            expand4(v >> 12),
            expand4(v >> 8),
            expand4(v >> 4),
            expand4(v),
        ],
        TextureType::Rgba8888 => unreachable!(),
    }
}

/// Encode an RGBA8 color as one pixel of `tex_type`, appending to `out`.
pub fn pack_rgba8(tex_type: TextureType, rgba: [u8; 4], out: &mut Vec<u8>) {
    let [r, g, b, a] = rgba.map(u16::from);
    let packed = match tex_type {
        TextureType::Rgba8888 => {
            out.extend_from_slice(&rgba);
            return;
        }
        TextureType::Rgb565 => ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3),
        TextureType::Rgba5551 => {
            ((r >> 3) << 11) | ((g >> 3) << 6) | ((b >> 3) << 1) | u16::from(a >= 0x80)
        }
        TextureType::Rgba4444 => ((r >> 4) << 12) | ((g >> 4) << 8) | ((b >> 4) << 4) | (a >> 4),
    };
    out.extend_from_slice(&packed.to_le_bytes());
}

/// Widen packed pixel data to RGBA8888.
///
/// Used when the device cannot sample a 16-bit format. Trailing bytes that do
/// not form a whole pixel are ignored.
pub fn widen_to_rgba8888(tex_type: TextureType, data: &[u8]) -> Vec<u8> {
    if tex_type == TextureType::Rgba8888 {
        return data.to_vec();
    }
    let bpp = tex_type.bytes_per_pixel() as usize;
    let mut out = Vec::with_capacity(data.len() / bpp * 4);
    for pixel in data.chunks_exact(bpp) {
        out.extend_from_slice(&unpack_rgba8(tex_type, pixel));
    }
    out
}
