//! Mip chain arithmetic and a CPU box-filter downsampler.
//!
//! Packed mip chains store levels from the smallest (1x1) to the base level,
//! each level tightly packed row by row.

use super::convert::{pack_rgba8, unpack_rgba8};
use super::{Extent2d, TextureType};

/// Number of mip levels of a full chain for `width` x `height`.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height);
    if largest == 0 {
        1
    } else {
        32 - largest.leading_zeros()
    }
}

/// Extent of mip `level` of an image whose base level is `base`.
pub fn mip_extent(base: Extent2d, level: u32) -> Extent2d {
    Extent2d::new(
        base.width.checked_shr(level).unwrap_or(0).max(1),
        base.height.checked_shr(level).unwrap_or(0).max(1),
    )
}

/// Total bytes of `levels` mip levels starting at `base`.
pub fn mip_chain_size(base: Extent2d, levels: u32, bytes_per_pixel: u32) -> usize {
    (0..levels)
        .map(|level| mip_extent(base, level).pixel_count() * bytes_per_pixel as usize)
        .sum()
}

/// Byte offset of `level` inside a packed chain of `levels` levels.
pub fn mip_offset(base: Extent2d, levels: u32, level: u32, bytes_per_pixel: u32) -> usize {
    (level + 1..levels)
        .map(|smaller| mip_extent(base, smaller).pixel_count() * bytes_per_pixel as usize)
        .sum()
}

/// Build a full packed mip chain from base-level pixels with a 2x2 box filter.
///
/// Returns `None` if `base_level` is shorter than the base extent requires.
pub fn generate_mip_chain(
    tex_type: TextureType,
    extent: Extent2d,
    base_level: &[u8],
) -> Option<Vec<u8>> {
    let bpp = tex_type.bytes_per_pixel() as usize;
    if extent.is_empty() || base_level.len() < extent.pixel_count() * bpp {
        return None;
    }

    let mut levels: Vec<(Extent2d, Vec<[u8; 4]>)> = Vec::new();
    let base: Vec<[u8; 4]> = base_level
        .chunks_exact(bpp)
        .take(extent.pixel_count())
        .map(|pixel| unpack_rgba8(tex_type, pixel))
        .collect();
    levels.push((extent, base));

    for level in 1..mip_level_count(extent.width, extent.height) {
        let (src_extent, src) = &levels[levels.len() - 1];
        let dst_extent = mip_extent(extent, level);
        let dst = downsample(*src_extent, src, dst_extent);
        levels.push((dst_extent, dst));
    }

    let mut out =
        Vec::with_capacity(mip_chain_size(extent, levels.len() as u32, tex_type.bytes_per_pixel()));
    for (_, pixels) in levels.iter().rev() {
        for &rgba in pixels {
            pack_rgba8(tex_type, rgba, &mut out);
        }
    }
    Some(out)
}

fn downsample(src_extent: Extent2d, src: &[[u8; 4]], dst_extent: Extent2d) -> Vec<[u8; 4]> {
    let sw = src_extent.width as usize;
    let sh = src_extent.height as usize;
    let mut dst = Vec::with_capacity(dst_extent.pixel_count());
    for y in 0..dst_extent.height as usize {
        let y0 = (y * 2).min(sh - 1);
        let y1 = (y * 2 + 1).min(sh - 1);
        for x in 0..dst_extent.width as usize {
            let x0 = (x * 2).min(sw - 1);
            let x1 = (x * 2 + 1).min(sw - 1);
            let samples = [
                src[y0 * sw + x0],
                src[y0 * sw + x1],
                src[y1 * sw + x0],
                src[y1 * sw + x1],
            ];
            let mut avg = [0u8; 4];
            for (channel, out) in avg.iter_mut().enumerate() {
                let sum: u32 = samples.iter().map(|s| u32::from(s[channel])).sum();
                *out = ((sum + 2) / 4) as u8;
            }
            dst.push(avg);
        }
    }
    dst
}
