//! Recursive mip-chain construction.
//!
//! Every level is derived from the one right above it: the scratch
//! framebuffer is re-attached to level `L` and a pass reading level `L - 1`
//! is drawn. The backend preserves draw order, so each level observes the
//! finished previous one.

use crate::backend::{Binding, DrawCall, DrawParams, GpuBackend, mip_extent};
use crate::error::{EffectsError, EffectsResult};
use crate::handles::{FramebufferId, PassId, TextureId};

/// One level produced by a [`MipChain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MipLevel {
    pub level: u32,
    pub size: [u32; 2],
}

/// Levels `1..=max_level` of a mip chain.
///
/// Iteration stops after the first 1x1 level, after `max_level`, or at the
/// end of the texture's mip chain, whichever comes first.
#[derive(Clone, Debug)]
pub struct MipChain {
    base: [u32; 2],
    next: u32,
    last: u32,
    done: bool,
}

impl MipChain {
    pub fn new(base: [u32; 2], mip_count: u32, max_level: u32) -> Self {
        Self {
            base,
            next: 1,
            last: max_level.min(mip_count.saturating_sub(1)),
            done: base[0] <= 1 && base[1] <= 1,
        }
    }
}

impl Iterator for MipChain {
    type Item = MipLevel;

    fn next(&mut self) -> Option<MipLevel> {
        if self.done || self.next > self.last {
            return None;
        }
        let level = self.next;
        let size = mip_extent(self.base, level);
        self.next += 1;
        if size == [1, 1] {
            self.done = true;
        }
        Some(MipLevel { level, size })
    }
}

/// Walks the mip chain of `texture`, attaching each level to `framebuffer`
/// and handing it to `draw_level`. Returns how many levels were drawn.
///
/// The texture is detached from the framebuffer afterwards.
pub fn downsample_levels<B, F>(
    backend: &mut B,
    framebuffer: FramebufferId,
    texture: TextureId,
    max_level: u32,
    mut draw_level: F,
) -> EffectsResult<u32>
where
    B: GpuBackend + ?Sized,
    F: FnMut(&mut B, MipLevel) -> EffectsResult<()>,
{
    let desc = backend
        .texture_desc(texture)
        .ok_or(EffectsError::UnknownTexture(texture))?;
    let (base, mip_count, slot) = (desc.size, desc.mip_count(), desc.format.attachment_slot());
    if max_level >= mip_count {
        log::debug!(
            "{texture}: requested level {max_level} but only {mip_count} mips, clamping"
        );
    }

    let mut drawn = 0;
    for mip in MipChain::new(base, mip_count, max_level) {
        backend.attach_texture(framebuffer, slot, texture, mip.level)?;
        draw_level(backend, mip)?;
        drawn += 1;
    }
    backend.detach_texture(framebuffer, texture)?;
    Ok(drawn)
}

/// Rebuilds the colour mip chain of `texture` up to `max_level`.
pub fn downsample_color<B: GpuBackend + ?Sized>(
    backend: &mut B,
    framebuffer: FramebufferId,
    pass: PassId,
    texture: TextureId,
    max_level: u32,
    firefly_factor: f32,
) -> EffectsResult<u32> {
    downsample_levels(backend, framebuffer, texture, max_level, |backend, mip| {
        let inputs = [Binding::level("source", texture, mip.level - 1)];
        backend.draw(&DrawCall {
            pass,
            target: framebuffer,
            viewport: mip.size,
            inputs: &inputs,
            params: DrawParams {
                firefly_factor,
                level: mip.level,
                ..DrawParams::viewport(mip.size)
            },
        })
    })
}

/// Texel size of cube level `level` for a cube map `width` texels wide.
pub fn cube_texel_size(width: u32, level: u32) -> f32 {
    2f32.powi(level as i32) / width.max(1) as f32
}

/// Rebuilds the mip chain of the cube map `texture`, all six faces per level.
pub fn downsample_cube<B: GpuBackend + ?Sized>(
    backend: &mut B,
    framebuffer: FramebufferId,
    pass: PassId,
    texture: TextureId,
    max_level: u32,
    firefly_factor: f32,
) -> EffectsResult<u32> {
    let width = backend
        .texture_desc(texture)
        .ok_or(EffectsError::UnknownTexture(texture))?
        .size[0];
    downsample_levels(backend, framebuffer, texture, max_level, |backend, mip| {
        let inputs = [Binding::level("source", texture, mip.level - 1)];
        backend.draw(&DrawCall {
            pass,
            target: framebuffer,
            viewport: mip.size,
            inputs: &inputs,
            params: DrawParams {
                texel_size: cube_texel_size(width, mip.level),
                firefly_factor,
                layer: 0,
                level: mip.level,
                ..DrawParams::viewport(mip.size)
            },
        })
    })
}

/// CPU reference of one max-reduction step, used to check HiZ output.
///
/// Odd edges clamp to the last row/column, like the shader does.
pub fn zmax_downsample_2x2(src: &[f32], size: [u32; 2]) -> (Vec<f32>, [u32; 2]) {
    reduce_2x2(src, size, f32::max)
}

/// Min-reduction counterpart of [`zmax_downsample_2x2`].
pub fn zmin_downsample_2x2(src: &[f32], size: [u32; 2]) -> (Vec<f32>, [u32; 2]) {
    reduce_2x2(src, size, f32::min)
}

fn reduce_2x2(src: &[f32], size: [u32; 2], op: fn(f32, f32) -> f32) -> (Vec<f32>, [u32; 2]) {
    let [w, h] = size;
    let out_size = mip_extent(size, 1);
    let [ow, oh] = out_size;
    let at = |x: u32, y: u32| -> f32 {
        let x = x.min(w.saturating_sub(1));
        let y = y.min(h.saturating_sub(1));
        src.get((y * w + x) as usize).copied().unwrap_or(0.0)
    };
    let mut out = Vec::with_capacity((ow * oh) as usize);
    for y in 0..oh {
        for x in 0..ow {
            let (sx, sy) = (x * 2, y * 2);
            let a = op(at(sx, sy), at(sx + 1, sy));
            let b = op(at(sx, sy + 1), at(sx + 1, sy + 1));
            out.push(op(a, b));
        }
    }
    (out, out_size)
}
