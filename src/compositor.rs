//! The effect stack.
//!
//! Stages run in a fixed order: velocity resolve, motion blur, depth of
//! field, temporal sampling, bloom. Each colour stage reads the current
//! `source` texture and writes the `target` framebuffer, after which the two
//! ping-pong buffers trade roles. A disabled stage leaves both untouched.
//!
//! The double buffer is exchanged with the main colour exactly once per
//! frame: on the first stage that writes, or at the very end when no stage
//! did.

use glam::Mat4;

use crate::backend::{Binding, DrawCall, DrawParams, GpuBackend};
use crate::buffers::{BufferId, BufferSet};
use crate::config::FrameInputs;
use crate::effect_set::EffectSet;
use crate::effects::{bloom, depth_of_field, motion_blur, temporal};
use crate::error::{EffectsError, EffectsResult};
use crate::handles::{FramebufferId, PassId, TextureId};
use crate::history::FrameHistory;
use crate::passes::EffectPasses;

/// Result of the effect stack, consumed by later output stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinalOutput {
    pub texture: TextureId,
    /// Framebuffer with `texture` as colour attachment.
    pub framebuffer: FramebufferId,
}

/// Everything a stage needs while the stack runs. Lives for one
/// [`composite`] call.
pub struct StageContext<'a, B: GpuBackend + ?Sized> {
    pub backend: &'a mut B,
    pub passes: &'a EffectPasses,
    pub buffers: &'a mut BufferSet,
    pub inputs: &'a FrameInputs,
    pub enabled: EffectSet,
    /// The host's scene depth.
    pub depth: TextureId,
    pub persmat: Mat4,
    /// Last frame's view-projection, or this frame's on the first frame.
    pub prev_persmat: Mat4,
    pub valid_taa_history: bool,
    source: TextureId,
    target: Option<FramebufferId>,
    swap_double_buffer: bool,
}

impl<'a, B: GpuBackend + ?Sized> StageContext<'a, B> {
    /// Texture the next stage reads.
    pub fn source(&self) -> TextureId {
        self.source
    }

    /// Framebuffer the next stage writes.
    pub fn target(&self) -> EffectsResult<FramebufferId> {
        self.target.ok_or(EffectsError::NotInitialized("post buffer"))
    }

    /// Draws a fullscreen pass into the current target at viewport size.
    pub fn draw_to_target(
        &mut self,
        pass: PassId,
        inputs: &[Binding],
        params: DrawParams,
    ) -> EffectsResult<()> {
        let viewport = self.inputs.viewport;
        let target = self.target()?;
        self.backend.draw(&DrawCall {
            pass,
            target,
            viewport,
            inputs,
            params: DrawParams {
                viewport: [viewport[0] as f32, viewport[1] as f32],
                ..params
            },
        })
    }

    fn texture(&self, id: BufferId) -> EffectsResult<TextureId> {
        self.buffers
            .texture(id)
            .ok_or(EffectsError::NotInitialized(buffer_name(id)))
    }

    fn writes_post(&self) -> bool {
        self.target.is_some() && self.target == self.buffers.color_fb(BufferId::PostColor)
    }

    /// Exchanges the main colour with the double buffer, once per frame.
    pub fn swap_double_buffers(&mut self) {
        if self.swap_double_buffer {
            self.buffers.swap(BufferId::MainColor, BufferId::DoubleBuffer);
            self.swap_double_buffer = false;
        }
    }

    /// Makes the buffer just written the new source and the other one the target.
    pub fn swap_buffers(&mut self) -> EffectsResult<()> {
        let wrote_post = self.writes_post();
        self.swap_double_buffers();
        let (source, target) = if wrote_post {
            (BufferId::PostColor, BufferId::MainColor)
        } else {
            (BufferId::MainColor, BufferId::PostColor)
        };
        self.source = self.texture(source)?;
        self.target = self.buffers.color_fb(target);
        Ok(())
    }

    /// Retires the TAA history into the buffer just written; the freshly
    /// resolved frame becomes both the source and the new history.
    pub fn swap_buffers_taa(&mut self) -> EffectsResult<()> {
        let written = if self.writes_post() {
            BufferId::PostColor
        } else {
            BufferId::MainColor
        };
        self.swap_double_buffers();
        self.buffers.swap(written, BufferId::TaaHistory);
        self.source = self.texture(BufferId::TaaHistory)?;
        self.target = self.buffers.color_fb(written);
        Ok(())
    }
}

fn buffer_name(id: BufferId) -> &'static str {
    crate::buffers::BufferSpec::lookup(id).map_or("buffer", |spec| spec.label)
}

/// Runs the effect stack over the viewport's buffers.
///
/// May request a redraw through `history` when the double buffer is in use
/// but does not hold a finished frame yet. Does not commit the frame.
pub fn composite<B: GpuBackend + ?Sized>(
    backend: &mut B,
    passes: &EffectPasses,
    buffers: &mut BufferSet,
    inputs: &FrameInputs,
    enabled: EffectSet,
    depth: TextureId,
    history: &mut FrameHistory,
) -> EffectsResult<FinalOutput> {
    let persmat = inputs.camera.persmat();
    let prev_persmat = history.prev_persmat.unwrap_or(persmat);

    if enabled.contains(EffectSet::VELOCITY_BUFFER) {
        resolve_velocity(backend, passes, buffers, inputs, depth, persmat, prev_persmat)?;
    }

    let source = buffers
        .texture(BufferId::MainColor)
        .ok_or(EffectsError::NotInitialized("color"))?;
    let mut ctx = StageContext {
        target: buffers.color_fb(BufferId::PostColor),
        backend,
        passes,
        buffers,
        inputs,
        enabled,
        depth,
        persmat,
        prev_persmat,
        valid_taa_history: history.valid_taa_history,
        source,
        swap_double_buffer: enabled.contains(EffectSet::DOUBLE_BUFFER),
    };

    motion_blur::draw(&mut ctx)?;
    depth_of_field::draw(&mut ctx)?;
    temporal::draw(&mut ctx)?;
    bloom::draw(&mut ctx)?;

    let texture = ctx.source;
    let main_color_fb = ctx.buffers.color_fb(BufferId::MainColor);
    let mut framebuffer = if ctx.target != main_color_fb {
        ctx.buffers.fb(BufferId::MainColor)
    } else {
        ctx.buffers.fb(BufferId::PostColor)
    };
    if enabled.contains(EffectSet::TAA) && Some(texture) == ctx.buffers.texture(BufferId::TaaHistory)
    {
        framebuffer = ctx.buffers.fb(BufferId::TaaHistory);
    }
    let framebuffer = framebuffer.ok_or(EffectsError::NotInitialized("final framebuffer"))?;

    // Keeps the double buffer one frame behind even when nothing was drawn.
    ctx.swap_double_buffers();

    if !history.valid_double_buffer
        && enabled.contains(EffectSet::DOUBLE_BUFFER)
        && !inputs.mode.is_image_render()
    {
        history.request_redraw();
    }

    Ok(FinalOutput {
        texture,
        framebuffer,
    })
}

fn resolve_velocity<B: GpuBackend + ?Sized>(
    backend: &mut B,
    passes: &EffectPasses,
    buffers: &BufferSet,
    inputs: &FrameInputs,
    depth: TextureId,
    persmat: Mat4,
    prev_persmat: Mat4,
) -> EffectsResult<()> {
    let pass = passes
        .velocity_resolve
        .ok_or(EffectsError::NotInitialized("velocity resolve pass"))?;
    let target = buffers
        .color_fb(BufferId::Velocity)
        .ok_or(EffectsError::NotInitialized("velocity"))?;
    let inputs_bound = [Binding::new("depth_buffer", depth)];
    backend.draw(&DrawCall {
        pass,
        target,
        viewport: inputs.viewport,
        inputs: &inputs_bound,
        params: DrawParams {
            mat_a: persmat.inverse().to_cols_array_2d(),
            mat_b: prev_persmat.to_cols_array_2d(),
            ..DrawParams::viewport(inputs.viewport)
        },
    })
}
