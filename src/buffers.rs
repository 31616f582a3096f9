//! Persistent and frame-scoped colour/depth buffers of a viewport.
//!
//! Which buffers exist is decided by [`BUFFER_TABLE`]: one row per buffer
//! with the [`EffectSet`] bits that gate it, its format, resolution, the
//! framebuffers built around it and whether it is owned or borrowed from the
//! frame pool. [`BufferSet::apply`] walks the table and brings the set in
//! line with the frame's effects. Applying the same set twice allocates and
//! releases nothing, and a buffer that stays wanted keeps its handle.

use std::collections::BTreeMap;

use crate::backend::{
    Attachment, COLOR_SLOT, DEPTH_SLOT, GpuBackend, TextureDesc, TextureFormat, TextureKind,
};
use crate::effect_set::EffectSet;
use crate::error::EffectsResult;
use crate::handles::{FramebufferId, TextureId};

/// Colour slot of the main framebuffer that receives the normal input.
pub const NORMAL_SLOT: usize = COLOR_SLOT + 1;

/// Every buffer the pipeline may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferId {
    /// Scene colour; what the host renders the frame into.
    MainColor,
    /// Ping-pong partner of the main colour.
    PostColor,
    /// Max-depth HiZ pyramid.
    MaxZ,
    /// Min-depth HiZ pyramid.
    MinZ,
    /// Previous frame's colour before post processing.
    DoubleBuffer,
    TaaHistory,
    DepthDoubleBuffer,
    Velocity,
    NormalInput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Full,
    /// Half resolution unless the set was built with a full-resolution HiZ.
    Hiz,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatRule {
    Fixed(TextureFormat),
    /// Depth where the device renders to depth-only framebuffers, float colour otherwise.
    HizDepth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferLayout {
    /// No framebuffer; drawn through the shared downsample framebuffer.
    None,
    /// `fb` = host depth + colour, `color_fb` = colour only.
    DepthAndColor,
    /// `fb` = the texture as depth attachment.
    DepthOnly,
    /// `color_fb` = the texture as only attachment.
    ColorOnly,
    /// Attached to the main colour's `fb` at [`NORMAL_SLOT`].
    MainNormalSlot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    /// Borrowed from the frame pool and re-acquired every frame.
    Pooled,
}

/// One row of [`BUFFER_TABLE`].
#[derive(Clone, Copy, Debug)]
pub struct BufferSpec {
    pub id: BufferId,
    pub label: &'static str,
    /// Bits that make the buffer wanted; empty means always.
    pub gate: EffectSet,
    pub format: FormatRule,
    pub resolution: Resolution,
    pub mipmapped: bool,
    pub layout: FramebufferLayout,
    pub ownership: Ownership,
}

#[allow(clippy::too_many_arguments)]
const fn row(
    id: BufferId,
    label: &'static str,
    gate: EffectSet,
    format: FormatRule,
    resolution: Resolution,
    mipmapped: bool,
    layout: FramebufferLayout,
    ownership: Ownership,
) -> BufferSpec {
    BufferSpec {
        id,
        label,
        gate,
        format,
        resolution,
        mipmapped,
        layout,
        ownership,
    }
}

const RGBA16F: FormatRule = FormatRule::Fixed(TextureFormat::Rgba16Float);
const RG16: FormatRule = FormatRule::Fixed(TextureFormat::Rg16);

/// Which buffer exists for which effects. Order matters: the main colour is
/// provisioned before anything that attaches to its framebuffer.
pub const BUFFER_TABLE: &[BufferSpec] = &[
    row(
        BufferId::MainColor,
        "color",
        EffectSet::empty(),
        RGBA16F,
        Resolution::Full,
        true,
        FramebufferLayout::DepthAndColor,
        Ownership::Owned,
    ),
    row(
        BufferId::PostColor,
        "color_post",
        EffectSet::POST_BUFFER,
        RGBA16F,
        Resolution::Full,
        true,
        FramebufferLayout::DepthAndColor,
        Ownership::Owned,
    ),
    row(
        BufferId::MaxZ,
        "maxzbuffer",
        EffectSet::empty(),
        FormatRule::HizDepth,
        Resolution::Hiz,
        true,
        FramebufferLayout::None,
        Ownership::Owned,
    ),
    #[cfg(feature = "min-hiz")]
    row(
        BufferId::MinZ,
        "minzbuffer",
        EffectSet::empty(),
        FormatRule::HizDepth,
        Resolution::Hiz,
        true,
        FramebufferLayout::None,
        Ownership::Owned,
    ),
    row(
        BufferId::DoubleBuffer,
        "color_double_buffer",
        EffectSet::DOUBLE_BUFFER,
        RGBA16F,
        Resolution::Full,
        true,
        FramebufferLayout::DepthAndColor,
        Ownership::Owned,
    ),
    row(
        BufferId::TaaHistory,
        "taa_history",
        EffectSet::TAA.union(EffectSet::TAA_REPROJECT),
        RGBA16F,
        Resolution::Full,
        true,
        FramebufferLayout::DepthAndColor,
        Ownership::Owned,
    ),
    row(
        BufferId::DepthDoubleBuffer,
        "depth_double_buffer",
        EffectSet::DEPTH_DOUBLE_BUFFER,
        FormatRule::Fixed(TextureFormat::Depth24Stencil8),
        Resolution::Full,
        false,
        FramebufferLayout::DepthOnly,
        Ownership::Owned,
    ),
    row(
        BufferId::Velocity,
        "velocity",
        EffectSet::VELOCITY_BUFFER,
        RG16,
        Resolution::Full,
        false,
        FramebufferLayout::ColorOnly,
        Ownership::Pooled,
    ),
    row(
        BufferId::NormalInput,
        "ssr_normal_input",
        EffectSet::NORMAL_BUFFER,
        RG16,
        Resolution::Full,
        false,
        FramebufferLayout::MainNormalSlot,
        Ownership::Pooled,
    ),
];

impl BufferSpec {
    pub fn lookup(id: BufferId) -> Option<&'static BufferSpec> {
        BUFFER_TABLE.iter().find(|s| s.id == id)
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }
}

/// Size of the HiZ pyramid's top level for a viewport.
pub fn hiz_size(viewport: [u32; 2], full_res: bool) -> [u32; 2] {
    let div = if full_res { 1 } else { 2 };
    [(viewport[0] / div).max(1), (viewport[1] / div).max(1)]
}

/// A provisioned buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSlot {
    pub texture: TextureId,
    /// Depth + colour framebuffer, or the depth-only one. For the normal
    /// input, the framebuffer it is attached to.
    pub fb: Option<FramebufferId>,
    /// Colour-only framebuffer.
    pub color_fb: Option<FramebufferId>,
    pub size: [u32; 2],
    pub format: TextureFormat,
    depth: Option<TextureId>,
}

/// Owned buffers allocated or released by one [`BufferSet::apply`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferChanges {
    pub allocated: Vec<BufferId>,
    pub released: Vec<BufferId>,
}

impl BufferChanges {
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty() && self.released.is_empty()
    }

    /// Whether `id` lost its previous contents.
    pub fn touched(&self, id: BufferId) -> bool {
        self.allocated.contains(&id) || self.released.contains(&id)
    }
}

/// The buffers of one viewport.
#[derive(Debug, Default)]
pub struct BufferSet {
    slots: BTreeMap<BufferId, BufferSlot>,
    downsample_fb: Option<FramebufferId>,
    full_res_hiz: bool,
}

impl BufferSet {
    pub fn new(full_res_hiz: bool) -> Self {
        Self {
            full_res_hiz,
            ..Self::default()
        }
    }

    pub fn get(&self, id: BufferId) -> Option<&BufferSlot> {
        self.slots.get(&id)
    }

    pub fn contains(&self, id: BufferId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn texture(&self, id: BufferId) -> Option<TextureId> {
        self.slots.get(&id).map(|s| s.texture)
    }

    pub fn fb(&self, id: BufferId) -> Option<FramebufferId> {
        self.slots.get(&id).and_then(|s| s.fb)
    }

    pub fn color_fb(&self, id: BufferId) -> Option<FramebufferId> {
        self.slots.get(&id).and_then(|s| s.color_fb)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BufferId, &BufferSlot)> {
        self.slots.iter().map(|(id, slot)| (*id, slot))
    }

    /// Scratch framebuffer the downsampler and pyramid builder attach to.
    pub fn downsample_fb(&self) -> Option<FramebufferId> {
        self.downsample_fb
    }

    pub fn full_res_hiz(&self) -> bool {
        self.full_res_hiz
    }

    /// `1` for a half-resolution pyramid, `0` for a full-resolution one.
    pub fn hiz_mip_offset(&self) -> u32 {
        if self.full_res_hiz { 0 } else { 1 }
    }

    /// Exchanges two buffers (texture and framebuffers) if both exist.
    pub(crate) fn swap(&mut self, a: BufferId, b: BufferId) {
        if a == b || !self.contains(a) || !self.contains(b) {
            return;
        }
        if let (Some(sa), Some(sb)) = (self.slots.remove(&a), self.slots.remove(&b)) {
            self.slots.insert(a, sb);
            self.slots.insert(b, sa);
        }
    }

    /// Provisions every buffer `enabled` wants and releases the rest.
    ///
    /// `depth` is the host's scene depth; it is attached to every
    /// depth + colour framebuffer.
    ///
    /// # Errors
    ///
    /// Allocation failures are returned as soon as they happen. Buffers
    /// handled before the failing one stay provisioned.
    pub fn apply<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        enabled: EffectSet,
        viewport: [u32; 2],
        depth: TextureId,
    ) -> EffectsResult<BufferChanges> {
        let caps = backend.capabilities();
        let mut changes = BufferChanges::default();

        if self.downsample_fb.is_none() {
            self.downsample_fb = Some(backend.create_framebuffer("downsample_fb", &[])?);
        }
        self.detach_normal_input(backend)?;

        for spec in BUFFER_TABLE {
            let wanted = enabled.gates(spec.gate);
            let size = match spec.resolution {
                Resolution::Full => [viewport[0].max(1), viewport[1].max(1)],
                Resolution::Hiz => hiz_size(viewport, self.full_res_hiz),
            };
            let format = match spec.format {
                FormatRule::Fixed(format) => format,
                FormatRule::HizDepth if caps.supports_depth_only_framebuffer => {
                    TextureFormat::Depth24
                }
                FormatRule::HizDepth => TextureFormat::R32Float,
            };

            match spec.ownership {
                Ownership::Owned => {
                    self.apply_owned(backend, spec, wanted, size, format, depth, &mut changes)?
                }
                Ownership::Pooled => self.apply_pooled(backend, spec, wanted, size, format)?,
            }
        }

        if !changes.is_empty() {
            log::debug!(
                "buffers: allocated {:?}, released {:?}",
                changes.allocated,
                changes.released
            );
        }
        Ok(changes)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_owned<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        spec: &BufferSpec,
        wanted: bool,
        size: [u32; 2],
        format: TextureFormat,
        depth: TextureId,
        changes: &mut BufferChanges,
    ) -> EffectsResult<()> {
        let reusable = self
            .slots
            .get(&spec.id)
            .map(|slot| wanted && slot.size == size && slot.format == format);
        match reusable {
            Some(true) => {
                if let Some(slot) = self.slots.get_mut(&spec.id) {
                    if spec.layout == FramebufferLayout::DepthAndColor && slot.depth != Some(depth)
                    {
                        if let Some(fb) = slot.fb {
                            backend.attach_texture(fb, DEPTH_SLOT, depth, 0)?;
                        }
                        slot.depth = Some(depth);
                    }
                }
                return Ok(());
            }
            Some(false) => {
                if let Some(old) = self.slots.remove(&spec.id) {
                    release_slot(backend, spec, &old, true);
                    changes.released.push(spec.id);
                }
            }
            None => {}
        }

        if wanted {
            let slot = provision(backend, spec, size, format, depth)?;
            self.slots.insert(spec.id, slot);
            changes.allocated.push(spec.id);
        }
        Ok(())
    }

    fn apply_pooled<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        spec: &BufferSpec,
        wanted: bool,
        size: [u32; 2],
        format: TextureFormat,
    ) -> EffectsResult<()> {
        let previous = self.slots.remove(&spec.id);
        if !wanted {
            if let Some(old) = previous {
                release_slot(backend, spec, &old, false);
                log::debug!("{}: returned to pool", spec.label);
            }
            return Ok(());
        }

        let texture = backend.pool_texture(spec.label, size, format)?;
        let mut slot = BufferSlot {
            texture,
            fb: None,
            color_fb: None,
            size,
            format,
            depth: None,
        };

        match spec.layout {
            FramebufferLayout::ColorOnly => {
                let fb = match previous.and_then(|p| p.color_fb) {
                    Some(fb) => {
                        backend.attach_texture(fb, COLOR_SLOT, texture, 0)?;
                        fb
                    }
                    None => backend.create_framebuffer(
                        spec.label,
                        &[None, Some(Attachment::new(texture))],
                    )?,
                };
                slot.color_fb = Some(fb);
            }
            FramebufferLayout::MainNormalSlot => {
                if let Some(main_fb) = self.fb(BufferId::MainColor) {
                    backend.attach_texture(main_fb, NORMAL_SLOT, texture, 0)?;
                    slot.fb = Some(main_fb);
                }
            }
            _ => {}
        }

        self.slots.insert(spec.id, slot);
        Ok(())
    }

    /// Takes the normal input off whichever framebuffer holds it.
    ///
    /// Runs before any owned row is released: after a swap the remembered
    /// framebuffer may belong to the double buffer, which a resize or an
    /// SSR toggle destroys.
    fn detach_normal_input<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> EffectsResult<()> {
        if let Some(slot) = self.slots.get_mut(&BufferId::NormalInput) {
            if let Some(fb) = slot.fb.take() {
                backend.detach_texture(fb, slot.texture)?;
            }
        }
        Ok(())
    }

    /// Destroys every buffer and framebuffer of the set.
    pub fn release_all<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        let slots = std::mem::take(&mut self.slots);
        for (id, slot) in slots {
            if let Some(spec) = BufferSpec::lookup(id) {
                release_slot(backend, spec, &slot, spec.is_owned());
            }
        }
        if let Some(fb) = self.downsample_fb.take() {
            backend.destroy_framebuffer(fb);
        }
    }
}

fn provision<B: GpuBackend + ?Sized>(
    backend: &mut B,
    spec: &BufferSpec,
    size: [u32; 2],
    format: TextureFormat,
    depth: TextureId,
) -> EffectsResult<BufferSlot> {
    let desc = TextureDesc {
        label: spec.label,
        size,
        layers: 1,
        kind: TextureKind::D2,
        format,
        mipmapped: spec.mipmapped,
    };
    let texture = backend.create_texture(&desc)?;
    let mut slot = BufferSlot {
        texture,
        fb: None,
        color_fb: None,
        size,
        format,
        depth: None,
    };

    if let Err(err) = build_framebuffers(backend, spec, &mut slot, depth) {
        release_slot(backend, spec, &slot, true);
        return Err(err);
    }

    log::debug!(
        "{}: allocated {}x{} {:?}{}",
        spec.label,
        size[0],
        size[1],
        format,
        if spec.mipmapped { " (mipmapped)" } else { "" }
    );
    Ok(slot)
}

fn build_framebuffers<B: GpuBackend + ?Sized>(
    backend: &mut B,
    spec: &BufferSpec,
    slot: &mut BufferSlot,
    depth: TextureId,
) -> EffectsResult<()> {
    let color = Some(Attachment::new(slot.texture));
    match spec.layout {
        FramebufferLayout::DepthAndColor => {
            slot.fb = Some(
                backend.create_framebuffer(spec.label, &[Some(Attachment::new(depth)), color])?,
            );
            slot.depth = Some(depth);
            slot.color_fb = Some(backend.create_framebuffer(spec.label, &[None, color])?);
        }
        FramebufferLayout::DepthOnly => {
            slot.fb = Some(backend.create_framebuffer(spec.label, &[color])?);
        }
        FramebufferLayout::ColorOnly => {
            slot.color_fb = Some(backend.create_framebuffer(spec.label, &[None, color])?);
        }
        FramebufferLayout::None | FramebufferLayout::MainNormalSlot => {}
    }
    Ok(())
}

fn release_slot<B: GpuBackend + ?Sized>(
    backend: &mut B,
    spec: &BufferSpec,
    slot: &BufferSlot,
    destroy_texture: bool,
) {
    if spec.layout == FramebufferLayout::MainNormalSlot {
        if let Some(fb) = slot.fb {
            // The main framebuffer may already be gone.
            let _ = backend.detach_texture(fb, slot.texture);
        }
    } else if let Some(fb) = slot.fb {
        backend.destroy_framebuffer(fb);
    }
    if let Some(fb) = slot.color_fb {
        backend.destroy_framebuffer(fb);
    }
    if destroy_texture {
        backend.destroy_texture(slot.texture);
        log::debug!("{}: released", spec.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCaps, RecordingBackend};

    fn host_depth(gpu: &mut RecordingBackend, size: [u32; 2]) -> TextureId {
        gpu.create_texture(&TextureDesc::d2("depth", size, TextureFormat::Depth24Stencil8))
            .unwrap()
    }

    #[test]
    fn baseline_has_main_color_and_pyramid() {
        let mut gpu = RecordingBackend::new();
        let depth = host_depth(&mut gpu, [64, 32]);
        let mut set = BufferSet::new(false);
        let changes = set.apply(&mut gpu, EffectSet::empty(), [64, 32], depth).unwrap();
        assert!(changes.allocated.contains(&BufferId::MainColor));
        assert!(changes.allocated.contains(&BufferId::MaxZ));
        assert!(!set.contains(BufferId::PostColor));
        assert_eq!(set.get(BufferId::MaxZ).unwrap().size, [32, 16]);
        assert_eq!(set.get(BufferId::MaxZ).unwrap().format, TextureFormat::Depth24);
    }

    #[test]
    fn pyramid_falls_back_to_float_color() {
        let mut gpu = RecordingBackend::with_caps(DeviceCaps {
            supports_depth_only_framebuffer: false,
        });
        let depth = host_depth(&mut gpu, [8, 8]);
        let mut set = BufferSet::new(false);
        set.apply(&mut gpu, EffectSet::empty(), [8, 8], depth).unwrap();
        assert_eq!(
            set.get(BufferId::MaxZ).unwrap().format,
            TextureFormat::R32Float
        );
    }

    #[test]
    fn resize_reallocates_owned_buffers() {
        let mut gpu = RecordingBackend::new();
        let depth = host_depth(&mut gpu, [64, 64]);
        let mut set = BufferSet::new(false);
        let enabled = EffectSet::DOUBLE_BUFFER | EffectSet::POST_BUFFER;
        set.apply(&mut gpu, enabled, [64, 64], depth).unwrap();
        let before = set.texture(BufferId::DoubleBuffer);
        let changes = set.apply(&mut gpu, enabled, [32, 64], depth).unwrap();
        assert!(changes.released.contains(&BufferId::DoubleBuffer));
        assert!(changes.allocated.contains(&BufferId::DoubleBuffer));
        assert_ne!(before, set.texture(BufferId::DoubleBuffer));
    }

    #[test]
    fn normal_input_attaches_to_main_framebuffer() {
        let mut gpu = RecordingBackend::new();
        let depth = host_depth(&mut gpu, [16, 16]);
        let mut set = BufferSet::new(false);
        set.apply(&mut gpu, EffectSet::NORMAL_BUFFER, [16, 16], depth)
            .unwrap();
        let main_fb = set.fb(BufferId::MainColor).unwrap();
        let normal = set.texture(BufferId::NormalInput).unwrap();
        let slots = gpu.attachments(main_fb).unwrap();
        assert_eq!(slots[NORMAL_SLOT], Some(Attachment::new(normal)));

        gpu.release_pool();
        set.apply(&mut gpu, EffectSet::empty(), [16, 16], depth).unwrap();
        assert!(!set.contains(BufferId::NormalInput));
        assert!(gpu.attachments(main_fb).unwrap()[NORMAL_SLOT].is_none());
    }

    #[test]
    fn normal_input_follows_main_color_after_swap_and_resize() {
        let mut gpu = RecordingBackend::new();
        let depth = host_depth(&mut gpu, [32, 32]);
        let mut set = BufferSet::new(false);
        let enabled = EffectSet::NORMAL_BUFFER | EffectSet::DOUBLE_BUFFER;
        set.apply(&mut gpu, enabled, [32, 32], depth).unwrap();
        set.swap(BufferId::MainColor, BufferId::DoubleBuffer);
        gpu.release_pool();

        // The normal input still hangs off what is now the double buffer's
        // framebuffer, which the resize destroys.
        set.apply(&mut gpu, enabled, [16, 32], depth).unwrap();
        let main_fb = set.fb(BufferId::MainColor).unwrap();
        let normal = set.texture(BufferId::NormalInput).unwrap();
        assert_eq!(
            gpu.attachments(main_fb).unwrap()[NORMAL_SLOT],
            Some(Attachment::new(normal))
        );

        set.swap(BufferId::MainColor, BufferId::DoubleBuffer);
        gpu.release_pool();
        set.apply(&mut gpu, EffectSet::NORMAL_BUFFER, [16, 32], depth)
            .unwrap();
        assert!(!set.contains(BufferId::DoubleBuffer));
        let main_fb = set.fb(BufferId::MainColor).unwrap();
        assert!(gpu.attachments(main_fb).unwrap()[NORMAL_SLOT].is_some());
    }

    #[test]
    fn swap_exchanges_whole_slots() {
        let mut gpu = RecordingBackend::new();
        let depth = host_depth(&mut gpu, [8, 8]);
        let mut set = BufferSet::new(false);
        set.apply(&mut gpu, EffectSet::DOUBLE_BUFFER, [8, 8], depth).unwrap();
        let main = *set.get(BufferId::MainColor).unwrap();
        let double = *set.get(BufferId::DoubleBuffer).unwrap();
        set.swap(BufferId::MainColor, BufferId::DoubleBuffer);
        assert_eq!(set.get(BufferId::MainColor), Some(&double));
        assert_eq!(set.get(BufferId::DoubleBuffer), Some(&main));
    }

    #[test]
    fn release_all_frees_everything() {
        let mut gpu = RecordingBackend::new();
        let depth = host_depth(&mut gpu, [8, 8]);
        let mut set = BufferSet::new(false);
        set.apply(&mut gpu, EffectSet::all(), [8, 8], depth).unwrap();
        set.release_all(&mut gpu);
        // Only the host depth survives.
        assert_eq!(gpu.live_textures(), 1);
        assert_eq!(gpu.live_framebuffers(), 0);
    }
}
