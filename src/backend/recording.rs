//! In-memory backend that records every call.

use std::collections::HashMap;

use super::{
    Attachment, Binding, DeviceCaps, DrawCall, DrawParams, GpuBackend, PassDesc, ShaderKind,
    TextureDesc, TextureFormat,
};
use crate::error::{EffectsError, EffectsResult};
use crate::handles::{FramebufferId, HandleCounter, PassId, ShaderId, TextureId};

/// A call observed by [`RecordingBackend`].
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    CreateTexture { id: TextureId, desc: TextureDesc },
    DestroyTexture(TextureId),
    PoolTexture { id: TextureId, label: &'static str },
    ReleasePool,
    CreateFramebuffer { id: FramebufferId, label: &'static str },
    DestroyFramebuffer(FramebufferId),
    Attach {
        framebuffer: FramebufferId,
        slot: usize,
        texture: TextureId,
        mip: u32,
    },
    Detach {
        framebuffer: FramebufferId,
        texture: TextureId,
    },
    CreateShader { id: ShaderId, kind: ShaderKind },
    DestroyShader(ShaderId),
    CreatePass { id: PassId, desc: PassDesc },
    DestroyPass(PassId),
    Draw(RecordedDraw),
}

/// A draw with everything resolved that a test may want to assert on.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub pass: PassId,
    pub pass_label: &'static str,
    pub shader: ShaderKind,
    pub instances: u32,
    pub target: FramebufferId,
    /// Attachments of `target` at the time of the draw.
    pub attachments: Vec<Option<Attachment>>,
    pub viewport: [u32; 2],
    pub inputs: Vec<Binding>,
    pub params: DrawParams,
}

impl RecordedDraw {
    /// Whether the draw writes into `texture` (at any mip).
    pub fn writes(&self, texture: TextureId) -> bool {
        self.attachments
            .iter()
            .flatten()
            .any(|a| a.texture == texture)
    }

    pub fn reads(&self, texture: TextureId) -> bool {
        self.inputs.iter().any(|b| b.texture == texture)
    }
}

struct PoolEntry {
    id: TextureId,
    size: [u32; 2],
    format: TextureFormat,
    in_use: bool,
}

/// A [`GpuBackend`] that allocates nothing and remembers everything.
///
/// Used by the test suite to check which buffers exist, which passes were
/// built and which draws a frame issued, without a GPU.
pub struct RecordingBackend {
    caps: DeviceCaps,
    ids: HandleCounter,
    textures: HashMap<TextureId, TextureDesc>,
    framebuffers: HashMap<FramebufferId, (&'static str, Vec<Option<Attachment>>)>,
    shaders: HashMap<ShaderId, ShaderKind>,
    passes: HashMap<PassId, PassDesc>,
    pool: Vec<PoolEntry>,
    fail_label: Option<&'static str>,
    events: Vec<Event>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::with_caps(DeviceCaps::default())
    }

    pub fn with_caps(caps: DeviceCaps) -> Self {
        Self {
            caps,
            ids: HandleCounter::default(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            passes: HashMap::new(),
            pool: Vec::new(),
            fail_label: None,
            events: Vec::new(),
        }
    }

    /// Makes every later allocation of a texture labelled `label` fail.
    pub fn fail_allocations_for(&mut self, label: &'static str) {
        self.fail_label = Some(label);
    }

    pub fn clear_allocation_failures(&mut self) {
        self.fail_label = None;
    }

    /// Number of textures the pool currently holds, in use or not.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.events.iter().filter_map(|e| match e {
            Event::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Owned textures currently alive (pool textures excluded).
    pub fn live_textures(&self) -> usize {
        self.textures.len() - self.pool.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_passes(&self) -> usize {
        self.passes.len()
    }

    pub fn attachments(&self, framebuffer: FramebufferId) -> Option<&[Option<Attachment>]> {
        self.framebuffers
            .get(&framebuffer)
            .map(|(_, slots)| slots.as_slice())
    }

    pub fn pass_desc(&self, pass: PassId) -> Option<&PassDesc> {
        self.passes.get(&pass)
    }

    fn check_alloc(&self, label: &'static str) -> EffectsResult<()> {
        if self.fail_label == Some(label) {
            return Err(EffectsError::allocation(label, "out of memory (simulated)"));
        }
        Ok(())
    }

    fn check_texture(&self, texture: TextureId) -> EffectsResult<()> {
        if self.textures.contains_key(&texture) {
            Ok(())
        } else {
            Err(EffectsError::UnknownTexture(texture))
        }
    }
}

impl GpuBackend for RecordingBackend {
    fn capabilities(&self) -> DeviceCaps {
        self.caps
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> EffectsResult<TextureId> {
        self.check_alloc(desc.label)?;
        let id = TextureId(self.ids.next());
        self.textures.insert(id, desc.clone());
        self.events.push(Event::CreateTexture {
            id,
            desc: desc.clone(),
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.events.push(Event::DestroyTexture(texture));
        }
    }

    fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&texture)
    }

    fn pool_texture(
        &mut self,
        label: &'static str,
        size: [u32; 2],
        format: TextureFormat,
    ) -> EffectsResult<TextureId> {
        self.check_alloc(label)?;
        let reused = self
            .pool
            .iter_mut()
            .find(|e| !e.in_use && e.size == size && e.format == format);
        let id = match reused {
            Some(entry) => {
                entry.in_use = true;
                entry.id
            }
            None => {
                let id = TextureId(self.ids.next());
                self.textures.insert(id, TextureDesc::d2(label, size, format));
                self.pool.push(PoolEntry {
                    id,
                    size,
                    format,
                    in_use: true,
                });
                id
            }
        };
        self.events.push(Event::PoolTexture { id, label });
        Ok(id)
    }

    fn release_pool(&mut self) {
        let idle: Vec<TextureId> = self
            .pool
            .iter()
            .filter(|e| !e.in_use)
            .map(|e| e.id)
            .collect();
        self.pool.retain(|e| e.in_use);
        for id in idle {
            self.textures.remove(&id);
            self.events.push(Event::DestroyTexture(id));
        }
        for entry in &mut self.pool {
            entry.in_use = false;
        }
        self.events.push(Event::ReleasePool);
    }

    fn create_framebuffer(
        &mut self,
        label: &'static str,
        attachments: &[Option<Attachment>],
    ) -> EffectsResult<FramebufferId> {
        for attachment in attachments.iter().flatten() {
            self.check_texture(attachment.texture)?;
        }
        let id = FramebufferId(self.ids.next());
        self.framebuffers.insert(id, (label, attachments.to_vec()));
        self.events.push(Event::CreateFramebuffer { id, label });
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer).is_some() {
            self.events.push(Event::DestroyFramebuffer(framebuffer));
        }
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        texture: TextureId,
        mip: u32,
    ) -> EffectsResult<()> {
        self.check_texture(texture)?;
        let (_, slots) = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(EffectsError::UnknownFramebuffer(framebuffer))?;
        if slots.len() <= slot {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(Attachment { texture, mip });
        self.events.push(Event::Attach {
            framebuffer,
            slot,
            texture,
            mip,
        });
        Ok(())
    }

    fn detach_texture(
        &mut self,
        framebuffer: FramebufferId,
        texture: TextureId,
    ) -> EffectsResult<()> {
        let (_, slots) = self
            .framebuffers
            .get_mut(&framebuffer)
            .ok_or(EffectsError::UnknownFramebuffer(framebuffer))?;
        for slot in slots.iter_mut() {
            if slot.is_some_and(|a| a.texture == texture) {
                *slot = None;
            }
        }
        self.events.push(Event::Detach {
            framebuffer,
            texture,
        });
        Ok(())
    }

    fn create_shader(&mut self, kind: ShaderKind) -> EffectsResult<ShaderId> {
        let id = ShaderId(self.ids.next());
        self.shaders.insert(id, kind);
        self.events.push(Event::CreateShader { id, kind });
        Ok(id)
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader).is_some() {
            self.events.push(Event::DestroyShader(shader));
        }
    }

    fn create_pass(&mut self, desc: &PassDesc) -> EffectsResult<PassId> {
        if !self.shaders.contains_key(&desc.shader) {
            return Err(EffectsError::UnknownShader(desc.shader));
        }
        let id = PassId(self.ids.next());
        self.passes.insert(id, desc.clone());
        self.events.push(Event::CreatePass {
            id,
            desc: desc.clone(),
        });
        Ok(id)
    }

    fn destroy_pass(&mut self, pass: PassId) {
        if self.passes.remove(&pass).is_some() {
            self.events.push(Event::DestroyPass(pass));
        }
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> EffectsResult<()> {
        let desc = self
            .passes
            .get(&call.pass)
            .ok_or(EffectsError::UnknownPass(call.pass))?;
        let shader = *self
            .shaders
            .get(&desc.shader)
            .ok_or(EffectsError::UnknownShader(desc.shader))?;
        let (_, attachments) = self
            .framebuffers
            .get(&call.target)
            .ok_or(EffectsError::UnknownFramebuffer(call.target))?;
        for input in call.inputs {
            self.check_texture(input.texture)?;
        }
        let draw = RecordedDraw {
            pass: call.pass,
            pass_label: desc.label,
            shader,
            instances: desc.instances,
            target: call.target,
            attachments: attachments.clone(),
            viewport: call.viewport,
            inputs: call.inputs.to_vec(),
            params: call.params,
        };
        self.events.push(Event::Draw(draw));
        Ok(())
    }
}
