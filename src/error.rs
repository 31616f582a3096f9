//! Error type shared by every stage of the effect pipeline.

use crate::handles::{FramebufferId, PassId, ShaderId, TextureId};

/// Errors surfaced to the host renderer.
///
/// Allocation failures are fatal for the frame: the host must not present a
/// partially composited image when [`EffectsContext::effects_init`] or
/// [`EffectsContext::draw_effects`] returns one.
///
/// [`EffectsContext::effects_init`]: crate::EffectsContext::effects_init
/// [`EffectsContext::draw_effects`]: crate::EffectsContext::draw_effects
#[derive(thiserror::Error, Debug)]
pub enum EffectsError {
    #[error("failed to allocate {buffer}: {reason}")]
    Allocation { buffer: &'static str, reason: String },

    #[error("unknown texture {0}")]
    UnknownTexture(TextureId),

    #[error("unknown framebuffer {0}")]
    UnknownFramebuffer(FramebufferId),

    #[error("unknown shader {0}")]
    UnknownShader(ShaderId),

    #[error("unknown pass {0}")]
    UnknownPass(PassId),

    #[error("{0} called before the effects were initialized")]
    NotInitialized(&'static str),

    #[error("device error: {0}")]
    Device(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EffectsError {
    pub fn allocation<T: ToString>(buffer: &'static str, reason: T) -> Self {
        EffectsError::Allocation {
            buffer,
            reason: reason.to_string(),
        }
    }

    pub fn device<T: ToString>(msg: T) -> Self {
        EffectsError::Device(msg.to_string())
    }

    /// Whether this error means GPU memory could not be provisioned.
    pub fn is_allocation(&self) -> bool {
        matches!(self, EffectsError::Allocation { .. })
    }
}

/// Result type alias for effect pipeline operations.
pub type EffectsResult<T> = Result<T, EffectsError>;
