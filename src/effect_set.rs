//! The per-frame set of active screen-space effects.

use bitflags::bitflags;

bitflags! {
    /// Bitmask of the effects (and the buffers they need) active this frame.
    ///
    /// Resolved once per frame by [`resolve_effects`](crate::resolve_effects)
    /// and then treated as immutable. Buffer bits such as
    /// [`POST_BUFFER`](Self::POST_BUFFER) are never set on their own by a
    /// setting; they are contributed as dependencies of the effects that read
    /// or write them.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EffectSet: u32 {
        const MOTION_BLUR         = 1 << 0;
        const BLOOM               = 1 << 1;
        const DOF                 = 1 << 2;
        const VOLUMETRIC          = 1 << 3;
        const SSR                 = 1 << 4;
        const REFRACTION          = 1 << 5;
        const GTAO                = 1 << 6;
        const SSS                 = 1 << 7;
        const TAA                 = 1 << 8;
        const TAA_REPROJECT       = 1 << 9;
        /// Ping-pong colour buffer used by every compositing stage.
        const POST_BUFFER         = 1 << 10;
        /// Last frame's colour as it was before post processing.
        const DOUBLE_BUFFER       = 1 << 11;
        const DEPTH_DOUBLE_BUFFER = 1 << 12;
        const VELOCITY_BUFFER     = 1 << 13;
        const NORMAL_BUFFER       = 1 << 14;
    }
}

impl EffectSet {
    /// Bits that only name buffers, never an effect of their own.
    pub const BUFFERS: EffectSet = EffectSet::POST_BUFFER
        .union(EffectSet::DOUBLE_BUFFER)
        .union(EffectSet::DEPTH_DOUBLE_BUFFER)
        .union(EffectSet::VELOCITY_BUFFER)
        .union(EffectSet::NORMAL_BUFFER);

    /// Whether any of `bits` is set. An empty `bits` gate means "always".
    pub fn gates(self, bits: EffectSet) -> bool {
        bits.is_empty() || self.intersects(bits)
    }
}
