//! State carried from one frame to the next.

use glam::Mat4;

use crate::buffers::{BufferChanges, BufferId, BufferSet};

/// What the next frame needs to know about the last one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameHistory {
    /// View-projection of the last drawn frame.
    pub prev_persmat: Option<Mat4>,
    /// The double buffer holds a finished frame.
    pub valid_double_buffer: bool,
    /// The TAA history holds accumulated samples.
    pub valid_taa_history: bool,
    redraw_requested: bool,
}

impl FrameHistory {
    /// Drops the validity of every history buffer that lost its contents.
    pub fn invalidate(&mut self, changes: &BufferChanges) {
        if changes.touched(BufferId::DoubleBuffer) {
            self.valid_double_buffer = false;
        }
        if changes.touched(BufferId::TaaHistory) {
            self.valid_taa_history = false;
        }
    }

    /// Drops the validity of every history buffer.
    pub fn invalidate_all(&mut self) {
        self.valid_double_buffer = false;
        self.valid_taa_history = false;
    }

    /// Clears the redraw request of the previous frame.
    pub fn begin_draw(&mut self) {
        self.redraw_requested = false;
    }

    pub fn request_redraw(&mut self) {
        if !self.redraw_requested {
            log::debug!("history not warmed up, requesting another frame");
        }
        self.redraw_requested = true;
    }

    pub fn redraw_requested(&self) -> bool {
        self.redraw_requested
    }

    /// Returns and clears the pending redraw request.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    /// Records the frame just drawn. History buffers that exist now hold a
    /// finished frame.
    pub fn commit(&mut self, persmat: Mat4, buffers: &BufferSet) {
        self.prev_persmat = Some(persmat);
        self.valid_double_buffer = buffers.contains(BufferId::DoubleBuffer);
        self.valid_taa_history = buffers.contains(BufferId::TaaHistory);
    }
}
