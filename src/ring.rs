//! Frame-ring storage for in-flight exchanges
//!
//! Receive, transmit-error and reset events arrive asynchronously and need
//! to reference the frame of the exchange they belong to. The ring pairs a
//! monotonically increasing exchange index with a fixed set of slots;
//! index modulo slot count picks the storage location. Together with the
//! exchange guard admitting at most one outstanding exchange per device,
//! this guarantees no two live exchanges share a slot.

use alloc::vec::Vec;
use core::num::Wrapping;

use crate::frame::RangingFrame;

/// Default number of frame slots, matching the reference configuration
pub const DEFAULT_NFRAMES: usize = 2;

/// An owned ring of frame slots plus the exchange index
#[derive(Debug)]
pub struct FrameRing {
    frames: Vec<RangingFrame>,
    idx: Wrapping<u16>,
}

impl FrameRing {
    /// Creates a ring with `nframes` slots, all empty
    ///
    /// # Panics
    ///
    /// Panics if `nframes` is zero.
    pub fn new(nframes: usize) -> Self {
        assert!(nframes > 0);

        let mut frames = Vec::with_capacity(nframes);
        frames.resize_with(nframes, RangingFrame::empty);

        FrameRing {
            frames,
            idx: Wrapping(0),
        }
    }

    /// The current exchange index
    pub fn index(&self) -> u16 {
        self.idx.0
    }

    /// Advances the exchange index to the next slot and returns it mutably
    ///
    /// Called by the host loader when a new frame arrives: the decoded
    /// frame is staged here before the receive-complete event is
    /// dispatched.
    pub fn advance(&mut self) -> &mut RangingFrame {
        self.idx += Wrapping(1);
        let slot = self.idx.0 as usize % self.frames.len();
        &mut self.frames[slot]
    }

    /// The slot the current exchange index maps to
    pub fn current(&self) -> &RangingFrame {
        let slot = self.idx.0 as usize % self.frames.len();
        &self.frames[slot]
    }

    /// Mutable access to the current slot
    pub fn current_mut(&mut self) -> &mut RangingFrame {
        let slot = self.idx.0 as usize % self.frames.len();
        &mut self.frames[slot]
    }
}
