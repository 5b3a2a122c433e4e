//! Single-outstanding-exchange admission control
//!
//! Each device instance carries one binary slot: either no exchange is
//! outstanding ("available") or exactly one is ("busy"). The guard
//! expresses protocol-level exclusivity, not memory safety; all entry
//! points are serialized per device by the host's event dispatch.

/// Outcome of a reset probe, see [`ExchangeGuard::probe_and_release_on_reset`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetProbe {
    /// An exchange was stuck; the guard has been forced back to available
    Released,
    /// No exchange was outstanding; the reset does not apply here
    NotApplicable,
}

/// The per-device binary exchange slot
///
/// Starts available. A receive event that finds the guard available is
/// unsolicited (no exchange was admitted) and must not be processed.
#[derive(Debug)]
pub struct ExchangeGuard {
    available: bool,
}

impl ExchangeGuard {
    /// Creates a guard with the slot available
    pub fn new() -> Self {
        ExchangeGuard { available: true }
    }

    /// Whether no exchange is currently outstanding
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Claims the slot for a new exchange
    ///
    /// Called by the host before sending a request or arming the receiver
    /// for one. Returns `false` if an exchange is already outstanding, in
    /// which case the caller must not start another.
    pub fn try_admit(&mut self) -> bool {
        if self.available {
            self.available = false;
            true
        } else {
            false
        }
    }

    /// Releases the slot at the end of a successful exchange
    ///
    /// A second release of an already-available slot is a no-op; terminal
    /// paths may overlap (the responder releases on the error path and
    /// again unconditionally afterwards) and the slot must still end up
    /// released exactly once.
    pub fn release_on_success(&mut self) {
        self.available = true;
    }

    /// Releases the slot after a failed transmission start
    pub fn release_on_error(&mut self) {
        self.available = true;
    }

    /// Handles an external reset signal
    ///
    /// Only has an effect if an exchange is stuck: the slot is forced back
    /// to available and [`ResetProbe::Released`] is returned so the caller
    /// can record the occurrence. A reset with nothing outstanding is
    /// reported as [`ResetProbe::NotApplicable`] and changes nothing.
    pub fn probe_and_release_on_reset(&mut self) -> ResetProbe {
        if self.available {
            ResetProbe::NotApplicable
        } else {
            self.available = true;
            ResetProbe::Released
        }
    }
}

impl Default for ExchangeGuard {
    fn default() -> Self {
        ExchangeGuard::new()
    }
}
