//! Capability hooks and listener interfaces
//!
//! The host framework dispatches radio events to an ordered chain of
//! handlers. A handler answers each event with an explicit [`Outcome`]
//! instead of a bare boolean: [`Outcome::NotApplicable`] tells the host to
//! offer the event to the next handler in the chain, [`Outcome::Handled`]
//! that it has been consumed.

use crate::driver::Transceiver;
use crate::frame::RangingFrame;

/// A handler's answer to a dispatched event
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The event was consumed by this handler
    Handled,
    /// The event is not for this handler; pass it on
    NotApplicable,
}

impl Outcome {
    /// Whether the event was consumed
    pub fn is_handled(self) -> bool {
        self == Outcome::Handled
    }
}

/// The capability hooks a ranging extension registers with the host
///
/// All hooks run synchronously in the host's event-dispatch context and
/// must not block. Each has a pass-through default so an implementation
/// only provides the hooks it cares about.
pub trait MacHandler<T: Transceiver> {
    /// A frame has been received and staged in the frame ring
    fn on_rx_complete(&mut self, radio: &mut T) -> Outcome {
        let _ = radio;
        Outcome::NotApplicable
    }

    /// The hardware reported an asynchronous transmission-start error
    fn on_tx_start_error(&mut self, radio: &mut T) -> Outcome {
        let _ = radio;
        Outcome::NotApplicable
    }

    /// The host signalled a receiver reset, typically from its receive
    /// timeout
    fn on_reset(&mut self, radio: &mut T) -> Outcome {
        let _ = radio;
        Outcome::NotApplicable
    }

    /// Last chance to populate outgoing frame fields before the frame is
    /// written to the transmit buffer
    fn on_final_prepare(&mut self, radio: &mut T) -> Outcome {
        let _ = radio;
        Outcome::NotApplicable
    }
}

/// Downstream consumer of finished exchanges
///
/// Listeners are registered with the ranging instance in order. After a
/// successful initiator-side exchange, every listener runs, regardless of
/// what the previous ones returned; the `Outcome` is informational only.
pub trait RangingListener {
    /// The terminal frame of a completed exchange is ready
    ///
    /// This is where distance and position computation starts; the frame
    /// is the initiator's local copy tagged with the terminal exchange
    /// code.
    fn on_exchange_complete(&mut self, frame: &RangingFrame) -> Outcome;

    /// A scheduled response could not be started
    fn on_transmit_error(&mut self) -> Outcome {
        Outcome::NotApplicable
    }
}
