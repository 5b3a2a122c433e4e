//! Timestamp correction for hardware-accurate delayed transmissions
//!
//! Pure arithmetic, no radio access: converts raw device timestamps into
//! the values embedded on the wire, computes the responder's delayed
//! transmission target, and applies the per-device antenna delay. The
//! optional clock-scaling hook maps local time into a network-wide
//! reference timebase before wire truncation.

use crate::time::{Duration, Instant, TIME_MAX};

/// Maps local device time into a shared reference timebase
///
/// Implemented by an external clock-synchronization service. When a scaler
/// is configured, every timestamp embedded in a frame goes through it, and
/// carrier-frequency corrections are reported as zero since the scaler
/// already compensates frequency offsets.
pub trait TimebaseScaler {
    /// Converts a local timestamp to the shared reference timebase
    fn to_reference(&self, local: Instant) -> Instant;
}

/// The two timestamps that come out of scheduling a delayed response
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxSchedule {
    /// The target handed to the driver's delayed-start register, already
    /// quantized to the hardware's scheduling granularity
    ///
    /// The low bits are cleared here rather than left for the hardware to
    /// ignore, so the driver contract doesn't depend on that register
    /// quirk.
    pub trigger: Instant,

    /// The instant the frame actually leaves the antenna
    ///
    /// Quantized trigger plus transmit antenna delay. This is the value
    /// embedded in the outgoing frame. The quantization happens *before*
    /// the antenna delay is added; doing it the other way around shifts
    /// the reported timestamp by the antenna delay's low bits relative to
    /// what the hardware does.
    pub departure: Instant,
}

/// Computes the responder's transmission schedule
///
/// `holdoff_delay` is the configured hold-off in coarse units; shifted by
/// 16 bits it becomes a device-tick duration, giving the responder
/// processing headroom between receiving the request and the reply going
/// out.
pub fn response_schedule(
    request_rx: Instant,
    holdoff_delay: u32,
    tx_antenna_delay: Duration,
) -> TxSchedule {
    // The shifted hold-off stays within the 40-bit domain for any sane
    // configuration; the modulo makes the `unwrap` unconditionally safe.
    let holdoff = Duration::new((u64::from(holdoff_delay) << 16) % (TIME_MAX + 1)).unwrap();

    let trigger = (request_rx + holdoff).quantize_for_tx();
    let departure = trigger + tx_antenna_delay;

    TxSchedule { trigger, departure }
}

/// Truncates a timestamp to its wire representation, via the shared
/// timebase if a scaler is configured
pub fn embed(timestamp: Instant, scaler: Option<&dyn TimebaseScaler>) -> u32 {
    match scaler {
        Some(scaler) => scaler.to_reference(timestamp).to_wire(),
        None => timestamp.to_wire(),
    }
}

/// The carrier correction the responder embeds
///
/// The local integrator reading is negated so the initiator-side consumer
/// sees the frequency bias of both frames in one consistent direction.
/// Zero when a shared timebase is in use.
pub fn responder_carrier(carrier_integrator: i32, scaled: bool) -> i32 {
    if scaled {
        0
    } else {
        carrier_integrator.wrapping_neg()
    }
}

/// The carrier correction the initiator records in its terminal copy
///
/// Unnegated, complementing [`responder_carrier`]. Zero when a shared
/// timebase is in use.
pub fn initiator_carrier(carrier_integrator: i32, scaled: bool) -> i32 {
    if scaled {
        0
    } else {
        carrier_integrator
    }
}
