//! The radio-driver contract this core is written against
//!
//! The actual transceiver driver lives outside this crate; the state
//! machine only needs the narrow slice of it expressed by [`Transceiver`].
//! All methods are non-blocking register accesses; `start_tx` is
//! fire-and-forget and reports only whether the hardware accepted the
//! start request.

use ieee802154::mac;

use crate::time::{Duration, Instant};

/// Decode-status flags of the last received frame
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxQuality {
    /// The leading-edge detection algorithm failed; the receive timestamp
    /// is unusable for ranging
    pub lde_error: bool,
}

/// The transmitter rejected a transmission-start request
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartTxError {
    /// The scheduled delayed-start time has already passed
    DelayedSendTooLate,
    /// The transmitter was not in a state to accept the request
    NotReady,
}

/// Access to the transceiver owned by the host driver
///
/// One implementation per radio; the host serializes all calls into this
/// core per device instance, so implementations don't need internal
/// locking.
pub trait Transceiver {
    /// This node's own short address
    fn short_address(&self) -> mac::ShortAddress;

    /// Timestamp of the last received frame's leading edge
    fn rx_timestamp(&self) -> Instant;

    /// Timestamp of this node's last transmitted frame
    fn tx_timestamp(&self) -> Instant;

    /// Frame control word of the last received frame
    fn rx_frame_control(&self) -> u16;

    /// Payload length of the last received frame, in bytes
    fn rx_frame_len(&self) -> usize;

    /// Decode-status flags of the last received frame
    fn rx_quality(&self) -> RxQuality;

    /// The last carrier-integrator reading, in raw integrator units
    fn carrier_integrator(&self) -> i32;

    /// Calibrated delay between the transmit clock event and the signal
    /// leaving the antenna
    fn tx_antenna_delay(&self) -> Duration;

    /// Calibrated delay between the signal reaching the antenna and the
    /// receive clock event
    fn rx_antenna_delay(&self) -> Duration;

    /// Copies `data` into the transmit buffer at `offset`
    fn write_tx_buffer(&mut self, data: &[u8], offset: usize);

    /// Sets the frame length for the next transmission
    fn set_tx_frame_len(&mut self, len: usize);

    /// Arms the delayed-start mechanism with the given target time
    ///
    /// The target is already quantized to
    /// [`TX_SCHEDULE_GRANULARITY`](crate::time::TX_SCHEDULE_GRANULARITY);
    /// implementations can write it to the hardware unchanged.
    fn set_delayed_tx_time(&mut self, time: Instant);

    /// Requests transmission start
    ///
    /// The buffer, frame length and delayed-start target must already be
    /// set; the hardware captures them synchronously at this point.
    fn start_tx(&mut self) -> Result<(), StartTxError>;
}
