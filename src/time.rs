//! Time types over the transceiver's 40-bit tick domain
//!
//! UWB transceivers in the DW1000 family timestamp events with a 40-bit
//! counter running at 64 GHz (one tick is 1/64 ns). All arithmetic in this
//! module wraps at the 40-bit boundary, like the hardware counter does.

use core::ops::Add;

use serde::{Deserialize, Serialize};

/// The maximum value of a 40-bit device timestamp.
pub const TIME_MAX: u64 = 0xff_ffff_ffff;

/// A delayed transmission can only be scheduled with the low 9 bits of the
/// target time cleared; the transmitter ignores anything finer.
pub const TX_SCHEDULE_GRANULARITY: u64 = 1 << 9;

/// An instant in device time
///
/// Wraps the same 40-bit timestamps the transceiver's timestamp registers
/// hold. Values read from the radio driver are already in this domain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// Returns `Some(...)` if `value` fits in 40 bits, `None` if it doesn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use twr_ss_ext::time::{Instant, TIME_MAX};
    ///
    /// assert!(Instant::new(TIME_MAX).is_some());
    /// assert!(Instant::new(TIME_MAX + 1).is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Returns the raw 40-bit timestamp
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Truncates this instant to the 32-bit representation used on the wire
    ///
    /// Ranging frames carry timestamps truncated to 32 bits regardless of
    /// the wider local counter; the peer reconstructs differences, not
    /// absolute times.
    pub fn to_wire(&self) -> u32 {
        self.0 as u32
    }

    /// Clears the bits below the delayed-transmission scheduling granularity
    ///
    /// The transmitter ignores the low 9 bits of a delayed-start target, so
    /// the time a frame actually leaves the antenna is this quantized value
    /// (plus the transmit antenna delay), not the raw target.
    pub fn quantize_for_tx(&self) -> Instant {
        Instant(self.0 & !(TX_SCHEDULE_GRANULARITY - 1))
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `&self` represents a later time than `earlier`. The
    /// 40-bit counter overflows regularly, so the numerical order of two
    /// timestamps says nothing about their temporal order; the caller has
    /// to know which came first.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        if self.value() >= earlier.value() {
            Duration(self.value() - earlier.value())
        } else {
            Duration(TIME_MAX - earlier.value() + self.value() + 1)
        }
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both operands are guaranteed to hold 40-bit values, so the sum
        // fits in 41 bits and the modulo keeps the result in range.
        let value = (self.value() + rhs.value()) % (TIME_MAX + 1);

        Instant(value)
    }
}

/// A span of device time between two instants
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// Returns `Some(...)` if `value` fits in 40 bits, `None` if it doesn't.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates an instance of `Duration` from a number of nanoseconds
    pub fn from_nanos(nanos: u32) -> Self {
        // `nanos` is at most 32 bits wide, so the product fits in 38 bits
        // and the `unwrap` can't fire.
        Duration::new(nanos as u64 * 64).unwrap()
    }

    /// Returns the raw 40-bit value
    pub fn value(&self) -> u64 {
        self.0
    }
}
