//! The ranging frame exchanged between the two nodes
//!
//! One frame record travels through the whole exchange: the initiator sends
//! it as a request, the responder rewrites it into a response with its
//! extended payload, and the initiator finally rewrites its own copy into
//! the terminal record handed to completion listeners. A frame is immutable
//! once transmitted; each hop rewrites the *local* copy, never the one on
//! air.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::Error;

/// IEEE 802.15.4 frame control word of a ranging frame: data frame, short
/// addressing, with the ranging bit expectations of the DW1000 family.
pub const FCTRL_IEEE_RANGE_16: u16 = 0x8841;

/// Identifies which step of the exchange produced a frame
///
/// The code strictly advances one step per successful hop. Anything outside
/// this set is not ours and must be passed through to other handlers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ExchangeCode {
    /// No exchange step; the reset value of a frame slot
    Invalid = 0x00,
    /// Fresh request from the initiator
    ExtendedRequest = 0x11,
    /// Responder's reply, extended payload populated
    ExtendedResponse = 0x12,
    /// Terminal tag the initiator writes into its own copy; never
    /// re-transmitted by this core
    ExtendedFinal = 0x13,
}

/// A position estimate in local cartesian coordinates, in meters
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Position {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
    /// Z coordinate
    pub z: f32,
}

impl Position {
    /// The origin, used for slots that haven't carried an exchange yet
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
}

/// Sentinel marking a variance component that was never measured.
pub const VARIANCE_UNKNOWN: f32 = -1.0;

/// Uncertainty of a position estimate, in spherical components
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct PositionVariance {
    /// Variance of the range component
    pub range: f32,
    /// Variance of the azimuth component, [`VARIANCE_UNKNOWN`] if not
    /// measured
    pub azimuth: f32,
    /// Variance of the zenith component, [`VARIANCE_UNKNOWN`] if not
    /// measured
    pub zenith: f32,
}

impl PositionVariance {
    /// A variance with only the range component known
    ///
    /// Fixed anchors typically calibrate range uncertainty only; azimuth
    /// and zenith are marked unknown.
    pub fn range_only(range: f32) -> Self {
        PositionVariance {
            range,
            azimuth: VARIANCE_UNKNOWN,
            zenith: VARIANCE_UNKNOWN,
        }
    }
}

/// The wire record of a single-sided extended ranging exchange
///
/// Timestamp fields are role-dependent, the same storage serving both hops:
/// on the responder's outgoing frame, `request_timestamp` is the time it
/// received the request and `response_timestamp` the time its reply leaves
/// the antenna (both on the responder's clock). On the initiator's terminal
/// copy, they are the time the request left and the time the response
/// arrived (both on the initiator's clock). Downstream consumers difference
/// the pairs; absolute values are meaningless across nodes unless a shared
/// timebase is in use.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct RangingFrame {
    /// Short address of the sending node; swapped on each hop
    pub src_address: u16,
    /// Short address of the receiving node; swapped on each hop
    pub dst_address: u16,
    /// Raw exchange code, see [`RangingFrame::code`]
    pub exchange_code: u16,
    /// Request-hop timestamp, truncated to wire width
    pub request_timestamp: u32,
    /// Response-hop timestamp, truncated to wire width
    pub response_timestamp: u32,
    /// Carrier-frequency offset estimate in raw integrator units
    ///
    /// Negated on the responder frame, unnegated on the final copy, so the
    /// downstream consumer sees the frequency bias in one consistent
    /// direction. Exactly zero when a shared timebase is in use.
    pub carrier_correction: i32,
    /// Responder's known coordinates; meaningful from the response hop on
    pub position: Position,
    /// Uncertainty of the responder's position estimate
    pub variance: PositionVariance,
}

impl RangingFrame {
    /// Encoded size of a ranging frame on the wire, in bytes.
    pub const LEN: usize = 42;

    /// An empty frame slot
    pub fn empty() -> Self {
        RangingFrame {
            src_address: 0,
            dst_address: 0,
            exchange_code: ExchangeCode::Invalid.into(),
            request_timestamp: 0,
            response_timestamp: 0,
            carrier_correction: 0,
            position: Position::ORIGIN,
            variance: PositionVariance::range_only(VARIANCE_UNKNOWN),
        }
    }

    /// The exchange step this frame carries, if the code is recognized
    pub fn code(&self) -> Option<ExchangeCode> {
        ExchangeCode::try_from_primitive(self.exchange_code).ok()
    }

    /// Tags this frame with the given exchange step
    pub fn set_code(&mut self, code: ExchangeCode) {
        self.exchange_code = code.into();
    }

    /// Marks `own_address` as the sender and the previous sender as the
    /// recipient
    pub fn swap_addresses(&mut self, own_address: u16) {
        self.dst_address = self.src_address;
        self.src_address = own_address;
    }

    /// Serializes this frame into `buf`
    ///
    /// Returns the number of bytes written, always [`RangingFrame::LEN`]
    /// on success.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = ssmarshal::serialize(buf, self)?;
        Ok(len)
    }

    /// Deserializes a frame from `buf`
    ///
    /// `buf` must hold exactly one encoded frame; anything shorter or
    /// longer is rejected, matching the fixed-size length check the
    /// initiator performs on received responses.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != Self::LEN {
            return Err(Error::InvalidFrameLength { len: buf.len() });
        }

        let (frame, _) = ssmarshal::deserialize::<Self>(buf)?;
        Ok(frame)
    }
}
