//! Single-sided, extended-payload two-way ranging core
//!
//! This crate implements one variant of the two-way time-of-flight ranging
//! exchange between two UWB nodes: an initiator sends a request, the
//! responder replies at a precisely scheduled time with its receive and
//! transmit timestamps plus its known coordinates and their variance, and
//! the initiator folds everything into a terminal frame handed to
//! completion listeners. Those listeners are where distance and position
//! computation lives; this crate stops at the finished frame.
//!
//! The crate is a protocol core, not a radio driver: it is written against
//! the [`driver::Transceiver`] trait and plugs into a host event-dispatch
//! framework through the [`handler::MacHandler`] hooks. All entry points
//! run synchronously in the host's event context and never block.
//!
//! The entry point is [`SsTwrExtended`]; see the [`twr`] module.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod correction;
pub mod driver;
pub mod frame;
pub mod guard;
pub mod handler;
pub mod ring;
pub mod stats;
pub mod time;
pub mod twr;

pub use ieee802154::mac;

pub use crate::{
    driver::{StartTxError, Transceiver},
    frame::{ExchangeCode, Position, PositionVariance, RangingFrame},
    guard::{ExchangeGuard, ResetProbe},
    handler::{MacHandler, Outcome, RangingListener},
    stats::StatsSnapshot,
    time::{Duration, Instant},
    twr::{RangingConfig, ResponderProfile, SsTwrExtended},
};

use core::fmt;

/// An error that can occur while encoding or decoding ranging frames
pub enum Error {
    /// An error occured while serializing or deserializing frame data
    Ssmarshal(ssmarshal::Error),

    /// A buffer did not hold exactly one encoded ranging frame
    InvalidFrameLength {
        /// The length of the offending buffer
        len: usize,
    },
}

impl From<ssmarshal::Error> for Error {
    fn from(error: ssmarshal::Error) -> Self {
        Error::Ssmarshal(error)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Ssmarshal(error) => write!(f, "Ssmarshal({:?})", error),
            Error::InvalidFrameLength { len } => {
                write!(f, "InvalidFrameLength {{ len: {:?} }}", len)
            }
        }
    }
}
