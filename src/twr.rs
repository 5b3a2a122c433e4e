//! The single-sided, extended-payload ranging state machine
//!
//! One [`SsTwrExtended`] instance per radio. The host framework stages
//! each decoded ranging frame in the instance's frame ring and dispatches
//! receive, transmit-error and reset events through the [`MacHandler`]
//! hooks. Depending on the exchange code of the staged frame, a receive
//! event either runs the responder transition (reply with embedded
//! timestamps and the extended payload, at a quantized delayed start) or
//! the initiator-finishing transition (validate, write the terminal copy,
//! notify listeners).

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::correction::{self, TimebaseScaler};
use crate::driver::Transceiver;
use crate::frame::{ExchangeCode, Position, PositionVariance, RangingFrame, FCTRL_IEEE_RANGE_16};
use crate::guard::{ExchangeGuard, ResetProbe};
use crate::handler::{MacHandler, Outcome, RangingListener};
use crate::ring::{FrameRing, DEFAULT_NFRAMES};
use crate::stats::RangingStats;

/// Timing configuration of a ranging instance
///
/// Owned per instance and set once at registration; both delays apply to
/// every exchange the instance takes part in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RangingConfig {
    /// Hold-off before the responder's reply goes out, in coarse units
    /// (shifted into device ticks by the timestamp corrector)
    pub tx_holdoff_delay: u32,

    /// Receive timeout the host arms after sending a request, in
    /// microseconds
    ///
    /// The timeout itself is owned by the driver; on expiry the host is
    /// expected to feed the reset hook so a stuck exchange is recovered.
    pub rx_timeout_delay: u32,
}

impl Default for RangingConfig {
    fn default() -> Self {
        RangingConfig {
            tx_holdoff_delay: 0x0800,
            rx_timeout_delay: 0x30,
        }
    }
}

/// The responder's contribution to the extended payload
///
/// Coordinates and variance of this node's surveyed position, written
/// into every response frame by the final-prepare hook.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponderProfile {
    /// This node's known coordinates
    pub position: Position,
    /// Uncertainty of those coordinates
    pub variance: PositionVariance,
}

impl ResponderProfile {
    /// Creates a profile from surveyed coordinates and their variance
    pub fn new(position: Position, variance: PositionVariance) -> Self {
        ResponderProfile { position, variance }
    }
}

/// A single-sided extended-payload ranging instance
pub struct SsTwrExtended {
    config: RangingConfig,
    profile: ResponderProfile,
    guard: ExchangeGuard,
    ring: FrameRing,
    scaler: Option<Box<dyn TimebaseScaler>>,
    listeners: Vec<Box<dyn RangingListener>>,
    stats: RangingStats,
}

impl SsTwrExtended {
    /// Creates an instance with the default number of frame slots
    pub fn new(config: RangingConfig, profile: ResponderProfile) -> Self {
        SsTwrExtended {
            config,
            profile,
            guard: ExchangeGuard::new(),
            ring: FrameRing::new(DEFAULT_NFRAMES),
            scaler: None,
            listeners: Vec::new(),
            stats: RangingStats::new(),
        }
    }

    /// Uses `nframes` frame slots instead of the default
    pub fn with_frame_slots(mut self, nframes: usize) -> Self {
        self.ring = FrameRing::new(nframes);
        self
    }

    /// Routes all embedded timestamps through a shared-timebase scaler
    ///
    /// In this mode carrier corrections are reported as exactly zero; the
    /// scaler already compensates the frequency offset.
    pub fn with_scaler(mut self, scaler: Box<dyn TimebaseScaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Appends a completion listener to the ordered list
    pub fn add_listener(&mut self, listener: Box<dyn RangingListener>) {
        self.listeners.push(listener);
    }

    /// The instance's timing configuration
    pub fn config(&self) -> &RangingConfig {
        &self.config
    }

    /// The instance's exchange counters
    pub fn stats(&self) -> &RangingStats {
        &self.stats
    }

    /// The admission guard
    ///
    /// The host claims the slot through [`ExchangeGuard::try_admit`]
    /// before sending a request or arming the receiver for one.
    pub fn guard(&mut self) -> &mut ExchangeGuard {
        &mut self.guard
    }

    /// Stages a decoded received frame in the ring
    ///
    /// Called by the host's receive loader before dispatching the
    /// receive-complete event; advances the exchange index.
    pub fn stage_received(&mut self, frame: RangingFrame) {
        *self.ring.advance() = frame;
    }

    /// The frame of the current exchange
    ///
    /// After a completed exchange this is the terminal copy that was
    /// handed to the listeners.
    pub fn current_frame(&self) -> &RangingFrame {
        self.ring.current()
    }

    /// Responder transition: reply to a fresh request
    fn respond<T: Transceiver>(&mut self, radio: &mut T) -> Outcome {
        let request_rx = radio.rx_timestamp();
        let schedule = correction::response_schedule(
            request_rx,
            self.config.tx_holdoff_delay,
            radio.tx_antenna_delay(),
        );

        let scaled = self.scaler.is_some();
        let request_wire = correction::embed(request_rx, self.scaler.as_deref());
        let response_wire = correction::embed(schedule.departure, self.scaler.as_deref());
        let carrier = correction::responder_carrier(radio.carrier_integrator(), scaled);
        let own_address = radio.short_address().0;

        {
            let frame = self.ring.current_mut();
            frame.request_timestamp = request_wire;
            frame.response_timestamp = response_wire;
            frame.swap_addresses(own_address);
            frame.set_code(ExchangeCode::ExtendedResponse);
            frame.carrier_correction = carrier;
        }

        // Extended payload goes in before the frame is written out; the
        // driver captures the buffer synchronously on start_tx.
        self.on_final_prepare(radio);

        let mut buf = [0; RangingFrame::LEN];
        if self.ring.current().encode(&mut buf).is_err() {
            self.stats.record_tx_error();
            self.guard.release_on_error();
            return Outcome::Handled;
        }

        radio.write_tx_buffer(&buf, 0);
        radio.set_tx_frame_len(RangingFrame::LEN);
        radio.set_delayed_tx_time(schedule.trigger);

        if radio.start_tx().is_err() {
            self.stats.record_tx_error();
            self.guard.release_on_error();
            self.notify_transmit_error();
        }
        // The exchange is over for this node whether or not the hardware
        // later confirms delivery; the slot is released on both paths.
        self.guard.release_on_success();

        Outcome::Handled
    }

    /// Initiator transition: the expected response arrived
    fn finish<T: Transceiver>(&mut self, radio: &mut T) -> Outcome {
        // Wrong length or a failed leading-edge detection: absorb the
        // event with no side effects. The guard stays busy; the driver's
        // receive timeout feeds the reset hook and recovers the slot.
        if radio.rx_frame_len() != RangingFrame::LEN {
            return Outcome::Handled;
        }
        if radio.rx_quality().lde_error {
            return Outcome::Handled;
        }

        let request_tx = radio.tx_timestamp();
        let response_rx = radio.rx_timestamp();

        let scaled = self.scaler.is_some();
        let request_wire = correction::embed(request_tx, self.scaler.as_deref());
        let response_wire = correction::embed(response_rx, self.scaler.as_deref());
        let carrier = correction::initiator_carrier(radio.carrier_integrator(), scaled);
        let own_address = radio.short_address().0;

        {
            let frame = self.ring.current_mut();
            frame.request_timestamp = request_wire;
            frame.response_timestamp = response_wire;
            frame.swap_addresses(own_address);
            frame.set_code(ExchangeCode::ExtendedFinal);
            frame.carrier_correction = carrier;
        }

        self.stats.record_complete();
        self.guard.release_on_success();

        // Every listener runs; one listener's outcome does not stop the
        // walk.
        let frame = self.ring.current();
        for listener in self.listeners.iter_mut() {
            let _ = listener.on_exchange_complete(frame);
        }

        Outcome::Handled
    }

    fn notify_transmit_error(&mut self) {
        for listener in self.listeners.iter_mut() {
            let _ = listener.on_transmit_error();
        }
    }
}

impl<T: Transceiver> MacHandler<T> for SsTwrExtended {
    fn on_rx_complete(&mut self, radio: &mut T) -> Outcome {
        if radio.rx_frame_control() != FCTRL_IEEE_RANGE_16 {
            return Outcome::NotApplicable;
        }
        // A matching frame with no admitted exchange is unsolicited; hand
        // it to the next handler untouched.
        if self.guard.is_available() {
            return Outcome::NotApplicable;
        }

        match self.ring.current().code() {
            Some(ExchangeCode::ExtendedRequest) => self.respond(radio),
            Some(ExchangeCode::ExtendedResponse) => self.finish(radio),
            _ => Outcome::NotApplicable,
        }
    }

    fn on_tx_start_error(&mut self, _radio: &mut T) -> Outcome {
        self.stats.record_tx_error();
        self.notify_transmit_error();
        Outcome::Handled
    }

    fn on_reset(&mut self, _radio: &mut T) -> Outcome {
        match self.guard.probe_and_release_on_reset() {
            ResetProbe::Released => {
                self.stats.record_reset();
                Outcome::Handled
            }
            ResetProbe::NotApplicable => Outcome::NotApplicable,
        }
    }

    fn on_final_prepare(&mut self, _radio: &mut T) -> Outcome {
        let frame = self.ring.current_mut();
        frame.position = self.profile.position;
        frame.variance = self.profile.variance;
        Outcome::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{RxQuality, StartTxError};
    use crate::time::{Duration, Instant, TX_SCHEDULE_GRANULARITY};
    use alloc::rc::Rc;
    use core::cell::RefCell;
    use ieee802154::mac;

    struct MockRadio {
        address: u16,
        rx_timestamp: u64,
        tx_timestamp: u64,
        frame_control: u16,
        frame_len: usize,
        lde_error: bool,
        carrier_integrator: i32,
        tx_antenna_delay: u64,
        tx_buffer: Option<alloc::vec::Vec<u8>>,
        tx_frame_len: Option<usize>,
        delayed_tx_time: Option<u64>,
        tx_starts: u32,
        fail_start: bool,
    }

    impl MockRadio {
        fn new(address: u16) -> Self {
            MockRadio {
                address,
                rx_timestamp: 0,
                tx_timestamp: 0,
                frame_control: FCTRL_IEEE_RANGE_16,
                frame_len: RangingFrame::LEN,
                lde_error: false,
                carrier_integrator: 0,
                tx_antenna_delay: 0,
                tx_buffer: None,
                tx_frame_len: None,
                delayed_tx_time: None,
                tx_starts: 0,
                fail_start: false,
            }
        }

        fn transmitted_frame(&self) -> RangingFrame {
            let buf = self.tx_buffer.as_ref().expect("nothing transmitted");
            RangingFrame::decode(buf).expect("invalid frame in tx buffer")
        }
    }

    impl Transceiver for MockRadio {
        fn short_address(&self) -> mac::ShortAddress {
            mac::ShortAddress(self.address)
        }

        fn rx_timestamp(&self) -> Instant {
            Instant::new(self.rx_timestamp).unwrap()
        }

        fn tx_timestamp(&self) -> Instant {
            Instant::new(self.tx_timestamp).unwrap()
        }

        fn rx_frame_control(&self) -> u16 {
            self.frame_control
        }

        fn rx_frame_len(&self) -> usize {
            self.frame_len
        }

        fn rx_quality(&self) -> RxQuality {
            RxQuality {
                lde_error: self.lde_error,
            }
        }

        fn carrier_integrator(&self) -> i32 {
            self.carrier_integrator
        }

        fn tx_antenna_delay(&self) -> Duration {
            Duration::new(self.tx_antenna_delay).unwrap()
        }

        fn rx_antenna_delay(&self) -> Duration {
            Duration::new(0).unwrap()
        }

        fn write_tx_buffer(&mut self, data: &[u8], offset: usize) {
            assert_eq!(offset, 0);
            self.tx_buffer = Some(data.to_vec());
        }

        fn set_tx_frame_len(&mut self, len: usize) {
            self.tx_frame_len = Some(len);
        }

        fn set_delayed_tx_time(&mut self, time: Instant) {
            self.delayed_tx_time = Some(time.value());
        }

        fn start_tx(&mut self) -> Result<(), StartTxError> {
            self.tx_starts += 1;
            if self.fail_start {
                Err(StartTxError::DelayedSendTooLate)
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct ListenerLog {
        completions: u32,
        tx_errors: u32,
        last_frame: Option<RangingFrame>,
    }

    struct RecordingListener {
        log: Rc<RefCell<ListenerLog>>,
        outcome: Outcome,
    }

    impl RangingListener for RecordingListener {
        fn on_exchange_complete(&mut self, frame: &RangingFrame) -> Outcome {
            let mut log = self.log.borrow_mut();
            log.completions += 1;
            log.last_frame = Some(*frame);
            self.outcome
        }

        fn on_transmit_error(&mut self) -> Outcome {
            self.log.borrow_mut().tx_errors += 1;
            self.outcome
        }
    }

    struct ShiftScaler(u64);

    impl TimebaseScaler for ShiftScaler {
        fn to_reference(&self, local: Instant) -> Instant {
            local + Duration::new(self.0).unwrap()
        }
    }

    fn instance() -> SsTwrExtended {
        SsTwrExtended::new(
            RangingConfig::default(),
            ResponderProfile::new(
                Position {
                    x: 10.0,
                    y: 20.0,
                    z: 1.5,
                },
                PositionVariance::range_only(0.034),
            ),
        )
    }

    fn request_from(address: u16) -> RangingFrame {
        let mut frame = RangingFrame::empty();
        frame.src_address = address;
        frame.set_code(ExchangeCode::ExtendedRequest);
        frame
    }

    #[test]
    fn request_with_no_admitted_exchange_is_passed_through() {
        let mut twr = instance();
        let mut radio = MockRadio::new(0xb0b0);

        twr.stage_received(request_from(0xa1a1));

        assert_eq!(twr.on_rx_complete(&mut radio), Outcome::NotApplicable);
        assert_eq!(radio.tx_starts, 0);
        assert_eq!(twr.stats().snapshot(), Default::default());
    }

    #[test]
    fn foreign_frame_control_is_passed_through() {
        let mut twr = instance();
        let mut radio = MockRadio::new(0xb0b0);
        radio.frame_control = 0x8861;

        twr.guard().try_admit();
        twr.stage_received(request_from(0xa1a1));

        assert_eq!(twr.on_rx_complete(&mut radio), Outcome::NotApplicable);
        assert_eq!(radio.tx_starts, 0);
    }

    #[test]
    fn unrecognized_exchange_code_is_passed_through() {
        let mut twr = instance();
        let mut radio = MockRadio::new(0xb0b0);

        twr.guard().try_admit();
        let mut frame = RangingFrame::empty();
        frame.exchange_code = 0x99;
        twr.stage_received(frame);

        assert_eq!(twr.on_rx_complete(&mut radio), Outcome::NotApplicable);
        assert!(!twr.guard().is_available());
    }

    #[test]
    fn responder_builds_and_schedules_the_response() {
        let mut twr = instance();
        let mut radio = MockRadio::new(0xb0b0);
        radio.rx_timestamp = 0x00_1000_01ff;
        radio.tx_antenna_delay = 0x4321;
        radio.carrier_integrator = 777;

        twr.guard().try_admit();
        twr.stage_received(request_from(0xa1a1));

        assert!(twr.on_rx_complete(&mut radio).is_handled());
        assert_eq!(radio.tx_starts, 1);
        assert_eq!(radio.tx_frame_len, Some(RangingFrame::LEN));

        // The driver gets a trigger aligned to the scheduling
        // granularity: no bits below it survive.
        let raw_target = 0x00_1000_01ffu64 + (u64::from(twr.config().tx_holdoff_delay) << 16);
        let trigger = raw_target & !(TX_SCHEDULE_GRANULARITY - 1);
        assert_eq!(radio.delayed_tx_time, Some(trigger));
        assert_eq!(trigger % TX_SCHEDULE_GRANULARITY, 0);

        let sent = radio.transmitted_frame();
        assert_eq!(sent.code(), Some(ExchangeCode::ExtendedResponse));
        assert_eq!(sent.src_address, 0xb0b0);
        assert_eq!(sent.dst_address, 0xa1a1);
        assert_eq!(sent.request_timestamp, 0x1000_01ff);
        assert_eq!(sent.response_timestamp, (trigger + 0x4321) as u32);
        assert_eq!(sent.carrier_correction, -777);
        assert_eq!(sent.position.x, 10.0);
        assert_eq!(sent.variance.range, 0.034);
        assert_eq!(sent.variance.azimuth, crate::frame::VARIANCE_UNKNOWN);

        // Guard released on the success path: a reset now has nothing to
        // recover.
        assert!(twr.guard().is_available());
        assert_eq!(twr.on_reset(&mut radio), Outcome::NotApplicable);
        assert_eq!(twr.stats().snapshot().reset, 0);
    }

    #[test]
    fn responder_start_failure_releases_and_notifies() {
        let mut twr = instance();
        let log = Rc::new(RefCell::new(ListenerLog::default()));
        twr.add_listener(Box::new(RecordingListener {
            log: Rc::clone(&log),
            outcome: Outcome::Handled,
        }));

        let mut radio = MockRadio::new(0xb0b0);
        radio.fail_start = true;

        twr.guard().try_admit();
        twr.stage_received(request_from(0xa1a1));

        assert_eq!(twr.on_rx_complete(&mut radio), Outcome::Handled);
        assert_eq!(twr.stats().snapshot().tx_error, 1);
        assert!(twr.guard().is_available());
        assert_eq!(log.borrow().tx_errors, 1);
        assert_eq!(log.borrow().completions, 0);
    }

    #[test]
    fn initiator_finishes_the_exchange() {
        let mut twr = instance();
        let log = Rc::new(RefCell::new(ListenerLog::default()));
        // Two listeners, the first reporting Handled: both must still run.
        twr.add_listener(Box::new(RecordingListener {
            log: Rc::clone(&log),
            outcome: Outcome::Handled,
        }));
        twr.add_listener(Box::new(RecordingListener {
            log: Rc::clone(&log),
            outcome: Outcome::NotApplicable,
        }));

        let mut radio = MockRadio::new(0xa1a1);
        radio.tx_timestamp = 0x00_2000_0000;
        radio.rx_timestamp = 0x00_2099_0000;
        radio.carrier_integrator = -550;

        twr.guard().try_admit();
        let mut response = RangingFrame::empty();
        response.src_address = 0xb0b0;
        response.dst_address = 0xa1a1;
        response.set_code(ExchangeCode::ExtendedResponse);
        twr.stage_received(response);

        assert_eq!(twr.on_rx_complete(&mut radio), Outcome::Handled);
        assert_eq!(twr.stats().snapshot().complete, 1);
        assert!(twr.guard().is_available());
        assert_eq!(log.borrow().completions, 2);

        let finished = log.borrow().last_frame.unwrap();
        assert_eq!(finished.code(), Some(ExchangeCode::ExtendedFinal));
        assert_eq!(finished.src_address, 0xa1a1);
        assert_eq!(finished.dst_address, 0xb0b0);
        assert_eq!(finished.request_timestamp, 0x2000_0000);
        assert_eq!(finished.response_timestamp, 0x2099_0000);
        assert_eq!(finished.carrier_correction, -550);
        assert_eq!(twr.current_frame(), &finished);
    }

    #[test]
    fn malformed_response_is_absorbed_and_leaves_the_guard_busy() {
        let mut twr = instance();
        let log = Rc::new(RefCell::new(ListenerLog::default()));
        twr.add_listener(Box::new(RecordingListener {
            log: Rc::clone(&log),
            outcome: Outcome::Handled,
        }));

        let mut radio = MockRadio::new(0xa1a1);
        radio.frame_len = RangingFrame::LEN - 3;

        twr.guard().try_admit();
        let mut response = RangingFrame::empty();
        response.set_code(ExchangeCode::ExtendedResponse);
        twr.stage_received(response);

        assert_eq!(twr.on_rx_complete(&mut radio), Outcome::Handled);
        assert_eq!(twr.stats().snapshot().complete, 0);
        assert_eq!(log.borrow().completions, 0);
        assert!(!twr.guard().is_available());

        // The receive timeout eventually feeds the reset hook, which
        // recovers the slot and counts the occurrence.
        assert_eq!(twr.on_reset(&mut radio), Outcome::Handled);
        assert_eq!(twr.stats().snapshot().reset, 1);
        assert!(twr.guard().is_available());
    }

    #[test]
    fn lde_error_is_absorbed_like_a_malformed_response() {
        let mut twr = instance();
        let mut radio = MockRadio::new(0xa1a1);
        radio.lde_error = true;

        twr.guard().try_admit();
        let mut response = RangingFrame::empty();
        response.set_code(ExchangeCode::ExtendedResponse);
        twr.stage_received(response);

        assert_eq!(twr.on_rx_complete(&mut radio), Outcome::Handled);
        assert_eq!(twr.stats().snapshot().complete, 0);
        assert!(!twr.guard().is_available());
    }

    #[test]
    fn shared_timebase_zeroes_carrier_and_scales_timestamps() {
        let mut twr = instance().with_scaler(Box::new(ShiftScaler(0x100)));
        let mut radio = MockRadio::new(0xb0b0);
        radio.rx_timestamp = 0x00_1000_0000;
        radio.carrier_integrator = 777;

        twr.guard().try_admit();
        twr.stage_received(request_from(0xa1a1));
        twr.on_rx_complete(&mut radio);

        let sent = radio.transmitted_frame();
        assert_eq!(sent.carrier_correction, 0);
        assert_eq!(sent.request_timestamp, 0x1000_0100);
    }

    #[test]
    fn async_tx_error_hook_counts_and_notifies() {
        let mut twr = instance();
        let log = Rc::new(RefCell::new(ListenerLog::default()));
        twr.add_listener(Box::new(RecordingListener {
            log: Rc::clone(&log),
            outcome: Outcome::NotApplicable,
        }));
        let mut radio = MockRadio::new(0xb0b0);

        assert_eq!(twr.on_tx_start_error(&mut radio), Outcome::Handled);
        assert_eq!(twr.stats().snapshot().tx_error, 1);
        assert_eq!(log.borrow().tx_errors, 1);
    }
}
