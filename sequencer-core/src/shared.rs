//! State shared between interrupt handlers and the controller loop.
//!
//! Interrupt handlers reach the controller only through the `on_*` entry
//! points below. Each one samples, copies, or sets a flag and returns; all
//! decisions are made later by the loop. Single-writer fields are atomics,
//! and fields that are read-modify-written from both contexts live in
//! `critical_section::Mutex` cells.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use portable_atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, Ordering};

use crate::config::FirmwareIdentity;
use crate::hal::SignalSource;
use crate::registers::TransactionState;
use crate::sequencer::StateMemo;
use crate::signals::SignalBank;
use crate::timers::{TickTimer, TimerBank, TimerId};

/// Number of analog channels the scanner and register file expose.
pub const CHANNEL_COUNT: usize = 8;

pub struct SharedState {
    signals: Mutex<Cell<SignalBank>>,
    timers: Mutex<Cell<TimerBank>>,
    ticks: AtomicU32,
    wake_pending: AtomicBool,
    channel_mask: AtomicU8,
    results: [AtomicU16; CHANNEL_COUNT],
    conversion: Mutex<Cell<Option<u16>>>,
    transaction: Mutex<RefCell<TransactionState>>,
    toggle_pending: AtomicBool,
    transaction_done: AtomicBool,
    state: Mutex<Cell<StateMemo>>,
    identity: Mutex<Cell<FirmwareIdentity>>,
}

impl SharedState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            signals: Mutex::new(Cell::new(SignalBank::new())),
            timers: Mutex::new(Cell::new(TimerBank::new())),
            ticks: AtomicU32::new(0),
            wake_pending: AtomicBool::new(false),
            channel_mask: AtomicU8::new(0),
            results: [const { AtomicU16::new(0) }; CHANNEL_COUNT],
            conversion: Mutex::new(Cell::new(None)),
            transaction: Mutex::new(RefCell::new(TransactionState::new())),
            toggle_pending: AtomicBool::new(false),
            transaction_done: AtomicBool::new(false),
            state: Mutex::new(Cell::new(StateMemo::boot())),
            identity: Mutex::new(Cell::new(FirmwareIdentity::new(0, 0, false))),
        }
    }

    /// Sets the identity served over the register link.
    pub fn set_identity(&self, identity: FirmwareIdentity) {
        critical_section::with(|cs| self.identity.borrow(cs).set(identity));
    }

    #[must_use]
    pub fn identity(&self) -> FirmwareIdentity {
        critical_section::with(|cs| self.identity.borrow(cs).get())
    }

    // Interrupt entry points.

    /// Periodic tick: samples every input and advances armed timers.
    pub fn on_tick<S: SignalSource + ?Sized>(&self, source: &mut S) {
        critical_section::with(|cs| {
            let signals = self.signals.borrow(cs);
            let mut bank = signals.get();
            bank.tick(source);
            signals.set(bank);

            let timers = self.timers.borrow(cs);
            let mut timer_bank = timers.get();
            timer_bank.tick();
            timers.set(timer_bank);
        });
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Wake-source interrupt.
    pub fn on_wake(&self) {
        self.wake_pending.store(true, Ordering::Release);
    }

    /// Conversion-complete interrupt carrying the raw result.
    pub fn on_conversion_complete(&self, value: u16) {
        critical_section::with(|cs| self.conversion.borrow(cs).set(Some(value)));
    }

    /// Transfer-complete interrupt for one exchanged byte.
    ///
    /// Returns the byte to queue for the next exchange. Bytes seen while the
    /// bus master has not selected this device abandon any partial frame.
    #[must_use]
    pub fn on_byte_exchanged(&self, received: u8, selected: bool) -> u8 {
        critical_section::with(|cs| {
            let mut transaction = self.transaction.borrow_ref_mut(cs);
            if selected {
                transaction.on_byte(received, self)
            } else {
                transaction.reset();
                0
            }
        })
    }

    /// Chip-select released; abandons any partial frame.
    pub fn on_deselect(&self) {
        critical_section::with(|cs| self.transaction.borrow_ref_mut(cs).reset());
    }

    // Loop-side accessors.

    #[must_use]
    pub fn signals(&self) -> SignalBank {
        critical_section::with(|cs| self.signals.borrow(cs).get())
    }

    #[must_use]
    pub fn timer(&self, id: TimerId) -> TickTimer {
        critical_section::with(|cs| self.timers.borrow(cs).get().get(id))
    }

    pub fn arm_timer(&self, id: TimerId) {
        self.update_timer(id, TickTimer::arm);
    }

    pub fn disarm_timer(&self, id: TimerId) {
        self.update_timer(id, TickTimer::disarm);
    }

    fn update_timer(&self, id: TimerId, update: impl FnOnce(&mut TickTimer)) {
        critical_section::with(|cs| {
            let timers = self.timers.borrow(cs);
            let mut bank = timers.get();
            update(bank.get_mut(id));
            timers.set(bank);
        });
    }

    /// Ticks since boot, wrapping.
    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn wake_pending(&self) -> bool {
        self.wake_pending.load(Ordering::Acquire)
    }

    pub fn clear_wake(&self) {
        self.wake_pending.store(false, Ordering::Release);
    }

    /// Consumes the wake flag, returning whether it was set.
    #[must_use]
    pub fn take_wake(&self) -> bool {
        self.wake_pending.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn channel_mask(&self) -> u8 {
        self.channel_mask.load(Ordering::Acquire)
    }

    pub(crate) fn set_channel_mask(&self, mask: u8) {
        self.channel_mask.store(mask, Ordering::Release);
    }

    /// Latest result for `channel`; zero when the channel is not requested.
    #[must_use]
    pub fn result(&self, channel: u8) -> u16 {
        self.results
            .get(usize::from(channel))
            .map_or(0, |slot| slot.load(Ordering::Acquire))
    }

    pub(crate) fn store_result(&self, channel: u8, value: u16) {
        if let Some(slot) = self.results.get(usize::from(channel)) {
            slot.store(value, Ordering::Release);
        }
    }

    #[must_use]
    pub fn conversion_pending(&self) -> bool {
        critical_section::with(|cs| self.conversion.borrow(cs).get().is_some())
    }

    pub(crate) fn take_conversion(&self) -> Option<u16> {
        critical_section::with(|cs| self.conversion.borrow(cs).take())
    }

    pub(crate) fn request_toggle(&self) {
        self.toggle_pending.store(true, Ordering::Release);
    }

    pub(crate) fn take_toggle(&self) -> bool {
        self.toggle_pending.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn mark_transaction_done(&self) {
        self.transaction_done.store(true, Ordering::Release);
    }

    pub(crate) fn take_transaction_done(&self) -> bool {
        self.transaction_done.swap(false, Ordering::AcqRel)
    }

    /// Abandons any partial frame from the loop side.
    pub(crate) fn reset_transaction(&self) {
        self.on_deselect();
    }

    /// True while any event the loop must react to is outstanding.
    #[must_use]
    pub fn event_pending(&self) -> bool {
        self.wake_pending()
            || self.conversion_pending()
            || self.toggle_pending.load(Ordering::Acquire)
            || self.transaction_done.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn state_memo(&self) -> StateMemo {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }

    pub(crate) fn store_state_memo(&self, memo: StateMemo) {
        critical_section::with(|cs| self.state.borrow(cs).set(memo));
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalId;

    struct ButtonHeld;

    impl SignalSource for ButtonHeld {
        fn read(&mut self, id: SignalId) -> bool {
            id == SignalId::Button
        }
    }

    #[test]
    fn tick_samples_inputs_and_advances_armed_timers() {
        let shared = SharedState::new();
        shared.arm_timer(TimerId::ButtonHold);

        for _ in 0..8 {
            shared.on_tick(&mut ButtonHeld);
        }

        assert!(shared.signals().is_asserted(SignalId::Button));
        assert!(shared.signals().is_deasserted(SignalId::HostRunning));
        assert_eq!(shared.timer(TimerId::ButtonHold).elapsed(), Some(8));
        assert_eq!(shared.timer(TimerId::Wakeup).elapsed(), None);
        assert_eq!(shared.ticks(), 8);
    }

    #[test]
    fn wake_flag_is_consumed_once() {
        let shared = SharedState::new();
        assert!(!shared.take_wake());
        shared.on_wake();
        assert!(shared.event_pending());
        assert!(shared.take_wake());
        assert!(!shared.take_wake());
        assert!(!shared.event_pending());
    }

    #[test]
    fn conversion_result_is_held_until_taken() {
        let shared = SharedState::new();
        shared.on_conversion_complete(0x0123);
        assert!(shared.event_pending());
        assert_eq!(shared.take_conversion(), Some(0x0123));
        assert_eq!(shared.take_conversion(), None);
    }

    #[test]
    fn out_of_range_result_slots_read_zero() {
        let shared = SharedState::new();
        shared.store_result(9, 0xFFFF);
        assert_eq!(shared.result(9), 0);
    }
}
