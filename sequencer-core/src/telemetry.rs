//! Transition history and fault accounting for the power sequencer.
//!
//! Records are timestamped with the free-running tick counter rather than a
//! wall clock so the same ring works on the MCU and in the emulator. Firmware
//! mirrors each record to its log sink; the ring is what the emulator's `log`
//! command and the integration tests inspect.

use core::fmt;

use heapless::HistoryBuf;

use crate::sequencer::{PowerState, SequencerFault};
use crate::sleep::SleepOutcome;

/// Total number of transitions retained in memory.
pub const TRANSITION_RING_CAPACITY: usize = 64;

/// One state change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionRecord {
    pub at_tick: u32,
    pub from: PowerState,
    pub to: PowerState,
}

impl fmt::Display for TransitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>8}] {} -> {}", self.at_tick, self.from, self.to)
    }
}

/// Fixed-size history of transitions plus running counters.
pub struct TransitionLog<const CAPACITY: usize = TRANSITION_RING_CAPACITY> {
    ring: HistoryBuf<TransitionRecord, CAPACITY>,
    total: u32,
    faults: u32,
    last_fault: Option<SequencerFault>,
    power_downs: u32,
    last_sleep: Option<SleepOutcome>,
}

impl<const CAPACITY: usize> TransitionLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            total: 0,
            faults: 0,
            last_fault: None,
            power_downs: 0,
            last_sleep: None,
        }
    }

    pub fn record(&mut self, at_tick: u32, from: PowerState, to: PowerState) {
        self.ring.write(TransitionRecord { at_tick, from, to });
        self.total = self.total.wrapping_add(1);
    }

    pub fn record_fault(&mut self, fault: SequencerFault) {
        self.faults = self.faults.saturating_add(1);
        self.last_fault = Some(fault);
    }

    pub fn record_sleep(&mut self, outcome: SleepOutcome) {
        self.power_downs = self.power_downs.saturating_add(1);
        self.last_sleep = Some(outcome);
    }

    /// Retained transitions in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TransitionRecord> + '_ {
        self.ring.oldest_ordered()
    }

    /// Records written after the log had seen `seen_total` transitions.
    ///
    /// Records already evicted from the ring are skipped.
    pub fn since(&self, seen_total: u32) -> impl Iterator<Item = &TransitionRecord> + '_ {
        let fresh = usize::try_from(self.total.wrapping_sub(seen_total))
            .unwrap_or(usize::MAX)
            .min(self.ring.len());
        self.ring.oldest_ordered().skip(self.ring.len() - fresh)
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TransitionRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Transitions recorded since boot, including those evicted from the ring.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub const fn faults(&self) -> u32 {
        self.faults
    }

    #[must_use]
    pub const fn last_fault(&self) -> Option<SequencerFault> {
        self.last_fault
    }

    /// Completed guarded sleeps.
    #[must_use]
    pub const fn power_downs(&self) -> u32 {
        self.power_downs
    }

    #[must_use]
    pub const fn last_sleep(&self) -> Option<SleepOutcome> {
        self.last_sleep
    }
}

impl<const CAPACITY: usize> Default for TransitionLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
