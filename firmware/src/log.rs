#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Log sinks for the controller loop.
//!
//! On the MCU every line goes out over `defmt-rtt`; host builds print the same
//! text so the helpers can be exercised by unit tests.

use sequencer_core::config::{ConfigError, FirmwareIdentity, Thresholds};
use sequencer_core::sequencer::SequencerFault;
use sequencer_core::sleep::SleepOutcome;
use sequencer_core::telemetry::{TransitionLog, TransitionRecord};

/// Tracks how much of the transition log has already been emitted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LogMirror {
    transitions: u32,
    faults: u32,
    power_downs: u32,
}

impl LogMirror {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transitions: 0,
            faults: 0,
            power_downs: 0,
        }
    }

    /// Emits every record and counter change since the previous drain.
    ///
    /// Returns the number of transition lines written. Records that were
    /// overwritten in the ring before a drain are reported as a gap.
    pub fn drain(&mut self, log: &TransitionLog) -> usize {
        let behind = log.total().wrapping_sub(self.transitions);
        let mut written = 0;
        for record in log.since(self.transitions) {
            log_transition(record);
            written += 1;
        }
        let dropped = usize::try_from(behind)
            .unwrap_or(usize::MAX)
            .saturating_sub(written);
        if dropped > 0 {
            log_transitions_dropped(dropped);
        }
        self.transitions = log.total();

        if log.faults() != self.faults {
            if let Some(fault) = log.last_fault() {
                log_fault(fault, log.faults());
            }
            self.faults = log.faults();
        }

        if log.power_downs() != self.power_downs {
            if let Some(outcome) = log.last_sleep() {
                log_power_down(outcome, log.power_downs());
            }
            self.power_downs = log.power_downs();
        }

        written
    }
}

#[cfg(target_os = "none")]
fn log_transition(record: &TransitionRecord) {
    defmt::info!(
        "sequencer: {} -> {} tick={=u32}",
        record.from,
        record.to,
        record.at_tick
    );
}

#[cfg(not(target_os = "none"))]
fn log_transition(record: &TransitionRecord) {
    println!(
        "sequencer: {} -> {} tick={}",
        record.from, record.to, record.at_tick
    );
}

#[cfg(target_os = "none")]
fn log_transitions_dropped(count: usize) {
    defmt::warn!("sequencer: {=usize} transitions overwritten before logging", count);
}

#[cfg(not(target_os = "none"))]
fn log_transitions_dropped(count: usize) {
    println!("sequencer: {count} transitions overwritten before logging");
}

#[cfg(target_os = "none")]
fn log_fault(fault: SequencerFault, total: u32) {
    defmt::warn!("sequencer fault: {} (total {=u32})", fault, total);
}

#[cfg(not(target_os = "none"))]
fn log_fault(fault: SequencerFault, total: u32) {
    println!("sequencer fault: {fault} (total {total})");
}

#[cfg(target_os = "none")]
fn log_power_down(outcome: SleepOutcome, count: u32) {
    match outcome {
        SleepOutcome::Skipped => {
            defmt::info!("power-down #{=u32} skipped, wake already pending", count);
        }
        SleepOutcome::Woken { suspends } => defmt::info!(
            "power-down #{=u32} woke after {=u32} suspend(s)",
            count,
            suspends
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn log_power_down(outcome: SleepOutcome, count: u32) {
    match outcome {
        SleepOutcome::Skipped => {
            println!("power-down #{count} skipped, wake already pending");
        }
        SleepOutcome::Woken { suspends } => {
            println!("power-down #{count} woke after {suspends} suspend(s)");
        }
    }
}

#[cfg(target_os = "none")]
pub fn log_boot(identity: FirmwareIdentity, thresholds: Thresholds) {
    defmt::info!(
        "power-sequencer v{=u8}.{=u8} capability={=bool} hold={=u16} wake={=u16} ticks",
        identity.major,
        identity.minor,
        identity.capability,
        thresholds.hold_ticks,
        thresholds.wake_ticks
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_boot(identity: FirmwareIdentity, thresholds: Thresholds) {
    println!(
        "power-sequencer v{}.{} capability={} hold={} wake={} ticks",
        identity.major,
        identity.minor,
        identity.capability,
        thresholds.hold_ticks,
        thresholds.wake_ticks
    );
}

#[cfg(target_os = "none")]
pub fn log_config_rejected(error: ConfigError) {
    defmt::error!("sequencer configuration rejected: {}", error);
}

#[cfg(not(target_os = "none"))]
pub fn log_config_rejected(error: ConfigError) {
    println!("sequencer configuration rejected: {error}");
}
