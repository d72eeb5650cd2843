//! Root power sequencing state machine.
//!
//! The sequencer owns the enable and shutdown-request outputs and decides when
//! the scanner, the register transport and the tick interrupt run. Its state
//! lives in [`SharedState`] as a raw [`StateMemo`] so that the register file
//! can report it from interrupt context; everything else is local to the loop.

mod state;
mod table;

use core::fmt;

pub use state::{PowerState, StateMemo};
pub use table::{HoldKind, RELEASE_TABLE, ReleaseRoute, release_target};

use crate::adc::AdcScanner;
use crate::config::Thresholds;
use crate::hal::{Board, OutputId};
use crate::shared::SharedState;
use crate::signals::SignalId;
use crate::sleep::SleepCoordinator;
use crate::telemetry::TransitionLog;
use crate::timers::TimerId;

/// Inconsistencies detected while stepping. Each is recovered by forcing
/// [`PowerState::Start`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerFault {
    /// The stored state byte does not name a state.
    UndecodableState(u8),
    /// A release happened with no table row for the previous stable state.
    MissingReleaseRoute,
}

impl fmt::Display for SequencerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerFault::UndecodableState(raw) => write!(f, "undecodable state 0x{raw:02x}"),
            SequencerFault::MissingReleaseRoute => f.write_str("no release route"),
        }
    }
}

/// Whether the next state is evaluated in the same poll iteration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flow {
    Continue,
    Yield,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Step {
    pub next: PowerState,
    pub flow: Flow,
}

/// Borrowed resources a step may drive.
pub struct StepContext<'a, B: ?Sized> {
    pub shared: &'a SharedState,
    pub board: &'a mut B,
    pub scanner: &'a mut AdcScanner,
    pub sleep: &'a mut SleepCoordinator,
}

pub struct PowerSequencer {
    thresholds: Thresholds,
    activity: bool,
    log: TransitionLog,
}

impl PowerSequencer {
    #[must_use]
    pub const fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            activity: false,
            log: TransitionLog::new(),
        }
    }

    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    #[must_use]
    pub const fn log(&self) -> &TransitionLog {
        &self.log
    }

    /// Records register traffic; consumed by the next step.
    pub fn note_activity(&mut self) {
        self.activity = true;
    }

    /// Current state, if the stored memo decodes.
    #[must_use]
    pub fn state(shared: &SharedState) -> Option<PowerState> {
        shared.state_memo().current()
    }

    /// Steps until a transition yields or the state holds.
    ///
    /// Returns the state the machine rests in for this iteration.
    pub fn advance<B: Board + ?Sized>(&mut self, ctx: &mut StepContext<'_, B>) -> PowerState {
        // Entry chains are short; the bound only guards a corrupted table.
        let mut step = self.step(ctx);
        for _ in 0..PowerState::ALL.len() {
            if step.flow == Flow::Yield {
                break;
            }
            step = self.step(ctx);
        }
        step.next
    }

    /// Evaluates the current state once.
    pub fn step<B: Board + ?Sized>(&mut self, ctx: &mut StepContext<'_, B>) -> Step {
        let activity = core::mem::take(&mut self.activity);
        let memo = ctx.shared.state_memo();
        let Some(current) = memo.current() else {
            return self.recover(ctx.shared, SequencerFault::UndecodableState(memo.current));
        };

        match self.evaluate(current, memo, activity, ctx) {
            Ok(next) if next == current => Step {
                next,
                flow: Flow::Yield,
            },
            Ok(next) => {
                ctx.shared.store_state_memo(memo.advance(current, next));
                self.log.record(ctx.shared.ticks(), current, next);
                Step {
                    next,
                    flow: if current.is_entry() {
                        Flow::Continue
                    } else {
                        Flow::Yield
                    },
                }
            }
            Err(fault) => self.recover(ctx.shared, fault),
        }
    }

    fn recover(&mut self, shared: &SharedState, fault: SequencerFault) -> Step {
        self.log.record_fault(fault);
        shared.store_state_memo(StateMemo::boot());
        Step {
            next: PowerState::Start,
            flow: Flow::Yield,
        }
    }

    #[allow(clippy::too_many_lines)]
    fn evaluate<B: Board + ?Sized>(
        &mut self,
        current: PowerState,
        memo: StateMemo,
        activity: bool,
        ctx: &mut StepContext<'_, B>,
    ) -> Result<PowerState, SequencerFault> {
        let shared = ctx.shared;
        let signals = shared.signals();
        let button = signals.is_asserted(SignalId::Button);

        let next = match current {
            PowerState::Start => {
                drive_outputs(ctx.board, false, false);
                shared.arm_timer(TimerId::Wakeup);
                PowerState::WaitEntry
            }
            PowerState::WaitEntry => {
                drive_outputs(ctx.board, false, false);
                PowerState::Wait
            }
            PowerState::Wait => {
                if button {
                    PowerState::ButtonPress
                } else if shared
                    .timer(TimerId::Wakeup)
                    .has_reached(self.thresholds.wake_ticks)
                {
                    PowerState::McuOffEntry
                } else {
                    PowerState::Wait
                }
            }
            PowerState::ButtonPress => {
                shared.arm_timer(TimerId::ButtonHold);
                PowerState::ButtonRelease
            }
            PowerState::ButtonRelease => {
                if signals.is_deasserted(SignalId::Button) {
                    let held = shared.timer(TimerId::ButtonHold).elapsed().unwrap_or(0);
                    shared.disarm_timer(TimerId::ButtonHold);
                    let hold = HoldKind::classify(held, self.thresholds.hold_ticks);
                    let previous = memo
                        .previous()
                        .ok_or(SequencerFault::UndecodableState(memo.previous))?;
                    release_target(previous, hold).ok_or(SequencerFault::MissingReleaseRoute)?
                } else {
                    PowerState::ButtonRelease
                }
            }
            PowerState::SignaledOnEntry => {
                shared.disarm_timer(TimerId::Wakeup);
                ctx.board.set(OutputId::Enable, true);
                PowerState::SignaledOn
            }
            PowerState::SignaledOn => {
                if button {
                    PowerState::ButtonPress
                } else if signals.is_asserted(SignalId::HostRunning) {
                    PowerState::McuRunningEntry
                } else {
                    PowerState::SignaledOn
                }
            }
            PowerState::McuRunningEntry => {
                if self.thresholds.idle_ticks.is_some() {
                    shared.arm_timer(TimerId::Idle);
                }
                PowerState::McuRunning
            }
            PowerState::McuRunning => {
                if button {
                    PowerState::ButtonPress
                } else if signals.is_deasserted(SignalId::HostRunning) {
                    PowerState::McuOffEntry
                } else {
                    self.running_dwell(shared, activity)
                }
            }
            PowerState::IdleEntry => {
                shared.disarm_timer(TimerId::Idle);
                PowerState::Idle
            }
            PowerState::Idle => {
                if button || !signals.is_asserted(SignalId::HostRunning) || activity {
                    PowerState::IdleExit
                } else {
                    PowerState::Idle
                }
            }
            PowerState::IdleExit => PowerState::McuRunningEntry,
            PowerState::SignaledOffEntry => {
                ctx.board.set(OutputId::ShutdownRequest, true);
                PowerState::SignaledOff
            }
            PowerState::SignaledOff => {
                if signals.is_deasserted(SignalId::HostRunning) {
                    PowerState::McuOffEntry
                } else {
                    PowerState::SignaledOff
                }
            }
            PowerState::McuOffEntry => {
                drive_outputs(ctx.board, false, false);
                PowerState::McuOff
            }
            PowerState::McuOff => PowerState::PowerDownEntry,
            PowerState::PowerDownEntry => {
                ctx.scanner.suspend(shared, &mut *ctx.board);
                ctx.board.set_transport_enabled(false);
                shared.reset_transaction();
                ctx.board.set_tick_enabled(false);
                ctx.board.set_wake_source_enabled(true);
                let outcome = ctx.sleep.enter_guarded_sleep(shared, &mut *ctx.board);
                self.log.record_sleep(outcome);
                PowerState::PowerDownExit
            }
            PowerState::PowerDownExit => {
                ctx.board.set_tick_enabled(true);
                ctx.scanner.resume(&mut *ctx.board);
                ctx.board.set_transport_enabled(true);
                shared.arm_timer(TimerId::Wakeup);
                PowerState::WaitEntry
            }
        };
        Ok(next)
    }

    /// Idle-dwell bookkeeping while the host runs.
    fn running_dwell(&self, shared: &SharedState, activity: bool) -> PowerState {
        let Some(limit) = self.thresholds.idle_ticks else {
            return PowerState::McuRunning;
        };
        if activity {
            shared.arm_timer(TimerId::Idle);
        }
        if shared.timer(TimerId::Idle).has_reached(limit) {
            PowerState::IdleEntry
        } else {
            PowerState::McuRunning
        }
    }
}

fn drive_outputs<B: Board + ?Sized>(board: &mut B, enable: bool, shutdown_request: bool) {
    board.set(OutputId::Enable, enable);
    board.set(OutputId::ShutdownRequest, shutdown_request);
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;
    use crate::config::SequencerConfig;
    use crate::hal::NoopBoard;

    fn thresholds() -> Thresholds {
        SequencerConfig::new()
            .with_hold_threshold(Duration::from_millis(40))
            .with_wake_timeout(Duration::from_millis(400))
            .thresholds()
    }

    struct Rig {
        shared: SharedState,
        board: NoopBoard,
        scanner: AdcScanner,
        sleep: SleepCoordinator,
        sequencer: PowerSequencer,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                shared: SharedState::new(),
                board: NoopBoard::new(),
                scanner: AdcScanner::new(),
                sleep: SleepCoordinator::new(Duration::from_millis(500)),
                sequencer: PowerSequencer::new(thresholds()),
            }
        }

        fn step(&mut self) -> Step {
            let mut ctx = StepContext {
                shared: &self.shared,
                board: &mut self.board,
                scanner: &mut self.scanner,
                sleep: &mut self.sleep,
            };
            self.sequencer.step(&mut ctx)
        }

        fn advance(&mut self) -> PowerState {
            let mut ctx = StepContext {
                shared: &self.shared,
                board: &mut self.board,
                scanner: &mut self.scanner,
                sleep: &mut self.sleep,
            };
            self.sequencer.advance(&mut ctx)
        }
    }

    #[test]
    fn boot_leaves_start_then_falls_through_wait_entry() {
        let mut rig = Rig::new();
        assert_eq!(
            rig.step(),
            Step {
                next: PowerState::WaitEntry,
                flow: Flow::Yield
            }
        );
        assert_eq!(
            rig.step(),
            Step {
                next: PowerState::Wait,
                flow: Flow::Continue
            }
        );
        assert_eq!(
            rig.step(),
            Step {
                next: PowerState::Wait,
                flow: Flow::Yield
            }
        );
        assert!(rig.shared.timer(TimerId::Wakeup).is_armed());
    }

    #[test]
    fn undecodable_state_recovers_to_start() {
        let mut rig = Rig::new();
        rig.shared.store_state_memo(StateMemo {
            current: 0x7E,
            previous: PowerState::Wait.code(),
        });

        assert_eq!(rig.step().next, PowerState::Start);
        assert_eq!(rig.shared.state_memo(), StateMemo::boot());
        assert_eq!(
            rig.sequencer.log().last_fault(),
            Some(SequencerFault::UndecodableState(0x7E))
        );
        assert_eq!(rig.advance(), PowerState::WaitEntry);
    }

    #[test]
    fn release_without_route_recovers_to_start() {
        let mut rig = Rig::new();
        rig.shared.store_state_memo(StateMemo {
            current: PowerState::ButtonRelease.code(),
            previous: PowerState::SignaledOff.code(),
        });

        assert_eq!(rig.step().next, PowerState::Start);
        assert_eq!(rig.sequencer.log().faults(), 1);
        assert_eq!(
            rig.sequencer.log().last_fault(),
            Some(SequencerFault::MissingReleaseRoute)
        );
    }

    #[test]
    fn wake_timeout_powers_down_from_wait() {
        let mut rig = Rig::new();
        assert_eq!(rig.advance(), PowerState::WaitEntry);
        assert_eq!(rig.advance(), PowerState::Wait);

        for _ in 0..thresholds().wake_ticks {
            rig.shared.on_tick(&mut NoopBoard::new());
        }
        assert_eq!(rig.advance(), PowerState::McuOffEntry);
        // McuOffEntry falls through McuOff, which yields into the power-down.
        assert_eq!(rig.advance(), PowerState::PowerDownEntry);
        assert_eq!(
            rig.shared.state_memo().previous(),
            Some(PowerState::McuOff)
        );
    }

    #[test]
    fn transitions_are_logged_with_tick_stamps() {
        let mut rig = Rig::new();
        rig.shared.on_tick(&mut NoopBoard::new());
        rig.advance();
        rig.advance();

        let latest = rig.sequencer.log().latest().copied();
        assert_eq!(
            latest,
            Some(crate::telemetry::TransitionRecord {
                at_tick: 1,
                from: PowerState::WaitEntry,
                to: PowerState::Wait,
            })
        );
        assert_eq!(rig.sequencer.log().total(), 2);
    }
}
