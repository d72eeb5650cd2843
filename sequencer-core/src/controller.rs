//! The perpetual poll loop composing every component.

use crate::adc::AdcScanner;
use crate::config::{ConfigError, SequencerConfig};
use crate::hal::Board;
use crate::registers::RegisterEngine;
use crate::sequencer::{PowerSequencer, PowerState, StepContext};
use crate::shared::SharedState;
use crate::sleep::SleepCoordinator;
use crate::telemetry::TransitionLog;

/// Summary of one loop iteration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollOutcome {
    /// State the sequencer rests in after this iteration.
    pub state: PowerState,
    /// A register transaction completed since the previous iteration.
    pub transaction: bool,
    /// The iteration ended in a light sleep.
    pub slept: bool,
}

pub struct Controller<'a, B: Board> {
    shared: &'a SharedState,
    board: B,
    sequencer: PowerSequencer,
    scanner: AdcScanner,
    registers: RegisterEngine,
    sleep: SleepCoordinator,
}

impl<'a, B: Board> Controller<'a, B> {
    /// Validates `config` and binds the controller to its shared state and board.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] reported by [`SequencerConfig::validate`].
    pub fn new(
        shared: &'a SharedState,
        board: B,
        config: &SequencerConfig,
    ) -> Result<Self, ConfigError> {
        let thresholds = config.validate()?;
        shared.set_identity(config.identity);

        Ok(Self {
            shared,
            board,
            sequencer: PowerSequencer::new(thresholds),
            scanner: AdcScanner::new(),
            registers: RegisterEngine::new(),
            sleep: SleepCoordinator::new(config.watchdog_timeout),
        })
    }

    /// Enables the periodic interrupts and arms the supervisor.
    pub fn start(&mut self) {
        self.board.set_tick_enabled(true);
        self.board.set_transport_enabled(true);
        self.sleep.start(&mut self.board);
    }

    /// Runs one loop iteration.
    pub fn poll_once(&mut self) -> PollOutcome {
        self.sleep.pet(&mut self.board);
        self.shared.clear_wake();

        let state = {
            let mut ctx = StepContext {
                shared: self.shared,
                board: &mut self.board,
                scanner: &mut self.scanner,
                sleep: &mut self.sleep,
            };
            self.sequencer.advance(&mut ctx)
        };

        self.scanner.poll(self.shared, &mut self.board);
        let transaction = self.registers.poll(self.shared, &mut self.board);
        if transaction {
            self.sequencer.note_activity();
        }

        let slept = self
            .sleep
            .light_sleep(self.shared, &mut self.board, state.sleep_mode());

        PollOutcome {
            state,
            transaction,
            slept,
        }
    }

    /// Starts the controller and polls forever, calling `after_poll` once
    /// per iteration.
    pub fn run(mut self, mut after_poll: impl FnMut(&Self, PollOutcome)) -> ! {
        self.start();
        loop {
            let outcome = self.poll_once();
            after_poll(&self, outcome);
        }
    }

    /// Current sequencer state, if the stored memo decodes.
    #[must_use]
    pub fn state(&self) -> Option<PowerState> {
        PowerSequencer::state(self.shared)
    }

    #[must_use]
    pub fn log(&self) -> &TransitionLog {
        self.sequencer.log()
    }

    #[must_use]
    pub fn shared(&self) -> &'a SharedState {
        self.shared
    }

    #[must_use]
    pub fn scanner(&self) -> &AdcScanner {
        &self.scanner
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterEngine {
        &self.registers
    }

    #[must_use]
    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }
}
