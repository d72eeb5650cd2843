#![allow(dead_code)]

use core::time::Duration;

use critical_section::CriticalSection;
use sequencer_core::config::SequencerConfig;
use sequencer_core::controller::Controller;
use sequencer_core::hal::{
    AnalogInput, DigitalOutputs, LowPower, OutputId, PinDirection, SignalSource, SleepMode,
    Watchdog,
};
use sequencer_core::registers::FRAME_LEN;
use sequencer_core::sequencer::PowerState;
use sequencer_core::shared::SharedState;
use sequencer_core::signals::SignalId;

/// Ticks needed for a level change to settle through the debounce window.
pub const SETTLE_TICKS: u32 = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WatchdogEvent {
    Arm(Duration),
    Disarm,
    Pet,
}

/// Simulated board recording every interaction.
pub struct MockBoard {
    shared: &'static SharedState,
    pub enable: bool,
    pub enable_ever_asserted: bool,
    pub shutdown_request: bool,
    pub aux_direction: PinDirection,
    pub aux_driven_low: bool,
    pub started: Vec<u8>,
    pub in_flight: Option<u8>,
    pub adc_powered: bool,
    pub watchdog: Vec<WatchdogEvent>,
    pub tick_enabled: bool,
    pub wake_source_enabled: bool,
    pub transport_enabled: bool,
    pub suspends: Vec<SleepMode>,
    /// Interrupts other than the wake source that end power-down suspends
    /// before the button edge arrives.
    pub spurious_wakes: u32,
    /// Fires the wake interrupt the moment the wake source is enabled.
    pub wake_on_enable: bool,
    /// `(tick, transport, adc powered)` observed at each power-down suspend.
    pub power_down_peripherals: Vec<(bool, bool, bool)>,
}

impl MockBoard {
    fn new(shared: &'static SharedState) -> Self {
        Self {
            shared,
            enable: false,
            enable_ever_asserted: false,
            shutdown_request: false,
            aux_direction: PinDirection::Input,
            aux_driven_low: false,
            started: Vec::new(),
            in_flight: None,
            adc_powered: true,
            watchdog: Vec::new(),
            tick_enabled: false,
            wake_source_enabled: false,
            transport_enabled: false,
            suspends: Vec::new(),
            spurious_wakes: 0,
            wake_on_enable: false,
            power_down_peripherals: Vec::new(),
        }
    }

    pub fn count_watchdog(&self, event: fn(&WatchdogEvent) -> bool) -> usize {
        self.watchdog.iter().filter(|entry| event(entry)).count()
    }

    pub fn power_down_suspends(&self) -> usize {
        self.suspends
            .iter()
            .filter(|mode| **mode == SleepMode::PowerDown)
            .count()
    }
}

impl DigitalOutputs for MockBoard {
    fn set(&mut self, id: OutputId, high: bool) {
        match id {
            OutputId::Enable => {
                self.enable = high;
                self.enable_ever_asserted |= high;
            }
            OutputId::ShutdownRequest => self.shutdown_request = high,
        }
    }

    fn set_aux_direction(&mut self, direction: PinDirection) {
        self.aux_direction = direction;
    }

    fn set_aux_level(&mut self, high: bool) {
        self.aux_driven_low = !high;
    }

    fn aux_level(&mut self) -> bool {
        // Open drain with an external pull-up.
        !(self.aux_direction == PinDirection::Output && self.aux_driven_low)
    }
}

impl AnalogInput for MockBoard {
    fn start_conversion(&mut self, channel: u8) {
        self.started.push(channel);
        self.in_flight = Some(channel);
    }

    fn power_down(&mut self) {
        self.adc_powered = false;
        self.in_flight = None;
    }

    fn power_up(&mut self) {
        self.adc_powered = true;
    }
}

impl Watchdog for MockBoard {
    fn arm(&mut self, timeout: Duration) {
        self.watchdog.push(WatchdogEvent::Arm(timeout));
    }

    fn disarm(&mut self) {
        self.watchdog.push(WatchdogEvent::Disarm);
    }

    fn pet(&mut self) {
        self.watchdog.push(WatchdogEvent::Pet);
    }
}

impl LowPower for MockBoard {
    fn set_tick_enabled(&mut self, enabled: bool) {
        self.tick_enabled = enabled;
    }

    fn set_wake_source_enabled(&mut self, enabled: bool) {
        self.wake_source_enabled = enabled;
        if enabled && self.wake_on_enable {
            self.shared.on_wake();
        }
    }

    fn set_transport_enabled(&mut self, enabled: bool) {
        self.transport_enabled = enabled;
    }

    fn suspend(&mut self, mode: SleepMode, _: CriticalSection<'_>) {
        self.suspends.push(mode);
        // Light sleeps end on the next tick, which the bench delivers.
        if mode != SleepMode::PowerDown {
            return;
        }
        self.power_down_peripherals.push((
            self.tick_enabled,
            self.transport_enabled,
            self.adc_powered,
        ));
        if self.spurious_wakes > 0 {
            self.spurious_wakes -= 1;
        } else {
            assert!(self.wake_source_enabled, "power-down without a wake source");
            self.shared.on_wake();
        }
    }
}

struct Levels {
    button: bool,
    host: bool,
}

impl SignalSource for Levels {
    fn read(&mut self, id: SignalId) -> bool {
        match id {
            SignalId::Button => self.button,
            SignalId::HostRunning => self.host,
        }
    }
}

/// Drives a controller tick by tick against a [`MockBoard`].
pub struct Bench {
    pub controller: Controller<'static, MockBoard>,
    levels: Levels,
}

impl Bench {
    pub fn new() -> Self {
        Self::with_config(&SequencerConfig::new())
    }

    pub fn with_config(config: &SequencerConfig) -> Self {
        let shared: &'static SharedState = Box::leak(Box::new(SharedState::new()));
        let mut controller =
            Controller::new(shared, MockBoard::new(shared), config).expect("valid config");
        controller.start();
        Self {
            controller,
            levels: Levels {
                button: false,
                host: false,
            },
        }
    }

    /// Boots into `Wait`.
    pub fn booted() -> Self {
        let mut bench = Self::new();
        bench.poll();
        bench.poll();
        assert_eq!(bench.state(), PowerState::Wait);
        bench
    }

    pub fn shared(&self) -> &'static SharedState {
        self.controller.shared()
    }

    pub fn board(&self) -> &MockBoard {
        self.controller.board()
    }

    pub fn board_mut(&mut self) -> &mut MockBoard {
        self.controller.board_mut()
    }

    pub fn state(&self) -> PowerState {
        self.controller.state().expect("state decodes")
    }

    pub fn poll(&mut self) -> PowerState {
        let state = self.controller.poll_once().state;
        // Conversions complete before the next iteration.
        if let Some(channel) = self.board_mut().in_flight.take() {
            self.shared().on_conversion_complete(sample_for(channel));
        }
        state
    }

    /// Delivers `count` ticks, one loop iteration after each.
    pub fn run_ticks(&mut self, count: u32) {
        for _ in 0..count {
            if self.board().tick_enabled {
                let shared = self.shared();
                shared.on_tick(&mut self.levels);
            }
            self.poll();
        }
    }

    pub fn set_button(&mut self, pressed: bool) {
        self.levels.button = pressed;
    }

    pub fn set_host(&mut self, running: bool) {
        self.levels.host = running;
    }

    /// Holds the button for `ticks`, then releases it and lets it settle.
    pub fn press(&mut self, ticks: u32) {
        self.set_button(true);
        self.run_ticks(ticks);
        self.set_button(false);
        self.run_ticks(SETTLE_TICKS + 2);
    }

    /// Changes the host-running level and lets it settle.
    pub fn host(&mut self, running: bool) {
        self.set_host(running);
        self.run_ticks(SETTLE_TICKS + 2);
    }

    /// Performs one register transaction and returns the bytes shifted out.
    pub fn xfer(&mut self, frame: [u8; FRAME_LEN]) -> [u8; FRAME_LEN] {
        let mut reply = [0; FRAME_LEN];
        if !self.board().transport_enabled {
            return reply;
        }
        let shared = self.shared();
        let mut queued = 0;
        for (slot, byte) in reply.iter_mut().zip(frame) {
            *slot = queued;
            queued = shared.on_byte_exchanged(byte, true);
        }
        shared.on_deselect();
        reply
    }

    /// Every state entered since boot, in order.
    pub fn visited(&self) -> Vec<PowerState> {
        self.controller
            .log()
            .oldest_first()
            .map(|record| record.to)
            .collect()
    }
}

/// Deterministic conversion result for `channel`.
pub fn sample_for(channel: u8) -> u16 {
    0x0100 * u16::from(channel) + 0x2A
}
