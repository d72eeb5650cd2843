//! Real-time simulation of the controller against a software board.
//!
//! The controller runs on its own thread. Interrupt sources (the tick, input
//! edges, bus transfers) are messages on a channel; a handler runs when the
//! controller thread takes the message, either at the top of a loop iteration
//! or while it is suspended. A suspended thread blocks on the channel, so a
//! message queued before the suspend ends it at once.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use critical_section::CriticalSection;
use sequencer_core::config::{ConfigError, SequencerConfig};
use sequencer_core::controller::Controller;
use sequencer_core::hal::{
    AnalogInput, DigitalOutputs, LowPower, OutputId, PinDirection, SignalSource, SleepMode,
    Watchdog,
};
use sequencer_core::registers::FRAME_LEN;
use sequencer_core::sequencer::PowerState;
use sequencer_core::shared::{CHANNEL_COUNT, SharedState};
use sequencer_core::signals::{SignalId, SignalLevel};
use sequencer_core::sleep::SleepOutcome;
use sequencer_core::telemetry::TransitionRecord;

/// How long a transfer waits for the controller thread to answer.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(1);

/// Interrupt sources delivered to the controller thread.
pub enum Event {
    Tick,
    Button(bool),
    Host(bool),
    Analog { channel: u8, value: u16 },
    Transfer {
        frame: [u8; FRAME_LEN],
        reply: Sender<[u8; FRAME_LEN]>,
    },
    Shutdown,
}

/// Controller state published after every loop iteration.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub state: Option<PowerState>,
    pub previous: Option<PowerState>,
    pub ticks: u32,
    pub button: SignalLevel,
    pub host_running: SignalLevel,
    pub enable: bool,
    pub shutdown_request: bool,
    pub aux_driven_low: bool,
    pub channel_mask: u8,
    pub results: [u16; CHANNEL_COUNT],
    pub transactions: u32,
    pub power_downs: u32,
    pub last_sleep: Option<SleepOutcome>,
    pub faults: u32,
    pub watchdog_expirations: u32,
    pub transitions_total: u32,
    pub history: Vec<TransitionRecord>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: None,
            previous: None,
            ticks: 0,
            button: SignalLevel::Indeterminate,
            host_running: SignalLevel::Indeterminate,
            enable: false,
            shutdown_request: false,
            aux_driven_low: false,
            channel_mask: 0,
            results: [0; CHANNEL_COUNT],
            transactions: 0,
            power_downs: 0,
            last_sleep: None,
            faults: 0,
            watchdog_expirations: 0,
            transitions_total: 0,
            history: Vec::new(),
        }
    }
}

#[derive(Default)]
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

/// Software watchdog; counts missed deadlines instead of resetting.
struct SoftWatchdog {
    timeout: Option<Duration>,
    last_pet: Instant,
    expirations: u32,
}

impl SoftWatchdog {
    fn new() -> Self {
        Self {
            timeout: None,
            last_pet: Instant::now(),
            expirations: 0,
        }
    }

    fn refresh(&mut self) {
        if let Some(timeout) = self.timeout
            && self.last_pet.elapsed() > timeout
        {
            self.expirations = self.expirations.saturating_add(1);
        }
        self.last_pet = Instant::now();
    }
}

/// Board whose peripherals are plain fields.
pub struct SimBoard<'a> {
    shared: &'a SharedState,
    events: Receiver<Event>,
    levels: Levels,
    analog: [u16; CHANNEL_COUNT],
    converting: Option<u8>,
    adc_powered: bool,
    enable: bool,
    shutdown_request: bool,
    aux_direction: PinDirection,
    aux_driven_low: bool,
    watchdog: SoftWatchdog,
    tick_enabled: bool,
    wake_enabled: bool,
    transport_enabled: bool,
    halted: bool,
}

impl<'a> SimBoard<'a> {
    #[must_use]
    pub fn new(shared: &'a SharedState, events: Receiver<Event>) -> Self {
        Self {
            shared,
            events,
            levels: Levels::default(),
            analog: [0; CHANNEL_COUNT],
            converting: None,
            adc_powered: true,
            enable: false,
            shutdown_request: false,
            aux_direction: PinDirection::Input,
            aux_driven_low: false,
            watchdog: SoftWatchdog::new(),
            tick_enabled: false,
            wake_enabled: false,
            transport_enabled: false,
            halted: false,
        }
    }

    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Runs the handler for `event`; returns whether it ends a suspend.
    fn dispatch(&mut self, event: Event) -> bool {
        match event {
            Event::Tick => {
                // Conversions take less than one tick.
                self.complete_conversion();
                if self.tick_enabled {
                    self.shared.on_tick(&mut self.levels);
                }
                self.tick_enabled
            }
            Event::Button(pressed) => {
                let edge = pressed && !self.levels.button;
                self.levels.button = pressed;
                if edge && self.wake_enabled {
                    self.shared.on_wake();
                    return true;
                }
                false
            }
            Event::Host(running) => {
                self.levels.host = running;
                false
            }
            Event::Analog { channel, value } => {
                if let Some(slot) = self.analog.get_mut(usize::from(channel)) {
                    *slot = value;
                }
                false
            }
            Event::Transfer { frame, reply } => {
                let exchanged = if self.transport_enabled {
                    self.exchange(frame)
                } else {
                    [0; FRAME_LEN]
                };
                let _ = reply.send(exchanged);
                self.transport_enabled
            }
            Event::Shutdown => {
                self.halt();
                true
            }
        }
    }

    fn exchange(&mut self, frame: [u8; FRAME_LEN]) -> [u8; FRAME_LEN] {
        let mut reply = [0; FRAME_LEN];
        let mut queued = 0;
        for (slot, byte) in reply.iter_mut().zip(frame) {
            *slot = queued;
            queued = self.shared.on_byte_exchanged(byte, true);
        }
        self.shared.on_deselect();
        reply
    }

    fn complete_conversion(&mut self) {
        if let Some(channel) = self.converting.take()
            && self.adc_powered
        {
            self.shared
                .on_conversion_complete(self.analog[usize::from(channel)]);
        }
    }

    /// Takes every interrupt that arrived while the loop was running.
    fn service_pending(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(event);
        }
    }

    fn halt(&mut self) {
        self.halted = true;
        // Releases a guarded sleep waiting on the button.
        self.shared.on_wake();
    }
}

impl DigitalOutputs for SimBoard<'_> {
    fn set(&mut self, id: OutputId, high: bool) {
        match id {
            OutputId::Enable => self.enable = high,
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
        !(self.aux_direction == PinDirection::Output && self.aux_driven_low)
    }
}

impl AnalogInput for SimBoard<'_> {
    fn start_conversion(&mut self, channel: u8) {
        if self.adc_powered && usize::from(channel) < CHANNEL_COUNT {
            self.converting = Some(channel);
        }
    }

    fn power_down(&mut self) {
        self.adc_powered = false;
        self.converting = None;
    }

    fn power_up(&mut self) {
        self.adc_powered = true;
    }
}

impl Watchdog for SimBoard<'_> {
    fn arm(&mut self, timeout: Duration) {
        self.watchdog.timeout = Some(timeout);
        self.watchdog.last_pet = Instant::now();
    }

    fn disarm(&mut self) {
        self.watchdog.timeout = None;
    }

    fn pet(&mut self) {
        self.watchdog.refresh();
        self.service_pending();
    }
}

impl LowPower for SimBoard<'_> {
    fn set_tick_enabled(&mut self, enabled: bool) {
        self.tick_enabled = enabled;
    }

    fn set_wake_source_enabled(&mut self, enabled: bool) {
        self.wake_enabled = enabled;
        if enabled {
            self.service_pending();
        }
    }

    fn set_transport_enabled(&mut self, enabled: bool) {
        self.transport_enabled = enabled;
    }

    fn suspend(&mut self, _: SleepMode, _: CriticalSection<'_>) {
        loop {
            match self.events.recv() {
                Ok(event) => {
                    if self.dispatch(event) {
                        return;
                    }
                }
                Err(_) => {
                    self.halt();
                    return;
                }
            }
        }
    }
}

/// Handle to a running simulation; dropping it stops both threads.
pub struct Emulator {
    config: SequencerConfig,
    events: Sender<Event>,
    status: Arc<Mutex<Snapshot>>,
    transitions: Receiver<TransitionRecord>,
    controller: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl Emulator {
    /// Validates `config` and starts the controller and tick threads.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] reported by [`SequencerConfig::validate`].
    pub fn spawn(config: SequencerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (events, inbox) = mpsc::channel();
        let (notices, transitions) = mpsc::channel();
        let status = Arc::new(Mutex::new(Snapshot::default()));

        let controller = {
            let status = Arc::clone(&status);
            thread::spawn(move || run_controller(&config, inbox, &status, &notices))
        };
        let ticker = {
            let events = events.clone();
            let period = config.tick_period;
            thread::spawn(move || {
                while events.send(Event::Tick).is_ok() {
                    thread::sleep(period);
                }
            })
        };

        Ok(Self {
            config,
            events,
            status,
            transitions,
            controller: Some(controller),
            ticker: Some(ticker),
        })
    }

    pub fn set_button(&self, pressed: bool) {
        let _ = self.events.send(Event::Button(pressed));
    }

    pub fn set_host(&self, running: bool) {
        let _ = self.events.send(Event::Host(running));
    }

    pub fn set_analog(&self, channel: u8, value: u16) {
        let _ = self.events.send(Event::Analog { channel, value });
    }

    /// Holds the button for `hold`, releases it, and waits for it to settle.
    pub fn press(&self, hold: Duration) {
        self.set_button(true);
        thread::sleep(hold);
        self.set_button(false);
        self.settle();
    }

    /// Waits long enough for an input change to pass the debounce window.
    pub fn settle(&self) {
        thread::sleep(self.config.debounce_latency() + self.config.tick_period * 2);
    }

    /// Performs one register transaction; `None` if the controller stopped.
    #[must_use]
    pub fn transfer(&self, frame: [u8; FRAME_LEN]) -> Option<[u8; FRAME_LEN]> {
        let (reply, answer) = mpsc::channel();
        self.events.send(Event::Transfer { frame, reply }).ok()?;
        answer.recv_timeout(TRANSFER_TIMEOUT).ok()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Transitions recorded since the previous call.
    #[must_use]
    pub fn drain_transitions(&self) -> Vec<TransitionRecord> {
        self.transitions.try_iter().collect()
    }

    /// Polls the published state until `condition` holds or `timeout` passes.
    pub fn wait_for(&self, timeout: Duration, condition: impl Fn(&Snapshot) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(&self.snapshot()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.config.tick_period);
        }
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
        if let Some(controller) = self.controller.take() {
            let _ = controller.join();
        }
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
    }
}

fn run_controller(
    config: &SequencerConfig,
    inbox: Receiver<Event>,
    status: &Mutex<Snapshot>,
    notices: &Sender<TransitionRecord>,
) {
    let shared = SharedState::new();
    let board = SimBoard::new(&shared, inbox);
    let Ok(mut controller) = Controller::new(&shared, board, config) else {
        return;
    };

    controller.start();
    let mut seen = 0;
    while !controller.board().halted() {
        controller.poll_once();
        for record in controller.log().since(seen) {
            let _ = notices.send(*record);
        }
        seen = controller.log().total();
        publish(&controller, status);
    }
}

fn publish(controller: &Controller<'_, SimBoard<'_>>, status: &Mutex<Snapshot>) {
    let shared = controller.shared();
    let board = controller.board();
    let log = controller.log();
    let memo = shared.state_memo();
    let signals = shared.signals();

    let mut snapshot = status.lock().unwrap_or_else(PoisonError::into_inner);
    snapshot.state = memo.current();
    snapshot.previous = memo.previous();
    snapshot.ticks = shared.ticks();
    snapshot.button = signals.level(SignalId::Button);
    snapshot.host_running = signals.level(SignalId::HostRunning);
    snapshot.enable = board.enable;
    snapshot.shutdown_request = board.shutdown_request;
    snapshot.aux_driven_low =
        board.aux_direction == PinDirection::Output && board.aux_driven_low;
    snapshot.channel_mask = shared.channel_mask();
    for (channel, slot) in (0..).zip(snapshot.results.iter_mut()) {
        *slot = shared.result(channel);
    }
    snapshot.transactions = controller.registers().transactions();
    snapshot.power_downs = log.power_downs();
    snapshot.last_sleep = log.last_sleep();
    snapshot.faults = log.faults();
    snapshot.watchdog_expirations = board.watchdog.expirations;
    if snapshot.transitions_total != log.total() {
        snapshot.transitions_total = log.total();
        snapshot.history = log.oldest_first().copied().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequencer_core::config::{FIRMWARE_MAJOR, FIRMWARE_MINOR};
    use sequencer_core::registers::FIRMWARE_IDENTITY;

    fn fast_config() -> SequencerConfig {
        SequencerConfig::new()
            .with_tick_period(Duration::from_millis(1))
            .with_hold_threshold(Duration::from_millis(40))
            .with_wake_timeout(Duration::from_secs(30))
            .with_idle_timeout(None)
            .with_watchdog_timeout(Duration::from_secs(5))
    }

    #[test]
    fn rejects_an_invalid_configuration() {
        let config = fast_config().with_tick_period(Duration::ZERO);
        assert!(matches!(
            Emulator::spawn(config),
            Err(ConfigError::ZeroTickPeriod)
        ));
    }

    #[test]
    fn identity_is_readable_over_the_bus() {
        let emulator = Emulator::spawn(fast_config()).expect("valid config");
        assert_eq!(
            emulator.transfer([FIRMWARE_IDENTITY, 0, 0]),
            Some([0, FIRMWARE_MAJOR, FIRMWARE_MINOR])
        );
    }

    #[test]
    fn settles_in_wait_after_boot() {
        let emulator = Emulator::spawn(fast_config()).expect("valid config");
        assert!(emulator.wait_for(Duration::from_secs(2), |snapshot| {
            snapshot.state == Some(PowerState::Wait)
        }));
        assert!(!emulator.snapshot().enable);
    }

    #[test]
    fn long_press_powers_the_host() {
        let emulator = Emulator::spawn(fast_config()).expect("valid config");
        assert!(emulator.wait_for(Duration::from_secs(2), |snapshot| {
            snapshot.state == Some(PowerState::Wait)
        }));

        emulator.set_button(true);
        // Held here until the button is let go.
        assert!(emulator.wait_for(Duration::from_secs(2), |snapshot| {
            snapshot.state == Some(PowerState::ButtonRelease)
        }));
        // Comfortably past the hold threshold.
        thread::sleep(Duration::from_millis(200));
        emulator.set_button(false);

        assert!(emulator.wait_for(Duration::from_secs(2), |snapshot| {
            snapshot.state == Some(PowerState::SignaledOn) && snapshot.enable
        }));
        let visited: Vec<PowerState> = emulator
            .drain_transitions()
            .iter()
            .map(|record| record.to)
            .collect();
        assert!(visited.contains(&PowerState::ButtonPress));
        assert!(visited.contains(&PowerState::SignaledOnEntry));
    }
}
