//! Low-power entry and the independent watchdog.
//!
//! The IWDG cannot be stopped once started. Boards ship with the `IWDG_STOP`
//! option bit cleared, which freezes its counter in Stop mode, so "disarming"
//! for a power-down only needs a final refresh before the suspend.

use core::time::Duration;

use cortex_m::peripheral::SCB;
use embassy_stm32::Peri;
use embassy_stm32::pac;
use embassy_stm32::peripherals::IWDG;
use embassy_stm32::wdg::IndependentWatchdog;
use sequencer_core::hal::SleepMode;

/// Owner of the IWDG; the counter starts on the first `arm`.
pub struct Supervisor {
    peripheral: Option<Peri<'static, IWDG>>,
    watchdog: Option<IndependentWatchdog<'static, IWDG>>,
    frozen: bool,
}

impl Supervisor {
    #[must_use]
    pub fn new(peripheral: Peri<'static, IWDG>) -> Self {
        Self {
            peripheral: Some(peripheral),
            watchdog: None,
            frozen: false,
        }
    }

    pub fn arm(&mut self, timeout: Duration) {
        self.frozen = false;
        if let Some(watchdog) = self.watchdog.as_mut() {
            watchdog.pet();
            return;
        }
        let Some(peripheral) = self.peripheral.take() else {
            return;
        };
        let timeout_us = u32::try_from(timeout.as_micros()).unwrap_or(u32::MAX);
        let mut watchdog = IndependentWatchdog::new(peripheral, timeout_us);
        watchdog.unleash();
        defmt::info!("IWDG armed: timeout={=u32}us", timeout_us);
        self.watchdog = Some(watchdog);
    }

    pub fn disarm(&mut self) {
        if let Some(watchdog) = self.watchdog.as_mut() {
            watchdog.pet();
        }
        self.frozen = true;
    }

    pub fn pet(&mut self) {
        if self.frozen {
            return;
        }
        if let Some(watchdog) = self.watchdog.as_mut() {
            watchdog.pet();
        }
    }
}

/// Selects Stop 1 as the deep-sleep target.
pub fn configure() {
    pac::RCC.apbenr1().modify(|w| w.set_pwren(true));
    pac::PWR
        .cr1()
        .modify(|w| w.set_lpms(pac::pwr::vals::Lpms::STOP1));
}

/// Waits for an interrupt with PRIMASK set, then lets the handler run.
///
/// A handler already pending when `wfi` executes ends the wait at once, so
/// the caller's check-then-suspend cannot miss an event.
pub fn suspend(scb: &mut SCB, mode: SleepMode) {
    let deep = mode == SleepMode::PowerDown;
    if deep {
        scb.set_sleepdeep();
    }

    cortex_m::asm::dsb();
    cortex_m::asm::wfi();

    if deep {
        scb.clear_sleepdeep();
    }

    // SAFETY: the caller holds a critical section; it is re-established
    // before returning.
    unsafe { cortex_m::interrupt::enable() };
    cortex_m::asm::isb();
    cortex_m::interrupt::disable();
}
