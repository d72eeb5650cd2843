mod common;

use common::{Bench, WatchdogEvent};
use sequencer_core::config::SequencerConfig;
use sequencer_core::sequencer::PowerState;
use sequencer_core::sleep::SleepOutcome;

/// Runs from boot through exactly one wake-timeout power-down cycle.
fn one_power_down(bench: &mut Bench) {
    let wake_ticks = u32::from(SequencerConfig::new().thresholds().wake_ticks);
    bench.run_ticks(wake_ticks + 3);
    assert_eq!(bench.controller.log().power_downs(), 1);
    assert_eq!(bench.state(), PowerState::Wait);
}

#[test]
fn wake_already_pending_skips_the_suspend() {
    let mut bench = Bench::booted();
    // The wake interrupt lands after the top-of-loop clear, as soon as the
    // source is enabled and before the guarded check.
    bench.board_mut().wake_on_enable = true;

    one_power_down(&mut bench);

    assert_eq!(
        bench.controller.log().last_sleep(),
        Some(SleepOutcome::Skipped)
    );
    assert_eq!(bench.board().power_down_suspends(), 0);
    assert!(!bench.shared().wake_pending());
}

#[test]
fn spurious_interrupts_re_enter_the_guard() {
    let mut bench = Bench::booted();
    bench.board_mut().spurious_wakes = 3;

    one_power_down(&mut bench);

    assert_eq!(
        bench.controller.log().last_sleep(),
        Some(SleepOutcome::Woken { suspends: 4 })
    );
    assert_eq!(bench.board().power_down_suspends(), 4);
}

#[test]
fn peripherals_are_quiesced_while_suspended() {
    let mut bench = Bench::booted();
    bench.xfer([0x01, 0b0000_0001, 0]);
    bench.board_mut().spurious_wakes = 1;

    one_power_down(&mut bench);

    assert_eq!(
        bench.board().power_down_peripherals,
        [(false, false, false), (false, false, false)]
    );
    assert!(bench.board().tick_enabled);
    assert!(bench.board().transport_enabled);
    assert!(bench.board().adc_powered);
    assert!(!bench.board().wake_source_enabled);
}

#[test]
fn supervisor_is_disarmed_and_rearmed_once_per_cycle() {
    let mut bench = Bench::booted();
    one_power_down(&mut bench);

    let board = bench.board();
    assert_eq!(
        board.count_watchdog(|event| *event == WatchdogEvent::Disarm),
        1
    );
    let arms: Vec<usize> = board
        .watchdog
        .iter()
        .enumerate()
        .filter(|(_, event)| matches!(event, WatchdogEvent::Arm(_)))
        .map(|(index, _)| index)
        .collect();
    let disarm = board
        .watchdog
        .iter()
        .position(|event| *event == WatchdogEvent::Disarm)
        .expect("disarmed for the power-down");

    // Armed at start, re-armed right after the guarded sleep.
    assert_eq!(arms.len(), 2);
    assert_eq!(arms[0], 0);
    assert_eq!(arms[1], disarm + 1);
    assert_eq!(
        board.watchdog[0],
        WatchdogEvent::Arm(SequencerConfig::new().watchdog_timeout)
    );
}

#[test]
fn supervisor_is_petted_every_iteration() {
    let mut bench = Bench::booted();
    let before = bench.board().count_watchdog(|event| *event == WatchdogEvent::Pet);
    bench.run_ticks(20);
    let after = bench.board().count_watchdog(|event| *event == WatchdogEvent::Pet);
    assert_eq!(after - before, 20);
}

#[test]
fn wake_flag_is_cleared_at_the_top_of_each_iteration() {
    let mut bench = Bench::booted();
    bench.shared().on_wake();
    bench.run_ticks(1);
    assert!(!bench.shared().wake_pending());
    assert_eq!(bench.state(), PowerState::Wait);
}
