//! Round-robin scanner over the host-requested analog channels.
//!
//! Only one conversion is ever in flight. The scanner starts it, the
//! conversion-complete interrupt parks the raw value in shared state, and the
//! next [`AdcScanner::poll`] files it and moves on to the next requested
//! channel in ascending cyclic order.

use crate::hal::AnalogInput;
use crate::shared::{CHANNEL_COUNT, SharedState};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcScanner {
    active: Option<u8>,
    suspended: bool,
}

impl AdcScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: None,
            suspended: false,
        }
    }

    /// Channel whose conversion is currently in flight.
    #[must_use]
    pub const fn active(&self) -> Option<u8> {
        self.active
    }

    /// Gives the scanner one chance to react; called once per loop iteration.
    pub fn poll<A: AnalogInput + ?Sized>(&mut self, shared: &SharedState, adc: &mut A) {
        let mask = shared.channel_mask();
        for channel in channels() {
            if !is_requested(mask, channel) {
                shared.store_result(channel, 0);
            }
        }

        if self.suspended {
            return;
        }

        if let Some(value) = shared.take_conversion() {
            if let Some(channel) = self.active
                && is_requested(mask, channel)
            {
                shared.store_result(channel, value);
            }
            self.active = next_channel(mask, self.active);
            if let Some(channel) = self.active {
                adc.start_conversion(channel);
            }
        }

        if self.active.is_none()
            && let Some(channel) = next_channel(mask, None)
        {
            self.active = Some(channel);
            adc.start_conversion(channel);
        }
    }

    /// Drops any in-flight conversion and powers the converter down.
    pub fn suspend<A: AnalogInput + ?Sized>(&mut self, shared: &SharedState, adc: &mut A) {
        self.active = None;
        self.suspended = true;
        let _ = shared.take_conversion();
        adc.power_down();
    }

    /// Powers the converter back up; scanning restarts from idle on the next poll.
    pub fn resume<A: AnalogInput + ?Sized>(&mut self, adc: &mut A) {
        adc.power_up();
        self.suspended = false;
    }
}

fn channels() -> impl Iterator<Item = u8> {
    (0..CHANNEL_COUNT).filter_map(|channel| u8::try_from(channel).ok())
}

const fn is_requested(mask: u8, channel: u8) -> bool {
    mask & (1 << channel) != 0
}

/// Next requested channel strictly after `after`, wrapping; from idle the
/// lowest requested channel.
fn next_channel(mask: u8, after: Option<u8>) -> Option<u8> {
    if mask == 0 {
        return None;
    }
    let start = after.map_or(0, |channel| channel + 1);
    channels()
        .map(|offset| (start + offset) % 8)
        .find(|&channel| is_requested(mask, channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingAdc {
        started: heapless::Vec<u8, 32>,
        powered: bool,
    }

    impl AnalogInput for RecordingAdc {
        fn start_conversion(&mut self, channel: u8) {
            self.started.push(channel).ok();
        }

        fn power_down(&mut self) {
            self.powered = false;
        }

        fn power_up(&mut self) {
            self.powered = true;
        }
    }

    #[test]
    fn next_channel_wraps_in_ascending_order() {
        let mask = 0b0001_0101;
        assert_eq!(next_channel(mask, None), Some(0));
        assert_eq!(next_channel(mask, Some(0)), Some(2));
        assert_eq!(next_channel(mask, Some(2)), Some(4));
        assert_eq!(next_channel(mask, Some(4)), Some(0));
        assert_eq!(next_channel(0b1000_0000, Some(7)), Some(7));
        assert_eq!(next_channel(0, Some(3)), None);
    }

    #[test]
    fn idle_scanner_starts_lowest_requested_channel() {
        let shared = SharedState::new();
        let mut scanner = AdcScanner::new();
        let mut adc = RecordingAdc::default();

        scanner.poll(&shared, &mut adc);
        assert!(adc.started.is_empty());

        shared.set_channel_mask(0b0000_1100);
        scanner.poll(&shared, &mut adc);
        assert_eq!(adc.started.as_slice(), &[2]);

        // Nothing completes, nothing else starts.
        scanner.poll(&shared, &mut adc);
        assert_eq!(adc.started.as_slice(), &[2]);
    }

    #[test]
    fn completion_files_result_and_advances() {
        let shared = SharedState::new();
        let mut scanner = AdcScanner::new();
        let mut adc = RecordingAdc::default();
        shared.set_channel_mask(0b0000_0101);

        scanner.poll(&shared, &mut adc);
        shared.on_conversion_complete(100);
        scanner.poll(&shared, &mut adc);
        shared.on_conversion_complete(200);
        scanner.poll(&shared, &mut adc);

        assert_eq!(adc.started.as_slice(), &[0, 2, 0]);
        assert_eq!(shared.result(0), 100);
        assert_eq!(shared.result(2), 200);
    }

    #[test]
    fn dropped_channel_discards_late_result_and_zeroes_slot() {
        let shared = SharedState::new();
        let mut scanner = AdcScanner::new();
        let mut adc = RecordingAdc::default();
        shared.set_channel_mask(0b0000_0011);
        shared.store_result(1, 77);

        scanner.poll(&shared, &mut adc);
        shared.set_channel_mask(0b0000_0010);
        shared.on_conversion_complete(55);
        scanner.poll(&shared, &mut adc);

        assert_eq!(shared.result(0), 0);
        assert_eq!(shared.result(1), 77);
        assert_eq!(scanner.active(), Some(1));
    }

    #[test]
    fn emptied_mask_stops_scanning() {
        let shared = SharedState::new();
        let mut scanner = AdcScanner::new();
        let mut adc = RecordingAdc::default();
        shared.set_channel_mask(0b0000_0001);

        scanner.poll(&shared, &mut adc);
        shared.set_channel_mask(0);
        shared.on_conversion_complete(9);
        scanner.poll(&shared, &mut adc);

        assert_eq!(scanner.active(), None);
        assert_eq!(shared.result(0), 0);
        assert_eq!(adc.started.as_slice(), &[0]);
    }

    #[test]
    fn suspend_drops_in_flight_conversion() {
        let shared = SharedState::new();
        let mut scanner = AdcScanner::new();
        let mut adc = RecordingAdc::default();
        shared.set_channel_mask(0b0000_0001);

        scanner.poll(&shared, &mut adc);
        shared.on_conversion_complete(123);
        scanner.suspend(&shared, &mut adc);
        scanner.poll(&shared, &mut adc);
        assert_eq!(shared.result(0), 0);
        assert_eq!(adc.started.as_slice(), &[0]);
        assert!(!adc.powered);

        scanner.resume(&mut adc);
        scanner.poll(&shared, &mut adc);
        assert!(adc.powered);
        assert_eq!(adc.started.as_slice(), &[0, 0]);
    }
}
