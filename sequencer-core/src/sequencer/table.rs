//! Release dispatch for the button state machine.

use super::PowerState;

/// How long the button was held before release.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HoldKind {
    Short,
    Long,
}

impl HoldKind {
    /// Classifies a hold of `held_ticks` against the long-press threshold.
    #[must_use]
    pub const fn classify(held_ticks: u16, threshold: u16) -> Self {
        if held_ticks < threshold {
            HoldKind::Short
        } else {
            HoldKind::Long
        }
    }
}

/// One row of the release table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReleaseRoute {
    pub previous: PowerState,
    pub long: PowerState,
    pub short: PowerState,
}

impl ReleaseRoute {
    const fn new(previous: PowerState, long: PowerState, short: PowerState) -> Self {
        Self {
            previous,
            long,
            short,
        }
    }

    #[must_use]
    pub const fn target(&self, hold: HoldKind) -> PowerState {
        match hold {
            HoldKind::Long => self.long,
            HoldKind::Short => self.short,
        }
    }
}

/// Where a release leads, keyed by the last steady state before the press.
pub const RELEASE_TABLE: [ReleaseRoute; 3] = [
    ReleaseRoute::new(
        PowerState::Wait,
        PowerState::SignaledOnEntry,
        PowerState::WaitEntry,
    ),
    ReleaseRoute::new(
        PowerState::SignaledOn,
        PowerState::McuOffEntry,
        PowerState::SignaledOnEntry,
    ),
    ReleaseRoute::new(
        PowerState::McuRunning,
        PowerState::SignaledOffEntry,
        PowerState::McuRunningEntry,
    ),
];

/// Looks up the release target; `None` when no row covers `previous`.
#[must_use]
pub fn release_target(previous: PowerState, hold: HoldKind) -> Option<PowerState> {
    RELEASE_TABLE
        .iter()
        .find(|route| route.previous == previous)
        .map(|route| route.target(hold))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_itself_counts_as_long() {
        assert_eq!(HoldKind::classify(12, 13), HoldKind::Short);
        assert_eq!(HoldKind::classify(13, 13), HoldKind::Long);
    }

    #[test]
    fn table_routes_every_pressable_state() {
        assert_eq!(
            release_target(PowerState::Wait, HoldKind::Short),
            Some(PowerState::WaitEntry)
        );
        assert_eq!(
            release_target(PowerState::Wait, HoldKind::Long),
            Some(PowerState::SignaledOnEntry)
        );
        assert_eq!(
            release_target(PowerState::SignaledOn, HoldKind::Short),
            Some(PowerState::SignaledOnEntry)
        );
        assert_eq!(
            release_target(PowerState::SignaledOn, HoldKind::Long),
            Some(PowerState::McuOffEntry)
        );
        assert_eq!(
            release_target(PowerState::McuRunning, HoldKind::Long),
            Some(PowerState::SignaledOffEntry)
        );
        assert_eq!(
            release_target(PowerState::McuRunning, HoldKind::Short),
            Some(PowerState::McuRunningEntry)
        );
    }

    #[test]
    fn unlisted_previous_state_has_no_route() {
        assert_eq!(release_target(PowerState::SignaledOff, HoldKind::Short), None);
        assert_eq!(release_target(PowerState::Idle, HoldKind::Long), None);
    }
}
