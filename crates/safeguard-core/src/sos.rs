//! SOS countdown state machine
//!
//! Pure state: the controller drives it from its countdown and dispatch
//! tasks. Every operation that comes from a task names the cycle it belongs
//! to, so work from a cancelled or superseded cycle is ignored.

use chrono::{DateTime, Utc};
use safeguard_api::{AlertFailure, Coordinates, SosSnapshot, SosStatus};
use safeguard_util::{CycleId, SafeguardError};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SosState {
    #[default]
    Idle,
    CountingDown {
        cycle: CycleId,
        remaining: u32,
        started_at: DateTime<Utc>,
        location: Option<Coordinates>,
    },
    Dispatching {
        cycle: CycleId,
        started_at: DateTime<Utc>,
        location: Option<Coordinates>,
    },
    Active {
        cycle: CycleId,
        started_at: DateTime<Utc>,
        location: Option<Coordinates>,
        contacts_notified: u32,
    },
    Cancelled {
        cycle: CycleId,
        started_at: DateTime<Utc>,
        remaining: u32,
    },
    Failed {
        cycle: CycleId,
        started_at: DateTime<Utc>,
        location: Option<Coordinates>,
        failure: AlertFailure,
    },
}

/// Outcome of one countdown second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The cycle is no longer counting down
    Stale,
    Counting(u32),
    /// Countdown reached zero; the machine is now Dispatching
    Expired,
}

impl SosState {
    pub fn status(&self) -> SosStatus {
        match self {
            SosState::Idle => SosStatus::Idle,
            SosState::CountingDown { .. } => SosStatus::CountingDown,
            SosState::Dispatching { .. } => SosStatus::Dispatching,
            SosState::Active { .. } => SosStatus::Active,
            SosState::Cancelled { .. } => SosStatus::Cancelled,
            SosState::Failed { .. } => SosStatus::Failed,
        }
    }

    pub fn cycle(&self) -> Option<CycleId> {
        match self {
            SosState::Idle => None,
            SosState::CountingDown { cycle, .. }
            | SosState::Dispatching { cycle, .. }
            | SosState::Active { cycle, .. }
            | SosState::Cancelled { cycle, .. }
            | SosState::Failed { cycle, .. } => Some(*cycle),
        }
    }

    fn is_cycle(&self, cycle: CycleId) -> bool {
        self.cycle() == Some(cycle)
    }

    /// Start a new cycle. Rejected while a countdown or dispatch is running;
    /// allowed from Idle and from the display states.
    pub fn trigger(&mut self, countdown: u32, now: DateTime<Utc>) -> Result<CycleId, SafeguardError> {
        if matches!(
            self,
            SosState::CountingDown { .. } | SosState::Dispatching { .. }
        ) {
            return Err(SafeguardError::invalid_state("SOS already in progress"));
        }

        let cycle = CycleId::new();
        *self = SosState::CountingDown {
            cycle,
            remaining: countdown.max(1),
            started_at: now,
            location: None,
        };
        Ok(cycle)
    }

    pub fn tick(&mut self, cycle: CycleId) -> Tick {
        let SosState::CountingDown {
            cycle: current,
            remaining,
            started_at,
            location,
        } = *self
        else {
            return Tick::Stale;
        };
        if current != cycle {
            return Tick::Stale;
        }

        if remaining > 1 {
            *self = SosState::CountingDown {
                cycle,
                remaining: remaining - 1,
                started_at,
                location,
            };
            Tick::Counting(remaining - 1)
        } else {
            *self = SosState::Dispatching {
                cycle,
                started_at,
                location,
            };
            Tick::Expired
        }
    }

    /// Cancel a running countdown. Returns the cycle and the seconds that
    /// were left, or `None` when there was nothing to cancel.
    pub fn cancel(&mut self) -> Option<(CycleId, u32)> {
        match *self {
            SosState::CountingDown {
                cycle,
                remaining,
                started_at,
                ..
            } => {
                *self = SosState::Cancelled {
                    cycle,
                    started_at,
                    remaining,
                };
                Some((cycle, remaining))
            }
            _ => None,
        }
    }

    /// Attach a location to the cycle if none has been captured yet
    pub fn capture_location(&mut self, cycle: CycleId, coords: Coordinates) -> bool {
        match self {
            SosState::CountingDown {
                cycle: current,
                location,
                ..
            }
            | SosState::Dispatching {
                cycle: current,
                location,
                ..
            } if *current == cycle && location.is_none() => {
                *location = Some(coords);
                true
            }
            _ => false,
        }
    }

    /// Location to send with the alert for `cycle`
    pub fn dispatch_location(&self, cycle: CycleId) -> Option<Coordinates> {
        match self {
            SosState::Dispatching {
                cycle: current,
                location,
                ..
            } if *current == cycle => *location,
            _ => None,
        }
    }

    /// Record the dispatch outcome. Returns `false` if `cycle` is no longer
    /// dispatching.
    pub fn finish_dispatch(&mut self, cycle: CycleId, outcome: Result<u32, AlertFailure>) -> bool {
        let (started_at, location) = match *self {
            SosState::Dispatching {
                cycle: current,
                started_at,
                location,
            } if current == cycle => (started_at, location),
            _ => return false,
        };

        *self = match outcome {
            Ok(contacts_notified) => SosState::Active {
                cycle,
                started_at,
                location,
                contacts_notified,
            },
            Err(failure) => SosState::Failed {
                cycle,
                started_at,
                location,
                failure,
            },
        };
        true
    }

    /// Return to Idle at the end of a display window. Ignored if a new cycle
    /// has started since.
    pub fn reset(&mut self, cycle: CycleId) -> bool {
        let displaying = matches!(
            self,
            SosState::Active { .. } | SosState::Cancelled { .. } | SosState::Failed { .. }
        );
        if displaying && self.is_cycle(cycle) {
            *self = SosState::Idle;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> SosSnapshot {
        let mut snapshot = SosSnapshot {
            status: self.status(),
            cycle: self.cycle(),
            countdown_remaining: 0,
            location: None,
            started_at: None,
            contacts_notified: None,
            failure: None,
            message: None,
        };

        match self {
            SosState::Idle => {}
            SosState::CountingDown {
                remaining,
                started_at,
                location,
                ..
            } => {
                snapshot.countdown_remaining = *remaining;
                snapshot.started_at = Some(*started_at);
                snapshot.location = *location;
            }
            SosState::Dispatching {
                started_at,
                location,
                ..
            } => {
                snapshot.started_at = Some(*started_at);
                snapshot.location = *location;
                snapshot.message = Some("Sending alert...".into());
            }
            SosState::Active {
                started_at,
                location,
                contacts_notified,
                ..
            } => {
                snapshot.started_at = Some(*started_at);
                snapshot.location = *location;
                snapshot.contacts_notified = Some(*contacts_notified);
                snapshot.message = Some(format!(
                    "Alert sent to {} emergency contact{}",
                    contacts_notified,
                    if *contacts_notified == 1 { "" } else { "s" }
                ));
            }
            SosState::Cancelled {
                started_at,
                remaining,
                ..
            } => {
                snapshot.started_at = Some(*started_at);
                snapshot.countdown_remaining = *remaining;
                snapshot.message = Some("Alert cancelled".into());
            }
            SosState::Failed {
                started_at,
                location,
                failure,
                ..
            } => {
                snapshot.started_at = Some(*started_at);
                snapshot.location = *location;
                snapshot.failure = Some(*failure);
                snapshot.message = Some(failure.message().into());
            }
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        safeguard_util::now()
    }

    #[test]
    fn countdown_expires_after_n_ticks() {
        let mut state = SosState::Idle;
        let cycle = state.trigger(5, now()).unwrap();

        let ticks: Vec<Tick> = (0..5).map(|_| state.tick(cycle)).collect();
        assert_eq!(
            ticks,
            vec![
                Tick::Counting(4),
                Tick::Counting(3),
                Tick::Counting(2),
                Tick::Counting(1),
                Tick::Expired
            ]
        );
        assert_eq!(state.status(), SosStatus::Dispatching);

        // Further ticks are stale
        assert_eq!(state.tick(cycle), Tick::Stale);
    }

    #[test]
    fn trigger_rejected_while_running() {
        let mut state = SosState::Idle;
        let cycle = state.trigger(5, now()).unwrap();
        assert!(matches!(
            state.trigger(5, now()),
            Err(SafeguardError::InvalidState(_))
        ));

        for _ in 0..5 {
            state.tick(cycle);
        }
        assert!(state.trigger(5, now()).is_err());

        state.finish_dispatch(cycle, Ok(2));
        // Display window allows a new cycle
        let next = state.trigger(5, now()).unwrap();
        assert_ne!(next, cycle);
    }

    #[test]
    fn cancel_only_while_counting() {
        let mut state = SosState::Idle;
        assert_eq!(state.cancel(), None);

        let cycle = state.trigger(5, now()).unwrap();
        state.tick(cycle);
        state.tick(cycle);
        assert_eq!(state.cancel(), Some((cycle, 3)));
        assert_eq!(state.status(), SosStatus::Cancelled);
        assert_eq!(state.snapshot().message.as_deref(), Some("Alert cancelled"));

        // Countdown task is stale after cancel
        assert_eq!(state.tick(cycle), Tick::Stale);
        assert_eq!(state.cancel(), None);

        assert!(state.reset(cycle));
        assert_eq!(state, SosState::Idle);
    }

    #[test]
    fn location_captured_once_per_cycle() {
        let mut state = SosState::Idle;
        let old = state.trigger(5, now()).unwrap();
        state.cancel();
        let cycle = state.trigger(5, now()).unwrap();

        assert!(!state.capture_location(old, Coordinates::new(1.0, 1.0)));
        assert!(state.capture_location(cycle, Coordinates::new(2.0, 2.0)));
        assert!(!state.capture_location(cycle, Coordinates::new(3.0, 3.0)));

        for _ in 0..5 {
            state.tick(cycle);
        }
        assert_eq!(state.dispatch_location(cycle), Some(Coordinates::new(2.0, 2.0)));
    }

    #[test]
    fn failure_snapshot_carries_message() {
        let mut state = SosState::Idle;
        let cycle = state.trigger(1, now()).unwrap();
        assert_eq!(state.tick(cycle), Tick::Expired);

        assert!(state.finish_dispatch(cycle, Err(AlertFailure::NoContactsConfigured)));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, SosStatus::Failed);
        assert_eq!(snapshot.failure, Some(AlertFailure::NoContactsConfigured));
        assert_eq!(
            snapshot.message.as_deref(),
            Some("Please add emergency contacts first!")
        );

        // A second outcome for the same cycle is ignored
        assert!(!state.finish_dispatch(cycle, Ok(3)));
    }

    #[test]
    fn reset_ignores_superseded_cycle() {
        let mut state = SosState::Idle;
        let first = state.trigger(5, now()).unwrap();
        state.cancel();
        let second = state.trigger(5, now()).unwrap();

        assert!(!state.reset(first));
        assert_eq!(state.cycle(), Some(second));
        assert_eq!(state.status(), SosStatus::CountingDown);
    }
}
