//! SOS countdown controller

use safeguard_api::{AlertKind, AlertPayload, Coordinates, SosSnapshot};
use safeguard_config::SosSettings;
use safeguard_gateway::acquire_location;
use safeguard_store::{AuditEvent, AuditEventType};
use safeguard_util::{CycleId, SafeguardError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::{CoreEvent, Services, SosState, Tick};

const TICK: Duration = Duration::from_secs(1);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Tasks {
    countdown: Option<JoinHandle<()>>,
    location: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for handle in [
            self.countdown.take(),
            self.location.take(),
            self.reset.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

struct Inner {
    settings: SosSettings,
    services: Services,
    events: broadcast::Sender<CoreEvent>,
    state: Mutex<SosState>,
    tasks: Mutex<Tasks>,
}

/// Turns one trigger into a delayed, cancellable emergency alert.
///
/// The countdown and the location fetch run as separate tasks and join at
/// dispatch; the dispatch waits for location at most `location_grace`.
#[derive(Clone)]
pub struct SosController {
    inner: Arc<Inner>,
}

impl SosController {
    pub fn new(
        settings: SosSettings,
        services: Services,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                services,
                events,
                state: Mutex::new(SosState::Idle),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn snapshot(&self) -> SosSnapshot {
        lock(&self.inner.state).snapshot()
    }

    /// Start a countdown. Fails with `InvalidState` while a countdown or
    /// dispatch is already running.
    pub fn trigger(&self) -> Result<SosSnapshot, SafeguardError> {
        let inner = &self.inner;
        let now = inner.services.clock.now();

        // Lock order: tasks, then state. Held until the new handles are stored.
        let mut tasks = lock(&inner.tasks);
        let (cycle, snapshot) = {
            let mut state = lock(&inner.state);
            let cycle = state.trigger(inner.settings.countdown_seconds, now)?;
            (cycle, state.snapshot())
        };
        // The previous cycle is at most in its display window
        tasks.abort_all();

        info!(
            cycle = %cycle,
            countdown = inner.settings.countdown_seconds,
            "SOS triggered"
        );
        inner.audit(AuditEventType::SosTriggered { cycle });
        inner.emit(CoreEvent::SosStateChanged(snapshot.clone()));

        let (location_tx, location_rx) = oneshot::channel();
        let location = tokio::spawn({
            let inner = self.inner.clone();
            async move {
                let coords = acquire_location(
                    inner.services.location.as_ref(),
                    inner.settings.location_timeout,
                )
                .await;
                if let Some(coords) = coords {
                    inner.capture(cycle, coords);
                }
                let _ = location_tx.send(coords);
            }
        });

        let countdown = tokio::spawn({
            let inner = self.inner.clone();
            async move { inner.run_cycle(cycle, location_rx).await }
        });

        tasks.countdown = Some(countdown);
        tasks.location = Some(location);

        Ok(snapshot)
    }

    /// Cancel a running countdown; a no-op in any other state
    pub fn cancel(&self) -> SosSnapshot {
        let inner = &self.inner;

        let mut tasks = lock(&inner.tasks);
        let (cancelled, snapshot) = {
            let mut state = lock(&inner.state);
            let cancelled = state.cancel();
            (cancelled, state.snapshot())
        };

        let Some((cycle, remaining)) = cancelled else {
            debug!(status = ?snapshot.status, "Nothing to cancel");
            return snapshot;
        };

        tasks.abort_all();

        info!(cycle = %cycle, remaining, "SOS cancelled");
        inner.audit(AuditEventType::SosCancelled { cycle, remaining });
        inner.emit(CoreEvent::SosStateChanged(snapshot.clone()));

        tasks.reset = Some(tokio::spawn({
            let inner = self.inner.clone();
            async move {
                tokio::time::sleep(inner.settings.cancel_display).await;
                inner.reset(cycle);
            }
        }));

        snapshot
    }

    /// Feed a location from the host. Applied to the running cycle only if
    /// it has not captured one yet.
    pub fn report_location(&self, coords: Coordinates) -> Result<bool, SafeguardError> {
        if !coords.is_valid() {
            return Err(SafeguardError::validation("Coordinates out of range"));
        }

        let cycle = lock(&self.inner.state).cycle();
        Ok(match cycle {
            Some(cycle) => self.inner.capture(cycle, coords),
            None => false,
        })
    }

    /// Stop all pending timers; the state is left as is
    pub fn shutdown(&self) {
        lock(&self.inner.tasks).abort_all();
        debug!("SOS controller stopped");
    }
}

impl Inner {
    fn emit(&self, event: CoreEvent) {
        let _ = self.events.send(event);
    }

    fn audit(&self, event: AuditEventType) {
        let event = AuditEvent::at(self.services.clock.now(), event);
        if let Err(e) = self.services.store.append_audit(event) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    fn capture(&self, cycle: CycleId, coords: Coordinates) -> bool {
        let captured = lock(&self.state).capture_location(cycle, coords);
        if captured {
            debug!(cycle = %cycle, location = %coords, "SOS location captured");
        }
        captured
    }

    async fn run_cycle(&self, cycle: CycleId, location_rx: oneshot::Receiver<Option<Coordinates>>) {
        let mut ticker = interval_at(Instant::now() + TICK, TICK);

        loop {
            ticker.tick().await;
            let (tick, snapshot) = {
                let mut state = lock(&self.state);
                let tick = state.tick(cycle);
                (tick, state.snapshot())
            };

            match tick {
                Tick::Stale => return,
                Tick::Counting(remaining) => {
                    debug!(cycle = %cycle, remaining, "SOS countdown");
                    self.emit(CoreEvent::SosCountdown { cycle, remaining });
                }
                Tick::Expired => {
                    self.emit(CoreEvent::SosCountdown { cycle, remaining: 0 });
                    self.emit(CoreEvent::SosStateChanged(snapshot));
                    break;
                }
            }
        }

        if tokio::time::timeout(self.settings.location_grace, location_rx)
            .await
            .is_err()
        {
            debug!(cycle = %cycle, "Location not ready, dispatching without it");
        }
        if let Some(handle) = lock(&self.tasks).location.take() {
            handle.abort();
        }

        let location = lock(&self.state).dispatch_location(cycle);
        let payload = AlertPayload {
            message: self.settings.alert_message.clone(),
            location,
            session_id: None,
        };

        let outcome = self
            .services
            .gateway
            .dispatch(AlertKind::Sos, &payload)
            .await
            .map(|receipt| receipt.contacts_notified)
            .map_err(|e| {
                warn!(cycle = %cycle, error = %e, "SOS dispatch failed");
                e.alert_failure()
            });

        let snapshot = {
            let mut state = lock(&self.state);
            if !state.finish_dispatch(cycle, outcome) {
                return;
            }
            state.snapshot()
        };

        let display = match outcome {
            Ok(contacts_notified) => {
                info!(cycle = %cycle, contacts_notified, with_location = location.is_some(), "SOS alert delivered");
                self.audit(AuditEventType::SosDelivered {
                    cycle,
                    contacts_notified,
                    with_location: location.is_some(),
                });
                self.emit(CoreEvent::SosDelivered {
                    cycle,
                    contacts_notified,
                });
                self.settings.success_display
            }
            Err(failure) => {
                self.audit(AuditEventType::DispatchFailed {
                    session_id: None,
                    kind: AlertKind::Sos,
                    failure,
                });
                self.emit(CoreEvent::SosFailed { cycle, failure });
                self.settings.failure_display
            }
        };
        self.emit(CoreEvent::SosStateChanged(snapshot));

        tokio::time::sleep(display).await;
        self.reset(cycle);
    }

    fn reset(&self, cycle: CycleId) {
        let snapshot = {
            let mut state = lock(&self.state);
            if !state.reset(cycle) {
                return;
            }
            state.snapshot()
        };
        debug!(cycle = %cycle, "SOS back to idle");
        self.emit(CoreEvent::SosStateChanged(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeguard_api::{AlertFailure, SosStatus};
    use safeguard_gateway::{GatewayError, MockGateway, MockLocation, MockSessionBackend};
    use safeguard_store::{SqliteStore, Store};

    struct Harness {
        sos: SosController,
        gateway: MockGateway,
        location: MockLocation,
        store: Arc<SqliteStore>,
    }

    fn harness() -> Harness {
        harness_with(SosSettings::default())
    }

    fn harness_with(settings: SosSettings) -> Harness {
        let gateway = MockGateway::new();
        let location = MockLocation::new();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let services = Services::new(
            Arc::new(gateway.clone()),
            Arc::new(MockSessionBackend::new()),
            Arc::new(location.clone()),
            store.clone(),
        );
        let (events, _) = crate::event_channel();
        Harness {
            sos: SosController::new(settings, services, events),
            gateway,
            location,
            store,
        }
    }

    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_dispatches_exactly_once() {
        let h = harness();
        let snapshot = h.sos.trigger().unwrap();
        assert_eq!(snapshot.status, SosStatus::CountingDown);
        assert_eq!(snapshot.countdown_remaining, 5);

        advance_ms(4500).await;
        assert_eq!(h.sos.snapshot().countdown_remaining, 1);
        assert_eq!(h.gateway.dispatch_count(), 0);

        advance_ms(1000).await;
        assert_eq!(h.gateway.count_of(AlertKind::Sos), 1);
        let snapshot = h.sos.snapshot();
        assert_eq!(snapshot.status, SosStatus::Active);
        assert_eq!(snapshot.contacts_notified, Some(3));

        let payload = &h.gateway.dispatches()[0].payload;
        assert_eq!(payload.message, "EMERGENCY! I need immediate help!");
        assert_eq!(payload.location, None);

        // Success display, then idle
        advance_ms(8000).await;
        assert_eq!(h.sos.snapshot().status, SosStatus::Idle);
        assert_eq!(h.gateway.dispatch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_dispatch() {
        let h = harness();
        h.sos.trigger().unwrap();

        advance_ms(2500).await;
        assert_eq!(h.sos.snapshot().countdown_remaining, 3);

        let snapshot = h.sos.cancel();
        assert_eq!(snapshot.status, SosStatus::Cancelled);
        assert_eq!(snapshot.message.as_deref(), Some("Alert cancelled"));

        advance_ms(2000).await;
        assert_eq!(h.sos.snapshot().status, SosStatus::Cancelled);

        advance_ms(1500).await;
        assert_eq!(h.sos.snapshot().status, SosStatus::Idle);

        advance_ms(10_000).await;
        assert_eq!(h.gateway.dispatch_count(), 0);

        let cancelled = h
            .store
            .get_recent_audits(10)
            .unwrap()
            .into_iter()
            .any(|a| matches!(a.event, AuditEventType::SosCancelled { remaining: 3, .. }));
        assert!(cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_outside_countdown_is_noop() {
        let h = harness();
        assert_eq!(h.sos.cancel().status, SosStatus::Idle);

        h.sos.trigger().unwrap();
        advance_ms(5500).await;
        assert_eq!(h.sos.cancel().status, SosStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn retrigger_while_running_is_rejected() {
        let h = harness();
        h.sos.trigger().unwrap();
        assert!(matches!(
            h.sos.trigger(),
            Err(SafeguardError::InvalidState(_))
        ));

        // Allowed again during the success display
        advance_ms(5500).await;
        h.sos.trigger().unwrap();
        advance_ms(5500).await;
        assert_eq!(h.gateway.count_of(AlertKind::Sos), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_classified_and_resets() {
        let h = harness();
        h.gateway.set_failure(Some(GatewayError::NoContacts));
        h.sos.trigger().unwrap();

        advance_ms(5500).await;
        let snapshot = h.sos.snapshot();
        assert_eq!(snapshot.status, SosStatus::Failed);
        assert_eq!(snapshot.failure, Some(AlertFailure::NoContactsConfigured));
        assert_eq!(
            snapshot.message.as_deref(),
            Some("Please add emergency contacts first!")
        );

        advance_ms(9000).await;
        assert_eq!(h.sos.snapshot().status, SosStatus::Failed);
        advance_ms(1500).await;
        assert_eq!(h.sos.snapshot().status, SosStatus::Idle);
        assert_eq!(h.gateway.dispatch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_known_location_is_sent() {
        let h = harness();
        h.location.set_last_known(Some(Coordinates::new(51.5, -0.12)));
        h.sos.trigger().unwrap();

        advance_ms(5500).await;
        assert_eq!(
            h.gateway.dispatches()[0].payload.location,
            Some(Coordinates::new(51.5, -0.12))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_location_does_not_block_dispatch() {
        let h = harness();
        h.location.set_fix(Some(Coordinates::new(10.0, 10.0)));
        h.location.set_fix_delay(Duration::from_secs(60));
        h.sos.trigger().unwrap();

        // Countdown (5s) plus at most the grace period (1s)
        advance_ms(6100).await;
        assert_eq!(h.gateway.count_of(AlertKind::Sos), 1);
        assert_eq!(h.gateway.dispatches()[0].payload.location, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reported_location_is_used() {
        let h = harness();
        h.location.set_fix_delay(Duration::from_secs(60));
        h.sos.trigger().unwrap();

        advance_ms(1500).await;
        assert!(h.sos.report_location(Coordinates::new(35.68, 139.76)).unwrap());
        assert!(!h.sos.report_location(Coordinates::new(1.0, 1.0)).unwrap());
        assert!(h.sos.report_location(Coordinates::new(95.0, 0.0)).is_err());

        advance_ms(5000).await;
        assert_eq!(
            h.gateway.dispatches()[0].payload.location,
            Some(Coordinates::new(35.68, 139.76))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn events_follow_the_countdown() {
        let gateway = MockGateway::new();
        let services = Services::new(
            Arc::new(gateway.clone()),
            Arc::new(MockSessionBackend::new()),
            Arc::new(MockLocation::new()),
            Arc::new(SqliteStore::in_memory().unwrap()),
        );
        let (events, mut rx) = crate::event_channel();
        let sos = SosController::new(SosSettings::default(), services, events);

        let cycle = sos.trigger().unwrap().cycle.unwrap();
        advance_ms(5500).await;

        let mut countdown = Vec::new();
        let mut delivered = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                CoreEvent::SosCountdown { remaining, .. } => countdown.push(remaining),
                CoreEvent::SosDelivered {
                    cycle: c,
                    contacts_notified,
                } => delivered = Some((c, contacts_notified)),
                _ => {}
            }
        }
        assert_eq!(countdown, vec![4, 3, 2, 1, 0]);
        assert_eq!(delivered, Some((cycle, 3)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_cancel_still_resets() {
        for _ in 0..25 {
            let h = harness_with(SosSettings {
                cancel_display: Duration::from_millis(20),
                ..SosSettings::default()
            });
            let runtime = tokio::runtime::Handle::current();

            let canceller = std::thread::spawn({
                let sos = h.sos.clone();
                let runtime = runtime.clone();
                move || {
                    let _guard = runtime.enter();
                    for _ in 0..100_000 {
                        if sos.cancel().status == SosStatus::Cancelled {
                            return true;
                        }
                        std::hint::spin_loop();
                    }
                    false
                }
            });
            h.sos.trigger().unwrap();

            if !canceller.join().unwrap() {
                h.sos.cancel();
            }
            assert_eq!(h.sos.snapshot().status, SosStatus::Cancelled);

            let mut idle = false;
            for _ in 0..100 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if h.sos.snapshot().status == SosStatus::Idle {
                    idle = true;
                    break;
                }
            }
            assert!(idle);
            assert_eq!(h.gateway.dispatch_count(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_pending_countdown() {
        let h = harness();
        h.sos.trigger().unwrap();
        advance_ms(1500).await;
        h.sos.shutdown();

        advance_ms(10_000).await;
        assert_eq!(h.gateway.dispatch_count(), 0);
    }
}
