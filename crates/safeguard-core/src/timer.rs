//! Periodic session evaluation loop

use safeguard_util::{Clock, until};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::SessionEngine;

/// Shortest sleep between passes, so a boundary in the past cannot spin
const MIN_SLEEP: Duration = Duration::from_millis(250);

/// Drives `SessionEngine::evaluate_timers` on a periodic tick, waking early
/// for the next schedule boundary the engine reports
pub struct TimerService {
    engine: Arc<SessionEngine>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

/// Cloneable trigger for an immediate evaluation pass
#[derive(Clone)]
pub struct TimerPoke(Arc<Notify>);

impl TimerPoke {
    pub fn poke(&self) {
        self.0.notify_one();
    }
}

/// Handle to a running timer loop
pub struct TimerHandle {
    poke: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TimerService {
    pub fn new(engine: Arc<SessionEngine>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            engine,
            clock,
            interval,
        }
    }

    /// How long to wait before the next pass
    async fn next_delay(&self) -> Duration {
        let delay = match self.engine.next_wakeup().await {
            Some(at) => until(self.clock.now(), at).min(self.interval),
            None => self.interval,
        };
        delay.max(MIN_SLEEP)
    }

    pub fn spawn(self) -> TimerHandle {
        let poke = Arc::new(Notify::new());
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn({
            let poke = poke.clone();
            async move {
                info!(interval_secs = self.interval.as_secs(), "Session timer started");
                loop {
                    self.engine.evaluate_timers().await;

                    let delay = self.next_delay().await;
                    debug!(delay_ms = delay.as_millis() as u64, "Next session evaluation");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = poke.notified() => {
                            debug!("Session timer poked");
                        }
                        _ = shutdown_rx.changed() => {
                            info!("Session timer stopped");
                            return;
                        }
                    }
                }
            }
        });

        TimerHandle {
            poke,
            shutdown,
            task,
        }
    }
}

impl TimerHandle {
    /// Run a pass now, e.g. after sessions were created or refreshed
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    pub fn poker(&self) -> TimerPoke {
        TimerPoke(self.poke.clone())
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Services;
    use safeguard_api::{AlertKind, NotifyPolicy, SessionRequest, SessionStatus};
    use safeguard_config::SessionSettings;
    use safeguard_gateway::{MockGateway, MockLocation, MockSessionBackend};
    use safeguard_store::SqliteStore;
    use safeguard_util::SystemClock;

    fn engine(gateway: &MockGateway) -> Arc<SessionEngine> {
        let services = Services::new(
            Arc::new(gateway.clone()),
            Arc::new(MockSessionBackend::new()),
            Arc::new(MockLocation::new()),
            Arc::new(SqliteStore::in_memory().unwrap()),
        );
        let (events, _) = crate::event_channel();
        Arc::new(SessionEngine::new(
            SessionSettings::default(),
            Duration::from_millis(10),
            services,
            events,
        ))
    }

    #[tokio::test]
    async fn poke_triggers_immediate_pass() {
        let gateway = MockGateway::new();
        let engine = engine(&gateway);
        let handle = TimerService::new(engine.clone(), Arc::new(SystemClock), Duration::from_secs(3600)).spawn();

        let view = engine
            .create_session(SessionRequest {
                session_name: "Errand".into(),
                start_time: safeguard_util::now(),
                duration_minutes: 30,
                destination: None,
                notify: NotifyPolicy::default(),
                update_interval_seconds: None,
            })
            .await
            .unwrap();
        handle.poke();

        for _ in 0..100 {
            if gateway.count_of(AlertKind::SessionStart) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(gateway.count_of(AlertKind::SessionStart), 1);
        assert_eq!(
            engine.session(view.session.id).await.unwrap().session.status,
            SessionStatus::Active
        );

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_ends_loop() {
        let gateway = MockGateway::new();
        let handle = TimerService::new(engine(&gateway), Arc::new(SystemClock), Duration::from_secs(30)).spawn();
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();
    }
}
