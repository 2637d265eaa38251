//! Location acquisition helpers

use async_trait::async_trait;
use safeguard_api::Coordinates;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::{GatewayError, GatewayResult, LocationProvider};

/// Best-effort position: last-known fast path, then a fresh fix bounded by
/// `timeout`. Any failure yields `None`.
pub async fn acquire_location(
    provider: &dyn LocationProvider,
    timeout: Duration,
) -> Option<Coordinates> {
    match provider.last_known().await {
        Ok(Some(coords)) if coords.is_valid() => return Some(coords),
        Ok(_) => {}
        Err(e) => debug!(error = %e, "Last-known location unavailable"),
    }

    match tokio::time::timeout(timeout, provider.current_fix()).await {
        Ok(Ok(Some(coords))) if coords.is_valid() => Some(coords),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            debug!(error = %e, "Location fix failed");
            None
        }
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "Location fix timed out");
            None
        }
    }
}

/// Location provider fed by host clients over IPC.
///
/// `current_fix` waits for the next report.
#[derive(Debug, Clone)]
pub struct ReportedLocation {
    tx: watch::Sender<Option<Coordinates>>,
}

impl ReportedLocation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Record a position; invalid coordinates are rejected
    pub fn report(&self, coords: Coordinates) -> GatewayResult<()> {
        if !coords.is_valid() {
            return Err(GatewayError::LocationUnavailable(format!(
                "coordinates out of range: {coords}"
            )));
        }
        self.tx.send_replace(Some(coords));
        Ok(())
    }

    pub fn latest(&self) -> Option<Coordinates> {
        *self.tx.borrow()
    }
}

impl Default for ReportedLocation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationProvider for ReportedLocation {
    async fn last_known(&self) -> GatewayResult<Option<Coordinates>> {
        Ok(self.latest())
    }

    async fn current_fix(&self) -> GatewayResult<Option<Coordinates>> {
        let mut rx = self.tx.subscribe();
        rx.changed()
            .await
            .map_err(|_| GatewayError::LocationUnavailable("reporter closed".into()))?;
        let fix = *rx.borrow();
        Ok(fix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockLocation;

    #[tokio::test]
    async fn prefers_last_known() {
        let provider = MockLocation::new();
        provider.set_last_known(Some(Coordinates::new(48.85, 2.35)));
        provider.set_fix(Some(Coordinates::new(1.0, 1.0)));

        let coords = acquire_location(&provider, Duration::from_secs(1)).await;
        assert_eq!(coords, Some(Coordinates::new(48.85, 2.35)));
    }

    #[tokio::test]
    async fn falls_back_to_fix() {
        let provider = MockLocation::new();
        provider.set_fix(Some(Coordinates::new(1.0, 2.0)));

        let coords = acquire_location(&provider, Duration::from_secs(1)).await;
        assert_eq!(coords, Some(Coordinates::new(1.0, 2.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fix_times_out() {
        let provider = MockLocation::new();
        provider.set_fix(Some(Coordinates::new(1.0, 2.0)));
        provider.set_fix_delay(Duration::from_secs(30));

        let coords = acquire_location(&provider, Duration::from_secs(2)).await;
        assert!(coords.is_none());
    }

    #[tokio::test]
    async fn failure_yields_none() {
        let provider = MockLocation::new();
        provider.set_failing(true);
        assert!(acquire_location(&provider, Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn reported_location_waits_for_next_report() {
        let reported = ReportedLocation::new();
        assert!(reported.last_known().await.unwrap().is_none());

        let waiter = {
            let reported = reported.clone();
            tokio::spawn(async move { reported.current_fix().await })
        };
        while reported.tx.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        reported.report(Coordinates::new(10.0, 20.0)).unwrap();
        let fix = waiter.await.unwrap().unwrap();
        assert_eq!(fix, Some(Coordinates::new(10.0, 20.0)));
        assert_eq!(reported.latest(), Some(Coordinates::new(10.0, 20.0)));
    }

    #[test]
    fn reported_location_rejects_out_of_range() {
        let reported = ReportedLocation::new();
        assert!(reported.report(Coordinates::new(120.0, 0.0)).is_err());
        assert!(reported.latest().is_none());
    }
}
