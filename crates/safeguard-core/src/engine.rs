//! Scheduled session engine

use chrono::{DateTime, Utc};
use safeguard_api::{
    AlertKind, AlertPayload, Completion, Coordinates, SessionRequest, SessionStatus, SessionView,
};
use safeguard_config::SessionSettings;
use safeguard_gateway::acquire_location;
use safeguard_store::{AuditEvent, AuditEventType};
use safeguard_util::{RetryThrottle, SafeguardError, SessionId};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::{CoreEvent, PendingAction, Services, TrackedSession, Transition};

type SessionSlot = Arc<Mutex<TrackedSession>>;

/// Alerts a session can send; a restored attempt time throttles all of them
const SESSION_ALERTS: [AlertKind; 3] = [
    AlertKind::SessionStart,
    AlertKind::SessionDelay,
    AlertKind::SessionEscalation,
];

/// Lifecycle owner for scheduled location-sharing sessions.
///
/// Mutations of one session are serialized by that session's mutex, held
/// across the backend or gateway call, so a user action and a timer pass
/// never interleave. Different sessions proceed independently.
pub struct SessionEngine {
    settings: SessionSettings,
    location_timeout: Duration,
    services: Services,
    events: broadcast::Sender<CoreEvent>,
    sessions: RwLock<BTreeMap<SessionId, SessionSlot>>,
    throttle: std::sync::Mutex<RetryThrottle<(SessionId, AlertKind)>>,
}

impl SessionEngine {
    pub fn new(
        settings: SessionSettings,
        location_timeout: Duration,
        services: Services,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        info!(
            retry_interval_secs = settings.retry_interval.as_secs(),
            max_duration_minutes = settings.max_duration_minutes,
            "Session engine initialized"
        );

        let throttle = RetryThrottle::new(settings.retry_interval);
        Self {
            settings,
            location_timeout,
            services,
            events,
            sessions: RwLock::new(BTreeMap::new()),
            throttle: std::sync::Mutex::new(throttle),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.services.clock.now()
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self
            .services
            .store
            .append_audit(AuditEvent::at(self.now(), event))
        {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    fn persist(&self, tracked: &TrackedSession) {
        if let Err(e) = self.services.store.save_enforcement(&tracked.record()) {
            warn!(session_id = %tracked.id(), error = %e, "Failed to save enforcement record");
        }
    }

    fn record_transitions(&self, tracked: &TrackedSession, taken: &[Transition]) {
        for (from, to) in taken {
            let completion = (*to == SessionStatus::Completed)
                .then_some(tracked.completion)
                .flatten();

            info!(
                session_id = %tracked.id(),
                from = %from,
                to = %to,
                completion = ?completion,
                "Session status changed"
            );

            self.audit(AuditEventType::SessionTransition {
                session_id: tracked.id(),
                from: *from,
                to: *to,
                completion,
            });
            self.emit(CoreEvent::SessionStatusChanged {
                session_id: tracked.id(),
                from: *from,
                to: *to,
                completion,
            });
        }
    }

    async fn slot(&self, session_id: SessionId) -> Result<SessionSlot, SafeguardError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(SafeguardError::NotFound(session_id))
    }

    async fn slots(&self) -> Vec<SessionSlot> {
        self.sessions.read().await.values().cloned().collect()
    }

    fn validate(&self, request: &SessionRequest, now: DateTime<Utc>) -> Result<(), SafeguardError> {
        if request.session_name.trim().is_empty() {
            return Err(SafeguardError::validation("Session name is required"));
        }
        if request.duration_minutes == 0 {
            return Err(SafeguardError::validation("Duration must be at least one minute"));
        }
        if request.duration_minutes > self.settings.max_duration_minutes {
            return Err(SafeguardError::validation(format!(
                "Duration cannot exceed {} minutes",
                self.settings.max_duration_minutes
            )));
        }

        let tolerance = chrono::Duration::from_std(self.settings.start_tolerance)
            .unwrap_or(chrono::Duration::zero());
        if request.start_time < now - tolerance {
            return Err(SafeguardError::validation("Start time is in the past"));
        }

        if let Some(coords) = request.destination.as_ref().and_then(|d| d.coordinates)
            && !coords.is_valid()
        {
            return Err(SafeguardError::validation("Destination coordinates are invalid"));
        }

        Ok(())
    }

    /// Validate, submit to the backend, and track the confirmed session.
    /// Nothing is stored locally if the backend call fails.
    pub async fn create_session(&self, request: SessionRequest) -> Result<SessionView, SafeguardError> {
        self.validate(&request, self.now())?;

        let mut session = self
            .services
            .backend
            .create_session(&request)
            .await
            .map_err(SafeguardError::from)?;
        session.notify = request.notify;

        let tracked = TrackedSession::new(session);
        let view = tracked.view();
        let session_id = tracked.id();

        info!(
            session_id = %session_id,
            name = %view.session.session_name,
            start = %view.session.start_time,
            end = %view.session.end_time,
            "Session created"
        );

        self.audit(AuditEventType::SessionCreated {
            session_id,
            session_name: view.session.session_name.clone(),
            start_time: view.session.start_time,
            end_time: view.session.end_time,
        });
        self.persist(&tracked);

        self.sessions
            .write()
            .await
            .insert(session_id, Arc::new(Mutex::new(tracked)));

        self.emit(CoreEvent::SessionCreated {
            session_id,
            session_name: view.session.session_name.clone(),
            start_time: view.session.start_time,
        });

        Ok(view)
    }

    /// Confirm arrival. Repeating the call on a Completed session is a no-op.
    pub async fn mark_arrived(&self, session_id: SessionId) -> Result<SessionView, SafeguardError> {
        let slot = self.slot(session_id).await?;
        let mut tracked = slot.lock().await;

        match tracked.status() {
            SessionStatus::Completed => {
                debug!(session_id = %session_id, "Already completed, ignoring arrival");
                return Ok(tracked.view());
            }
            SessionStatus::Cancelled => {
                return Err(SafeguardError::invalid_state("Session was cancelled"));
            }
            SessionStatus::Scheduled | SessionStatus::Active => {}
        }

        self.services
            .backend
            .mark_arrived(session_id)
            .await
            .map_err(|e| e.for_session(session_id))?;

        let taken = tracked.transition_to(SessionStatus::Completed, Some(Completion::Arrived))?;
        self.record_transitions(&tracked, &taken);
        self.persist(&tracked);

        Ok(tracked.view())
    }

    /// Cancel a session. Repeating the call on a Cancelled session is a no-op.
    pub async fn cancel_session(&self, session_id: SessionId) -> Result<SessionView, SafeguardError> {
        let slot = self.slot(session_id).await?;
        let mut tracked = slot.lock().await;

        match tracked.status() {
            SessionStatus::Cancelled => {
                debug!(session_id = %session_id, "Already cancelled");
                return Ok(tracked.view());
            }
            SessionStatus::Completed => {
                return Err(SafeguardError::invalid_state("Session already completed"));
            }
            SessionStatus::Scheduled | SessionStatus::Active => {}
        }

        self.services
            .backend
            .cancel_session(session_id)
            .await
            .map_err(|e| e.for_session(session_id))?;

        let taken = tracked.transition_to(SessionStatus::Cancelled, None)?;
        self.record_transitions(&tracked, &taken);
        self.persist(&tracked);

        Ok(tracked.view())
    }

    /// Replace the local set with the backend's. Bookkeeping survives for
    /// sessions still present; statuses never move backwards. Sessions
    /// created while the list call is in flight are kept.
    pub async fn refresh(&self) -> Result<usize, SafeguardError> {
        let existing: BTreeMap<SessionId, SessionSlot> = self.sessions.read().await.clone();

        let server_sessions = self
            .services
            .backend
            .list_sessions()
            .await
            .map_err(SafeguardError::from)?;

        let mut next = BTreeMap::new();
        let mut restored = Vec::new();

        for server in server_sessions {
            let session_id = server.id;
            match existing.get(&session_id) {
                Some(slot) => {
                    let mut tracked = slot.lock().await;
                    let taken = tracked.merge_server(server);
                    if !taken.is_empty() {
                        self.record_transitions(&tracked, &taken);
                        self.persist(&tracked);
                    }
                    drop(tracked);
                    next.insert(session_id, slot.clone());
                }
                None => {
                    let record = self
                        .services
                        .store
                        .load_enforcement(session_id)
                        .unwrap_or_else(|e| {
                            warn!(session_id = %session_id, error = %e, "Failed to load enforcement record");
                            None
                        });
                    if let Some(at) = record.as_ref().and_then(|r| r.last_attempt_at) {
                        restored.push((session_id, at));
                    }
                    let tracked = TrackedSession::with_record(server, record);
                    debug!(session_id = %session_id, status = %tracked.status(), "Tracking session from backend");
                    next.insert(session_id, Arc::new(Mutex::new(tracked)));
                }
            }
        }

        let mut dropped = HashSet::new();
        for (session_id, slot) in &existing {
            if next.contains_key(session_id) {
                continue;
            }
            dropped.insert(*session_id);
            let tracked = slot.lock().await;
            debug!(session_id = %session_id, "Session no longer reported by backend");
            if tracked.status().is_terminal()
                && let Err(e) = self.services.store.delete_enforcement(*session_id)
            {
                warn!(session_id = %session_id, error = %e, "Failed to drop enforcement record");
            }
        }

        let count = {
            let mut sessions = self.sessions.write().await;
            for (session_id, slot) in sessions.iter() {
                if !existing.contains_key(session_id) {
                    // Created locally during the list call; the local slot
                    // carries the notify policy
                    next.insert(*session_id, slot.clone());
                }
            }
            *sessions = next;
            sessions.len()
        };

        {
            let mut throttle = self.throttle.lock().unwrap_or_else(PoisonError::into_inner);
            throttle.retain(|(session_id, _)| !dropped.contains(session_id));
            for (session_id, at) in restored {
                for kind in SESSION_ALERTS {
                    throttle.record((session_id, kind), at);
                }
            }
        }

        info!(count, dropped = dropped.len(), "Sessions refreshed");
        self.emit(CoreEvent::SessionsRefreshed { count });
        Ok(count)
    }

    /// One enforcement pass: activate due sessions and send pending
    /// notices/escalations. Failures are logged and retried on later passes.
    pub async fn evaluate_timers(&self) {
        // Shared by every escalation in this pass
        let fix = OnceCell::new();

        for slot in self.slots().await {
            let mut tracked = slot.lock().await;
            let now = self.now();

            if tracked.start_due(now) {
                match tracked.transition_to(SessionStatus::Active, None) {
                    Ok(taken) => {
                        self.record_transitions(&tracked, &taken);
                        self.persist(&tracked);
                    }
                    Err(e) => warn!(session_id = %tracked.id(), error = %e, "Activation failed"),
                }
            }

            if let Some(action) = tracked.pending_action(now) {
                self.attempt(&mut tracked, action, now, &fix).await;
            }
        }
    }

    async fn attempt(
        &self,
        tracked: &mut TrackedSession,
        action: PendingAction,
        now: DateTime<Utc>,
        fix: &OnceCell<Option<Coordinates>>,
    ) {
        let session_id = tracked.id();
        let kind = action.kind();

        let acquired = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(&(session_id, kind), now);
        if !acquired {
            debug!(session_id = %session_id, kind = %kind, "Retry throttled");
            return;
        }

        tracked.last_attempt_at = Some(now);

        let location = match action {
            PendingAction::Escalation => *fix
                .get_or_init(|| {
                    acquire_location(self.services.location.as_ref(), self.location_timeout)
                })
                .await,
            PendingAction::StartNotice | PendingAction::DelayNotice => self
                .services
                .location
                .last_known()
                .await
                .ok()
                .flatten(),
        };

        let template = match action {
            PendingAction::StartNotice => &self.settings.start_message,
            PendingAction::DelayNotice => &self.settings.delay_message,
            PendingAction::Escalation => &self.settings.escalation_message,
        };
        let payload = AlertPayload {
            message: SessionSettings::render(template, &tracked.session.session_name),
            location,
            session_id: Some(session_id),
        };

        match self.services.gateway.dispatch(kind, &payload).await {
            Ok(receipt) => {
                let contacts_notified = receipt.contacts_notified;
                match action {
                    PendingAction::StartNotice => tracked.start_notified = true,
                    PendingAction::DelayNotice => tracked.delay_notified = true,
                    PendingAction::Escalation => tracked.escalated = true,
                }

                if action == PendingAction::Escalation {
                    info!(session_id = %session_id, contacts_notified, "Session escalated");
                    self.audit(AuditEventType::SessionEscalated {
                        session_id,
                        contacts_notified,
                    });
                    self.emit(CoreEvent::SessionEscalated {
                        session_id,
                        contacts_notified,
                    });
                    match tracked.transition_to(SessionStatus::Completed, Some(Completion::Escalated)) {
                        Ok(taken) => self.record_transitions(tracked, &taken),
                        Err(e) => warn!(session_id = %session_id, error = %e, "Completion after escalation failed"),
                    }
                } else {
                    info!(session_id = %session_id, kind = %kind, contacts_notified, "Session notice sent");
                    self.audit(AuditEventType::NoticeDelivered {
                        session_id,
                        kind,
                        contacts_notified,
                    });
                    self.emit(CoreEvent::SessionNoticeSent {
                        session_id,
                        kind,
                        contacts_notified,
                    });
                }
            }
            Err(e) => {
                let failure = e.alert_failure();
                warn!(session_id = %session_id, kind = %kind, error = %e, "Session dispatch failed");
                self.audit(AuditEventType::DispatchFailed {
                    session_id: Some(session_id),
                    kind,
                    failure,
                });
                self.emit(CoreEvent::SessionDispatchFailed {
                    session_id,
                    kind,
                    failure,
                });
            }
        }

        self.persist(tracked);
    }

    /// Earliest instant a timer pass would change something
    pub async fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        let now = self.now();
        let mut earliest: Option<DateTime<Utc>> = None;

        for slot in self.slots().await {
            let tracked = slot.lock().await;

            let mut candidate = tracked.next_boundary(now);
            if let Some(action) = tracked.pending_action(now) {
                let ready_at = self
                    .throttle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .ready_at(&(tracked.id(), action.kind()));
                candidate = match (candidate, ready_at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }

            if let Some(at) = candidate {
                earliest = Some(earliest.map_or(at, |e| e.min(at)));
            }
        }

        earliest
    }

    /// All tracked sessions, ordered by start time
    pub async fn sessions(&self) -> Vec<SessionView> {
        let mut views = Vec::new();
        for slot in self.slots().await {
            views.push(slot.lock().await.view());
        }
        views.sort_by_key(|v| (v.session.start_time, v.session.id));
        views
    }

    pub async fn session(&self, session_id: SessionId) -> Result<SessionView, SafeguardError> {
        let slot = self.slot(session_id).await?;
        let view = slot.lock().await.view();
        Ok(view)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
