//! Mock collaborators for testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safeguard_api::{
    AlertKind, AlertPayload, Coordinates, DispatchReceipt, ScheduledSession, SessionRequest,
    SessionStatus,
};
use safeguard_util::SessionId;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{
    AlertGateway, CredentialProvider, GatewayError, GatewayResult, LocationProvider,
    SessionBackend,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded dispatch call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDispatch {
    pub kind: AlertKind,
    pub payload: AlertPayload,
}

/// Mock alert gateway recording every dispatch attempt
#[derive(Clone)]
pub struct MockGateway {
    calls: Arc<Mutex<Vec<RecordedDispatch>>>,
    /// Errors returned by the next calls, in order
    failures: Arc<Mutex<VecDeque<GatewayError>>>,
    /// Error returned by every call while set
    sticky_failure: Arc<Mutex<Option<GatewayError>>>,
    contacts: Arc<Mutex<u32>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            sticky_failure: Arc::new(Mutex::new(None)),
            contacts: Arc::new(Mutex::new(3)),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Fail the next call with `err`
    pub fn fail_next(&self, err: GatewayError) {
        lock(&self.failures).push_back(err);
    }

    /// Fail every call until cleared with `None`
    pub fn set_failure(&self, err: Option<GatewayError>) {
        *lock(&self.sticky_failure) = err;
    }

    pub fn set_contacts(&self, count: u32) {
        *lock(&self.contacts) = count;
    }

    /// Simulate a slow backend
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// All attempts, successful or not
    pub fn dispatches(&self) -> Vec<RecordedDispatch> {
        lock(&self.calls).clone()
    }

    pub fn dispatch_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn count_of(&self, kind: AlertKind) -> usize {
        lock(&self.calls).iter().filter(|d| d.kind == kind).count()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertGateway for MockGateway {
    async fn dispatch(
        &self,
        kind: AlertKind,
        payload: &AlertPayload,
    ) -> GatewayResult<DispatchReceipt> {
        lock(&self.calls).push(RecordedDispatch {
            kind,
            payload: payload.clone(),
        });

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = lock(&self.failures).pop_front() {
            return Err(err);
        }
        if let Some(err) = lock(&self.sticky_failure).clone() {
            return Err(err);
        }

        Ok(DispatchReceipt {
            contacts_notified: *lock(&self.contacts),
        })
    }
}

/// In-memory stand-in for the scheduled-sharing REST surface
#[derive(Clone)]
pub struct MockSessionBackend {
    sessions: Arc<Mutex<BTreeMap<SessionId, ScheduledSession>>>,
    next_id: Arc<AtomicI64>,
    failure: Arc<Mutex<Option<GatewayError>>>,
    arrived_calls: Arc<AtomicUsize>,
    cancel_calls: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
}

impl MockSessionBackend {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
            failure: Arc::new(Mutex::new(None)),
            arrived_calls: Arc::new(AtomicUsize::new(0)),
            cancel_calls: Arc::new(AtomicUsize::new(0)),
            list_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every call until cleared with `None`
    pub fn set_failure(&self, err: Option<GatewayError>) {
        *lock(&self.failure) = err;
    }

    /// Add or replace a session server-side
    pub fn insert(&self, session: ScheduledSession) {
        lock(&self.sessions).insert(session.id, session);
    }

    /// Remove a session server-side
    pub fn remove(&self, session_id: SessionId) {
        lock(&self.sessions).remove(&session_id);
    }

    /// Overwrite the server-side status of a session
    pub fn set_status(&self, session_id: SessionId, status: SessionStatus) {
        if let Some(session) = lock(&self.sessions).get_mut(&session_id) {
            session.status = status;
        }
    }

    pub fn get(&self, session_id: SessionId) -> Option<ScheduledSession> {
        lock(&self.sessions).get(&session_id).cloned()
    }

    pub fn arrived_calls(&self) -> usize {
        self.arrived_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> GatewayResult<()> {
        match lock(&self.failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn update(&self, session_id: SessionId, status: SessionStatus) -> GatewayResult<ScheduledSession> {
        let mut sessions = lock(&self.sessions);
        let session = sessions.get_mut(&session_id).ok_or(GatewayError::NotFound)?;
        session.status = status;
        Ok(session.clone())
    }

    /// Session record the way the backend would build it
    pub fn build_session(
        id: SessionId,
        name: &str,
        start_time: DateTime<Utc>,
        duration_minutes: u32,
        status: SessionStatus,
    ) -> ScheduledSession {
        ScheduledSession {
            id,
            session_name: name.to_string(),
            start_time,
            end_time: ScheduledSession::computed_end_time(start_time, duration_minutes),
            duration_minutes,
            destination: None,
            notify: Default::default(),
            status,
        }
    }
}

impl Default for MockSessionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for MockSessionBackend {
    async fn create_session(&self, request: &SessionRequest) -> GatewayResult<ScheduledSession> {
        self.check_failure()?;

        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let session = ScheduledSession {
            id,
            session_name: request.session_name.clone(),
            start_time: request.start_time,
            end_time: ScheduledSession::computed_end_time(
                request.start_time,
                request.duration_minutes,
            ),
            duration_minutes: request.duration_minutes,
            destination: request.destination.clone(),
            notify: request.notify,
            status: SessionStatus::Scheduled,
        };
        self.insert(session.clone());
        Ok(session)
    }

    async fn mark_arrived(&self, session_id: SessionId) -> GatewayResult<ScheduledSession> {
        self.arrived_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.update(session_id, SessionStatus::Completed)
    }

    async fn cancel_session(&self, session_id: SessionId) -> GatewayResult<ScheduledSession> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.update(session_id, SessionStatus::Cancelled)
    }

    async fn list_sessions(&self) -> GatewayResult<Vec<ScheduledSession>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(lock(&self.sessions).values().cloned().collect())
    }
}

/// Mock location source
#[derive(Clone)]
pub struct MockLocation {
    last_known: Arc<Mutex<Option<Coordinates>>>,
    fix: Arc<Mutex<Option<Coordinates>>>,
    fix_delay: Arc<Mutex<Option<Duration>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockLocation {
    pub fn new() -> Self {
        Self {
            last_known: Arc::new(Mutex::new(None)),
            fix: Arc::new(Mutex::new(None)),
            fix_delay: Arc::new(Mutex::new(None)),
            failing: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_last_known(&self, coords: Option<Coordinates>) {
        *lock(&self.last_known) = coords;
    }

    pub fn set_fix(&self, coords: Option<Coordinates>) {
        *lock(&self.fix) = coords;
    }

    /// Delay before `current_fix` resolves
    pub fn set_fix_delay(&self, delay: Duration) {
        *lock(&self.fix_delay) = Some(delay);
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    fn check_failing(&self) -> GatewayResult<()> {
        if *lock(&self.failing) {
            return Err(GatewayError::LocationUnavailable("mock failure".into()));
        }
        Ok(())
    }
}

impl Default for MockLocation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationProvider for MockLocation {
    async fn last_known(&self) -> GatewayResult<Option<Coordinates>> {
        self.check_failing()?;
        Ok(*lock(&self.last_known))
    }

    async fn current_fix(&self) -> GatewayResult<Option<Coordinates>> {
        let delay = *lock(&self.fix_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failing()?;
        Ok(*lock(&self.fix))
    }
}

/// Fixed-token credential provider for tests
#[derive(Debug, Clone)]
pub struct MockCredentials(pub String);

#[async_trait]
impl CredentialProvider for MockCredentials {
    async fn bearer_token(&self) -> GatewayResult<String> {
        Ok(self.0.clone())
    }
}
