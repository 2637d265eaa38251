//! Scheduled session tracking

use chrono::{DateTime, Utc};
use safeguard_api::{AlertKind, Completion, ScheduledSession, SessionStatus, SessionView};
use safeguard_store::EnforcementRecord;
use safeguard_util::{SafeguardError, SessionId};

/// Timer-driven dispatch a session is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    StartNotice,
    DelayNotice,
    Escalation,
}

impl PendingAction {
    pub fn kind(&self) -> AlertKind {
        match self {
            PendingAction::StartNotice => AlertKind::SessionStart,
            PendingAction::DelayNotice => AlertKind::SessionDelay,
            PendingAction::Escalation => AlertKind::SessionEscalation,
        }
    }
}

/// A status edge taken by a session
pub type Transition = (SessionStatus, SessionStatus);

/// A scheduled session plus local enforcement bookkeeping
#[derive(Debug, Clone)]
pub struct TrackedSession {
    pub session: ScheduledSession,

    /// Set once the session reaches Completed
    pub completion: Option<Completion>,

    /// Delivery flags; only set after a successful dispatch
    pub start_notified: bool,
    pub delay_notified: bool,
    pub escalated: bool,

    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl TrackedSession {
    pub fn new(session: ScheduledSession) -> Self {
        let completion = (session.status == SessionStatus::Completed).then_some(Completion::Arrived);
        Self {
            session,
            completion,
            start_notified: false,
            delay_notified: false,
            escalated: false,
            last_attempt_at: None,
        }
    }

    /// Restore bookkeeping saved before a restart
    pub fn with_record(session: ScheduledSession, record: Option<EnforcementRecord>) -> Self {
        let mut tracked = Self::new(session);
        if let Some(record) = record {
            tracked.start_notified = record.start_notified;
            tracked.delay_notified = record.delay_notified;
            tracked.escalated = record.escalated;
            tracked.last_attempt_at = record.last_attempt_at;
            if record.completion.is_some() {
                tracked.completion = record.completion;
            }
            // An escalated session is Completed locally even if the server
            // still reports it Active
            if tracked.escalated && tracked.session.status == SessionStatus::Active {
                tracked.session.status = SessionStatus::Completed;
                tracked.completion = Some(Completion::Escalated);
            }
        }
        tracked
    }

    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn record(&self) -> EnforcementRecord {
        EnforcementRecord {
            session_id: self.id(),
            start_notified: self.start_notified,
            delay_notified: self.delay_notified,
            escalated: self.escalated,
            completion: self.completion,
            last_attempt_at: self.last_attempt_at,
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session: self.session.clone(),
            completion: self.completion,
            start_notified: self.start_notified,
            delay_notified: self.delay_notified,
            escalated: self.escalated,
        }
    }

    /// Scheduled and the start time has been reached
    pub fn start_due(&self, now: DateTime<Utc>) -> bool {
        self.status() == SessionStatus::Scheduled && now >= self.session.start_time
    }

    /// Active, past the end time, and not marked arrived
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status() == SessionStatus::Active
            && now >= self.session.end_time
            && self.completion.is_none()
    }

    /// The dispatch this session needs at `now`, if any
    pub fn pending_action(&self, now: DateTime<Utc>) -> Option<PendingAction> {
        if self.status() != SessionStatus::Active {
            return None;
        }

        let notify = &self.session.notify;
        if self.is_overdue(now) {
            if notify.auto_alert_if_not_arrived {
                return (!self.escalated).then_some(PendingAction::Escalation);
            }
            if notify.on_delay && !self.delay_notified {
                return Some(PendingAction::DelayNotice);
            }
            return None;
        }

        (notify.on_start && !self.start_notified).then_some(PendingAction::StartNotice)
    }

    /// Next instant at which this session changes without user action
    pub fn next_boundary(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.status() {
            SessionStatus::Scheduled => Some(self.session.start_time),
            SessionStatus::Active if now < self.session.end_time => {
                let notify = &self.session.notify;
                let pending_at_end = (notify.auto_alert_if_not_arrived && !self.escalated)
                    || (notify.on_delay && !self.delay_notified);
                pending_at_end.then_some(self.session.end_time)
            }
            _ => None,
        }
    }

    /// Move to `target` along allowed edges, returning the edges taken
    pub fn transition_to(
        &mut self,
        target: SessionStatus,
        completion: Option<Completion>,
    ) -> Result<Vec<Transition>, SafeguardError> {
        let path = self.status().path_to(target);
        if path.is_empty() {
            return Err(SafeguardError::invalid_state(format!(
                "session {} cannot go from {} to {}",
                self.id(),
                self.status(),
                target
            )));
        }

        let mut taken = Vec::with_capacity(path.len());
        for next in path {
            taken.push((self.status(), next));
            self.session.status = next;
        }
        if target == SessionStatus::Completed {
            self.completion = completion.or(Some(Completion::Arrived));
        }
        Ok(taken)
    }

    /// Fold in a server record. Record fields are replaced; the status only
    /// moves forward, and the notification policy stays as created.
    pub fn merge_server(&mut self, server: ScheduledSession) -> Vec<Transition> {
        let local_status = self.status();
        let notify = self.session.notify;
        let server_status = server.status;

        self.session = server;
        self.session.notify = notify;
        self.session.status = local_status;

        if server_status == local_status {
            return Vec::new();
        }

        let completion = if self.escalated {
            Completion::Escalated
        } else {
            Completion::Arrived
        };
        self.transition_to(server_status, Some(completion))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use safeguard_api::NotifyPolicy;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 10, 18, 0, 0).unwrap()
    }

    fn session(status: SessionStatus, notify: NotifyPolicy) -> TrackedSession {
        TrackedSession::new(ScheduledSession {
            id: SessionId::new(1),
            session_name: "Walk home".into(),
            start_time: start(),
            end_time: start() + chrono::Duration::minutes(30),
            duration_minutes: 30,
            destination: None,
            notify,
            status,
        })
    }

    fn auto_alert() -> NotifyPolicy {
        NotifyPolicy {
            auto_alert_if_not_arrived: true,
            ..Default::default()
        }
    }

    #[test]
    fn start_due_only_when_scheduled() {
        let s = session(SessionStatus::Scheduled, NotifyPolicy::default());
        assert!(!s.start_due(start() - chrono::Duration::seconds(1)));
        assert!(s.start_due(start()));

        let active = session(SessionStatus::Active, NotifyPolicy::default());
        assert!(!active.start_due(start()));
    }

    #[test]
    fn pending_actions_follow_policy() {
        let mut s = session(SessionStatus::Active, auto_alert());
        assert_eq!(s.pending_action(start()), Some(PendingAction::StartNotice));

        s.start_notified = true;
        assert_eq!(s.pending_action(start()), None);

        let overdue = start() + chrono::Duration::minutes(30);
        assert_eq!(s.pending_action(overdue), Some(PendingAction::Escalation));

        s.escalated = true;
        assert_eq!(s.pending_action(overdue), None);
    }

    #[test]
    fn delay_notice_without_auto_alert() {
        let mut s = session(SessionStatus::Active, NotifyPolicy::default());
        s.start_notified = true;
        let overdue = start() + chrono::Duration::minutes(31);
        assert_eq!(s.pending_action(overdue), Some(PendingAction::DelayNotice));

        s.delay_notified = true;
        assert_eq!(s.pending_action(overdue), None);
        // Stays Active pending manual action
        assert_eq!(s.status(), SessionStatus::Active);
    }

    #[test]
    fn overdue_start_notice_is_skipped() {
        let s = session(
            SessionStatus::Active,
            NotifyPolicy {
                on_delay: false,
                ..Default::default()
            },
        );
        let overdue = start() + chrono::Duration::minutes(45);
        assert_eq!(s.pending_action(overdue), None);
    }

    #[test]
    fn transition_records_edges() {
        let mut s = session(SessionStatus::Scheduled, NotifyPolicy::default());
        let taken = s.transition_to(SessionStatus::Completed, Some(Completion::Arrived)).unwrap();
        assert_eq!(
            taken,
            vec![
                (SessionStatus::Scheduled, SessionStatus::Active),
                (SessionStatus::Active, SessionStatus::Completed)
            ]
        );
        assert_eq!(s.completion, Some(Completion::Arrived));

        assert!(s.transition_to(SessionStatus::Cancelled, None).is_err());
    }

    #[test]
    fn merge_never_moves_backwards() {
        let mut s = session(SessionStatus::Active, NotifyPolicy::default());
        let mut server = s.session.clone();
        server.status = SessionStatus::Scheduled;
        server.session_name = "Renamed".into();

        assert!(s.merge_server(server).is_empty());
        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(s.session.session_name, "Renamed");
    }

    #[test]
    fn merge_keeps_local_policy() {
        let mut s = session(SessionStatus::Scheduled, auto_alert());
        let mut server = s.session.clone();
        server.notify = NotifyPolicy::default();
        s.merge_server(server);
        assert!(s.session.notify.auto_alert_if_not_arrived);
    }

    #[test]
    fn merge_applies_forward_server_status() {
        let mut s = session(SessionStatus::Active, NotifyPolicy::default());
        let mut server = s.session.clone();
        server.status = SessionStatus::Cancelled;
        assert_eq!(
            s.merge_server(server),
            vec![(SessionStatus::Active, SessionStatus::Cancelled)]
        );
    }

    #[test]
    fn next_boundary() {
        let scheduled = session(SessionStatus::Scheduled, NotifyPolicy::default());
        assert_eq!(scheduled.next_boundary(start()), Some(start()));

        let active = session(SessionStatus::Active, auto_alert());
        assert_eq!(
            active.next_boundary(start()),
            Some(start() + chrono::Duration::minutes(30))
        );

        let quiet = session(
            SessionStatus::Active,
            NotifyPolicy {
                on_start: false,
                on_arrival: false,
                on_delay: false,
                auto_alert_if_not_arrived: false,
            },
        );
        assert_eq!(quiet.next_boundary(start()), None);
    }

    #[test]
    fn restored_escalation_completes_locally() {
        let s = session(SessionStatus::Active, auto_alert());
        let mut record = s.record();
        record.escalated = true;

        let restored = TrackedSession::with_record(s.session.clone(), Some(record));
        assert_eq!(restored.status(), SessionStatus::Completed);
        assert_eq!(restored.completion, Some(Completion::Escalated));
        assert_eq!(restored.pending_action(start() + chrono::Duration::hours(1)), None);
    }
}
