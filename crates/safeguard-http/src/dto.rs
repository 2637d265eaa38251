//! Wire DTOs for the REST backend (camelCase JSON)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use safeguard_api::{
    AlertKind, AlertPayload, Coordinates, Destination, DispatchReceipt, NotifyPolicy,
    ScheduledSession, SessionRequest, SessionStatus,
};
use safeguard_gateway::{GatewayError, GatewayResult};
use safeguard_util::SessionId;
use serde::{Deserialize, Serialize};

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a backend timestamp: RFC 3339, or zone-less local time
/// (`2025-01-01T10:00` / `2025-01-01T10:00:00[.fff]`).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Zone-less local timestamp, as the backend expects for `startTime`
pub fn format_local_timestamp(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format(LOCAL_FORMAT).to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSharingRequest {
    pub session_name: String,
    pub start_time: String,
    pub duration_minutes: u32,
    pub update_interval_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_longitude: Option<f64>,
    pub notify_contacts_on_start: bool,
    pub notify_contacts_on_arrival: bool,
    pub notify_contacts_on_delay: bool,
    pub auto_alert_if_not_arrived: bool,
}

impl ScheduledSharingRequest {
    pub fn from_request(request: &SessionRequest, default_interval: u32) -> Self {
        let coords = request.destination.as_ref().and_then(|d| d.coordinates);
        Self {
            session_name: request.session_name.trim().to_string(),
            start_time: format_local_timestamp(&request.start_time),
            duration_minutes: request.duration_minutes,
            update_interval_seconds: request.update_interval_seconds.unwrap_or(default_interval),
            destination_address: request.destination.as_ref().map(|d| d.address.clone()),
            destination_latitude: coords.map(|c| c.latitude),
            destination_longitude: coords.map(|c| c.longitude),
            notify_contacts_on_start: request.notify.on_start,
            notify_contacts_on_arrival: request.notify.on_arrival,
            notify_contacts_on_delay: request.notify.on_delay,
            auto_alert_if_not_arrived: request.notify.auto_alert_if_not_arrived,
        }
    }
}

/// Session record as returned by the backend; most fields are optional
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSharingResponse {
    pub id: Option<i64>,
    pub session_name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_minutes: Option<u32>,
    pub status: Option<String>,
    pub destination_address: Option<String>,
    pub destination_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    pub notify_contacts_on_start: Option<bool>,
    pub notify_contacts_on_arrival: Option<bool>,
    pub notify_contacts_on_delay: Option<bool>,
    pub auto_alert_if_not_arrived: Option<bool>,
}

impl ScheduledSharingResponse {
    /// Convert into the domain record; missing policy flags take defaults
    pub fn into_session(self) -> GatewayResult<ScheduledSession> {
        let id = self
            .id
            .map(SessionId::new)
            .ok_or_else(|| GatewayError::Decode("session without id".into()))?;

        let start_time = self
            .start_time
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| GatewayError::Decode(format!("session {id}: bad startTime")))?;

        let status_raw = self.status.unwrap_or_default();
        let status = SessionStatus::from_wire(&status_raw)
            .ok_or_else(|| GatewayError::Decode(format!("session {id}: status '{status_raw}'")))?;

        let end_from_wire = self.end_time.as_deref().and_then(parse_timestamp);
        let duration_minutes = match (self.duration_minutes, end_from_wire) {
            (Some(minutes), _) => minutes,
            (None, Some(end)) => u32::try_from((end - start_time).num_minutes()).unwrap_or(0),
            (None, None) => {
                return Err(GatewayError::Decode(format!(
                    "session {id}: neither durationMinutes nor endTime"
                )));
            }
        };
        let end_time = end_from_wire
            .unwrap_or_else(|| ScheduledSession::computed_end_time(start_time, duration_minutes));

        let defaults = NotifyPolicy::default();
        let notify = NotifyPolicy {
            on_start: self.notify_contacts_on_start.unwrap_or(defaults.on_start),
            on_arrival: self.notify_contacts_on_arrival.unwrap_or(defaults.on_arrival),
            on_delay: self.notify_contacts_on_delay.unwrap_or(defaults.on_delay),
            auto_alert_if_not_arrived: self
                .auto_alert_if_not_arrived
                .unwrap_or(defaults.auto_alert_if_not_arrived),
        };

        let coordinates = match (self.destination_latitude, self.destination_longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        };
        let destination = self
            .destination_address
            .filter(|a| !a.trim().is_empty())
            .map(|address| Destination {
                address,
                coordinates,
            });

        Ok(ScheduledSession {
            id,
            session_name: self.session_name.unwrap_or_default(),
            start_time,
            end_time,
            duration_minutes,
            destination,
            notify,
            status,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlertRequest {
    pub alert_message: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_address: Option<String>,
    pub alert_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
}

impl EmergencyAlertRequest {
    pub fn new(kind: AlertKind, payload: &AlertPayload) -> Self {
        Self {
            alert_message: payload.message.clone(),
            latitude: payload.location.map(|c| c.latitude),
            longitude: payload.location.map(|c| c.longitude),
            location_address: None,
            alert_type: kind.as_wire().to_string(),
            session_id: payload.session_id.map(|id| id.get()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlertResponse {
    pub id: Option<i64>,
    pub alert_status: Option<String>,
    pub contacts_notified_count: Option<u32>,
    pub message: Option<String>,
}

impl EmergencyAlertResponse {
    pub fn receipt(&self) -> DispatchReceipt {
        DispatchReceipt {
            contacts_notified: self.contacts_notified_count.unwrap_or(0),
        }
    }
}

/// Error body shapes seen from the backend
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Best human-readable text out of an error response body
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed
            .message
            .or(parsed.error)
            .unwrap_or_else(|| body.trim().to_string()),
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_local() {
        let utc = parse_timestamp("2025-01-01T10:00:00Z").unwrap();
        assert_eq!(utc.to_rfc3339(), "2025-01-01T10:00:00+00:00");

        let local = parse_timestamp("2025-01-01T10:00:00").unwrap();
        assert_eq!(
            local.with_timezone(&Local).format(LOCAL_FORMAT).to_string(),
            "2025-01-01T10:00:00"
        );

        assert!(parse_timestamp("2025-01-01T10:00").is_some());
        assert!(parse_timestamp("2025-01-01T10:00:00.123").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn local_timestamp_roundtrips() {
        let now = Utc::now();
        let wire = format_local_timestamp(&now);
        let back = parse_timestamp(&wire).unwrap();
        assert!((now - back).num_seconds().abs() <= 1);
    }

    #[test]
    fn response_converts() {
        let json = r#"{
            "id": 17,
            "sessionName": "Night bus",
            "startTime": "2025-03-01T22:00:00Z",
            "endTime": "2025-03-01T22:45:00Z",
            "durationMinutes": 45,
            "status": "ACTIVE",
            "destinationAddress": "12 Elm St",
            "destinationLatitude": 51.5,
            "destinationLongitude": -0.12,
            "notifyContactsOnStart": false,
            "notifyContactsOnArrival": true
        }"#;
        let dto: ScheduledSharingResponse = serde_json::from_str(json).unwrap();
        let session = dto.into_session().unwrap();

        assert_eq!(session.id, SessionId::new(17));
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.duration_minutes, 45);
        assert!(!session.notify.on_start);
        // Absent flags fall back to defaults
        assert!(session.notify.on_delay);
        assert!(!session.notify.auto_alert_if_not_arrived);
        let destination = session.destination.unwrap();
        assert_eq!(destination.coordinates, Some(Coordinates::new(51.5, -0.12)));
    }

    #[test]
    fn response_end_time_derived() {
        let json = r#"{"id": 1, "startTime": "2025-03-01T22:00:00Z",
                       "durationMinutes": 30, "status": "SCHEDULED"}"#;
        let dto: ScheduledSharingResponse = serde_json::from_str(json).unwrap();
        let session = dto.into_session().unwrap();
        assert_eq!(session.end_time - session.start_time, chrono::Duration::minutes(30));
        assert!(session.destination.is_none());
    }

    #[test]
    fn response_without_id_rejected() {
        let json = r#"{"startTime": "2025-03-01T22:00:00Z", "durationMinutes": 30, "status": "ACTIVE"}"#;
        let dto: ScheduledSharingResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(dto.into_session(), Err(GatewayError::Decode(_))));
    }

    #[test]
    fn alert_request_shape() {
        let payload = AlertPayload {
            message: "EMERGENCY! I need immediate help!".into(),
            location: None,
            session_id: None,
        };
        let body = serde_json::to_value(EmergencyAlertRequest::new(AlertKind::Sos, &payload)).unwrap();
        assert_eq!(body["alertType"], "SOS");
        assert_eq!(body["alertMessage"], "EMERGENCY! I need immediate help!");
        assert!(body["latitude"].is_null());
        assert!(body.get("sessionId").is_none());
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"No emergency contacts found"}"#), "No emergency contacts found");
        assert_eq!(error_message(r#"{"error":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(error_message("plain text\n"), "plain text");
    }
}
