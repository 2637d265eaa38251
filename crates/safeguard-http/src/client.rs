//! reqwest-backed backend client

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use safeguard_api::{AlertKind, AlertPayload, DispatchReceipt, ScheduledSession, SessionRequest};
use safeguard_gateway::{
    AlertGateway, CredentialProvider, GatewayError, GatewayResult, SessionBackend,
};
use safeguard_util::SessionId;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classify::{classify_status, classify_transport};
use crate::dto::{
    EmergencyAlertRequest, EmergencyAlertResponse, ScheduledSharingRequest,
    ScheduledSharingResponse,
};

const SHARING_PATH: &str = "api/location/scheduled-sharing";
const ALERTS_PATH: &str = "api/emergency/alerts";

/// Backend client implementing both the alert gateway and the session backend
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    update_interval_seconds: u32,
}

impl HttpBackend {
    /// `base_url` is joined with relative API paths; a missing trailing `/`
    /// is added.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to create HTTP client: {e}")))?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            credentials,
            update_interval_seconds: 30,
        })
    }

    /// Location cadence sent when a request does not specify one
    pub fn with_update_interval(mut self, seconds: u32) -> Self {
        self.update_interval_seconds = seconds;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> GatewayResult<T> {
        let token = self.credentials.bearer_token().await?;
        let url = self.url(path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        debug!(method = %method, url = %url, "Backend request");

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Backend unreachable");
            classify_transport(&e)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            let err = classify_status(status.as_u16(), &text);
            warn!(url = %url, status = status.as_u16(), error = %err, "Backend request failed");
            return Err(err);
        }

        let body = if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            "null"
        } else {
            text.as_str()
        };
        serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn session_action(&self, session_id: SessionId, action: &str) -> GatewayResult<ScheduledSession> {
        let path = format!("{SHARING_PATH}/{session_id}/{action}");
        let dto: ScheduledSharingResponse = self.send(Method::PUT, &path, None).await?;
        dto.into_session()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> GatewayResult<String> {
    serde_json::to_string(value).map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl AlertGateway for HttpBackend {
    async fn dispatch(
        &self,
        kind: AlertKind,
        payload: &AlertPayload,
    ) -> GatewayResult<DispatchReceipt> {
        let body = to_json(&EmergencyAlertRequest::new(kind, payload))?;
        let response: EmergencyAlertResponse =
            self.send(Method::POST, ALERTS_PATH, Some(body)).await?;

        let receipt = response.receipt();
        info!(
            kind = %kind,
            alert_id = ?response.id,
            status = ?response.alert_status,
            contacts = receipt.contacts_notified,
            "Alert dispatched"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn create_session(&self, request: &SessionRequest) -> GatewayResult<ScheduledSession> {
        let dto = ScheduledSharingRequest::from_request(request, self.update_interval_seconds);
        let body = to_json(&dto)?;
        let response: ScheduledSharingResponse =
            self.send(Method::POST, SHARING_PATH, Some(body)).await?;
        response.into_session()
    }

    async fn mark_arrived(&self, session_id: SessionId) -> GatewayResult<ScheduledSession> {
        self.session_action(session_id, "arrived").await
    }

    async fn cancel_session(&self, session_id: SessionId) -> GatewayResult<ScheduledSession> {
        self.session_action(session_id, "cancel").await
    }

    async fn list_sessions(&self) -> GatewayResult<Vec<ScheduledSession>> {
        let response: Option<Vec<ScheduledSharingResponse>> =
            self.send(Method::GET, SHARING_PATH, None).await?;

        let mut sessions = Vec::new();
        for dto in response.unwrap_or_default() {
            match dto.into_session() {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(error = %e, "Skipping malformed session record"),
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticCredentials;
    use safeguard_api::SessionStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned HTTP response; yields the raw request text
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    fn backend(url: String) -> HttpBackend {
        HttpBackend::new(
            url,
            Duration::from_secs(5),
            Arc::new(StaticCredentials::new("secret-token")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn dispatch_posts_alert() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"id": 5, "alertStatus": "SENT", "contactsNotifiedCount": 2}"#,
        )
        .await;

        let payload = AlertPayload {
            message: "help".into(),
            location: Some(safeguard_api::Coordinates::new(1.5, 2.5)),
            session_id: None,
        };
        let receipt = backend(url).dispatch(AlertKind::Sos, &payload).await.unwrap();
        assert_eq!(receipt.contacts_notified, 2);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/emergency/alerts"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret-token"));
        assert!(request.contains(r#""alertType":"SOS""#));
        assert!(request.contains(r#""latitude":1.5"#));
    }

    #[tokio::test]
    async fn no_contacts_is_classified() {
        let (url, _server) = serve_once(
            "400 Bad Request",
            r#"{"message": "No emergency contacts found"}"#,
        )
        .await;

        let payload = AlertPayload {
            message: "help".into(),
            location: None,
            session_id: None,
        };
        let err = backend(url).dispatch(AlertKind::Sos, &payload).await.unwrap_err();
        assert_eq!(err, GatewayError::NoContacts);
    }

    #[tokio::test]
    async fn mark_arrived_puts_to_session_path() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"id": 8, "sessionName": "Run", "startTime": "2025-05-01T07:00:00Z",
                "durationMinutes": 40, "status": "COMPLETED"}"#,
        )
        .await;

        let session = backend(url).mark_arrived(SessionId::new(8)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /api/location/scheduled-sharing/8/arrived"));
    }

    #[tokio::test]
    async fn expired_token_is_classified() {
        let (url, _server) = serve_once("401 Unauthorized", "").await;
        let err = backend(url).list_sessions().await.unwrap_err();
        assert_eq!(err, GatewayError::AuthExpired);
    }

    #[tokio::test]
    async fn list_skips_malformed_records() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"[{"id": 1, "startTime": "2025-05-01T07:00:00Z", "durationMinutes": 10, "status": "SCHEDULED"},
                {"sessionName": "broken"}]"#,
        )
        .await;
        let sessions = backend(url).list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = backend(format!("http://{addr}")).list_sessions().await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(_) | GatewayError::Timeout));
    }
}
