//! IPC command dispatch

use safeguard_api::{Command, ErrorInfo, HealthStatus, Response, ResponsePayload};
use safeguard_core::{SessionEngine, SosController, TimerPoke};
use safeguard_gateway::ReportedLocation;
use safeguard_store::Store;
use safeguard_util::{ClientId, SafeguardError};
use std::sync::Arc;
use tracing::{debug, info};

/// Maps protocol commands onto the engines
pub struct CommandHandler {
    sos: SosController,
    sessions: Arc<SessionEngine>,
    location: ReportedLocation,
    store: Arc<dyn Store>,
    timer: TimerPoke,
}

impl CommandHandler {
    pub fn new(
        sos: SosController,
        sessions: Arc<SessionEngine>,
        location: ReportedLocation,
        store: Arc<dyn Store>,
        timer: TimerPoke,
    ) -> Self {
        Self {
            sos,
            sessions,
            location,
            store,
            timer,
        }
    }

    pub async fn handle(&self, client_id: &ClientId, request_id: u64, command: Command) -> Response {
        match self.execute(client_id, command).await {
            Ok(payload) => Response::success(request_id, payload),
            Err(e) => {
                debug!(client_id = %client_id, request_id, error = %e, "Command failed");
                Response::error(request_id, ErrorInfo::from(&e))
            }
        }
    }

    async fn execute(
        &self,
        client_id: &ClientId,
        command: Command,
    ) -> Result<ResponsePayload, SafeguardError> {
        match command {
            Command::GetSosState => Ok(ResponsePayload::Sos(self.sos.snapshot())),

            Command::TriggerSos => {
                info!(client_id = %client_id, "SOS requested");
                self.sos.trigger().map(ResponsePayload::Sos)
            }

            Command::CancelSos => Ok(ResponsePayload::Sos(self.sos.cancel())),

            Command::ReportLocation { location } => {
                self.location
                    .report(location)
                    .map_err(|_| SafeguardError::validation("Coordinates out of range"))?;
                self.sos.report_location(location)?;
                Ok(ResponsePayload::LocationAccepted)
            }

            Command::ListSessions => Ok(ResponsePayload::Sessions(self.sessions.sessions().await)),

            Command::CreateSession { request } => {
                let view = self.sessions.create_session(request).await?;
                self.timer.poke();
                Ok(ResponsePayload::Session(view))
            }

            Command::MarkArrived { session_id } => self
                .sessions
                .mark_arrived(session_id)
                .await
                .map(ResponsePayload::Session),

            Command::CancelSession { session_id } => self
                .sessions
                .cancel_session(session_id)
                .await
                .map(ResponsePayload::Session),

            Command::RefreshSessions => {
                self.sessions.refresh().await?;
                self.timer.poke();
                Ok(ResponsePayload::Sessions(self.sessions.sessions().await))
            }

            Command::SubscribeEvents => Ok(ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            }),

            Command::GetHealth => Ok(ResponsePayload::Health(HealthStatus {
                live: true,
                store_ok: self.store.is_healthy(),
                session_count: self.sessions.session_count().await,
            })),

            Command::Ping => Ok(ResponsePayload::Pong),
        }
    }
}
