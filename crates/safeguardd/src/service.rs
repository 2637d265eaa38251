//! Service wiring and main loop

use anyhow::{Context, Result};
use safeguard_api::{ErrorCode, ErrorInfo, Event, EventPayload, Response};
use safeguard_config::Settings;
use safeguard_core::{
    CoreEvent, Services, SessionEngine, SosController, TimerHandle, TimerService, event_channel,
};
use safeguard_gateway::ReportedLocation;
use safeguard_ipc::{IpcServer, ServerMessage};
use safeguard_store::{AuditEvent, AuditEventType, Store};
use safeguard_util::{ClientId, RateLimiter};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::CommandHandler;

/// Requests allowed per client per second
const RATE_LIMIT_PER_SEC: u32 = 30;

/// The running daemon: engines, timer loop and IPC server
pub struct Service {
    handler: Arc<CommandHandler>,
    sos: SosController,
    sessions: Arc<SessionEngine>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    events: broadcast::Receiver<CoreEvent>,
    timer: TimerHandle,
    rate_limiter: RateLimiter<ClientId>,
}

impl Service {
    /// Build the engines and bind the socket. Must run inside the runtime.
    pub async fn start(
        settings: &Settings,
        services: Services,
        location: ReportedLocation,
        socket_path: &Path,
    ) -> Result<Self> {
        let store = services.store.clone();
        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .context("Failed to write audit log")?;

        let (events_tx, events) = event_channel();

        let sos = SosController::new(settings.sos.clone(), services.clone(), events_tx.clone());
        let sessions = Arc::new(SessionEngine::new(
            settings.sessions.clone(),
            settings.sos.location_timeout,
            services.clone(),
            events_tx,
        ));

        let timer = TimerService::new(
            sessions.clone(),
            services.clock.clone(),
            settings.sessions.tick_interval,
        )
        .spawn();

        let mut ipc = IpcServer::new(socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to bind socket {}", socket_path.display()))?;

        let handler = Arc::new(CommandHandler::new(
            sos.clone(),
            sessions.clone(),
            location,
            store.clone(),
            timer.poker(),
        ));

        Ok(Self {
            handler,
            sos,
            sessions,
            ipc: Arc::new(ipc),
            store,
            events,
            timer,
            rate_limiter: RateLimiter::new(RATE_LIMIT_PER_SEC, Duration::from_secs(1)),
        })
    }

    /// Serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Service {
            handler,
            sos,
            sessions,
            ipc,
            store,
            mut events,
            timer,
            mut rate_limiter,
        } = self;

        let mut messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Pick up sessions created elsewhere before the first evaluation
        tokio::spawn({
            let sessions = sessions.clone();
            let poke = timer.poker();
            async move {
                match sessions.refresh().await {
                    Ok(count) => {
                        info!(count, "Initial session refresh complete");
                        poke.poke();
                    }
                    Err(e) => warn!(error = %e, "Initial session refresh failed"),
                }
            }
        });

        info!("Service running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                Some(msg) = messages.recv() => {
                    handle_ipc_message(&handler, &ipc, &store, &mut rate_limiter, msg).await;
                }

                event = events.recv() => match event {
                    Ok(event) => ipc.broadcast_event(Event::new(event.into())),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event forwarding fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("Shutting down safeguardd");

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        timer.shutdown().await;
        sos.shutdown();

        audit(&store, AuditEventType::ServiceStopped);
        ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }
}

async fn handle_ipc_message(
    handler: &Arc<CommandHandler>,
    ipc: &Arc<IpcServer>,
    store: &Arc<dyn Store>,
    rate_limiter: &mut RateLimiter<ClientId>,
    msg: ServerMessage,
) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            if !rate_limiter.check(&client_id) {
                let response = Response::error(
                    request.request_id,
                    ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                );
                let _ = ipc.send_response(&client_id, response).await;
                return;
            }

            // Backend calls can take a while; keep the loop free
            let handler = handler.clone();
            let ipc = ipc.clone();
            tokio::spawn(async move {
                let response = handler
                    .handle(&client_id, request.request_id, request.command)
                    .await;
                if let Err(e) = ipc.send_response(&client_id, response).await {
                    debug!(client_id = %client_id, error = %e, "Client gone before response");
                }
            });
        }

        ServerMessage::ClientConnected { client_id } => {
            audit(
                store,
                AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                },
            );
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Client disconnected");

            audit(
                store,
                AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                },
            );

            rate_limiter.remove(&client_id);
        }
    }
}

fn audit(store: &Arc<dyn Store>, event: AuditEventType) {
    if let Err(e) = store.append_audit(AuditEvent::new(event)) {
        warn!(error = %e, "Failed to append audit event");
    }
}
