//! safeguardctl - command-line client for safeguardd

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use safeguard_api::{
    Command, Coordinates, Destination, EventPayload, NotifyPolicy, ResponsePayload, SessionRequest,
    SessionView, SosSnapshot,
};
use safeguard_ipc::IpcClient;
use safeguard_util::{SessionId, default_socket_path, format_local};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "safeguardctl")]
#[command(about = "Control the safeguardd service", long_about = None)]
struct Args {
    /// Socket path (or set SAFEGUARD_SOCKET env var)
    #[arg(short, long, env = "SAFEGUARD_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show the SOS state
    Status,

    /// Start the SOS countdown
    Sos,

    /// Cancel a running SOS countdown
    Cancel,

    /// Report the device position
    Locate { latitude: f64, longitude: f64 },

    /// List scheduled sessions
    Sessions {
        /// Re-fetch from the backend first
        #[arg(long)]
        refresh: bool,
    },

    /// Schedule a location-sharing session
    Schedule {
        name: String,

        /// Local start time, `YYYY-MM-DD HH:MM`
        #[arg(long)]
        start: String,

        #[arg(long, default_value_t = 30)]
        minutes: u32,

        #[arg(long)]
        destination: Option<String>,

        /// Alert contacts automatically if not marked arrived in time
        #[arg(long)]
        auto_alert: bool,

        #[arg(long)]
        no_start_notice: bool,

        #[arg(long)]
        no_delay_notice: bool,
    },

    /// Mark a session arrived
    Arrived { session_id: SessionId },

    /// Cancel a session
    Drop { session_id: SessionId },

    /// Stream events until interrupted
    Watch,

    Health,

    Ping,
}

fn parse_local_time(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .with_context(|| format!("Invalid start time {raw:?}, expected YYYY-MM-DD HH:MM"))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .context("Ambiguous local time")
}

fn print_sos(snapshot: &SosSnapshot) {
    println!("SOS: {:?}", snapshot.status);
    if snapshot.countdown_remaining > 0 {
        println!("  Countdown: {}s", snapshot.countdown_remaining);
    }
    if let Some(location) = snapshot.location {
        println!("  Location: {location}");
    }
    if let Some(message) = &snapshot.message {
        println!("  {message}");
    }
}

fn print_session(view: &SessionView) {
    let s = &view.session;
    let completion = view
        .completion
        .map(|c| format!(" ({c:?})"))
        .unwrap_or_default();
    println!(
        "#{} {:<20} {} -> {}  {}{}",
        s.id,
        s.session_name,
        format_local(&s.start_time),
        format_local(&s.end_time),
        s.status,
        completion
    );
}

fn print_payload(payload: &ResponsePayload) {
    match payload {
        ResponsePayload::Sos(snapshot) => print_sos(snapshot),
        ResponsePayload::Sessions(views) if views.is_empty() => println!("No sessions"),
        ResponsePayload::Sessions(views) => views.iter().for_each(print_session),
        ResponsePayload::Session(view) => print_session(view),
        ResponsePayload::LocationAccepted => println!("Location accepted"),
        ResponsePayload::Subscribed { client_id } => println!("Subscribed as {client_id}"),
        ResponsePayload::Health(health) => println!(
            "live={} store_ok={} sessions={}",
            health.live, health.store_ok, health.session_count
        ),
        ResponsePayload::Pong => println!("pong"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut client = IpcClient::connect(&args.socket)
        .await
        .with_context(|| format!("Failed to connect to {}", args.socket.display()))?;

    let command = match args.command {
        Cmd::Status => Command::GetSosState,
        Cmd::Sos => Command::TriggerSos,
        Cmd::Cancel => Command::CancelSos,
        Cmd::Locate {
            latitude,
            longitude,
        } => Command::ReportLocation {
            location: Coordinates::new(latitude, longitude),
        },
        Cmd::Sessions { refresh: true } => Command::RefreshSessions,
        Cmd::Sessions { refresh: false } => Command::ListSessions,
        Cmd::Schedule {
            name,
            start,
            minutes,
            destination,
            auto_alert,
            no_start_notice,
            no_delay_notice,
        } => Command::CreateSession {
            request: SessionRequest {
                session_name: name,
                start_time: parse_local_time(&start)?,
                duration_minutes: minutes,
                destination: destination.map(|address| Destination {
                    address,
                    coordinates: None,
                }),
                notify: NotifyPolicy {
                    on_start: !no_start_notice,
                    on_delay: !no_delay_notice,
                    auto_alert_if_not_arrived: auto_alert,
                    ..Default::default()
                },
                update_interval_seconds: None,
            },
        },
        Cmd::Arrived { session_id } => Command::MarkArrived { session_id },
        Cmd::Drop { session_id } => Command::CancelSession { session_id },
        Cmd::Watch => {
            let mut events = client.subscribe().await?;
            loop {
                let event = events.next().await?;
                if matches!(event.payload, EventPayload::Shutdown) {
                    println!("safeguardd is shutting down");
                    return Ok(());
                }
                println!("{} {}", format_local(&event.timestamp), serde_json::to_string(&event.payload)?);
            }
        }
        Cmd::Health => Command::GetHealth,
        Cmd::Ping => Command::Ping,
    };

    let payload = client.request(command).await?;
    print_payload(&payload);
    Ok(())
}
