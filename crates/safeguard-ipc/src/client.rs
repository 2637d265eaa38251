//! IPC client implementation

use safeguard_api::{Command, Event, Request, Response, ResponsePayload, ResponseResult};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::{IpcError, IpcResult};

/// Anything safeguardd writes on a connection
#[derive(Deserialize)]
#[serde(untagged)]
enum Incoming {
    Response(Response),
    Event(Event),
}

/// Reads NDJSON lines from the daemon
struct LineReader {
    inner: BufReader<OwnedReadHalf>,
    line: String,
}

impl LineReader {
    async fn next(&mut self) -> IpcResult<Incoming> {
        self.line.clear();
        if self.inner.read_line(&mut self.line).await? == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        Ok(serde_json::from_str(self.line.trim())?)
    }
}

/// IPC Client for connecting to safeguardd
pub struct IpcClient {
    reader: LineReader,
    writer: OwnedWriteHalf,
    next_request_id: u64,
    /// Events that arrived while waiting for a response
    pending: VecDeque<Event>,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: LineReader {
                inner: BufReader::new(read_half),
                line: String::new(),
            },
            writer: write_half,
            next_request_id: 1,
            pending: VecDeque::new(),
        })
    }

    /// Send a command and wait for the matching response.
    ///
    /// Responses are matched on request id. Id 0 is what the daemon uses
    /// when it cannot parse a line at all.
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut json = serde_json::to_string(&Request::new(request_id, command))?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;

        loop {
            match self.reader.next().await? {
                Incoming::Response(response)
                    if response.request_id == request_id || response.request_id == 0 =>
                {
                    return Ok(response);
                }
                Incoming::Response(stale) => {
                    tracing::debug!(request_id = stale.request_id, "Dropping stale response");
                }
                Incoming::Event(event) => self.pending.push_back(event),
            }
        }
    }

    /// Like `send`, with error responses turned into `IpcError::Rejected`
    pub async fn request(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(e) => Err(IpcError::Rejected {
                code: e.code,
                message: e.message,
            }),
        }
    }

    /// Subscribe to events and consume this client to return an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        self.request(Command::SubscribeEvents).await?;

        Ok(EventStream {
            reader: self.reader,
            pending: self.pending,
        })
    }
}

/// Stream of events from safeguardd
pub struct EventStream {
    reader: LineReader,
    pending: VecDeque<Event>,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        loop {
            match self.reader.next().await? {
                Incoming::Event(event) => return Ok(event),
                Incoming::Response(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeguard_api::EventPayload;
    use tokio::net::UnixListener;

    /// Accepts one connection and answers the first request after pushing
    /// an event ahead of the response
    async fn event_first_server(path: std::path::PathBuf) {
        let listener = UnixListener::bind(&path).unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let line = lines.next_line().await.unwrap().unwrap();
        let request: Request = serde_json::from_str(&line).unwrap();

        let event = Event::new(EventPayload::Shutdown);
        let response = Response::success(
            request.request_id,
            ResponsePayload::Subscribed {
                client_id: safeguard_util::ClientId::new(),
            },
        );
        for out in [
            serde_json::to_string(&event).unwrap(),
            serde_json::to_string(&response).unwrap(),
        ] {
            write_half.write_all(out.as_bytes()).await.unwrap();
            write_half.write_all(b"\n").await.unwrap();
        }

        // Hold the connection open until the client goes away
        let _ = lines.next_line().await;
    }

    #[tokio::test]
    async fn event_before_response_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let server = tokio::spawn(event_first_server(path.clone()));

        let mut client = None;
        for _ in 0..50 {
            if let Ok(c) = IpcClient::connect(&path).await {
                client = Some(c);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let mut events = client.unwrap().subscribe().await.unwrap();
        let event = events.next().await.unwrap();
        assert!(matches!(event.payload, EventPayload::Shutdown));

        drop(events);
        server.await.unwrap();
    }
}
