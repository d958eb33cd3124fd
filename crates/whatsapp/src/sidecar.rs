//! WebSocket link to the Baileys sidecar.
//!
//! One WebSocket per session: the `login` frame opens a Baileys socket on
//! the sidecar, closing the WebSocket tears it down again.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{
        SinkExt, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    tokio::{
        net::TcpStream,
        sync::{mpsc, oneshot},
    },
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{self, Message},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use wabridge_channels::{
    Connection, Credentials, Error, EventSender, Result, SendReceipt, SessionOptions, Transport,
    TransportEvent, TransportOutbound,
};

use crate::types::{GatewayMessage, SidecarMessage, WireConnection, connection_update, inbound_batch};

pub use wabridge_config::DEFAULT_SIDECAR_PORT;

/// Events buffered between the link task and the session loop.
const EVENT_BUFFER: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
struct SendOutcome {
    success: bool,
    message_id: Option<String>,
    error: Option<String>,
}

type PendingSends = Arc<Mutex<HashMap<String, oneshot::Sender<SendOutcome>>>>;

fn lock_pending(
    pending: &PendingSends,
) -> MutexGuard<'_, HashMap<String, oneshot::Sender<SendOutcome>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// [`Transport`] backed by a Baileys sidecar process.
#[derive(Debug, Clone)]
pub struct SidecarTransport {
    url: String,
}

impl SidecarTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn open_link(&self, timeout: Duration) -> Result<WsStream> {
        debug!(url = %self.url, "connecting to sidecar");
        match tokio::time::timeout(timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e @ (tungstenite::Error::Url(_) | tungstenite::Error::HttpFormat(_)))) => {
                Err(Error::invalid_input(format!(
                    "bad sidecar url {}: {e}",
                    self.url
                )))
            },
            Ok(Err(e)) => Err(Error::external(
                format!("connecting to sidecar at {}", self.url),
                e,
            )),
            Err(_) => Err(Error::unavailable(format!(
                "sidecar at {} did not answer within {}s",
                self.url,
                timeout.as_secs()
            ))),
        }
    }

    /// Log in with `credentials`, then unlink the device. Resolves once the
    /// sidecar reports the socket closed.
    pub async fn logout(&self, options: &SessionOptions, credentials: Credentials) -> Result<()> {
        let mut ws = self.open_link(options.connect_timeout).await?;
        for frame in [
            GatewayMessage::Login {
                options: options.into(),
                credentials: Some(credentials),
            },
            GatewayMessage::Logout,
        ] {
            ws.send(Message::Text(serde_json::to_string(&frame)?.into()))
                .await
                .map_err(|e| Error::external("sending logout", e))?;
        }

        let outcome = tokio::time::timeout(options.default_query_timeout, async {
            while let Some(msg) = ws.next().await {
                let Ok(Message::Text(text)) = msg else {
                    continue;
                };
                match serde_json::from_str::<SidecarMessage>(&text) {
                    Ok(SidecarMessage::ConnectionUpdate {
                        connection: Some(WireConnection::Close),
                        ..
                    }) => return Ok(()),
                    Ok(SidecarMessage::Error { error }) => return Err(Error::unavailable(error)),
                    _ => {},
                }
            }
            Err(Error::unavailable("sidecar closed the link during logout"))
        })
        .await
        .unwrap_or_else(|_| Err(Error::unavailable("logout was not confirmed in time")));

        let _ = ws.send(Message::Close(None)).await;
        if outcome.is_ok() {
            info!(url = %self.url, "device unlinked");
        }
        outcome
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(
        &self,
        options: &SessionOptions,
        credentials: Option<Credentials>,
    ) -> Result<Connection> {
        let ws = self.open_link(options.connect_timeout).await?;
        let (mut sink, stream) = ws.split();

        let login = GatewayMessage::Login {
            options: options.into(),
            credentials,
        };
        sink.send(Message::Text(serde_json::to_string(&login)?.into()))
            .await
            .map_err(|e| Error::external("sending login", e))?;
        info!(url = %self.url, "login sent to sidecar");

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let pending: PendingSends = Arc::default();
        let closed = CancellationToken::new();

        tokio::spawn(run_link(
            sink,
            stream,
            write_rx,
            event_tx,
            Arc::clone(&pending),
            closed.clone(),
        ));

        Ok(Connection {
            events: event_rx,
            outbound: Arc::new(SidecarOutbound {
                write_tx,
                pending,
                query_timeout: options.default_query_timeout,
                closed,
            }),
        })
    }
}

/// Sends over one sidecar link and waits for the matching `send_result`.
pub struct SidecarOutbound {
    write_tx: mpsc::UnboundedSender<GatewayMessage>,
    pending: PendingSends,
    query_timeout: Duration,
    closed: CancellationToken,
}

#[async_trait]
impl TransportOutbound for SidecarOutbound {
    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(request_id.clone(), tx);

        let frame = GatewayMessage::SendText {
            request_id: request_id.clone(),
            to: to.to_string(),
            text: text.to_string(),
        };
        if self.closed.is_cancelled() || self.write_tx.send(frame).is_err() {
            lock_pending(&self.pending).remove(&request_id);
            return Err(Error::unavailable("sidecar link is closed"));
        }

        match tokio::time::timeout(self.query_timeout, rx).await {
            Ok(Ok(SendOutcome {
                success: true,
                message_id,
                ..
            })) => Ok(SendReceipt { message_id }),
            Ok(Ok(SendOutcome { error, .. })) => Err(Error::send(
                to,
                error.unwrap_or_else(|| "sidecar reported failure".into()),
            )),
            Ok(Err(_)) => Err(Error::unavailable(
                "sidecar link closed before the send was acknowledged",
            )),
            Err(_) => {
                lock_pending(&self.pending).remove(&request_id);
                Err(Error::send(
                    to,
                    format!(
                        "no acknowledgement within {}s",
                        self.query_timeout.as_secs()
                    ),
                ))
            },
        }
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

async fn run_link(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    mut write_rx: mpsc::UnboundedReceiver<GatewayMessage>,
    events: EventSender,
    pending: PendingSends,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = closed.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            },
            frame = write_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to encode sidecar frame");
                        continue;
                    },
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    warn!(error = %e, "failed to write to sidecar");
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !handle_frame(&text, &events, &pending).await {
                        break;
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if sink.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!("sidecar closed the link");
                    break;
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    warn!(error = %e, "sidecar link error");
                    break;
                },
            },
        }
    }

    closed.cancel();
    // Wakes every waiting send with a closed-link error.
    lock_pending(&pending).clear();
}

/// Route one inbound frame. Returns `false` once nobody listens for events.
async fn handle_frame(text: &str, events: &EventSender, pending: &PendingSends) -> bool {
    let msg: SidecarMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "ignoring unrecognised sidecar frame");
            return true;
        },
    };

    let event = match msg {
        SidecarMessage::ConnectionUpdate {
            qr,
            connection,
            status_code,
        } => TransportEvent::Connection(connection_update(qr, connection, status_code)),
        SidecarMessage::CredsUpdate { credentials } => TransportEvent::CredsUpdate(credentials),
        SidecarMessage::MessagesUpsert { messages } => {
            TransportEvent::Messages(inbound_batch(messages))
        },
        SidecarMessage::SendResult {
            request_id,
            success,
            message_id,
            error,
        } => {
            let waiter = lock_pending(pending).remove(&request_id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(SendOutcome {
                        success,
                        message_id,
                        error,
                    });
                },
                None => debug!(request_id, "send result for unknown request"),
            }
            return true;
        },
        SidecarMessage::Error { error } => {
            warn!(error, "sidecar error");
            return true;
        },
    };

    events.send(event).await.is_ok()
}
