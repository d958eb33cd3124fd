use std::{fmt, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use crate::{Result, message::InboundBatch};

// ── Connection lifecycle ────────────────────────────────────────────────────

/// Connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// Why a connection was closed.
///
/// Status codes follow the WhatsApp Web disconnect codes reported by Baileys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// 401: the device was unlinked from the phone.
    LoggedOut,
    /// 403: the account is banned or the credentials were rejected.
    Forbidden,
    /// 408: the connection timed out or was lost.
    TimedOut,
    /// 428: the server closed the connection.
    ConnectionClosed,
    /// 440: another client opened a session with the same credentials.
    ConnectionReplaced,
    /// 500: the stored session is corrupt.
    BadSession,
    /// 515: the server asked for a restart (normal after pairing).
    RestartRequired,
    /// The link to the transport itself went away.
    TransportLost,
    Unknown(u16),
}

impl DisconnectReason {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            403 => Self::Forbidden,
            408 => Self::TimedOut,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            515 => Self::RestartRequired,
            other => Self::Unknown(other),
        }
    }

    /// Reconnecting cannot succeed without operator action (re-pairing,
    /// unbanning), so the supervisor must stop retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LoggedOut | Self::Forbidden)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => f.write_str("logged out"),
            Self::Forbidden => f.write_str("forbidden"),
            Self::TimedOut => f.write_str("timed out"),
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::ConnectionReplaced => f.write_str("connection replaced"),
            Self::BadSession => f.write_str("bad session"),
            Self::RestartRequired => f.write_str("restart required"),
            Self::TransportLost => f.write_str("transport lost"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// `connection.update` payload. Every field is optional because the
/// transport reports QR codes and state changes independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub qr: Option<String>,
    pub connection: Option<ConnectionState>,
    pub disconnect: Option<DisconnectReason>,
}

impl ConnectionUpdate {
    pub fn qr(code: impl Into<String>) -> Self {
        Self {
            qr: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn open() -> Self {
        Self {
            connection: Some(ConnectionState::Open),
            ..Default::default()
        }
    }

    pub fn closed(reason: DisconnectReason) -> Self {
        Self {
            connection: Some(ConnectionState::Closed),
            disconnect: Some(reason),
            ..Default::default()
        }
    }
}

/// Opaque credential blob. Its format belongs to the transport.
pub type Credentials = serde_json::Value;

/// Everything a transport can emit while a session is alive.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connection(ConnectionUpdate),
    CredsUpdate(Credentials),
    Messages(InboundBatch),
}

// ── Session options ─────────────────────────────────────────────────────────

/// Device identity presented to the network: `[platform, browser, version]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserIdentity {
    pub platform: String,
    pub browser: String,
    pub version: String,
}

impl Default for BrowserIdentity {
    fn default() -> Self {
        Self {
            platform: "MacOS".into(),
            browser: "Safari".into(),
            version: "14.0".into(),
        }
    }
}

/// Fixed options every session is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub browser: BrowserIdentity,
    pub sync_full_history: bool,
    pub connect_timeout: Duration,
    pub default_query_timeout: Duration,
    pub emit_own_events: bool,
    pub mark_online_on_connect: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            browser: BrowserIdentity::default(),
            sync_full_history: false,
            connect_timeout: Duration::from_secs(60),
            default_query_timeout: Duration::from_secs(60),
            emit_own_events: true,
            mark_online_on_connect: true,
        }
    }
}

// ── Transport traits ────────────────────────────────────────────────────────

/// Receiver for a session's event stream. The stream ending means the
/// transport link is gone.
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Sender half handed to transport implementations.
pub type EventSender = mpsc::Sender<TransportEvent>;

/// A live connection: its event stream plus the handle used to send.
pub struct Connection {
    pub events: EventReceiver,
    pub outbound: Arc<dyn TransportOutbound>,
}

/// Acknowledgement for a delivered message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Opens connections to the messaging network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection with the given options and stored credentials.
    async fn connect(
        &self,
        options: &SessionOptions,
        credentials: Option<Credentials>,
    ) -> Result<Connection>;
}

/// Sends messages over one connection.
#[async_trait]
pub trait TransportOutbound: Send + Sync {
    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt>;

    /// Tear the connection down. Idempotent.
    async fn close(&self) {}
}

/// Produces the reply text for an accepted message.
///
/// Implementations absorb their own failures; whatever they return is sent.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, text: &str) -> String;
}
