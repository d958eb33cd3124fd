//! JSON frames exchanged with the Baileys sidecar over WebSocket.

use serde::{Deserialize, Serialize};

use wabridge_channels::{
    ConnectionState, ConnectionUpdate, Credentials, DisconnectReason, InboundBatch,
    MessagePayload, RawMessage, SessionOptions,
};

// ── Gateway → sidecar ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Open a Baileys socket with these options.
    Login {
        options: LoginOptions,
        #[serde(skip_serializing_if = "Option::is_none")]
        credentials: Option<Credentials>,
    },
    SendText {
        request_id: String,
        to: String,
        text: String,
    },
    /// Unlink the device and drop its credentials on the sidecar side.
    Logout,
}

/// Socket options, named the way Baileys' `makeWASocket` expects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOptions {
    pub browser: [String; 3],
    pub sync_full_history: bool,
    pub connect_timeout_ms: u64,
    pub default_query_timeout_ms: u64,
    pub emit_own_events: bool,
    pub mark_online_on_connect: bool,
}

impl From<&SessionOptions> for LoginOptions {
    fn from(opts: &SessionOptions) -> Self {
        Self {
            browser: [
                opts.browser.platform.clone(),
                opts.browser.browser.clone(),
                opts.browser.version.clone(),
            ],
            sync_full_history: opts.sync_full_history,
            connect_timeout_ms: opts.connect_timeout.as_millis() as u64,
            default_query_timeout_ms: opts.default_query_timeout.as_millis() as u64,
            emit_own_events: opts.emit_own_events,
            mark_online_on_connect: opts.mark_online_on_connect,
        }
    }
}

// ── Sidecar → gateway ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    ConnectionUpdate {
        #[serde(default)]
        qr: Option<String>,
        #[serde(default)]
        connection: Option<WireConnection>,
        /// Baileys `lastDisconnect.error.output.statusCode`.
        #[serde(default)]
        status_code: Option<u16>,
    },
    CredsUpdate {
        credentials: Credentials,
    },
    MessagesUpsert {
        #[serde(default)]
        messages: Vec<WireMessage>,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireConnection {
    Connecting,
    Open,
    Close,
}

/// Build a [`ConnectionUpdate`] from the `connection_update` fields.
///
/// A close without a status code is reported as [`DisconnectReason::ConnectionClosed`].
pub fn connection_update(
    qr: Option<String>,
    connection: Option<WireConnection>,
    status_code: Option<u16>,
) -> ConnectionUpdate {
    let (connection, disconnect) = match connection {
        None => (None, None),
        Some(WireConnection::Connecting) => (Some(ConnectionState::Connecting), None),
        Some(WireConnection::Open) => (Some(ConnectionState::Open), None),
        Some(WireConnection::Close) => {
            let reason = status_code
                .map(DisconnectReason::from_status_code)
                .unwrap_or(DisconnectReason::ConnectionClosed);
            (Some(ConnectionState::Closed), Some(reason))
        },
    };
    ConnectionUpdate {
        qr,
        connection,
        disconnect,
    }
}

/// Baileys `WAMessage`, reduced to the fields the bridge reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub key: WireKey,
    #[serde(default)]
    pub message: Option<WireContent>,
    #[serde(default)]
    pub push_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireKey {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<WireExtendedText>,
    /// Every other content field (`imageMessage`, `reactionMessage`, ...).
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

impl WireContent {
    /// `conversation` wins when it has text, then `extendedTextMessage.text`.
    pub fn into_payload(self) -> MessagePayload {
        match (self.conversation, self.extended_text_message) {
            (Some(text), _) if !text.is_empty() => MessagePayload::plain(text),
            (_, Some(ext)) => MessagePayload::extended(ext.text.unwrap_or_default()),
            (Some(text), None) => MessagePayload::plain(text),
            (None, None) => {
                let kind = self
                    .other
                    .into_iter()
                    .find(|(_, v)| !v.is_null())
                    .map(|(k, _)| k)
                    .unwrap_or_else(|| "unknown".into());
                MessagePayload::other(kind)
            },
        }
    }
}

impl From<WireMessage> for RawMessage {
    fn from(msg: WireMessage) -> Self {
        Self {
            id: msg.key.id,
            remote_jid: msg.key.remote_jid,
            from_me: msg.key.from_me,
            push_name: msg.push_name,
            payload: msg.message.map(WireContent::into_payload),
        }
    }
}

pub fn inbound_batch(messages: Vec<WireMessage>) -> InboundBatch {
    InboundBatch::new(messages.into_iter().map(RawMessage::from).collect())
}
