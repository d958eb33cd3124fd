use serde::{Deserialize, Serialize};

/// Content carried by an inbound message.
///
/// WhatsApp clients put short messages in `conversation` and messages with
/// link previews, quotes or mentions in `extendedTextMessage`. Everything
/// else (media, reactions, protocol messages) is `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    PlainText { text: String },
    ExtendedText { text: String },
    Other { kind: String },
}

impl MessagePayload {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn extended(text: impl Into<String>) -> Self {
        Self::ExtendedText { text: text.into() }
    }

    pub fn other(kind: impl Into<String>) -> Self {
        Self::Other { kind: kind.into() }
    }

    /// Text carried by the payload, if it is a text variant.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::PlainText { text } | Self::ExtendedText { text } => Some(text),
            Self::Other { .. } => None,
        }
    }
}

/// A single message record as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Network message ID, when the transport knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Conversation JID the message arrived in; replies go back here.
    pub remote_jid: String,
    /// Set for messages this account sent itself (echoes, other devices).
    #[serde(default)]
    pub from_me: bool,
    /// Display name the sender chose for themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// `None` for presence updates, receipts and other content-less records.
    #[serde(default)]
    pub payload: Option<MessagePayload>,
}

impl RawMessage {
    /// A direct text message from `remote_jid`.
    pub fn text(remote_jid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            remote_jid: remote_jid.into(),
            from_me: false,
            push_name: None,
            payload: Some(MessagePayload::plain(text)),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Option<MessagePayload>) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn from_me(mut self, from_me: bool) -> Self {
        self.from_me = from_me;
        self
    }
}

/// One `messages.upsert` delivery: an ordered batch of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundBatch {
    pub messages: Vec<RawMessage>,
}

impl InboundBatch {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
