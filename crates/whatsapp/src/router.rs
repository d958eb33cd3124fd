//! Inbound message classification.
//!
//! Decides for each raw record whether it is a direct text message the bot
//! should answer, and extracts the text.

use std::fmt;

use wabridge_channels::{
    MessagePayload, RawMessage,
    gating::{JidKind, is_allowed},
};

/// Why a message was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Presence updates, receipts and other records without content.
    NoContent,
    /// Sent by this account (echo or another linked device).
    FromSelf,
    GroupChat,
    /// Status updates and broadcast lists.
    Broadcast,
    /// Media, reactions, protocol messages.
    Unsupported,
    EmptyText,
    NotAllowed,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoContent => "no content",
            Self::FromSelf => "sent by self",
            Self::GroupChat => "group chat",
            Self::Broadcast => "broadcast",
            Self::Unsupported => "unsupported payload",
            Self::EmptyText => "empty text",
            Self::NotAllowed => "sender not on allowlist",
        })
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accepted { sender: String, text: String },
    Ignored { reason: IgnoreReason },
}

impl Classification {
    fn ignored(reason: IgnoreReason) -> Self {
        Self::Ignored { reason }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Stateless router; the allowlist is fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct Router {
    allowlist: Vec<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn classify(&self, msg: &RawMessage) -> Classification {
        let Some(payload) = &msg.payload else {
            return Classification::ignored(IgnoreReason::NoContent);
        };
        if msg.from_me {
            return Classification::ignored(IgnoreReason::FromSelf);
        }

        match JidKind::of(&msg.remote_jid) {
            JidKind::Group => return Classification::ignored(IgnoreReason::GroupChat),
            JidKind::Broadcast => return Classification::ignored(IgnoreReason::Broadcast),
            JidKind::Direct | JidKind::Other => {},
        }

        let text = match extract_text(payload) {
            Ok(text) => text,
            Err(reason) => return Classification::ignored(reason),
        };

        if !is_allowed(&msg.remote_jid, &self.allowlist) {
            return Classification::ignored(IgnoreReason::NotAllowed);
        }

        Classification::Accepted {
            sender: msg.remote_jid.clone(),
            text: text.to_string(),
        }
    }
}

/// Pull the user-visible text out of a payload.
pub fn extract_text(payload: &MessagePayload) -> Result<&str, IgnoreReason> {
    let text = payload.text().ok_or(IgnoreReason::Unsupported)?;
    if text.trim().is_empty() {
        return Err(IgnoreReason::EmptyText);
    }
    Ok(text)
}
