//! Transport abstraction for the bridge.
//!
//! A transport opens connections to the messaging network, streams
//! connection, credential and message events, and sends text replies.
//! The WhatsApp sidecar implements it in `wabridge-whatsapp`; tests use
//! in-memory fakes.

pub mod error;
pub mod gating;
pub mod message;
pub mod transport;

pub use {
    error::{Error, Result},
    message::{InboundBatch, MessagePayload, RawMessage},
    transport::{
        BrowserIdentity, Connection, ConnectionState, ConnectionUpdate, Credentials,
        DisconnectReason, EventReceiver, EventSender, ReplyGenerator, SendReceipt,
        SessionOptions, Transport, TransportEvent, TransportOutbound,
    },
};
