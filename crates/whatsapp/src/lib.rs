//! WhatsApp side of the bridge.
//!
//! Routes inbound direct messages to a reply generator and sends the
//! answers back, keeping one supervised session alive against a transport.
//! The production transport talks to a Baileys sidecar over WebSocket.

pub mod backoff;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod process;
pub mod qr;
pub mod router;
pub mod session;
pub mod sidecar;
pub mod supervisor;
pub mod types;

pub use {
    backoff::Backoff,
    config::session_options,
    credentials::{CredentialStore, FileCredentialStore},
    process::{SIDECAR_DIR_ENV, SidecarProcess, find_sidecar_dir, start_sidecar},
    qr::{LogQrRenderer, QrRenderer, TerminalQrRenderer},
    router::{Classification, IgnoreReason, Router},
    session::{Session, SessionContext, SessionEnd, SessionOutbound},
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarOutbound, SidecarTransport},
    supervisor::{FailureReason, SessionSupervisor, SupervisorHandle, SupervisorState},
};
