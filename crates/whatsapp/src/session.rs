//! One logical WhatsApp connection and its event loop.

use std::{sync::Arc, time::Duration};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    wabridge_channels::{
        ConnectionState, ConnectionUpdate, Credentials, DisconnectReason, Error, EventReceiver,
        InboundBatch, ReplyGenerator, Result, SendReceipt, SessionOptions, Transport,
        TransportEvent, TransportOutbound,
    },
    wabridge_config::{BatchMode, DispatchMode, RoutingConfig},
};

use crate::{
    credentials::CredentialStore,
    dispatch::Dispatcher,
    qr::{QrRenderer, TerminalQrRenderer},
    router::{Classification, IgnoreReason, Router},
};

/// Collaborators shared by every session the supervisor opens.
pub struct SessionContext {
    pub router: Router,
    pub generator: Arc<dyn ReplyGenerator>,
    pub credentials: Arc<dyn CredentialStore>,
    pub qr: Arc<dyn QrRenderer>,
    pub batch_mode: BatchMode,
    pub dispatch_mode: DispatchMode,
    pub worker_idle: Duration,
}

impl SessionContext {
    pub fn new(generator: Arc<dyn ReplyGenerator>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self::with_routing(generator, credentials, &RoutingConfig::default())
    }

    pub fn with_routing(
        generator: Arc<dyn ReplyGenerator>,
        credentials: Arc<dyn CredentialStore>,
        routing: &RoutingConfig,
    ) -> Self {
        Self {
            router: Router::new().with_allowlist(routing.allowlist.clone()),
            generator,
            credentials,
            qr: Arc::new(TerminalQrRenderer),
            batch_mode: routing.batch_mode,
            dispatch_mode: routing.dispatch_mode,
            worker_idle: Duration::from_secs(routing.worker_idle_secs),
        }
    }

    #[must_use]
    pub fn with_qr_renderer(mut self, qr: Arc<dyn QrRenderer>) -> Self {
        self.qr = qr;
        self
    }
}

/// How a session's event loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Closed(DisconnectReason),
    Shutdown,
}

/// Outbound handle scoped to one session. Once the session is closed every
/// send fails with [`Error::SessionClosed`] without reaching the transport.
pub struct SessionOutbound {
    generation: u64,
    inner: Arc<dyn TransportOutbound>,
    cancel: CancellationToken,
}

impl SessionOutbound {
    pub(crate) fn new(
        generation: u64,
        inner: Arc<dyn TransportOutbound>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            generation,
            inner,
            cancel,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the owning session has closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    pub async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt> {
        let closed = Error::SessionClosed {
            generation: self.generation,
        };
        if self.is_closed() {
            return Err(closed);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(closed),
            result = self.inner.send_text(to, text) => result,
        }
    }
}

pub struct Session {
    generation: u64,
    state: ConnectionState,
    events: EventReceiver,
    outbound: Arc<SessionOutbound>,
    cancel: CancellationToken,
    ctx: Arc<SessionContext>,
}

impl Session {
    /// Load stored credentials and open a connection.
    pub async fn open(
        transport: &dyn Transport,
        options: &SessionOptions,
        ctx: Arc<SessionContext>,
        generation: u64,
    ) -> Result<Self> {
        let credentials = match ctx.credentials.load().await {
            Ok(creds) => creds,
            Err(e) => {
                warn!(error = %e, "could not load stored credentials, pairing from scratch");
                None
            },
        };
        debug!(generation, paired = credentials.is_some(), "opening session");

        let conn = transport.connect(options, credentials).await?;
        let cancel = CancellationToken::new();
        Ok(Self {
            generation,
            state: ConnectionState::Connecting,
            events: conn.events,
            outbound: Arc::new(SessionOutbound::new(generation, conn.outbound, cancel.clone())),
            cancel,
            ctx,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn outbound(&self) -> Arc<SessionOutbound> {
        Arc::clone(&self.outbound)
    }

    /// Process events until the connection closes or `shutdown` fires.
    /// `on_open` runs each time the connection reports `open`.
    pub async fn run(
        mut self,
        shutdown: &CancellationToken,
        mut on_open: impl FnMut(u64),
    ) -> SessionEnd {
        let mut dispatcher = Dispatcher::new(
            self.ctx.dispatch_mode,
            self.ctx.worker_idle,
            Arc::clone(&self.ctx.generator),
            Arc::clone(&self.outbound),
        );

        let end = loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break SessionEnd::Shutdown,
                event = self.events.recv() => event,
            };
            match event {
                None => {
                    warn!(generation = self.generation, "transport event stream ended");
                    break SessionEnd::Closed(DisconnectReason::TransportLost);
                },
                Some(TransportEvent::Connection(update)) => {
                    if let Some(reason) = self.on_connection_update(update, &mut on_open) {
                        break SessionEnd::Closed(reason);
                    }
                },
                Some(TransportEvent::CredsUpdate(creds)) => self.save_credentials(&creds).await,
                Some(TransportEvent::Messages(batch)) => self.on_messages(batch, &mut dispatcher),
            }
        };

        self.cancel.cancel();
        dispatcher.shutdown().await;
        self.outbound.inner.close().await;
        debug!(generation = self.generation, ?end, "session closed");
        end
    }

    fn on_connection_update(
        &mut self,
        update: ConnectionUpdate,
        on_open: &mut impl FnMut(u64),
    ) -> Option<DisconnectReason> {
        if let Some(qr) = &update.qr {
            self.ctx.qr.render(qr);
        }
        match update.connection? {
            ConnectionState::Connecting => {
                debug!(generation = self.generation, "connecting to WhatsApp");
                self.state = ConnectionState::Connecting;
                None
            },
            ConnectionState::Open => {
                info!(generation = self.generation, "connected to WhatsApp");
                self.state = ConnectionState::Open;
                on_open(self.generation);
                None
            },
            ConnectionState::Closed => {
                let reason = update
                    .disconnect
                    .unwrap_or(DisconnectReason::ConnectionClosed);
                warn!(generation = self.generation, %reason, "connection closed");
                Some(reason)
            },
        }
    }

    async fn save_credentials(&self, creds: &Credentials) {
        if let Err(e) = self.ctx.credentials.save(creds).await {
            warn!(generation = self.generation, error = %e, "failed to persist credentials");
        }
    }

    fn on_messages(&self, batch: InboundBatch, dispatcher: &mut Dispatcher) {
        let take = match self.ctx.batch_mode {
            BatchMode::All => batch.messages.len(),
            BatchMode::FirstOnly => 1,
        };
        for msg in batch.messages.into_iter().take(take) {
            debug!(
                id = msg.id.as_deref().unwrap_or(""),
                remote_jid = %msg.remote_jid,
                from_me = msg.from_me,
                "received message"
            );
            match self.ctx.router.classify(&msg) {
                Classification::Accepted { sender, text } => {
                    info!(sender = %sender, chars = text.chars().count(), "message accepted");
                    dispatcher.submit(sender, text);
                },
                Classification::Ignored {
                    reason: IgnoreReason::GroupChat,
                } => info!(remote_jid = %msg.remote_jid, "ignoring message from a group chat"),
                Classification::Ignored { reason } => {
                    debug!(remote_jid = %msg.remote_jid, %reason, "message ignored")
                },
            }
        }
    }
}
