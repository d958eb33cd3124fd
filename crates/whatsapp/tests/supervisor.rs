//! Session and supervisor behaviour against an in-memory transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    serde_json::json,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

use {
    wabridge_channels::{
        Connection, ConnectionUpdate, Credentials, DisconnectReason, Error, EventSender,
        InboundBatch, MessagePayload, RawMessage, ReplyGenerator, Result, SendReceipt,
        SessionOptions, Transport, TransportEvent, TransportOutbound,
    },
    wabridge_config::{DispatchMode, RoutingConfig},
    wabridge_whatsapp::{
        Backoff, CredentialStore, FailureReason, LogQrRenderer, Session, SessionContext,
        SessionEnd, SessionSupervisor, SupervisorHandle, SupervisorState,
    },
};

const ALICE: &str = "4915111111111@s.whatsapp.net";
const BOB: &str = "4915222222222@s.whatsapp.net";
const GROUP: &str = "4915111111111-1600000000@g.us";

async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

// ── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeOutbound {
    sent: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
    notify: Mutex<Option<mpsc::UnboundedSender<(String, String)>>>,
}

impl FakeOutbound {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportOutbound for FakeOutbound {
    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt> {
        let entry = (to.to_string(), text.to_string());
        self.sent.lock().unwrap().push(entry.clone());
        if let Some(tx) = self.notify.lock().unwrap().as_ref() {
            let _ = tx.send(entry);
        }
        Ok(SendReceipt {
            message_id: Some("OUT".into()),
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One connection handed out by [`FakeTransport`].
struct Link {
    events: EventSender,
    outbound: Arc<FakeOutbound>,
    credentials: Option<Credentials>,
}

impl Link {
    async fn emit(&self, event: TransportEvent) {
        self.events.send(event).await.unwrap();
    }

    async fn open(&self) {
        self.emit(TransportEvent::Connection(ConnectionUpdate::open()))
            .await;
    }

    async fn close(&self, reason: DisconnectReason) {
        self.emit(TransportEvent::Connection(ConnectionUpdate::closed(reason)))
            .await;
    }

    async fn messages(&self, messages: Vec<RawMessage>) {
        self.emit(TransportEvent::Messages(InboundBatch::new(messages)))
            .await;
    }
}

struct FakeTransport {
    links: mpsc::UnboundedSender<Link>,
    sends: mpsc::UnboundedSender<(String, String)>,
    connects: AtomicU32,
    fail_all: bool,
}

impl FakeTransport {
    fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<Link>,
        mpsc::UnboundedReceiver<(String, String)>,
    ) {
        let (links, links_rx) = mpsc::unbounded_channel();
        let (sends, sends_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            links,
            sends,
            connects: AtomicU32::new(0),
            fail_all: false,
        });
        (transport, links_rx, sends_rx)
    }

    fn failing() -> Arc<Self> {
        let (links, _) = mpsc::unbounded_channel();
        let (sends, _) = mpsc::unbounded_channel();
        Arc::new(Self {
            links,
            sends,
            connects: AtomicU32::new(0),
            fail_all: true,
        })
    }

    fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        _options: &SessionOptions,
        credentials: Option<Credentials>,
    ) -> Result<Connection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(Error::unavailable("sidecar is not running"));
        }
        let (events, rx) = mpsc::channel(64);
        let outbound = Arc::new(FakeOutbound {
            notify: Mutex::new(Some(self.sends.clone())),
            ..Default::default()
        });
        let _ = self.links.send(Link {
            events,
            outbound: Arc::clone(&outbound),
            credentials,
        });
        Ok(Connection {
            events: rx,
            outbound,
        })
    }
}

/// Replies `reply` (or `re:<text>` when unset), optionally slowly.
#[derive(Default)]
struct StubGenerator {
    reply: Option<String>,
    delay: Duration,
    slow_text: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl StubGenerator {
    fn fixed(reply: &str) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Default::default()
        }
    }

    fn echo() -> Self {
        Self::default()
    }

    fn slow_on(mut self, text: &str, delay: Duration) -> Self {
        self.slow_text = Some(text.into());
        self.delay = delay;
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ReplyGenerator for StubGenerator {
    async fn generate_reply(&self, text: &str) -> String {
        self.calls.lock().unwrap().push(text.to_string());
        let slow = self.slow_text.as_deref().is_none_or(|t| t == text);
        if slow && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().unwrap_or_else(|| format!("re:{text}"))
    }
}

#[derive(Default)]
struct MemoryStore {
    initial: Option<Credentials>,
    saved: Mutex<Vec<Credentials>>,
    /// Every `save` fails, as on a read-only disk.
    read_only: bool,
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .last()
            .cloned()
            .or_else(|| self.initial.clone()))
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        if self.read_only {
            return Err(Error::unavailable("read-only file system"));
        }
        self.saved.lock().unwrap().push(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.saved.lock().unwrap().clear();
        Ok(())
    }
}

fn context(
    generator: Arc<dyn ReplyGenerator>,
    store: Arc<dyn CredentialStore>,
    routing: RoutingConfig,
) -> SessionContext {
    SessionContext::with_routing(generator, store, &routing).with_qr_renderer(Arc::new(LogQrRenderer))
}

fn fast_backoff(max_attempts: u32) -> Backoff {
    Backoff::new(Duration::from_millis(5), Duration::from_millis(20)).with_max_attempts(max_attempts)
}

fn spawn(
    transport: Arc<FakeTransport>,
    ctx: SessionContext,
    backoff: Backoff,
) -> SupervisorHandle {
    SessionSupervisor::new(transport, SessionOptions::default(), ctx, backoff).spawn()
}

async fn wait_open(handle: &SupervisorHandle, generation: u64) {
    let state = within(handle.wait_for(|s| {
        matches!(s, SupervisorState::Open { generation: g } if *g == generation)
            || s.is_terminal()
    }))
    .await;
    assert_eq!(state, SupervisorState::Open { generation });
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_message_gets_exactly_one_reply() {
    let (transport, mut links, mut sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::fixed("9-5 Mon-Fri")),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let handle = spawn(transport, ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    link.open().await;
    wait_open(&handle, 1).await;

    link.messages(vec![
        RawMessage::text(GROUP, "Hours?"),
        RawMessage::text(ALICE, "Hours?").from_me(true),
        RawMessage::text(ALICE, "").with_payload(None),
        RawMessage::text(ALICE, "Hours?"),
    ])
    .await;

    let sent = within(sends.recv()).await.unwrap();
    assert_eq!(sent, (ALICE.to_string(), "9-5 Mon-Fri".to_string()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(link.outbound.sent().len(), 1);

    handle.shutdown();
    assert_eq!(within(handle.join()).await, SupervisorState::Stopped);
    assert!(link.outbound.is_closed());
}

#[tokio::test]
async fn close_reconnects_once_and_old_session_sends_nothing() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let generator = Arc::new(StubGenerator::fixed("late").slow(Duration::from_millis(200)));
    let ctx = context(
        generator.clone(),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let handle = spawn(Arc::clone(&transport), ctx, fast_backoff(3));

    let first = within(links.recv()).await.unwrap();
    first.open().await;
    wait_open(&handle, 1).await;

    first.messages(vec![RawMessage::text(ALICE, "Hours?")]).await;
    // Let the completion start before the connection drops.
    within(async {
        while generator.calls.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    first.close(DisconnectReason::ConnectionClosed).await;

    let second = within(links.recv()).await.unwrap();
    second.open().await;
    wait_open(&handle, 2).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(first.outbound.sent().is_empty());
    assert!(first.outbound.is_closed());
    assert!(second.outbound.sent().is_empty());
    assert_eq!(transport.connects(), 2);
    assert!(links.try_recv().is_err());

    handle.shutdown();
    assert_eq!(within(handle.join()).await, SupervisorState::Stopped);
}

#[tokio::test]
async fn stale_outbound_refuses_sends() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let ctx = Arc::new(context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    ));

    let session = Session::open(transport.as_ref(), &SessionOptions::default(), ctx, 7)
        .await
        .unwrap();
    let outbound = session.outbound();
    let link = links.recv().await.unwrap();

    let shutdown = CancellationToken::new();
    let run = tokio::spawn(async move { session.run(&shutdown, |_| {}).await });
    link.close(DisconnectReason::ConnectionReplaced).await;
    assert_eq!(
        within(run).await.unwrap(),
        SessionEnd::Closed(DisconnectReason::ConnectionReplaced)
    );

    assert!(outbound.is_closed());
    let err = outbound.send_text(ALICE, "hi").await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed { generation: 7 }));
    assert!(link.outbound.sent().is_empty());
}

#[tokio::test]
async fn ended_event_stream_counts_as_transport_lost() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let ctx = Arc::new(context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    ));
    let session = Session::open(transport.as_ref(), &SessionOptions::default(), ctx, 1)
        .await
        .unwrap();
    drop(links.recv().await.unwrap());

    let end = within(session.run(&CancellationToken::new(), |_| {})).await;
    assert_eq!(end, SessionEnd::Closed(DisconnectReason::TransportLost));
}

#[tokio::test]
async fn fatal_disconnect_fails_without_reconnect() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let handle = spawn(Arc::clone(&transport), ctx, fast_backoff(0));

    let link = within(links.recv()).await.unwrap();
    link.open().await;
    wait_open(&handle, 1).await;
    link.close(DisconnectReason::LoggedOut).await;

    assert_eq!(within(handle.join()).await, SupervisorState::Failed {
        reason: FailureReason::Disconnected(DisconnectReason::LoggedOut),
    });
    assert_eq!(transport.connects(), 1);
}

#[tokio::test]
async fn exhausted_attempts_fail() {
    let transport = FakeTransport::failing();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let handle = spawn(Arc::clone(&transport), ctx, fast_backoff(3));

    assert_eq!(within(handle.join()).await, SupervisorState::Failed {
        reason: FailureReason::AttemptsExhausted { attempts: 3 },
    });
    assert_eq!(transport.connects(), 3);
}

#[tokio::test]
async fn sessions_that_never_open_use_up_attempts() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let handle = spawn(Arc::clone(&transport), ctx, fast_backoff(2));

    within(links.recv())
        .await
        .unwrap()
        .close(DisconnectReason::TimedOut)
        .await;
    within(links.recv())
        .await
        .unwrap()
        .close(DisconnectReason::TimedOut)
        .await;

    assert_eq!(within(handle.join()).await, SupervisorState::Failed {
        reason: FailureReason::AttemptsExhausted { attempts: 2 },
    });
}

#[tokio::test]
async fn restart_required_reconnects_without_delay() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    // A normal reconnect would wait a minute.
    let backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(60)).with_max_attempts(5);
    let handle = spawn(Arc::clone(&transport), ctx, backoff);

    let first = within(links.recv()).await.unwrap();
    first.close(DisconnectReason::RestartRequired).await;

    let second = within(links.recv()).await.unwrap();
    second.open().await;
    wait_open(&handle, 2).await;

    handle.shutdown();
    assert_eq!(within(handle.join()).await, SupervisorState::Stopped);
}

#[tokio::test]
async fn repeated_restart_required_before_open_backs_off() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(60)).with_max_attempts(0);
    let handle = spawn(Arc::clone(&transport), ctx, backoff);

    let closer = tokio::spawn(async move {
        while let Some(link) = links.recv().await {
            link.close(DisconnectReason::RestartRequired).await;
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    // One immediate restart, then the second 515 waits out the backoff.
    assert_eq!(transport.connects(), 2);
    assert_eq!(handle.state(), SupervisorState::Closed {
        reason: DisconnectReason::RestartRequired,
    });

    handle.shutdown();
    assert_eq!(within(handle.join()).await, SupervisorState::Stopped);
    closer.abort();
}

#[tokio::test]
async fn restart_required_after_open_skips_delay_again() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(60)).with_max_attempts(5);
    let handle = spawn(Arc::clone(&transport), ctx, backoff);

    within(links.recv())
        .await
        .unwrap()
        .close(DisconnectReason::RestartRequired)
        .await;
    let second = within(links.recv()).await.unwrap();
    second.open().await;
    wait_open(&handle, 2).await;
    second.close(DisconnectReason::RestartRequired).await;

    let third = within(links.recv()).await.unwrap();
    third.open().await;
    wait_open(&handle, 3).await;
    assert_eq!(transport.connects(), 3);

    handle.shutdown();
    assert_eq!(within(handle.join()).await, SupervisorState::Stopped);
}

#[tokio::test]
async fn shutdown_during_backoff_stops() {
    let transport = FakeTransport::failing();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(60));
    let handle = spawn(transport, ctx, backoff);

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown();
    assert_eq!(within(handle.join()).await, SupervisorState::Stopped);
}

#[tokio::test]
async fn credentials_are_loaded_and_saved_in_order() {
    let (transport, mut links, _sends) = FakeTransport::new();
    let store = Arc::new(MemoryStore {
        initial: Some(json!({"paired": true})),
        ..Default::default()
    });
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        store.clone(),
        RoutingConfig::default(),
    );
    let handle = spawn(transport, ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    assert_eq!(link.credentials, Some(json!({"paired": true})));

    for n in 1..=5 {
        link.emit(TransportEvent::CredsUpdate(json!({ "n": n })))
            .await;
    }
    link.open().await;
    wait_open(&handle, 1).await;

    let saved: Vec<_> = store.saved.lock().unwrap().clone();
    assert_eq!(saved, (1..=5).map(|n| json!({ "n": n })).collect::<Vec<_>>());

    handle.shutdown();
    within(handle.join()).await;
}

#[tokio::test]
async fn failed_credential_save_keeps_session_running() {
    let (transport, mut links, mut sends) = FakeTransport::new();
    let store = Arc::new(MemoryStore {
        read_only: true,
        ..Default::default()
    });
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        store.clone(),
        RoutingConfig::default(),
    );
    let handle = spawn(Arc::clone(&transport), ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    link.emit(TransportEvent::CredsUpdate(json!({ "n": 1 })))
        .await;
    link.open().await;
    wait_open(&handle, 1).await;

    link.messages(vec![RawMessage::text(ALICE, "still there?")])
        .await;
    assert_eq!(
        within(sends.recv()).await.unwrap(),
        (ALICE.to_string(), "re:still there?".to_string())
    );
    assert!(store.saved.lock().unwrap().is_empty());
    assert_eq!(handle.state(), SupervisorState::Open { generation: 1 });
    assert_eq!(transport.connects(), 1);

    handle.shutdown();
    within(handle.join()).await;
}

async fn collect_replies(
    sends: &mut mpsc::UnboundedReceiver<(String, String)>,
    count: usize,
) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(within(sends.recv()).await.unwrap());
    }
    out
}

#[tokio::test]
async fn per_sender_queues_keep_order_and_run_concurrently() {
    let (transport, mut links, mut sends) = FakeTransport::new();
    let generator = StubGenerator::echo().slow_on("a1", Duration::from_millis(150));
    let ctx = context(
        Arc::new(generator),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let handle = spawn(transport, ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    link.open().await;
    wait_open(&handle, 1).await;
    link.messages(vec![
        RawMessage::text(ALICE, "a1"),
        RawMessage::text(ALICE, "a2"),
        RawMessage::text(BOB, "b1"),
        RawMessage::text(ALICE, "a3"),
    ])
    .await;

    let replies = collect_replies(&mut sends, 4).await;
    let alice: Vec<&str> = replies
        .iter()
        .filter(|(to, _)| to == ALICE)
        .map(|(_, text)| text.as_str())
        .collect();
    assert_eq!(alice, ["re:a1", "re:a2", "re:a3"]);
    // Bob is not stuck behind Alice's slow completion.
    assert_eq!(replies[0], (BOB.to_string(), "re:b1".to_string()));

    handle.shutdown();
    within(handle.join()).await;
}

#[tokio::test]
async fn idle_worker_replacement_keeps_sender_order() {
    let (transport, mut links, mut sends) = FakeTransport::new();
    let generator = StubGenerator::echo().slow_on("a2", Duration::from_millis(150));
    let ctx = context(
        Arc::new(generator),
        Arc::new(MemoryStore::default()),
        RoutingConfig {
            worker_idle_secs: 0,
            ..Default::default()
        },
    );
    let handle = spawn(transport, ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    link.open().await;
    wait_open(&handle, 1).await;

    // The first worker goes idle right after answering a1.
    link.messages(vec![RawMessage::text(ALICE, "a1")]).await;
    assert_eq!(
        within(sends.recv()).await.unwrap(),
        (ALICE.to_string(), "re:a1".to_string())
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    link.messages(vec![RawMessage::text(ALICE, "a2")]).await;
    link.messages(vec![RawMessage::text(ALICE, "a3")]).await;

    let texts: Vec<String> = collect_replies(&mut sends, 2)
        .await
        .into_iter()
        .map(|(_, text)| text)
        .collect();
    assert_eq!(texts, ["re:a2", "re:a3"]);

    handle.shutdown();
    within(handle.join()).await;
}

#[tokio::test]
async fn sequential_mode_preserves_arrival_order() {
    let (transport, mut links, mut sends) = FakeTransport::new();
    let generator = StubGenerator::echo().slow_on("a1", Duration::from_millis(100));
    let ctx = context(
        Arc::new(generator),
        Arc::new(MemoryStore::default()),
        RoutingConfig {
            dispatch_mode: DispatchMode::Sequential,
            ..Default::default()
        },
    );
    let handle = spawn(transport, ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    link.open().await;
    wait_open(&handle, 1).await;
    link.messages(vec![
        RawMessage::text(ALICE, "a1"),
        RawMessage::text(BOB, "b1"),
        RawMessage::text(ALICE, "a2"),
    ])
    .await;

    let texts: Vec<String> = collect_replies(&mut sends, 3)
        .await
        .into_iter()
        .map(|(_, text)| text)
        .collect();
    assert_eq!(texts, ["re:a1", "re:b1", "re:a2"]);

    handle.shutdown();
    within(handle.join()).await;
}

#[tokio::test]
async fn first_only_batch_mode_answers_first_record() {
    let (transport, mut links, mut sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig {
            batch_mode: wabridge_config::BatchMode::FirstOnly,
            ..Default::default()
        },
    );
    let handle = spawn(transport, ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    link.open().await;
    wait_open(&handle, 1).await;
    link.messages(vec![RawMessage::text(ALICE, "one"), RawMessage::text(BOB, "two")])
        .await;

    assert_eq!(
        within(sends.recv()).await.unwrap(),
        (ALICE.to_string(), "re:one".to_string())
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sends.try_recv().is_err());

    handle.shutdown();
    within(handle.join()).await;
}

#[tokio::test]
async fn extended_text_is_answered() {
    let (transport, mut links, mut sends) = FakeTransport::new();
    let ctx = context(
        Arc::new(StubGenerator::echo()),
        Arc::new(MemoryStore::default()),
        RoutingConfig::default(),
    );
    let handle = spawn(transport, ctx, fast_backoff(3));

    let link = within(links.recv()).await.unwrap();
    link.open().await;
    wait_open(&handle, 1).await;
    link.messages(vec![
        RawMessage::text(ALICE, "").with_payload(Some(MessagePayload::extended("hi"))),
    ])
    .await;

    assert_eq!(
        within(sends.recv()).await.unwrap(),
        (ALICE.to_string(), "re:hi".to_string())
    );

    handle.shutdown();
    within(handle.join()).await;
}
