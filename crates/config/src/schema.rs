/// Config schema types (completion, session, reconnect, routing, sidecar).
use std::{path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub completion: CompletionConfig,
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
    pub routing: RoutingConfig,
    pub sidecar: SidecarConfig,
}

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// API base URL; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    /// System instruction sent ahead of every user message.
    pub system_prompt: String,
    /// Inline API key. Prefer `api_key_env`.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Extra attempts for transient failures (connect errors, 429, 5xx).
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff_ms: u64,
    /// Sent to the user whenever the endpoint cannot produce a reply.
    pub fallback_reply: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.together.xyz/v1".into(),
            model: "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free".into(),
            system_prompt: "You are a helpful business assistant.".into(),
            api_key: None,
            api_key_env: "TOGETHER_API_KEY".into(),
            timeout_secs: 60,
            max_retries: 1,
            retry_backoff_ms: 500,
            fallback_reply: "Sorry, I couldn't process your request. Please try again later."
                .into(),
        }
    }
}

impl CompletionConfig {
    /// Resolve the API key: inline value first, then the named env var.
    /// Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<Secret<String>> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn resolve_api_key_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<Secret<String>> {
        if let Some(key) = &self.api_key
            && !key.expose_secret().trim().is_empty()
        {
            return Some(key.clone());
        }
        if self.api_key_env.is_empty() {
            return None;
        }
        lookup(&self.api_key_env)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Secret::new)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Device identity `[platform, browser, version]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig(pub String, pub String, pub String);

impl Default for BrowserConfig {
    fn default() -> Self {
        Self("MacOS".into(), "Safari".into(), "14.0".into())
    }
}

/// Options the WhatsApp session is opened with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub browser: BrowserConfig,
    pub sync_full_history: bool,
    pub connect_timeout_ms: u64,
    pub default_query_timeout_ms: u64,
    pub mark_online_on_connect: bool,
    pub emit_own_events: bool,
    /// Directory holding the persisted pairing credentials.
    pub auth_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            sync_full_history: false,
            connect_timeout_ms: 60_000,
            default_query_timeout_ms: 60_000,
            mark_online_on_connect: true,
            emit_own_events: true,
            auth_dir: PathBuf::from("auth_info"),
        }
    }
}

/// Reconnect backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed (0.0 – 1.0).
    pub jitter: f64,
    /// Consecutive failed attempts before giving up. 0 = never give up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: 10,
        }
    }
}

/// How many records of a `messages.upsert` batch are processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    #[default]
    All,
    FirstOnly,
}

/// How accepted messages are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One queue per sender: senders run concurrently, each in order.
    #[default]
    PerSender,
    /// A single queue: strict arrival order across all senders.
    Sequential,
}

/// Inbound message routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Sender allowlist (JIDs or phone numbers, `*` wildcards). Empty = open.
    pub allowlist: Vec<String>,
    pub batch_mode: BatchMode,
    pub dispatch_mode: DispatchMode,
    /// Idle seconds before a sender's queue worker exits.
    pub worker_idle_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            batch_mode: BatchMode::All,
            dispatch_mode: DispatchMode::PerSender,
            worker_idle_secs: 300,
        }
    }
}

/// Baileys sidecar connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// WebSocket URL. Derived from `port` when unset.
    pub url: Option<String>,
    pub port: u16,
    /// Sidecar checkout (containing `package.json`).
    pub dir: Option<PathBuf>,
    /// Spawn and supervise the sidecar process.
    pub auto_start: bool,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: None,
            port: DEFAULT_SIDECAR_PORT,
            dir: None,
            auto_start: false,
        }
    }
}

/// Default port the sidecar WebSocket server listens on.
pub const DEFAULT_SIDECAR_PORT: u16 = 19120;

impl SidecarConfig {
    pub fn ws_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("ws://127.0.0.1:{}", self.port))
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
