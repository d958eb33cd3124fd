//! Chat completion client for OpenAI-compatible endpoints (Together AI,
//! OpenAI, Groq, local servers).

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::{debug, trace, warn},
};

use {wabridge_channels::ReplyGenerator, wabridge_config::CompletionConfig};

use crate::error::{Error, Result};

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// `POST /chat/completions` body.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ── Client ──────────────────────────────────────────────────────────────────

/// Sends one system + one user turn and returns the first choice.
pub struct ChatCompletionClient {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    system_prompt: String,
    fallback_reply: String,
    max_retries: u32,
    retry_backoff: Duration,
    client: reqwest::Client,
}

impl ChatCompletionClient {
    pub fn new(api_key: Secret<String>, model: String, base_url: String) -> Result<Self> {
        Self::with_timeout(api_key, model, base_url, Duration::from_secs(60))
    }

    pub fn with_timeout(
        api_key: Secret<String>,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let defaults = CompletionConfig::default();
        let retry_backoff = defaults.retry_backoff();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            system_prompt: defaults.system_prompt,
            fallback_reply: defaults.fallback_reply,
            max_retries: 0,
            retry_backoff,
            client,
        })
    }

    /// Build from the `[completion]` config section and a resolved key.
    pub fn from_config(config: &CompletionConfig, api_key: Secret<String>) -> Result<Self> {
        Ok(Self::with_timeout(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.timeout(),
        )?
        .with_system_prompt(config.system_prompt.clone())
        .with_fallback_reply(config.fallback_reply.clone())
        .with_retries(config.max_retries, config.retry_backoff()))
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_fallback_reply(mut self, reply: String) -> Self {
        self.fallback_reply = reply;
        self
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    fn build_request<'a>(&'a self, text: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: vec![
                RequestMessage {
                    role: Role::System,
                    content: &self.system_prompt,
                },
                RequestMessage {
                    role: Role::User,
                    content: text,
                },
            ],
        }
    }

    /// Generate a reply, falling back to the apology text on any failure.
    pub async fn complete(&self, text: &str) -> String {
        match self.try_complete(text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(model = %self.model, error = %e, "completion failed, sending fallback reply");
                self.fallback_reply.clone()
            },
        }
    }

    /// Generate a reply, retrying transient failures.
    pub async fn try_complete(&self, text: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.request_once(text).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        model = %self.model,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient completion error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, text: &str) -> Result<String> {
        let body = self.build_request(text);

        debug!(
            model = %self.model,
            chars = text.chars().count(),
            "completion request"
        );

        let http_resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body = http_resp.text().await.unwrap_or_default();
            debug!(status = %status, model = %self.model, body = %body, "completion API error");
            return Err(Error::Status { status, body });
        }

        let raw = http_resp.text().await?;
        trace!(response = %raw, "completion raw response");
        parse_reply(&raw)
    }
}

/// Extract `choices[0].message.content` from a response body.
fn parse_reply(raw: &str) -> Result<String> {
    let resp: CompletionResponse = serde_json::from_str(raw).map_err(Error::malformed)?;
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::malformed("response has no choices"))?;
    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(Error::EmptyReply),
    }
}

#[async_trait]
impl ReplyGenerator for ChatCompletionClient {
    async fn generate_reply(&self, text: &str) -> String {
        self.complete(text).await
    }
}
