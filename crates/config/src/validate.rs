//! Startup validation.
//!
//! Checks a loaded [`BridgeConfig`] for values that would only surface as
//! runtime failures later (missing API key, unusable URLs, nonsensical
//! backoff settings).

use std::fmt;

use secrecy::ExposeSecret;

use crate::{env_subst::unresolved_placeholders, schema::BridgeConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "completion.base_url"
    pub path: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    fn error(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path,
            message: message.into(),
        });
    }

    fn warn(&mut self, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path,
            message: message.into(),
        });
    }
}

/// Validate against the real process environment.
pub fn validate(config: &BridgeConfig) -> ValidationResult {
    validate_with(config, |name| std::env::var(name).ok())
}

/// Validate with an injectable environment lookup.
pub fn validate_with(
    config: &BridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_completion(config, &lookup, &mut result);
    check_reconnect(config, &mut result);
    check_routing(config, &mut result);
    check_sidecar(config, &mut result);
    result
}

fn check_completion(
    config: &BridgeConfig,
    lookup: &impl Fn(&str) -> Option<String>,
    result: &mut ValidationResult,
) {
    let completion = &config.completion;

    match completion.resolve_api_key_with(lookup) {
        None => result.error(
            "completion.api_key",
            format!(
                "no API key configured; export {} (or add it to .env) or set \
                 completion.api_key in the config file",
                if completion.api_key_env.is_empty() {
                    "an API key variable"
                } else {
                    completion.api_key_env.as_str()
                }
            ),
        ),
        Some(key) if !unresolved_placeholders(key.expose_secret()).is_empty() => result.error(
            "completion.api_key",
            "API key contains an unresolved ${...} placeholder",
        ),
        Some(_) => {},
    }

    if completion.api_key.is_some() {
        result.warn(
            "completion.api_key",
            "API key stored in the config file; prefer an environment variable",
        );
    }

    let base_url = completion.base_url.trim();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        result.error(
            "completion.base_url",
            format!("expected an http(s) URL, got {base_url:?}"),
        );
    } else if base_url.starts_with("http://") {
        result.warn(
            "completion.base_url",
            "plain http sends the API key unencrypted",
        );
    }

    if completion.model.trim().is_empty() {
        result.error("completion.model", "model must not be empty");
    }
    if completion.system_prompt.trim().is_empty() {
        result.warn("completion.system_prompt", "system prompt is empty");
    }
    if completion.timeout_secs == 0 {
        result.error("completion.timeout_secs", "timeout must be at least 1s");
    }
    if completion.fallback_reply.trim().is_empty() {
        result.error(
            "completion.fallback_reply",
            "fallback reply must not be empty",
        );
    }
}

fn check_reconnect(config: &BridgeConfig, result: &mut ValidationResult) {
    let reconnect = &config.reconnect;

    if reconnect.initial_delay_ms == 0 {
        result.error(
            "reconnect.initial_delay_ms",
            "initial delay must be positive",
        );
    }
    if reconnect.max_delay_ms < reconnect.initial_delay_ms {
        result.error(
            "reconnect.max_delay_ms",
            "max delay must not be smaller than the initial delay",
        );
    }
    if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
        result.error("reconnect.multiplier", "multiplier must be >= 1.0");
    }
    if !(0.0..=1.0).contains(&reconnect.jitter) {
        result.error("reconnect.jitter", "jitter must be within 0.0..=1.0");
    }
    if reconnect.max_attempts == 0 {
        result.warn(
            "reconnect.max_attempts",
            "0 means the bridge reconnects forever",
        );
    }
}

fn check_routing(config: &BridgeConfig, result: &mut ValidationResult) {
    if config.routing.worker_idle_secs == 0 {
        result.error(
            "routing.worker_idle_secs",
            "worker idle timeout must be at least 1s",
        );
    }
    if config.routing.allowlist.iter().any(|e| e.trim().is_empty()) {
        result.warn("routing.allowlist", "allowlist contains an empty entry");
    }
}

fn check_sidecar(config: &BridgeConfig, result: &mut ValidationResult) {
    let url = config.sidecar.ws_url();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        result.error(
            "sidecar.url",
            format!("expected a ws:// or wss:// URL, got {url:?}"),
        );
    }
    if config.sidecar.auto_start && config.sidecar.url.is_some() {
        result.warn(
            "sidecar.auto_start",
            "auto_start launches a local sidecar on sidecar.port; sidecar.url is ignored",
        );
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::CompletionConfig, secrecy::Secret};

    fn with_key(name: &str) -> Option<String> {
        (name == "TOGETHER_API_KEY").then(|| "sk-test".to_string())
    }

    #[test]
    fn defaults_with_key_are_valid() {
        let result = validate_with(&BridgeConfig::default(), with_key);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_api_key_is_an_actionable_error() {
        let result = validate_with(&BridgeConfig::default(), |_| None);
        let errors: Vec<_> = result.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "completion.api_key");
        assert!(errors[0].message.contains("TOGETHER_API_KEY"));
    }

    #[test]
    fn unresolved_placeholder_in_key() {
        let cfg = BridgeConfig {
            completion: CompletionConfig {
                api_key: Some(Secret::new("${TOGETHER_KEY}".into())),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = validate_with(&cfg, |_| None);
        assert!(result.errors().any(|d| d.message.contains("placeholder")));
        assert!(result.warnings().any(|d| d.path == "completion.api_key"));
    }

    #[test]
    fn bad_urls_and_backoff() {
        let mut cfg = BridgeConfig::default();
        cfg.completion.base_url = "api.together.xyz".into();
        cfg.sidecar.url = Some("http://localhost:1".into());
        cfg.reconnect.max_delay_ms = 10;
        cfg.reconnect.jitter = 1.5;
        cfg.reconnect.multiplier = 0.5;

        let result = validate_with(&cfg, with_key);
        let paths: Vec<_> = result.errors().map(|d| d.path).collect();
        assert!(paths.contains(&"completion.base_url"));
        assert!(paths.contains(&"sidecar.url"));
        assert!(paths.contains(&"reconnect.max_delay_ms"));
        assert!(paths.contains(&"reconnect.jitter"));
        assert!(paths.contains(&"reconnect.multiplier"));
    }

    #[test]
    fn unlimited_reconnects_only_warn() {
        let mut cfg = BridgeConfig::default();
        cfg.reconnect.max_attempts = 0;
        let result = validate_with(&cfg, with_key);
        assert!(!result.has_errors());
        assert!(result.warnings().any(|d| d.path == "reconnect.max_attempts"));
        assert_eq!(result.diagnostics.len(), 1);
    }
}
