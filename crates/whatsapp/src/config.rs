use std::time::Duration;

use {
    wabridge_channels::{BrowserIdentity, SessionOptions},
    wabridge_config::SessionConfig,
};

/// Options every session is opened with, from the `[session]` section.
pub fn session_options(config: &SessionConfig) -> SessionOptions {
    let browser = &config.browser;
    SessionOptions {
        browser: BrowserIdentity {
            platform: browser.0.clone(),
            browser: browser.1.clone(),
            version: browser.2.clone(),
        },
        sync_full_history: config.sync_full_history,
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        default_query_timeout: Duration::from_millis(config.default_query_timeout_ms),
        emit_own_events: config.emit_own_events,
        mark_online_on_connect: config.mark_online_on_connect,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, wabridge_config::BrowserConfig};

    #[test]
    fn defaults_match_session_options_defaults() {
        assert_eq!(
            session_options(&SessionConfig::default()),
            SessionOptions::default()
        );
    }

    #[test]
    fn overrides_are_carried() {
        let cfg = SessionConfig {
            browser: BrowserConfig("Ubuntu".into(), "Chrome".into(), "120".into()),
            sync_full_history: true,
            connect_timeout_ms: 5_000,
            ..Default::default()
        };
        let opts = session_options(&cfg);
        assert_eq!(opts.browser.platform, "Ubuntu");
        assert_eq!(opts.browser.browser, "Chrome");
        assert!(opts.sync_full_history);
        assert_eq!(opts.connect_timeout, Duration::from_secs(5));
        assert_eq!(opts.default_query_timeout, Duration::from_secs(60));
    }
}
