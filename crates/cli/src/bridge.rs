//! `wabridge run`: wires the completion client, credential store, sidecar
//! and session supervisor together, then waits for a signal or a terminal
//! supervisor state.

use std::{process::ExitCode, sync::Arc};

use {
    anyhow::{Context, Result},
    tracing::{error, info, warn},
    wabridge_config::BridgeConfig,
    wabridge_providers::ChatCompletionClient,
    wabridge_whatsapp::{
        Backoff, FileCredentialStore, LogQrRenderer, QrRenderer, SessionContext,
        SessionSupervisor, SidecarProcess, SidecarTransport, SupervisorState,
        TerminalQrRenderer, find_sidecar_dir, session_options, start_sidecar,
    },
};

use crate::EXIT_FAILED;

pub async fn run(config: BridgeConfig, json_logs: bool) -> Result<ExitCode> {
    let api_key = config
        .completion
        .resolve_api_key()
        .with_context(|| format!("{} is not set", config.completion.api_key_env))?;
    let client = ChatCompletionClient::from_config(&config.completion, api_key)?;
    info!(
        model = client.model(),
        base_url = %config.completion.base_url,
        "completion client ready"
    );

    let sidecar = spawn_sidecar(&config).await?;

    let url = config.sidecar.ws_url();
    let store = Arc::new(FileCredentialStore::new(&config.session.auth_dir));
    let qr: Arc<dyn QrRenderer> = if json_logs {
        Arc::new(LogQrRenderer)
    } else {
        Arc::new(TerminalQrRenderer)
    };
    let ctx = SessionContext::with_routing(Arc::new(client), store, &config.routing)
        .with_qr_renderer(qr);

    info!(url = %url, auth_dir = %config.session.auth_dir.display(), "connecting to WhatsApp");
    let handle = SessionSupervisor::new(
        Arc::new(SidecarTransport::new(url)),
        session_options(&config.session),
        ctx,
        Backoff::from_config(&config.reconnect),
    )
    .spawn();

    let interrupted = tokio::select! {
        _ = handle.wait_for(SupervisorState::is_terminal) => false,
        () = shutdown_signal() => true,
    };
    if interrupted {
        info!("shutdown requested");
        handle.shutdown();
    }
    let state = handle.join().await;

    if let Some(process) = sidecar
        && let Err(e) = process.stop().await
    {
        warn!(error = %e, "failed to stop sidecar");
    }

    Ok(match state {
        SupervisorState::Failed { reason } => {
            error!(%reason, "bridge stopped");
            ExitCode::from(EXIT_FAILED)
        },
        _ => {
            info!("bridge stopped");
            ExitCode::SUCCESS
        },
    })
}

/// Start the bundled sidecar when `[sidecar].auto_start` is set and no
/// external URL is configured.
async fn spawn_sidecar(config: &BridgeConfig) -> Result<Option<SidecarProcess>> {
    let sidecar = &config.sidecar;
    if !sidecar.auto_start {
        return Ok(None);
    }
    if let Some(ref url) = sidecar.url {
        warn!(url = %url, "sidecar.url is set, not starting a local sidecar");
        return Ok(None);
    }

    let dir = find_sidecar_dir(sidecar.dir.as_deref())?;
    // The sidecar runs in its own directory, so hand it an absolute path.
    let keys_dir = std::path::absolute(config.session.auth_dir.join("keys"))
        .context("resolving sidecar keys directory")?;
    let process = start_sidecar(&dir, sidecar.port, &keys_dir).await?;
    Ok(Some(process))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
