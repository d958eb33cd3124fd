use {
    anyhow::{Context, Result},
    tracing::{info, warn},
    wabridge_config::BridgeConfig,
    wabridge_whatsapp::{
        CredentialStore, FileCredentialStore, SidecarTransport, session_options,
    },
};

/// `wabridge logout`: unlink the device, then forget the credentials.
///
/// The stored credentials are removed even when the sidecar cannot be
/// reached, so the next `run` always starts a fresh pairing.
pub async fn logout(config: &BridgeConfig) -> Result<()> {
    let store = FileCredentialStore::new(&config.session.auth_dir);
    let Some(credentials) = store.load().await.context("reading stored credentials")? else {
        info!(path = %store.path().display(), "not paired, nothing to do");
        return Ok(());
    };

    let transport = SidecarTransport::new(config.sidecar.ws_url());
    let options = session_options(&config.session);
    match transport.logout(&options, credentials).await {
        Ok(()) => info!("device unlinked from WhatsApp"),
        Err(e) => warn!(
            error = %e,
            "could not unlink on the WhatsApp side; remove the device under Linked devices"
        ),
    }

    store.clear().await.context("removing stored credentials")?;
    eprintln!("Logged out. Run `wabridge` again to pair a new device.");
    Ok(())
}
