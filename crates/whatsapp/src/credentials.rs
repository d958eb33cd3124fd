//! Persistence for the pairing credentials reported by the transport.

use std::path::PathBuf;

use {
    async_trait::async_trait,
    tracing::{debug, info},
};

use wabridge_channels::{Credentials, Error, Result};

const CREDS_FILE: &str = "creds.json";

/// Stores the opaque credential blob between runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `None` when nothing has been saved yet (first pairing).
    async fn load(&self) -> Result<Option<Credentials>>;

    /// Replace the stored credentials.
    async fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Forget the stored credentials. Idempotent.
    async fn clear(&self) -> Result<()>;
}

/// `<auth_dir>/creds.json`, written via a temp file and rename so a crash
/// never leaves a truncated file behind.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{CREDS_FILE}.tmp"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        let path = self.path();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no stored credentials");
                return Ok(None);
            },
            Err(e) => {
                return Err(Error::external(
                    format!("reading {}", path.display()),
                    e,
                ));
            },
        };
        let creds = serde_json::from_slice(&raw)?;
        debug!(path = %path.display(), "loaded stored credentials");
        Ok(Some(creds))
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::external(format!("creating {}", self.dir.display()), e))?;

        let data = serde_json::to_vec_pretty(credentials)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| Error::external(format!("writing {}", tmp.display()), e))?;

        let path = self.path();
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::external(format!("renaming to {}", path.display()), e))?;

        debug!(path = %path.display(), bytes = data.len(), "credentials saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let path = self.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "stored credentials removed");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::external(format!("removing {}", path.display()), e)),
        }
    }
}
