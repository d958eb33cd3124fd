//! Spawning and stopping the Baileys sidecar (`node index.js`).

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        process::{Child, Command},
    },
    tracing::{Level, debug, error, info, warn},
};

/// Environment variable pointing at the sidecar checkout.
pub const SIDECAR_DIR_ENV: &str = "WABRIDGE_SIDECAR_DIR";

const ENTRYPOINT: &str = "index.js";
const RELATIVE_DIRS: [&str; 3] = ["sidecar/baileys", "../sidecar/baileys", "../../sidecar/baileys"];
const STARTUP_GRACE: Duration = Duration::from_millis(500);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running sidecar. Killed when dropped.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    /// SIGTERM, then SIGKILL if the process has not exited after a few
    /// seconds.
    pub async fn stop(mut self) -> Result<()> {
        info!(port = self.port, "stopping sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };
            if let Some(pid) = self.child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        let _ = self.child.start_kill();

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!(%status, "sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "failed waiting for sidecar"),
            Err(_) => {
                warn!("sidecar ignored SIGTERM, killing it");
                self.child.kill().await.context("killing sidecar")?;
            },
        }
        Ok(())
    }
}

fn is_sidecar_dir(path: &Path) -> bool {
    path.join("package.json").is_file()
}

/// Locate the sidecar checkout: `explicit`, then `$WABRIDGE_SIDECAR_DIR`,
/// then `sidecar/baileys` next to the executable or the working directory.
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    find_sidecar_dir_with(explicit, std::env::var_os(SIDECAR_DIR_ENV).map(PathBuf::from))
}

fn find_sidecar_dir_with(explicit: Option<&Path>, from_env: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if is_sidecar_dir(path) {
            return Ok(path.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", path.display());
    }

    if let Some(path) = from_env {
        if is_sidecar_dir(&path) {
            return Ok(path);
        }
        warn!(path = %path.display(), "{SIDECAR_DIR_ENV} has no package.json, searching defaults");
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let candidates = exe_dir
        .iter()
        .flat_map(|dir| RELATIVE_DIRS.iter().skip(1).map(move |rel| dir.join(rel)))
        .chain(RELATIVE_DIRS.iter().map(PathBuf::from));

    for candidate in candidates {
        if is_sidecar_dir(&candidate) {
            return Ok(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    bail!(
        "Baileys sidecar not found; set {SIDECAR_DIR_ENV} or [sidecar].dir to a directory \
         containing package.json"
    )
}

/// Install dependencies if needed, start `node index.js` listening on
/// `port` with its signal keys under `keys_dir`, and forward its output to
/// tracing.
pub async fn start_sidecar(dir: &Path, port: u16, keys_dir: &Path) -> Result<SidecarProcess> {
    if !dir.join("node_modules").is_dir() {
        npm_install(dir).await?;
    }

    info!(path = %dir.display(), port, "starting sidecar");
    let mut child = Command::new("node")
        .arg(ENTRYPOINT)
        .current_dir(dir)
        .env("WABRIDGE_SIDECAR_PORT", port.to_string())
        .env("WABRIDGE_SIDECAR_KEYS_DIR", keys_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn node; is Node.js installed?")?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, true));
    }

    tokio::time::sleep(STARTUP_GRACE).await;
    if let Some(status) = child.try_wait().context("checking sidecar status")? {
        bail!("sidecar exited during startup with {status}");
    }

    info!(port, "sidecar running");
    Ok(SidecarProcess { child, port })
}

async fn npm_install(dir: &Path) -> Result<()> {
    info!(path = %dir.display(), "installing sidecar dependencies");
    let output = Command::new("npm")
        .arg("install")
        .arg("--omit=dev")
        .current_dir(dir)
        .output()
        .await
        .context("failed to run npm install")?;
    if !output.status.success() {
        bail!(
            "npm install failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Map a pino numeric level to a tracing level.
fn pino_level(level: u64) -> Level {
    match level {
        0..=20 => Level::DEBUG,
        21..=30 => Level::INFO,
        31..=40 => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Split a sidecar output line into level and message. Pino JSON lines
/// carry their own level; anything else gets `fallback`.
fn parse_log_line(line: &str, fallback: Level) -> (Level, String) {
    if line.starts_with('{')
        && let Ok(record) = serde_json::from_str::<serde_json::Value>(line)
    {
        let level = record
            .get("level")
            .and_then(serde_json::Value::as_u64)
            .map_or(fallback, pino_level);
        let msg = record
            .get("msg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(line);
        return (level, msg.to_string());
    }
    (fallback, line.to_string())
}

async fn forward_lines(reader: impl AsyncRead + Unpin, stderr: bool) {
    let fallback = if stderr {
        Level::WARN
    } else {
        Level::INFO
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let (level, msg) = parse_log_line(&line, fallback);
        if level == Level::ERROR {
            error!(target: "whatsapp_sidecar", "{msg}");
        } else if level == Level::WARN {
            warn!(target: "whatsapp_sidecar", "{msg}");
        } else if level == Level::INFO {
            info!(target: "whatsapp_sidecar", "{msg}");
        } else {
            debug!(target: "whatsapp_sidecar", "{msg}");
        }
    }
}
