use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::BridgeConfig,
    template::default_config_template,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "wabridge.toml",
    "wabridge.yaml",
    "wabridge.yml",
    "wabridge.json",
];

/// A loaded config together with the file it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: BridgeConfig,
    pub path: Option<PathBuf>,
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Load the explicit path if given, otherwise discover one.
///
/// Search order:
/// 1. `./wabridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wabridge/wabridge.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `BridgeConfig::default()` when nothing is found. A file
/// that exists but fails to parse is an error.
pub fn load_or_discover(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    let Some(path) = path else {
        debug!("no config file found, using defaults");
        return Ok(LoadedConfig::default());
    };

    debug!(path = %path.display(), "loading config");
    let config = load_config(&path)?;
    Ok(LoadedConfig {
        config,
        path: Some(path),
    })
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/wabridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "wabridge").map(|d| d.config_dir().to_path_buf())
}

/// Apply `WABRIDGE_*` environment overrides on top of the file config.
pub fn apply_env_overrides(config: &mut BridgeConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

pub(crate) fn apply_env_overrides_with(
    config: &mut BridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("WABRIDGE_BASE_URL") {
        config.completion.base_url = v;
    }
    if let Some(v) = get("WABRIDGE_MODEL") {
        config.completion.model = v;
    }
    if let Some(v) = get("WABRIDGE_SYSTEM_PROMPT") {
        config.completion.system_prompt = v;
    }
    if let Some(v) = get("WABRIDGE_AUTH_DIR") {
        config.session.auth_dir = PathBuf::from(v);
    }
    if let Some(v) = get("WABRIDGE_SIDECAR_URL") {
        config.sidecar.url = Some(v);
    }
    if let Some(v) = get("WABRIDGE_SIDECAR_DIR") {
        config.sidecar.dir = Some(PathBuf::from(v));
    }
}

/// Write the commented default template to `<dir>/wabridge.toml`.
///
/// An existing file is only replaced when `force` is set.
pub fn write_default_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILENAMES[0]);
    if path.exists() && !force {
        return Err(Error::AlreadyExists { path });
    }
    std::fs::create_dir_all(dir).map_err(|source| Error::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    std::fs::write(&path, default_config_template()).map_err(|source| Error::Write {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "wrote default config");
    Ok(path)
}

fn parse_config(raw: &str, path: &Path) -> Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
