//! Configuration loading, validation and env substitution.
//!
//! Config files: `wabridge.toml`, `wabridge.yaml` or `wabridge.json`,
//! searched in `./` then `~/.config/wabridge/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod template;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        LoadedConfig, apply_env_overrides, config_dir, find_config_file, load_config,
        load_or_discover, write_default_config,
    },
    schema::{
        BatchMode, BridgeConfig, BrowserConfig, CompletionConfig, DEFAULT_SIDECAR_PORT,
        DispatchMode, ReconnectConfig, RoutingConfig, SessionConfig, SidecarConfig,
    },
    template::default_config_template,
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_with},
};
