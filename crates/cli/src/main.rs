mod auth_commands;
mod bridge;
mod config_commands;

use std::{path::PathBuf, process::ExitCode};

use {
    clap::{Parser, Subcommand},
    tracing::{error, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wabridge_config::LoadedConfig,
};

/// Runtime error after startup.
const EXIT_RUNTIME: u8 = 1;
/// Invalid configuration or missing API key.
const EXIT_CONFIG: u8 = 2;
/// The session supervisor gave up.
const EXIT_FAILED: u8 = 3;

#[derive(Parser)]
#[command(name = "wabridge", version, about = "wabridge: WhatsApp auto-replies from an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: discover wabridge.{toml,yaml,yml,json}).
    #[arg(long, global = true, env = "WABRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Credentials directory (overrides [session].auth_dir).
    #[arg(long, global = true)]
    auth_dir: Option<PathBuf>,

    /// Sidecar WebSocket URL (overrides [sidecar].url).
    #[arg(long, global = true)]
    sidecar_url: Option<String>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Connect to WhatsApp and answer direct messages (default).
    Run,
    /// Validate the configuration and report errors/warnings.
    Check,
    /// Write a commented default config to the user config directory.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Unlink this device from WhatsApp and delete the stored credentials.
    Logout,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// File config, then `WABRIDGE_*` env vars, then command line flags.
fn load_config(cli: &Cli) -> anyhow::Result<LoadedConfig> {
    let mut loaded = wabridge_config::load_or_discover(cli.config.as_deref())?;
    wabridge_config::apply_env_overrides(&mut loaded.config);
    if let Some(ref dir) = cli.auth_dir {
        loaded.config.session.auth_dir = dir.clone();
    }
    if let Some(ref url) = cli.sidecar_url {
        loaded.config.sidecar.url = Some(url.clone());
    }
    Ok(loaded)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Init { force } = command {
        return finish(config_commands::init(force).map(|()| ExitCode::SUCCESS));
    }

    let loaded = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        },
    };

    match command {
        Commands::Check => config_commands::check(&loaded),
        Commands::Logout => finish(
            auth_commands::logout(&loaded.config)
                .await
                .map(|()| ExitCode::SUCCESS),
        ),
        Commands::Run | Commands::Init { .. } => {
            if !config_commands::report(&loaded) {
                return ExitCode::from(EXIT_CONFIG);
            }
            info!(version = env!("CARGO_PKG_VERSION"), "wabridge starting");
            finish(bridge::run(loaded.config, cli.json_logs).await)
        },
    }
}

fn finish(result: anyhow::Result<ExitCode>) -> ExitCode {
    result.unwrap_or_else(|e| {
        error!("{e:#}");
        ExitCode::from(EXIT_RUNTIME)
    })
}
