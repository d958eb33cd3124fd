//! Default configuration template with all options documented.
//!
//! Written by `wabridge init`. Every value matches the built-in default, so
//! an untouched template behaves exactly like running without a file.

use crate::schema::DEFAULT_SIDECAR_PORT;

/// Generate the default config template.
pub fn default_config_template() -> String {
    format!(
        r##"# wabridge configuration
# ======================
# Every option is listed with its default value.
# Changes require a restart to take effect.
#
# Environment variable substitution is supported: ${{ENV_VAR}}
# Example: api_key = "${{TOGETHER_API_KEY}}"

# ══════════════════════════════════════════════════════════════════════════════
# COMPLETION
# ══════════════════════════════════════════════════════════════════════════════
# OpenAI-compatible chat completion endpoint (Together AI by default).

[completion]
base_url = "https://api.together.xyz/v1"     # "/chat/completions" is appended
model = "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free"
system_prompt = "You are a helpful business assistant."
api_key_env = "TOGETHER_API_KEY"             # Env var holding the API key (or put it in .env)
# api_key = "..."                            # Inline key, takes precedence over api_key_env
timeout_secs = 60                            # Per-request timeout
max_retries = 1                              # Extra attempts on connect errors, 429 and 5xx
retry_backoff_ms = 500                       # First retry delay, doubled on each further retry
fallback_reply = "Sorry, I couldn't process your request. Please try again later."

# ══════════════════════════════════════════════════════════════════════════════
# SESSION
# ══════════════════════════════════════════════════════════════════════════════

[session]
browser = ["MacOS", "Safari", "14.0"]        # Device identity shown under Linked devices
sync_full_history = false
connect_timeout_ms = 60000
default_query_timeout_ms = 60000             # Also bounds each outbound send
mark_online_on_connect = true
emit_own_events = true                       # Own messages are still ignored by the router
auth_dir = "auth_info"                       # Pairing credentials (creds.json) live here

# ══════════════════════════════════════════════════════════════════════════════
# RECONNECT
# ══════════════════════════════════════════════════════════════════════════════

[reconnect]
initial_delay_ms = 1000
max_delay_ms = 60000
multiplier = 2.0
jitter = 0.2                                 # Fraction of the delay added or removed at random
max_attempts = 10                            # Consecutive failures before giving up (0 = never)

# ══════════════════════════════════════════════════════════════════════════════
# ROUTING
# ══════════════════════════════════════════════════════════════════════════════

[routing]
allowlist = []                               # Sender JIDs or numbers, "*" wildcards ([] = everyone)
batch_mode = "all"                           # "all" or "first_only" record of each batch
dispatch_mode = "per_sender"                 # "per_sender" (concurrent senders) or "sequential"
worker_idle_secs = 300                       # Idle sender queues are dropped after this

# ══════════════════════════════════════════════════════════════════════════════
# SIDECAR
# ══════════════════════════════════════════════════════════════════════════════
# The WhatsApp Web protocol is spoken by a small Baileys process.

[sidecar]
port = {DEFAULT_SIDECAR_PORT}
auto_start = false                           # Spawn sidecar/baileys with node on startup
# url = "ws://127.0.0.1:{DEFAULT_SIDECAR_PORT}"          # Connect to an already running sidecar instead
# dir = "/path/to/sidecar/baileys"           # Sidecar checkout (default: searched near the binary)
"##
    )
}
