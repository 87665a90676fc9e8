//! Configuration for the interceptor proxy.
//!
//! Values are resolved in three layers: TOML file, then `INTERCEPTOR_*`
//! environment variables, then CLI flags (applied by the binary).

use serde::Deserialize;

/// Interceptor proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Host to bind the proxy to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind the proxy to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default upstream for OpenAI-compatible requests
    #[serde(default = "default_openai_url")]
    pub openai_url: String,
    /// Default upstream for Anthropic requests
    #[serde(default = "default_anthropic_url")]
    pub anthropic_url: String,
    /// Default upstream for Ollama requests (also serves passthrough traffic)
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Whether to store individual stream chunks (can be large)
    #[serde(default = "default_true")]
    pub store_chunks: bool,

    /// Verbose terminal output
    #[serde(default)]
    pub verbose: bool,
    /// Suppress terminal output
    #[serde(default)]
    pub quiet: bool,

    /// Redact API keys from stored headers
    #[serde(default = "default_true")]
    pub redact: bool,
    /// Also redact bearer-shaped secrets inside stored request bodies
    #[serde(default)]
    pub redact_body: bool,

    /// Upstream connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle timeout between upstream bytes in seconds
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Optional hard cap on a whole upstream exchange in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// How long shutdown waits for in-flight requests to finish
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            openai_url: default_openai_url(),
            anthropic_url: default_anthropic_url(),
            ollama_url: default_ollama_url(),
            db_path: default_db_path(),
            store_chunks: true,
            verbose: false,
            quiet: false,
            redact: true,
            redact_body: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            request_timeout_secs: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_openai_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_db_path() -> String {
    "wiretap.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_read_timeout_secs() -> u64 {
    120
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Config {
    /// Listen address in `host:port` form.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Apply `INTERCEPTOR_*` environment variable overrides on top of the
    /// current values. Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INTERCEPTOR_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("INTERCEPTOR_PORT") {
            match v.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid INTERCEPTOR_PORT: {v}"),
            }
        }
        if let Ok(v) = std::env::var("INTERCEPTOR_OPENAI_URL") {
            self.openai_url = v;
        }
        if let Ok(v) = std::env::var("INTERCEPTOR_ANTHROPIC_URL") {
            self.anthropic_url = v;
        }
        if let Ok(v) = std::env::var("INTERCEPTOR_OLLAMA_URL") {
            self.ollama_url = v;
        }
        if let Ok(v) = std::env::var("INTERCEPTOR_DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = env_bool("INTERCEPTOR_STORE_CHUNKS") {
            self.store_chunks = v;
        }
        if let Some(v) = env_bool("INTERCEPTOR_VERBOSE") {
            self.verbose = v;
        }
        if let Some(v) = env_bool("INTERCEPTOR_QUIET") {
            self.quiet = v;
        }
        if let Some(v) = env_bool("INTERCEPTOR_REDACT") {
            self.redact = v;
        }
        if let Some(v) = env_bool("INTERCEPTOR_REDACT_BODY") {
            self.redact_body = v;
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Ignoring invalid boolean {name}={value}");
            None
        }
    }
}
