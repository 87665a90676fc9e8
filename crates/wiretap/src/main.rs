//! Wiretap daemon - transparent logging proxy for LLM agent traffic

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wiretap::config::Config;
use wiretap::error::Result;
use wiretap::proxy::ProxyServer;
use wiretap::storage::InteractionStore;
use wiretap::WiretapError;

/// Wiretap - transparent HTTP proxy that records LLM agent traffic
#[derive(Parser)]
#[command(name = "wiretap")]
#[command(about = "A transparent HTTP proxy that records LLM agent traffic")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the interceptor proxy (default command)
    Start(StartArgs),
}

#[derive(Args, Default)]
pub struct StartArgs {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to the SQLite database
    #[arg(long = "db")]
    pub db_path: Option<String>,

    /// OpenAI upstream base URL
    #[arg(long)]
    pub openai_url: Option<String>,

    /// Anthropic upstream base URL
    #[arg(long)]
    pub anthropic_url: Option<String>,

    /// Ollama upstream base URL
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// Verbose output
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Suppress terminal output
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Disable API key redaction in stored headers
    #[arg(long)]
    pub no_redact: bool,

    /// Don't store individual stream chunks
    #[arg(long)]
    pub no_store_chunks: bool,
}

#[tokio::main]
async fn main() {
    // Usage errors exit 1, runtime errors exit 2; help and version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let args = match cli.command {
        Some(Command::Start(args)) => args,
        None => StartArgs::default(),
    };

    init_logging(args.verbose);

    let mut config = load_config(cli.config)?;
    config.apply_env_overrides();
    apply_cli_overrides(&mut config, &args);
    tracing::debug!("Config loaded: {:?}", config);

    let store = InteractionStore::open(std::path::Path::new(&config.db_path), config.store_chunks)?;

    let server = ProxyServer::new(config, store);
    server.serve().await?;

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "debug,wiretap=trace"
    } else {
        "info,wiretap=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            WiretapError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| WiretapError::Config(format!("Failed to parse config: {e}")))?;
        return Ok(config);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".wiretap").join("config.toml")),
        dirs::config_dir().map(|c| c.join("wiretap").join("config.toml")),
        Some(PathBuf::from("wiretap.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            let content = std::fs::read_to_string(path).map_err(|e| {
                WiretapError::Config(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| WiretapError::Config(format!("Failed to parse config: {e}")))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

fn apply_cli_overrides(config: &mut Config, args: &StartArgs) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_path) = &args.db_path {
        config.db_path = db_path.clone();
    }
    if let Some(url) = &args.openai_url {
        config.openai_url = url.clone();
    }
    if let Some(url) = &args.anthropic_url {
        config.anthropic_url = url.clone();
    }
    if let Some(url) = &args.ollama_url {
        config.ollama_url = url.clone();
    }
    if args.verbose {
        config.verbose = true;
    }
    if args.quiet {
        config.quiet = true;
    }
    if args.no_redact {
        config.redact = false;
    }
    if args.no_store_chunks {
        config.store_chunks = false;
    }
}
