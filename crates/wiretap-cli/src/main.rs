use std::path::Path;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use wiretap::storage::InteractionStore;

use wiretap_cli::commands::{
    ExportCommand, ReplayCommand, SaveCommand, SessionsCommand, StatsCommand,
};
use wiretap_cli::error::CliResult;
use wiretap_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "wiretap-cli")]
#[command(about = "Query and export captured LLM interactions")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(
        long = "db",
        global = true,
        default_value = "wiretap.db",
        help = "Path to the SQLite database"
    )]
    pub db_path: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Print recent interactions")]
    Replay(ReplayCommand),

    #[clap(about = "Export interactions as JSON or JSONL")]
    Export(ExportCommand),

    #[clap(about = "Show aggregate statistics")]
    Stats(StatsCommand),

    #[clap(about = "List captured sessions")]
    Sessions(SessionsCommand),

    #[clap(about = "Export one session's interactions to a file")]
    Save(SaveCommand),
}

fn main() {
    // Usage errors exit 1, runtime errors exit 2 (clap's default usage exit
    // code is 2, which we reserve for runtime failures)
    let matches = match Cli::command().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let store = InteractionStore::open(Path::new(&cli.db_path), true)?;

    match &cli.command {
        Command::Replay(cmd) => cmd.execute(&store, format),
        Command::Export(cmd) => cmd.execute(&store),
        Command::Stats(cmd) => cmd.execute(&store, format),
        Command::Sessions(cmd) => cmd.execute(&store, format),
        Command::Save(cmd) => cmd.execute(&store),
    }
}
