use clap::{Parser, ValueEnum};
use wiretap::model::Interaction;
use wiretap::storage::{InteractionFilter, InteractionStore};

use crate::error::CliResult;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ExportFormat {
    /// Single array with embedded stream chunks
    #[default]
    Json,
    /// One interaction per line, chunks only with --verbose
    Jsonl,
}

#[derive(Parser)]
pub struct ExportCommand {
    #[clap(long = "last", default_value = "50", help = "Number of interactions to export")]
    pub limit: u32,

    #[clap(long, help = "Filter by provider")]
    pub provider: Option<String>,

    #[clap(long, help = "Filter by model")]
    pub model: Option<String>,

    #[clap(long, short = 'o', help = "Output file (default: stdout)")]
    pub output: Option<String>,

    #[clap(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,

    #[clap(long, short = 'v', help = "Embed stream chunks in JSONL output")]
    pub verbose: bool,
}

impl ExportCommand {
    pub fn execute(&self, store: &InteractionStore) -> CliResult<()> {
        let filter = InteractionFilter {
            provider: self.provider.clone(),
            model: self.model.clone(),
            session_id: None,
        };
        let interactions = store.list_interactions(self.limit, 0, &filter)?;

        let with_chunks = matches!(self.format, ExportFormat::Json) || self.verbose;
        let interactions = attach_chunks(store, interactions, with_chunks)?;

        let text = render(&interactions, self.format)?;

        if let Some(path) = &self.output {
            std::fs::write(path, &text)?;
            println!("Exported {} interactions to {path}", interactions.len());
        } else {
            println!("{text}");
        }
        Ok(())
    }
}

pub fn attach_chunks(
    store: &InteractionStore,
    interactions: Vec<Interaction>,
    with_chunks: bool,
) -> CliResult<Vec<Interaction>> {
    if !with_chunks {
        return Ok(interactions);
    }
    let mut full = Vec::with_capacity(interactions.len());
    for interaction in interactions {
        match store.get_interaction(&interaction.id)? {
            Some(loaded) => full.push(loaded),
            None => full.push(interaction),
        }
    }
    Ok(full)
}

pub fn render(interactions: &[Interaction], format: ExportFormat) -> CliResult<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(interactions)?),
        ExportFormat::Jsonl => {
            let lines: Vec<String> = interactions
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<_, _>>()?;
            Ok(lines.join("\n"))
        }
    }
}
