use clap::Parser;
use wiretap::model::Interaction;
use wiretap::storage::{InteractionFilter, InteractionStore};

use crate::error::CliResult;
use crate::output::{format_timestamp, truncate_string, OutputFormat};

#[derive(Parser)]
pub struct ReplayCommand {
    #[clap(long = "last", default_value = "10", help = "Number of recent interactions")]
    pub limit: u32,

    #[clap(long, help = "Filter by provider")]
    pub provider: Option<String>,

    #[clap(long, help = "Filter by model")]
    pub model: Option<String>,

    #[clap(long, short = 'v', help = "Show full details")]
    pub verbose: bool,
}

impl ReplayCommand {
    pub fn execute(&self, store: &InteractionStore, format: OutputFormat) -> CliResult<()> {
        let filter = InteractionFilter {
            provider: self.provider.clone(),
            model: self.model.clone(),
            session_id: None,
        };
        let mut interactions = store.list_interactions(self.limit, 0, &filter)?;
        if interactions.is_empty() {
            println!("No interactions found.");
            return Ok(());
        }
        // Display oldest first
        interactions.reverse();

        if let OutputFormat::Json = format {
            println!("{}", serde_json::to_string_pretty(&interactions)?);
            return Ok(());
        }

        for interaction in &interactions {
            self.print_interaction(interaction);
        }
        Ok(())
    }

    fn print_interaction(&self, interaction: &Interaction) {
        let status = interaction
            .response
            .status_code
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let latency = interaction
            .metrics
            .total_latency_ms
            .map(|ms| format!("{ms:.0}ms"))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "[{}] {} {} {} -> {} ({}, {} chunks)",
            format_timestamp(&interaction.started_at),
            interaction.provider,
            interaction.method,
            interaction.path,
            status,
            latency,
            interaction.chunk_count,
        );
        if let Some(session) = &interaction.session_id {
            println!("  session: {session}");
        }
        if let Some(model) = &interaction.request.model {
            println!("  model: {model}");
        }
        if let Some(error) = &interaction.error {
            println!("  error: {error}");
        }
        if let Some(text) = &interaction.response.reconstructed_text {
            if self.verbose {
                println!("  response: {text}");
            } else {
                println!("  response: {}", truncate_string(text, 120));
            }
        }
        if self.verbose {
            if let Some(system) = &interaction.request.system_prompt {
                println!("  system: {}", truncate_string(system, 200));
            }
            if let Some(tool_calls) = &interaction.response.tool_calls {
                println!("  tool calls: {}", tool_calls.len());
            }
        }
        println!();
    }
}
