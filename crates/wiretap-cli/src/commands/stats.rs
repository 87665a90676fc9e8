use clap::Parser;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use wiretap::storage::InteractionStore;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct StatsCommand {}

impl StatsCommand {
    pub fn execute(&self, store: &InteractionStore, format: OutputFormat) -> CliResult<()> {
        let stats = store.stats()?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            OutputFormat::Table => {
                println!("Wiretap Statistics");
                println!("==================\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Metric", "Value"]);
                table.add_row([
                    "Total interactions".to_string(),
                    stats.total_interactions.to_string(),
                ]);
                table.add_row(["Errors".to_string(), stats.error_count.to_string()]);
                table.add_row([
                    "Error rate".to_string(),
                    format!("{:.1}%", stats.error_rate * 100.0),
                ]);
                table.add_row([
                    "Avg latency".to_string(),
                    stats
                        .avg_latency_ms
                        .map(|ms| format!("{ms:.0} ms"))
                        .unwrap_or_else(|| "-".to_string()),
                ]);
                table.add_row(["Total tokens".to_string(), stats.total_tokens.to_string()]);
                println!("{table}\n");

                if !stats.by_provider.is_empty() {
                    let mut table = Table::new();
                    table
                        .load_preset(UTF8_FULL_CONDENSED)
                        .set_header(["Provider", "Count"]);
                    for (provider, count) in &stats.by_provider {
                        table.add_row([provider.clone(), count.to_string()]);
                    }
                    println!("{table}\n");
                }

                if !stats.by_model.is_empty() {
                    let mut table = Table::new();
                    table
                        .load_preset(UTF8_FULL_CONDENSED)
                        .set_header(["Model", "Count"]);
                    for (model, count) in &stats.by_model {
                        table.add_row([model.clone(), count.to_string()]);
                    }
                    println!("{table}");
                }
            }
        }
        Ok(())
    }
}
