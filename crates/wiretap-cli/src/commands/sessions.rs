use clap::Parser;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use wiretap::storage::InteractionStore;

use crate::error::CliResult;
use crate::output::{format_timestamp, OutputFormat};

#[derive(Parser)]
pub struct SessionsCommand {}

impl SessionsCommand {
    pub fn execute(&self, store: &InteractionStore, format: OutputFormat) -> CliResult<()> {
        let sessions = store.list_sessions()?;

        if let OutputFormat::Json = format {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
            return Ok(());
        }

        if sessions.is_empty() {
            println!("No sessions found.");
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(["Session", "Count", "Models", "Started"]);
        for session in &sessions {
            table.add_row([
                session.session_id.clone(),
                session.interaction_count.to_string(),
                session.models.join(", "),
                session
                    .first_interaction
                    .map(|t| format_timestamp(&t))
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        println!("{table}");

        // Sessionless traffic is easy to forget about; surface the count
        let stats = store.stats()?;
        let in_sessions: u64 = sessions.iter().map(|s| s.interaction_count).sum();
        let without = stats.total_interactions.saturating_sub(in_sessions);
        if without > 0 {
            println!("\n  + {without} interactions without a session ID");
        }
        Ok(())
    }
}
