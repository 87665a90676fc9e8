use clap::Parser;
use wiretap::storage::{InteractionFilter, InteractionStore};

use crate::commands::export::{attach_chunks, render, ExportFormat};
use crate::error::{CliError, CliResult};

#[derive(Parser)]
pub struct SaveCommand {
    /// Session to export
    pub session_id: String,

    #[clap(long, short = 'o', help = "Output file (default: <session_id>.json)")]
    pub output: Option<String>,

    #[clap(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,
}

impl SaveCommand {
    pub fn execute(&self, store: &InteractionStore) -> CliResult<()> {
        let filter = InteractionFilter {
            session_id: Some(self.session_id.clone()),
            ..Default::default()
        };
        let interactions = store.list_interactions(u32::MAX, 0, &filter)?;
        if interactions.is_empty() {
            return Err(CliError::NotFound(format!(
                "No interactions found for session '{}'",
                self.session_id
            )));
        }

        let interactions = attach_chunks(store, interactions, true)?;
        let text = render(&interactions, self.format)?;

        let out_path = self
            .output
            .clone()
            .unwrap_or_else(|| format!("{}.json", self.session_id));
        std::fs::write(&out_path, &text)?;

        let size_kb = text.len() as f64 / 1024.0;
        println!(
            "Exported {} interactions from session '{}' to {out_path} ({size_kb:.0} KB)",
            interactions.len(),
            self.session_id,
        );
        Ok(())
    }
}
