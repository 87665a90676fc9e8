mod export;
mod replay;
mod save;
mod sessions;
mod stats;

pub use export::{ExportCommand, ExportFormat};
pub use replay::ReplayCommand;
pub use save::SaveCommand;
pub use sessions::SessionsCommand;
pub use stats::StatsCommand;
