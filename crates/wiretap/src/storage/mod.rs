mod migrations;
mod store;

pub use migrations::{apply_migrations, SCHEMA_VERSION};
pub use store::{InteractionFilter, InteractionStore};
