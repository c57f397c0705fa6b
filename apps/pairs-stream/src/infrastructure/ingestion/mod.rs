//! Stream ingestion: per-symbol connections and the manager that owns them.

mod connection;
mod manager;
mod status;

pub use connection::StreamConnection;
pub use manager::IngestionManager;
pub use status::{ConnectionSnapshot, ConnectionStatus};
