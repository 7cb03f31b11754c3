pub mod error;
pub mod types;
pub mod sql_resolver;
pub mod connection;
pub mod transfer;
pub mod monitoring;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Connection, ConnectionProvider, ConnectionRegistry, ConnectionSpec, Session, SessionState};
pub use error::{Result, TransferError};
pub use sql_resolver::SqlResolver;
pub use transfer::{Exporter, Importer};
pub use types::{Compression, ExportConfig, ImportConfig, QueryParams, TransferDirection, TransferReport, TransferTask};
