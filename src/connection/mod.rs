// Connection/resource management: providers, PostgreSQL driver, scoped sessions
pub mod mogrify;
pub mod postgres;
pub mod provider;
pub mod registry;
pub mod session;

#[cfg(test)]
mod tests;

pub use postgres::{map_db_error, PgConnection};
pub use provider::{Connection, ConnectionProvider};
pub use registry::{ConnectionRegistry, ConnectionSpec, DEFAULT_ENV_PREFIX};
pub use session::{Session, SessionState};
