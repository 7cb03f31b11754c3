// Driver boundary: connection capability and connection lookup
use async_trait::async_trait;
use serde_json::Value;
use std::io::{Read, Write};

use crate::connection::mogrify::{parse_placeholders, Segment};
use crate::error::{Result, TransferError};
use crate::types::QueryParams;

/// A live database connection as seen by the transfer engines.
///
/// Implementations own the wire protocol. File errors raised while
/// streaming are reported as `FileWrite`/`FileRead` with an empty path; the
/// caller attaches the real path with [`TransferError::at_path`].
#[async_trait]
pub trait Connection: Send {
    /// Start a transaction
    async fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> Result<()>;

    /// Run a statement that returns no rows
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Render `value` as a SQL string literal, escaped by the driver
    async fn quote_literal(&mut self, value: &str) -> Result<String>;

    /// Run `COPY ... TO STDOUT` and stream its output into `sink`.
    ///
    /// Returns the number of bytes received.
    async fn copy_out(&mut self, sql: &str, sink: &mut (dyn Write + Send)) -> Result<u64>;

    /// Run `COPY ... FROM STDIN` feeding it from `source`.
    ///
    /// Returns the number of rows loaded as reported by the server.
    async fn copy_in(&mut self, sql: &str, source: &mut (dyn Read + Send)) -> Result<u64>;

    /// Give the connection back. A connection released with a transaction
    /// still open must not be reused.
    fn release(&mut self);

    /// Substitute `%(name)s` placeholders with driver-quoted literals.
    ///
    /// With no parameters the query is returned untouched, `%` signs included.
    async fn mogrify(&mut self, sql: &str, params: &QueryParams) -> Result<String> {
        if params.is_empty() {
            return Ok(sql.to_string());
        }

        let segments = parse_placeholders(sql)?;
        let mut rendered = String::with_capacity(sql.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Param(name) => {
                    let value = params.get(name).ok_or_else(|| {
                        TransferError::configuration(format!("missing query parameter '{}'", name))
                    })?;
                    let literal = match value {
                        Value::Null => "NULL".to_string(),
                        Value::Bool(b) => b.to_string(),
                        Value::Number(n) => {
                            let rendered = n.to_string();
                            // A leading '-' after a '-' in the query would start a comment
                            if rendered.starts_with('-') {
                                format!("({})", rendered)
                            } else {
                                rendered
                            }
                        }
                        Value::String(s) => self.quote_literal(s).await?,
                        // Arrays and objects travel as their JSON text
                        other => self.quote_literal(&other.to_string()).await?,
                    };
                    rendered.push_str(&literal);
                }
            }
        }
        Ok(rendered)
    }
}

/// Resolves connection identifiers to live connections
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn get(&self, conn_id: &str) -> Result<Box<dyn Connection>>;
}
