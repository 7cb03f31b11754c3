// tokio-postgres implementation of the connection boundary
use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::Object;
use futures::{SinkExt, StreamExt};
use std::io::{ErrorKind, Read, Write};
use tokio_postgres::error::SqlState;
use tokio_postgres::CopyInSink;
use tracing::{debug, warn};

use crate::connection::provider::Connection;
use crate::error::{Result, TransferError};
use crate::transfer::stream::COPY_CHUNK_SIZE;

/// Map a driver error onto the transfer error taxonomy.
///
/// Statements cancelled by `statement_timeout` surface as `Timeout`.
pub fn map_db_error(error: tokio_postgres::Error) -> TransferError {
    if error.code() == Some(&SqlState::QUERY_CANCELED) {
        return TransferError::timeout(error.to_string());
    }
    match error.as_db_error() {
        Some(db) => {
            let mut message = format!("{} (SQLSTATE {})", db.message(), db.code().code());
            if let Some(detail) = db.detail() {
                message.push_str(": ");
                message.push_str(detail);
            }
            if let Some(context) = db.where_() {
                message.push_str(" [");
                message.push_str(context);
                message.push(']');
            }
            TransferError::query(message)
        }
        None => TransferError::query(error.to_string()),
    }
}

/// Pooled PostgreSQL connection
pub struct PgConnection {
    conn_id: String,
    client: Option<Object>,
    in_transaction: bool,
}

impl PgConnection {
    pub fn new(conn_id: impl Into<String>, client: Object) -> Self {
        Self {
            conn_id: conn_id.into(),
            client: Some(client),
            in_transaction: false,
        }
    }

    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| TransferError::connection(&self.conn_id, "connection already released"))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn begin(&mut self) -> Result<()> {
        self.client()?.batch_execute("BEGIN").await.map_err(map_db_error)?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client()?.batch_execute("COMMIT").await.map_err(map_db_error)?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client()?.batch_execute("ROLLBACK").await.map_err(map_db_error)?;
        self.in_transaction = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(conn_id = %self.conn_id, sql = sql, "Executing statement");
        self.client()?.batch_execute(sql).await.map_err(map_db_error)
    }

    async fn quote_literal(&mut self, value: &str) -> Result<String> {
        let row = self
            .client()?
            .query_one("SELECT quote_literal($1::text)", &[&value])
            .await
            .map_err(map_db_error)?;
        Ok(row.get(0))
    }

    async fn copy_out(&mut self, sql: &str, sink: &mut (dyn Write + Send)) -> Result<u64> {
        debug!(conn_id = %self.conn_id, sql = sql, "Starting COPY TO STDOUT");
        let stream = self.client()?.copy_out(sql).await.map_err(map_db_error)?;
        futures::pin_mut!(stream);

        let mut received = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_db_error)?;
            sink.write_all(&chunk)
                .map_err(|e| TransferError::file_write("", e))?;
            received += chunk.len() as u64;
        }
        Ok(received)
    }

    async fn copy_in(&mut self, sql: &str, source: &mut (dyn Read + Send)) -> Result<u64> {
        debug!(conn_id = %self.conn_id, sql = sql, "Starting COPY FROM STDIN");
        let sink: CopyInSink<Bytes> = self.client()?.copy_in(sql).await.map_err(map_db_error)?;
        futures::pin_mut!(sink);

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Dropping the unfinished sink aborts the COPY on the server
                Err(e) => return Err(TransferError::file_read("", e)),
            };
            sink.send(Bytes::copy_from_slice(&buffer[..read]))
                .await
                .map_err(map_db_error)?;
        }

        sink.finish().await.map_err(map_db_error)
    }

    fn release(&mut self) {
        if let Some(client) = self.client.take() {
            if self.in_transaction {
                warn!(conn_id = %self.conn_id, "Discarding connection with an open transaction");
                drop(Object::take(client));
            } else {
                debug!(conn_id = %self.conn_id, "Returning connection to pool");
            }
        }
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        self.release();
    }
}
