// Scoped connection handle with a per-execution transaction state machine
use std::fmt;
use std::io::{Read, Write};
use tracing::{debug, warn};

use crate::connection::provider::{Connection, ConnectionProvider};
use crate::error::{Result, TransferError};
use crate::transfer::copy_command::statement_timeout_command;
use crate::types::QueryParams;

/// Lifecycle of a session.
///
/// `Idle -> Connected -> Executing -> {Committed, RolledBack} -> Closed`.
/// `RolledBack` is also reached from `Connected` when setup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Executing,
    Committed,
    RolledBack,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connected => "connected",
            SessionState::Executing => "executing",
            SessionState::Committed => "committed",
            SessionState::RolledBack => "rolled_back",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One execution's connection and transaction.
///
/// Work runs between [`Session::begin`] and [`Session::finish`]; `finish`
/// commits or rolls back depending on the outcome it is given and always
/// releases the connection.
pub struct Session {
    conn_id: String,
    connection: Option<Box<dyn Connection>>,
    state: SessionState,
    history: Vec<SessionState>,
}

impl Session {
    /// Acquire a connection for `conn_id`
    pub async fn open(provider: &dyn ConnectionProvider, conn_id: &str) -> Result<Self> {
        let connection = provider.get(conn_id).await?;
        let mut session = Self {
            conn_id: conn_id.to_string(),
            connection: Some(connection),
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        };
        session.transition(SessionState::Connected);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state the session has been in, oldest first
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn transition(&mut self, next: SessionState) {
        debug!(conn_id = %self.conn_id, from = %self.state, to = %next, "Session transition");
        self.state = next;
        self.history.push(next);
    }

    fn connection(&mut self, expected: SessionState) -> Result<&mut Box<dyn Connection>> {
        if self.state != expected {
            return Err(TransferError::connection(
                &self.conn_id,
                format!("session is {}, expected {}", self.state, expected),
            ));
        }
        self.connection
            .as_mut()
            .ok_or_else(|| TransferError::connection(&self.conn_id, "session has no connection"))
    }

    /// Start the transaction and bound every statement in it by `timeout_minutes`
    pub async fn begin(&mut self, timeout_minutes: u64) -> Result<()> {
        self.connection(SessionState::Connected)?.begin().await?;
        self.transition(SessionState::Executing);
        self.connection(SessionState::Executing)?
            .execute(&statement_timeout_command(timeout_minutes))
            .await
    }

    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        self.connection(SessionState::Executing)?.execute(sql).await
    }

    pub async fn mogrify(&mut self, sql: &str, params: &QueryParams) -> Result<String> {
        self.connection(SessionState::Executing)?.mogrify(sql, params).await
    }

    pub async fn copy_out(&mut self, sql: &str, sink: &mut (dyn Write + Send)) -> Result<u64> {
        self.connection(SessionState::Executing)?.copy_out(sql, sink).await
    }

    pub async fn copy_in(&mut self, sql: &str, source: &mut (dyn Read + Send)) -> Result<u64> {
        self.connection(SessionState::Executing)?.copy_in(sql, source).await
    }

    /// Settle the transaction according to `outcome` and close the session.
    ///
    /// A failed commit is rolled back and returned as the error. When the
    /// outcome is already an error, a rollback failure is logged and the
    /// original error is returned.
    pub async fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        let settled = match (self.state, outcome) {
            (SessionState::Executing, Ok(value)) => {
                let committed = match self.connection.as_mut() {
                    Some(connection) => connection.commit().await,
                    None => Err(TransferError::connection(&self.conn_id, "session has no connection")),
                };
                match committed {
                    Ok(()) => {
                        self.transition(SessionState::Committed);
                        Ok(value)
                    }
                    Err(e) => {
                        warn!(conn_id = %self.conn_id, error = %e, "Commit failed, rolling back");
                        self.rollback().await;
                        Err(e)
                    }
                }
            }
            (SessionState::Executing, Err(e)) => {
                self.rollback().await;
                Err(e)
            }
            (SessionState::Connected, Err(e)) => {
                // Nothing was started on the server
                self.transition(SessionState::RolledBack);
                Err(e)
            }
            (_, outcome) => outcome,
        };

        self.close();
        settled
    }

    async fn rollback(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            if let Err(e) = connection.rollback().await {
                warn!(conn_id = %self.conn_id, error = %e, "Rollback failed");
            }
        }
        self.transition(SessionState::RolledBack);
    }

    fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.release();
        }
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closed);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!(
                conn_id = %self.conn_id,
                state = %self.state,
                "Session dropped before finishing, releasing connection"
            );
            self.close();
        }
    }
}
