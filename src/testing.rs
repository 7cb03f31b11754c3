// In-memory connection provider for unit tests
use async_trait::async_trait;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::connection::{Connection, ConnectionProvider};
use crate::error::{Result, TransferError};
use crate::transfer::copy_command::quote_literal;

/// Calls received by mock connections, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin,
    Execute(String),
    QuoteLiteral(String),
    CopyOut(String),
    CopyIn(String),
    Commit,
    Rollback,
    Release,
}

/// Failure injected into a mock connection
#[derive(Debug, Clone)]
pub enum Failure {
    Query(String),
    Timeout,
}

impl Failure {
    fn to_error(&self) -> TransferError {
        match self {
            Failure::Query(message) => TransferError::query(message.clone()),
            Failure::Timeout => TransferError::timeout("canceling statement due to statement timeout"),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<Call>,
    pub connections_opened: usize,
    /// Bytes served by COPY TO STDOUT
    pub copy_out_data: Vec<u8>,
    /// Bytes received by COPY FROM STDIN
    pub copied_in: Vec<u8>,
    pub fail_begin: Option<Failure>,
    pub fail_copy: Option<Failure>,
    pub fail_commit: Option<Failure>,
}

/// Provider handing out connections that share one recorded state
#[derive(Clone, Default)]
pub struct MockProvider {
    pub state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_copy_out(data: &[u8]) -> Self {
        let provider = Self::new();
        provider.state.lock().unwrap().copy_out_data = data.to_vec();
        provider
    }

    pub fn fail_begin(&self, failure: Failure) {
        self.state.lock().unwrap().fail_begin = Some(failure);
    }

    pub fn fail_copy(&self, failure: Failure) {
        self.state.lock().unwrap().fail_copy = Some(failure);
    }

    pub fn fail_commit(&self, failure: Failure) {
        self.state.lock().unwrap().fail_commit = Some(failure);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn copied_in(&self) -> Vec<u8> {
        self.state.lock().unwrap().copied_in.clone()
    }

    pub fn connections_opened(&self) -> usize {
        self.state.lock().unwrap().connections_opened
    }

    /// Statements passed to `execute`, in order
    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// The single COPY statement issued, if any
    pub fn copy_command(&self) -> Option<String> {
        self.calls().into_iter().find_map(|call| match call {
            Call::CopyOut(sql) | Call::CopyIn(sql) => Some(sql),
            _ => None,
        })
    }
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    async fn get(&self, conn_id: &str) -> Result<Box<dyn Connection>> {
        if conn_id == "unknown" {
            return Err(TransferError::connection(conn_id, "connection is not registered"));
        }
        self.state.lock().unwrap().connections_opened += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn begin(&mut self) -> Result<()> {
        self.record(Call::Begin);
        match &self.state.lock().unwrap().fail_begin {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.record(Call::Commit);
        match &self.state.lock().unwrap().fail_commit {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record(Call::Rollback);
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.record(Call::Execute(sql.to_string()));
        Ok(())
    }

    async fn quote_literal(&mut self, value: &str) -> Result<String> {
        self.record(Call::QuoteLiteral(value.to_string()));
        Ok(quote_literal(value))
    }

    async fn copy_out(&mut self, sql: &str, sink: &mut (dyn Write + Send)) -> Result<u64> {
        self.record(Call::CopyOut(sql.to_string()));
        let (data, failure) = {
            let state = self.state.lock().unwrap();
            (state.copy_out_data.clone(), state.fail_copy.clone())
        };

        // Deliver in two chunks, failing midway when asked to
        let split = data.len() / 2;
        sink.write_all(&data[..split])
            .map_err(|e| TransferError::file_write("", e))?;
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }
        sink.write_all(&data[split..])
            .map_err(|e| TransferError::file_write("", e))?;
        Ok(data.len() as u64)
    }

    async fn copy_in(&mut self, sql: &str, source: &mut (dyn Read + Send)) -> Result<u64> {
        self.record(Call::CopyIn(sql.to_string()));
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .map_err(|e| TransferError::file_read("", e))?;

        let mut state = self.state.lock().unwrap();
        if let Some(failure) = &state.fail_copy {
            return Err(failure.to_error());
        }

        let lines = data.iter().filter(|&&b| b == b'\n').count() as u64;
        let header = u64::from(sql.contains("HEADER true") && lines > 0);
        state.copied_in = data;
        Ok(lines - header)
    }

    fn release(&mut self) {
        self.record(Call::Release);
    }
}
