use thiserror::Error;

/// Main error type for pgcsv transfers
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("SQL resolution error: {message}")]
    SqlResolution { message: String },

    #[error("Query execution error: {message}")]
    QueryExecution { message: String },

    #[error("File write error for {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("File read error for {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Statement timed out: {message}")]
    Timeout { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection error for '{conn_id}': {message}")]
    Connection { conn_id: String, message: String },
}

impl TransferError {
    pub fn sql_resolution(message: impl Into<String>) -> Self {
        Self::SqlResolution { message: message.into() }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::QueryExecution { message: message.into() }
    }

    pub fn file_write(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileWrite { path: path.into(), source }
    }

    pub fn file_read(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileRead { path: path.into(), source }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn connection(conn_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection { conn_id: conn_id.into(), message: message.into() }
    }

    /// Attach a file path to a file error raised inside a COPY stream, where
    /// the connection only sees an anonymous reader or writer
    pub fn at_path(self, path: &std::path::Path) -> Self {
        match self {
            Self::FileWrite { path: p, source } if p.is_empty() => Self::FileWrite {
                path: path.display().to_string(),
                source,
            },
            Self::FileRead { path: p, source } if p.is_empty() => Self::FileRead {
                path: path.display().to_string(),
                source,
            },
            other => other,
        }
    }

    /// Short machine-readable name of the error class, used in reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SqlResolution { .. } => "sql_resolution",
            Self::QueryExecution { .. } => "query_execution",
            Self::FileWrite { .. } => "file_write",
            Self::FileNotFound { .. } => "file_not_found",
            Self::FileRead { .. } => "file_read",
            Self::Timeout { .. } => "timeout",
            Self::Configuration { .. } => "configuration",
            Self::Connection { .. } => "connection",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
