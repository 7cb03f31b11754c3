use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::error::{Result, TransferError};

/// Placeholder name to value mapping substituted into export queries
pub type QueryParams = BTreeMap<String, serde_json::Value>;

/// Default statement timeout in minutes
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 60;

/// Largest timeout whose milliseconds still fit `statement_timeout` (an int4)
pub const MAX_TIMEOUT_MINUTES: u64 = i32::MAX as u64 / 60_000;

/// Compression applied to the CSV file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Raw bytes
    None,
    /// Standard gzip framing
    Gzip,
}

impl Compression {
    /// Parse the optional compression setting of a transfer.
    ///
    /// Only the exact value `"gzip"` is accepted; the mode is never inferred
    /// from the file name.
    pub fn from_setting(setting: Option<&str>) -> Result<Self> {
        match setting {
            None => Ok(Compression::None),
            Some("gzip") => Ok(Compression::Gzip),
            Some(other) => Err(TransferError::configuration(format!(
                "unsupported compression '{}', expected \"gzip\" or no compression",
                other
            ))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}

fn default_has_header() -> bool {
    true
}

fn default_timeout_minutes() -> u64 {
    DEFAULT_TIMEOUT_MINUTES
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_quote_char() -> String {
    "\"".to_string()
}

/// Configuration of a query -> CSV export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Connection identifier resolved by the connection provider
    pub conn_id: String,
    /// Literal SQL text or a path to a `.sql` file
    pub sql: String,
    /// Destination CSV path
    pub csv_file_path: PathBuf,
    /// Values for `%(name)s` placeholders in the query
    #[serde(default)]
    pub parameters: QueryParams,
    /// Write a header row
    #[serde(default = "default_has_header")]
    pub has_header: bool,
    /// `None` or `"gzip"`
    #[serde(default)]
    pub compression: Option<String>,
    /// Statement timeout in minutes
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
}

impl ExportConfig {
    pub fn new(conn_id: impl Into<String>, sql: impl Into<String>, csv_file_path: impl Into<PathBuf>) -> Self {
        Self {
            conn_id: conn_id.into(),
            sql: sql.into(),
            csv_file_path: csv_file_path.into(),
            parameters: QueryParams::new(),
            has_header: default_has_header(),
            compression: None,
            timeout_minutes: default_timeout_minutes(),
        }
    }

    /// Check the configuration and return the parsed compression mode
    pub fn validate(&self) -> Result<Compression> {
        require_non_empty("conn_id", &self.conn_id)?;
        require_non_empty("sql", &self.sql)?;
        require_non_empty("csv_file_path", &self.csv_file_path.to_string_lossy())?;
        check_timeout(self.timeout_minutes)?;
        Compression::from_setting(self.compression.as_deref())
    }
}

/// Configuration of a CSV -> table import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Connection identifier resolved by the connection provider
    pub conn_id: String,
    /// Target table, optionally `schema.table`
    pub table_name: String,
    /// Source CSV path
    pub csv_file_path: PathBuf,
    /// Explicit target columns in file order
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// First line of the file is a header
    #[serde(default = "default_has_header")]
    pub has_header: bool,
    /// Truncate the table in the same transaction before loading
    #[serde(default)]
    pub truncate: bool,
    /// `None` or `"gzip"`
    #[serde(default)]
    pub compression: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_quote_char")]
    pub quote_char: String,
    /// Token representing SQL NULL
    #[serde(default)]
    pub null_string: String,
    /// Statement timeout in minutes
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
}

/// Import settings after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub quote: u8,
    pub compression: Compression,
}

impl ImportConfig {
    pub fn new(conn_id: impl Into<String>, table_name: impl Into<String>, csv_file_path: impl Into<PathBuf>) -> Self {
        Self {
            conn_id: conn_id.into(),
            table_name: table_name.into(),
            csv_file_path: csv_file_path.into(),
            columns: None,
            has_header: default_has_header(),
            truncate: false,
            compression: None,
            delimiter: default_delimiter(),
            quote_char: default_quote_char(),
            null_string: String::new(),
            timeout_minutes: default_timeout_minutes(),
        }
    }

    /// Check the configuration and return the parsed CSV format
    pub fn validate(&self) -> Result<CsvFormat> {
        require_non_empty("conn_id", &self.conn_id)?;
        require_non_empty("table_name", &self.table_name)?;
        require_non_empty("csv_file_path", &self.csv_file_path.to_string_lossy())?;
        check_timeout(self.timeout_minutes)?;

        if self.table_name.split('.').any(|part| part.trim().is_empty()) {
            return Err(TransferError::configuration(format!(
                "invalid table name '{}'",
                self.table_name
            )));
        }

        if let Some(columns) = &self.columns {
            if columns.is_empty() {
                return Err(TransferError::configuration("column list must not be empty when provided"));
            }
            if let Some(blank) = columns.iter().position(|c| c.trim().is_empty()) {
                return Err(TransferError::configuration(format!(
                    "column {} in the column list is empty",
                    blank + 1
                )));
            }
        }

        let delimiter = single_byte("delimiter", &self.delimiter)?;
        let quote = single_byte("quote_char", &self.quote_char)?;
        if delimiter == quote {
            return Err(TransferError::configuration("delimiter and quote_char must differ"));
        }
        if self.null_string.contains(|c| c == '\r' || c == '\n') {
            return Err(TransferError::configuration("null_string must not contain line breaks"));
        }

        Ok(CsvFormat {
            delimiter,
            quote,
            compression: Compression::from_setting(self.compression.as_deref())?,
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TransferError::configuration(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_timeout(minutes: u64) -> Result<()> {
    if minutes > MAX_TIMEOUT_MINUTES {
        return Err(TransferError::configuration(format!(
            "timeout_minutes must be at most {}, got {}",
            MAX_TIMEOUT_MINUTES, minutes
        )));
    }
    Ok(())
}

// COPY accepts only single one-byte characters for DELIMITER and QUOTE
fn single_byte(field: &str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] if b.is_ascii() && *b != b'\r' && *b != b'\n' => Ok(*b),
        _ => Err(TransferError::configuration(format!(
            "{} must be a single ASCII character, got {:?}",
            field, value
        ))),
    }
}

/// A transfer described by a JSON task file, tagged by `operation`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TransferTask {
    Export(ExportConfig),
    Import(ImportConfig),
}

impl TransferTask {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| TransferError::configuration(format!("invalid task file: {}", e)))
    }

    pub fn conn_id(&self) -> &str {
        match self {
            TransferTask::Export(config) => &config.conn_id,
            TransferTask::Import(config) => &config.conn_id,
        }
    }
}

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Export,
    Import,
}

/// Outcome of one completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    pub operation_id: Uuid,
    pub direction: TransferDirection,
    pub csv_file_path: PathBuf,
    /// Target table for imports
    pub table_name: Option<String>,
    /// Data rows transferred, header excluded
    pub rows: Option<u64>,
    /// Bytes of CSV text that went through COPY
    pub bytes: u64,
    pub compression: Compression,
    pub has_header: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Rows per second, when rows and a non-zero duration are known
    pub throughput: Option<f64>,
}

impl TransferReport {
    pub fn summary(&self) -> String {
        let rows = self
            .rows
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match self.direction {
            TransferDirection::Export => format!(
                "exported {} rows ({} bytes, {}, {}) to {} in {} ms",
                rows,
                self.bytes,
                if self.has_header { "with header" } else { "no header" },
                self.compression,
                self.csv_file_path.display(),
                self.duration_ms
            ),
            TransferDirection::Import => format!(
                "loaded {} rows ({} bytes, {}) from {} into {} in {} ms",
                rows,
                self.bytes,
                self.compression,
                self.csv_file_path.display(),
                self.table_name.as_deref().unwrap_or("?"),
                self.duration_ms
            ),
        }
    }
}
