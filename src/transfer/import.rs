// CSV -> table import engine
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionProvider, Session};
use crate::error::{Result, TransferError};
use crate::monitoring::OperationTracker;
use crate::transfer::copy_command::{truncate_command, ImportCommand};
use crate::transfer::stream::{first_record_width, open_source, CountingReader};
use crate::types::{CsvFormat, ImportConfig, TransferDirection, TransferReport};

/// Loads CSV files into tables
pub struct Importer {
    provider: Arc<dyn ConnectionProvider>,
}

impl Importer {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { provider }
    }

    /// Load `config.csv_file_path` into `config.table_name` in one transaction
    pub async fn import(&self, config: &ImportConfig) -> Result<TransferReport> {
        let tracker = OperationTracker::start(
            TransferDirection::Import,
            &config.conn_id,
            config.table_name.clone(),
        );

        match self.run(config, &tracker).await {
            Ok(mut report) => {
                let metric = tracker.complete_success(report.rows, report.bytes);
                report.duration_ms = metric.duration_ms;
                report.throughput = metric.throughput;
                Ok(report)
            }
            Err(e) => {
                tracker.complete_failure(&e);
                Err(e)
            }
        }
    }

    async fn run(&self, config: &ImportConfig, tracker: &OperationTracker) -> Result<TransferReport> {
        let format = config.validate()?;
        let path = config.csv_file_path.as_path();

        if !path.exists() {
            return Err(TransferError::file_not_found(path.display().to_string()));
        }

        if let Some(columns) = &config.columns {
            check_column_count(path, columns, &format)?;
        }

        let source = open_source(path, format.compression)
            .map_err(|e| TransferError::file_read(path.display().to_string(), e))?;
        let mut source = CountingReader::new(source);

        let command = ImportCommand {
            table_name: &config.table_name,
            columns: config.columns.as_deref(),
            has_header: config.has_header,
            delimiter: &config.delimiter,
            quote_char: &config.quote_char,
            null_string: &config.null_string,
        }
        .to_sql();
        debug!("Import command: {}", command);

        info!("Loading {} into {}", path.display(), config.table_name);

        let mut session = Session::open(self.provider.as_ref(), &config.conn_id).await?;
        let outcome: Result<u64> = async {
            session.begin(config.timeout_minutes).await?;
            if config.truncate {
                info!("Truncating {} before load", config.table_name);
                session.execute(&truncate_command(&config.table_name)).await?;
            }
            session
                .copy_in(&command, &mut source)
                .await
                .map_err(|e| e.at_path(path))
        }
        .await;
        let rows = session.finish(outcome).await?;

        info!(
            "Loaded {} rows from {} into {}",
            rows,
            path.display(),
            config.table_name
        );

        Ok(TransferReport {
            operation_id: tracker.operation_id,
            direction: TransferDirection::Import,
            csv_file_path: config.csv_file_path.clone(),
            table_name: Some(config.table_name.clone()),
            rows: Some(rows),
            bytes: source.bytes_read(),
            compression: format.compression,
            has_header: config.has_header,
            started_at: tracker.start_time,
            duration_ms: tracker.elapsed_ms(),
            throughput: None,
        })
    }
}

/// Fail fast when an explicit column list does not match the file's width.
///
/// The first record is read through the decompressor with the configured
/// delimiter and quote. An empty file has nothing to check.
fn check_column_count(path: &Path, columns: &[String], format: &CsvFormat) -> Result<()> {
    let source: Box<dyn Read + Send> = open_source(path, format.compression)
        .map_err(|e| TransferError::file_read(path.display().to_string(), e))?;

    let width = first_record_width(source, format.delimiter, format.quote).map_err(|e| {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => TransferError::file_read(path.display().to_string(), io),
            other => TransferError::configuration(format!(
                "cannot read first record of {}: {:?}",
                path.display(),
                other
            )),
        }
    })?;

    match width {
        None => {
            warn!("{} is empty, skipping column count check", path.display());
            Ok(())
        }
        Some(width) if width == columns.len() => Ok(()),
        Some(width) => Err(TransferError::configuration(format!(
            "{} has {} field(s) per record but {} column(s) were given: {}",
            path.display(),
            width,
            columns.len(),
            columns.join(", ")
        ))),
    }
}
