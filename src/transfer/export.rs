// Query -> CSV export engine
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::connection::{ConnectionProvider, Session};
use crate::error::{Result, TransferError};
use crate::monitoring::OperationTracker;
use crate::sql_resolver::SqlResolver;
use crate::transfer::copy_command::{clean_query, export_command};
use crate::transfer::stream::{CompressedWriter, CountingWriter, COPY_CHUNK_SIZE};
use crate::types::{Compression, ExportConfig, TransferDirection, TransferReport};

/// Counts produced by the COPY stream
struct ExportCounts {
    records: u64,
    bytes: u64,
}

/// Streams query results into CSV files
pub struct Exporter {
    provider: Arc<dyn ConnectionProvider>,
    resolver: SqlResolver,
}

impl Exporter {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            resolver: SqlResolver::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: SqlResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run the query of `config` and write its result set to `config.csv_file_path`.
    ///
    /// The file appears at its destination only once the copy has completed
    /// and the transaction has committed.
    pub async fn export(&self, config: &ExportConfig) -> Result<TransferReport> {
        let tracker = OperationTracker::start(
            TransferDirection::Export,
            &config.conn_id,
            config.csv_file_path.display().to_string(),
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

    async fn run(&self, config: &ExportConfig, tracker: &OperationTracker) -> Result<TransferReport> {
        let compression = config.validate()?;

        // Resolved before any connection is opened
        let sql = self.resolver.resolve(&config.sql)?;
        let query = clean_query(&sql);
        if query.is_empty() {
            return Err(TransferError::sql_resolution("query is empty"));
        }

        let path = config.csv_file_path.as_path();
        info!("Running query and saving to CSV: {}", path.display());

        let mut staging = create_staging_file(path)?;
        let mut session = Session::open(self.provider.as_ref(), &config.conn_id).await?;
        let outcome = stream_export(&mut session, config, query, compression, staging.as_file_mut()).await;
        let counts = session.finish(outcome).await?;

        staging
            .persist(path)
            .map_err(|e| TransferError::file_write(path.display().to_string(), e.error))?;

        let rows = if config.has_header {
            counts.records.saturating_sub(1)
        } else {
            counts.records
        };

        info!(
            "CSV saved: {} ({} rows, {})",
            path.display(),
            rows,
            if config.has_header { "with header" } else { "no header" }
        );

        Ok(TransferReport {
            operation_id: tracker.operation_id,
            direction: TransferDirection::Export,
            csv_file_path: config.csv_file_path.clone(),
            table_name: None,
            rows: Some(rows),
            bytes: counts.bytes,
            compression,
            has_header: config.has_header,
            started_at: tracker.start_time,
            duration_ms: tracker.elapsed_ms(),
            throughput: None,
        })
    }
}

/// Create the temporary file the export is written to, next to its destination
fn create_staging_file(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let display = path.display().to_string();

    fs::create_dir_all(&dir).map_err(|e| TransferError::file_write(&display, e))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".pgcsv-").suffix(".partial");
    // Same mode as a freshly created file: 0666 minus the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    builder
        .tempfile_in(&dir)
        .map_err(|e| TransferError::file_write(&display, e))
}

async fn stream_export(
    session: &mut Session,
    config: &ExportConfig,
    query: &str,
    compression: Compression,
    file: &mut File,
) -> Result<ExportCounts> {
    let path = config.csv_file_path.as_path();
    let display = path.display().to_string();

    session.begin(config.timeout_minutes).await?;
    let formatted = session.mogrify(query, &config.parameters).await?;
    let command = export_command(&formatted, config.has_header);
    debug!("Export command: {}", command);

    let buffered = BufWriter::with_capacity(COPY_CHUNK_SIZE, file);
    let mut writer = CountingWriter::new(CompressedWriter::new(buffered, compression), b'"');
    session
        .copy_out(&command, &mut writer)
        .await
        .map_err(|e| e.at_path(path))?;

    let counts = ExportCounts {
        records: writer.records(),
        bytes: writer.bytes(),
    };

    let buffered = writer
        .into_inner()
        .finish()
        .map_err(|e| TransferError::file_write(&display, e))?;
    let file = buffered
        .into_inner()
        .map_err(|e| TransferError::file_write(&display, e.into_error()))?;
    file.sync_all()
        .map_err(|e| TransferError::file_write(&display, e))?;

    Ok(counts)
}
