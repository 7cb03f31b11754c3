// Resolution of `sql` values into query text
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, TransferError};

/// File extensions that mark a `sql` value as a file reference
pub const SQL_FILE_EXTENSIONS: &[&str] = &["sql"];

/// Turns a `sql` value into the SQL text to run.
///
/// Values ending in a SQL file extension are file references: absolute
/// paths are read directly, relative ones are looked up in the search paths
/// in order and finally in the working directory. Anything else is literal SQL.
#[derive(Debug, Clone, Default)]
pub struct SqlResolver {
    search_paths: Vec<PathBuf>,
}

impl SqlResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Whether `sql` names a SQL file rather than holding SQL text
    pub fn is_file_reference(sql: &str) -> bool {
        Path::new(sql.trim())
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| SQL_FILE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
            .unwrap_or(false)
    }

    /// Return the SQL text for `sql`
    pub fn resolve(&self, sql: &str) -> Result<String> {
        if !Self::is_file_reference(sql) {
            return Ok(sql.to_string());
        }

        let reference = sql.trim();
        let path = self.locate(reference)?;
        debug!("Reading SQL from {}", path.display());

        let text = std::fs::read_to_string(&path).map_err(|e| {
            TransferError::sql_resolution(format!("cannot read SQL file {}: {}", path.display(), e))
        })?;
        if text.trim().is_empty() {
            return Err(TransferError::sql_resolution(format!(
                "SQL file {} is empty",
                path.display()
            )));
        }
        Ok(text)
    }

    fn locate(&self, reference: &str) -> Result<PathBuf> {
        let reference_path = Path::new(reference);
        let candidates: Vec<PathBuf> = if reference_path.is_absolute() {
            vec![reference_path.to_path_buf()]
        } else {
            self.search_paths
                .iter()
                .map(|dir| dir.join(reference_path))
                .chain(std::iter::once(reference_path.to_path_buf()))
                .collect()
        };

        for candidate in &candidates {
            match std::fs::metadata(candidate) {
                Ok(meta) if meta.is_file() => return Ok(candidate.clone()),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(TransferError::sql_resolution(format!(
                        "cannot access SQL file {}: {}",
                        candidate.display(),
                        e
                    )))
                }
            }
        }

        Err(TransferError::sql_resolution(format!(
            "SQL file '{}' not found (searched: {})",
            reference,
            candidates
                .iter()
                .map(|c| c.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}
