//! Inter-task data passing through the run's data directory.
//!
//! Tasks publish named outputs as `{data_dir}/{name}.parquet`; downstream
//! tasks stream them back as record batches. The orchestrator can bulk-load
//! the same files via the `load_data` operation.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatchReader;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::errors::ParquetError;
use tracing::Span;

use crate::materialize::{MaterializeError, ParquetSink, SinkStats, materialize};

pub const OUTPUT_EXTENSION: &str = "parquet";

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("invalid output name '{0}': must be non-empty and contain no path separators")]
    InvalidName(String),

    #[error("no output named '{name}' at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read parquet: {0}")]
    Parquet(#[from] ParquetError),
}

/// Result of publishing one named output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub path: PathBuf,
    pub rows: u64,
    pub stats: SinkStats,
}

/// The task's private working-data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    span: Span,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            span: Span::none(),
        }
    }

    /// Record reads and writes under `span`.
    pub fn in_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{name}.parquet`.
    pub fn output_path(&self, name: &str) -> Result<PathBuf, DataError> {
        validate_name(name)?;
        Ok(self.root.join(format!("{name}.{OUTPUT_EXTENSION}")))
    }

    /// Stream `source` into the named output. The file appears only once
    /// every batch has been written.
    pub fn write_output<R>(&self, name: &str, source: R) -> Result<Materialized, DataError>
    where
        R: RecordBatchReader,
    {
        let _entered = self.span.enter();
        let path = self.output_path(name)?;
        let mut sink = ParquetSink::new(&path);

        let rows = materialize(source, &mut sink)?;
        tracing::info!(output = name, rows, path = %path.display(), "Wrote output");

        Ok(Materialized {
            path,
            rows,
            stats: sink.stats().clone(),
        })
    }

    /// Open a named output for streaming reads.
    pub fn read_input(&self, name: &str) -> Result<ParquetRecordBatchReader, DataError> {
        self.read_input_with_batch_size(name, DEFAULT_READ_BATCH_SIZE)
    }

    pub fn read_input_with_batch_size(
        &self,
        name: &str,
        batch_size: usize,
    ) -> Result<ParquetRecordBatchReader, DataError> {
        let _entered = self.span.enter();
        let path = self.output_path(name)?;
        let file = File::open(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                DataError::NotFound {
                    name: name.to_string(),
                    path: path.clone(),
                }
            } else {
                DataError::Open {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(batch_size)
            .build()?;
        Ok(reader)
    }
}

/// Rows per batch when streaming an input back.
pub const DEFAULT_READ_BATCH_SIZE: usize = 65536;

fn validate_name(name: &str) -> Result<(), DataError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if invalid {
        return Err(DataError::InvalidName(name.to_string()));
    }
    Ok(())
}
