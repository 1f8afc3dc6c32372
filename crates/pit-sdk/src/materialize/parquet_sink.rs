//! Parquet sink with staged writes.
//!
//! Rows are written to a hidden temporary file next to the destination and
//! renamed into place only on commit. An aborted or dropped sink deletes the
//! temporary file, so `{name}.parquet` exists only when it is complete.
//!
//! Every non-empty batch is flushed as its own row group: the encoder never
//! buffers more than the batch currently being appended.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tempfile::NamedTempFile;

use super::{BatchSink, MaterializeError};

/// Counters for one committed session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub batches: usize,
    pub rows: u64,
    pub row_groups: usize,
    /// In-memory size of the largest batch appended.
    pub peak_batch_bytes: usize,
    /// Largest encoder buffer observed before a row group flush.
    pub peak_buffered_bytes: usize,
}

enum SinkState {
    Pending,
    Open {
        writer: ArrowWriter<File>,
        staged: NamedTempFile,
    },
    Committed,
    Aborted,
}

pub struct ParquetSink {
    path: PathBuf,
    props: WriterProperties,
    state: SinkState,
    stats: SinkStats,
}

impl ParquetSink {
    /// Sink targeting `path`. Nothing touches the filesystem until `open`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        Self::with_properties(path, props)
    }

    pub fn with_properties(path: impl Into<PathBuf>, props: WriterProperties) -> Self {
        Self {
            path: path.into(),
            props,
            state: SinkState::Pending,
            stats: SinkStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    fn stage(&self) -> Result<NamedTempFile, MaterializeError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".partial")
            .tempfile_in(dir)?)
    }
}

impl BatchSink for ParquetSink {
    type Output = SinkStats;

    fn open(&mut self, schema: SchemaRef) -> Result<(), MaterializeError> {
        if !matches!(self.state, SinkState::Pending) {
            return Err(MaterializeError::Lifecycle("open called twice"));
        }

        let staged = self.stage()?;
        let file = staged.as_file().try_clone()?;
        let writer = ArrowWriter::try_new(file, schema, Some(self.props.clone()))?;

        tracing::debug!(
            path = %self.path.display(),
            staged = %staged.path().display(),
            "Opened parquet sink"
        );
        self.state = SinkState::Open { writer, staged };
        Ok(())
    }

    fn append(&mut self, batch: &RecordBatch) -> Result<(), MaterializeError> {
        let SinkState::Open { writer, .. } = &mut self.state else {
            return Err(MaterializeError::Lifecycle("append on a sink that is not open"));
        };

        self.stats.batches += 1;
        if batch.num_rows() == 0 {
            return Ok(());
        }

        writer.write(batch)?;
        self.stats.peak_buffered_bytes = self
            .stats
            .peak_buffered_bytes
            .max(writer.in_progress_size());
        writer.flush()?;

        self.stats.rows += batch.num_rows() as u64;
        self.stats.row_groups += 1;
        self.stats.peak_batch_bytes = self
            .stats
            .peak_batch_bytes
            .max(batch.get_array_memory_size());
        Ok(())
    }

    fn commit(&mut self) -> Result<SinkStats, MaterializeError> {
        let (writer, staged) = match std::mem::replace(&mut self.state, SinkState::Aborted) {
            SinkState::Open { writer, staged } => (writer, staged),
            other => {
                self.state = other;
                return Err(MaterializeError::Lifecycle("commit on a sink that is not open"));
            }
        };

        // On any error below `staged` is dropped, which deletes the partial file.
        writer.close()?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| e.error)?;

        self.state = SinkState::Committed;
        tracing::debug!(
            path = %self.path.display(),
            rows = self.stats.rows,
            row_groups = self.stats.row_groups,
            "Committed parquet output"
        );
        Ok(self.stats.clone())
    }

    fn abort(&mut self) {
        if let SinkState::Open { staged, .. } = std::mem::replace(&mut self.state, SinkState::Aborted)
        {
            tracing::warn!(
                path = %self.path.display(),
                staged = %staged.path().display(),
                "Discarding partial parquet output"
            );
        }
    }
}

impl Drop for ParquetSink {
    fn drop(&mut self) {
        if matches!(self.state, SinkState::Open { .. }) {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("amount", DataType::Float64, true),
        ]))
    }

    fn batch(len: usize) -> RecordBatch {
        let ids = Int64Array::from_iter_values(0..len as i64);
        let amounts = Float64Array::from_iter_values((0..len).map(|i| i as f64 * 1.5));
        RecordBatch::try_new(schema(), vec![Arc::new(ids), Arc::new(amounts)]).unwrap()
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn commit_publishes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.parquet");

        let mut sink = ParquetSink::new(&path);
        sink.open(schema()).unwrap();
        sink.append(&batch(4)).unwrap();
        assert!(!path.exists(), "nothing published before commit");

        let stats = sink.commit().unwrap();
        assert_eq!(stats.rows, 4);
        assert_eq!(stats.row_groups, 1);
        assert_eq!(dir_entries(dir.path()), ["orders.parquet"]);
    }

    #[test]
    fn abort_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.parquet");

        let mut sink = ParquetSink::new(&path);
        sink.open(schema()).unwrap();
        sink.append(&batch(10)).unwrap();
        sink.abort();

        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn drop_while_open_discards_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = ParquetSink::new(dir.path().join("orders.parquet"));
            sink.open(schema()).unwrap();
            sink.append(&batch(3)).unwrap();
        }
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn one_row_group_per_non_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.parquet");

        let mut sink = ParquetSink::new(&path);
        sink.open(schema()).unwrap();
        for len in [3, 0, 5, 2] {
            sink.append(&batch(len)).unwrap();
        }
        let stats = sink.commit().unwrap();
        assert_eq!(stats.batches, 4);
        assert_eq!(stats.row_groups, 3);

        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 3);
        assert_eq!(builder.metadata().file_metadata().num_rows(), 10);
    }

    #[test]
    fn empty_session_writes_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");

        let mut sink = ParquetSink::new(&path);
        sink.open(schema()).unwrap();
        sink.commit().unwrap();

        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.schema().fields(), schema().fields());
        assert_eq!(builder.metadata().file_metadata().num_rows(), 0);
    }

    #[test]
    fn lifecycle_misuse_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ParquetSink::new(dir.path().join("x.parquet"));

        assert!(matches!(
            sink.append(&batch(1)),
            Err(MaterializeError::Lifecycle(_))
        ));
        assert!(matches!(sink.commit(), Err(MaterializeError::Lifecycle(_))));

        sink.open(schema()).unwrap();
        assert!(matches!(
            sink.open(schema()),
            Err(MaterializeError::Lifecycle(_))
        ));
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/orders.parquet");

        let mut sink = ParquetSink::new(&path);
        sink.open(schema()).unwrap();
        sink.append(&batch(1)).unwrap();
        sink.commit().unwrap();
        assert!(path.exists());
    }
}
