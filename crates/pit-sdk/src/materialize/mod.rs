//! Bounded-memory materialization of record batch streams.
//!
//! A session pulls batches one at a time from a [`RecordBatchReader`] and
//! hands each to a [`BatchSink`] before fetching the next. Nothing keeps a
//! reference to a batch once it has been appended, so peak memory tracks the
//! largest single batch rather than the whole result.
//!
//! Sink lifecycle per session:
//! - `open(schema)` once, before the first batch
//! - `append(batch)` per batch, in arrival order
//! - exactly one of `commit()` (success) or `abort()` (first failure)

mod parquet_sink;

pub use self::parquet_sink::{ParquetSink, SinkStats};

use std::io;

use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use parquet::errors::ParquetError;

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("sink write failed: {0}")]
    Io(#[from] io::Error),

    #[error("batch source failed after {batches_read} batches: {source}")]
    Source {
        batches_read: usize,
        #[source]
        source: ArrowError,
    },

    #[error("batch {batch_index} does not match the session schema")]
    SchemaMismatch { batch_index: usize },

    #[error("parquet encoding failed: {0}")]
    Parquet(#[from] ParquetError),

    #[error("sink used out of order: {0}")]
    Lifecycle(&'static str),
}

/// Destination for one materialization session.
pub trait BatchSink {
    /// Returned by a successful commit.
    type Output;

    fn open(&mut self, schema: SchemaRef) -> Result<(), MaterializeError>;

    fn append(&mut self, batch: &RecordBatch) -> Result<(), MaterializeError>;

    /// Finalize. On error the sink must not leave a complete-looking artifact.
    fn commit(&mut self) -> Result<Self::Output, MaterializeError>;

    /// Discard everything written so far.
    fn abort(&mut self);
}

/// Drain `source` into `sink`, returning the total number of rows written.
///
/// The sink is opened with the source's declared schema before the first
/// batch is pulled and closed exactly once: committed when the source is
/// exhausted, aborted on the first failure.
pub fn materialize<R, S>(source: R, sink: &mut S) -> Result<u64, MaterializeError>
where
    R: RecordBatchReader,
    S: BatchSink,
{
    let schema = source.schema();

    let drained = sink
        .open(schema.clone())
        .and_then(|()| drain(source, &schema, sink));

    match drained {
        Ok(rows) => {
            sink.commit()?;
            Ok(rows)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Materialization failed, aborting sink");
            sink.abort();
            Err(e)
        }
    }
}

fn drain<R, S>(source: R, schema: &SchemaRef, sink: &mut S) -> Result<u64, MaterializeError>
where
    R: RecordBatchReader,
    S: BatchSink,
{
    let mut rows = 0u64;

    for (index, batch) in source.enumerate() {
        let batch = batch.map_err(|source| MaterializeError::Source {
            batches_read: index,
            source,
        })?;

        if batch.schema().fields() != schema.fields() {
            return Err(MaterializeError::SchemaMismatch { batch_index: index });
        }

        sink.append(&batch)?;
        rows += batch.num_rows() as u64;
        tracing::trace!(batch = index, batch_rows = batch.num_rows(), rows, "Batch appended");
    }

    Ok(rows)
}
