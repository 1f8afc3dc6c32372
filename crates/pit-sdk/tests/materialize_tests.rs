//! Materialization into Parquet through the public API.

use std::fs::File;
use std::sync::Arc;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchIterator, RecordBatchReader};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pit_sdk::{DataDir, ParquetSink, materialize};

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("customer", DataType::Utf8, true),
    ]))
}

fn batch(start: i64, len: usize) -> RecordBatch {
    let ids = Int64Array::from_iter_values(start..start + len as i64);
    let customers: StringArray = (0..len)
        .map(|i| (i % 7 != 0).then(|| format!("customer-{}", (start as usize + i) % 50)))
        .collect();
    RecordBatch::try_new(schema(), vec![Arc::new(ids), Arc::new(customers)]).unwrap()
}

/// `len` rows split into batches of `chunk` rows.
fn chunked(len: usize, chunk: usize) -> Vec<RecordBatch> {
    (0..len)
        .step_by(chunk)
        .map(|start| batch(start as i64, chunk.min(len - start)))
        .collect()
}

fn source(batches: Vec<RecordBatch>) -> impl RecordBatchReader {
    RecordBatchIterator::new(batches.into_iter().map(Ok), schema())
}

#[test]
fn mixed_batches_sum_rows_and_keep_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.parquet");

    let mut sink = ParquetSink::new(&path);
    let rows = materialize(source(vec![batch(0, 3), batch(3, 0), batch(3, 5)]), &mut sink).unwrap();
    assert_eq!(rows, 8);

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap()).unwrap();
    assert_eq!(builder.schema().fields(), schema().fields());
    assert_eq!(builder.metadata().file_metadata().num_rows(), 8);

    let ids: Vec<i64> = builder
        .build()
        .unwrap()
        .flat_map(|b| {
            let b = b.unwrap();
            let col = b
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap()
                .clone();
            col.values().to_vec()
        })
        .collect();
    assert_eq!(ids, (0..8).collect::<Vec<_>>());
}

#[test]
fn stats_report_per_batch_peaks() {
    let dir = tempfile::tempdir().unwrap();
    const ROWS: usize = 20_000;

    let mut whole = ParquetSink::new(dir.path().join("whole.parquet"));
    materialize(source(chunked(ROWS, ROWS)), &mut whole).unwrap();

    let mut streamed = ParquetSink::new(dir.path().join("streamed.parquet"));
    materialize(source(chunked(ROWS, 500)), &mut streamed).unwrap();

    let (whole, streamed) = (whole.stats(), streamed.stats());
    assert_eq!((whole.rows, whole.row_groups), (ROWS as u64, 1));
    assert_eq!((streamed.rows, streamed.row_groups), (ROWS as u64, ROWS / 500));
    assert_eq!(streamed.batches, ROWS / 500);

    // Encoder buffers are flushed per batch, so they never hold more than one.
    assert!(
        streamed.peak_buffered_bytes < whole.peak_buffered_bytes,
        "{streamed:?} vs {whole:?}"
    );
}

#[test]
fn data_dir_round_trip_in_small_batches() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());

    let out = data.write_output("orders", source(chunked(1_000, 100))).unwrap();
    assert_eq!(out.rows, 1_000);
    assert_eq!(out.stats.row_groups, 10);
    assert_eq!(out.path, dir.path().join("orders.parquet"));

    let reader = data.read_input_with_batch_size("orders", 64).unwrap();
    let sizes: Vec<usize> = reader.map(|b| b.unwrap().num_rows()).collect();
    assert!(sizes.iter().all(|&n| n <= 64));
    assert_eq!(sizes.iter().sum::<usize>(), 1_000);
}

#[test]
fn zero_row_output_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::new(dir.path());

    let out = data.write_output("nothing", source(Vec::new())).unwrap();
    assert_eq!(out.rows, 0);

    let reader = data.read_input("nothing").unwrap();
    assert_eq!(reader.schema().fields(), schema().fields());
    assert_eq!(reader.count(), 0);
}

#[test]
fn failed_stream_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.parquet");

    let items = vec![
        Ok(batch(0, 10)),
        Ok(batch(10, 10)),
        Err(ArrowError::ComputeError("query cancelled".to_string())),
    ];
    let mut sink = ParquetSink::new(&path);
    let err = materialize(RecordBatchIterator::new(items, schema()), &mut sink).unwrap_err();

    assert!(err.to_string().contains("after 2 batches"), "{err}");
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
