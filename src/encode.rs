//! Parquet spill files for intermediate key-value buckets.
//!
//! A spill file has two binary columns, `id` (the key) and `val` (the
//! value), one row per emitted pair.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, ArrayRef, BinaryArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::KeyValue;

/// Rows written per record batch. Keeps each binary column well below the
/// 2 GiB offset limit of [`BinaryArray`].
const ROWS_PER_BATCH: usize = 64 * 1024;

fn spill_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Binary, false),
        Field::new("val", DataType::Binary, false),
    ]))
}

/// Writes `kvs` to a new Parquet file at `path`.
pub fn write_parquet(path: &Path, kvs: &[KeyValue]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating spill file {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let schema = spill_schema();
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
    for chunk in kvs.chunks(ROWS_PER_BATCH) {
        let keys: Vec<&[u8]> = chunk.iter().map(|kv| kv.key.as_ref()).collect();
        let vals: Vec<&[u8]> = chunk.iter().map(|kv| kv.value.as_ref()).collect();
        let (keys, vals) = (BinaryArray::from(keys), BinaryArray::from(vals));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(keys) as ArrayRef, Arc::new(vals) as ArrayRef],
        )?;
        writer.write(&batch)?;
    }
    // writer must be closed to write footer
    writer.close()?;
    Ok(())
}

fn binary_column(batch: &RecordBatch, i: usize) -> Result<&BinaryArray> {
    batch
        .column(i)
        .as_any()
        .downcast_ref::<BinaryArray>()
        .ok_or_else(|| anyhow!("spill column {} is not binary", i))
}

/// Reads every row of the spill file at `path`, in file order.
pub fn read_parquet(path: &Path) -> Result<Vec<KeyValue>> {
    let file = File::open(path).with_context(|| format!("opening spill file {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut kvs = Vec::new();
    for batch in reader {
        let batch = batch?;
        let keys = binary_column(&batch, 0)?;
        let vals = binary_column(&batch, 1)?;
        kvs.reserve(batch.num_rows());
        for i in 0..keys.len() {
            kvs.push(KeyValue {
                key: Bytes::copy_from_slice(keys.value(i)),
                value: Bytes::copy_from_slice(vals.value(i)),
            });
        }
    }
    Ok(kvs)
}
