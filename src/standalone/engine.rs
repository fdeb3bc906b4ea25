//! Runs one [`Job`] on the local machine.
//!
//! Map tasks run in parallel, one per input file. Their output is
//! partitioned with [`ihash`], spilled to one Parquet file per partition,
//! then each partition is sorted by key and reduced in parallel. Every
//! partition produces an `mr-out-<n>` file, possibly empty.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use glob::glob;
use itertools::Itertools;
use rayon::prelude::*;
use uuid::Uuid;

use crate::encode::{read_parquet, write_parquet};
use crate::standalone::Job;
use crate::*;

pub const MAP_INPUT_RECORDS: &str = "engine.map-input-records";
pub const MAP_OUTPUT_RECORDS: &str = "engine.map-output-records";
pub const REDUCE_INPUT_GROUPS: &str = "engine.reduce-input-groups";
pub const OUTPUT_RECORDS: &str = "engine.output-records";

// types related to this engine
type BucketIndex = u32;
type Buckets = DashMap<BucketIndex, Vec<KeyValue>>;

/// What a finished job leaves behind.
#[derive(Debug)]
pub struct JobReport {
    pub workload: &'static str,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub counters: Vec<(&'static str, u64)>,
}

impl JobReport {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(0, |(_, v)| *v)
    }
}

/// Files matched by the job's input glob, in lexicographic order, capped
/// at `max_inputs`.
pub fn input_files(job: &Job) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob(&job.input).with_context(|| format!("bad input glob `{}`", job.input))? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    if let Some(max) = job.max_inputs {
        files.truncate(max);
    }
    Ok(files)
}

/// Splits a whole input file into map input pairs. Empty lines are skipped.
pub fn split_records(buf: Bytes, format: InputFormat) -> Vec<KeyValue> {
    let mut records = Vec::new();
    let mut start = 0;
    while start < buf.len() {
        let end = buf[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(buf.len(), |i| start + i);
        let mut line_end = end;
        if line_end > start && buf[line_end - 1] == b'\r' {
            line_end -= 1;
        }
        if line_end > start {
            let line = buf.slice(start..line_end);
            records.push(match format {
                InputFormat::Lines => KeyValue::new((start as u64).to_be_bytes().to_vec(), line),
                InputFormat::KeyedLines => match line.iter().position(|&b| b == b'\t') {
                    Some(tab) => KeyValue {
                        key: line.slice(..tab),
                        value: line.slice(tab + 1..),
                    },
                    None => KeyValue {
                        key: line,
                        value: Bytes::new(),
                    },
                },
            });
        }
        start = end + 1;
    }
    records
}

fn map_file(
    path: &Path,
    workload: &Workload,
    ctx: &TaskContext,
    n_partitions: u32,
) -> Result<HashMap<BucketIndex, Vec<KeyValue>>> {
    let buf = fs::read(path).with_context(|| format!("reading input {}", path.display()))?;
    let records = split_records(Bytes::from(buf), workload.input);
    ctx.counters.incr(MAP_INPUT_RECORDS, records.len() as u64);

    let mut local: HashMap<BucketIndex, Vec<KeyValue>> = HashMap::new();
    let mut emitted = 0;
    for input_kv in records {
        for item in (workload.map_fn)(input_kv, ctx)? {
            let kv = item?;
            let bucket_no = ihash(&kv.key) % n_partitions;
            local.entry(bucket_no).or_default().push(kv);
            emitted += 1;
        }
    }
    ctx.counters.incr(MAP_OUTPUT_RECORDS, emitted);
    Ok(local)
}

/// Maps every input file and partitions the output by key.
///
/// Within a bucket, pairs keep input file order, then emission order.
pub fn perform_map(
    inputs: &[PathBuf],
    workload: &Workload,
    ctx: &TaskContext,
    n_partitions: u32,
) -> Result<Buckets> {
    let per_file = inputs
        .par_iter()
        .map(|path| map_file(path, workload, ctx, n_partitions))
        .collect::<Result<Vec<_>>>()?;

    let buckets = Buckets::new();
    for local in per_file {
        for (bucket_no, kvs) in local {
            buckets.entry(bucket_no).or_default().extend(kvs);
        }
    }
    Ok(buckets)
}

/// Writes each bucket to `dir/part-<n>.parquet`.
pub fn spill(buckets: Buckets, dir: &Path) -> Result<HashMap<BucketIndex, PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating spill dir {}", dir.display()))?;
    buckets
        .into_par_iter()
        .map(|(bucket_no, kvs)| -> Result<(BucketIndex, PathBuf)> {
            let path = dir.join(format!("part-{}.parquet", bucket_no));
            write_parquet(&path, &kvs)?;
            Ok((bucket_no, path))
        })
        .collect()
}

fn reduce_partition(
    reduce_id: BucketIndex,
    spill_path: Option<&PathBuf>,
    workload: &Workload,
    ctx: &TaskContext,
    output_dir: &Path,
) -> Result<PathBuf> {
    let out_pathspec = output_dir.join(format!("mr-out-{}", reduce_id));
    let out_file = File::create(&out_pathspec)
        .with_context(|| format!("creating {}", out_pathspec.display()))?;
    let mut out_file = BufWriter::new(out_file);
    let mut bkt = match spill_path {
        Some(path) => read_parquet(path)?,
        None => Vec::new(),
    };
    // Stable, so values of one key keep their map order.
    bkt.sort_by_key(KeyValue::key);

    let mut written = 0;
    match workload.reduce_fn {
        Some(reduce_func) => {
            let mut groups = 0;
            for (key, value_group) in &bkt.into_iter().chunk_by(KeyValue::key) {
                groups += 1;
                let iter = value_group.map(KeyValue::into_value);
                if let Some(out) = reduce_func(key, Box::new(iter), ctx)? {
                    out_file.write_all(&out)?;
                    written += 1;
                }
            }
            ctx.counters.incr(REDUCE_INPUT_GROUPS, groups);
        }
        None => {
            for kv in bkt {
                out_file.write_all(&kv.value)?;
                written += 1;
            }
        }
    }
    out_file.flush()?;
    ctx.counters.incr(OUTPUT_RECORDS, written);
    Ok(out_pathspec)
}

/// Sorts and reduces every partition into `output_dir/mr-out-<n>`.
pub fn perform_reduce(
    spills: &HashMap<BucketIndex, PathBuf>,
    workload: &Workload,
    ctx: &TaskContext,
    n_partitions: u32,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    (0..n_partitions)
        .into_par_iter()
        .map(|reduce_id| {
            let spill_path = spills.get(&reduce_id);
            reduce_partition(reduce_id, spill_path, workload, ctx, output_dir)
        })
        .collect()
}

/// Spills `buckets` under `scratch`, then reduces them into `output_dir`.
/// `scratch` is removed whether or not either step succeeds.
fn shuffle(
    buckets: Buckets,
    scratch: &Path,
    workload: &Workload,
    ctx: &TaskContext,
    n_partitions: u32,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let reduced = spill(buckets, scratch)
        .and_then(|spills| perform_reduce(&spills, workload, ctx, n_partitions, output_dir));
    let cleanup = match fs::remove_dir_all(scratch) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    };
    let outputs = reduced?;
    cleanup.with_context(|| format!("removing {}", scratch.display()))?;
    Ok(outputs)
}

/// Runs `job` to completion. The output directory is replaced.
pub fn run_job(job: &Job) -> Result<JobReport> {
    let workload = workload::named(&job.workload)?;
    let n_partitions = job.partitions.max(1);
    let inputs = input_files(job)?;
    log::info!(
        "[{}] {} input file(s) from `{}` -> {}",
        workload.name,
        inputs.len(),
        job.input,
        job.output.display()
    );

    if job.output.exists() {
        fs::remove_dir_all(&job.output)
            .with_context(|| format!("clearing {}", job.output.display()))?;
    }
    fs::create_dir_all(&job.output).with_context(|| format!("creating {}", job.output.display()))?;

    let ctx = TaskContext::new(job.aux.clone());
    let buckets = perform_map(&inputs, &workload, &ctx, n_partitions)?;
    let scratch = job.output.join(format!("_shuffle-{}", Uuid::new_v4()));
    let mut outputs = shuffle(buckets, &scratch, &workload, &ctx, n_partitions, &job.output)?;
    outputs.sort();

    let counters = ctx.counters.snapshot();
    for (name, value) in &counters {
        log::info!("[{}] {} = {}", workload.name, name, value);
    }
    Ok(JobReport {
        workload: workload.name,
        inputs,
        outputs,
        counters,
    })
}
