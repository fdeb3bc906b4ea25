use std::path::PathBuf;

use bytes::Bytes;
use clap::Parser;

pub mod engine;

/// Rank crawled pages with PageRank.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Glob spec for the crawl metadata shards
    #[arg(short, long)]
    pub input: String,

    /// Output directory
    #[arg(short, long)]
    pub output: String,

    /// Maximum number of input shards to process
    #[arg(short, long)]
    pub max_shards: Option<usize>,
}

/// One stage run by the engine.
#[derive(Debug, Clone)]
pub struct Job {
    /// Glob spec for the input files.
    pub input: String,
    /// Use only the first `max_inputs` files matched by `input`.
    pub max_inputs: Option<usize>,
    /// Name of the workload.
    pub workload: String,
    /// Output directory.
    pub output: PathBuf,
    /// Number of reduce partitions, one output file each.
    pub partitions: u32,
    /// Auxiliary arguments to pass to the workload.
    pub aux: Bytes,
}
