//! Pipeline configuration.
//!
//! Only the paths and the shard cap come from the command line; the ranking
//! constants are fixed.

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::standalone::Args;

/// Weight of propagated rank mass in every update.
pub const DAMPING_FACTOR: f64 = 0.85;
/// Residual rank every confirmed page receives, `1 - DAMPING_FACTOR`.
pub const BASE_RANK: f64 = 0.15;
/// Number of rank rounds after the link graph is built.
pub const ITERATIONS: u32 = 5;
/// Reduce partitions per rank round.
pub const DEFAULT_PARTITIONS: u32 = 11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Glob spec for the crawl metadata shards.
    pub input: String,
    /// Directory receiving every round's output and the final listing.
    pub output: PathBuf,
    /// Process at most this many input shards.
    pub max_shards: Option<usize>,
    pub damping: f64,
    pub base_rank: f64,
    pub iterations: u32,
    pub partitions: u32,
}

impl PipelineConfig {
    pub fn new(input: impl Into<String>, output: impl Into<PathBuf>) -> Result<Self> {
        let input = input.into();
        let output = output.into();
        if input.trim().is_empty() {
            bail!("No input path found.");
        }
        if output.as_os_str().is_empty() {
            bail!("No output path found.");
        }
        Ok(Self {
            input,
            output,
            max_shards: None,
            damping: DAMPING_FACTOR,
            base_rank: BASE_RANK,
            iterations: ITERATIONS,
            partitions: DEFAULT_PARTITIONS,
        })
    }

    pub fn from_args(args: Args) -> Result<Self> {
        Ok(Self::new(args.input, args.output)?.with_max_shards(args.max_shards))
    }

    pub fn with_max_shards(mut self, max_shards: Option<usize>) -> Self {
        self.max_shards = max_shards;
        self
    }

    /// Overrides the reduce partition count. Values below one are clamped.
    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions.max(1);
        self
    }
}
