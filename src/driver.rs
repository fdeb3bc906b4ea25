//! Chains the stages into the full PageRank pipeline.
//!
//! ```text
//! <output>/round-0   link graph, every page at rank 1
//! <output>/round-k   after k power-iteration steps
//! <output>/ranked    mr-out-0: `rank\turl`, highest rank first
//! ```
//!
//! Round k+1 reads exactly round k's output. Any stage failure aborts the
//! run; there is no resume.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use glob::Pattern;

use crate::config::PipelineConfig;
use crate::standalone::engine::{input_files, run_job, JobReport};
use crate::standalone::Job;
use crate::workload::pagerank::RankParams;
use crate::workload::{LINK_GRAPH, PAGERANK, RANK_ORDER};

pub const RANKED_DIR: &str = "ranked";

/// Where the pipeline is. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoundState {
    Extract,
    Rank(u32),
    Order,
    Done,
}

impl RoundState {
    pub fn next(self, iterations: u32) -> RoundState {
        match self {
            RoundState::Extract if iterations == 0 => RoundState::Order,
            RoundState::Extract => RoundState::Rank(1),
            RoundState::Rank(k) if k < iterations => RoundState::Rank(k + 1),
            RoundState::Rank(_) => RoundState::Order,
            RoundState::Order | RoundState::Done => RoundState::Done,
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundState::Extract => write!(f, "round 0 (link graph)"),
            RoundState::Rank(k) => write!(f, "round {}", k),
            RoundState::Order => write!(f, "rank ordering"),
            RoundState::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    /// One report per stage, in execution order.
    pub stages: Vec<JobReport>,
    /// The rank-ordered listing.
    pub listing: PathBuf,
}

pub struct Pipeline {
    config: PipelineConfig,
}

/// Output directory of round `k`.
pub fn round_dir(output: &Path, k: u32) -> PathBuf {
    output.join(format!("round-{}", k))
}

fn outputs_of(dir: &Path) -> String {
    format!("{}/mr-out-*", Pattern::escape(&dir.to_string_lossy()))
}

/// Fails if any of `inputs` lives under `output`, which is about to be cleared.
fn ensure_outside(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let output = output
        .canonicalize()
        .with_context(|| format!("resolving {}", output.display()))?;
    for input in inputs {
        let resolved = input
            .canonicalize()
            .with_context(|| format!("resolving {}", input.display()))?;
        if resolved.starts_with(&output) {
            bail!(
                "input shard {} is inside the output path {}, which is cleared before the run",
                input.display(),
                output.display()
            );
        }
    }
    Ok(())
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn listing_path(&self) -> PathBuf {
        self.config.output.join(RANKED_DIR).join("mr-out-0")
    }

    fn job_for(&self, state: RoundState) -> Result<Job> {
        let config = &self.config;
        let job = match state {
            RoundState::Extract => Job {
                input: config.input.clone(),
                max_inputs: config.max_shards,
                workload: LINK_GRAPH.to_string(),
                output: round_dir(&config.output, 0),
                partitions: config.partitions,
                aux: Bytes::new(),
            },
            RoundState::Rank(k) => {
                let params = RankParams {
                    damping: config.damping,
                    base_rank: config.base_rank,
                };
                Job {
                    input: outputs_of(&round_dir(&config.output, k - 1)),
                    max_inputs: None,
                    workload: PAGERANK.to_string(),
                    output: round_dir(&config.output, k),
                    partitions: config.partitions,
                    aux: params.to_aux()?,
                }
            }
            RoundState::Order => Job {
                input: outputs_of(&round_dir(&config.output, config.iterations)),
                max_inputs: None,
                workload: RANK_ORDER.to_string(),
                output: config.output.join(RANKED_DIR),
                // One partition, so the key sort covers the whole listing.
                partitions: 1,
                aux: Bytes::new(),
            },
            RoundState::Done => bail!("the pipeline has already finished"),
        };
        Ok(job)
    }

    /// Runs every stage in order.
    pub fn run(&self) -> Result<PipelineReport> {
        let config = &self.config;
        log::info!("starting pipeline: {}", serde_json::to_string(config)?);

        let first = self.job_for(RoundState::Extract)?;
        let shards = input_files(&first)?;
        if shards.is_empty() {
            bail!("no input shards match `{}`", config.input);
        }
        if config.output.exists() {
            ensure_outside(&shards, &config.output)?;
            log::info!("clearing the output path at '{}'", config.output.display());
            fs::remove_dir_all(&config.output)
                .with_context(|| format!("clearing {}", config.output.display()))?;
        }
        fs::create_dir_all(&config.output)
            .with_context(|| format!("creating {}", config.output.display()))?;

        let mut stages = Vec::new();
        let mut state = RoundState::Extract;
        while state != RoundState::Done {
            log::info!("running {}", state);
            let job = self.job_for(state)?;
            let report = run_job(&job).with_context(|| format!("{} failed", state))?;
            stages.push(report);
            state = state.next(config.iterations);
        }

        let listing = self.listing_path();
        log::info!("pipeline finished; ranked listing at {}", listing.display());
        Ok(PipelineReport { stages, listing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn visits_every_round_in_order() {
        let mut seen = vec![RoundState::Extract];
        let mut state = RoundState::Extract;
        while state != RoundState::Done {
            state = state.next(5);
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                RoundState::Extract,
                RoundState::Rank(1),
                RoundState::Rank(2),
                RoundState::Rank(3),
                RoundState::Rank(4),
                RoundState::Rank(5),
                RoundState::Order,
                RoundState::Done,
            ]
        );
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn done_is_terminal() {
        assert_eq!(RoundState::Done.next(5), RoundState::Done);
        assert_eq!(RoundState::Extract.next(0), RoundState::Order);
    }

    #[test]
    fn rounds_read_the_previous_round() {
        let config = PipelineConfig::new("in/*", "/tmp/out").unwrap();
        let pipeline = Pipeline::new(config);
        let third = pipeline.job_for(RoundState::Rank(3)).unwrap();
        assert_eq!(third.input, "/tmp/out/round-2/mr-out-*");
        assert_eq!(third.output, PathBuf::from("/tmp/out/round-3"));
        let params: RankParams = serde_json::from_slice(&third.aux).unwrap();
        assert_eq!(params, RankParams::default());

        let order = pipeline.job_for(RoundState::Order).unwrap();
        assert_eq!(order.input, "/tmp/out/round-5/mr-out-*");
        assert_eq!(order.partitions, 1);
        assert!(pipeline.job_for(RoundState::Done).is_err());
    }

    const SHARD: &str = concat!(
        "http://a/\t{\"disposition\":\"SUCCESS\",",
        "\"content\":{\"type\":\"html-doc\",\"links\":[{\"href\":\"http://b/\"}]}}\n",
        "http://b/\t{\"disposition\":\"SUCCESS\",\"content\":{\"type\":\"html-doc\"}}\n",
    );

    #[test]
    fn missing_input_fails_before_any_stage() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let pattern = format!("{}/none-*", temp.path().display());
        let config = PipelineConfig::new(pattern, &out).unwrap();
        assert!(Pipeline::new(config).run().is_err());
        assert!(!out.exists());
    }

    #[test]
    fn refuses_to_clear_its_own_input() -> Result<()> {
        let temp = TempDir::new()?;
        let work = temp.path().join("work");
        fs::create_dir_all(&work)?;
        let shard = work.join("metadata-00000");
        fs::write(&shard, SHARD)?;

        let pattern = format!("{}/metadata-*", work.display());
        let config = PipelineConfig::new(pattern, &work)?;
        let err = Pipeline::new(config).run().unwrap_err();
        assert!(err.to_string().contains("inside the output path"), "{err:#}");
        assert_eq!(fs::read_to_string(&shard)?, SHARD);
        assert!(!round_dir(&work, 0).exists());
        Ok(())
    }

    #[test]
    fn sibling_output_is_not_mistaken_for_a_parent() -> Result<()> {
        let temp = TempDir::new()?;
        fs::create_dir_all(temp.path().join("out"))?;
        fs::create_dir_all(temp.path().join("out-shards"))?;
        let shard = temp.path().join("out-shards/metadata-00000");
        fs::write(&shard, SHARD)?;
        ensure_outside(&[shard], &temp.path().join("out"))
    }

    #[test]
    fn failed_round_stops_the_pipeline() -> Result<()> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join("metadata-00000"), SHARD)?;
        let out = temp.path().join("out");
        let pattern = format!("{}/metadata-*", temp.path().display());
        let mut config = PipelineConfig::new(pattern, &out)?;
        // NaN serializes as null, so round 1 cannot decode its parameters.
        config.damping = f64::NAN;

        let err = Pipeline::new(config).run().unwrap_err();
        assert!(format!("{err:#}").contains("round 1 failed"), "{err:#}");
        assert!(round_dir(&out, 0).join("mr-out-0").is_file());
        assert!(!round_dir(&out, 2).exists());
        assert!(!out.join(RANKED_DIR).exists());
        Ok(())
    }
}
