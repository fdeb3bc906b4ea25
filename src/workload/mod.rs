//! Converts stage names to the map and reduce code that runs them.
//!
//! # Example
//!
//! To get one PageRank round:
//! ```
//! # use anyhow::Result;
//! use crawlrank::workload;
//! # fn main() -> Result<()> {
//! let round = workload::named(workload::PAGERANK)?;
//! assert!(round.reduce_fn.is_some());
//! # Ok(())
//! # }
//! ```

use crate::{InputFormat, Workload};
use anyhow::{bail, Result};

pub mod extract;
pub mod order;
pub mod pagerank;

/// Round 0: crawl metadata to initial page records.
pub const LINK_GRAPH: &str = "link-graph";
/// Rounds 1..K: one power-iteration step.
pub const PAGERANK: &str = "pagerank";
/// Final map-only stage: rank-ordered listing.
pub const RANK_ORDER: &str = "rank-order";

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no stage with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        LINK_GRAPH => Some(Workload {
            name: LINK_GRAPH,
            input: InputFormat::KeyedLines,
            map_fn: extract::map,
            reduce_fn: Some(extract::reduce),
        }),
        PAGERANK => Some(Workload {
            name: PAGERANK,
            input: InputFormat::Lines,
            map_fn: pagerank::map,
            reduce_fn: Some(pagerank::reduce),
        }),
        RANK_ORDER => Some(Workload {
            name: RANK_ORDER,
            input: InputFormat::Lines,
            map_fn: order::map,
            reduce_fn: None,
        }),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no stage with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No workload named `{}` found.", name),
    }
}
