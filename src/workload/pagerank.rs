//! One power-iteration step of PageRank.
//!
//! [`propagate`] fans a page record out into messages keyed by destination
//! url; [`aggregate`] folds every message for one url into that page's next
//! record. Pages that never announce their own existence during a round
//! (red links) are dropped by the aggregator.

use crate::config::{BASE_RANK, DAMPING_FACTOR};
use crate::message::Message;
use crate::record::PageRecord;
use crate::utils::{line_to_bytes, str_from_bytes};
use crate::*;
use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const MALFORMED_LINES: &str = "propagate.malformed-lines";
pub const MALFORMED_MESSAGES: &str = "aggregate.malformed-messages";
pub const RED_LINKS: &str = "aggregate.red-links";
pub const PAGES: &str = "aggregate.pages";

/// Workload arguments for a rank round, passed as JSON in the task's aux bytes.
///
/// `base_rank` is `1 - damping`, carried separately so the residual is the
/// exact decimal rather than the result of a float subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankParams {
    pub damping: f64,
    pub base_rank: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            damping: DAMPING_FACTOR,
            base_rank: BASE_RANK,
        }
    }
}

impl RankParams {
    /// The rank of a confirmed page whose incoming shares sum to `share_sum`.
    pub fn next_rank(&self, share_sum: f64) -> f64 {
        self.damping * share_sum + self.base_rank
    }

    pub fn to_aux(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Messages emitted for one page record, each paired with its destination.
pub fn propagate(record: &PageRecord) -> Vec<(String, Message)> {
    let out_degree = record.out_degree();
    let mut out = Vec::with_capacity(record.outlinks.len() + 2);
    out.push((record.url.clone(), Message::Existence));
    for dest in &record.outlinks {
        out.push((
            dest.clone(),
            Message::RankShare {
                rank: record.rank,
                out_degree,
            },
        ));
    }
    out.push((record.url.clone(), Message::LinkList(record.outlinks.clone())));
    out
}

/// Running state for one destination url.
///
/// Absorbing messages is commutative, so arrival order never changes the
/// result. At most one link list arrives per url per round.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RankAccumulator {
    pub existence_confirmed: bool,
    pub outlinks: Option<Vec<String>>,
    pub share_sum: f64,
}

impl RankAccumulator {
    pub fn absorb(&mut self, message: Message) {
        match message {
            Message::Existence => self.existence_confirmed = true,
            Message::LinkList(links) => self.outlinks = Some(links),
            share @ Message::RankShare { .. } => self.share_sum += share.contribution(),
        }
    }

    /// The page's next record, or `None` if its existence was never
    /// confirmed this round.
    pub fn finish(self, url: &str, params: &RankParams) -> Option<PageRecord> {
        if !self.existence_confirmed {
            return None;
        }
        let rank = params.next_rank(self.share_sum);
        Some(PageRecord::new(url, rank, self.outlinks.unwrap_or_default()))
    }
}

/// Folds all messages for `url` into its next record.
pub fn aggregate<I>(url: &str, messages: I, params: &RankParams) -> Option<PageRecord>
where
    I: IntoIterator<Item = Message>,
{
    let mut acc = RankAccumulator::default();
    for message in messages {
        acc.absorb(message);
    }
    acc.finish(url, params)
}

/// Map side. Input is one record line; malformed lines are skipped.
pub fn map(kv: KeyValue, ctx: &TaskContext) -> MapOutput {
    let parsed = str_from_bytes(&kv.value).and_then(|line| line.parse::<PageRecord>());
    let record = match parsed {
        Ok(record) => record,
        Err(err) => {
            log::debug!("skipping record line: {}", err);
            ctx.counters.incr(MALFORMED_LINES, 1);
            return Ok(Box::new(std::iter::empty()));
        }
    };
    let iter = propagate(&record)
        .into_iter()
        .map(|(dest, message)| Ok(KeyValue::new(dest, message.encode())));
    Ok(Box::new(iter))
}

/// Reduce side. Emits the page's next record line, if it survives.
pub fn reduce(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    ctx: &TaskContext,
) -> Result<Option<Bytes>> {
    let params: &RankParams = ctx.args()?;
    let url = str_from_bytes(&key)?;
    let messages = values.filter_map(|value| match Message::decode(&value) {
        Ok(message) => Some(message),
        Err(err) => {
            log::debug!("skipping message for {}: {}", url, err);
            ctx.counters.incr(MALFORMED_MESSAGES, 1);
            None
        }
    });
    match aggregate(url, messages, params) {
        Some(record) => {
            ctx.counters.incr(PAGES, 1);
            Ok(Some(line_to_bytes(&record.to_string())))
        }
        None => {
            ctx.counters.incr(RED_LINKS, 1);
            Ok(None)
        }
    }
}
