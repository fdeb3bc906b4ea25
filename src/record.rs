//! Page records as they are stored between rounds.
//!
//! On disk a record is one line: `<url>\t<rank>\t<comma-separated outlinks>`.
//! The outlink field may be empty or missing entirely.

use crate::error::RecordError;
use crate::utils::has_url_scheme;
use std::fmt;
use std::str::FromStr;

/// Rank every page starts with at round 0.
pub const INITIAL_RANK: f64 = 1.0;

/// Separator between outlinks in the record line.
pub const LINK_SEPARATOR: char = ',';

#[derive(Clone, Debug, PartialEq)]
pub struct PageRecord {
    pub url: String,
    pub rank: f64,
    pub outlinks: Vec<String>,
}

impl PageRecord {
    pub fn new(url: impl Into<String>, rank: f64, outlinks: Vec<String>) -> Self {
        Self {
            url: url.into(),
            rank,
            outlinks,
        }
    }

    /// A round-0 record.
    pub fn initial(url: impl Into<String>, outlinks: Vec<String>) -> Self {
        Self::new(url, INITIAL_RANK, outlinks)
    }

    /// The divisor used when sharing this page's rank: `max(n - 1, 0)` for
    /// `n` outlinks.
    // The minus one is inherited ranking behaviour and must stay; a page
    // with a single outlink therefore shares with degree 0.
    pub fn out_degree(&self) -> usize {
        self.outlinks.len().saturating_sub(1)
    }
}

/// Splits a comma-separated outlink field, dropping empty entries.
pub fn split_links(field: &str) -> Vec<String> {
    field
        .split(LINK_SEPARATOR)
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .map(String::from)
        .collect()
}

/// Whether `link` can be stored in a record line without corrupting it.
pub fn is_encodable_link(link: &str) -> bool {
    !link.is_empty() && !link.contains([LINK_SEPARATOR, '\t', '\r', '\n'])
}

impl fmt::Display for PageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t", self.url, self.rank)?;
        for (i, link) in self.outlinks.iter().enumerate() {
            if i > 0 {
                write!(f, "{LINK_SEPARATOR}")?;
            }
            f.write_str(link)?;
        }
        Ok(())
    }
}

impl FromStr for PageRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if !has_url_scheme(line) {
            return Err(RecordError::MissingScheme(line.to_string()));
        }
        let mut fields = line.splitn(3, '\t');
        let url = fields.next().ok_or(RecordError::MissingField("url"))?;
        let rank = fields.next().ok_or(RecordError::MissingField("rank"))?;
        let rank: f64 = rank
            .trim()
            .parse()
            .map_err(|_| RecordError::InvalidRank(rank.to_string()))?;
        let outlinks = fields.next().map(split_links).unwrap_or_default();
        Ok(Self::new(url, rank, outlinks))
    }
}
