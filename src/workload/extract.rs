//! Round 0: build the link graph from crawl metadata.
//!
//! The map side ([`extract_links`]) turns one crawl metadata record into the
//! page's outlinks. The reduce side ([`initialize`]) gives every extracted
//! page its starting rank.

use crate::error::RecordError;
use crate::record::{is_encodable_link, split_links, PageRecord, LINK_SEPARATOR};
use crate::utils::{line_to_bytes, str_from_bytes};
use crate::*;
use anyhow::Result;
use bytes::Bytes;
use itertools::Itertools;
use serde::Deserialize;

pub const EXCEPTIONS: &str = "extract.exceptions";
pub const FILTERED: &str = "extract.filtered";
pub const UNENCODABLE_LINKS: &str = "extract.unencodable-links";
pub const PAGES: &str = "initialize.pages";

const SUCCESS: &str = "SUCCESS";
const HTML_DOC: &str = "html-doc";

#[derive(Debug, Deserialize)]
struct CrawlMetadata {
    disposition: Option<String>,
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(rename = "type")]
    kind: Option<String>,
    links: Option<Vec<Link>>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: Option<String>,
}

/// Outlinks of a successfully crawled HTML page.
#[derive(Debug, Default, PartialEq)]
pub struct Extracted {
    pub outlinks: Vec<String>,
    /// Hrefs dropped because the record line could not carry them.
    pub unencodable: usize,
}

/// Parses one crawl metadata record.
///
/// Returns `Ok(None)` for records that are well formed but not a
/// successfully fetched HTML document.
pub fn extract_links(json: &str) -> Result<Option<Extracted>, RecordError> {
    let metadata: CrawlMetadata = serde_json::from_str(json)?;
    let disposition = metadata
        .disposition
        .ok_or(RecordError::MissingField("disposition"))?;
    if !disposition.trim().eq_ignore_ascii_case(SUCCESS) {
        return Ok(None);
    }
    let content = metadata.content.ok_or(RecordError::MissingField("content"))?;
    let kind = content.kind.ok_or(RecordError::MissingField("content.type"))?;
    if !kind.trim().eq_ignore_ascii_case(HTML_DOC) {
        return Ok(None);
    }

    let mut extracted = Extracted::default();
    for href in content.links.unwrap_or_default().into_iter().filter_map(|l| l.href) {
        let href = href.trim();
        if is_encodable_link(href) {
            extracted.outlinks.push(href.to_string());
        } else {
            extracted.unencodable += 1;
        }
    }
    Ok(Some(extracted))
}

/// Builds the round-0 record for `url` from all of its extracted link
/// lists, concatenated in arrival order.
pub fn initialize<I>(url: &str, link_lists: I) -> PageRecord
where
    I: IntoIterator<Item = Vec<String>>,
{
    PageRecord::initial(url, link_lists.into_iter().flatten().collect())
}

/// Map side. Input is `(url, metadata json)`; output is `(url, a,b,c)`.
pub fn map(kv: KeyValue, ctx: &TaskContext) -> MapOutput {
    let parsed = str_from_bytes(&kv.key)
        .and_then(|url| match url.trim() {
            "" => Err(RecordError::MissingField("url")),
            url => Ok(url),
        })
        .and_then(|url| Ok((url, extract_links(str_from_bytes(&kv.value)?)?)));

    let (url, extracted) = match parsed {
        Ok((url, Some(extracted))) => (url, extracted),
        Ok((_, None)) => {
            ctx.counters.incr(FILTERED, 1);
            return Ok(Box::new(std::iter::empty()));
        }
        Err(err) => {
            log::debug!("skipping crawl record {:?}: {}", String::from_utf8_lossy(&kv.key), err);
            ctx.counters.incr(EXCEPTIONS, 1);
            return Ok(Box::new(std::iter::empty()));
        }
    };
    if extracted.unencodable > 0 {
        ctx.counters.incr(UNENCODABLE_LINKS, extracted.unencodable as u64);
    }

    let links = extracted.outlinks.iter().join(&LINK_SEPARATOR.to_string());
    let out = KeyValue::new(url.to_string(), links);
    Ok(Box::new(std::iter::once(Ok(out))))
}

/// Reduce side. Emits one record line per url.
pub fn reduce(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    ctx: &TaskContext,
) -> Result<Option<Bytes>> {
    let url = str_from_bytes(&key)?;
    let link_lists = values
        .map(|value| -> Result<Vec<String>> { Ok(split_links(str_from_bytes(&value)?)) })
        .collect::<Result<Vec<_>>>()?;
    let record = initialize(url, link_lists);
    ctx.counters.incr(PAGES, 1);
    Ok(Some(line_to_bytes(&record.to_string())))
}
