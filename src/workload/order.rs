//! Final stage: key every page by its rank so the sort orders the listing.
//!
//! Map-only. The emitted key sorts by descending rank, then by url; the
//! value is the output line `rank\turl`. The stage also accepts its own
//! output lines as input, so running it twice gives the same listing.

use crate::error::RecordError;
use crate::record::PageRecord;
use crate::utils::{has_url_scheme, line_to_bytes, str_from_bytes};
use crate::*;
use bytes::{BufMut, Bytes, BytesMut};

pub const MALFORMED_LINES: &str = "order.malformed-lines";

/// Reads `(rank, url)` from a record line or from an already ordered
/// `rank\turl` line.
pub fn rank_entry(line: &str) -> Result<(f64, String), RecordError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if has_url_scheme(line) {
        let record: PageRecord = line.parse()?;
        return Ok((record.rank, record.url));
    }
    let (rank, url) = line
        .split_once('\t')
        .ok_or(RecordError::MissingField("url"))?;
    if !has_url_scheme(url) {
        return Err(RecordError::MissingScheme(url.to_string()));
    }
    let rank = rank
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidRank(rank.to_string()))?;
    Ok((rank, url.to_string()))
}

/// Sort key whose ascending byte order is descending rank, ties broken by
/// ascending url.
pub fn sort_key(rank: f64, url: &str) -> Bytes {
    let bits = rank.to_bits();
    // Map to an unsigned integer that orders like the float, then invert.
    let ascending = if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    };
    let mut key = BytesMut::with_capacity(8 + url.len());
    key.put_u64(!ascending);
    key.put_slice(url.as_bytes());
    key.freeze()
}

pub fn map(kv: KeyValue, ctx: &TaskContext) -> MapOutput {
    let entry = str_from_bytes(&kv.value).and_then(rank_entry);
    let (rank, url) = match entry {
        Ok(entry) => entry,
        Err(err) => {
            log::debug!("skipping ranked line: {}", err);
            ctx.counters.incr(MALFORMED_LINES, 1);
            return Ok(Box::new(std::iter::empty()));
        }
    };
    let out = KeyValue {
        key: sort_key(rank, &url),
        value: line_to_bytes(&format!("{rank}\t{url}")),
    };
    Ok(Box::new(std::iter::once(Ok(out))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn order(lines: &[&str]) -> Vec<String> {
        let ctx = TaskContext::default();
        let mut kvs: Vec<KeyValue> = lines
            .iter()
            .flat_map(|line| map(KeyValue::new("0", line.to_string()), &ctx).unwrap())
            .collect::<Result<_>>()
            .unwrap();
        kvs.sort_by_key(KeyValue::key);
        kvs.into_iter()
            .map(|kv| String::from_utf8(kv.value.to_vec()).unwrap().trim_end().to_string())
            .collect()
    }

    #[test]
    fn reads_both_line_shapes() {
        assert_eq!(
            rank_entry("http://a/\t1.85\thttp://b/").unwrap(),
            (1.85, "http://a/".to_string())
        );
        assert_eq!(rank_entry("0.15\thttp://a/\n").unwrap(), (0.15, "http://a/".to_string()));
        assert!(rank_entry("0.15").is_err());
        assert!(rank_entry("0.15\tnot-a-url").is_err());
    }

    #[test]
    fn highest_rank_comes_first() {
        let listing = order(&[
            "http://low/\t0.15\t",
            "http://high/\t10.5\thttp://low/",
            "http://mid/\t2\t",
            "http://tie-b/\t1\t",
            "http://tie-a/\t1\t",
        ]);
        assert_eq!(
            listing,
            vec![
                "10.5\thttp://high/",
                "2\thttp://mid/",
                "1\thttp://tie-a/",
                "1\thttp://tie-b/",
                "0.15\thttp://low/",
            ]
        );
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert!(sort_key(10.0, "http://a/") < sort_key(9.0, "http://a/"));
        assert!(sort_key(0.15, "http://a/") < sort_key(0.0, "http://a/"));
        assert!(sort_key(0.0, "http://a/") < sort_key(-1.0, "http://a/"));
    }

    #[test]
    fn reordering_own_output_is_stable() {
        let first = order(&["http://a/\t0.3\t", "http://b/\t3\t", "http://c/\t1.2\t"]);
        let refs: Vec<&str> = first.iter().map(String::as_str).collect();
        assert_eq!(order(&refs), first);
    }

    #[test]
    fn garbage_is_counted() {
        let ctx = TaskContext::default();
        assert_eq!(map(KeyValue::new("0", "???"), &ctx).unwrap().count(), 0);
        assert_eq!(ctx.counters.get(MALFORMED_LINES), 1);
    }
}
