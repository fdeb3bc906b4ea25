//! Messages exchanged between the rank propagator and aggregator.
//!
//! Inside the crate a message is a [`Message`]. Only the shuffle sees the
//! compact wire form:
//!
//! | message                  | wire form             |
//! |--------------------------|-----------------------|
//! | `Existence`              | `!`                   |
//! | `LinkList(links)`        | `\|` + `a,b,c`        |
//! | `RankShare{rank, deg}`   | `<rank>\t<deg>`       |

use crate::error::RecordError;
use crate::record::{split_links, LINK_SEPARATOR};
use crate::utils::str_from_bytes;
use bytes::{BufMut, Bytes, BytesMut};
use itertools::Itertools;

const EXISTENCE_TAG: &str = "!";
const LINK_LIST_TAG: char = '|';

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// The destination page was a source this round.
    Existence,
    /// The destination page's own outlinks.
    LinkList(Vec<String>),
    /// A share of some source page's rank.
    RankShare { rank: f64, out_degree: usize },
}

impl Message {
    /// The rank this message contributes to its destination.
    ///
    /// Shares with an out-degree of zero contribute nothing.
    pub fn contribution(&self) -> f64 {
        match *self {
            Message::RankShare { rank, out_degree } if out_degree > 0 => rank / out_degree as f64,
            _ => 0.0,
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Message::Existence => Bytes::from_static(EXISTENCE_TAG.as_bytes()),
            Message::LinkList(links) => {
                let joined = links.iter().join(&LINK_SEPARATOR.to_string());
                let mut buf = BytesMut::with_capacity(joined.len() + 1);
                buf.put_u8(LINK_LIST_TAG as u8);
                buf.put_slice(joined.as_bytes());
                buf.freeze()
            }
            Message::RankShare { rank, out_degree } => Bytes::from(format!("{rank}\t{out_degree}")),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Message, RecordError> {
        let s = str_from_bytes(buf)?;
        if s == EXISTENCE_TAG {
            return Ok(Message::Existence);
        }
        if let Some(links) = s.strip_prefix(LINK_LIST_TAG) {
            return Ok(Message::LinkList(split_links(links)));
        }
        let (rank, degree) = s
            .split_once('\t')
            .ok_or_else(|| RecordError::UnknownMessage(s.to_string()))?;
        let rank = rank
            .parse()
            .map_err(|_| RecordError::InvalidRank(rank.to_string()))?;
        let out_degree = degree
            .parse()
            .map_err(|_| RecordError::InvalidDegree(degree.to_string()))?;
        Ok(Message::RankShare { rank, out_degree })
    }
}
