//! PageRank over a crawl link graph, computed as a chain of MapReduce rounds.
//!
//! Each round is a [`Workload`]: a map function applied to every input
//! record and an optional reduce function applied to every group of values
//! sharing a key. The [`standalone`] engine runs workloads on one machine;
//! the [`driver`] chains them into the full pipeline:
//! link extraction, five rank rounds, then the final ordering.

use anyhow::Context;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::hash::Hasher;
use std::sync::OnceLock;

pub mod config;
pub mod counters;
pub mod driver;
pub mod encode;
pub mod error;
pub mod message;
pub mod record;
pub mod standalone;
pub mod utils;
pub mod workload;

pub use counters::Counters;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// The output of an application map function.
///
/// There are 2 layers of [`anyhow::Result`]s here. The outer layer
/// accounts for errors that arise while creating the iterator.
/// The inner layer accounts for errors that occur during iteration.
///
/// Either layer failing fails the whole stage. Record-level problems that
/// should only skip the record are handled inside the map function.
pub type MapOutput = anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<KeyValue>>>>;

/// A map function takes a key-value pair and the task context.
///
/// It returns an iterator that yields new key-value pairs.
pub type MapFn = fn(kv: KeyValue, ctx: &TaskContext) -> MapOutput;

/// A reduce function takes in a key, an iterator over values for that key,
/// and the task context.
///
/// Returns `None` when the key produces no output line.
pub type ReduceFn = fn(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    ctx: &TaskContext,
) -> anyhow::Result<Option<Bytes>>;

/// How the engine turns an input shard into map input pairs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputFormat {
    /// Key is the byte offset of the line (big-endian `u64`), value is the line.
    Lines,
    /// Each line is `key\tvalue`; the split happens at the first tab.
    KeyedLines,
}

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub name: &'static str,
    pub input: InputFormat,
    pub map_fn: MapFn,
    /// Map-only workloads write the sorted map output values directly.
    pub reduce_fn: Option<ReduceFn>,
}

/// Per-stage state handed to every map and reduce invocation.
#[derive(Default)]
pub struct TaskContext {
    /// Serialized workload arguments (JSON), opaque to the engine.
    pub aux: Bytes,
    pub counters: Counters,
    args: OnceLock<Box<dyn Any + Send + Sync>>,
}

impl TaskContext {
    pub fn new(aux: Bytes) -> Self {
        Self {
            aux,
            ..Default::default()
        }
    }

    /// The workload arguments decoded from `aux`.
    ///
    /// Decoded on first use and shared by every later call in the stage.
    pub fn args<T>(&self) -> anyhow::Result<&T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if self.args.get().is_none() {
            let decoded: T =
                serde_json::from_slice(&self.aux).context("decoding workload arguments")?;
            // Losing a race to another task leaves the identical value in place.
            let _ = self.args.set(Box::new(decoded));
        }
        self.args
            .get()
            .and_then(|args| (**args).downcast_ref::<T>())
            .context("workload arguments were decoded as a different type")
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("aux", &self.aux)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: Bytes,
    /// The value.
    pub value: Bytes,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the key of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn key(&self) -> Bytes {
        self.key.clone()
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> Bytes {
        self.value
    }
}

/// Hashes an intermediate key. Compute a reduce bucket for a given key
/// by calculating `ihash(key) % n_reduce`.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    hasher.write(key);
    (hasher.finish() & 0x7fff_ffff) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ihash_is_stable_and_non_negative() {
        let a = ihash(b"http://a.example/");
        assert_eq!(a, ihash(b"http://a.example/"));
        assert!(a <= 0x7fff_ffff);
    }

    #[test]
    fn args_are_decoded_once() {
        let ctx = TaskContext::new(Bytes::from(r#"{"n":3}"#));
        let first: &serde_json::Value = ctx.args().unwrap();
        let second: &serde_json::Value = ctx.args().unwrap();
        assert_eq!(first["n"], 3);
        assert!(std::ptr::eq(first, second));
        assert!(ctx.args::<u32>().is_err());
    }

    #[test]
    fn missing_args_fail_to_decode() {
        let ctx = TaskContext::default();
        assert!(ctx.args::<serde_json::Value>().is_err());
    }

    #[test]
    fn key_value_accessors() {
        let kv = KeyValue::new("k", "v");
        assert_eq!(kv.key(), Bytes::from("k"));
        assert_eq!(kv.into_value(), Bytes::from("v"));
    }
}
