//! Named counters shared by all tasks of one stage.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct Counters {
    inner: DashMap<&'static str, u64>,
}

impl Counters {
    /// Adds `by` to the counter `name`, creating it at zero if needed.
    pub fn incr(&self, name: &'static str, by: u64) {
        *self.inner.entry(name).or_insert(0) += by;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.inner.get(name).map(|v| *v).unwrap_or(0)
    }

    /// All counters, sorted by name.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut all: Vec<_> = self.inner.iter().map(|e| (*e.key(), *e.value())).collect();
        all.sort_unstable();
        all
    }
}
