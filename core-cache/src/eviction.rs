//! Victim selection for the eviction policies

use crate::config::EvictionPolicy;

/// Ordering facts about one entry. Lower ranks are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EvictionRank {
    /// Larger is more recently used
    pub recency: i64,
    pub frequency: u64,
    /// Larger is inserted later
    pub sequence: i64,
}

impl EvictionRank {
    fn key(&self, policy: EvictionPolicy) -> (i64, i64) {
        let frequency = i64::try_from(self.frequency).unwrap_or(i64::MAX);
        match policy {
            EvictionPolicy::LeastRecentlyUsed => (self.recency, self.sequence),
            EvictionPolicy::LeastFrequentlyUsed => (frequency, self.sequence),
            EvictionPolicy::FirstInFirstOut => (self.sequence, 0),
        }
    }
}

/// Pick the entry to evict under `policy`, breaking ties by insertion order
/// and finally by key so the choice is deterministic.
pub(crate) fn select_victim<'a, I>(policy: EvictionPolicy, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, EvictionRank)>,
{
    candidates
        .into_iter()
        .min_by(|(a_key, a), (b_key, b)| {
            a.key(policy)
                .cmp(&b.key(policy))
                .then_with(|| a_key.cmp(b_key))
        })
        .map(|(key, _)| key)
}
