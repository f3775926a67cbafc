//! Read-through cache for programme statistics

use crate::reports::ProgramStats;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Aggregate statistics cache collaborator.
///
/// Readers take [`StatsCache::generation`] before computing fresh stats and
/// hand it back to [`StatsCache::put`]; a put whose generation was overtaken
/// by an invalidation is dropped.
pub trait StatsCache: Send + Sync {
    fn get(&self) -> Option<ProgramStats>;

    /// Current invalidation generation
    fn generation(&self) -> u64;

    /// Store `stats` computed while `generation` was current.
    /// Returns `false` when the value was already stale and not stored.
    fn put(&self, generation: u64, stats: ProgramStats) -> bool;

    /// Drop cached aggregates after a balance-affecting commit
    fn invalidate_aggregates(&self);
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    entry: Option<(Instant, ProgramStats)>,
}

/// Single-slot in-process cache with a time-to-live
#[derive(Debug)]
pub struct InMemoryStatsCache {
    ttl: Duration,
    slot: Mutex<Slot>,
}

impl InMemoryStatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(Slot::default()),
        }
    }
}

impl StatsCache for InMemoryStatsCache {
    fn get(&self) -> Option<ProgramStats> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.entry.as_ref() {
            Some((stored_at, stats)) if stored_at.elapsed() < self.ttl => Some(stats.clone()),
            _ => None,
        }
    }

    fn generation(&self) -> u64 {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).generation
    }

    fn put(&self, generation: u64, stats: ProgramStats) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != generation {
            tracing::debug!(
                computed_at = generation,
                current = slot.generation,
                "Discarding stats computed before an invalidation"
            );
            return false;
        }
        slot.entry = Some((Instant::now(), stats));
        true
    }

    fn invalidate_aggregates(&self) {
        tracing::debug!("Stats cache invalidated");
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation = slot.generation.wrapping_add(1);
        slot.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total_customers: i64) -> ProgramStats {
        ProgramStats {
            total_customers,
            ..ProgramStats::default()
        }
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = InMemoryStatsCache::new(Duration::from_secs(60));
        assert!(cache.get().is_none());

        assert!(cache.put(cache.generation(), stats(3)));
        assert_eq!(cache.get().map(|s| s.total_customers), Some(3));

        cache.invalidate_aggregates();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_put_after_invalidation_is_dropped() {
        let cache = InMemoryStatsCache::new(Duration::from_secs(60));
        let generation = cache.generation();

        // A commit lands while the reader is still computing
        cache.invalidate_aggregates();

        assert!(!cache.put(generation, stats(3)));
        assert!(cache.get().is_none());

        assert!(cache.put(cache.generation(), stats(4)));
        assert_eq!(cache.get().map(|s| s.total_customers), Some(4));
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache = InMemoryStatsCache::new(Duration::ZERO);
        cache.put(cache.generation(), stats(1));
        assert!(cache.get().is_none());
    }
}
