//! Published engine handle with atomic index replacement.
//!
//! Readers load the current index without locking; a rebuilt index is
//! swapped in whole, so in-flight matches keep the index they started with.
//! Builds are ordered by ticket: only the most recently started build may
//! publish, and anything older is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::{debug, info};
use parking_lot::Mutex;
use quick_cache::sync::Cache;

use crate::hash::hash64;
use crate::index::FilterIndex;
use crate::snapshot::{deserialize, SnapshotError};
use crate::types::{MatchRequest, MatchResult, MatchingStats, ResourceType};

/// Default result cache capacity (number of entries).
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Configuration for [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of cached match results. 0 disables the cache.
    ///
    /// Entries are keyed by a 64-bit hash of the request but store the full
    /// request, so a hash collision is a miss rather than a wrong verdict.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn no_cache() -> Self {
        Self { cache_capacity: 0 }
    }
}

/// Proof that a build was started. Publishing with a ticket fails once a
/// newer build has been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTicket {
    generation: u64,
}

impl BuildTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Index plus the generation that published it.
struct Published {
    generation: u64,
    index: Arc<FilterIndex>,
}

#[derive(Default)]
struct StatsCounters {
    hash_set_saves: AtomicU64,
    exception_hash_set_saves: AtomicU64,
    false_positives: AtomicU64,
    exception_false_positives: AtomicU64,
}

impl StatsCounters {
    fn record(&self, stats: &MatchingStats) {
        self.hash_set_saves
            .fetch_add(stats.num_hash_set_saves, Ordering::Relaxed);
        self.exception_hash_set_saves
            .fetch_add(stats.num_exception_hash_set_saves, Ordering::Relaxed);
        self.false_positives
            .fetch_add(stats.num_false_positives, Ordering::Relaxed);
        self.exception_false_positives
            .fetch_add(stats.num_exception_false_positives, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MatchingStats {
        MatchingStats {
            num_hash_set_saves: self.hash_set_saves.load(Ordering::Relaxed),
            num_exception_hash_set_saves: self.exception_hash_set_saves.load(Ordering::Relaxed),
            num_false_positives: self.false_positives.load(Ordering::Relaxed),
            num_exception_false_positives: self.exception_false_positives.load(Ordering::Relaxed),
        }
    }
}

/// A cached verdict and the request it was computed for.
struct CachedVerdict {
    generation: u64,
    url: Box<str>,
    source_domain: Box<str>,
    resource_type: ResourceType,
    blocked: bool,
}

impl CachedVerdict {
    fn new(generation: u64, req: &MatchRequest<'_>, blocked: bool) -> Self {
        Self {
            generation,
            url: req.url.into(),
            source_domain: req.source_domain.into(),
            resource_type: req.resource_type,
            blocked,
        }
    }

    fn answers(&self, generation: u64, req: &MatchRequest<'_>) -> bool {
        self.generation == generation
            && self.resource_type == req.resource_type
            && *self.url == *req.url
            && *self.source_domain == *req.source_domain
    }
}

/// Shared, thread-safe blocking engine.
pub struct Engine {
    current: ArcSwap<Published>,
    /// Generation of the most recently started build
    requested: AtomicU64,
    /// Serialises publication
    publish_lock: Mutex<()>,
    cache: Option<Cache<u64, Arc<CachedVerdict>>>,
    stats: StatsCounters,
}

impl Engine {
    /// Engine with an empty index. Blocks nothing until a build is published.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_index(FilterIndex::empty(), config)
    }

    pub fn with_index(index: FilterIndex, config: EngineConfig) -> Self {
        let cache = (config.cache_capacity > 0).then(|| Cache::new(config.cache_capacity));
        Self {
            current: ArcSwap::from_pointee(Published {
                generation: 0,
                index: Arc::new(index),
            }),
            requested: AtomicU64::new(0),
            publish_lock: Mutex::new(()),
            cache,
            stats: StatsCounters::default(),
        }
    }

    /// Start a build. Any build started earlier can no longer publish.
    pub fn begin_build(&self) -> BuildTicket {
        let generation = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        BuildTicket { generation }
    }

    /// Publish a built index. Returns `false`, and drops the index, when a
    /// newer build was started after `ticket` was issued.
    pub fn publish(&self, ticket: BuildTicket, index: FilterIndex) -> bool {
        let _guard = self.publish_lock.lock();

        let latest = self.requested.load(Ordering::SeqCst);
        if ticket.generation != latest || ticket.generation <= self.current.load().generation {
            debug!(
                "Discarding superseded build {} (latest {})",
                ticket.generation, latest
            );
            return false;
        }

        let num_filters = index.len();
        self.current.store(Arc::new(Published {
            generation: ticket.generation,
            index: Arc::new(index),
        }));

        if let Some(cache) = &self.cache {
            cache.clear();
        }

        info!(
            "Published filter index generation {} ({} filters)",
            ticket.generation, num_filters
        );
        true
    }

    /// Deserialize a snapshot and publish it. On error the live index is
    /// left untouched.
    pub fn load_snapshot(&self, ticket: BuildTicket, data: &[u8]) -> Result<bool, SnapshotError> {
        let index = deserialize(data)?;
        Ok(self.publish(ticket, index))
    }

    /// The live index.
    pub fn index(&self) -> Arc<FilterIndex> {
        Arc::clone(&self.current.load().index)
    }

    /// Generation of the live index; 0 before the first publish.
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Match without the result cache, returning full diagnostics.
    pub fn check(&self, req: &MatchRequest<'_>) -> MatchResult {
        let result = self.current.load().index.match_request(req);
        self.stats.record(&result.stats);
        result
    }

    /// Whether the request should be blocked. Uses the result cache when
    /// one is configured.
    pub fn matches(&self, req: &MatchRequest<'_>) -> bool {
        let current = self.current.load();

        let Some(cache) = &self.cache else {
            let result = current.index.match_request(req);
            self.stats.record(&result.stats);
            return result.is_blocked();
        };

        let key = cache_key(current.generation, req);
        if let Some(cached) = cache.get(&key) {
            if cached.answers(current.generation, req) {
                return cached.blocked;
            }
        }

        let result = current.index.match_request(req);
        self.stats.record(&result.stats);
        let blocked = result.is_blocked();
        cache.insert(key, Arc::new(CachedVerdict::new(current.generation, req, blocked)));
        blocked
    }

    /// Matching counters aggregated over every uncached match so far.
    pub fn matching_stats(&self) -> MatchingStats {
        self.stats.snapshot()
    }

    /// Number of cached results.
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.len())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn cache_key(generation: u64, req: &MatchRequest<'_>) -> u64 {
    let url = hash64(req.url.as_bytes()).to_u64();
    let source = hash64(req.source_domain.as_bytes()).to_u64();
    url ^ source.rotate_left(29)
        ^ (req.resource_type.bits() as u64).rotate_left(47)
        ^ generation.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}
