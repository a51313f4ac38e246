//! Optimization result cache keyed by IR structure

use crate::ir::SelectQueryIR;
use crate::schema::SchemaModel;
use ahash::RandomState;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Structural key of a query
#[derive(Clone, Debug)]
pub struct QuerySignature {
    /// Canonical text the hash was computed from
    pub canonical: String,

    pub hash: u64,
}

impl QuerySignature {
    /// Key over from/columns/where/joins/group by/having/order by/limit/distinct, plus
    /// the statistics of the tables involved (a plan is only valid for the statistics
    /// it was costed with).
    pub fn new(ir: &SelectQueryIR, schema: &SchemaModel) -> Self {
        let mut canonical = serde_json::to_string(ir).unwrap_or_else(|_| format!("{:?}", ir));
        for table in ir.tables() {
            let stats = schema.table(&table).map(|t| {
                let indexed: Vec<&str> = t.columns.iter().filter(|c| c.has_index()).map(|c| c.name.as_str()).collect();
                format!("{:?}:{}", t.row_count, indexed.join(","))
            });
            canonical.push_str(&format!("|{}={}", table.to_ascii_lowercase(), stats.unwrap_or_default()));
        }
        let hash = hash_key(&canonical);
        Self { canonical, hash }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for QuerySignature {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.canonical == other.canonical
    }
}

impl Eq for QuerySignature {}

impl Hash for QuerySignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Seeds for the signature hasher
const SIGNATURE_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Seeded hash: identical for every run of the same binary on the same CPU.
/// Not a persistent format; ahash output may change between crate versions.
fn hash_key(key: &str) -> u64 {
    let (k0, k1, k2, k3) = SIGNATURE_SEEDS;
    let mut hasher = RandomState::with_seeds(k0, k1, k2, k3).build_hasher();
    key.hash(&mut hasher);
    hasher.finish()
}

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Signatures with a live request count
    pub tracked: usize,
}

/// Request counters kept per cache slot before counts are decayed
const TRACKED_PER_SLOT: usize = 4;

struct Entries<V> {
    map: HashMap<QuerySignature, V>,
    /// Insertion order, oldest first
    order: VecDeque<QuerySignature>,
}

/// Bounded cache with oldest-first eviction and per-key request counts.
///
/// Entries sit behind a mutex; request frequencies live in a `DashMap` so
/// counting never contends with lookups on other keys. The frequency table
/// holds at most `TRACKED_PER_SLOT * capacity` signatures: past that, every
/// count is halved and signatures that reach zero are forgotten.
pub struct OptimizerCache<V> {
    entries: Mutex<Entries<V>>,
    frequency: DashMap<QuerySignature, u64>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> OptimizerCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            frequency: DashMap::new(),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Count one request for `signature` and return the running total
    pub fn record_request(&self, signature: &QuerySignature) -> u64 {
        let count = {
            let mut count = self.frequency.entry(signature.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if self.frequency.len() > self.tracked_limit() {
            self.decay_frequencies();
        }
        count
    }

    pub fn frequency(&self, signature: &QuerySignature) -> u64 {
        self.frequency.get(signature).map_or(0, |c| *c)
    }

    fn tracked_limit(&self) -> usize {
        self.capacity.saturating_mul(TRACKED_PER_SLOT)
    }

    /// Halve all counts until the table fits its limit again
    fn decay_frequencies(&self) {
        let limit = self.tracked_limit();
        while self.frequency.len() > limit {
            self.frequency.retain(|_, count| {
                *count /= 2;
                *count > 0
            });
        }
        tracing::debug!(tracked = self.frequency.len(), "decayed optimizer request counts");
    }

    pub fn get(&self, signature: &QuerySignature) -> Option<V> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.map.get(signature) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, signature: QuerySignature, value: V) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.map.contains_key(&signature) {
            entries.map.insert(signature, value);
            return;
        }
        while entries.map.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else { break };
            entries.map.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(hash = oldest.hash, "evicted oldest optimizer cache entry");
        }
        entries.order.push_back(signature.clone());
        entries.map.insert(signature, value);
    }

    pub fn clear(&self) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.map.clear();
        entries.order.clear();
        self.frequency.clear();
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.map.len(),
            Err(poisoned) => poisoned.into_inner().map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            tracked: self.frequency.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AggregateSpec, Projection};
    use crate::schema::{Column, ColumnType, Table};

    fn ir(table: &str) -> SelectQueryIR {
        let mut ir = SelectQueryIR::new(table);
        ir.columns.push(Projection::Aggregate(AggregateSpec::count_star(table)));
        ir
    }

    #[test]
    fn test_signature_is_structural() {
        let schema = SchemaModel::new();
        let a = QuerySignature::new(&ir("orders"), &schema);
        let b = QuerySignature::new(&ir("orders"), &schema);
        let c = QuerySignature::new(&ir("customers"), &schema);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut limited = ir("orders");
        limited.limit = Some(5);
        assert_ne!(a, QuerySignature::new(&limited, &schema));
    }

    #[test]
    fn test_signature_tracks_statistics() {
        let small = SchemaModel::new().with_table(
            Table::new("orders")
                .with_column(Column::new("id", ColumnType::Integer))
                .with_row_count(10),
        );
        let mut large = small.clone();
        large.set_row_count("orders", 10_000);
        assert_ne!(QuerySignature::new(&ir("orders"), &small), QuerySignature::new(&ir("orders"), &large));
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let schema = SchemaModel::new();
        let cache: OptimizerCache<u32> = OptimizerCache::new(2);
        let keys: Vec<QuerySignature> = ["a", "b", "c"].iter().map(|t| QuerySignature::new(&ir(t), &schema)).collect();

        cache.insert(keys[0].clone(), 1);
        cache.insert(keys[1].clone(), 2);
        cache.insert(keys[2].clone(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&keys[0]), None);
        assert_eq!(cache.get(&keys[2]), Some(3));

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_request_frequency() {
        let schema = SchemaModel::new();
        let cache: OptimizerCache<u32> = OptimizerCache::new(4);
        let key = QuerySignature::new(&ir("orders"), &schema);
        assert_eq!(cache.record_request(&key), 1);
        assert_eq!(cache.record_request(&key), 2);
        assert_eq!(cache.frequency(&key), 2);
        cache.clear();
        assert_eq!(cache.frequency(&key), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_frequency_table_is_bounded() {
        let schema = SchemaModel::new();
        let cache: OptimizerCache<u32> = OptimizerCache::new(2);
        let hot = QuerySignature::new(&ir("orders"), &schema);
        for _ in 0..16 {
            cache.record_request(&hot);
        }
        for i in 0..100 {
            cache.record_request(&hot);
            cache.record_request(&QuerySignature::new(&ir(&format!("t{}", i)), &schema));
            assert!(cache.stats().tracked <= 2 * TRACKED_PER_SLOT);
        }
        assert!(cache.frequency(&hot) > 0);
    }

    #[test]
    fn test_colliding_hashes_are_distinct_keys() {
        let a = QuerySignature {
            canonical: "orders".into(),
            hash: 7,
        };
        let b = QuerySignature {
            canonical: "customers".into(),
            hash: 7,
        };
        assert_ne!(a, b);

        let cache: OptimizerCache<u32> = OptimizerCache::new(4);
        cache.insert(a.clone(), 1);
        assert_eq!(cache.get(&b), None);
        assert_eq!(cache.get(&a), Some(1));
        cache.record_request(&a);
        assert_eq!(cache.frequency(&b), 0);
    }

    #[test]
    fn test_signature_hash_is_seeded() {
        let schema = SchemaModel::new();
        let a = QuerySignature::new(&ir("orders"), &schema);
        assert_eq!(a.hash(), hash_key(&a.canonical));
        assert_eq!(hash_key("orders"), hash_key("orders"));
        assert_ne!(hash_key("orders"), hash_key("customers"));
    }
}
