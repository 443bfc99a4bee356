//! Plan and result caches with TTL+LRU eviction and content-hash keying
//! (spec.md §4.5).
//!
//! Grounded on the teacher's `server::metrics::Metrics`/`GLOBAL_METRICS`
//! concurrency shape: a `once_cell::sync::Lazy` singleton guarding shared
//! state behind a lock, rather than passing a cache handle through every
//! call. Here the guarded state is an `IndexMap` (insertion order doubles
//! as LRU recency once touched entries are moved to the back) instead of a
//! counter map.

use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::optimizer::Plan;
use crate::query::{Condition, Field, Operand, Query};
use crate::value::Value;

/// One row of `get_statistics`'s `top_plans` (spec.md §4.5), the
/// most-frequently-reused cached plans by hit count.
#[derive(Debug, Clone, Serialize)]
pub struct TopPlan {
    pub plan_id: String,
    pub hits: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatistics {
    pub plan_hits: u64,
    pub plan_misses: u64,
    pub plan_evictions: u64,
    pub result_hits: u64,
    pub result_misses: u64,
    pub result_evictions: u64,
    /// `total_entries` (spec.md §4.5 `get_statistics`).
    pub plan_total_entries: usize,
    /// `total_hits`.
    pub plan_total_hits: u64,
    /// `avg_hits`, `0.0` when the cache is empty.
    pub plan_avg_hits: f64,
    /// `oldest_entry`: age of the longest-resident entry, if any.
    pub plan_oldest_entry_age: Option<Duration>,
    /// `most_recent_entry`: age of the most recently inserted entry, if any.
    pub plan_most_recent_entry_age: Option<Duration>,
    /// `top_plans`: up to 5 plans by hit count, descending.
    pub plan_top_plans: Vec<TopPlan>,
}

struct PlanEntry {
    plan: Plan,
    inserted_at: Instant,
    last_accessed_at: Instant,
    hits: u64,
}

/// Thread-safe, TTL+LRU plan cache keyed by a content hash of the query
/// shape (spec.md §4.5: "two queries differing only in literal values
/// share a cached plan").
pub struct PlanCache {
    inner: Mutex<IndexMap<String, PlanEntry>>,
    capacity: usize,
    ttl: Duration,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    evictions: std::sync::atomic::AtomicU64,
}

impl PlanCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(IndexMap::new()),
            capacity,
            ttl,
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
            evictions: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Plan> {
        use std::sync::atomic::Ordering;
        let mut guard = self.inner.lock();
        let expired = guard.get(key).map(|e| e.inserted_at.elapsed() > self.ttl).unwrap_or(false);
        if expired {
            guard.shift_remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match guard.shift_remove(key) {
            Some(entry) => {
                let plan = entry.plan.clone();
                log::trace!("plan cache hit for {key}, idle for {:?}", entry.last_accessed_at.elapsed());
                guard.insert(
                    key.to_string(),
                    PlanEntry {
                        plan: plan.clone(),
                        inserted_at: entry.inserted_at,
                        last_accessed_at: Instant::now(),
                        hits: entry.hits + 1,
                    },
                );
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(plan)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or replaces the entry for `key`, evicting LRU-tail entries
    /// beyond capacity. Returns how many entries were evicted by this call,
    /// so a caller can feed an external eviction counter.
    pub fn insert(&self, key: String, plan: Plan) -> usize {
        use std::sync::atomic::Ordering;
        let mut guard = self.inner.lock();
        guard.shift_remove(&key);
        let now = Instant::now();
        guard.insert(key, PlanEntry { plan, inserted_at: now, last_accessed_at: now, hits: 0 });
        let mut evicted = 0;
        while guard.len() > self.capacity {
            guard.shift_remove_index(0);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            evicted += 1;
        }
        evicted
    }

    /// Snapshot for `get_statistics` (spec.md §4.5): total entries, total
    /// hits, average hits per entry, the age of the oldest/newest entry, and
    /// the top 5 plans by hit count.
    pub fn snapshot_for_statistics(&self) -> (usize, u64, f64, Option<Duration>, Option<Duration>, Vec<TopPlan>) {
        let guard = self.inner.lock();
        let total_entries = guard.len();
        let total_hits: u64 = guard.values().map(|e| e.hits).sum();
        let avg_hits = if total_entries == 0 { 0.0 } else { total_hits as f64 / total_entries as f64 };
        let oldest = guard.values().map(|e| e.inserted_at.elapsed()).max();
        let most_recent = guard.values().map(|e| e.inserted_at.elapsed()).min();
        let mut top: Vec<TopPlan> = guard
            .values()
            .map(|e| TopPlan { plan_id: e.plan.plan_id.clone(), hits: e.hits })
            .collect();
        top.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.plan_id.cmp(&b.plan_id)));
        top.truncate(5);
        (total_entries, total_hits, avg_hits, oldest, most_recent, top)
    }

    /// Drops every cached plan for `object_name`, matching by substring of
    /// the serialized query (spec.md §4.5 "invalidate by object").
    pub fn invalidate_object(&self, object_name: &str) {
        let mut guard = self.inner.lock();
        guard.retain(|_, entry| entry.plan.query.from_object.0 != object_name);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> (u64, u64, u64) {
        use std::sync::atomic::Ordering;
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
        )
    }
}

struct ResultEntry {
    rows: Vec<crate::value::Row>,
    inserted_at: Instant,
    object_names: Vec<String>,
}

/// Caches the final row set of a fully-resolved query (spec.md §4.5:
/// result cache is keyed on the RLS-enforced, parameter-bound query, so
/// two users never share a cached result set unless their enforced
/// queries are byte-for-byte identical).
pub struct ResultCache {
    inner: Mutex<IndexMap<String, ResultEntry>>,
    capacity: usize,
    ttl: Duration,
    max_rows_per_entry: usize,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    evictions: std::sync::atomic::AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration, max_rows_per_entry: usize) -> Self {
        Self {
            inner: Mutex::new(IndexMap::new()),
            capacity,
            ttl,
            max_rows_per_entry,
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
            evictions: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<crate::value::Row>> {
        use std::sync::atomic::Ordering;
        let mut guard = self.inner.lock();
        let expired = guard.get(key).map(|e| e.inserted_at.elapsed() > self.ttl).unwrap_or(false);
        if expired {
            guard.shift_remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match guard.shift_remove(key) {
            Some(entry) => {
                let rows = entry.rows.clone();
                guard.insert(
                    key.to_string(),
                    ResultEntry { rows: rows.clone(), inserted_at: entry.inserted_at, object_names: entry.object_names },
                );
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(rows)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Skips caching result sets larger than `max_rows_per_entry`
    /// (spec.md §4.5: "never cache unbounded result sets").
    /// Returns how many entries were evicted by this call, so a caller can
    /// feed an external eviction counter. `0` when the insert was skipped
    /// for exceeding `max_rows_per_entry`.
    pub fn insert(&self, key: String, rows: Vec<crate::value::Row>, object_names: Vec<String>) -> usize {
        use std::sync::atomic::Ordering;
        if rows.len() > self.max_rows_per_entry {
            log::debug!("result set too large to cache ({} rows)", rows.len());
            return 0;
        }
        let mut guard = self.inner.lock();
        guard.shift_remove(&key);
        guard.insert(key, ResultEntry { rows, inserted_at: Instant::now(), object_names });
        let mut evicted = 0;
        while guard.len() > self.capacity {
            guard.shift_remove_index(0);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            evicted += 1;
        }
        evicted
    }

    pub fn invalidate_object(&self, object_name: &str) {
        let mut guard = self.inner.lock();
        guard.retain(|_, entry| !entry.object_names.iter().any(|o| o == object_name));
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn stats(&self) -> (u64, u64, u64) {
        use std::sync::atomic::Ordering;
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
        )
    }
}

/// Hashes the *shape* of a query (structure and field/operator names, not
/// literal values) for plan-cache keying, optionally salted with a
/// security-context discriminator when RLS is in play (spec.md §4.5: plans
/// are shared across literal values but not across distinct RLS rewrites
/// unless the caller passes the same discriminator).
pub fn query_shape_hash(query: &Query, rls_discriminator: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hash_query_shape(&mut hasher, query);
    if let Some(d) = rls_discriminator {
        hasher.update(b"|rls:");
        hasher.update(d.as_bytes());
    }
    hex_digest(hasher)
}

/// Hashes a fully materialized query, literal values included, normalizing
/// `IN`-list operands by sorting first so that `IN (1, 2)` and `IN (2, 1)`
/// share a cache entry (spec.md §9 design note).
pub fn query_content_hash(query: &Query, rls_discriminator: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hash_query_shape(&mut hasher, query);
    hash_query_literals(&mut hasher, query);
    if let Some(d) = rls_discriminator {
        hasher.update(b"|rls:");
        hasher.update(d.as_bytes());
    }
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn hash_query_shape(hasher: &mut Sha256, query: &Query) {
    hasher.update(query.from_object.0.as_bytes());
    for field in &query.fields {
        hash_field_shape(hasher, field);
    }
    if let Some(cond) = &query.where_clause {
        hash_condition_shape(hasher, cond);
    }
    if let Some(having) = &query.having {
        hash_condition_shape(hasher, having);
    }
    if let Some(group_by) = &query.group_by {
        for f in group_by {
            hasher.update(f.0.as_bytes());
        }
    }
    if let Some(order_by) = &query.order_by {
        for o in order_by {
            hasher.update(o.field.0.as_bytes());
            hasher.update([o.direction as u8]);
            hasher.update([o.nulls as u8]);
        }
    }
    hasher.update(b"|limit:");
    hasher.update([query.limit.is_some() as u8]);
    hasher.update(b"|offset:");
    hasher.update([query.offset.is_some() as u8]);
}

fn hash_field_shape(hasher: &mut Sha256, field: &Field) {
    match field {
        Field::Plain { name, .. } => {
            hasher.update(b"plain:");
            hasher.update(name.0.as_bytes());
        }
        Field::Aggregate { aggregate, .. } => {
            hasher.update(b"agg:");
            hasher.update([aggregate.function as u8]);
            if let Some(arg) = &aggregate.arg {
                hasher.update(arg.0.as_bytes());
            }
        }
        Field::Subquery { query, .. } => {
            hasher.update(b"subquery:");
            hash_query_shape(hasher, query);
        }
    }
}

fn hash_condition_shape(hasher: &mut Sha256, cond: &Condition) {
    match cond {
        Condition::Leaf { field, op, operand } => {
            hasher.update(b"leaf:");
            hasher.update(field.0.as_bytes());
            hasher.update([*op as u8]);
            match operand {
                Operand::Scalar(_) => hasher.update(b"scalar"),
                Operand::List(values) => hasher.update(format!("list:{}", values.len()).as_bytes()),
                Operand::Subquery(q) => hash_query_shape(hasher, q),
                Operand::None => hasher.update(b"none"),
            }
        }
        Condition::Logical { op, left, right } => {
            hasher.update(b"logical:");
            hasher.update([*op as u8]);
            hash_condition_shape(hasher, left);
            hash_condition_shape(hasher, right);
        }
    }
}

fn hash_query_literals(hasher: &mut Sha256, query: &Query) {
    if let Some(cond) = &query.where_clause {
        hash_condition_literals(hasher, cond);
    }
    if let Some(having) = &query.having {
        hash_condition_literals(hasher, having);
    }
    if let Some(limit) = query.limit {
        hasher.update(limit.to_le_bytes());
    }
    if let Some(offset) = query.offset {
        hasher.update(offset.to_le_bytes());
    }
}

fn hash_condition_literals(hasher: &mut Sha256, cond: &Condition) {
    match cond {
        Condition::Leaf { operand, .. } => match operand {
            Operand::Scalar(v) => hash_value(hasher, v),
            Operand::List(values) => {
                let mut sorted: Vec<&Value> = values.iter().collect();
                sorted.sort_by_key(|v| format!("{v:?}"));
                for v in sorted {
                    hash_value(hasher, v);
                }
            }
            Operand::Subquery(q) => hash_query_literals(hasher, q),
            Operand::None => {}
        },
        Condition::Logical { left, right, .. } => {
            hash_condition_literals(hasher, left);
            hash_condition_literals(hasher, right);
        }
    }
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    let mut state = std::collections::hash_map::DefaultHasher::new();
    format!("{value:?}").hash(&mut state);
    hasher.update(state.finish().to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CompareOp;

    fn sample_query(limit: Option<u64>) -> Query {
        let mut q = Query::new("Account", vec![Field::plain("Id")]);
        q.where_clause = Some(Condition::eq("Name", Value::Str("Acme".into())));
        q.limit = limit;
        q
    }

    #[test]
    fn shape_hash_ignores_literal_differences() {
        let a = sample_query(Some(10));
        let mut b = sample_query(Some(10));
        b.where_clause = Some(Condition::eq("Name", Value::Str("Globex".into())));
        assert_eq!(query_shape_hash(&a, None), query_shape_hash(&b, None));
    }

    #[test]
    fn content_hash_distinguishes_literal_differences() {
        let a = sample_query(Some(10));
        let mut b = sample_query(Some(10));
        b.where_clause = Some(Condition::eq("Name", Value::Str("Globex".into())));
        assert_ne!(query_content_hash(&a, None), query_content_hash(&b, None));
    }

    #[test]
    fn content_hash_normalizes_in_list_order() {
        let mut a = Query::new("Account", vec![Field::plain("Id")]);
        a.where_clause = Some(Condition::Leaf {
            field: "Id".into(),
            op: CompareOp::In,
            operand: Operand::List(vec![Value::Int(1), Value::Int(2)]),
        });
        let mut b = Query::new("Account", vec![Field::plain("Id")]);
        b.where_clause = Some(Condition::Leaf {
            field: "Id".into(),
            op: CompareOp::In,
            operand: Operand::List(vec![Value::Int(2), Value::Int(1)]),
        });
        assert_eq!(query_content_hash(&a, None), query_content_hash(&b, None));
    }

    #[test]
    fn plan_cache_evicts_oldest_beyond_capacity() {
        let cache = PlanCache::new(2, Duration::from_secs(60));
        let plan_for = |name: &str| crate::optimizer::Plan {
            query: Query::new(name, vec![Field::plain("Id")]),
            base_cardinality: 0,
            filtered_cardinality: 0,
            join_order: vec![],
            selected_indexes: vec![],
            use_parallel: false,
            parallel_degree: 1,
            use_hash_aggregation: false,
            use_streaming: false,
            estimated_cost: 0.0,
            plan_id: name.to_string(),
        };
        assert_eq!(cache.insert("a".into(), plan_for("A")), 0);
        assert_eq!(cache.insert("b".into(), plan_for("B")), 0);
        assert_eq!(cache.insert("c".into(), plan_for("C")), 1);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn plan_cache_statistics_report_hits_and_top_plans() {
        let cache = PlanCache::new(10, Duration::from_secs(60));
        let plan_for = |name: &str| crate::optimizer::Plan {
            query: Query::new(name, vec![Field::plain("Id")]),
            base_cardinality: 0,
            filtered_cardinality: 0,
            join_order: vec![],
            selected_indexes: vec![],
            use_parallel: false,
            parallel_degree: 1,
            use_hash_aggregation: false,
            use_streaming: false,
            estimated_cost: 0.0,
            plan_id: name.to_string(),
        };
        cache.insert("a".into(), plan_for("A"));
        cache.insert("b".into(), plan_for("B"));
        cache.get("a");
        cache.get("a");
        cache.get("b");

        let (total_entries, total_hits, avg_hits, oldest, most_recent, top) = cache.snapshot_for_statistics();
        assert_eq!(total_entries, 2);
        assert_eq!(total_hits, 3);
        assert!((avg_hits - 1.5).abs() < f64::EPSILON);
        assert!(oldest.is_some());
        assert!(most_recent.is_some());
        assert_eq!(top[0].plan_id, "A");
        assert_eq!(top[0].hits, 2);
    }

    #[test]
    fn result_cache_skips_oversized_result_sets() {
        let cache = ResultCache::new(10, Duration::from_secs(60), 1);
        let mut row1 = crate::value::Row::new();
        row1.insert("Id".to_string(), Value::Int(1));
        let rows = vec![row1.clone(), row1];
        assert_eq!(cache.insert("key".into(), rows, vec!["Account".into()]), 0);
        assert!(cache.get("key").is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn query_with_literal(n: i64) -> Query {
        let mut q = Query::new("Account", vec![Field::plain("Id")]);
        q.where_clause = Some(Condition::eq("Amount", Value::Int(n)));
        q
    }

    proptest! {
        /// Hashing the same query twice (by value, not by reference)
        /// always produces the same digest: both hash functions are pure
        /// functions of the query's serialized content.
        #[test]
        fn hashing_is_deterministic(n in any::<i64>()) {
            let q1 = query_with_literal(n);
            let q2 = query_with_literal(n);
            prop_assert_eq!(query_shape_hash(&q1, None), query_shape_hash(&q2, None));
            prop_assert_eq!(query_content_hash(&q1, None), query_content_hash(&q2, None));
        }

        /// The shape hash never depends on which literal value a leaf
        /// condition carries (spec.md §4.5: plans are shared across
        /// literal values).
        #[test]
        fn shape_hash_ignores_any_literal_pair(a in any::<i64>(), b in any::<i64>()) {
            let qa = query_with_literal(a);
            let qb = query_with_literal(b);
            prop_assert_eq!(query_shape_hash(&qa, None), query_shape_hash(&qb, None));
        }

        /// The content hash distinguishes any two distinct literal values
        /// (collisions aside), unlike the shape hash.
        #[test]
        fn content_hash_distinguishes_distinct_literals(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            let qa = query_with_literal(a);
            let qb = query_with_literal(b);
            prop_assert_ne!(query_content_hash(&qa, None), query_content_hash(&qb, None));
        }

        /// A non-empty RLS discriminator always changes both hashes
        /// relative to the undiscriminated query (spec.md §4.5: plans are
        /// not shared across distinct RLS rewrites).
        #[test]
        fn rls_discriminator_changes_both_hashes(n in any::<i64>(), d in "[a-z]{1,8}") {
            let q = query_with_literal(n);
            prop_assert_ne!(query_shape_hash(&q, None), query_shape_hash(&q, Some(&d)));
            prop_assert_ne!(query_content_hash(&q, None), query_content_hash(&q, Some(&d)));
        }
    }
}
