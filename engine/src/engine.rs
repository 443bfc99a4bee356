//! The top-level `Engine`: wires parser → RLS → plan cache → optimizer →
//! generator → driver → result cache into the public surface spec.md §6
//! names (`query`, `query<T>`, `execute<T>`, `explain`, `invalidate_cache`,
//! `clear_caches`, `cache_statistics`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::{query_content_hash, query_shape_hash, CacheStatistics, PlanCache, ResultCache};
use crate::config::EngineConfig;
use crate::driver::Driver;
use crate::error::{EngineError, Result};
use crate::metadata::{MetadataProvider, StatisticsProvider};
use crate::metrics::GLOBAL_METRICS;
use crate::optimizer::{self, Plan};
use crate::parser;
use crate::rls::RlsEnforcer;
use crate::security::{CancellationToken, SecurityContext, SecurityProvider};
use crate::sql_writer::Dialect;
use crate::value::Row;

/// Maps a dynamic [`Row`] into a caller-defined typed record, per the
/// "Dynamic result shape" design note (spec.md §9): the core never
/// materializes anything beyond `map<string, Value>` itself; a typed
/// mapper is a convenience the caller opts into.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

/// The `metadata` field of `execute<T>`'s result (spec.md §6): whatever the
/// core can say about how the query was actually served, beyond row data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecuteMetadata {
    pub from_cache: bool,
    pub plan_id: String,
}

/// The instrumented execution form (spec.md §6 `execute<T>`).
#[derive(Debug, Serialize)]
pub struct ExecuteResult<T> {
    pub records: Vec<T>,
    pub success: bool,
    pub error: Option<String>,
    pub execution_time: Duration,
    pub record_count: usize,
    pub metadata: ExecuteMetadata,
}

pub struct Engine {
    config: EngineConfig,
    metadata: Arc<dyn MetadataProvider>,
    stats: Arc<dyn StatisticsProvider>,
    security: Arc<dyn SecurityProvider>,
    driver: Arc<dyn Driver>,
    dialect: Dialect,
    rls: RlsEnforcer,
    plan_cache: PlanCache,
    result_cache: ResultCache,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        metadata: Arc<dyn MetadataProvider>,
        stats: Arc<dyn StatisticsProvider>,
        security: Arc<dyn SecurityProvider>,
        driver: Arc<dyn Driver>,
        dialect: Dialect,
    ) -> Self {
        let plan_cache = PlanCache::new(config.plan_cache_size, config.plan_cache_ttl());
        let result_cache =
            ResultCache::new(config.result_cache_size, config.result_cache_ttl(), config.max_result_cache_size);
        Self {
            config,
            metadata,
            stats,
            security,
            driver,
            dialect,
            rls: RlsEnforcer::default(),
            plan_cache,
            result_cache,
        }
    }

    /// `query(dsql) -> [row]` (spec.md §6), untyped.
    pub async fn query(&self, dsql: &str) -> Result<Vec<Row>> {
        let token = CancellationToken::new();
        self.query_cancellable(dsql, &token).await
    }

    pub async fn query_cancellable(&self, dsql: &str, cancel: &CancellationToken) -> Result<Vec<Row>> {
        self.run_query(dsql, cancel).await.map(|(rows, _)| rows)
    }

    /// Core query path shared by `query`/`query_cancellable`/`execute`,
    /// reporting alongside the rows whether they were served from the
    /// result cache and which plan was used (spec.md §6 `execute`'s
    /// `metadata` field).
    async fn run_query(&self, dsql: &str, cancel: &CancellationToken) -> Result<(Vec<Row>, ExecuteMetadata)> {
        let start = Instant::now();
        let ctx = self.security.current();
        let plan = self.plan_for(dsql, &ctx)?;
        let plan_id = plan.plan_id.clone();

        let rls_discriminator = self.rls_discriminator(&ctx);
        let result_key = query_content_hash(&plan.query, rls_discriminator.as_deref());

        if self.config.enable_result_cache {
            if let Some(rows) = self.result_cache.get(&result_key) {
                GLOBAL_METRICS.result_cache_hits.inc();
                GLOBAL_METRICS.record_query_outcome("success");
                GLOBAL_METRICS.observe_query_duration(start.elapsed().as_secs_f64());
                return Ok((rows, ExecuteMetadata { from_cache: true, plan_id }));
            }
            GLOBAL_METRICS.result_cache_misses.inc();
        }

        let generated = crate::generator::generate(&plan, self.dialect, self.metadata.as_ref())?;
        let rows = self
            .driver
            .execute(&generated.sql, &generated.params, cancel)
            .await
            .map_err(|e| match e {
                EngineError::Cancelled | EngineError::Timeout => e,
                other => EngineError::sql(anyhow::anyhow!(other.to_string()), generated.sql.clone()),
            })?;

        if self.config.enable_result_cache {
            let evicted = self.result_cache.insert(result_key, rows.clone(), vec![plan.query.from_object.0.clone()]);
            GLOBAL_METRICS.record_result_cache_evictions(evicted);
        }

        GLOBAL_METRICS.record_query_outcome("success");
        GLOBAL_METRICS.observe_query_duration(start.elapsed().as_secs_f64());
        Ok((rows, ExecuteMetadata { from_cache: false, plan_id }))
    }

    /// `query<T>(dsql) -> [T]` (spec.md §6), typed via [`FromRow`].
    pub async fn query_typed<T: FromRow>(&self, dsql: &str) -> Result<Vec<T>> {
        let rows = self.query(dsql).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// `execute<T>(dsql) -> {records, success, error?, execution_time,
    /// record_count, metadata}` (spec.md §6), the instrumented form.
    pub async fn execute<T: FromRow>(&self, dsql: &str) -> ExecuteResult<T> {
        let start = Instant::now();
        let token = CancellationToken::new();
        match self.run_query(dsql, &token).await {
            Ok((rows, metadata)) => match rows.iter().map(T::from_row).collect::<Result<Vec<T>>>() {
                Ok(records) => {
                    let record_count = records.len();
                    ExecuteResult {
                        records,
                        success: true,
                        error: None,
                        execution_time: start.elapsed(),
                        record_count,
                        metadata,
                    }
                }
                Err(err) => {
                    GLOBAL_METRICS.record_query_outcome("error");
                    ExecuteResult {
                        records: Vec::new(),
                        success: false,
                        error: Some(err.to_string()),
                        execution_time: start.elapsed(),
                        record_count: 0,
                        metadata,
                    }
                }
            },
            Err(err) => {
                GLOBAL_METRICS.record_query_outcome("error");
                ExecuteResult {
                    records: Vec::new(),
                    success: false,
                    error: Some(err.to_string()),
                    execution_time: start.elapsed(),
                    record_count: 0,
                    metadata: ExecuteMetadata::default(),
                }
            }
        }
    }

    /// `explain(dsql) -> Plan` (spec.md §6).
    pub fn explain(&self, dsql: &str) -> Result<Plan> {
        let ctx = self.security.current();
        self.plan_for(dsql, &ctx)
    }

    /// `invalidate_cache(object_name)` (spec.md §6).
    pub fn invalidate_cache(&self, object_name: &str) {
        self.plan_cache.invalidate_object(object_name);
        self.result_cache.invalidate_object(object_name);
    }

    /// `clear_caches()` (spec.md §6).
    pub fn clear_caches(&self) {
        self.plan_cache.clear();
        self.result_cache.clear();
    }

    /// `cache_statistics()` / plan cache's `get_statistics` (spec.md §6, §4.5).
    pub fn cache_statistics(&self) -> CacheStatistics {
        let (plan_hits, plan_misses, plan_evictions) = self.plan_cache.stats();
        let (result_hits, result_misses, result_evictions) = self.result_cache.stats();
        let (plan_total_entries, plan_total_hits, plan_avg_hits, plan_oldest_entry_age, plan_most_recent_entry_age, plan_top_plans) =
            self.plan_cache.snapshot_for_statistics();
        CacheStatistics {
            plan_hits,
            plan_misses,
            plan_evictions,
            result_hits,
            result_misses,
            result_evictions,
            plan_total_entries,
            plan_total_hits,
            plan_avg_hits,
            plan_oldest_entry_age,
            plan_most_recent_entry_age,
            plan_top_plans,
        }
    }

    fn plan_for(&self, dsql: &str, ctx: &SecurityContext) -> Result<Plan> {
        let parsed = parser::parse_with_metadata(dsql, self.metadata.as_ref())?;
        let query = if self.config.enable_rls {
            self.rls.apply(parsed, ctx, self.metadata.as_ref())
        } else {
            parsed
        };

        let rls_discriminator = self.rls_discriminator(ctx);
        let shape_key = query_shape_hash(&query, rls_discriminator.as_deref());

        if self.config.enable_plan_cache {
            if let Some(plan) = self.plan_cache.get(&shape_key) {
                GLOBAL_METRICS.plan_cache_hits.inc();
                return Ok(plan);
            }
            GLOBAL_METRICS.plan_cache_misses.inc();
        }

        let plan = match optimizer::optimize(query.clone(), self.metadata.as_ref(), self.stats.as_ref(), num_cpus()) {
            Ok(plan) => plan,
            Err(err) => {
                log::warn!("optimizer error, falling back to unoptimized plan: {err}");
                unoptimized_plan(query, &shape_key)
            }
        };

        if self.config.enable_plan_cache {
            let evicted = self.plan_cache.insert(shape_key, plan.clone());
            GLOBAL_METRICS.record_plan_cache_evictions(evicted);
        }

        Ok(plan)
    }

    fn rls_discriminator(&self, ctx: &SecurityContext) -> Option<String> {
        if !self.config.enable_rls {
            return None;
        }
        let mut roles: Vec<&String> = ctx.roles.iter().collect();
        roles.sort();
        let roles_joined = roles.into_iter().cloned().collect::<Vec<_>>().join(",");
        Some(format!("{}|{}", ctx.user_id, roles_joined))
    }
}

/// Fallback plan used when the optimizer itself fails (spec.md §7:
/// "OptimizerError... non-fatal — falls back to unoptimized order"). Joins
/// keep their parsed order, indexes and parallelism are left at the safe
/// defaults.
fn unoptimized_plan(query: crate::query::Query, plan_id: &str) -> Plan {
    let joins = query.joins.clone();
    Plan {
        base_cardinality: 0,
        filtered_cardinality: 0,
        join_order: joins,
        selected_indexes: Vec::new(),
        use_parallel: false,
        parallel_degree: 1,
        use_hash_aggregation: query.group_by.as_ref().is_some_and(|g| !g.is_empty()),
        use_streaming: false,
        estimated_cost: 0.0,
        plan_id: plan_id.to_string(),
        query,
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
