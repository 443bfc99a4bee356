//! Cardinality estimation, join reordering, index selection, and execution
//! strategy decisions (spec.md §4.3).
//!
//! Grounded on the teacher's `chiselc::indexing` (candidate scoring over a
//! filter's referenced properties) generalized from "all filtered fields
//! are candidates" to the selectivity-weighted scoring spec.md §4.3
//! requires, and on `datastore::entity`'s habit of walking a tree once to
//! build up a flat plan (there: SQL text; here: join order + index list).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::metadata::{MetadataProvider, StatisticsProvider};
use crate::query::{CompareOp, Condition, Join, Query};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub field: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub query: Query,
    pub base_cardinality: u64,
    pub filtered_cardinality: u64,
    pub join_order: Vec<Join>,
    pub selected_indexes: Vec<Index>,
    pub use_parallel: bool,
    pub parallel_degree: usize,
    pub use_hash_aggregation: bool,
    pub use_streaming: bool,
    pub estimated_cost: f64,
    pub plan_id: String,
}

/// Walks the `where`/`having` tree estimating the fraction of rows that
/// pass, per the per-operator table in spec.md §4.3.
pub fn estimate_selectivity(
    cond: &Condition,
    object_name: &str,
    stats: &dyn StatisticsProvider,
) -> f64 {
    match cond {
        Condition::Logical { op, left, right } => {
            let l = estimate_selectivity(left, object_name, stats);
            let r = estimate_selectivity(right, object_name, stats);
            match op {
                crate::query::LogicalOp::And => l * r,
                crate::query::LogicalOp::Or => l + r - l * r,
            }
        }
        Condition::Leaf { field, op, operand } => {
            let leaf = field.leaf();
            let sel = stats.field_selectivity(&object_name.into(), leaf);
            let default_eq = sel.unwrap_or(0.1);
            let nullable_factor = |present: bool| if present { 0.9 } else { 1.0 };
            match op {
                CompareOp::Eq => default_eq,
                CompareOp::Ne => 1.0 - default_eq,
                CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => 0.33,
                CompareOp::Like => 0.1,
                CompareOp::Contains => 0.05,
                CompareOp::StartsWith | CompareOp::EndsWith => 0.1,
                CompareOp::In => {
                    let n = match operand {
                        crate::query::Operand::List(v) => v.len(),
                        _ => 1,
                    };
                    (n as f64 * default_eq).min(0.5)
                }
                CompareOp::NotIn => {
                    let n = match operand {
                        crate::query::Operand::List(v) => v.len(),
                        _ => 1,
                    };
                    1.0 - (n as f64 * default_eq).min(0.5)
                }
                CompareOp::IsNull => 0.1 * nullable_factor(sel.is_some()),
                CompareOp::IsNotNull => {
                    if sel.is_some() {
                        0.9
                    } else {
                        1.0
                    }
                }
            }
        }
    }
}

/// `joinCost(L, j) = min(L * j.rows, L + j.rows) + L * j.rows * j.selectivity`
/// (spec.md §4.3).
pub fn join_cost(running_cardinality: f64, join: &Join) -> f64 {
    let rows = join.estimated_row_count as f64;
    let nested_or_hash = (running_cardinality * rows).min(running_cardinality + rows);
    nested_or_hash + running_cardinality * rows * join.selectivity
}

/// Reorders joins to minimize cumulative [`join_cost`]. 0-1 joins: identity.
/// <=6 joins: exact DP over subset bitmasks. >6 joins: greedy.
pub fn reorder_joins(joins: &[Join], base_cardinality: f64) -> Vec<Join> {
    match joins.len() {
        0 | 1 => joins.to_vec(),
        n if n <= 6 => dp_join_order(joins, base_cardinality),
        _ => greedy_join_order(joins, base_cardinality),
    }
}

fn dp_join_order(joins: &[Join], base_cardinality: f64) -> Vec<Join> {
    let n = joins.len();
    let full = 1usize << n;
    // dp[mask] = (cost, cardinality, order)
    let mut dp: Vec<Option<(f64, f64, Vec<usize>)>> = vec![None; full];
    dp[0] = Some((0.0, base_cardinality, Vec::new()));

    for mask in 1..full {
        let mut best: Option<(f64, f64, Vec<usize>)> = None;
        for j in 0..n {
            if mask & (1 << j) == 0 {
                continue;
            }
            let prev_mask = mask & !(1 << j);
            if let Some((prev_cost, prev_card, prev_order)) = &dp[prev_mask] {
                let cost = prev_cost + join_cost(*prev_card, &joins[j]);
                let card = prev_card * joins[j].selectivity;
                let better = match &best {
                    None => true,
                    Some((best_cost, _, _)) => cost < *best_cost,
                };
                if better {
                    let mut order = prev_order.clone();
                    order.push(j);
                    best = Some((cost, card, order));
                }
            }
        }
        dp[mask] = best;
    }

    dp[full - 1]
        .as_ref()
        .map(|(_, _, order)| order.iter().map(|&i| joins[i].clone()).collect())
        .unwrap_or_else(|| joins.to_vec())
}

fn greedy_join_order(joins: &[Join], base_cardinality: f64) -> Vec<Join> {
    let mut remaining: Vec<&Join> = joins.iter().collect();
    let mut order = Vec::with_capacity(joins.len());
    let mut running = base_cardinality;

    while !remaining.is_empty() {
        let (idx, _) = remaining
            .iter()
            .enumerate()
            .map(|(i, j)| (i, join_cost(running, j)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("remaining is non-empty");
        let chosen = remaining.remove(idx);
        running *= chosen.selectivity;
        order.push(chosen.clone());
    }
    order
}

/// Scores indexed `(field, op)` candidates from the `where` tree and keeps
/// the top 3 by discriminating power, per spec.md §4.3. Grounded on
/// `chiselc::indexing::Index::from_filter`, which also walks a filter's
/// referenced properties to build index candidates, generalized here to
/// rank by selectivity instead of taking every referenced field verbatim.
pub fn select_indexes(
    cond: &Condition,
    object_name: &str,
    metadata: &dyn MetadataProvider,
) -> Vec<Index> {
    let mut candidates: HashMap<String, f64> = HashMap::new();
    collect_index_candidates(cond, object_name, metadata, &mut candidates);

    let mut scored: Vec<Index> = candidates
        .into_iter()
        .map(|(field, score)| Index { field, score })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(3);
    scored
}

fn collect_index_candidates(
    cond: &Condition,
    object_name: &str,
    metadata: &dyn MetadataProvider,
    out: &mut HashMap<String, f64>,
) {
    match cond {
        Condition::Logical { left, right, .. } => {
            collect_index_candidates(left, object_name, metadata, out);
            collect_index_candidates(right, object_name, metadata, out);
        }
        Condition::Leaf { field, .. } => {
            if field.relationship_prefix().is_some() {
                return;
            }
            if let Ok(obj_meta) = metadata.get(&object_name.into()) {
                if let Ok(field_meta) = obj_meta.field(field.leaf()) {
                    if field_meta.indexed {
                        let score = 1.0 / (field_meta.selectivity + 0.01);
                        out.insert(field.leaf().to_string(), score);
                    }
                }
            }
        }
    }
}

/// `optimize(query) -> Plan`, pure and deterministic given a metadata/stats
/// snapshot (spec.md §4.3 contract).
pub fn optimize(
    query: Query,
    metadata: &dyn MetadataProvider,
    stats: &dyn StatisticsProvider,
    available_cores: usize,
) -> Result<Plan> {
    let base_cardinality = stats.row_count(&query.from_object);
    if base_cardinality == 0 && metadata.get(&query.from_object).is_err() {
        return Err(EngineError::optimizer(format!(
            "no cardinality source for object {}",
            query.from_object
        )));
    }

    let selectivity = match &query.where_clause {
        Some(cond) => estimate_selectivity(cond, &query.from_object.0, stats),
        None => 1.0,
    };
    let filtered_cardinality = (base_cardinality as f64 * selectivity).round() as u64;

    let join_order = reorder_joins(&query.joins, base_cardinality as f64);

    let selected_indexes = match &query.where_clause {
        Some(cond) => select_indexes(cond, &query.from_object.0, metadata),
        None => Vec::new(),
    };

    let use_parallel = join_order.len() >= 2 && filtered_cardinality > 10_000;
    let parallel_degree = available_cores.min(4);
    let use_hash_aggregation = query.group_by.as_ref().is_some_and(|g| !g.is_empty());
    let use_streaming = filtered_cardinality > 1000 && !query.is_aggregate();

    let estimated_cost = estimate_cost(&query, base_cardinality, &join_order, filtered_cardinality);

    let plan_id = crate::cache::query_shape_hash(&query, None);

    Ok(Plan {
        query,
        base_cardinality,
        filtered_cardinality,
        join_order,
        selected_indexes,
        use_parallel,
        parallel_degree,
        use_hash_aggregation,
        use_streaming,
        estimated_cost,
        plan_id,
    })
}

fn estimate_cost(query: &Query, base_cardinality: u64, join_order: &[Join], filtered_cardinality: u64) -> f64 {
    let base = base_cardinality as f64;
    let mut cost = base * 0.1;
    if query.where_clause.is_some() {
        cost += base * 0.05;
    }
    let mut running = base;
    for join in join_order {
        cost += join_cost(running, join);
        running *= join.selectivity;
    }
    if query.order_by.is_some() {
        let n = filtered_cardinality.max(1) as f64;
        cost += n * n.log2().max(0.0);
    }
    if query.is_aggregate() {
        cost += 0.1 * filtered_cardinality as f64;
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DataType, FieldMetadata, InMemoryMetadata, ObjectMetadata};
    use crate::query::{Field, JoinType};
    use std::collections::HashMap as StdHashMap;

    fn make_metadata() -> InMemoryMetadata {
        let mut meta = InMemoryMetadata::new();
        let mut fields = StdHashMap::new();
        fields.insert(
            "Name".to_string(),
            FieldMetadata {
                field_name: "Name".into(),
                column_name: "name".into(),
                data_type: DataType::String,
                nullable: true,
                indexed: true,
                selectivity: 0.2,
            },
        );
        meta.insert(ObjectMetadata {
            object_name: "Account".into(),
            table_name: "accounts".into(),
            fields,
            relationships: vec![],
            has_rls: false,
            estimated_row_count: 1000,
        });
        meta
    }

    #[test]
    fn and_selectivity_multiplies() {
        let cond = Condition::eq("Name", crate::value::Value::Str("a".into()))
            .and(Condition::eq("Name", crate::value::Value::Str("b".into())));
        let meta = make_metadata();
        let sel = estimate_selectivity(&cond, "Account", &meta);
        assert!((sel - 0.2 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn or_selectivity_uses_inclusion_exclusion() {
        let cond = Condition::eq("Name", crate::value::Value::Str("a".into()))
            .or(Condition::eq("Name", crate::value::Value::Str("b".into())));
        let meta = make_metadata();
        let sel = estimate_selectivity(&cond, "Account", &meta);
        assert!((sel - (0.2 + 0.2 - 0.2 * 0.2)).abs() < 1e-9);
    }

    #[test]
    fn join_reorder_picks_cheapest_order_three_joins() {
        // three joins with rows {1e6, 100, 1e4} and selectivities {1, 0.01, 0.1}
        // over a base of 1000; the DP should prefer joining the most
        // selective/smallest relation first.
        let joins = vec![
            Join {
                relationship_name: "Big".into(),
                target_object: "Big".into(),
                foreign_key: "fk".into(),
                primary_key: "id".into(),
                join_type: JoinType::Inner,
                estimated_row_count: 1_000_000,
                selectivity: 1.0,
            },
            Join {
                relationship_name: "Small".into(),
                target_object: "Small".into(),
                foreign_key: "fk".into(),
                primary_key: "id".into(),
                join_type: JoinType::Inner,
                estimated_row_count: 100,
                selectivity: 0.01,
            },
            Join {
                relationship_name: "Medium".into(),
                target_object: "Medium".into(),
                foreign_key: "fk".into(),
                primary_key: "id".into(),
                join_type: JoinType::Inner,
                estimated_row_count: 10_000,
                selectivity: 0.1,
            },
        ];
        let order = reorder_joins(&joins, 1000.0);
        assert_eq!(order[0].relationship_name, "Small");
    }

    #[test]
    fn index_selection_keeps_top_three_by_score() {
        let meta = make_metadata();
        let cond = Condition::eq("Name", crate::value::Value::Str("a".into()));
        let indexes = select_indexes(&cond, "Account", &meta);
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].field, "Name");
    }

    #[test]
    fn use_parallel_requires_two_joins_and_large_cardinality() {
        let meta = make_metadata();
        let stats = make_metadata();
        let mut q = Query::new("Account", vec![Field::plain("Id")]);
        q.joins = vec![
            Join {
                relationship_name: "A".into(),
                target_object: "A".into(),
                foreign_key: "fk".into(),
                primary_key: "id".into(),
                join_type: JoinType::Inner,
                estimated_row_count: 10,
                selectivity: 1.0,
            },
            Join {
                relationship_name: "B".into(),
                target_object: "B".into(),
                foreign_key: "fk".into(),
                primary_key: "id".into(),
                join_type: JoinType::Inner,
                estimated_row_count: 10,
                selectivity: 1.0,
            },
        ];
        let plan = optimize(q, &meta, &stats, 8).unwrap();
        // base cardinality is 1000, no filter, so filtered == 1000 <= 10_000
        assert!(!plan.use_parallel);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::metadata::{DataType, FieldMetadata, InMemoryMetadata, ObjectMetadata};
    use crate::value::Value;
    use proptest::prelude::*;
    use std::collections::HashMap as StdHashMap;

    fn fixture_metadata() -> InMemoryMetadata {
        let mut meta = InMemoryMetadata::new();
        let mut fields = StdHashMap::new();
        for (name, selectivity) in [("A", 0.1_f64), ("B", 0.4), ("C", 0.8)] {
            fields.insert(
                name.to_string(),
                FieldMetadata {
                    field_name: name.into(),
                    column_name: name.to_lowercase(),
                    data_type: DataType::Number,
                    nullable: true,
                    indexed: true,
                    selectivity,
                },
            );
        }
        meta.insert(ObjectMetadata {
            object_name: "Widget".into(),
            table_name: "widgets".into(),
            fields,
            relationships: vec![],
            has_rls: false,
            estimated_row_count: 10_000,
        });
        meta
    }

    /// A small recursive strategy over `Condition`, leaves drawn from three
    /// known fields (`A`, `B`, `C`) with an `Eq` predicate over an `i64`
    /// literal, combined with `And`/`Or` up to a shallow depth.
    fn arb_condition() -> impl Strategy<Value = Condition> {
        let leaf = (prop_oneof![Just("A"), Just("B"), Just("C")], any::<i64>())
            .prop_map(|(field, v)| Condition::eq(field, Value::Int(v)));
        leaf.prop_recursive(4, 16, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| l.and(r)),
                (inner.clone(), inner).prop_map(|(l, r)| l.or(r)),
            ]
        })
    }

    proptest! {
        /// Estimated selectivity is always a probability, regardless of
        /// how deeply the `And`/`Or` tree is nested (spec.md §4.3).
        #[test]
        fn selectivity_is_always_a_probability(cond in arb_condition()) {
            let meta = fixture_metadata();
            let sel = estimate_selectivity(&cond, "Widget", &meta);
            prop_assert!(sel >= 0.0 && sel <= 1.0, "selectivity {sel} out of range");
        }

        /// `optimize()` never reports more filtered rows than base rows:
        /// the selectivity multiplier is clamped to `[0, 1]` by
        /// construction, so `filtered_cardinality <= base_cardinality`.
        #[test]
        fn filtered_cardinality_never_exceeds_base(cond in arb_condition()) {
            let meta = fixture_metadata();
            let mut q = Query::new("Widget", vec![crate::query::Field::plain("A")]);
            q.where_clause = Some(cond);
            let plan = optimize(q, &meta, &meta, 4).unwrap();
            prop_assert!(plan.filtered_cardinality <= plan.base_cardinality);
        }

        /// The same query, optimized twice, produces the same plan id
        /// (`optimize` is pure and deterministic given the same metadata).
        #[test]
        fn optimize_is_deterministic(cond in arb_condition()) {
            let meta = fixture_metadata();
            let mut q1 = Query::new("Widget", vec![crate::query::Field::plain("A")]);
            q1.where_clause = Some(cond.clone());
            let mut q2 = Query::new("Widget", vec![crate::query::Field::plain("A")]);
            q2.where_clause = Some(cond);
            let p1 = optimize(q1, &meta, &meta, 4).unwrap();
            let p2 = optimize(q2, &meta, &meta, 4).unwrap();
            prop_assert_eq!(p1.plan_id, p2.plan_id);
            prop_assert_eq!(p1.filtered_cardinality, p2.filtered_cardinality);
        }
    }
}
