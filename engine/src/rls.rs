//! Row-level security enforcement (spec.md §4.2).
//!
//! Policies are modeled as small value objects holding a predicate builder,
//! the same shape as the teacher's `policies::Policy { transform,
//! except_uri }` — a struct of closures/fn-pointers keyed by name, rather
//! than a trait-object hierarchy, since the policy set here is a fixed,
//! enumerable list (`OwnerBased`, `SharingBased`, `HierarchyBased`,
//! `TerritoryBased`, `Custom`) that doesn't need dynamic dispatch.

use std::collections::HashMap;

use crate::metadata::{FieldName, MetadataProvider, ObjName};
use crate::query::{CompareOp, Condition, LogicalOp, Operand, Query};
use crate::security::SecurityContext;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    OwnerBased,
    SharingBased,
    HierarchyBased,
    TerritoryBased,
    Custom,
}

pub struct Policy {
    pub name: String,
    pub kind: PolicyKind,
    pub applicable: fn(&SecurityContext) -> bool,
    pub build: fn(&SecurityContext) -> Condition,
}

/// Policies keyed by `(object_name | "*", name)`, matching spec.md §4.2 step 3.
pub struct PolicyRegistry {
    policies: HashMap<(String, String), Policy>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut reg = Self { policies: HashMap::new() };
        reg.register("*", owner_based_policy());
        reg.register("*", sharing_based_policy());
        reg.register("*", hierarchy_based_policy());
        reg.register("*", territory_based_policy());
        reg
    }
}

impl PolicyRegistry {
    pub fn new_empty() -> Self {
        Self { policies: HashMap::new() }
    }

    pub fn register(&mut self, object_name: &str, policy: Policy) {
        self.policies.insert((object_name.to_string(), policy.name.clone()), policy);
    }

    /// Policies applicable to `object_name`, in a stable order (sorted by
    /// name) so OR-composition in [`RlsEnforcer::apply`] — and therefore the
    /// resulting `plan_id` — doesn't depend on `HashMap` iteration order.
    fn for_object(&self, object_name: &str) -> Vec<&Policy> {
        let mut specific: Vec<&Policy> = self
            .policies
            .iter()
            .filter(|((obj, _), _)| obj == object_name)
            .map(|(_, p)| p)
            .collect();
        if !specific.is_empty() {
            specific.sort_by(|a, b| a.name.cmp(&b.name));
            return specific;
        }
        let mut wildcard: Vec<&Policy> = self
            .policies
            .iter()
            .filter(|((obj, _), _)| obj == "*")
            .map(|(_, p)| p)
            .collect();
        wildcard.sort_by(|a, b| a.name.cmp(&b.name));
        wildcard
    }
}

fn owner_based_policy() -> Policy {
    Policy {
        name: "OwnerBased".into(),
        kind: PolicyKind::OwnerBased,
        applicable: |_ctx| true,
        build: |ctx| Condition::eq("owner_id", Value::Str(ctx.user_id.clone())),
    }
}

fn sharing_based_policy() -> Policy {
    Policy {
        name: "SharingBased".into(),
        kind: PolicyKind::SharingBased,
        applicable: |_ctx| true,
        build: |ctx| {
            let owner = Condition::eq("owner_id", Value::Str(ctx.user_id.clone()));
            let shared = Condition::Leaf {
                field: FieldName::new("id"),
                op: CompareOp::In,
                operand: Operand::Subquery(Box::new(share_subquery(ctx))),
            };
            owner.or(shared)
        },
    }
}

fn share_subquery(ctx: &SecurityContext) -> Query {
    use crate::query::Field;
    let mut q = Query::new("Share", vec![Field::plain("record_id")]);
    q.where_clause = Some(Condition::eq("user_or_group_id", Value::Str(ctx.user_id.clone())));
    q
}

fn hierarchy_based_policy() -> Policy {
    Policy {
        name: "HierarchyBased".into(),
        kind: PolicyKind::HierarchyBased,
        applicable: |_ctx| true,
        build: |ctx| Condition::Leaf {
            field: FieldName::new("owner_id"),
            op: CompareOp::In,
            operand: Operand::Subquery(Box::new(hierarchy_subquery(ctx))),
        },
    }
}

fn hierarchy_subquery(ctx: &SecurityContext) -> Query {
    use crate::query::Field;
    let mut q = Query::new("UserRoleHierarchy", vec![Field::plain("subordinate_user_id")]);
    q.where_clause = Some(Condition::eq("supervisor_user_id", Value::Str(ctx.user_id.clone())));
    q
}

fn territory_based_policy() -> Policy {
    Policy {
        name: "TerritoryBased".into(),
        kind: PolicyKind::TerritoryBased,
        applicable: |ctx| !ctx.territory_ids.is_empty(),
        build: |ctx| Condition::Leaf {
            field: FieldName::new("territory_id"),
            op: CompareOp::In,
            operand: Operand::List(ctx.territory_ids.iter().cloned().map(Value::Str).collect()),
        },
    }
}

pub struct RlsEnforcer {
    pub registry: PolicyRegistry,
}

impl Default for RlsEnforcer {
    fn default() -> Self {
        Self { registry: PolicyRegistry::default() }
    }
}

impl RlsEnforcer {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self { registry }
    }

    /// Rewrites `query` to add an access-control predicate, per spec.md
    /// §4.2. Returns the input unchanged for admins or objects without RLS.
    pub fn apply(&self, query: Query, ctx: &SecurityContext, metadata: &dyn MetadataProvider) -> Query {
        if ctx.is_system_administrator() {
            log::debug!("RLS bypassed for user {} (SystemAdministrator)", ctx.user_id);
            return query;
        }

        let has_rls = metadata
            .get(&query.from_object)
            .map(|m| m.has_rls)
            .unwrap_or(false);
        if !has_rls {
            return query;
        }

        let applicable: Vec<&Policy> = self
            .registry
            .for_object(&query.from_object.0)
            .into_iter()
            .filter(|p| (p.applicable)(ctx))
            .collect();

        if applicable.is_empty() {
            log::debug!(
                "no applicable RLS policy for object {} and user {}; no rows will be visible",
                query.from_object,
                ctx.user_id
            );
            return with_rls_predicate(query, always_false());
        }

        let mut combined: Option<Condition> = None;
        for policy in applicable {
            log::debug!("applying RLS policy {} to object {}", policy.name, query.from_object);
            let predicate = (policy.build)(ctx);
            combined = Some(match combined {
                Some(existing) => existing.or(predicate),
                None => predicate,
            });
        }

        with_rls_predicate(query, combined.expect("checked non-empty above"))
    }

    /// Evaluates each applicable policy's predicate against an in-memory
    /// record (spec.md §4.2 "Record-level validation"). Used for DML-style
    /// checks by callers outside the query pipeline.
    pub fn validate(
        &self,
        object_name: &ObjName,
        record: &indexmap::IndexMap<String, Value>,
        ctx: &SecurityContext,
    ) -> bool {
        if ctx.is_system_administrator() {
            return true;
        }
        self.registry
            .for_object(&object_name.0)
            .into_iter()
            .filter(|p| (p.applicable)(ctx))
            .any(|p| eval_condition(&(p.build)(ctx), record))
    }
}

fn always_false() -> Condition {
    Condition::Leaf {
        field: FieldName::new("1"),
        op: CompareOp::Eq,
        operand: Operand::Scalar(Value::Int(0)),
    }
}

fn with_rls_predicate(mut query: Query, predicate: Condition) -> Query {
    query.where_clause = Some(match query.where_clause {
        Some(existing) => existing.and(predicate),
        None => predicate,
    });
    query
}

/// In-memory predicate evaluation for [`RlsEnforcer::validate`]. Does not
/// support subquery operands (those require a live connection); a record
/// that hits one is treated as not satisfying that leaf.
fn eval_condition(cond: &Condition, record: &indexmap::IndexMap<String, Value>) -> bool {
    match cond {
        Condition::Logical { op, left, right } => {
            let l = eval_condition(left, record);
            let r = eval_condition(right, record);
            match op {
                LogicalOp::And => l && r,
                LogicalOp::Or => l || r,
            }
        }
        Condition::Leaf { field, op, operand } => {
            let actual = record.get(field.leaf());
            match (op, operand) {
                (CompareOp::Eq, Operand::Scalar(v)) => actual == Some(v),
                (CompareOp::Ne, Operand::Scalar(v)) => actual != Some(v),
                (CompareOp::In, Operand::List(values)) => {
                    actual.map(|a| values.contains(a)).unwrap_or(false)
                }
                (CompareOp::In, Operand::Subquery(_)) => false,
                (CompareOp::IsNull, Operand::None) => actual.map(Value::is_null).unwrap_or(true),
                (CompareOp::IsNotNull, Operand::None) => !actual.map(Value::is_null).unwrap_or(true),
                _ => false,
            }
        }
    }
}
