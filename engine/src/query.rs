//! The query tree: lingua franca between parser, RLS enforcer, optimizer,
//! and SQL generator. Shaped after the teacher's `chiselc::query` IR
//! (`Expr`/`BinaryExpr`/`Operator`), generalized from a TypeScript-AST-backed
//! filter expression to the recursive `Condition` tree spec.md §3 requires,
//! and kept immutable after RLS enforcement per spec.md §3 "Lifecycles".

use serde::{Deserialize, Serialize};

use crate::metadata::{FieldName, ObjName};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFn,
    pub arg: Option<FieldName>,
}

/// A single item of a `SELECT` list. The three cases are mutually
/// exclusive, matching spec.md §3's `Field` invariant; it is enforced as a
/// tagged enum rather than a struct with optional fields so invalid
/// combinations are unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Field {
    Plain {
        name: FieldName,
        alias: Option<String>,
    },
    Aggregate {
        aggregate: Aggregate,
        alias: Option<String>,
    },
    Subquery {
        query: Box<Query>,
        alias: Option<String>,
    },
}

impl Field {
    pub fn plain(name: impl Into<FieldName>) -> Self {
        Field::Plain { name: name.into(), alias: None }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Field::Plain { alias, .. } => alias.as_deref(),
            Field::Aggregate { alias, .. } => alias.as_deref(),
            Field::Subquery { alias, .. } => alias.as_deref(),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Field::Aggregate { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// Right-hand side of a leaf predicate: a scalar, a list (for `IN`/`NOT
/// IN`), or a subquery (for `IN (SELECT ...)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operand {
    Scalar(Value),
    List(Vec<Value>),
    Subquery(Box<Query>),
    /// No operand, for `IS [NOT] NULL`.
    None,
}

/// The `where`/`having` expression tree: a leaf predicate or an internal
/// `AND`/`OR` node. Tagged variants, not inheritance, per spec.md §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    Leaf {
        field: FieldName,
        op: CompareOp,
        operand: Operand,
    },
    Logical {
        op: LogicalOp,
        left: Box<Condition>,
        right: Box<Condition>,
    },
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::Logical { op: LogicalOp::And, left: Box::new(self), right: Box::new(other) }
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Logical { op: LogicalOp::Or, left: Box::new(self), right: Box::new(other) }
    }

    pub fn eq(field: impl Into<FieldName>, value: Value) -> Condition {
        Condition::Leaf { field: field.into(), op: CompareOp::Eq, operand: Operand::Scalar(value) }
    }

    /// Collects every field referenced anywhere in this tree, grounded on
    /// the teacher's `chiselc::query::Filter::properties`.
    pub fn referenced_fields(&self) -> Vec<&FieldName> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldName>) {
        match self {
            Condition::Leaf { field, .. } => out.push(field),
            Condition::Logical { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub field: FieldName,
    pub direction: SortDirection,
    pub nulls: NullsOrder,
}

impl Default for Order {
    fn default() -> Self {
        Self { field: FieldName::new(""), direction: SortDirection::Asc, nulls: NullsOrder::Last }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

/// A relationship traversal, derived by the parser from dotted field
/// references (spec.md §3). Deduplicated by `relationship_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub relationship_name: String,
    pub target_object: ObjName,
    pub foreign_key: String,
    pub primary_key: String,
    pub join_type: JoinType,
    pub estimated_row_count: u64,
    pub selectivity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub from_object: ObjName,
    pub fields: Vec<Field>,
    pub where_clause: Option<Condition>,
    pub order_by: Option<Vec<Order>>,
    pub group_by: Option<Vec<FieldName>>,
    pub having: Option<Condition>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub joins: Vec<Join>,
}

impl Query {
    pub fn new(from_object: impl Into<ObjName>, fields: Vec<Field>) -> Self {
        Self {
            from_object: from_object.into(),
            fields,
            where_clause: None,
            order_by: None,
            group_by: None,
            having: None,
            limit: None,
            offset: None,
            joins: Vec::new(),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.fields.iter().any(Field::is_aggregate)
    }

    /// Checks the structural invariants spec.md §3 requires of a `Query`.
    /// Not exhaustive type-checking (that needs metadata); this only
    /// enforces shape invariants the tree itself can answer.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("query must select at least one field".into());
        }
        if self.having.is_some() {
            let group_by_present = self.group_by.as_ref().is_some_and(|g| !g.is_empty());
            if !group_by_present && !self.is_aggregate() {
                return Err("HAVING requires a non-empty GROUP BY or an aggregate field".into());
            }
        }
        Ok(())
    }

    /// Adds a join, deduplicating by relationship name (spec.md §3: "an
    /// implementer must deduplicate by `relationship_name`").
    pub fn add_join(&mut self, join: Join) {
        if !self.joins.iter().any(|j| j.relationship_name == join.relationship_name) {
            self.joins.push(join);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn having_without_group_by_or_aggregate_is_invalid() {
        let mut q = Query::new("Account", vec![Field::plain("Id")]);
        q.having = Some(Condition::eq("x", Value::Int(1)));
        assert!(q.validate_shape().is_err());
    }

    #[test]
    fn having_with_group_by_is_valid() {
        let mut q = Query::new("Opportunity", vec![Field::plain("StageName")]);
        q.group_by = Some(vec![FieldName::new("StageName")]);
        q.having = Some(Condition::eq("StageName", Value::Str("Won".into())));
        assert!(q.validate_shape().is_ok());
    }

    #[test]
    fn join_deduplicates_by_relationship_name() {
        let mut q = Query::new("Contact", vec![Field::plain("Id")]);
        let j = Join {
            relationship_name: "Account".into(),
            target_object: "Account".into(),
            foreign_key: "account_id".into(),
            primary_key: "id".into(),
            join_type: JoinType::Left,
            estimated_row_count: 0,
            selectivity: 1.0,
        };
        q.add_join(j.clone());
        q.add_join(j);
        assert_eq!(q.joins.len(), 1);
    }
}
