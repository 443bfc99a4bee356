//! Dialect-specific SQL generation from an optimized [`Plan`] (spec.md §4.4).
//!
//! Built on [`sql_writer::SqlWriter`], itself grounded on the teacher's
//! `datastore::sql_writer`. Recursive descent over the query tree mirrors
//! the teacher's `datastore::query::build` walking a `QueryExpr` tree into
//! a single accumulated SQL string plus a parallel parameter list.

use crate::error::{EngineError, Result};
use crate::metadata::{FieldName, MetadataProvider, ObjName};
use crate::optimizer::Plan;
use crate::query::{Aggregate, AggregateFn, CompareOp, Condition, Field, Join, JoinType, LogicalOp, NullsOrder, Operand, Order, Query, SortDirection};
use crate::sql_writer::{Dialect, SqlWriter};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct GeneratedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

/// `generate(plan, dialect) -> {sql, params}` (spec.md §4.4 contract).
pub fn generate(plan: &Plan, dialect: Dialect, metadata: &dyn MetadataProvider) -> Result<GeneratedSql> {
    let mut writer = SqlWriter::new(dialect);
    let mut params = Vec::new();
    emit_query(&plan.query, &plan.join_order, dialect, metadata, &mut writer, &mut params)?;
    Ok(GeneratedSql { sql: writer.build(), params })
}

fn emit_query(
    query: &Query,
    join_order: &[Join],
    dialect: Dialect,
    metadata: &dyn MetadataProvider,
    writer: &mut SqlWriter,
    params: &mut Vec<Value>,
) -> Result<()> {
    writer.write_str("SELECT ");
    for (i, field) in query.fields.iter().enumerate() {
        if i > 0 {
            writer.write_str(", ");
        }
        emit_select_field(field, &query.from_object, join_order, dialect, metadata, writer, params)?;
    }

    writer.write_str(" FROM ");
    let from_table = metadata.get(&query.from_object)?.table_name.clone();
    writer.write_ident(&from_table);
    writer.write_str(" t0");

    for (i, join) in join_order.iter().enumerate() {
        let alias = i + 1;
        let kind = match join.join_type {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        };
        let target_table = metadata.get(&join.target_object)?.table_name.clone();
        writer.write_str(" ");
        writer.write_str(kind);
        writer.write_str(" ");
        writer.write_ident(&target_table);
        writer.write_str(&format!(" t{alias} ON t0."));
        writer.write_ident(&join.foreign_key);
        writer.write_str(&format!(" = t{alias}."));
        writer.write_ident(&join.primary_key);
    }

    if let Some(cond) = &query.where_clause {
        writer.write_str(" WHERE ");
        emit_condition(cond, &query.from_object, join_order, dialect, metadata, writer, params)?;
    }

    if let Some(group_by) = &query.group_by {
        if !group_by.is_empty() {
            writer.write_str(" GROUP BY ");
            for (i, field) in group_by.iter().enumerate() {
                if i > 0 {
                    writer.write_str(", ");
                }
                emit_field_ref(field, &query.from_object, join_order, metadata, writer)?;
            }
        }
    }

    if let Some(cond) = &query.having {
        writer.write_str(" HAVING ");
        emit_condition(cond, &query.from_object, join_order, dialect, metadata, writer, params)?;
    }

    let has_order = query.order_by.as_ref().is_some_and(|o| !o.is_empty());
    if has_order {
        writer.write_str(" ORDER BY ");
        let orders = query.order_by.as_ref().unwrap();
        for (i, order) in orders.iter().enumerate() {
            if i > 0 {
                writer.write_str(", ");
            }
            emit_order_item(order, &query.from_object, join_order, dialect, metadata, writer)?;
        }
    } else if dialect == Dialect::Mssql && (query.limit.is_some() || query.offset.is_some()) {
        // MSSQL's OFFSET/FETCH requires an ORDER BY; synthesize a no-op one
        // for queries paging without an explicit sort.
        writer.write_str(" ORDER BY (SELECT NULL)");
    }

    emit_limit_offset(query, dialect, writer);

    Ok(())
}

fn emit_select_field(
    field: &Field,
    from_object: &ObjName,
    join_order: &[Join],
    dialect: Dialect,
    metadata: &dyn MetadataProvider,
    writer: &mut SqlWriter,
    params: &mut Vec<Value>,
) -> Result<()> {
    match field {
        Field::Plain { name, alias } => {
            emit_field_ref(name, from_object, join_order, metadata, writer)?;
            if let Some(a) = alias {
                writer.write_str(" AS ");
                writer.write_ident(a);
            }
        }
        Field::Aggregate { aggregate, alias } => {
            emit_aggregate(aggregate, from_object, join_order, metadata, writer)?;
            if let Some(a) = alias {
                writer.write_str(" AS ");
                writer.write_ident(a);
            }
        }
        Field::Subquery { query, alias } => {
            writer.write_str("(");
            emit_query(query, &query.joins, dialect, metadata, writer, params)?;
            writer.write_str(")");
            if let Some(a) = alias {
                writer.write_str(" AS ");
                writer.write_ident(a);
            }
        }
    }
    Ok(())
}

fn emit_aggregate(
    aggregate: &Aggregate,
    from_object: &ObjName,
    join_order: &[Join],
    metadata: &dyn MetadataProvider,
    writer: &mut SqlWriter,
) -> Result<()> {
    let fn_name = match aggregate.function {
        AggregateFn::Count | AggregateFn::CountDistinct => "COUNT",
        AggregateFn::Sum => "SUM",
        AggregateFn::Avg => "AVG",
        AggregateFn::Min => "MIN",
        AggregateFn::Max => "MAX",
    };
    writer.write_str(fn_name);
    writer.write_str("(");
    if aggregate.function == AggregateFn::CountDistinct {
        writer.write_str("DISTINCT ");
    }
    match &aggregate.arg {
        Some(name) => emit_field_ref(name, from_object, join_order, metadata, writer)?,
        None => writer.write_str("*"),
    }
    writer.write_str(")");
    Ok(())
}

/// Resolves `field` to `tN."column"` against `join_order`'s alias numbering
/// (spec.md §4.4: "the base object is always `t0`"). A field name that
/// already looks like an expression (contains `(`, e.g. the literal
/// `COUNT(Id)` text a `HAVING` leaf carries from the parser) is written
/// through verbatim instead of resolved against metadata.
fn emit_field_ref(
    field: &FieldName,
    from_object: &ObjName,
    join_order: &[Join],
    metadata: &dyn MetadataProvider,
    writer: &mut SqlWriter,
) -> Result<()> {
    if field.0.contains('(') {
        writer.write_str(&field.0);
        return Ok(());
    }
    let alias = alias_for(field, join_order);
    let object = object_for_alias(alias, from_object, join_order);
    let column = resolve_column(metadata, &object, field.leaf())?;
    writer.write_str(&format!("t{alias}."));
    writer.write_ident(&column);
    Ok(())
}

fn alias_for(field: &FieldName, join_order: &[Join]) -> usize {
    match field.relationship_prefix() {
        None => 0,
        Some(prefix) => join_order
            .iter()
            .position(|j| j.relationship_name == prefix)
            .map(|p| p + 1)
            .unwrap_or(0),
    }
}

fn object_for_alias(alias: usize, from_object: &ObjName, join_order: &[Join]) -> ObjName {
    if alias == 0 {
        from_object.clone()
    } else {
        join_order[alias - 1].target_object.clone()
    }
}

fn resolve_column(metadata: &dyn MetadataProvider, object: &ObjName, leaf: &str) -> Result<String> {
    let meta = metadata.get(object)?;
    Ok(meta.field(leaf)?.column_name.clone())
}

fn emit_condition(
    cond: &Condition,
    from_object: &ObjName,
    join_order: &[Join],
    dialect: Dialect,
    metadata: &dyn MetadataProvider,
    writer: &mut SqlWriter,
    params: &mut Vec<Value>,
) -> Result<()> {
    match cond {
        Condition::Logical { op, left, right } => {
            writer.write_str("(");
            emit_condition(left, from_object, join_order, dialect, metadata, writer, params)?;
            writer.write_str(match op {
                LogicalOp::And => " AND ",
                LogicalOp::Or => " OR ",
            });
            emit_condition(right, from_object, join_order, dialect, metadata, writer, params)?;
            writer.write_str(")");
            Ok(())
        }
        Condition::Leaf { field, op, operand } => {
            emit_field_ref(field, from_object, join_order, metadata, writer)?;
            emit_leaf_op(*op, operand, from_object, join_order, dialect, metadata, writer, params)
        }
    }
}

fn emit_leaf_op(
    op: CompareOp,
    operand: &Operand,
    from_object: &ObjName,
    join_order: &[Join],
    dialect: Dialect,
    metadata: &dyn MetadataProvider,
    writer: &mut SqlWriter,
    params: &mut Vec<Value>,
) -> Result<()> {
    match op {
        CompareOp::IsNull => {
            writer.write_str(" IS NULL");
            return Ok(());
        }
        CompareOp::IsNotNull => {
            writer.write_str(" IS NOT NULL");
            return Ok(());
        }
        _ => {}
    }

    match op {
        CompareOp::Eq | CompareOp::Ne | CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let symbol = match op {
                CompareOp::Eq => "=",
                CompareOp::Ne => "!=",
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
                _ => unreachable!(),
            };
            let value = match operand {
                Operand::Scalar(v) => v.clone(),
                _ => return Err(EngineError::metadata("comparison operator requires a scalar operand")),
            };
            writer.write_str(&format!(" {symbol} "));
            writer.write_param();
            params.push(value);
        }
        CompareOp::Like | CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith => {
            let like_op = if dialect == Dialect::Postgres { "ILIKE" } else { "LIKE" };
            let base = match operand {
                Operand::Scalar(Value::Str(s)) => s.clone(),
                Operand::Scalar(other) => other.to_string(),
                _ => return Err(EngineError::metadata("LIKE operator requires a scalar operand")),
            };
            let pattern = match op {
                CompareOp::Contains => format!("%{base}%"),
                CompareOp::StartsWith => format!("{base}%"),
                CompareOp::EndsWith => format!("%{base}"),
                _ => base,
            };
            writer.write_str(&format!(" {like_op} "));
            writer.write_param();
            params.push(Value::Str(pattern));
        }
        CompareOp::In | CompareOp::NotIn => {
            let keyword = if op == CompareOp::In { " IN (" } else { " NOT IN (" };
            writer.write_str(keyword);
            match operand {
                Operand::List(values) => {
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            writer.write_str(", ");
                        }
                        writer.write_param();
                        params.push(v.clone());
                    }
                }
                Operand::Subquery(sub) => {
                    emit_query(sub, &sub.joins, dialect, metadata, writer, params)?;
                }
                _ => return Err(EngineError::metadata("IN operator requires a list or subquery operand")),
            }
            writer.write_str(")");
        }
        CompareOp::IsNull | CompareOp::IsNotNull => unreachable!("handled above"),
    }

    let _ = from_object;
    Ok(())
}

fn emit_order_item(
    order: &Order,
    from_object: &ObjName,
    join_order: &[Join],
    dialect: Dialect,
    metadata: &dyn MetadataProvider,
    writer: &mut SqlWriter,
) -> Result<()> {
    let dir = match order.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    match dialect {
        Dialect::Postgres | Dialect::Mock => {
            emit_field_ref(&order.field, from_object, join_order, metadata, writer)?;
            let nulls = match order.nulls {
                NullsOrder::First => "FIRST",
                NullsOrder::Last => "LAST",
            };
            writer.write_str(&format!(" {dir} NULLS {nulls}"));
        }
        Dialect::Mssql => {
            let (null_rank, other_rank) = match order.nulls {
                NullsOrder::First => (0, 1),
                NullsOrder::Last => (1, 0),
            };
            writer.write_str("CASE WHEN ");
            emit_field_ref(&order.field, from_object, join_order, metadata, writer)?;
            writer.write_str(&format!(" IS NULL THEN {null_rank} ELSE {other_rank} END, "));
            emit_field_ref(&order.field, from_object, join_order, metadata, writer)?;
            writer.write_str(&format!(" {dir}"));
        }
    }
    Ok(())
}

fn emit_limit_offset(query: &Query, dialect: Dialect, writer: &mut SqlWriter) {
    match dialect {
        Dialect::Postgres | Dialect::Mock => {
            if let Some(limit) = query.limit {
                writer.write_str(&format!(" LIMIT {limit}"));
            }
            if let Some(offset) = query.offset {
                writer.write_str(&format!(" OFFSET {offset}"));
            }
        }
        Dialect::Mssql => match (query.limit, query.offset) {
            (None, None) => {}
            (Some(limit), None) => {
                writer.write_str(&format!(" OFFSET 0 ROWS FETCH NEXT {limit} ROWS ONLY"));
            }
            (None, Some(offset)) => {
                writer.write_str(&format!(" OFFSET {offset} ROWS"));
            }
            (Some(limit), Some(offset)) => {
                writer.write_str(&format!(" OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY"));
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DataType, FieldMetadata, InMemoryMetadata, ObjectMetadata};
    use crate::optimizer::optimize;
    use std::collections::HashMap;

    fn account_metadata() -> InMemoryMetadata {
        let mut meta = InMemoryMetadata::new();
        let mut fields = HashMap::new();
        fields.insert(
            "Id".to_string(),
            FieldMetadata { field_name: "Id".into(), column_name: "id".into(), data_type: DataType::Id, nullable: false, indexed: true, selectivity: 0.01 },
        );
        fields.insert(
            "Name".to_string(),
            FieldMetadata { field_name: "Name".into(), column_name: "name".into(), data_type: DataType::String, nullable: true, indexed: true, selectivity: 0.2 },
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
    fn generates_simple_select_where_on_postgres() {
        let query = crate::parser::parse("SELECT Id, Name FROM Account WHERE Name = 'Acme'").unwrap();
        let meta = account_metadata();
        let plan = optimize(query, &meta, &meta, 4).unwrap();
        let generated = generate(&plan, Dialect::Postgres, &meta).unwrap();
        let sql = generated.sql.replace(' ', "");
        assert!(sql.contains(r#"SELECTt0."id",t0."name""#));
        assert!(sql.contains(r#"FROM"accounts"t0"#));
        assert!(sql.contains(r#"WHEREt0."name"=$1"#));
        assert_eq!(generated.params, vec![Value::Str("Acme".into())]);
    }

    #[test]
    fn mssql_paging_without_order_synthesizes_clause() {
        let query = crate::parser::parse("SELECT Id FROM Account LIMIT 10").unwrap();
        let meta = account_metadata();
        let plan = optimize(query, &meta, &meta, 4).unwrap();
        let generated = generate(&plan, Dialect::Mssql, &meta).unwrap();
        assert!(generated.sql.contains("OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"));
        assert!(generated.sql.contains("ORDER BY"));
    }

    #[test]
    fn postgres_like_uses_ilike() {
        let query = crate::parser::parse("SELECT Id FROM Account WHERE Name LIKE '%Inc%'").unwrap();
        let meta = account_metadata();
        let plan = optimize(query, &meta, &meta, 4).unwrap();
        let generated = generate(&plan, Dialect::Postgres, &meta).unwrap();
        assert!(generated.sql.contains("ILIKE"));
        assert_eq!(generated.params, vec![Value::Str("%Inc%".into())]);
    }

    #[test]
    fn literals_never_appear_in_generated_sql_text() {
        let query = crate::parser::parse("SELECT Id FROM Account WHERE Name = 'Acme'").unwrap();
        let meta = account_metadata();
        let plan = optimize(query, &meta, &meta, 4).unwrap();
        let generated = generate(&plan, Dialect::Postgres, &meta).unwrap();
        assert!(!generated.sql.contains("Acme"));
    }

    #[test]
    fn in_list_binds_each_value_as_a_parameter() {
        let query = crate::parser::parse("SELECT Id FROM Account WHERE Id IN (1, 2, 3)").unwrap();
        let meta = account_metadata();
        let plan = optimize(query, &meta, &meta, 4).unwrap();
        let generated = generate(&plan, Dialect::Postgres, &meta).unwrap();
        assert_eq!(generated.params.len(), 3);
        assert!(generated.sql.contains("IN ($1, $2, $3)"));
    }

    #[test]
    fn mock_dialect_emits_bare_identifiers() {
        let query = crate::parser::parse("SELECT Id FROM Account").unwrap();
        let meta = account_metadata();
        let plan = optimize(query, &meta, &meta, 4).unwrap();
        let generated = generate(&plan, Dialect::Mock, &meta).unwrap();
        assert!(generated.sql.contains("accounts t0"));
        assert!(!generated.sql.contains('"'));
        assert!(!generated.sql.contains('['));
    }
}
