//! DSQL parser: textual DSQL → [`Query`] tree (spec.md §4.1).
//!
//! A pragmatic, top-level clause extractor rather than a full LALR grammar,
//! in the spirit of the teacher's `cli::parser` module (which extracts
//! TypeScript endpoint fragments token-by-token instead of building a full
//! AST for the whole file). Clauses are located with
//! [`tokenizer::find_top_level_keyword`] so that keywords inside nested
//! subqueries never get mistaken for a top-level clause boundary.

pub mod tokenizer;

use crate::error::ParseError;
use crate::metadata::{FieldName, MetadataProvider, ObjName};
use crate::query::{
    Aggregate, AggregateFn, CompareOp, Condition, Field, Join, JoinType, LogicalOp, NullsOrder,
    Operand, Order, Query, SortDirection,
};
use crate::value::{parse_literal, Value};
use tokenizer::{
    find_leftmost_logical_op, find_top_level_keyword, find_top_level_substr, split_top_level, strip_outer_parens,
};

type PResult<T> = Result<T, ParseError>;

/// Parses DSQL text into a [`Query`] tree. Idempotent and side-effect free:
/// calling this twice on the same string yields structurally equal trees
/// (spec.md §8, "Idempotent parsing").
pub fn parse(text: &str) -> PResult<Query> {
    let text = text.trim();

    let select_idx = find_top_level_keyword(text, "SELECT")
        .ok_or_else(|| ParseError::new("expected a SELECT clause"))?;
    if select_idx != 0 {
        return Err(ParseError::at("SELECT must be the first keyword", select_idx));
    }
    let from_idx = find_top_level_keyword(text, "FROM")
        .ok_or_else(|| ParseError::new("expected a FROM clause"))?;

    let select_list_text = text[select_idx + "SELECT".len()..from_idx].trim();
    if select_list_text.is_empty() {
        return Err(ParseError::new("SELECT list must not be empty"));
    }

    let after_from = from_idx + "FROM".len();
    let trimmed_lead = text[after_from..].len() - text[after_from..].trim_start().len();
    let obj_start = after_from + trimmed_lead;
    let name_len = text[obj_start..]
        .find(|c: char| c.is_whitespace())
        .unwrap_or(text.len() - obj_start);
    let from_object_text = text[obj_start..obj_start + name_len].trim();
    if from_object_text.is_empty() {
        return Err(ParseError::new("expected an object name after FROM"));
    }
    let from_object = ObjName::new(from_object_text);
    let rest_start = obj_start + name_len;
    let rest = &text[rest_start..];

    let where_idx = find_top_level_keyword(rest, "WHERE");
    let group_idx = find_top_level_keyword(rest, "GROUP BY");
    let having_idx = find_top_level_keyword(rest, "HAVING");
    let order_idx = find_top_level_keyword(rest, "ORDER BY");
    let limit_idx = find_top_level_keyword(rest, "LIMIT");
    let offset_idx = find_top_level_keyword(rest, "OFFSET");

    // Each clause runs from its keyword to the start of the next clause
    // that actually appears, in canonical order.
    let boundaries = [
        where_idx,
        group_idx,
        having_idx,
        order_idx,
        limit_idx,
        offset_idx,
        Some(rest.len()),
    ];

    let clause_text = |start_kw: Option<usize>, kw_len: usize| -> Option<String> {
        let start = start_kw?;
        let mut end = rest.len();
        for b in boundaries.iter().flatten() {
            if *b > start && *b < end {
                end = *b;
            }
        }
        Some(rest[start + kw_len..end].trim().to_string())
    };

    let where_text = clause_text(where_idx, "WHERE".len());
    let group_text = clause_text(group_idx, "GROUP BY".len());
    let having_text = clause_text(having_idx, "HAVING".len());
    let order_text = clause_text(order_idx, "ORDER BY".len());
    let limit_text = clause_text(limit_idx, "LIMIT".len());
    let offset_text = clause_text(offset_idx, "OFFSET".len());

    let fields = parse_select_list(select_list_text)?;

    let mut query = Query::new(from_object, fields);
    query.where_clause = where_text.as_deref().map(parse_condition).transpose()?;
    query.group_by = group_text.as_deref().map(parse_group_by);
    query.having = having_text.as_deref().map(parse_condition).transpose()?;
    query.order_by = order_text.as_deref().map(parse_order_by).transpose()?;
    query.limit = limit_text.as_deref().map(parse_uint).transpose()?;
    query.offset = offset_text.as_deref().map(parse_uint).transpose()?;

    query
        .validate_shape()
        .map_err(ParseError::new)?;

    resolve_dotted_joins(&mut query);

    Ok(query)
}

/// Like [`parse`], but also resolves dotted field references into
/// `Join`s against real relationship metadata, per spec.md §4.1
/// "Relationship resolution". Missing relationships are a parse-time
/// *warning*, not a hard error (downstream stages raise `MetadataError`).
pub fn parse_with_metadata(text: &str, metadata: &dyn MetadataProvider) -> PResult<Query> {
    let mut query = parse(text)?;
    if let Ok(obj_meta) = metadata.get(&query.from_object) {
        let mut resolved = Vec::new();
        for join in query.joins.drain(..) {
            match obj_meta.relationship(&join.relationship_name) {
                Some(rel) => resolved.push(Join {
                    relationship_name: rel.name.clone(),
                    target_object: rel.target_object.clone(),
                    foreign_key: rel.foreign_key.clone(),
                    primary_key: rel.referenced_key.clone(),
                    join_type: JoinType::Left,
                    estimated_row_count: 0,
                    selectivity: 1.0,
                }),
                None => {
                    log::warn!(
                        "query references unknown relationship {:?} on object {}; leaving unresolved",
                        join.relationship_name,
                        query.from_object
                    );
                }
            }
        }
        query.joins = resolved;
    }
    Ok(query)
}

fn parse_uint(text: &str) -> PResult<u64> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| ParseError::new(format!("expected an integer, got {text:?}")))
}

/// Parses the comma-separated `SELECT` list per spec.md §4.1.
fn parse_select_list(text: &str) -> PResult<Vec<Field>> {
    let items = split_top_level(text, ',');
    let mut fields = Vec::with_capacity(items.len());
    for item in items {
        fields.push(parse_select_item(&item)?);
    }
    Ok(fields)
}

fn parse_select_item(item: &str) -> PResult<Field> {
    let item = item.trim();

    if item.starts_with('(') {
        let inner = strip_outer_parens(item);
        if find_top_level_keyword(inner, "SELECT") == Some(0) {
            let (subquery, alias) = split_trailing_alias_after_subquery(inner)?;
            let query = parse(subquery)?;
            return Ok(Field::Subquery { query: Box::new(query), alias });
        }
    }

    if let Some(agg) = try_parse_aggregate(item)? {
        return Ok(agg);
    }

    parse_plain_field(item)
}

const AGGREGATE_FNS: [(&str, AggregateFn); 5] = [
    ("COUNT", AggregateFn::Count),
    ("SUM", AggregateFn::Sum),
    ("AVG", AggregateFn::Avg),
    ("MIN", AggregateFn::Min),
    ("MAX", AggregateFn::Max),
];

fn try_parse_aggregate(item: &str) -> PResult<Option<Field>> {
    for (name, func) in AGGREGATE_FNS {
        let upper = item.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix(name) {
            let rest = rest.trim_start();
            if !rest.starts_with('(') {
                continue;
            }
            // re-slice the *original* (not uppercased) text at the matching offset
            let open = item[name.len()..].find('(').unwrap() + name.len();
            let close = find_matching_close_paren(item, open)
                .ok_or_else(|| ParseError::new(format!("unbalanced parentheses in {item:?}")))?;
            let arg_and_alias = item[close + 1..].trim();
            let alias = parse_trailing_alias(arg_and_alias);
            let inner = item[open + 1..close].trim();

            let (func, arg) = if func == AggregateFn::Count
                && inner.to_ascii_uppercase().starts_with("DISTINCT")
            {
                let arg_text = inner["DISTINCT".len()..].trim();
                (AggregateFn::CountDistinct, non_star_field(arg_text))
            } else {
                (func, non_star_field(inner))
            };

            return Ok(Some(Field::Aggregate {
                aggregate: Aggregate { function: func, arg },
                alias,
            }));
        }
    }
    Ok(None)
}

fn non_star_field(text: &str) -> Option<FieldName> {
    let text = text.trim();
    if text.is_empty() || text == "*" {
        None
    } else {
        Some(FieldName::new(text))
    }
}

fn find_matching_close_paren(text: &str, open_idx: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open_idx) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses an optional trailing `AS alias` or bare alias token.
fn parse_trailing_alias(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let upper = text.to_ascii_uppercase();
    if let Some(stripped) = upper.strip_prefix("AS ") {
        let alias = text[text.len() - stripped.len()..].trim();
        return Some(alias.to_string());
    }
    Some(text.to_string())
}

fn split_trailing_alias_after_subquery(inner: &str) -> PResult<(&str, Option<String>)> {
    // inner already has outer parens stripped; a subquery field has no
    // trailing alias text beyond the closing paren that was stripped, so
    // this is a no-op hook kept for symmetry with aggregate/plain parsing.
    Ok((inner, None))
}

fn parse_plain_field(item: &str) -> PResult<Field> {
    let item = item.trim();
    if item.is_empty() {
        return Err(ParseError::new("empty field reference in SELECT list"));
    }
    // split off a trailing alias: "Name alias" or "Name AS alias"
    let parts = split_top_level(item, ' ');
    let parts: Vec<&str> = parts.iter().map(String::as_str).filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [name] => Ok(Field::Plain { name: FieldName::new(*name), alias: None }),
        [name, "AS" | "as", alias] => {
            Ok(Field::Plain { name: FieldName::new(*name), alias: Some(alias.to_string()) })
        }
        [name, alias] => Ok(Field::Plain { name: FieldName::new(*name), alias: Some(alias.to_string()) }),
        _ => Err(ParseError::new(format!("could not parse field reference {item:?}"))),
    }
}

/// Parses the `where`/`having` expression recursively (spec.md §4.1).
fn parse_condition(text: &str) -> PResult<Condition> {
    let text = strip_outer_parens(text);
    if text.is_empty() {
        return Err(ParseError::new("empty condition"));
    }

    if let Some((idx, is_and)) = find_leftmost_logical_op(text) {
        let kw_len = if is_and { 3 } else { 2 };
        let left = text[..idx].trim();
        let right = text[idx + kw_len..].trim();
        let left = parse_condition(left)?;
        let right = parse_condition(right)?;
        let op = if is_and { LogicalOp::And } else { LogicalOp::Or };
        return Ok(Condition::Logical { op, left: Box::new(left), right: Box::new(right) });
    }

    parse_predicate(text)
}

fn parse_predicate(text: &str) -> PResult<Condition> {
    let text = text.trim();

    // IS [NOT] NULL
    if let Some(idx) = find_top_level_keyword(text, "IS") {
        let field = text[..idx].trim();
        let tail = text[idx + 2..].trim().to_ascii_uppercase();
        let op = if tail.strip_prefix("NOT").is_some() {
            CompareOp::IsNotNull
        } else {
            CompareOp::IsNull
        };
        return Ok(Condition::Leaf { field: FieldName::new(field), op, operand: Operand::None });
    }

    // [NOT] IN (...)
    if let Some(idx) = find_top_level_keyword(text, "IN") {
        let (field_part, negated) = {
            let before = text[..idx].trim();
            if let Some(stripped) = before.strip_suffix("NOT") {
                (stripped.trim(), true)
            } else if before.to_ascii_uppercase().ends_with("NOT") {
                (before[..before.len() - 3].trim(), true)
            } else {
                (before, false)
            }
        };
        let after = text[idx + 2..].trim();
        if !after.starts_with('(') || !after.ends_with(')') {
            return Err(ParseError::new("expected parenthesized list after IN"));
        }
        let inner = &after[1..after.len() - 1];
        let op = if negated { CompareOp::NotIn } else { CompareOp::In };
        let operand = if find_top_level_keyword(inner.trim(), "SELECT") == Some(0) {
            Operand::Subquery(Box::new(parse(inner.trim())?))
        } else {
            let values = split_top_level(inner, ',')
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(|s| parse_literal(s.trim()))
                .collect();
            Operand::List(values)
        };
        return Ok(Condition::Leaf { field: FieldName::new(field_part), op, operand });
    }

    // LIKE
    if let Some(idx) = find_top_level_keyword(text, "LIKE") {
        let field = text[..idx].trim();
        let value_text = text[idx + 4..].trim();
        let value = parse_literal(value_text);
        let pattern = match &value {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        };
        let starts_pct = pattern.starts_with('%');
        let ends_pct = pattern.ends_with('%') && pattern.len() > 1;
        let op = match (starts_pct, ends_pct) {
            (true, true) => CompareOp::Contains,
            (false, true) => CompareOp::StartsWith,
            (true, false) => CompareOp::EndsWith,
            (false, false) => CompareOp::Like,
        };
        let stripped = pattern.trim_matches('%').to_string();
        return Ok(Condition::Leaf {
            field: FieldName::new(field),
            op,
            operand: Operand::Scalar(Value::Str(stripped)),
        });
    }

    // binary comparison operators, longest-match first so `<=` isn't cut by `<`
    const OPS: [(&str, CompareOp); 7] = [
        ("!=", CompareOp::Ne),
        ("<>", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("=", CompareOp::Eq),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];
    for (token, op) in OPS {
        if let Some(idx) = find_top_level_substr(text, token) {
            let field = text[..idx].trim();
            let value_text = text[idx + token.len()..].trim();
            if field.is_empty() || value_text.is_empty() {
                continue;
            }
            return Ok(Condition::Leaf {
                field: FieldName::new(field),
                op,
                operand: Operand::Scalar(parse_literal(value_text)),
            });
        }
    }

    Err(ParseError::new(format!("could not parse predicate {text:?}")))
}

fn parse_group_by(text: &str) -> Vec<FieldName> {
    split_top_level(text, ',')
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| FieldName::new(s.trim()))
        .collect()
}

fn parse_order_by(text: &str) -> PResult<Vec<Order>> {
    split_top_level(text, ',')
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|item| parse_order_item(item.trim()))
        .collect()
}

fn parse_order_item(item: &str) -> PResult<Order> {
    let tokens: Vec<&str> = item.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ParseError::new("empty ORDER BY item"));
    }
    let field = FieldName::new(tokens[0]);
    let mut direction = SortDirection::Asc;
    let mut nulls = NullsOrder::Last;

    let mut i = 1;
    while i < tokens.len() {
        match tokens[i].to_ascii_uppercase().as_str() {
            "ASC" => direction = SortDirection::Asc,
            "DESC" => direction = SortDirection::Desc,
            "NULLS" => {
                if let Some(next) = tokens.get(i + 1) {
                    match next.to_ascii_uppercase().as_str() {
                        "FIRST" => nulls = NullsOrder::First,
                        "LAST" => nulls = NullsOrder::Last,
                        other => return Err(ParseError::new(format!("expected FIRST/LAST after NULLS, got {other:?}"))),
                    }
                    i += 1;
                }
            }
            other => return Err(ParseError::new(format!("unexpected token {other:?} in ORDER BY"))),
        }
        i += 1;
    }

    Ok(Order { field, direction, nulls })
}

/// Scans `SELECT` fields for dotted references and materializes a [`Join`]
/// placeholder per distinct leading segment (spec.md §4.1). These are
/// unresolved stubs (no real FK/PK yet); [`parse_with_metadata`] fills
/// them in against real relationship metadata.
fn resolve_dotted_joins(query: &mut Query) {
    let mut seen = std::collections::HashSet::new();
    let mut dotted_names: Vec<FieldName> = Vec::new();

    let mut collect = |name: &FieldName| {
        if let Some(prefix) = name.relationship_prefix() {
            if seen.insert(prefix.to_string()) {
                dotted_names.push(name.clone());
            }
        }
    };

    for field in &query.fields {
        if let Field::Plain { name, .. } = field {
            collect(name);
        }
    }
    if let Some(where_clause) = &query.where_clause {
        for f in where_clause.referenced_fields() {
            collect(f);
        }
    }

    for name in dotted_names {
        let prefix = name.relationship_prefix().unwrap().to_string();
        query.joins.push(Join {
            relationship_name: prefix,
            target_object: ObjName::new(""),
            foreign_key: String::new(),
            primary_key: String::new(),
            join_type: JoinType::Left,
            estimated_row_count: 0,
            selectivity: 1.0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CompareOp, Operand};

    #[test]
    fn parses_simple_select_where() {
        let q = parse("SELECT Id, Name FROM Account WHERE Name = 'Acme'").unwrap();
        assert_eq!(q.from_object.0, "Account");
        assert_eq!(q.fields.len(), 2);
        match q.where_clause.unwrap() {
            Condition::Leaf { field, op, operand } => {
                assert_eq!(field.0, "Name");
                assert_eq!(op, CompareOp::Eq);
                assert!(matches!(operand, Operand::Scalar(Value::Str(s)) if s == "Acme"));
            }
            _ => panic!("expected a leaf condition"),
        }
    }

    #[test]
    fn literal_containing_is_and_operator_text_is_not_misparsed() {
        let q = parse("SELECT Id FROM Account WHERE Note = 'A IS B'").unwrap();
        match q.where_clause.unwrap() {
            Condition::Leaf { field, op, operand } => {
                assert_eq!(field.0, "Note");
                assert_eq!(op, CompareOp::Eq);
                assert!(matches!(operand, Operand::Scalar(Value::Str(s)) if s == "A IS B"));
            }
            other => panic!("expected a leaf condition, got {other:?}"),
        }
    }

    #[test]
    fn parses_is_null_and_is_not_null() {
        let q = parse("SELECT Id FROM Account WHERE Industry IS NULL").unwrap();
        match q.where_clause.unwrap() {
            Condition::Leaf { field, op, operand } => {
                assert_eq!(field.0, "Industry");
                assert_eq!(op, CompareOp::IsNull);
                assert!(matches!(operand, Operand::None));
            }
            other => panic!("expected a leaf condition, got {other:?}"),
        }

        let q = parse("SELECT Id FROM Account WHERE Industry IS NOT NULL").unwrap();
        match q.where_clause.unwrap() {
            Condition::Leaf { op, .. } => assert_eq!(op, CompareOp::IsNotNull),
            other => panic!("expected a leaf condition, got {other:?}"),
        }
    }

    #[test]
    fn is_case_insensitive() {
        let q = parse("select Id from Account where Name = 'Acme'").unwrap();
        assert_eq!(q.from_object.0, "Account");
    }

    #[test]
    fn parses_dotted_relationship_reference() {
        let q = parse("SELECT Id, Account.Name FROM Contact").unwrap();
        assert_eq!(q.joins.len(), 1);
        assert_eq!(q.joins[0].relationship_name, "Account");
    }

    #[test]
    fn parses_aggregate_with_group_and_having() {
        let q = parse(
            "SELECT StageName, COUNT(Id) FROM Opportunity GROUP BY StageName HAVING COUNT(Id) > 5",
        )
        .unwrap();
        assert!(q.is_aggregate());
        assert_eq!(q.group_by.as_ref().unwrap(), &[FieldName::new("StageName")]);
        match q.having.unwrap() {
            Condition::Leaf { op, operand, .. } => {
                assert_eq!(op, CompareOp::Gt);
                assert!(matches!(operand, Operand::Scalar(Value::Int(5))));
            }
            _ => panic!("expected a leaf condition"),
        }
    }

    #[test]
    fn parses_count_distinct() {
        let q = parse("SELECT COUNT(DISTINCT Id) FROM Account").unwrap();
        match &q.fields[0] {
            Field::Aggregate { aggregate, .. } => {
                assert_eq!(aggregate.function, AggregateFn::CountDistinct);
                assert_eq!(aggregate.arg.as_ref().unwrap().0, "Id");
            }
            _ => panic!("expected an aggregate field"),
        }
    }

    #[test]
    fn parses_count_star() {
        let q = parse("SELECT COUNT(*) FROM Account").unwrap();
        match &q.fields[0] {
            Field::Aggregate { aggregate, .. } => {
                assert_eq!(aggregate.function, AggregateFn::Count);
                assert!(aggregate.arg.is_none());
            }
            _ => panic!("expected an aggregate field"),
        }
    }

    #[test]
    fn parses_subquery_in_select_list() {
        let q = parse("SELECT Id, (SELECT Id FROM Contact) FROM Account").unwrap();
        match &q.fields[1] {
            Field::Subquery { query, .. } => assert_eq!(query.from_object.0, "Contact"),
            _ => panic!("expected a subquery field"),
        }
    }

    #[test]
    fn parses_in_subquery_condition() {
        let q = parse("SELECT Id FROM Account WHERE Id IN (SELECT AccountId FROM Contact)").unwrap();
        match q.where_clause.unwrap() {
            Condition::Leaf { op, operand, .. } => {
                assert_eq!(op, CompareOp::In);
                assert!(matches!(operand, Operand::Subquery(_)));
            }
            _ => panic!("expected a leaf condition"),
        }
    }

    #[test]
    fn parses_not_in_list() {
        let q = parse("SELECT Id FROM Account WHERE Id NOT IN (1, 2, 3)").unwrap();
        match q.where_clause.unwrap() {
            Condition::Leaf { op, operand, .. } => {
                assert_eq!(op, CompareOp::NotIn);
                assert!(matches!(operand, Operand::List(v) if v.len() == 3));
            }
            _ => panic!("expected a leaf condition"),
        }
    }

    #[test]
    fn classifies_like_patterns() {
        let q = parse("SELECT Id FROM Account WHERE Name LIKE '%Inc%'").unwrap();
        assert!(matches!(
            q.where_clause.unwrap(),
            Condition::Leaf { op: CompareOp::Contains, .. }
        ));

        let q = parse("SELECT Id FROM Account WHERE Name LIKE 'Inc%'").unwrap();
        assert!(matches!(
            q.where_clause.unwrap(),
            Condition::Leaf { op: CompareOp::StartsWith, .. }
        ));

        let q = parse("SELECT Id FROM Account WHERE Name LIKE '%Inc'").unwrap();
        assert!(matches!(
            q.where_clause.unwrap(),
            Condition::Leaf { op: CompareOp::EndsWith, .. }
        ));
    }

    #[test]
    fn left_to_right_precedence_matches_design_note() {
        // "A OR B AND C" parses as "(A) OR (B AND C)" because OR occurs first
        let q = parse("SELECT Id FROM Account WHERE A = 1 OR B = 2 AND C = 3").unwrap();
        match q.where_clause.unwrap() {
            Condition::Logical { op: LogicalOp::Or, right, .. } => {
                assert!(matches!(*right, Condition::Logical { op: LogicalOp::And, .. }));
            }
            other => panic!("expected a top-level OR, got {other:?}"),
        }
    }

    #[test]
    fn parses_order_by_with_nulls_and_direction() {
        let q = parse("SELECT Id FROM Account ORDER BY Name DESC NULLS FIRST, Id").unwrap();
        let orders = q.order_by.unwrap();
        assert_eq!(orders[0].direction, SortDirection::Desc);
        assert_eq!(orders[0].nulls, NullsOrder::First);
        assert_eq!(orders[1].direction, SortDirection::Asc);
        assert_eq!(orders[1].nulls, NullsOrder::Last);
    }

    #[test]
    fn parses_limit_and_offset() {
        let q = parse("SELECT Id FROM Account LIMIT 10 OFFSET 5").unwrap();
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, Some(5));
    }

    #[test]
    fn rejects_missing_from() {
        assert!(parse("SELECT Id").is_err());
    }

    #[test]
    fn is_idempotent() {
        let text = "SELECT Id, Name FROM Account WHERE Name = 'Acme' ORDER BY Name";
        let a = parse(text).unwrap();
        let b = parse(text).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
