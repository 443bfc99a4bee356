//! Runtime values that flow through the query pipeline: literals parsed out
//! of DSQL text, row cells returned by the driver, and parameters bound into
//! generated SQL.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamically typed value. Rows are `map<String, Value>` per the
/// "dynamic result shape" design note: no typed entity is materialized by
/// the core itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(chrono::NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
        }
    }
}

/// A row returned from the driver or held in the result cache.
pub type Row = indexmap::IndexMap<String, Value>;

/// Parses a DSQL literal token (already stripped of surrounding whitespace)
/// into a [`Value`], per spec.md §4.1 "Literal parsing".
pub fn parse_literal(token: &str) -> Value {
    if let Some(inner) = strip_quotes(token, '\'') {
        return Value::Str(inner);
    }
    if let Some(inner) = strip_quotes(token, '"') {
        return Value::Str(inner);
    }
    match token.to_ascii_uppercase().as_str() {
        "NULL" => return Value::Null,
        "TRUE" => return Value::Bool(true),
        "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = token.parse::<f64>() {
        return Value::Float(f);
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Value::Date(d);
    }
    Value::Str(token.to_string())
}

fn strip_quotes(token: &str, quote: char) -> Option<String> {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
        Some(token[1..token.len() - 1].replace(&format!("{quote}{quote}"), &quote.to_string()))
    } else {
        None
    }
}
