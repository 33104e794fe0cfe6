// src/query.rs
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;

use crate::document::{type_name, Document};
use crate::error::{EngineError, Result};

/// Per-field operators
#[derive(Debug, Clone)]
pub enum FieldOperator {
    Eq(Value),           // $eq
    Ne(Value),           // $ne
    Gt(Value),           // $gt
    Gte(Value),          // $gte
    Lt(Value),           // $lt
    Lte(Value),          // $lte
    In(Vec<Value>),      // $in
    Nin(Vec<Value>),     // $nin
    Exists(bool),        // $exists
    Type(String),        // $type
    Regex(Regex),        // $regex (+ $options)
    Not(Vec<FieldOperator>), // $not
}

/// Top-level condition
#[derive(Debug, Clone)]
pub enum Condition {
    Field { path: String, operators: Vec<FieldOperator> },
    And(Vec<Query>),
    Or(Vec<Query>),
    Nor(Vec<Query>),
}

/// Filter document, e.g. `{"age": {"$gte": 18}, "$or": [...]}`
#[derive(Debug, Clone, Default)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    pub fn new() -> Self {
        Query { conditions: Vec::new() }
    }

    /// The empty filter matches everything.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        match json {
            Value::Null => Ok(Query::new()),
            Value::Object(map) => {
                let mut conditions = Vec::with_capacity(map.len());
                for (field, condition) in map {
                    if field.starts_with('$') {
                        conditions.push(Self::parse_logical(field, condition)?);
                    } else {
                        conditions.push(Condition::Field {
                            path: field.clone(),
                            operators: Self::parse_field_operators(condition)?,
                        });
                    }
                }
                Ok(Query { conditions })
            }
            other => Err(EngineError::InvalidQuery(format!(
                "filter must be a document, found {}",
                type_name(other)
            ))),
        }
    }

    fn parse_logical(op: &str, value: &Value) -> Result<Condition> {
        let Value::Array(items) = value else {
            return Err(EngineError::InvalidQuery(format!("{} requires array", op)));
        };
        let queries = items.iter().map(Query::from_json).collect::<Result<Vec<_>>>()?;
        match op {
            "$and" => Ok(Condition::And(queries)),
            "$or" => Ok(Condition::Or(queries)),
            "$nor" => Ok(Condition::Nor(queries)),
            _ => Err(EngineError::InvalidQuery(format!("Unknown logical operator: {}", op))),
        }
    }

    fn parse_field_operators(value: &Value) -> Result<Vec<FieldOperator>> {
        let map = match value {
            Value::Object(map) if map.keys().next().map_or(false, |k| k.starts_with('$')) => map,
            // Plain value or embedded document: equality
            _ => return Ok(vec![FieldOperator::Eq(value.clone())]),
        };

        let mut operators = Vec::with_capacity(map.len());
        for (op, val) in map {
            let parsed = match op.as_str() {
                "$eq" => FieldOperator::Eq(val.clone()),
                "$ne" => FieldOperator::Ne(val.clone()),
                "$gt" => FieldOperator::Gt(val.clone()),
                "$gte" => FieldOperator::Gte(val.clone()),
                "$lt" => FieldOperator::Lt(val.clone()),
                "$lte" => FieldOperator::Lte(val.clone()),
                "$in" => FieldOperator::In(Self::require_array(op, val)?),
                "$nin" => FieldOperator::Nin(Self::require_array(op, val)?),
                "$exists" => match val {
                    Value::Bool(b) => FieldOperator::Exists(*b),
                    Value::Number(n) => FieldOperator::Exists(n.as_f64() != Some(0.0)),
                    _ => return Err(EngineError::InvalidQuery("$exists requires bool".into())),
                },
                "$type" => match val {
                    Value::String(s) => FieldOperator::Type(s.clone()),
                    _ => return Err(EngineError::InvalidQuery("$type requires string".into())),
                },
                "$regex" => match val {
                    Value::String(s) => FieldOperator::Regex(compile_regex(s, map.get("$options"))?),
                    _ => return Err(EngineError::InvalidQuery("$regex requires string".into())),
                },
                "$options" if map.contains_key("$regex") => continue,
                "$options" => return Err(EngineError::InvalidQuery("$options requires $regex".into())),
                "$not" => FieldOperator::Not(Self::parse_field_operators(val)?),
                _ => return Err(EngineError::InvalidQuery(format!("Unknown operator: {}", op))),
            };
            operators.push(parsed);
        }
        Ok(operators)
    }

    fn require_array(op: &str, value: &Value) -> Result<Vec<Value>> {
        value
            .as_array()
            .cloned()
            .ok_or_else(|| EngineError::InvalidQuery(format!("{} requires array", op)))
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Field { path, operators } => {
                let value = document.get(path);
                operators.iter().all(|op| Self::matches_operator(value, op))
            }
            Condition::And(queries) => queries.iter().all(|q| q.matches(document)),
            Condition::Or(queries) => queries.iter().any(|q| q.matches(document)),
            Condition::Nor(queries) => !queries.iter().any(|q| q.matches(document)),
        })
    }

    fn matches_operator(value: Option<&Value>, operator: &FieldOperator) -> bool {
        match operator {
            FieldOperator::Eq(target) => value.map_or(target.is_null(), |v| equals_or_contains(v, target)),
            FieldOperator::Ne(target) => !Self::matches_operator(value, &FieldOperator::Eq(target.clone())),
            FieldOperator::Gt(target) => Self::compares(value, target, |o| o == Ordering::Greater),
            FieldOperator::Gte(target) => Self::compares(value, target, |o| o != Ordering::Less),
            FieldOperator::Lt(target) => Self::compares(value, target, |o| o == Ordering::Less),
            FieldOperator::Lte(target) => Self::compares(value, target, |o| o != Ordering::Greater),
            FieldOperator::In(targets) => targets
                .iter()
                .any(|t| Self::matches_operator(value, &FieldOperator::Eq(t.clone()))),
            FieldOperator::Nin(targets) => !targets
                .iter()
                .any(|t| Self::matches_operator(value, &FieldOperator::Eq(t.clone()))),
            FieldOperator::Exists(should_exist) => value.is_some() == *should_exist,
            FieldOperator::Type(name) => value.map_or(false, |v| type_matches(v, name)),
            FieldOperator::Regex(pattern) => value
                .and_then(Value::as_str)
                .map_or(false, |s| pattern.is_match(s)),
            FieldOperator::Not(inner) => !inner.iter().all(|op| Self::matches_operator(value, op)),
        }
    }

    fn compares(value: Option<&Value>, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
        match value {
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| compare_values(item, target).map_or(false, &accept)),
            Some(v) => compare_values(v, target).map_or(false, accept),
            None => false,
        }
    }
}

/// Compile a `$regex` once at parse time. `$options` takes the flags
/// `i`, `m`, `s` and `x`.
fn compile_regex(source: &str, options: Option<&Value>) -> Result<Regex> {
    let flags = match options {
        None => "",
        Some(Value::String(flags)) => flags.as_str(),
        Some(_) => return Err(EngineError::InvalidQuery("$options requires string".into())),
    };

    let mut builder = RegexBuilder::new(source);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => return Err(EngineError::InvalidQuery(format!("invalid $options flag '{}'", flag))),
        };
    }

    builder
        .build()
        .map_err(|e| EngineError::InvalidQuery(format!("invalid $regex '{}': {}", source, e)))
}

/// Equality with numeric normalization; array fields match any element.
fn equals_or_contains(value: &Value, target: &Value) -> bool {
    if values_equal(value, target) {
        return true;
    }
    match value {
        Value::Array(items) if !target.is_array() => items.iter().any(|item| values_equal(item, target)),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => n1.as_f64() == n2.as_f64(),
        _ => a == b,
    }
}

/// Ordering between comparable values of the same kind.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => n1.as_f64()?.partial_cmp(&n2.as_f64()?),
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_matches(value: &Value, name: &str) -> bool {
    match name {
        "number" => value.is_number(),
        "int" | "long" => value.is_i64() || value.is_u64(),
        "object" => value.is_object(),
        _ => type_name(value) == name,
    }
}
