// src/aggregation.rs
// Aggregation pipeline over engine documents

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::document::Document;
use crate::error::{EngineError, Result};
use crate::query::{compare_values, Query};

/// Parsed aggregation pipeline
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Query),
    Project(ProjectStage),
    Group(GroupStage),
    Sort(Vec<(String, SortDirection)>),
    Limit(usize),
    Skip(usize),
    Count(String),
}

#[derive(Debug, Clone)]
pub struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
}

#[derive(Debug, Clone)]
pub enum ProjectField {
    Include,                    // 1
    Exclude,                    // 0
    Rename(String),             // "$fieldName"
}

#[derive(Debug, Clone)]
pub struct GroupStage {
    id: GroupId,
    accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub enum GroupId {
    Field(String),              // "$city"
    Constant(Value),            // null or any literal: one group
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Sum(Operand),
    Avg(String),
    Min(String),
    Max(String),
    First(String),
    Last(String),
}

#[derive(Debug, Clone)]
pub enum Operand {
    Constant(f64),              // {"$sum": 1}
    Field(String),              // {"$sum": "$amount"}
}

#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl Pipeline {
    /// Parse a pipeline from its stage documents.
    pub fn from_stages(stages: &[Value]) -> Result<Self> {
        let stages = stages.iter().map(Stage::from_json).collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }

    pub fn from_json(pipeline_json: &Value) -> Result<Self> {
        match pipeline_json {
            Value::Array(stages) => Self::from_stages(stages),
            _ => Err(EngineError::AggregationError("Pipeline must be an array".to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order. Documents keep their input order unless
    /// a stage reorders them.
    pub fn execute(&self, mut docs: Vec<Document>) -> Result<Vec<Document>> {
        for stage in &self.stages {
            docs = stage.execute(docs)?;
        }
        Ok(docs)
    }
}

impl Stage {
    fn from_json(stage_json: &Value) -> Result<Self> {
        let obj = match stage_json {
            Value::Object(obj) if obj.len() == 1 => obj,
            Value::Object(_) => {
                return Err(EngineError::AggregationError(
                    "Each stage must have exactly one operator".to_string(),
                ))
            }
            _ => return Err(EngineError::AggregationError("Stage must be an object".to_string())),
        };

        let Some((stage_name, spec)) = obj.iter().next() else {
            return Err(EngineError::AggregationError("Empty stage".to_string()));
        };

        match stage_name.as_str() {
            "$match" => Ok(Stage::Match(Query::from_json(spec)?)),
            "$project" => Ok(Stage::Project(ProjectStage::from_json(spec)?)),
            "$group" => Ok(Stage::Group(GroupStage::from_json(spec)?)),
            "$sort" => Ok(Stage::Sort(parse_sort(spec)?)),
            "$limit" => Ok(Stage::Limit(parse_count(spec, "$limit")?)),
            "$skip" => Ok(Stage::Skip(parse_count(spec, "$skip")?)),
            "$count" => match spec.as_str() {
                Some(field) if !field.is_empty() && !field.starts_with('$') => Ok(Stage::Count(field.to_string())),
                _ => Err(EngineError::AggregationError(
                    "$count requires a non-empty field name".to_string(),
                )),
            },
            _ => Err(EngineError::AggregationError(format!(
                "Unrecognized pipeline stage name: '{}'",
                stage_name
            ))),
        }
    }

    fn execute(&self, docs: Vec<Document>) -> Result<Vec<Document>> {
        match self {
            Stage::Match(query) => Ok(docs.into_iter().filter(|doc| query.matches(doc)).collect()),
            Stage::Project(stage) => Ok(docs.iter().map(|doc| stage.project(doc)).collect()),
            Stage::Group(stage) => stage.execute(docs),
            Stage::Sort(fields) => Ok(sort_documents(docs, fields)),
            Stage::Limit(limit) => Ok(docs.into_iter().take(*limit).collect()),
            Stage::Skip(skip) => Ok(docs.into_iter().skip(*skip).collect()),
            Stage::Count(field) => {
                if docs.is_empty() {
                    return Ok(Vec::new());
                }
                let mut result = Document::new();
                result.insert(field.clone(), Value::from(docs.len() as u64));
                Ok(vec![result])
            }
        }
    }
}

fn parse_count(spec: &Value, stage: &str) -> Result<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| EngineError::AggregationError(format!("{} must be a non-negative integer", stage)))
}

fn parse_sort(spec: &Value) -> Result<Vec<(String, SortDirection)>> {
    let Value::Object(obj) = spec else {
        return Err(EngineError::AggregationError("$sort must be an object".to_string()));
    };
    if obj.is_empty() {
        return Err(EngineError::AggregationError("$sort stage must have at least one key".to_string()));
    }

    obj.iter()
        .map(|(field, value)| match value.as_i64() {
            Some(1) => Ok((field.clone(), SortDirection::Ascending)),
            Some(-1) => Ok((field.clone(), SortDirection::Descending)),
            _ => Err(EngineError::AggregationError("Sort direction must be 1 or -1".to_string())),
        })
        .collect()
}

fn sort_documents(mut docs: Vec<Document>, fields: &[(String, SortDirection)]) -> Vec<Document> {
    // Stable sort: ties keep storage order.
    docs.sort_by(|a, b| {
        for (field, direction) in fields {
            let cmp = compare_optional(a.get(field), b.get(field));
            let cmp = match direction {
                SortDirection::Ascending => cmp,
                SortDirection::Descending => cmp.reverse(),
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });
    docs
}

fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
    }
}

// Cross-type order: null < numbers < strings < objects < arrays < bools.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

impl ProjectStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let Value::Object(obj) = spec else {
            return Err(EngineError::AggregationError("$project must be an object".to_string()));
        };

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            let action = match value {
                Value::Bool(true) => ProjectField::Include,
                Value::Bool(false) => ProjectField::Exclude,
                Value::Number(n) if n.as_f64() == Some(0.0) => ProjectField::Exclude,
                Value::Number(_) => ProjectField::Include,
                Value::String(s) if s.starts_with('$') => ProjectField::Rename(s[1..].to_string()),
                _ => {
                    return Err(EngineError::AggregationError(format!(
                        "Invalid $project specification for '{}'",
                        field
                    )))
                }
            };
            fields.push((field.clone(), action));
        }

        let includes = fields.iter().any(|(_, a)| !matches!(a, ProjectField::Exclude));
        let excludes_non_id = fields
            .iter()
            .any(|(f, a)| matches!(a, ProjectField::Exclude) && f != "_id");
        if includes && excludes_non_id {
            return Err(EngineError::AggregationError(
                "Cannot mix inclusion and exclusion in $project".to_string(),
            ));
        }

        Ok(ProjectStage { fields })
    }

    fn action(&self, field: &str) -> Option<&ProjectField> {
        self.fields.iter().find(|(f, _)| f == field).map(|(_, a)| a)
    }

    fn project(&self, doc: &Document) -> Document {
        let include_mode = self.fields.iter().any(|(_, a)| !matches!(a, ProjectField::Exclude));
        let mut result = Map::new();

        if include_mode {
            // `_id` is kept unless excluded explicitly.
            if !matches!(self.action("_id"), Some(ProjectField::Exclude)) {
                if let Some(id) = doc.id() {
                    result.insert("_id".to_string(), id.clone());
                }
            }
            for (field, action) in &self.fields {
                let source = match action {
                    ProjectField::Include => field.as_str(),
                    ProjectField::Rename(source) => source.as_str(),
                    ProjectField::Exclude => continue,
                };
                if let Some(value) = doc.get(source) {
                    result.insert(field.clone(), value.clone());
                }
            }
        } else {
            for (field, value) in doc {
                if self.action(field).is_none() {
                    result.insert(field.clone(), value.clone());
                }
            }
        }

        Document::from(result)
    }
}

impl GroupStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let Value::Object(obj) = spec else {
            return Err(EngineError::AggregationError("$group must be an object".to_string()));
        };

        let id = match obj.get("_id") {
            Some(Value::String(s)) if s.starts_with('$') => GroupId::Field(s[1..].to_string()),
            Some(constant) => GroupId::Constant(constant.clone()),
            None => {
                return Err(EngineError::AggregationError(
                    "a group specification must include an _id".to_string(),
                ))
            }
        };

        let accumulators = obj
            .iter()
            .filter(|(field, _)| field.as_str() != "_id")
            .map(|(field, value)| Ok((field.clone(), Accumulator::from_json(field, value)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(GroupStage { id, accumulators })
    }

    fn execute(&self, docs: Vec<Document>) -> Result<Vec<Document>> {
        // Groups come out in first-seen order.
        let mut order: Vec<(Value, Vec<Document>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let key = match &self.id {
                GroupId::Field(field) => doc.get(field).cloned().unwrap_or(Value::Null),
                GroupId::Constant(value) => value.clone(),
            };
            let slot = *index.entry(key.to_string()).or_insert_with(|| {
                order.push((key, Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(doc);
        }

        let mut results = Vec::with_capacity(order.len());
        for (key, group_docs) in order {
            let mut result = Document::new();
            result.insert("_id", key);
            for (field, accumulator) in &self.accumulators {
                result.insert(field.clone(), accumulator.compute(&group_docs));
            }
            results.push(result);
        }
        Ok(results)
    }
}

impl Accumulator {
    fn from_json(field: &str, spec: &Value) -> Result<Self> {
        let (op, operand) = spec
            .as_object()
            .filter(|o| o.len() == 1)
            .and_then(|o| o.iter().next())
            .ok_or_else(|| {
                EngineError::AggregationError(format!("The field '{}' must be an accumulator object", field))
            })?;

        let field_ref = || {
            operand
                .as_str()
                .filter(|s| s.starts_with('$'))
                .map(|s| s[1..].to_string())
                .ok_or_else(|| EngineError::AggregationError(format!("{} requires a field reference", op)))
        };

        match op.as_str() {
            "$sum" => match operand {
                Value::Number(n) => Ok(Accumulator::Sum(Operand::Constant(n.as_f64().unwrap_or(0.0)))),
                _ => Ok(Accumulator::Sum(Operand::Field(field_ref()?))),
            },
            "$avg" => Ok(Accumulator::Avg(field_ref()?)),
            "$min" => Ok(Accumulator::Min(field_ref()?)),
            "$max" => Ok(Accumulator::Max(field_ref()?)),
            "$first" => Ok(Accumulator::First(field_ref()?)),
            "$last" => Ok(Accumulator::Last(field_ref()?)),
            _ => Err(EngineError::AggregationError(format!("Unknown group operator '{}'", op))),
        }
    }

    fn compute(&self, docs: &[Document]) -> Value {
        match self {
            Accumulator::Sum(Operand::Constant(c)) => number_value(c * docs.len() as f64),
            Accumulator::Sum(Operand::Field(field)) => number_value(numbers(docs, field).sum()),
            Accumulator::Avg(field) => {
                let values: Vec<f64> = numbers(docs, field).collect();
                if values.is_empty() {
                    Value::Null
                } else {
                    Value::from(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            Accumulator::Min(field) => extreme(docs, field, Ordering::Less),
            Accumulator::Max(field) => extreme(docs, field, Ordering::Greater),
            Accumulator::First(field) => docs.first().and_then(|d| d.get(field)).cloned().unwrap_or(Value::Null),
            Accumulator::Last(field) => docs.last().and_then(|d| d.get(field)).cloned().unwrap_or(Value::Null),
        }
    }
}

fn numbers<'a>(docs: &'a [Document], field: &'a str) -> impl Iterator<Item = f64> + 'a {
    docs.iter().filter_map(move |d| d.get(field)).filter_map(Value::as_f64)
}

fn extreme(docs: &[Document], field: &str, wanted: Ordering) -> Value {
    docs.iter()
        .filter_map(|d| d.get(field))
        .filter(|v| !v.is_null())
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if compare_optional(Some(v), Some(b)) != wanted => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

// Whole sums stay integers so `{"$sum": 1}` reads back as a count.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}
