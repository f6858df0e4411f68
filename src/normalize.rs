//! Result normalization.
//!
//! Converts raw backend records and summaries into plain, ordered, serializable shapes.
//! Every conversion is pure and idempotent: normalizing something that is already
//! normalized hands it back unchanged.

use crate::driver::{QueryResult, RawSummary, Record};
use crate::value::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Plain field-name → value mapping that keeps field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Insert or replace a field. A replaced field keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Flat per-category statistics with zero-valued entries omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub counters: BTreeMap<String, i64>,
    #[serde(rename = "updateStatistics")]
    pub update_statistics: BTreeMap<String, i64>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.update_statistics.is_empty()
    }

    pub fn counter(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// What an executor hands back: a raw backend result, or rows a nested
/// composed query already normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Raw(QueryResult),
    Rows(Vec<Row>),
}

impl QueryOutput {
    pub fn raw_summary(&self) -> Option<&RawSummary> {
        match self {
            QueryOutput::Raw(result) => Some(&result.summary),
            QueryOutput::Rows(_) => None,
        }
    }

    /// Normalize, projecting `fields` when given.
    pub fn into_rows(self, fields: Option<&[&str]>) -> Vec<Row> {
        match self {
            QueryOutput::Raw(result) => normalize_records(&result.records, fields),
            QueryOutput::Rows(rows) => match fields {
                None => rows,
                Some(fields) => rows.iter().map(|r| project_row(r, fields)).collect(),
            },
        }
    }
}

impl From<Vec<Row>> for QueryOutput {
    fn from(rows: Vec<Row>) -> Self {
        QueryOutput::Rows(rows)
    }
}

impl From<QueryResult> for QueryOutput {
    fn from(result: QueryResult) -> Self {
        QueryOutput::Raw(result)
    }
}

/// Idempotent conversion into a plain shape
pub trait Normalize {
    type Output;

    fn normalize(self) -> Self::Output;
}

impl Normalize for QueryOutput {
    type Output = Vec<Row>;

    fn normalize(self) -> Vec<Row> {
        self.into_rows(None)
    }
}

impl Normalize for Vec<Row> {
    type Output = Vec<Row>;

    fn normalize(self) -> Vec<Row> {
        self
    }
}

impl Normalize for &RawSummary {
    type Output = Summary;

    fn normalize(self) -> Summary {
        normalize_summary(self)
    }
}

impl Normalize for Summary {
    type Output = Summary;

    fn normalize(self) -> Summary {
        self
    }
}

/// Convert a record into a row, keeping only `fields` (in the requested order) when given.
/// A requested field the record does not carry maps to `Null`.
pub fn normalize_record(record: &Record, fields: Option<&[&str]>) -> Row {
    match fields {
        None => record
            .keys()
            .iter()
            .cloned()
            .zip(record.values().iter().cloned())
            .collect(),
        Some(fields) => fields
            .iter()
            .map(|f| (*f, record.get(f).cloned().unwrap_or(Value::Null)))
            .collect(),
    }
}

pub fn normalize_records(records: &[Record], fields: Option<&[&str]>) -> Vec<Row> {
    records
        .iter()
        .map(|record| normalize_record(record, fields))
        .collect()
}

fn project_row(row: &Row, fields: &[&str]) -> Row {
    fields
        .iter()
        .map(|f| (*f, row.get(f).cloned().unwrap_or(Value::Null)))
        .collect()
}

pub fn normalize_summary(summary: &RawSummary) -> Summary {
    let counters = summary
        .counters
        .stats()
        .iter()
        .filter(|(_, v)| *v != 0)
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    let mut update_statistics = BTreeMap::new();
    if summary.system_updates != 0 {
        update_statistics.insert("systemUpdates".to_string(), summary.system_updates);
    }
    Summary {
        counters,
        update_statistics,
    }
}
