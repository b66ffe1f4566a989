//! Live query definitions: collection, equality filters, ordering and limit.

use crate::error::{Result, SyncError};
use crate::types::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction for an order-by clause.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Equality filter on a single field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// Order-by clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A filter + order + limit specification over one collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Slash-separated collection path (odd number of segments).
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    /// Query every document of a collection.
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            collection: path.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check the query is well formed before it reaches a source.
    pub fn validate(&self) -> Result<()> {
        validate_collection_path(&self.collection).map_err(SyncError::InvalidQuery)?;

        if let Some(filter) = self.filters.iter().find(|f| f.field.is_empty()) {
            return Err(SyncError::InvalidQuery(format!(
                "filter on empty field name (value {})",
                filter.value
            )));
        }

        if let Some(order) = &self.order_by {
            if order.field.is_empty() {
                return Err(SyncError::InvalidQuery(
                    "order by empty field name".to_string(),
                ));
            }
        }

        if self.limit == Some(0) {
            return Err(SyncError::InvalidQuery("limit must be positive".to_string()));
        }

        Ok(())
    }

    /// Whether a document belongs to this query's result, ignoring limit.
    ///
    /// Documents lacking the order-by field are excluded.
    pub fn matches(&self, document: &Document) -> bool {
        if parent_collection(&document.path) != Some(self.collection.as_str()) {
            return false;
        }

        let filtered = self
            .filters
            .iter()
            .all(|f| document.field(&f.field) == Some(&f.value));

        let ordered = match &self.order_by {
            Some(order) => document.field(&order.field).is_some(),
            None => true,
        };

        filtered && ordered
    }

    /// Result ordering: order-by field first, then document id ascending.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let by_field = match &self.order_by {
            Some(order) => {
                let ord = compare_values(
                    a.field(&order.field).unwrap_or(&Value::Null),
                    b.field(&order.field).unwrap_or(&Value::Null),
                );
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            }
            None => Ordering::Equal,
        };
        by_field.then_with(|| a.id.cmp(&b.id))
    }

    /// Filter, sort and truncate a set of candidate documents.
    pub fn evaluate<'a, I>(&self, documents: I) -> Vec<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut results: Vec<Document> = documents
            .into_iter()
            .filter(|d| self.matches(d))
            .cloned()
            .collect();
        results.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

/// Validate a collection path, returning a description of the problem.
pub(crate) fn validate_collection_path(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() {
        return Err("collection path is empty".to_string());
    }
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(format!("collection path '{}' has an empty segment", path));
    }
    if segments.len() % 2 == 0 {
        return Err(format!("'{}' is a document path, not a collection", path));
    }
    Ok(())
}

/// Collection part of a document path.
pub(crate) fn parent_collection(document_path: &str) -> Option<&str> {
    document_path.rsplit_once('/').map(|(parent, _)| parent)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
