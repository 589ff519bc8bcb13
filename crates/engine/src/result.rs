//! Normalized query output.
//!
//! Drivers hand raw rows to a [`ResultBuilder`], which projects them on the
//! query fields and types every value through the schema. The result shape is
//! the same for every backend.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::query::Query;
use crate::schema::Value;

/// One fetched row: ordered field name to value pairs plus the schema's
/// entity kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    kind: String,
    fields: Vec<(String, Value)>,
}

impl Entity {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    /// Set `field`, replacing an existing value in place.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Entity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        Value::Entity(Box::new(entity))
    }
}

impl From<Vec<Entity>> for Value {
    fn from(entities: Vec<Entity>) -> Self {
        Value::Entities(entities)
    }
}

/// One facet bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetBucket {
    pub name: Value,
    pub count: u64,
}

/// Aggregation output keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregations {
    pub facets: BTreeMap<String, Vec<FacetBucket>>,
}

impl Aggregations {
    pub fn facet(&self, field: &str) -> Option<&[FacetBucket]> {
        self.facets.get(field).map(Vec::as_slice)
    }
}

/// Output of one driver call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub entities: Vec<Entity>,

    /// Backend total for the query, independent of the page returned.
    pub count: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Aggregations>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Distinct non-null match keys of `field` across entities, in first-seen
    /// order, paired with the value that produced them. List values
    /// contribute each element.
    pub fn distinct_values(&self, field: &str) -> Vec<(String, Value)> {
        let mut seen = std::collections::HashSet::new();
        let mut values = Vec::new();
        for entity in &self.entities {
            let Some(value) = entity.get(field) else {
                continue;
            };
            let items = match value {
                Value::List(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            for item in items {
                if let Some(key) = item.match_key()
                    && seen.insert(key.clone())
                {
                    values.push((key, item.clone()));
                }
            }
        }
        values
    }
}

/// Untyped row as produced by a backend.
#[derive(Debug, Clone)]
pub enum RawRow {
    /// Field/string pairs (search-index documents, CSV lines).
    Text(Vec<(String, String)>),
    /// JSON object (HTTP bodies, `row_to_json`, JSON lines).
    Json(serde_json::Value),
    /// Stored row (in-memory tables, parsed files). Text values are typed
    /// through the schema like `Text` rows.
    Entity(Entity),
}

/// Turns raw backend rows into a [`QueryResult`].
pub trait ResultBuilder: Send + Sync {
    fn build(&self, rows: Vec<RawRow>, query: &Query) -> QueryResult;
}

/// Projects rows on the query fields and types values through the schema.
///
/// Projected fields missing from a row become `Null`. With no projected
/// fields every field of the row is kept. `count` is set to the number of
/// rows; drivers overwrite it with the backend total.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResultBuilder;

impl DefaultResultBuilder {
    fn build_row(&self, row: RawRow, query: &Query) -> Entity {
        let schema = &query.schema;
        let mut entity = Entity::new(schema.entity_kind());
        match row {
            RawRow::Text(pairs) => {
                if query.fields.is_empty() {
                    for (field, raw) in &pairs {
                        entity.insert(field.as_str(), schema.value_from_text(field, raw));
                    }
                } else {
                    for field in &query.fields {
                        let value = pairs
                            .iter()
                            .find(|(name, _)| name == field)
                            .map_or(Value::Null, |(_, raw)| schema.value_from_text(field, raw));
                        entity.insert(field.as_str(), value);
                    }
                }
            }
            RawRow::Json(json) => {
                let serde_json::Value::Object(object) = json else {
                    tracing::debug!(query = %query.name, "skipping non-object row");
                    return entity;
                };
                if query.fields.is_empty() {
                    for (field, raw) in &object {
                        entity.insert(field.as_str(), schema.value_from_json(field, raw));
                    }
                } else {
                    for field in &query.fields {
                        let value = object
                            .get(field)
                            .map_or(Value::Null, |raw| schema.value_from_json(field, raw));
                        entity.insert(field.as_str(), value);
                    }
                }
            }
            RawRow::Entity(source) => {
                // Stored text is still raw: it goes through the field's type
                // and transformer like any other backend text.
                let typed = |field: &str, value: &Value| match value {
                    Value::Text(raw) => schema.value_from_text(field, raw),
                    other => other.clone(),
                };
                if query.fields.is_empty() {
                    for (field, value) in source.iter() {
                        entity.insert(field, typed(field, value));
                    }
                } else {
                    for field in &query.fields {
                        let value = source
                            .get(field)
                            .map_or(Value::Null, |v| typed(field.as_str(), v));
                        entity.insert(field.as_str(), value);
                    }
                }
            }
        }
        entity
    }
}

impl ResultBuilder for DefaultResultBuilder {
    fn build(&self, rows: Vec<RawRow>, query: &Query) -> QueryResult {
        let entities: Vec<Entity> = rows
            .into_iter()
            .map(|row| self.build_row(row, query))
            .collect();
        QueryResult {
            count: entities.len() as u64,
            entities,
            aggregations: None,
        }
    }
}
