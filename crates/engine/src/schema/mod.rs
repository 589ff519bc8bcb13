//! Static entity metadata.
//!
//! This module provides:
//! - Schema: field sets per view, field types, filterable fields, relations
//! - SchemaBuilder: one-shot construction of an immutable Schema
//! - FieldType / Value: the field type taxonomy and tagged row values
//! - Relation: foreign-key joins and custom resolvers

mod field;
mod relation;
mod value;

pub use field::{ENUMERABLE_TYPES, FieldTransformer, FieldType, NUMERIC_TYPES};
pub use relation::{Cardinality, Relation, RelationKeys, RelationKind, RelationResolver};
pub use value::Value;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::model::Model;

/// View used when the requested view is undeclared.
pub const PUBLIC_VIEW: &str = "public";

/// Last-resort view.
pub const DEFAULT_VIEW: &str = "default";

/// Description of one entity type. Immutable once built; share it as
/// `Arc<Schema>`.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    source_type: String,
    source_name: String,
    entity_kind: String,
    default_alias: String,
    primary_keys: Vec<String>,
    filterable: Vec<String>,
    views: BTreeMap<String, Vec<String>>,
    types: HashMap<String, FieldType>,
    transformers: HashMap<String, FieldTransformer>,
    relations: Vec<Relation>,
}

impl Schema {
    /// Start building a schema with the given name.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Bind this schema to a view and alias. An empty alias falls back to
    /// the schema's default alias.
    pub fn make(self: &Arc<Self>, view: &str, alias: &str) -> Model {
        Model::make(Arc::clone(self), view, alias)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag selecting the driver that serves this schema.
    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    /// Qualified table, index, file or endpoint name.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Tag describing what kind of entity rows of this schema represent.
    pub fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn filterable_fields(&self) -> &[String] {
        &self.filterable
    }

    /// Fields projected for `view`, falling back to `public`, then
    /// `default`, then nothing.
    pub fn fields_for(&self, view: &str) -> &[String] {
        self.views
            .get(view)
            .or_else(|| self.views.get(PUBLIC_VIEW))
            .or_else(|| self.views.get(DEFAULT_VIEW))
            .map_or(&[], Vec::as_slice)
    }

    /// Whether `field` appears in a view, the type map or the primary keys.
    pub fn declares(&self, field: &str) -> bool {
        self.types.contains_key(field)
            || self.primary_keys.iter().any(|k| k == field)
            || self.views.values().any(|fields| fields.iter().any(|f| f == field))
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        self.filterable.iter().any(|f| f == field)
    }

    /// Declared type of `field`; `Text` when declared without a type and
    /// `None` when undeclared.
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        if let Some(field_type) = self.types.get(field) {
            return Some(*field_type);
        }
        self.declares(field).then_some(FieldType::Text)
    }

    pub fn transformer(&self, field: &str) -> Option<FieldTransformer> {
        self.transformers.get(field).copied()
    }

    /// Relation named `name`, if declared. Probing unknown names is fine.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Convert raw backend text for `field`, applying its transformer.
    pub fn value_from_text(&self, field: &str, raw: &str) -> Value {
        let field_type = self.field_type(field).unwrap_or_default();
        match self.transformer(field) {
            Some(transformer) => transformer.apply(field_type, raw),
            None => field_type.parse_raw(raw),
        }
    }

    /// Convert a JSON value for `field`. Strings go through the transformer.
    pub fn value_from_json(&self, field: &str, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::String(raw) => self.value_from_text(field, raw),
            other => self.field_type(field).unwrap_or_default().parse_json(other),
        }
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            schema: Schema {
                source_name: name.clone(),
                entity_kind: name.clone(),
                default_alias: name.clone(),
                name,
                source_type: String::new(),
                primary_keys: Vec::new(),
                filterable: Vec::new(),
                views: BTreeMap::new(),
                types: HashMap::new(),
                transformers: HashMap::new(),
                relations: Vec::new(),
            },
        }
    }

    /// Source type tag and qualified source name.
    pub fn source(mut self, source_type: impl Into<String>, source_name: impl Into<String>) -> Self {
        self.schema.source_type = source_type.into();
        self.schema.source_name = source_name.into();
        self
    }

    pub fn entity_kind(mut self, kind: impl Into<String>) -> Self {
        self.schema.entity_kind = kind.into();
        self
    }

    pub fn default_alias(mut self, alias: impl Into<String>) -> Self {
        self.schema.default_alias = alias.into();
        self
    }

    pub fn primary_keys(mut self, keys: &[&str]) -> Self {
        self.schema.primary_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn filterable(mut self, fields: &[&str]) -> Self {
        for field in fields {
            if !self.schema.is_filterable(field) {
                self.schema.filterable.push(field.to_string());
            }
        }
        self
    }

    /// Declare the ordered field set of a view.
    pub fn view(mut self, view: impl Into<String>, fields: &[&str]) -> Self {
        self.schema
            .views
            .insert(view.into(), fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn field_type(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.schema.types.insert(field.into(), field_type);
        self
    }

    pub fn transformer(mut self, field: impl Into<String>, transformer: FieldTransformer) -> Self {
        self.schema.transformers.insert(field.into(), transformer);
        self
    }

    /// Add a relation. A relation with the same name replaces the earlier
    /// declaration.
    pub fn relation(mut self, relation: Relation) -> Self {
        self.schema.relations.retain(|r| r.name != relation.name);
        self.schema.relations.push(relation);
        self
    }

    pub fn build(self) -> Arc<Schema> {
        Arc::new(self.schema)
    }
}
