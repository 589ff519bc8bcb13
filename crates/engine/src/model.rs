//! Query shapes: a schema bound to an alias, with nested related models.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::schema::Schema;

/// A schema bound to a view and an alias, plus the related models fetched
/// with it.
///
/// Models carry no per-query state; only the schema is shared.
#[derive(Debug, Clone)]
pub struct Model {
    schema: Arc<Schema>,
    view: String,
    alias: String,
    children: Vec<ModelChild>,
}

/// A nested model attached under a relation of its parent.
#[derive(Debug, Clone)]
pub struct ModelChild {
    pub relation: String,
    pub model: Model,
}

impl Model {
    /// Root binding. An empty alias falls back to the schema's default alias.
    pub fn make(schema: Arc<Schema>, view: &str, alias: &str) -> Self {
        let alias = if alias.is_empty() {
            schema.default_alias().to_string()
        } else {
            alias.to_string()
        };
        Self {
            schema,
            view: view.to_string(),
            alias,
            children: Vec::new(),
        }
    }

    /// Attach `child` under the relation named after the child's alias.
    pub fn with(self, child: Model) -> Self {
        let relation = child.alias.clone();
        self.with_relation(child, relation)
    }

    /// Attach `child` under an explicitly named relation.
    pub fn with_relation(mut self, child: Model, relation: impl Into<String>) -> Self {
        self.children.push(ModelChild {
            relation: relation.into(),
            model: child,
        });
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn children(&self) -> &[ModelChild] {
        &self.children
    }

    /// Aliases of this model and all descendants, depth first.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases = vec![self.alias.as_str()];
        for child in &self.children {
            aliases.extend(child.model.aliases());
        }
        aliases
    }

    /// Check alias uniqueness and that every child hangs off a declared
    /// relation targeting the child's schema.
    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for alias in self.aliases() {
            if !seen.insert(alias) {
                return Err(EngineError::InvalidModel(format!(
                    "alias '{alias}' is used more than once"
                )));
            }
        }
        self.validate_relations()
    }

    fn validate_relations(&self) -> EngineResult<()> {
        for child in &self.children {
            let relation = self.schema.relation(&child.relation).ok_or_else(|| {
                EngineError::InvalidModel(format!(
                    "schema '{}' declares no relation '{}'",
                    self.schema.name(),
                    child.relation
                ))
            })?;
            if relation.target != child.model.schema.name() {
                return Err(EngineError::InvalidModel(format!(
                    "relation '{}' targets '{}' but model '{}' uses schema '{}'",
                    relation.name,
                    relation.target,
                    child.model.alias,
                    child.model.schema.name()
                )));
            }
            child.model.validate_relations()?;
        }
        Ok(())
    }
}
