//! Relation resolution.
//!
//! For every child of a model node:
//! 1. derive the IN filter from the parent page (join keys or `extract`)
//! 2. run one batched query against the related schema
//! 3. resolve the related result's own children
//! 4. attach related rows onto the parents (join matching or `resolve`)
//!
//! Parents are never removed. A parent without related rows is left
//! untouched unless the empty-collection policy is configured.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::QueryEngine;
use crate::config::EmptyRelationPolicy;
use crate::error::EngineResult;
use crate::model::Model;
use crate::query::{FilterOperator, FilterValue, QueryCriteria, QueryFilter};
use crate::result::{Entity, QueryResult};
use crate::schema::{Cardinality, RelationKeys, RelationKind, Value};

impl QueryEngine {
    /// Resolve every child relation of `model` onto `parents`.
    pub(super) fn resolve_children<'a>(
        &'a self,
        model: &'a Model,
        criteria: &'a QueryCriteria,
        parents: &'a mut QueryResult,
    ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(async move {
            for child in model.children() {
                let Some(relation) = model.schema().relation(&child.relation) else {
                    continue;
                };
                let alias = child.model.alias();
                let child_criteria = criteria.collection(alias);
                let limit_by_parent = child_criteria.and_then(|c| c.limit_by_parent);

                let keys = match &relation.kind {
                    RelationKind::Join {
                        local_key,
                        foreign_key,
                    } => join_keys(parents, local_key, foreign_key),
                    RelationKind::Resolver(resolver) => resolver.extract(parents),
                };

                if keys.is_empty() {
                    tracing::debug!(relation = %relation.name, alias, "no relation keys, skipping query");
                    self.apply_empty_policy(parents, alias, relation.cardinality);
                    continue;
                }

                let limit = child_criteria
                    .and_then(|c| c.limit)
                    .filter(|&limit| limit > 0)
                    .unwrap_or(self.config.relation_fetch_limit);
                let mut query = self.build_query(&child.model, child_criteria, 0, limit);
                query
                    .filters
                    .retain(|f| !(f.field == keys.field && f.operator == FilterOperator::In));
                query.filters.push(QueryFilter {
                    field: keys.field.clone(),
                    operator: FilterOperator::In,
                    value: FilterValue::List(keys.values),
                });

                let mut related = self.run(&query, None).await?;

                if related.count > related.len() as u64 {
                    tracing::warn!(
                        relation = %relation.name,
                        returned = related.len(),
                        total = related.count,
                        "relation results truncated; set a limit on the related collection"
                    );
                }

                self.resolve_children(&child.model, criteria, &mut related)
                    .await?;

                match &relation.kind {
                    RelationKind::Join {
                        local_key,
                        foreign_key,
                    } => attach_join(
                        parents,
                        &related,
                        local_key,
                        foreign_key,
                        relation.cardinality,
                        alias,
                    ),
                    RelationKind::Resolver(resolver) => {
                        resolver.resolve(parents, &related, relation.cardinality, alias);
                    }
                }

                if let Some(max) = limit_by_parent {
                    truncate_per_parent(parents, alias, max as usize);
                }
                self.apply_empty_policy(parents, alias, relation.cardinality);
            }
            Ok(())
        })
    }

    fn apply_empty_policy(&self, parents: &mut QueryResult, alias: &str, cardinality: Cardinality) {
        if self.config.empty_relation_policy != EmptyRelationPolicy::EmptyCollection
            || !cardinality.is_collection()
        {
            return;
        }
        for parent in &mut parents.entities {
            if !parent.contains(alias) {
                parent.insert(alias, Value::Entities(Vec::new()));
            }
        }
    }
}

/// Distinct non-null local-key values, as an IN filter on the foreign key.
fn join_keys(parents: &QueryResult, local_key: &str, foreign_key: &str) -> RelationKeys {
    let values = parents
        .distinct_values(local_key)
        .into_iter()
        .filter_map(|(_, value)| value.to_filter_value())
        .collect();
    RelationKeys::new(foreign_key, values)
}

fn value_keys(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items.iter().filter_map(Value::match_key).collect(),
        Some(single) => single.match_key().into_iter().collect(),
        None => Vec::new(),
    }
}

/// Attach related rows whose foreign key matches the parent's local key.
fn attach_join(
    parents: &mut QueryResult,
    related: &QueryResult,
    local_key: &str,
    foreign_key: &str,
    cardinality: Cardinality,
    alias: &str,
) {
    let mut by_key: HashMap<String, Vec<&Entity>> = HashMap::new();
    for entity in &related.entities {
        for key in value_keys(entity.get(foreign_key)) {
            by_key.entry(key).or_default().push(entity);
        }
    }

    for parent in &mut parents.entities {
        let mut matches: Vec<Entity> = Vec::new();
        for key in value_keys(parent.get(local_key)) {
            if let Some(found) = by_key.get(&key) {
                matches.extend(found.iter().map(|e| (*e).clone()));
            }
        }
        if matches.is_empty() {
            continue;
        }
        match cardinality {
            Cardinality::One => parent.insert(alias, matches.remove(0)),
            Cardinality::Many => parent.insert(alias, matches),
        }
    }
}

fn truncate_per_parent(parents: &mut QueryResult, alias: &str, max: usize) {
    for parent in &mut parents.entities {
        if let Some(Value::Entities(items)) = parent.get(alias)
            && items.len() > max
        {
            let mut items = items.clone();
            items.truncate(max);
            parent.insert(alias, items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(entities: Vec<Entity>) -> QueryResult {
        QueryResult {
            count: entities.len() as u64,
            entities,
            aggregations: None,
        }
    }

    #[test]
    fn join_keys_are_distinct_and_skip_nulls() {
        let parents = result(vec![
            Entity::new("user").with("id", 1_i64),
            Entity::new("user").with("id", 1_i64),
            Entity::new("user").with("id", Value::Null),
            Entity::new("user").with("id", 2_i64),
        ]);
        let keys = join_keys(&parents, "id", "id_user");
        assert_eq!(keys.field, "id_user");
        assert_eq!(keys.values, vec![FilterValue::Integer(1), FilterValue::Integer(2)]);
    }

    #[test]
    fn attach_many_and_skip_unmatched() {
        let mut parents = result(vec![
            Entity::new("user").with("id", 1_i64),
            Entity::new("user").with("id", 2_i64),
        ]);
        let related = result(vec![
            Entity::new("address").with("id_user", "1").with("city", "Lyon"),
            Entity::new("address").with("id_user", 1_i64).with("city", "Nice"),
        ]);
        attach_join(&mut parents, &related, "id", "id_user", Cardinality::Many, "addresses");
        let attached = parents.entities[0].get("addresses").and_then(Value::as_entities);
        assert_eq!(attached.map(<[Entity]>::len), Some(2));
        assert!(!parents.entities[1].contains("addresses"));
    }

    #[test]
    fn attach_one_takes_first_match() {
        let mut parents = result(vec![Entity::new("order").with("id_user", 7_i64)]);
        let related = result(vec![
            Entity::new("user").with("id", 7_i64).with("name", "first"),
            Entity::new("user").with("id", 7_i64).with("name", "second"),
        ]);
        attach_join(&mut parents, &related, "id_user", "id", Cardinality::One, "customer");
        match parents.entities[0].get("customer") {
            Some(Value::Entity(customer)) => {
                assert_eq!(customer.get("name"), Some(&Value::from("first")));
            }
            other => panic!("expected a single entity, got {other:?}"),
        }
    }

    #[test]
    fn truncation_per_parent() {
        let mut parents = result(vec![Entity::new("user").with(
            "posts",
            vec![Entity::new("post"), Entity::new("post"), Entity::new("post")],
        )]);
        truncate_per_parent(&mut parents, "posts", 2);
        assert_eq!(
            parents.entities[0].get("posts").and_then(Value::as_entities).map(<[Entity]>::len),
            Some(2)
        );
    }
}
