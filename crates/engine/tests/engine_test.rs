#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Query engine integration tests.
//!
//! Pagination, scrolling, validation and relation resolution against the
//! in-memory datasets from `raccolta-test-utils`.

use std::sync::Arc;

use raccolta_engine::driver::search_index::SearchIndexDriver;
use raccolta_engine::query::AggregationKind;
use raccolta_engine::schema::{Cardinality, Relation, Schema};
use raccolta_engine::{
    Aggregation, CollectionCriteria, EmptyRelationPolicy, EngineConfig, EngineError, Entity,
    FieldType, FilterOperator, FilterValue, Model, QueryCriteria, QueryEngine, SortDirection,
    Value,
};
use raccolta_test_utils::{
    CountingDriver, MemorySearchIndex, address_schema, init_tracing, memory_driver, order_schema,
    post_schema, product_schema, user_schema,
};
use tokio_stream::StreamExt;

fn counting() -> CountingDriver {
    CountingDriver::new(Arc::new(memory_driver()))
}

fn engine(config: EngineConfig, driver: &CountingDriver) -> QueryEngine {
    init_tracing();
    QueryEngine::new(config).register_driver("memory", Arc::new(driver.clone()))
}

fn ids(entities: &[Entity]) -> Vec<i64> {
    entities
        .iter()
        .filter_map(|e| e.get("id").and_then(Value::as_i64))
        .collect()
}

fn attached<'a>(entity: &'a Entity, alias: &str) -> Option<&'a [Entity]> {
    entity.get(alias).and_then(Value::as_entities)
}

// -------------------------------------------------------------------------
// Pagination and scrolling
// -------------------------------------------------------------------------

#[tokio::test]
async fn query_uses_default_page_size() {
    let driver = counting();
    let config = EngineConfig {
        default_page_size: 3,
        ..Default::default()
    };
    let engine = engine(config, &driver);
    let model = Model::make(user_schema(), "default", "users");

    let result = engine.query(&model, &QueryCriteria::new()).await.unwrap();

    assert_eq!(ids(&result.entities), vec![1, 2, 3]);
    assert_eq!(result.count, 5);
    assert_eq!(driver.calls(), 1);
}

#[tokio::test]
async fn query_caps_page_size_and_honours_offset() {
    let driver = counting();
    let config = EngineConfig {
        max_page_size: 2,
        ..Default::default()
    };
    let engine = engine(config, &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new().set_limit(500).set_offset(1),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    assert_eq!(ids(&result.entities), vec![2, 3]);
    let recorded = driver.recorded();
    let call = &recorded[0];
    assert_eq!((call.offset, call.limit), (1, 2));
}

#[tokio::test]
async fn query_projects_view_fields() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "admin", "users");

    let result = engine.query(&model, &QueryCriteria::new()).await.unwrap();
    let first = &result.entities[0];

    assert_eq!(first.kind(), "user");
    assert_eq!(first.get("email"), Some(&Value::from("ada@example.org")));
    assert_eq!(first.len(), 6);
}

#[tokio::test]
async fn zero_limit_falls_back_to_bounded_default() {
    let driver = counting();
    let config = EngineConfig {
        default_page_size: 2,
        max_page_size: 3,
        ..Default::default()
    };
    let engine = engine(config, &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria =
        QueryCriteria::new().for_collection("users", CollectionCriteria::new().set_limit(0));

    let page = engine.query(&model, &criteria).await.unwrap();
    let scrolled: Vec<_> = engine.scroll(&model, &criteria).collect().await;

    assert_eq!(ids(&page.entities), vec![1, 2]);
    assert_eq!(page.count, 5);
    assert_eq!(scrolled.len(), 5);
    let limits: Vec<u64> = driver.recorded().iter().map(|q| q.limit).collect();
    assert_eq!(limits, vec![2, 2, 2, 2]);
}

#[tokio::test]
async fn scroll_yields_every_row_one_request_per_page() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria =
        QueryCriteria::new().for_collection("users", CollectionCriteria::new().set_limit(2));

    let stream = engine.scroll(&model, &criteria);
    tokio::pin!(stream);
    let mut seen = Vec::new();
    while let Some(entity) = stream.next().await {
        seen.push(entity.unwrap());
    }

    assert_eq!(ids(&seen), vec![1, 2, 3, 4, 5]);
    let offsets: Vec<u64> = driver.recorded().iter().map(|q| q.offset).collect();
    assert_eq!(offsets, vec![0, 2, 4]);
}

#[tokio::test]
async fn scroll_stops_on_exact_multiple() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new()
            .add_filter("id", FilterOperator::LessOrEqual, 4_i64)
            .set_limit(2),
    );

    let seen: Vec<_> = engine.scroll(&model, &criteria).collect().await;

    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(Result::is_ok));
    assert_eq!(driver.calls(), 2);
}

#[tokio::test]
async fn scroll_yields_validation_error_and_ends() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new().add_filter("lastname", FilterOperator::In, vec!["x"]),
    );

    let seen: Vec<_> = engine.scroll(&model, &criteria).collect().await;

    assert_eq!(seen.len(), 1);
    assert!(seen[0].as_ref().unwrap_err().is_schema_violation());
    assert_eq!(driver.calls(), 0);
}

// -------------------------------------------------------------------------
// Filters, sorts and facets
// -------------------------------------------------------------------------

#[tokio::test]
async fn half_open_range_filter() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new()
            .add_filter("age", FilterOperator::GreaterOrEqual, 15_i64)
            .add_filter("age", FilterOperator::LessThan, 25_i64),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    assert_eq!(ids(&result.entities), vec![2, 3]);
    assert_eq!(result.count, 2);
}

#[tokio::test]
async fn set_filters_and_sorting() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new()
            .add_filter("status", FilterOperator::NotIn, vec!["pending"])
            .add_sort("age", SortDirection::Desc),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    assert_eq!(ids(&result.entities), vec![5, 3, 2, 1]);
}

#[tokio::test]
async fn facet_ignores_filters_on_its_own_field() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(product_schema(), "default", "products");
    let criteria = QueryCriteria::new().for_collection(
        "products",
        CollectionCriteria::new()
            .add_filter("category_id", FilterOperator::In, vec!["5"])
            .add_aggregation(Aggregation::facet("category_id")),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    assert_eq!(result.count, 3);
    let buckets = result.aggregations.as_ref().unwrap().facet("category_id").unwrap();
    let pairs: Vec<(Value, u64)> = buckets.iter().map(|b| (b.name.clone(), b.count)).collect();
    assert_eq!(
        pairs,
        vec![
            (Value::from("5"), 3),
            (Value::from("2"), 2),
            (Value::from("3"), 1),
        ]
    );
}

#[tokio::test]
async fn non_facet_aggregation_is_unsupported() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(product_schema(), "default", "products");
    let sum = Aggregation {
        kind: AggregationKind::Sum,
        field: "price".into(),
        offset: None,
        limit: None,
    };
    let criteria = QueryCriteria::new()
        .for_collection("products", CollectionCriteria::new().add_aggregation(sum));

    let err = engine.query(&model, &criteria).await.unwrap_err();

    assert!(matches!(err, EngineError::UnsupportedOperation(_)));
    assert_eq!(driver.calls(), 0);
}

// -------------------------------------------------------------------------
// Validation before I/O
// -------------------------------------------------------------------------

#[tokio::test]
async fn non_filterable_root_filter_fails_before_any_call() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new().add_filter("lastname", FilterOperator::FullTextMatch, "son"),
    );

    let err = engine.query(&model, &criteria).await.unwrap_err();

    match err {
        EngineError::SchemaViolation { field, .. } => assert_eq!(field, "lastname"),
        other => panic!("expected schema violation, got {other:?}"),
    }
    assert_eq!(driver.calls(), 0);
}

#[tokio::test]
async fn invalid_child_criteria_fails_before_root_call() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users")
        .with(Model::make(address_schema(), "default", "addresses"));
    let criteria = QueryCriteria::new().for_collection(
        "addresses",
        CollectionCriteria::new().add_filter("zip", FilterOperator::In, vec!["69001"]),
    );

    let err = engine.query(&model, &criteria).await.unwrap_err();

    assert!(err.is_schema_violation());
    assert_eq!(driver.calls(), 0);
}

fn reviewed_user_schema() -> Arc<Schema> {
    Schema::builder("user")
        .source("memory", "users")
        .filterable(&["id"])
        .view("default", &["id", "firstname"])
        .field_type("id", FieldType::Integer)
        .relation(Relation::join("reviews", "review", "id", "id_user", Cardinality::Many))
        .build()
}

fn review_schema(id_user_type: FieldType) -> Arc<Schema> {
    Schema::builder("review")
        .source("search_index", "idx:reviews")
        .filterable(&["id_user", "stars"])
        .view("default", &["id", "id_user", "stars"])
        .field_type("id_user", id_user_type)
        .field_type("stars", FieldType::Integer)
        .build()
}

#[tokio::test]
async fn search_index_child_rules_are_checked_before_root_call() {
    let driver = counting();
    let index = Arc::new(MemorySearchIndex::new());
    let engine = engine(EngineConfig::default(), &driver)
        .register_driver("search_index", Arc::new(SearchIndexDriver::new(index.clone())));

    // Join keys arrive as a tag filter, so an integer foreign key is rejected.
    let model = Model::make(reviewed_user_schema(), "default", "users")
        .with(Model::make(review_schema(FieldType::Integer), "default", "reviews"));
    let err = engine.query(&model, &QueryCriteria::new()).await.unwrap_err();
    match err {
        EngineError::SchemaViolation { field, .. } => assert_eq!(field, "id_user"),
        other => panic!("expected schema violation, got {other:?}"),
    }

    // A range filter on a tag field is rejected too.
    let model = Model::make(reviewed_user_schema(), "default", "users")
        .with(Model::make(review_schema(FieldType::Enum), "default", "reviews"));
    let criteria = QueryCriteria::new().for_collection(
        "reviews",
        CollectionCriteria::new().add_filter("id_user", FilterOperator::GreaterThan, 3_i64),
    );
    let err = engine.query(&model, &criteria).await.unwrap_err();
    assert!(err.is_schema_violation());

    assert_eq!(driver.calls(), 0);
    assert!(index.searches().is_empty());
}

#[tokio::test]
async fn non_numeric_range_value_is_rejected() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new().add_filter("age", FilterOperator::GreaterThan, "old"),
    );

    let err = engine.query(&model, &criteria).await.unwrap_err();

    assert!(err.is_schema_violation());
}

#[tokio::test]
async fn unregistered_source_type_is_reported() {
    init_tracing();
    let engine = QueryEngine::new(EngineConfig::default());
    let model = Model::make(user_schema(), "default", "users");

    let err = engine.query(&model, &QueryCriteria::new()).await.unwrap_err();

    assert!(matches!(err, EngineError::DriverNotRegistered(tag) if tag == "memory"));
}

#[tokio::test]
async fn unknown_options_are_ignored() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users");
    let criteria = QueryCriteria::new().for_collection(
        "users",
        CollectionCriteria::new().set_option("max_query_time", 5_i64),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    assert_eq!(result.count, 5);
    assert_eq!(driver.calls(), 1);
}

#[tokio::test]
async fn relation_target_mismatch_is_invalid_model() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users")
        .with_relation(Model::make(post_schema(), "default", "writings"), "addresses");

    let err = engine.query(&model, &QueryCriteria::new()).await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidModel(_)));
    assert_eq!(driver.calls(), 0);
}

// -------------------------------------------------------------------------
// Relations
// -------------------------------------------------------------------------

#[tokio::test]
async fn join_attaches_collections_in_one_batched_query() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users")
        .with(Model::make(address_schema(), "default", "addresses"));

    let result = engine.query(&model, &QueryCriteria::new()).await.unwrap();

    assert_eq!(driver.calls(), 2);
    let batches = driver.calls_for("addresses");
    let batch = &batches[0];
    let key_filter = batch.filters.last().unwrap();
    assert_eq!(key_filter.field, "id_user");
    assert_eq!(key_filter.operator, FilterOperator::In);
    assert_eq!(key_filter.value.as_list().len(), 5);

    let users = &result.entities;
    assert_eq!(attached(&users[0], "addresses").map(<[Entity]>::len), Some(2));
    assert_eq!(attached(&users[1], "addresses").map(<[Entity]>::len), Some(1));
    for user in &users[2..] {
        assert!(!user.contains("addresses"), "unmatched parents stay untouched");
    }
}

#[tokio::test]
async fn empty_collection_policy_assigns_empty_lists() {
    let driver = counting();
    let config = EngineConfig {
        empty_relation_policy: EmptyRelationPolicy::EmptyCollection,
        ..Default::default()
    };
    let engine = engine(config, &driver);
    let model = Model::make(user_schema(), "default", "users")
        .with(Model::make(address_schema(), "default", "addresses"));

    let result = engine.query(&model, &QueryCriteria::new()).await.unwrap();

    assert_eq!(attached(&result.entities[0], "addresses").map(<[Entity]>::len), Some(2));
    assert_eq!(attached(&result.entities[4], "addresses"), Some(&[][..]));
}

#[tokio::test]
async fn limit_by_parent_truncates_each_collection() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users")
        .with(Model::make(post_schema(), "default", "posts"));
    let criteria = QueryCriteria::new().for_collection(
        "posts",
        CollectionCriteria::new()
            .add_sort("id", SortDirection::Desc)
            .set_limit_by_parent(2),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    let posts = attached(&result.entities[0], "posts").unwrap();
    assert_eq!(ids(posts), vec![102, 101]);
    assert_eq!(attached(&result.entities[2], "posts").map(<[Entity]>::len), Some(1));
}

#[tokio::test]
async fn child_filters_combine_with_injected_keys() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(user_schema(), "default", "users")
        .with(Model::make(address_schema(), "default", "addresses"));
    let criteria = QueryCriteria::new().for_collection(
        "addresses",
        CollectionCriteria::new().add_filter("city", FilterOperator::In, vec!["Nice", "Turin"]),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    let first = attached(&result.entities[0], "addresses").unwrap();
    assert_eq!(ids(first), vec![11]);
    assert_eq!(ids(attached(&result.entities[1], "addresses").unwrap()), vec![12]);
}

#[tokio::test]
async fn custom_resolver_fetches_products_once() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(order_schema(), "default", "orders")
        .with(Model::make(product_schema(), "default", "products"));

    let result = engine.query(&model, &QueryCriteria::new()).await.unwrap();

    let products = driver.calls_for("products");
    assert_eq!(products.len(), 1);
    assert_eq!(
        products[0].filters.last().unwrap().value,
        FilterValue::List(vec![
            FilterValue::Integer(1),
            FilterValue::Integer(2),
            FilterValue::Integer(3),
        ])
    );
    assert_eq!(
        result.entities[0].get("product_ids"),
        Some(&Value::from(vec![1_i64, 2]))
    );
    assert_eq!(ids(attached(&result.entities[0], "products").unwrap()), vec![1, 2]);
    assert_eq!(ids(attached(&result.entities[1], "products").unwrap()), vec![2, 3]);
}

#[tokio::test]
async fn nested_relations_resolve_before_attaching() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let customer = Model::make(user_schema(), "default", "customer")
        .with(Model::make(address_schema(), "default", "addresses"));
    let model = Model::make(order_schema(), "default", "orders").with(customer);

    let result = engine.query(&model, &QueryCriteria::new()).await.unwrap();

    assert_eq!(driver.calls(), 3);
    let Some(Value::Entity(customer)) = result.entities[0].get("customer") else {
        panic!("order 1 should carry its customer");
    };
    assert_eq!(customer.get("id"), Some(&Value::Integer(1)));
    assert_eq!(attached(customer, "addresses").map(<[Entity]>::len), Some(2));
}

#[tokio::test]
async fn no_parent_keys_skips_related_query() {
    let driver = counting();
    let engine = engine(EngineConfig::default(), &driver);
    let model = Model::make(order_schema(), "default", "orders")
        .with(Model::make(product_schema(), "default", "products"));
    let criteria = QueryCriteria::new().for_collection(
        "orders",
        CollectionCriteria::new().add_filter("id_user", FilterOperator::In, vec![99_i64]),
    );

    let result = engine.query(&model, &criteria).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(driver.calls(), 1);
}

#[tokio::test]
async fn relation_fetch_limit_bounds_related_queries() {
    let driver = counting();
    let config = EngineConfig {
        relation_fetch_limit: 2,
        ..Default::default()
    };
    let engine = engine(config, &driver);
    let model = Model::make(user_schema(), "default", "users")
        .with(Model::make(post_schema(), "default", "posts"));

    let result = engine.query(&model, &QueryCriteria::new()).await.unwrap();

    assert_eq!(driver.calls_for("posts")[0].limit, 2);
    let attached_posts: usize = result
        .entities
        .iter()
        .filter_map(|u| attached(u, "posts"))
        .map(<[Entity]>::len)
        .sum();
    assert_eq!(attached_posts, 2);
}
