//! Schemas and datasets shared by the integration tests.
//!
//! Every schema is served by the `memory` source type unless a test
//! rebuilds it with another source.

use std::collections::HashMap;
use std::sync::Arc;

use raccolta_engine::driver::InMemoryDriver;
use raccolta_engine::result::{Entity, QueryResult};
use raccolta_engine::schema::{
    Cardinality, FieldTransformer, FieldType, Relation, RelationKeys, RelationResolver, Schema,
    Value,
};

/// `user` schema: addresses and posts are collection joins on `id_user`.
pub fn user_schema() -> Arc<Schema> {
    Schema::builder("user")
        .source("memory", "users")
        .primary_keys(&["id"])
        .filterable(&["id", "firstname", "status", "age"])
        .view("default", &["id", "firstname", "status", "age"])
        .view("admin", &["id", "firstname", "lastname", "email", "status", "age"])
        .field_type("id", FieldType::Integer)
        .field_type("age", FieldType::Integer)
        .field_type("status", FieldType::Enum)
        .relation(Relation::join("addresses", "address", "id", "id_user", Cardinality::Many))
        .relation(Relation::join("posts", "post", "id", "id_user", Cardinality::Many))
        .build()
}

pub fn address_schema() -> Arc<Schema> {
    Schema::builder("address")
        .source("memory", "addresses")
        .primary_keys(&["id"])
        .filterable(&["id", "id_user", "city"])
        .view("default", &["id", "id_user", "city"])
        .field_type("id", FieldType::Integer)
        .field_type("id_user", FieldType::Integer)
        .build()
}

/// `post` schema: each post has one author.
pub fn post_schema() -> Arc<Schema> {
    Schema::builder("post")
        .source("memory", "posts")
        .primary_keys(&["id"])
        .filterable(&["id", "id_user", "title"])
        .view("default", &["id", "id_user", "title"])
        .field_type("id", FieldType::Integer)
        .field_type("id_user", FieldType::Integer)
        .relation(Relation::join("author", "user", "id_user", "id", Cardinality::One))
        .build()
}

/// `order` schema: products come from a delimited id list on the order row.
pub fn order_schema() -> Arc<Schema> {
    Schema::builder("order")
        .source("memory", "orders")
        .primary_keys(&["id"])
        .filterable(&["id", "id_user"])
        .view("default", &["id", "id_user", "product_ids"])
        .field_type("id", FieldType::Integer)
        .field_type("id_user", FieldType::Integer)
        .field_type("product_ids", FieldType::Integer)
        .transformer("product_ids", FieldTransformer::Delimited(','))
        .relation(Relation::join("customer", "user", "id_user", "id", Cardinality::One))
        .relation(Relation::resolver(
            "products",
            "product",
            Arc::new(ProductIdsResolver),
            Cardinality::Many,
        ))
        .build()
}

pub fn product_schema() -> Arc<Schema> {
    Schema::builder("product")
        .source("memory", "products")
        .primary_keys(&["id"])
        .filterable(&["id", "name", "price", "category_id"])
        .view("default", &["id", "name", "price", "category_id"])
        .field_type("id", FieldType::Integer)
        .field_type("price", FieldType::Float)
        .field_type("category_id", FieldType::Enum)
        .build()
}

/// Attaches products to orders following the order's `product_ids` list,
/// in list order.
#[derive(Debug, Default)]
pub struct ProductIdsResolver;

impl RelationResolver for ProductIdsResolver {
    fn extract(&self, parents: &QueryResult) -> RelationKeys {
        let values = parents
            .distinct_values("product_ids")
            .into_iter()
            .filter_map(|(_, value)| value.to_filter_value())
            .collect();
        RelationKeys::new("id", values)
    }

    fn resolve(
        &self,
        parents: &mut QueryResult,
        related: &QueryResult,
        _cardinality: Cardinality,
        alias: &str,
    ) {
        let by_id: HashMap<String, &Entity> = related
            .entities
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::match_key).map(|k| (k, p)))
            .collect();

        for order in &mut parents.entities {
            let Some(Value::List(ids)) = order.get("product_ids") else {
                continue;
            };
            let products: Vec<Entity> = ids
                .iter()
                .filter_map(Value::match_key)
                .filter_map(|id| by_id.get(&id).map(|p| (*p).clone()))
                .collect();
            if !products.is_empty() {
                order.insert(alias, products);
            }
        }
    }
}

fn user(id: i64, firstname: &str, status: &str, age: i64) -> Entity {
    Entity::new("user")
        .with("id", id)
        .with("firstname", firstname)
        .with("lastname", format!("{firstname}son"))
        .with("email", format!("{}@example.org", firstname.to_lowercase()))
        .with("status", status)
        .with("age", age)
}

/// Five users aged 12, 15, 20, 25 and 31.
pub fn user_rows() -> Vec<Entity> {
    vec![
        user(1, "Ada", "active", 12),
        user(2, "Grace", "active", 15),
        user(3, "Linus", "inactive", 20),
        user(4, "Barbara", "pending", 25),
        user(5, "Ken", "active", 31),
    ]
}

/// Two addresses for user 1, one for user 2, none for the others.
pub fn address_rows() -> Vec<Entity> {
    let address = |id: i64, id_user: i64, city: &str| {
        Entity::new("address")
            .with("id", id)
            .with("id_user", id_user)
            .with("city", city)
    };
    vec![
        address(10, 1, "Lyon"),
        address(11, 1, "Nice"),
        address(12, 2, "Turin"),
    ]
}

/// Three posts by user 1, one by user 3.
pub fn post_rows() -> Vec<Entity> {
    let post = |id: i64, id_user: i64, title: &str| {
        Entity::new("post")
            .with("id", id)
            .with("id_user", id_user)
            .with("title", title)
    };
    vec![
        post(100, 1, "Notes on the analytical engine"),
        post(101, 1, "Bernoulli numbers"),
        post(102, 1, "On looms"),
        post(103, 3, "Just a hobby"),
    ]
}

/// Order 1 holds products `"1,2"`, order 2 holds products `"2,3"`. The ids
/// are stored as delimited text and split by the schema's transformer.
pub fn order_rows() -> Vec<Entity> {
    vec![
        Entity::new("order")
            .with("id", 1_i64)
            .with("id_user", 1_i64)
            .with("product_ids", "1,2"),
        Entity::new("order")
            .with("id", 2_i64)
            .with("id_user", 2_i64)
            .with("product_ids", "2,3"),
    ]
}

/// Six products in categories 5, 5, 2, 5, 2 and 3.
pub fn product_rows() -> Vec<Entity> {
    let product = |id: i64, name: &str, price: f64, category: &str| {
        Entity::new("product")
            .with("id", id)
            .with("name", name)
            .with("price", price)
            .with("category_id", category)
    };
    vec![
        product(1, "Lamp", 19.5, "5"),
        product(2, "Desk", 120.0, "5"),
        product(3, "Chair", 45.0, "2"),
        product(4, "Shelf", 80.0, "5"),
        product(5, "Rug", 60.0, "2"),
        product(6, "Mirror", 35.0, "3"),
    ]
}

/// In-memory driver loaded with every dataset above.
pub fn memory_driver() -> InMemoryDriver {
    InMemoryDriver::new()
        .with_table("users", user_rows())
        .with_table("addresses", address_rows())
        .with_table("posts", post_rows())
        .with_table("orders", order_rows())
        .with_table("products", product_rows())
}
