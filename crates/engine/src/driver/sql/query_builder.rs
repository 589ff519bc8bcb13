//! SQL generation using SeaQuery.
//!
//! Renders the page, count and facet statements for one [`Query`]:
//! - full text as `LIKE '%value%'` with wildcard escaping
//! - range comparisons typed by the schema
//! - `IN` / `NOT IN`
//! - ORDER BY, LIMIT and OFFSET

use sea_query::{
    Alias, Asterisk, Expr, ExprTrait, IntoTableRef, Order, PostgresQueryBuilder, SelectStatement,
    SimpleExpr, TableRef,
};

use crate::query::{Aggregation, FilterOperator, FilterValue, Query, QueryFilter, SortDirection};
use crate::schema::FieldType;

/// Query builder for one driver query.
pub struct SqlQueryBuilder<'a> {
    query: &'a Query,
}

impl<'a> SqlQueryBuilder<'a> {
    pub fn new(query: &'a Query) -> Self {
        Self { query }
    }

    /// Build the main SELECT with pagination.
    pub fn build(&self) -> String {
        let mut select = sea_query::Query::select();

        if self.query.fields.is_empty() {
            select.column(Asterisk);
        } else {
            for field in &self.query.fields {
                select.column(Alias::new(field));
            }
        }
        select.from(self.table());
        self.add_filters(&mut select, self.query);
        self.add_sorts(&mut select);

        if self.query.limit > 0 {
            select.limit(self.query.limit);
        }
        select.offset(self.query.offset);

        select.to_string(PostgresQueryBuilder)
    }

    /// Build a COUNT query for total results.
    pub fn build_count(&self) -> String {
        let mut select = sea_query::Query::select();
        select.expr(Expr::col(Asterisk).count());
        select.from(self.table());
        self.add_filters(&mut select, self.query);
        select.to_string(PostgresQueryBuilder)
    }

    /// Build a facet: group by the field, count, sort by count then value.
    ///
    /// Filters on the faceted field are left out.
    pub fn build_facet(&self, aggregation: &Aggregation) -> String {
        let derived = self.query.without_filters_on(&aggregation.field);
        let field = Alias::new(&aggregation.field);

        let mut select = sea_query::Query::select();
        select
            .column(field.clone())
            .expr_as(Expr::col(Asterisk).count(), Alias::new("count"))
            .from(self.table());
        self.add_filters(&mut select, &derived);
        select
            .and_where(Expr::col(field.clone()).is_not_null())
            .group_by_col(field.clone())
            .order_by(Alias::new("count"), Order::Desc)
            .order_by(field, Order::Asc)
            .limit(aggregation.effective_limit())
            .offset(aggregation.effective_offset());

        select.to_string(PostgresQueryBuilder)
    }

    /// `schema.table` source names are split into a schema-qualified table.
    fn table(&self) -> TableRef {
        let source = self.query.schema.source_name();
        match source.split_once('.') {
            Some((schema, table)) => (Alias::new(schema), Alias::new(table)).into_table_ref(),
            None => Alias::new(source).into_table_ref(),
        }
    }

    fn add_filters(&self, select: &mut SelectStatement, query: &Query) {
        for filter in &query.filters {
            if let Some(condition) = self.build_filter_condition(filter) {
                select.and_where(condition);
            }
        }
    }

    fn build_filter_condition(&self, filter: &QueryFilter) -> Option<SimpleExpr> {
        let field_expr: SimpleExpr = Expr::col(Alias::new(&filter.field)).into();
        let field_type = self.query.schema.field_type(&filter.field).unwrap_or_default();

        match filter.operator {
            FilterOperator::FullTextMatch => {
                let value = filter.value.as_string()?;
                Some(field_expr.like(format!("%{}%", escape_like_wildcards(&value))))
            }
            FilterOperator::GreaterThan => Some(field_expr.gt(sql_value(field_type, &filter.value)?)),
            FilterOperator::GreaterOrEqual => {
                Some(field_expr.gte(sql_value(field_type, &filter.value)?))
            }
            FilterOperator::LessThan => Some(field_expr.lt(sql_value(field_type, &filter.value)?)),
            FilterOperator::LessOrEqual => {
                Some(field_expr.lte(sql_value(field_type, &filter.value)?))
            }
            FilterOperator::In => {
                let values = sql_values(field_type, &filter.value);
                if values.is_empty() {
                    // Nothing can match an empty set.
                    return Some(Expr::cust("FALSE"));
                }
                Some(field_expr.is_in(values))
            }
            FilterOperator::NotIn => {
                let values = sql_values(field_type, &filter.value);
                if values.is_empty() {
                    return None;
                }
                Some(field_expr.is_not_in(values))
            }
        }
    }

    fn add_sorts(&self, select: &mut SelectStatement) {
        for sort in &self.query.sorts {
            let order = match sort.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            select.order_by(Alias::new(&sort.field), order);
        }
    }
}

/// Bind value typed by the schema field type.
fn sql_value(field_type: FieldType, value: &FilterValue) -> Option<sea_query::Value> {
    match field_type {
        FieldType::Integer => value.as_i64().map(Into::into),
        FieldType::Float => value.as_f64().map(Into::into),
        FieldType::Boolean => match value {
            FilterValue::Boolean(b) => Some((*b).into()),
            other => other
                .as_string()
                .map(|s| matches!(s.as_str(), "1" | "true" | "yes").into()),
        },
        FieldType::Text | FieldType::Enum | FieldType::Date => value.as_string().map(Into::into),
    }
}

fn sql_values(field_type: FieldType, value: &FilterValue) -> Vec<sea_query::Value> {
    value
        .as_list()
        .iter()
        .filter_map(|v| sql_value(field_type, v))
        .collect()
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QuerySort;
    use crate::schema::Schema;

    fn query() -> Query {
        let schema = Schema::builder("user")
            .source("postgres", "socialnetwork.user")
            .filterable(&["id", "status", "firstname", "created"])
            .view("default", &["id", "firstname", "status"])
            .field_type("id", FieldType::Integer)
            .field_type("status", FieldType::Integer)
            .field_type("created", FieldType::Date)
            .build();
        let mut query = Query::new(schema, "default", "user");
        query.limit = 10;
        query
    }

    fn push(query: &mut Query, field: &str, operator: FilterOperator, value: impl Into<FilterValue>) {
        query.filters.push(QueryFilter {
            field: field.into(),
            operator,
            value: value.into(),
        });
    }

    #[test]
    fn simple_query_build() {
        let mut q = query();
        q.offset = 20;
        q.sorts.push(QuerySort {
            field: "id".into(),
            direction: SortDirection::Desc,
        });
        let sql = SqlQueryBuilder::new(&q).build();
        assert!(sql.contains("FROM \"socialnetwork\".\"user\""));
        assert!(sql.contains("\"firstname\""));
        assert!(sql.contains("ORDER BY \"id\" DESC"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("OFFSET 20"));
    }

    #[test]
    fn count_query_build() {
        let mut q = query();
        push(&mut q, "status", FilterOperator::In, vec![1_i64, 2]);
        let sql = SqlQueryBuilder::new(&q).build_count();
        assert!(sql.contains("COUNT(*)"));
        assert!(sql.contains("\"status\" IN (1, 2)"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn range_filters_typed() {
        let mut q = query();
        push(&mut q, "id", FilterOperator::GreaterOrEqual, "15");
        push(&mut q, "id", FilterOperator::LessThan, 25_i64);
        push(&mut q, "created", FilterOperator::GreaterThan, "2024-01-01");
        let sql = SqlQueryBuilder::new(&q).build();
        assert!(sql.contains("\"id\" >= 15"));
        assert!(sql.contains("\"id\" < 25"));
        assert!(sql.contains("\"created\" > '2024-01-01'"));
    }

    #[test]
    fn full_text_escapes_wildcards() {
        let mut q = query();
        push(&mut q, "firstname", FilterOperator::FullTextMatch, "50%_off");
        let sql = SqlQueryBuilder::new(&q).build();
        assert!(sql.contains("LIKE"));
        assert!(sql.contains(r"%50\\%\\_off%") || sql.contains(r"%50\%\_off%"));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let mut q = query();
        push(&mut q, "status", FilterOperator::In, FilterValue::List(Vec::new()));
        assert!(SqlQueryBuilder::new(&q).build().contains("FALSE"));
    }

    #[test]
    fn facet_drops_own_filter() {
        let mut q = query();
        push(&mut q, "status", FilterOperator::In, vec![5_i64]);
        push(&mut q, "id", FilterOperator::GreaterThan, 3_i64);
        let sql = SqlQueryBuilder::new(&q).build_facet(&Aggregation::facet("status"));
        assert!(sql.contains("GROUP BY \"status\""));
        assert!(sql.contains("ORDER BY \"count\" DESC, \"status\" ASC"));
        assert!(sql.contains("\"id\" > 3"));
        assert!(!sql.contains("IN (5)"));
        assert!(sql.contains("LIMIT 10"));
    }
}
