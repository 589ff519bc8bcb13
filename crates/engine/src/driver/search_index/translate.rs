//! Filter translation into the RediSearch query language.
//!
//! Per filter:
//! - full text: `@field:value`
//! - `>` / `>=`: `@field:[(v +inf]` / `@field:[v +inf]`
//! - `<` / `<=`: `@field:[-inf (v]` / `@field:[-inf v]`
//! - `In`: `@field:{a|b}`
//! - `NotIn`: `-@field:{a|b}`, emitted after every other clause
//!
//! Numbers are rendered with six decimals. No filters compiles to `*`.

use crate::error::{EngineError, EngineResult};
use crate::query::{FilterOperator, FilterValue, Query, QueryFilter};
use crate::schema::{FieldType, Schema};

/// Query matching every document.
pub const MATCH_ALL: &str = "*";

/// Characters escaped with a backslash. `|` is left alone.
const RESERVED: &[char] = &['-', '@', ':', '(', ')', '{', '}', '%'];

/// Escape reserved query-language characters in a field name or value.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reject filters the index cannot evaluate.
///
/// The field must be filterable, range operators need a numeric field and
/// set operators need an enum (tag) field.
pub fn assert_filterable(schema: &Schema, filter: &QueryFilter) -> EngineResult<()> {
    if !schema.is_filterable(&filter.field) {
        return Err(EngineError::schema_violation(
            &filter.field,
            "field is not filterable",
        ));
    }
    let field_type = schema.field_type(&filter.field).unwrap_or_default();
    if filter.operator.is_range() {
        if !field_type.is_numeric() {
            return Err(EngineError::schema_violation(
                &filter.field,
                "range filters can only be applied to numeric fields",
            ));
        }
        if filter.value.as_f64().is_none() {
            return Err(EngineError::schema_violation(
                &filter.field,
                "range filter value must be numeric",
            ));
        }
    } else if filter.operator.is_set() && field_type != FieldType::Enum {
        return Err(EngineError::schema_violation(
            &filter.field,
            "tag filters can only be applied to enum fields",
        ));
    }
    Ok(())
}

/// Compile every filter of `query`. Validates all filters before rendering.
pub fn compile_filters(query: &Query) -> EngineResult<String> {
    for filter in &query.filters {
        assert_filterable(&query.schema, filter)?;
    }
    if query.filters.is_empty() {
        return Ok(MATCH_ALL.to_string());
    }

    let mut search = Vec::new();
    let mut not_in = Vec::new();
    for filter in &query.filters {
        let field = escape(&filter.field);
        match filter.operator {
            FilterOperator::FullTextMatch => {
                let value = filter.value.as_string().unwrap_or_default();
                search.push(format!("@{field}:{}", escape(&value)));
            }
            FilterOperator::GreaterThan => {
                search.push(format!("@{field}:[({} +inf]", number(&filter.value)));
            }
            FilterOperator::GreaterOrEqual => {
                search.push(format!("@{field}:[{} +inf]", number(&filter.value)));
            }
            FilterOperator::LessThan => {
                search.push(format!("@{field}:[-inf ({}]", number(&filter.value)));
            }
            FilterOperator::LessOrEqual => {
                search.push(format!("@{field}:[-inf {}]", number(&filter.value)));
            }
            FilterOperator::In => {
                search.push(format!("@{field}:{{{}}}", tags(&filter.value)));
            }
            FilterOperator::NotIn => {
                not_in.push(format!("-@{field}:{{{}}}", tags(&filter.value)));
            }
        }
    }

    let compiled = format!("{} {}", search.join(" "), not_in.join(" "));
    Ok(compiled.trim().to_string())
}

fn number(value: &FilterValue) -> String {
    format!("{:.6}", value.as_f64().unwrap_or_default())
}

fn tags(value: &FilterValue) -> String {
    value
        .as_list()
        .iter()
        .filter_map(FilterValue::as_string)
        .map(|tag| escape(&tag))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn query() -> Query {
        let schema = Schema::builder("product")
            .filterable(&["price", "status", "name", "tags"])
            .view("default", &["id", "name", "price", "status"])
            .field_type("price", FieldType::Float)
            .field_type("status", FieldType::Enum)
            .field_type("tags", FieldType::Text)
            .build();
        Query::new(schema, "default", "products")
    }

    fn push(query: &mut Query, field: &str, operator: FilterOperator, value: impl Into<FilterValue>) {
        query.filters.push(QueryFilter {
            field: field.into(),
            operator,
            value: value.into(),
        });
    }

    #[test]
    fn no_filters_match_all() {
        assert_eq!(compile_filters(&query()).unwrap(), "*");
    }

    #[test]
    fn range_bounds() {
        let mut q = query();
        push(&mut q, "price", FilterOperator::GreaterThan, 1_i64);
        push(&mut q, "price", FilterOperator::LessOrEqual, 2.5);
        assert_eq!(
            compile_filters(&q).unwrap(),
            "@price:[(1.000000 +inf] @price:[-inf 2.500000]"
        );
    }

    #[test]
    fn not_in_goes_last() {
        let mut q = query();
        push(&mut q, "status", FilterOperator::NotIn, vec!["draft"]);
        push(&mut q, "status", FilterOperator::In, vec!["new", "paid"]);
        push(&mut q, "name", FilterOperator::FullTextMatch, "lamp");
        assert_eq!(
            compile_filters(&q).unwrap(),
            "@status:{new|paid} @name:lamp -@status:{draft}"
        );
    }

    #[test]
    fn only_not_in_is_trimmed() {
        let mut q = query();
        push(&mut q, "status", FilterOperator::NotIn, "draft");
        assert_eq!(compile_filters(&q).unwrap(), "-@status:{draft}");
    }

    #[test]
    fn escapes_reserved_but_not_pipe() {
        assert_eq!(escape("a-b@c:d(e)f{g}h%i|j"), r"a\-b\@c\:d\(e\)f\{g\}h\%i|j");
    }

    #[test]
    fn tag_values_escaped() {
        let mut q = query();
        push(&mut q, "status", FilterOperator::In, vec!["in-progress"]);
        assert_eq!(compile_filters(&q).unwrap(), r"@status:{in\-progress}");
    }

    #[test]
    fn set_filter_on_text_rejected() {
        let mut q = query();
        push(&mut q, "tags", FilterOperator::In, vec!["a"]);
        let err = compile_filters(&q).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { ref field, .. } if field == "tags"));
    }

    #[test]
    fn range_on_enum_rejected() {
        let mut q = query();
        push(&mut q, "status", FilterOperator::GreaterThan, 1_i64);
        assert!(compile_filters(&q).unwrap_err().is_schema_violation());
    }

    #[test]
    fn unfilterable_rejected_before_render() {
        let mut q = query();
        push(&mut q, "name", FilterOperator::FullTextMatch, "ok");
        push(&mut q, "id", FilterOperator::FullTextMatch, "1");
        assert!(compile_filters(&q).is_err());
    }
}
