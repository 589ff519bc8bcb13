//! Field type taxonomy and value conversion.

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Integer,
    Float,
    /// Enumerable tag value.
    Enum,
    /// ISO-8601 date or datetime, compared lexicographically.
    Date,
    Boolean,
}

/// Types accepted by range filters.
pub const NUMERIC_TYPES: &[FieldType] = &[FieldType::Integer, FieldType::Float];

/// Types accepted by set filters on tag-indexed backends.
pub const ENUMERABLE_TYPES: &[FieldType] = &[FieldType::Enum];

impl FieldType {
    pub fn is_numeric(self) -> bool {
        NUMERIC_TYPES.contains(&self)
    }

    pub fn is_enumerable(self) -> bool {
        ENUMERABLE_TYPES.contains(&self)
    }

    /// Whether values of this type have a meaningful order for range filters
    /// on backends that compare in-process.
    pub fn is_ordered(self) -> bool {
        self.is_numeric() || self == FieldType::Date
    }

    /// Convert backend text into a tagged value.
    ///
    /// Unparseable numbers become `Null` rather than failing the row.
    pub fn parse_raw(self, raw: &str) -> Value {
        match self {
            FieldType::Integer => {
                let trimmed = raw.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| {
                        trimmed
                            .parse::<f64>()
                            .ok()
                            .filter(|f| f.fract() == 0.0)
                            .map(|f| f as i64)
                    })
                    .map_or(Value::Null, Value::Integer)
            }
            FieldType::Float => raw
                .trim()
                .parse::<f64>()
                .map_or(Value::Null, Value::Float),
            FieldType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Value::Bool(true),
                "0" | "false" | "no" | "" => Value::Bool(false),
                _ => Value::Null,
            },
            FieldType::Text | FieldType::Enum | FieldType::Date => Value::Text(raw.to_string()),
        }
    }

    /// Convert a JSON value into a tagged value.
    pub fn parse_json(self, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::String(s) => self.parse_raw(s),
            serde_json::Value::Bool(b) => match self {
                FieldType::Boolean => Value::Bool(*b),
                _ => self.parse_raw(&b.to_string()),
            },
            serde_json::Value::Number(n) => match self {
                FieldType::Integer => n
                    .as_i64()
                    .map(Value::Integer)
                    .unwrap_or_else(|| self.parse_raw(&n.to_string())),
                FieldType::Float => n.as_f64().map_or(Value::Null, Value::Float),
                FieldType::Boolean => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
                _ => Value::Text(n.to_string()),
            },
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(|item| self.parse_json(item)).collect())
            }
            serde_json::Value::Object(_) => Value::Text(json.to_string()),
        }
    }
}

/// Per-field conversion applied to raw backend values before typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransformer {
    /// Split a delimited string (`"1,2"`) into a list of typed items.
    Delimited(char),
}

impl FieldTransformer {
    pub fn apply(self, field_type: FieldType, raw: &str) -> Value {
        match self {
            FieldTransformer::Delimited(separator) => Value::List(
                raw.split(separator)
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| field_type.parse_raw(part))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn numeric_subset() {
        assert!(FieldType::Integer.is_numeric());
        assert!(FieldType::Float.is_numeric());
        assert!(!FieldType::Enum.is_numeric());
        assert!(FieldType::Enum.is_enumerable());
        assert!(!FieldType::Text.is_enumerable());
    }

    #[test]
    fn parse_raw_integer() {
        assert_eq!(FieldType::Integer.parse_raw("42"), Value::Integer(42));
        assert_eq!(FieldType::Integer.parse_raw("42.0"), Value::Integer(42));
        assert_eq!(FieldType::Integer.parse_raw("abc"), Value::Null);
    }

    #[test]
    fn parse_json_respects_type() {
        let json = serde_json::json!("12.5");
        assert_eq!(FieldType::Float.parse_json(&json), Value::Float(12.5));
        let json = serde_json::json!(7);
        assert_eq!(FieldType::Text.parse_json(&json), Value::Text("7".into()));
    }

    #[test]
    fn delimited_transformer_types_items() {
        let value = FieldTransformer::Delimited(',').apply(FieldType::Integer, "1, 2,,3");
        assert_eq!(value, Value::from(vec![1_i64, 2, 3]));
    }

    #[test]
    fn field_type_serialization() {
        let json = serde_json::to_string(&FieldType::Enum).unwrap();
        assert_eq!(json, "\"enum\"");
    }
}
