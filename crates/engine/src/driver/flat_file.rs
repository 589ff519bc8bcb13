//! Flat-file driver.
//!
//! Loads `<root>/<source_name>` on every call and evaluates the query in
//! process. Supports CSV with a header row (`.csv`) and JSON lines
//! (`.jsonl`).

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::Driver;
use super::memory::evaluate;
use crate::error::{EngineError, EngineResult};
use crate::query::{Query, ScrollContext};
use crate::result::{Entity, QueryResult, RawRow, ResultBuilder};
use crate::schema::Schema;

const BACKEND: &str = "flat_file";

/// Driver reading tables from files under a root directory.
#[derive(Debug, Clone)]
pub struct FlatFileDriver {
    root: PathBuf,
}

impl FlatFileDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a source name under the root.
    ///
    /// Rejects absolute paths and `..` components.
    fn resolve(&self, source_name: &str) -> EngineResult<PathBuf> {
        let relative = Path::new(source_name);
        for component in relative.components() {
            if !matches!(component, Component::Normal(_) | Component::CurDir) {
                return Err(EngineError::DriverConfiguration(format!(
                    "source '{source_name}' must be a relative path inside the data root"
                )));
            }
        }
        Ok(self.root.join(relative))
    }

    async fn load(&self, schema: &Schema) -> EngineResult<Vec<Entity>> {
        let path = self.resolve(schema.source_name())?;
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => FileFormat::Csv,
            Some("jsonl") => FileFormat::JsonLines,
            _ => {
                return Err(EngineError::DriverConfiguration(format!(
                    "unsupported file type for '{}', expected .csv or .jsonl",
                    path.display()
                )));
            }
        };
        let content = fs::read_to_string(&path)
            .await
            .map_err(EngineError::backend(BACKEND))?;

        match format {
            FileFormat::Csv => Ok(parse_csv(&content)
                .into_iter()
                .map(|pairs| typed_text_row(schema, pairs))
                .collect()),
            FileFormat::JsonLines => content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(number, line)| {
                    let json: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                        EngineError::upstream(BACKEND, format!("line {}: {e}", number + 1))
                    })?;
                    Ok(typed_json_row(schema, &json))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FileFormat {
    Csv,
    JsonLines,
}

fn typed_text_row(schema: &Schema, pairs: Vec<(String, String)>) -> Entity {
    let mut entity = Entity::new(schema.entity_kind());
    for (field, raw) in pairs {
        let value = schema.value_from_text(&field, &raw);
        entity.insert(field, value);
    }
    entity
}

fn typed_json_row(schema: &Schema, json: &serde_json::Value) -> Entity {
    let mut entity = Entity::new(schema.entity_kind());
    if let serde_json::Value::Object(object) = json {
        for (field, raw) in object {
            entity.insert(field.as_str(), schema.value_from_json(field, raw));
        }
    }
    entity
}

/// Parse CSV text with a header row into field/value pairs per record.
///
/// Handles quoted fields with embedded separators, newlines and doubled
/// quotes. Short records are padded with empty strings.
fn parse_csv(content: &str) -> Vec<Vec<(String, String)>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = split_records(content).into_iter();
    let Some(header) = records.next() else {
        return Vec::new();
    };
    records
        .filter(|record| !(record.len() == 1 && record[0].is_empty()))
        .map(|record| {
            header
                .iter()
                .enumerate()
                .map(|(i, name)| (name.trim().to_string(), record.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

fn split_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[async_trait]
impl Driver for FlatFileDriver {
    async fn search(
        &self,
        query: &Query,
        scroll: Option<&mut ScrollContext>,
        builder: &dyn ResultBuilder,
    ) -> EngineResult<QueryResult> {
        query.validate()?;
        let rows = self.load(&query.schema).await?;

        tracing::debug!(
            source = %query.schema.source_name(),
            rows = rows.len(),
            offset = query.offset,
            limit = query.limit,
            "evaluating flat-file query"
        );

        let evaluation = evaluate(query, &rows)?;
        let page = evaluation.page.into_iter().map(RawRow::Entity).collect();
        let mut result = builder.build(page, query);
        result.count = evaluation.count;
        result.aggregations = evaluation.aggregations;

        if let Some(ctx) = scroll {
            ctx.advance(query.limit, result.count);
        }
        Ok(result)
    }
}
