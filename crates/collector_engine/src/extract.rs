use std::str::FromStr;

use collector_core::Record;
use serde_json::Value;

use crate::{ParseError, RawPage};

/// Turns the raw content of one page into zero or more records.
///
/// Records must name the page they came from (`raw.page`); an empty result
/// means the page had no items, not that parsing failed.
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &RawPage) -> Result<Vec<Record>, ParseError>;
}

impl<F> Extractor for F
where
    F: Fn(&RawPage) -> Result<Vec<Record>, ParseError> + Send + Sync,
{
    fn extract(&self, raw: &RawPage) -> Result<Vec<Record>, ParseError> {
        self(raw)
    }
}

/// Maps one record field to a JSON pointer relative to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    pub pointer: String,
}

impl FieldMapping {
    pub fn new(name: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pointer: pointer.into(),
        }
    }
}

impl FromStr for FieldMapping {
    type Err = String;

    /// Parses `name=/json/pointer`; a bare `name` maps to `/name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, pointer) = match s.split_once('=') {
            Some((name, pointer)) => (name.trim(), pointer.trim().to_string()),
            None => (s.trim(), format!("/{}", s.trim())),
        };
        if name.is_empty() {
            return Err(format!("field mapping `{s}` has no name"));
        }
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(format!("pointer `{pointer}` must start with '/'"));
        }
        Ok(FieldMapping::new(name, pointer))
    }
}

/// Extracts records from JSON search responses.
///
/// `items_pointer` selects the array of result items (empty for a top-level
/// array). Every declared field is present on every record, as an empty
/// string when the item lacks it.
#[derive(Debug, Clone)]
pub struct JsonRecordExtractor {
    items_pointer: String,
    fields: Vec<FieldMapping>,
    tags_pointer: Option<String>,
}

impl JsonRecordExtractor {
    pub fn new(items_pointer: impl Into<String>, fields: Vec<FieldMapping>) -> Self {
        Self {
            items_pointer: items_pointer.into(),
            fields,
            tags_pointer: None,
        }
    }

    pub fn with_tags(mut self, tags_pointer: impl Into<String>) -> Self {
        self.tags_pointer = Some(tags_pointer.into());
        self
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

impl Extractor for JsonRecordExtractor {
    fn extract(&self, raw: &RawPage) -> Result<Vec<Record>, ParseError> {
        let text = raw.text()?;
        let document: Value = serde_json::from_str(&text)
            .map_err(|err| ParseError::new(format!("invalid json: {err}")))?;
        let items = document
            .pointer(&self.items_pointer)
            .ok_or_else(|| ParseError::new(format!("no value at `{}`", self.items_pointer)))?
            .as_array()
            .ok_or_else(|| ParseError::new(format!("`{}` is not an array", self.items_pointer)))?;

        items
            .iter()
            .map(|item| {
                let mut builder = Record::builder(raw.page, raw.fetched_at);
                for mapping in &self.fields {
                    let value = item.pointer(&mapping.pointer).map(flatten_value);
                    builder = builder.field(mapping.name.clone(), value.unwrap_or_default());
                }
                if let Some(pointer) = &self.tags_pointer {
                    builder = builder.tags(collect_tags(item.pointer(pointer)));
                }
                builder
                    .build()
                    .map_err(|err| ParseError::new(err.to_string()))
            })
            .collect()
    }
}

fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(values) => values
            .iter()
            .map(flatten_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(_) => value.to_string(),
    }
}

fn collect_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values
            .iter()
            .map(flatten_value)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            let tag = flatten_value(other);
            if tag.is_empty() {
                Vec::new()
            } else {
                vec![tag]
            }
        }
    }
}
