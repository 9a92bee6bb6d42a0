use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PageIndex;

/// Field names owned by the record itself; extractors may not use them.
pub const RESERVED_FIELDS: &[&str] = &["source_page", "collected_at", "tags"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("field name `{0}` is reserved")]
    ReservedField(String),
    #[error("field name must not be empty")]
    EmptyFieldName,
}

/// One extracted item.
///
/// Records are immutable once built: domain fields are plain strings keyed by
/// name, `tags` is a free-form set, and the provenance fields say which page
/// produced the record and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    source_page: PageIndex,
    collected_at: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn builder(source_page: PageIndex, collected_at: DateTime<Utc>) -> RecordBuilder {
        RecordBuilder {
            source_page,
            collected_at,
            tags: Vec::new(),
            fields: BTreeMap::new(),
            error: None,
        }
    }

    pub fn source_page(&self) -> PageIndex {
        self.source_page
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Field value; absent fields read as `None`, empty ones as `Some("")`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns a copy that carries every name in `names`, missing ones as
    /// empty strings, so records of one run share a tabular shape.
    pub fn conformed_to<S: AsRef<str>>(&self, names: &[S]) -> Record {
        let mut fields = self.fields.clone();
        for name in names {
            let name = name.as_ref();
            if !RESERVED_FIELDS.contains(&name) {
                fields.entry(name.to_string()).or_default();
            }
        }
        Record {
            fields,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordBuilder {
    source_page: PageIndex,
    collected_at: DateTime<Utc>,
    tags: Vec<String>,
    fields: BTreeMap<String, String>,
    error: Option<RecordError>,
}

impl RecordBuilder {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if self.error.is_none() {
            if name.is_empty() {
                self.error = Some(RecordError::EmptyFieldName);
            } else if RESERVED_FIELDS.contains(&name.as_str()) {
                self.error = Some(RecordError::ReservedField(name));
            } else {
                self.fields.insert(name, value.into());
            }
        }
        self
    }

    /// Declares a field with no value; it is stored as an empty string.
    pub fn empty_field(self, name: impl Into<String>) -> Self {
        self.field(name, String::new())
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn tags<I, T>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        tags.into_iter().fold(self, |builder, tag| builder.tag(tag))
    }

    pub fn build(self) -> Result<Record, RecordError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Record {
            source_page: self.source_page,
            collected_at: self.collected_at,
            tags: self.tags,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn reserved_names_are_rejected() {
        let err = Record::builder(PageIndex::FIRST, at())
            .field("source_page", "x")
            .build()
            .unwrap_err();
        assert_eq!(err, RecordError::ReservedField("source_page".into()));
    }

    #[test]
    fn tags_are_a_set() {
        let record = Record::builder(PageIndex::FIRST, at())
            .tags(["a", "b", "a"])
            .build()
            .unwrap();
        assert_eq!(record.tags(), ["a", "b"]);
    }

    #[test]
    fn conforming_fills_missing_fields_with_empty_values() {
        let record = Record::builder(PageIndex::FIRST, at())
            .field("title", "T")
            .build()
            .unwrap();
        let shaped = record.conformed_to(&["title", "abstract"]);
        assert_eq!(shaped.field("title"), Some("T"));
        assert_eq!(shaped.field("abstract"), Some(""));
        assert_eq!(record.field("abstract"), None);
    }
}
