//! Declarative field-extraction schema
//!
//! A schema is an ordered list of fields. Each field names a CSS selector
//! (evaluated inside one repeated fragment), an accessor telling what to
//! read from the matched element, and whether only the first match is used
//! or every match is joined into one delimited string.
//!
//! Accessor syntax:
//! `text` (default), `html`, or `attr:<name>`.

use std::collections::HashSet;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};
use crate::extractors::SENTINEL;

/// Raw, serializable description of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output key in the record
    pub name: String,
    /// CSS selector, relative to the fragment
    pub selector: String,
    /// `text`, `html` or `attr:<name>`
    #[serde(default = "default_accessor")]
    pub accessor: String,
    /// When set, every match is read and the values joined with this separator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
    /// Value used when nothing usable was found (defaults to "N/A")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel: Option<String>,
}

fn default_accessor() -> String {
    "text".to_string()
}

impl FieldSpec {
    /// Read the trimmed text content of the first match.
    pub fn text(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            accessor: default_accessor(),
            join: None,
            sentinel: None,
        }
    }

    /// Read an attribute of the first match, verbatim.
    pub fn attr(
        name: impl Into<String>,
        selector: impl Into<String>,
        attr: impl AsRef<str>,
    ) -> Self {
        Self {
            accessor: format!("attr:{}", attr.as_ref()),
            ..Self::text(name, selector)
        }
    }

    /// Read every match and join the values.
    pub fn joined(mut self, separator: impl Into<String>) -> Self {
        self.join = Some(separator.into());
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = Some(sentinel.into());
        self
    }
}

/// What to read from a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Text content, trimmed
    Text,
    /// Inner HTML
    Html,
    /// Named attribute, verbatim
    Attr(String),
}

impl Accessor {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "" | "text" => Ok(Accessor::Text),
            "html" => Ok(Accessor::Html),
            other => match other.strip_prefix("attr:") {
                Some(name) if !name.trim().is_empty() => Ok(Accessor::Attr(name.trim().to_string())),
                _ => Err(ScrapeError::InvalidSchema(format!(
                    "unknown accessor `{}` (expected text, html or attr:<name>)",
                    raw
                ))),
            },
        }
    }
}

/// How many matches contribute to the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    First,
    JoinAll { separator: String },
}

/// One compiled field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    name: String,
    selector: Selector,
    accessor: Accessor,
    cardinality: Cardinality,
    sentinel: String,
}

impl FieldRule {
    fn compile(spec: &FieldSpec) -> Result<Self> {
        Ok(Self {
            name: spec.name.clone(),
            selector: parse_selector(&spec.selector)?,
            accessor: Accessor::parse(&spec.accessor)?,
            cardinality: match &spec.join {
                Some(separator) => Cardinality::JoinAll {
                    separator: separator.clone(),
                },
                None => Cardinality::First,
            },
            sentinel: spec.sentinel.clone().unwrap_or_else(|| SENTINEL.to_string()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn accessor(&self) -> &Accessor {
        &self.accessor
    }

    pub fn cardinality(&self) -> &Cardinality {
        &self.cardinality
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }
}

/// Ordered, immutable set of compiled fields with unique names.
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    fields: Vec<FieldRule>,
}

impl ExtractionSchema {
    /// Compile a schema, rejecting empty or duplicate names and bad selectors.
    pub fn new(specs: &[FieldSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(ScrapeError::InvalidSchema("schema has no fields".into()));
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.name.trim().is_empty() {
                return Err(ScrapeError::InvalidSchema("field name is empty".into()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ScrapeError::InvalidSchema(format!(
                    "duplicate field name `{}`",
                    spec.name
                )));
            }
            fields.push(FieldRule::compile(spec)?);
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name())
    }
}

/// Five-field business listing: name, website, email, phones, address.
pub fn business_directory_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::text("companyName", "h2.article--title"),
        FieldSpec::attr("website", "a[data-type='company--website']", "href"),
        FieldSpec::text("email", ".company--emails a"),
        FieldSpec::text("phones", ".company--phones a[href^='tel:']").joined(", "),
        FieldSpec::text("address", ".company--address"),
    ]
}

/// Business listing plus location, description and category.
pub fn business_directory_extended_fields() -> Vec<FieldSpec> {
    let mut fields = business_directory_fields();
    fields.extend([
        FieldSpec::text("location", ".company--location"),
        FieldSpec::text("description", ".company--description"),
        FieldSpec::text("category", ".company--category"),
    ]);
    fields
}

/// Parse a CSS selector, keeping the source text in the error.
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}
