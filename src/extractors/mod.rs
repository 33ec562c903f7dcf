//! Selector-driven record extraction
//!
//! `field_extractor` maps one DOM fragment to one [`Record`];
//! `record_set` applies it to every fragment matching a container selector.

mod field_extractor;
mod record_set;

pub use field_extractor::*;
pub use record_set::*;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Value recorded for a field whose selector matched nothing usable.
pub const SENTINEL: &str = "N/A";

/// One extracted listing: field name -> value, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, String>);

impl Record {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self(IndexMap::with_capacity(capacity))
    }

    pub(crate) fn insert(&mut self, name: &str, value: String) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
