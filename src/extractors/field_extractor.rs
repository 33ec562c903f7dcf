//! Single-fragment extraction
//!
//! Absence is data: a field whose selector matches nothing, or whose value is
//! blank, gets the field's sentinel. Nothing here returns an error.

use scraper::{ElementRef, Html};

use super::Record;
use crate::schema::{Accessor, Cardinality, ExtractionSchema, FieldRule};

/// Extract one record from a fragment. Keys are exactly the schema's field names.
pub fn extract_record(fragment: ElementRef<'_>, schema: &ExtractionSchema) -> Record {
    let mut record = Record::with_capacity(schema.len());

    for field in schema.fields() {
        let value = match field.cardinality() {
            Cardinality::First => first_value(fragment, field),
            Cardinality::JoinAll { separator } => joined_value(fragment, field, separator),
        };
        record.insert(
            field.name(),
            value.unwrap_or_else(|| field.sentinel().to_string()),
        );
    }

    record
}

/// Extract one record from a standalone HTML fragment
pub fn extract_record_from_html(fragment_html: &str, schema: &ExtractionSchema) -> Record {
    let fragment = Html::parse_fragment(fragment_html);
    extract_record(fragment.root_element(), schema)
}

fn first_value(fragment: ElementRef<'_>, field: &FieldRule) -> Option<String> {
    let element = fragment.select(field.selector()).next()?;
    read_value(element, field.accessor())
}

/// Every match contributes, in document order; a blank match stands in as
/// the sentinel. `None` only when nothing matched.
fn joined_value(fragment: ElementRef<'_>, field: &FieldRule, separator: &str) -> Option<String> {
    let values: Vec<String> = fragment
        .select(field.selector())
        .map(|el| {
            read_value(el, field.accessor()).unwrap_or_else(|| field.sentinel().to_string())
        })
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(separator))
    }
}

/// Read an element according to the accessor. `None` when blank.
fn read_value(element: ElementRef<'_>, accessor: &Accessor) -> Option<String> {
    match accessor {
        Accessor::Text => {
            let text = element.text().collect::<String>();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Accessor::Html => {
            let html = element.inner_html();
            (!html.trim().is_empty()).then_some(html)
        }
        // Attributes are kept verbatim; whitespace-only counts as missing
        Accessor::Attr(name) => element
            .value()
            .attr(name)
            .filter(|v| !v.trim().is_empty())
            .map(String::from),
    }
}
