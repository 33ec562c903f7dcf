//! Repeated-fragment extraction
//!
//! Every node matching the container selector becomes one record, in
//! document order. No de-duplication; zero matches is an empty page, not
//! an error.

use scraper::{Html, Selector};

use super::{extract_record, Record};
use crate::error::Result;
use crate::schema::{parse_selector, ExtractionSchema};

/// Extract one record per container match in `document`.
pub fn extract_records(
    document: &Html,
    container: &Selector,
    schema: &ExtractionSchema,
) -> Vec<Record> {
    document
        .select(container)
        .map(|fragment| extract_record(fragment, schema))
        .collect()
}

/// Parse `html` and extract one record per element matching `container_selector`
pub fn extract_records_from_html(
    html: &str,
    container_selector: &str,
    schema: &ExtractionSchema,
) -> Result<Vec<Record>> {
    let container = parse_selector(container_selector)?;
    let document = Html::parse_document(html);
    Ok(extract_records(&document, &container, schema))
}
