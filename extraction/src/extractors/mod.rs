//! Concrete [`Extractor`][crate::base::Extractor] implementations. The
//! per-site CSS/XPath selector tables are out of scope (spec §1) — these use
//! a small, fixed selector set per target type rather than a real per-domain
//! table.

pub mod company_website;
pub mod job_posting;
pub mod linkedin;

use chromiumoxide::page::Page;
use scraper_common::model::RawFields;
use serde_json::Value;

/// Best-effort text content of the first element matching `selector`.
/// Missing elements and query errors both fold to `None` — a field simply
/// isn't present rather than failing the whole extraction, since every
/// schema field is optional.
pub(crate) async fn text_of(page: &Page, selector: &str) -> Option<String> {
    let element = page.find_element(selector).await.ok()?;
    element.inner_text().await.ok().flatten()
}

/// Best-effort value of `attr` on the first element matching `selector`.
pub(crate) async fn attr_of(page: &Page, selector: &str, attr: &str) -> Option<String> {
    let element = page.find_element(selector).await.ok()?;
    element.attribute(attr).await.ok().flatten()
}

pub(crate) fn wants(requested_fields: Option<&[String]>, field: &str) -> bool {
    match requested_fields {
        Some(fields) if !fields.is_empty() => fields.iter().any(|f| f == field),
        _ => true,
    }
}

pub(crate) fn insert_if_present(fields: &mut RawFields, name: &str, value: Option<String>) {
    if let Some(value) = value {
        fields.insert(name.to_string(), Value::String(value));
    }
}
