//! The extractor contract. Per spec §9, target-type dispatch is a tagged
//! variant keyed by [`TargetType`], not open-class polymorphism — the trait
//! below is deliberately narrow: one entry point, one error type.

use async_trait::async_trait;
use chromiumoxide::page::Page;
use scraper_common::model::RawFields;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
}

/// Implemented once per [`TargetType`][crate::TargetType]. `extract` is
/// handed an already-navigated page (navigation is the executor's job, not
/// the extractor's) and returns the raw, un-normalized field map; the
/// caller normalizes it against the target schema afterward.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// `requested_fields`, when present, names the subset of the schema the
    /// caller wants; an empty or absent list means "all fields". Extractors
    /// may use this to skip expensive DOM queries for fields nobody asked
    /// for, but are not required to — the normalizer drops anything outside
    /// the requested set regardless.
    async fn extract(
        &self,
        page: &Page,
        target_url: &str,
        requested_fields: Option<&[String]>,
    ) -> Result<RawFields, ExtractionError>;
}
