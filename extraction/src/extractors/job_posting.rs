use async_trait::async_trait;
use chromiumoxide::page::Page;
use scraper_common::model::RawFields;

use crate::base::{ExtractionError, Extractor};
use crate::extractors::{attr_of, insert_if_present, text_of, wants};

/// Extractor for `job_posting` targets: title, hiring company, description,
/// location, and the canonical posting URL.
pub struct JobPostingExtractor;

#[async_trait]
impl Extractor for JobPostingExtractor {
    async fn extract(
        &self,
        page: &Page,
        target_url: &str,
        requested_fields: Option<&[String]>,
    ) -> Result<RawFields, ExtractionError> {
        let mut fields = RawFields::new();

        if wants(requested_fields, "title") {
            let title = text_of(page, "h1").await.or(text_of(page, "title").await);
            insert_if_present(&mut fields, "title", title);
        }
        if wants(requested_fields, "company") {
            insert_if_present(
                &mut fields,
                "company",
                text_of(page, "[data-field='company-name'], .company-name").await,
            );
        }
        if wants(requested_fields, "description") {
            insert_if_present(
                &mut fields,
                "description",
                text_of(page, "[data-field='description'], .job-description").await,
            );
        }
        if wants(requested_fields, "location") {
            insert_if_present(
                &mut fields,
                "location",
                text_of(page, "[data-field='location'], .job-location").await,
            );
        }
        if wants(requested_fields, "posting_url") {
            let canonical = attr_of(page, "link[rel='canonical']", "href")
                .await
                .unwrap_or_else(|| target_url.to_string());
            fields.insert(
                "posting_url".to_string(),
                serde_json::Value::String(canonical),
            );
        }

        Ok(fields)
    }
}
