use async_trait::async_trait;
use chromiumoxide::page::Page;
use scraper_common::model::RawFields;

use crate::base::{ExtractionError, Extractor};
use crate::extractors::{attr_of, insert_if_present, text_of, wants};

/// Extractor for `linkedin_profile` targets: name, headline, about, current
/// company, location, and the canonical profile URL.
pub struct LinkedinProfileExtractor;

#[async_trait]
impl Extractor for LinkedinProfileExtractor {
    async fn extract(
        &self,
        page: &Page,
        target_url: &str,
        requested_fields: Option<&[String]>,
    ) -> Result<RawFields, ExtractionError> {
        let mut fields = RawFields::new();

        if wants(requested_fields, "name") {
            insert_if_present(
                &mut fields,
                "name",
                text_of(page, "h1.text-heading-xlarge").await,
            );
        }
        if wants(requested_fields, "headline") {
            insert_if_present(
                &mut fields,
                "headline",
                text_of(page, "div.text-body-medium").await,
            );
        }
        if wants(requested_fields, "about") {
            insert_if_present(
                &mut fields,
                "about",
                text_of(page, "section.summary div.inline-show-more-text").await,
            );
        }
        if wants(requested_fields, "company") {
            insert_if_present(
                &mut fields,
                "company",
                text_of(page, "section.experience li:first-child span.mr1").await,
            );
        }
        if wants(requested_fields, "location") {
            insert_if_present(
                &mut fields,
                "location",
                text_of(page, "span.text-body-small.inline").await,
            );
        }
        if wants(requested_fields, "profile_url") {
            let canonical = attr_of(page, "link[rel='canonical']", "href")
                .await
                .unwrap_or_else(|| target_url.to_string());
            fields.insert(
                "profile_url".to_string(),
                serde_json::Value::String(canonical),
            );
        }

        Ok(fields)
    }
}
