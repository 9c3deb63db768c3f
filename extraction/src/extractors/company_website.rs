use async_trait::async_trait;
use chromiumoxide::page::Page;
use scraper_common::model::RawFields;

use crate::base::{ExtractionError, Extractor};
use crate::extractors::{attr_of, insert_if_present, text_of, wants};

/// Extractor for `company_website` targets: company name, description,
/// industry, HQ location, and the canonical site URL — mostly pulled from
/// standard `<meta>` tags, since a generic company site has no fixed markup.
pub struct CompanyWebsiteExtractor;

#[async_trait]
impl Extractor for CompanyWebsiteExtractor {
    async fn extract(
        &self,
        page: &Page,
        target_url: &str,
        requested_fields: Option<&[String]>,
    ) -> Result<RawFields, ExtractionError> {
        let mut fields = RawFields::new();

        if wants(requested_fields, "name") {
            let name = attr_of(page, "meta[property='og:site_name']", "content")
                .await
                .or(text_of(page, "title").await);
            insert_if_present(&mut fields, "name", name);
        }
        if wants(requested_fields, "description") {
            let description = attr_of(page, "meta[name='description']", "content")
                .await
                .or(attr_of(page, "meta[property='og:description']", "content").await);
            insert_if_present(&mut fields, "description", description);
        }
        if wants(requested_fields, "industry") {
            insert_if_present(
                &mut fields,
                "industry",
                attr_of(page, "meta[name='industry']", "content").await,
            );
        }
        if wants(requested_fields, "location") {
            insert_if_present(
                &mut fields,
                "location",
                text_of(page, "address, [itemprop='address']").await,
            );
        }
        if wants(requested_fields, "website_url") {
            let canonical = attr_of(page, "link[rel='canonical']", "href")
                .await
                .or(attr_of(page, "meta[property='og:url']", "content").await)
                .unwrap_or_else(|| target_url.to_string());
            fields.insert(
                "website_url".to_string(),
                serde_json::Value::String(canonical),
            );
        }

        Ok(fields)
    }
}
