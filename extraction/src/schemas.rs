//! Per-target-type output schemas. Every field is optional — the schema
//! exists to drive normalization (which cleanup rule applies to a field)
//! and partial-result validation, not to reject incomplete pages.

use scraper_common::model::TargetType;

/// How a raw string field is cleaned and shaped by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// HTML-stripped, whitespace-collapsed, trimmed text.
    Text,
    /// Canonicalized to `https`, tracking parameters and fragment dropped.
    Url,
    /// Comma-split into `{city, state_region, country, raw}`.
    Location,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The field list for one target type, in schema-declaration order.
pub fn schema_for(target_type: TargetType) -> &'static [FieldSpec] {
    match target_type {
        TargetType::LinkedinProfile => &[
            FieldSpec { name: "name", kind: FieldKind::Text },
            FieldSpec { name: "headline", kind: FieldKind::Text },
            FieldSpec { name: "about", kind: FieldKind::Text },
            FieldSpec { name: "company", kind: FieldKind::Text },
            FieldSpec { name: "location", kind: FieldKind::Location },
            FieldSpec { name: "profile_url", kind: FieldKind::Url },
        ],
        TargetType::CompanyWebsite => &[
            FieldSpec { name: "name", kind: FieldKind::Text },
            FieldSpec { name: "description", kind: FieldKind::Text },
            FieldSpec { name: "industry", kind: FieldKind::Text },
            FieldSpec { name: "location", kind: FieldKind::Location },
            FieldSpec { name: "website_url", kind: FieldKind::Url },
        ],
        TargetType::JobPosting => &[
            FieldSpec { name: "title", kind: FieldKind::Text },
            FieldSpec { name: "company", kind: FieldKind::Text },
            FieldSpec { name: "description", kind: FieldKind::Text },
            FieldSpec { name: "location", kind: FieldKind::Location },
            FieldSpec { name: "posting_url", kind: FieldKind::Url },
        ],
    }
}
