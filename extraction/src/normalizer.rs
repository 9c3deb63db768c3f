//! Cleans a raw extracted field map into the normalized, schema-validated
//! output returned to callers: HTML stripping, whitespace collapse, URL
//! canonicalization and tracking-parameter removal, and location splitting,
//! followed by a validate-or-partial pass.

use once_cell::sync::Lazy;
use scraper::Html;
use scraper_common::model::{NormalizedLocation, RawFields, TargetType};
use serde_json::{Map, Value};
use url::Url;

use crate::schemas::{schema_for, FieldKind};

/// Fixed tracking-parameter names dropped in addition to any `utm_*` key.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_eid", "igshid", "yclid", "mkt_tok", "_ga", "_gl",
];

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Strips HTML tags and collapses whitespace runs to a single space,
/// trimming the result. Parsing as an HTML fragment (rather than a regex
/// tag-strip) means malformed/unbalanced markup degrades to its visible
/// text instead of corrupting the output.
pub fn strip_html(input: &str) -> String {
    let fragment = Html::parse_fragment(input);
    let text: String = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&text)
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ensures scheme `https` (scheme-relative `//host/...` is treated as
/// `https`), drops tracking query parameters and the fragment. Returns
/// `None` if `raw` does not parse as a URL at all, or uses a scheme other
/// than `http`/`https`.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let candidate = if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        raw.to_string()
    };

    let mut url = Url::parse(&candidate).ok()?;
    match url.scheme() {
        "http" => {
            url.set_scheme("https").ok()?;
        }
        "https" => {}
        _ => return None,
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.set_query(None);
    if !kept.is_empty() {
        let mut serializer = url.query_pairs_mut();
        for (key, value) in &kept {
            serializer.append_pair(key, value);
        }
    }
    url.set_fragment(None);

    Some(url.to_string())
}

/// Splits the HTML-stripped, whitespace-collapsed form of `raw` on commas:
/// one piece is city only, two is city+country, three or more is
/// city/state_region/country with any remainder dropped. `raw` preserves
/// the original, pre-cleaning input verbatim.
pub fn parse_location(raw: &str) -> NormalizedLocation {
    let cleaned = strip_html(raw);
    let parts: Vec<&str> = cleaned
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let (city, state_region, country) = match parts.len() {
        0 => (None, None, None),
        1 => (Some(parts[0].to_string()), None, None),
        2 => (Some(parts[0].to_string()), None, Some(parts[1].to_string())),
        _ => (
            Some(parts[0].to_string()),
            Some(parts[1].to_string()),
            Some(parts[2].to_string()),
        ),
    };

    NormalizedLocation {
        city,
        state_region,
        country,
        raw: raw.to_string(),
    }
}

/// Cleans one raw value according to its field kind. Returns `None` when
/// the value cannot be validated in that shape — currently only possible
/// for a [`FieldKind::Url`] whose raw text is not a valid `http(s)` URL, or
/// any field whose raw JSON value is not a string.
fn normalize_field(kind: FieldKind, raw_value: &Value) -> Option<Value> {
    let text = raw_value.as_str()?;
    match kind {
        FieldKind::Text => Some(Value::String(strip_html(text))),
        FieldKind::Url => canonicalize_url(text).map(Value::String),
        FieldKind::Location => {
            let location = parse_location(text);
            Some(serde_json::to_value(location).expect("NormalizedLocation always serializes"))
        }
    }
}

static EMPTY_FIELDS: Lazy<Vec<String>> = Lazy::new(Vec::new);

/// Normalizes `raw` against `target_type`'s schema. When `requested_fields`
/// is `Some` and non-empty, only those field names are considered; fields
/// that fail their kind-specific validation are silently dropped rather
/// than failing the whole result — the returned map is guaranteed to
/// validate because every field it contains already did, in isolation.
pub fn normalize(
    raw: &RawFields,
    target_type: TargetType,
    requested_fields: Option<&[String]>,
) -> Value {
    let wanted = requested_fields.filter(|f| !f.is_empty()).unwrap_or(&EMPTY_FIELDS);

    let mut result = Map::new();
    let mut dropped = Vec::new();

    for spec in schema_for(target_type) {
        if !wanted.is_empty() && !wanted.iter().any(|f| f == spec.name) {
            continue;
        }
        let Some(raw_value) = raw.get(spec.name) else {
            continue;
        };
        match normalize_field(spec.kind, raw_value) {
            Some(normalized) => {
                result.insert(spec.name.to_string(), normalized);
            }
            None => dropped.push(spec.name),
        }
    }

    if !dropped.is_empty() {
        tracing::warn!(?target_type, ?dropped, "partial result: some fields failed validation");
    }

    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_html_and_collapses_whitespace() {
        assert_eq!(strip_html("<b>Ada</b>   Lovelace"), "Ada Lovelace");
    }

    #[test]
    fn canonicalizes_scheme_relative_and_strips_tracking_params() {
        let cleaned = canonicalize_url("http://example.com/p?utm_source=x&id=1#frag").unwrap();
        assert_eq!(cleaned, "https://example.com/p?id=1");
        let relative = canonicalize_url("//example.com/p").unwrap();
        assert_eq!(relative, "https://example.com/p");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(canonicalize_url("ftp://example.com/file").is_none());
    }

    #[test]
    fn splits_location_by_comma_count() {
        assert_eq!(parse_location("London").city.as_deref(), Some("London"));
        let two = parse_location("London, UK");
        assert_eq!(two.city.as_deref(), Some("London"));
        assert_eq!(two.country.as_deref(), Some("UK"));
        assert!(two.state_region.is_none());
        let three = parse_location("Austin, Texas, USA");
        assert_eq!(three.state_region.as_deref(), Some("Texas"));
        assert_eq!(three.country.as_deref(), Some("USA"));
    }

    #[test]
    fn location_raw_preserves_original_input() {
        let loc = parse_location("<b>London</b>, UK");
        assert_eq!(loc.raw, "<b>London</b>, UK");
    }

    #[test]
    fn full_pipeline_normalizes_linkedin_profile() {
        let mut raw = RawFields::new();
        raw.insert("name".into(), json!("<b>Ada</b>"));
        raw.insert("location".into(), json!("London, UK"));
        raw.insert(
            "profile_url".into(),
            json!("http://example.com/p?utm_source=x"),
        );

        let normalized = normalize(&raw, TargetType::LinkedinProfile, None);
        assert_eq!(normalized["name"], json!("Ada"));
        assert_eq!(normalized["location"]["city"], json!("London"));
        assert_eq!(normalized["location"]["country"], json!("UK"));
        assert_eq!(normalized["profile_url"], json!("https://example.com/p"));
    }

    #[test]
    fn invalid_url_field_is_dropped_not_fatal() {
        let mut raw = RawFields::new();
        raw.insert("name".into(), json!("Ada"));
        raw.insert("profile_url".into(), json!("not a url"));

        let normalized = normalize(&raw, TargetType::LinkedinProfile, None);
        assert_eq!(normalized["name"], json!("Ada"));
        assert!(normalized.get("profile_url").is_none());
    }

    #[test]
    fn requested_fields_narrows_output() {
        let mut raw = RawFields::new();
        raw.insert("name".into(), json!("Ada"));
        raw.insert("headline".into(), json!("Engineer"));

        let normalized = normalize(
            &raw,
            TargetType::LinkedinProfile,
            Some(&["name".to_string()]),
        );
        assert_eq!(normalized["name"], json!("Ada"));
        assert!(normalized.get("headline").is_none());
    }
}
