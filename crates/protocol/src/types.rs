//! Wire data model shared by sender and receiver.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// Fields that must be present and non-empty, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 4] = ["ingest_id", "source_url", "title", "content_html"];

/// One replicated content item as it travels on the wire.
///
/// Every field defaults so that a body missing a required field still parses;
/// [`ContentPayload::validate`] then names the first missing one. Unknown
/// fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContentPayload {
    pub ingest_id: String,
    pub source_url: String,
    pub source_hash: String,
    pub title: String,
    pub content_html: String,
    pub excerpt: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<FeaturedImage>,
    pub media_manifest: Vec<MediaItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeaturedImage {
    pub url: String,
    pub alt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Manifest entry. Accepts either `{"url": ...}` or a bare URL string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "MediaItemRepr")]
pub struct MediaItem {
    pub url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MediaItemRepr {
    Bare(String),
    Object { url: String },
}

impl From<MediaItemRepr> for MediaItem {
    fn from(repr: MediaItemRepr) -> Self {
        match repr {
            MediaItemRepr::Bare(url) | MediaItemRepr::Object { url } => Self { url },
        }
    }
}

impl MediaItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ContentPayload {
    /// Parse a raw request body and check required fields.
    pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
        let payload: Self =
            serde_json::from_slice(body).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    /// Report the first required field that is missing or blank.
    pub fn validate(&self) -> Result<(), PayloadError> {
        let values = [
            &self.ingest_id,
            &self.source_url,
            &self.title,
            &self.content_html,
        ];
        for (name, value) in REQUIRED_FIELDS.into_iter().zip(values) {
            if value.trim().is_empty() {
                return Err(PayloadError::MissingField(name));
            }
        }
        Ok(())
    }

    /// Publication date, accepting RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|n| n.and_utc())
            })
    }

    pub fn manifest_urls(&self) -> impl Iterator<Item = &str> {
        self.media_manifest.iter().map(|m| m.url.as_str())
    }
}

/// JSON body returned by the receiver for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IngestResponse {
    pub fn accepted(post_id: u64, action: &str) -> Self {
        Self {
            success: true,
            post_id: Some(post_id),
            action: Some(action.to_string()),
            error: None,
            field: None,
        }
    }

    pub fn rejected(error: &str, field: Option<&str>) -> Self {
        Self {
            success: false,
            post_id: None,
            action: None,
            error: Some(error.to_string()),
            field: field.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> ContentPayload {
        ContentPayload {
            ingest_id: "id-1".into(),
            source_url: "https://origin.example/a".into(),
            title: "Test".into(),
            content_html: "<p>hi</p>".into(),
            ..Default::default()
        }
    }

    #[test]
    fn parses_minimal_body_and_ignores_unknown_fields() {
        let body = br#"{"ingest_id":"x","source_url":"https://o/a","title":"T","content_html":"<p>b</p>","extra":1}"#;
        let payload = ContentPayload::from_slice(body).unwrap();
        assert_eq!(payload.title, "T");
        assert!(payload.media_manifest.is_empty());
    }

    #[test]
    fn reports_first_missing_field() {
        let mut payload = sample();
        payload.title = "   ".into();
        payload.content_html.clear();
        assert_eq!(payload.validate(), Err(PayloadError::MissingField("title")));

        let body = br#"{"source_url":"https://o/a"}"#;
        assert_eq!(
            ContentPayload::from_slice(body),
            Err(PayloadError::MissingField("ingest_id"))
        );
    }

    #[test]
    fn malformed_json_is_invalid_json() {
        assert!(matches!(
            ContentPayload::from_slice(b"{not json"),
            Err(PayloadError::InvalidJson(_))
        ));
        assert!(matches!(
            ContentPayload::from_slice(br#"{"title": 5}"#),
            Err(PayloadError::InvalidJson(_))
        ));
    }

    #[test]
    fn manifest_accepts_objects_and_strings() {
        let body = br#"{"media_manifest":[{"url":"https://cdn/a.jpg"},"https://cdn/b.jpg"]}"#;
        let payload: ContentPayload = serde_json::from_slice(body).unwrap();
        let urls: Vec<&str> = payload.manifest_urls().collect();
        assert_eq!(urls, ["https://cdn/a.jpg", "https://cdn/b.jpg"]);
        let encoded = serde_json::to_value(&payload.media_manifest).unwrap();
        assert_eq!(encoded[1]["url"], "https://cdn/b.jpg");
    }

    #[test]
    fn parses_both_date_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let mut payload = sample();
        payload.date = Some("2024-03-01T12:30:00Z".into());
        assert_eq!(payload.parsed_date(), Some(expected));
        payload.date = Some("2024-03-01 12:30:00".into());
        assert_eq!(payload.parsed_date(), Some(expected));
        payload.date = Some("yesterday".into());
        assert_eq!(payload.parsed_date(), None);
    }

    #[test]
    fn response_omits_empty_fields() {
        let ok = serde_json::to_value(IngestResponse::accepted(7, "created")).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "post_id": 7, "action": "created"}));
        let err = serde_json::to_value(IngestResponse::rejected("missing_field", Some("title"))).unwrap();
        assert_eq!(
            err,
            serde_json::json!({"success": false, "error": "missing_field", "field": "title"})
        );
    }
}
