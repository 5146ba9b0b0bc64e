//! Operator-visible ingest history.
//!
//! Independent of `tracing`: a bounded list of JSON lines an operator can
//! inspect from the receiving site. Context maps are compacted before they
//! are stored so the history stays readable under production volume.

use std::collections::VecDeque;
use std::sync::Mutex;

use canonical::{extract_image_urls, host_list, host_of, ImageAttrs};
use chrono::{DateTime, Utc};
use protocol::ContentPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Host lists longer than this are cut and flagged with `<key>_truncated`.
pub const MAX_LOGGED_HOSTS: usize = 10;

const HOST_KEYS: [&str; 2] = ["content_image_hosts", "manifest_hosts"];

/// Keys dropped from successful entries.
const SUCCESS_DROPPED_KEYS: [&str; 5] = [
    "payload_categories",
    "normalized_categories",
    "payload_tags",
    "normalized_tags",
    "category_term_ids",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Error,
}

/// One history line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub timestamp_utc: String,
    pub status: LogStatus,
    pub message: String,
    pub context: Map<String, Value>,
}

/// Bounded, newest-last ingest history.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(
        &self,
        status: LogStatus,
        message: &str,
        context: Map<String, Value>,
        now: DateTime<Utc>,
    ) {
        let entry = LogEntry {
            timestamp_utc: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            status,
            message: message.to_string(),
            context: compact_context(status, context),
        };
        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        let mut lines = self.lines.lock().expect("event log lock poisoned");
        lines.push_back(line);
        while lines.len() > self.capacity {
            lines.pop_front();
        }
    }

    /// Raw JSON lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .expect("event log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().expect("event log lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.lines.lock().expect("event log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop noise from a context map.
///
/// Successful entries lose their term lists; host lists are cut to
/// [`MAX_LOGGED_HOSTS`]; blank strings, empty arrays and nulls are removed.
pub fn compact_context(status: LogStatus, mut context: Map<String, Value>) -> Map<String, Value> {
    if status == LogStatus::Success {
        for key in SUCCESS_DROPPED_KEYS {
            context.remove(key);
        }
    }
    for key in HOST_KEYS {
        let truncated = match context.get_mut(key) {
            Some(Value::Array(hosts)) if hosts.len() > MAX_LOGGED_HOSTS => {
                hosts.truncate(MAX_LOGGED_HOSTS);
                true
            }
            _ => false,
        };
        if truncated {
            context.insert(format!("{key}_truncated"), Value::Bool(true));
        }
    }
    context
        .into_iter()
        .filter(|(_, value)| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        })
        .collect()
}

/// Media and taxonomy summary of a payload, attached to history entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentInsight {
    pub content_bytes: usize,
    pub content_image_count: usize,
    pub content_image_hosts: Vec<String>,
    pub manifest_count: usize,
    pub manifest_hosts: Vec<String>,
    pub featured_host: String,
    pub has_featured_payload: bool,
    pub payload_category_count: usize,
    pub payload_tag_count: usize,
}

impl ContentInsight {
    pub fn of(payload: &ContentPayload) -> Self {
        let content_urls =
            extract_image_urls(&payload.content_html, ImageAttrs::All).unwrap_or_default();
        let manifest_urls: Vec<&str> = payload
            .manifest_urls()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .collect();
        let featured_url = payload
            .featured_image
            .as_ref()
            .map(|f| f.url.trim())
            .unwrap_or_default();
        Self {
            content_bytes: payload.content_html.len(),
            content_image_count: content_urls.len(),
            content_image_hosts: host_list(content_urls.iter().map(String::as_str)),
            manifest_count: manifest_urls.len(),
            manifest_hosts: host_list(manifest_urls.iter().copied()),
            featured_host: host_of(featured_url).unwrap_or_default(),
            has_featured_payload: !featured_url.is_empty(),
            payload_category_count: payload.categories.len(),
            payload_tag_count: payload.tags.len(),
        }
    }

    pub fn to_context(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use protocol::{FeaturedImage, MediaItem};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap()
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn success_entries_drop_term_lists() {
        let ctx = map(json!({
            "payload_tags": ["a"],
            "normalized_tags": ["a"],
            "category_term_ids": [1],
            "post_id": 4,
            "featured_error": "  ",
            "featured_status": null,
        }));
        let compact = compact_context(LogStatus::Success, ctx.clone());
        assert_eq!(compact, map(json!({"post_id": 4})));

        let kept = compact_context(LogStatus::Error, ctx);
        assert!(kept.contains_key("payload_tags"));
    }

    #[test]
    fn long_host_lists_are_truncated() {
        let hosts: Vec<String> = (0..12).map(|i| format!("h{i}.example")).collect();
        let compact = compact_context(
            LogStatus::Error,
            map(json!({"manifest_hosts": hosts, "content_image_hosts": []})),
        );
        assert_eq!(compact["manifest_hosts"].as_array().unwrap().len(), 10);
        assert_eq!(compact["manifest_hosts_truncated"], json!(true));
        assert!(!compact.contains_key("content_image_hosts"));
    }

    #[test]
    fn history_is_capped() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.record(LogStatus::Error, &format!("m{i}"), Map::new(), now());
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "m2");
        assert_eq!(entries[2].timestamp_utc, "2024-07-04 12:00:00");
    }

    #[test]
    fn insight_summarises_media() {
        let payload = ContentPayload {
            content_html: r#"<img src="https://a.example/1.jpg"><img data-src="https://b.example/2.jpg">"#
                .into(),
            featured_image: Some(FeaturedImage {
                url: "https://F.example/f.jpg".into(),
                ..Default::default()
            }),
            media_manifest: vec![
                MediaItem::new("https://a.example/1.jpg"),
                MediaItem::new("https://a.example/3.jpg"),
            ],
            tags: vec!["x".into()],
            ..Default::default()
        };
        let insight = ContentInsight::of(&payload);
        assert_eq!(insight.content_image_count, 2);
        assert_eq!(insight.content_image_hosts, ["a.example", "b.example"]);
        assert_eq!(insight.manifest_count, 2);
        assert_eq!(insight.manifest_hosts, ["a.example"]);
        assert_eq!(insight.featured_host, "f.example");
        assert!(insight.has_featured_payload);
        assert_eq!(insight.payload_tag_count, 1);
    }
}
