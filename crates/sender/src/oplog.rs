//! Operator-facing sender history.
//!
//! Three things are kept for whoever runs the sending node: the result of
//! the last push, a rolling list of debug lines and a rolling list of
//! payload snapshots. Snapshots are trimmed so that a large article or a
//! long media manifest cannot flood the history, and author emails are
//! masked.

use std::collections::VecDeque;
use std::sync::Mutex;

use canonical::sanitize_text;
use chrono::{DateTime, Utc};
use protocol::ContentPayload;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::source::ContentId;

pub const MAX_DEBUG_LINES: usize = 200;
pub const MAX_SNAPSHOTS: usize = 30;
/// Bytes of `content_html` kept in a snapshot.
pub const SNAPSHOT_CONTENT_LIMIT: usize = 12_000;
/// Manifest entries kept in a snapshot.
pub const SNAPSHOT_MANIFEST_LIMIT: usize = 80;

const CONTENT_TRUNCATED_MARKER: &str = "\n<!-- bridge:content_truncated -->";
const MANIFEST_TRUNCATED_KEY: &str = "_bridge_media_manifest_truncated";

/// One recorded payload, as it would have gone on the wire (after trimming).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadSnapshot {
    pub timestamp_utc: String,
    pub context: String,
    pub content_id: ContentId,
    pub endpoint: String,
    pub payload_size_bytes: usize,
    pub content_original_bytes: usize,
    pub payload: Value,
}

#[derive(Debug, Default)]
pub struct OperatorLog {
    last_result: Mutex<String>,
    debug_lines: Mutex<VecDeque<String>>,
    snapshots: Mutex<VecDeque<String>>,
}

impl OperatorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_result(&self, text: impl Into<String>) {
        *self.last_result.lock().expect("operator log lock poisoned") = text.into();
    }

    pub fn last_result(&self) -> String {
        self.last_result
            .lock()
            .expect("operator log lock poisoned")
            .clone()
    }

    /// Append `YYYY-MM-DD HH:MM:SS UTC - message`.
    pub fn debug(&self, message: &str, now: DateTime<Utc>) {
        let line = format!(
            "{} UTC - {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            sanitize_text(message)
        );
        push_capped(&self.debug_lines, line, MAX_DEBUG_LINES);
    }

    pub fn snapshot(
        &self,
        context: &str,
        content_id: ContentId,
        payload: &ContentPayload,
        endpoint: &str,
        now: DateTime<Utc>,
    ) {
        let Ok(mut view) = serde_json::to_value(payload) else {
            return;
        };
        let content_original_bytes = payload.content_html.len();
        trim_payload(&mut view);

        let payload_size_bytes = serde_json::to_vec(&view).map(|b| b.len()).unwrap_or(0);
        let entry = PayloadSnapshot {
            timestamp_utc: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            context: snapshot_context(context),
            content_id,
            endpoint: endpoint.trim().to_string(),
            payload_size_bytes,
            content_original_bytes,
            payload: view,
        };
        if let Ok(line) = serde_json::to_string(&entry) {
            push_capped(&self.snapshots, line, MAX_SNAPSHOTS);
        }
    }

    pub fn debug_lines(&self) -> Vec<String> {
        self.debug_lines
            .lock()
            .expect("operator log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn snapshots(&self) -> Vec<PayloadSnapshot> {
        self.snapshots
            .lock()
            .expect("operator log lock poisoned")
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Drop debug lines and snapshots. The last result is kept.
    pub fn clear(&self) {
        self.debug_lines
            .lock()
            .expect("operator log lock poisoned")
            .clear();
        self.snapshots
            .lock()
            .expect("operator log lock poisoned")
            .clear();
    }
}

/// `jane@example.com` → `ja**@example.com`; one- and two-letter local parts
/// keep their first letter.
pub fn mask_email(email: &str) -> String {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return String::new();
    };
    let chars: Vec<char> = local.chars().collect();
    let masked: String = if chars.len() <= 2 {
        chars.iter().take(1).chain(std::iter::once(&'*')).collect()
    } else {
        chars
            .iter()
            .take(2)
            .copied()
            .chain(std::iter::repeat('*').take(chars.len() - 2))
            .collect()
    };
    format!("{masked}@{domain}")
}

fn trim_payload(view: &mut Value) {
    let Value::Object(map) = view else {
        return;
    };

    if let Some(Value::String(html)) = map.get_mut("content_html") {
        if html.len() > SNAPSHOT_CONTENT_LIMIT {
            let mut cut = SNAPSHOT_CONTENT_LIMIT;
            while !html.is_char_boundary(cut) {
                cut -= 1;
            }
            html.truncate(cut);
            html.push_str(CONTENT_TRUNCATED_MARKER);
        }
    }

    if let Some(Value::Object(author)) = map.get_mut("author") {
        if let Some(Value::String(email)) = author.get_mut("email") {
            if !email.is_empty() {
                *email = mask_email(email);
            }
        }
    }

    let dropped = match map.get_mut("media_manifest") {
        Some(Value::Array(items)) if items.len() > SNAPSHOT_MANIFEST_LIMIT => {
            let total = items.len();
            items.truncate(SNAPSHOT_MANIFEST_LIMIT);
            total - SNAPSHOT_MANIFEST_LIMIT
        }
        _ => 0,
    };
    if dropped > 0 {
        map.insert(MANIFEST_TRUNCATED_KEY.to_string(), json!(dropped));
    }
}

fn snapshot_context(context: &str) -> String {
    context
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn push_capped(lines: &Mutex<VecDeque<String>>, line: String, cap: usize) {
    let mut lines = lines.lock().expect("operator log lock poisoned");
    lines.push_back(line);
    while lines.len() > cap {
        lines.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use protocol::{Author, MediaItem};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 1).unwrap()
    }

    #[test]
    fn masks_emails() {
        assert_eq!(mask_email("Jane.Doe@Example.com"), "ja******@example.com");
        assert_eq!(mask_email("ab@x.io"), "a*@x.io");
        assert_eq!(mask_email("a@x.io"), "a*@x.io");
        assert_eq!(mask_email("not-an-email"), "");
    }

    #[test]
    fn debug_lines_are_prefixed_and_capped() {
        let log = OperatorLog::new();
        for i in 0..(MAX_DEBUG_LINES + 5) {
            log.debug(&format!("line {i}\nwith break"), now());
        }
        let lines = log.debug_lines();
        assert_eq!(lines.len(), MAX_DEBUG_LINES);
        assert_eq!(lines[0], "2024-02-29 23:59:01 UTC - line 5 with break");
    }

    #[test]
    fn snapshots_trim_large_payloads() {
        let log = OperatorLog::new();
        let payload = ContentPayload {
            title: "Big".into(),
            content_html: "é".repeat(SNAPSHOT_CONTENT_LIMIT),
            author: Some(Author {
                name: "jdoe".into(),
                email: "jdoe@example.com".into(),
            }),
            media_manifest: (0..85)
                .map(|i| MediaItem::new(format!("https://cdn.example/{i}.jpg")))
                .collect(),
            ..Default::default()
        };
        log.snapshot("Auto Dry Run!", 7, &payload, " https://news.example/in ", now());

        let snap = &log.snapshots()[0];
        assert_eq!(snap.context, "autodryrun");
        assert_eq!(snap.content_id, 7);
        assert_eq!(snap.endpoint, "https://news.example/in");
        assert_eq!(snap.content_original_bytes, SNAPSHOT_CONTENT_LIMIT * 2);

        let html = snap.payload["content_html"].as_str().unwrap();
        assert!(html.ends_with(CONTENT_TRUNCATED_MARKER));
        assert_eq!(html.len(), SNAPSHOT_CONTENT_LIMIT + CONTENT_TRUNCATED_MARKER.len());
        assert_eq!(snap.payload["author"]["email"], "jd**@example.com");
        assert_eq!(snap.payload["media_manifest"].as_array().unwrap().len(), 80);
        assert_eq!(snap.payload[MANIFEST_TRUNCATED_KEY], 5);
    }

    #[test]
    fn snapshot_history_is_capped_and_clearable() {
        let log = OperatorLog::new();
        for id in 0..(MAX_SNAPSHOTS as u64 + 3) {
            log.snapshot("batch", id, &ContentPayload::default(), "", now());
        }
        let snaps = log.snapshots();
        assert_eq!(snaps.len(), MAX_SNAPSHOTS);
        assert_eq!(snaps[0].content_id, 3);

        log.set_last_result("kept");
        log.clear();
        assert!(log.snapshots().is_empty());
        assert_eq!(log.last_result(), "kept");
    }
}
