//! Card content rendering: the exact name/desc/due strings written to the
//! destination, and the canonical field subset that feeds the fingerprint.

use crate::fingerprint;
use crate::model::{ItemKind, SourceItem};
use chrono::SecondsFormat;
use serde_json::{Map, Value, json};
use std::fmt::Write as _;

/// Detail keys that drive a re-render for each item kind. Everything else in
/// the detail bag (submission state, samples, raw HTML) is noise the
/// fingerprint must ignore.
const ASSIGNMENT_FIELDS: [&str; 5] = [
    "points_possible",
    "unlock_at",
    "lock_at",
    "submission_types",
    "description_text",
];
const EVENT_FIELDS: [&str; 2] = ["location_name", "description_text"];

/// Rendered card content plus the fingerprint over its source fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCard {
    pub name: String,
    pub desc: String,
    /// RFC 3339 UTC string, empty when the item has no due/start instant.
    pub due: String,
    pub fingerprint: String,
}

/// Render one source item into destination card content.
#[must_use]
pub fn render_card(item: &SourceItem) -> RenderedCard {
    RenderedCard {
        name: item.title.clone(),
        desc: render_desc(item),
        due: render_due(item),
        fingerprint: fingerprint::fingerprint(&fingerprint_payload(item)),
    }
}

/// The canonical field subset hashed by the fingerprinter: title, due/start,
/// URL, and the kind-specific detail fields.
#[must_use]
pub fn fingerprint_payload(item: &SourceItem) -> Value {
    let mut payload = Map::new();
    payload.insert("title".into(), json!(item.title));
    payload.insert("due".into(), json!(render_due(item)));
    payload.insert("url".into(), json!(item.url));

    let included: &[&str] = match item.kind {
        ItemKind::Assignment => &ASSIGNMENT_FIELDS,
        ItemKind::Event => &EVENT_FIELDS,
    };
    for key in included {
        payload.insert(
            (*key).to_string(),
            item.details.get(*key).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(payload)
}

fn render_due(item: &SourceItem) -> String {
    item.due
        .map(|due| due.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn render_desc(item: &SourceItem) -> String {
    let mut desc = String::new();
    if !item.url.is_empty() {
        let _ = writeln!(desc, "{}", item.url);
    }

    match item.kind {
        ItemKind::Assignment => {
            if let Some(points) = item.details.get("points_possible").and_then(Value::as_f64) {
                let _ = writeln!(desc, "Points: {points}");
            }
            if let Some(unlock) = detail_str(item, "unlock_at") {
                let _ = writeln!(desc, "Unlocks: {unlock}");
            }
            if let Some(lock) = detail_str(item, "lock_at") {
                let _ = writeln!(desc, "Locks: {lock}");
            }
            if let Some(types) = item.details.get("submission_types").and_then(Value::as_array) {
                let list: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                if !list.is_empty() {
                    let _ = writeln!(desc, "Submit via: {}", list.join(", "));
                }
            }
        }
        ItemKind::Event => {
            if let Some(location) = detail_str(item, "location_name") {
                let _ = writeln!(desc, "Location: {location}");
            }
        }
    }

    if let Some(text) = detail_str(item, "description_text") {
        let _ = write!(desc, "\n{text}");
    }

    desc.trim_end().to_string()
}

fn detail_str<'a>(item: &'a SourceItem, key: &str) -> Option<&'a str> {
    item.details
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
