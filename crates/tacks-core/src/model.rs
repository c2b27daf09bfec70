use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

/// The two kinds of synced coursework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Assignment,
    Event,
}

impl ItemKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Event => "event",
        }
    }
}

/// Lifecycle/override status of a managed card.
///
/// `Done` and `Manual` both mean "hands off": the card's content is never
/// overwritten and the card is never auto-archived. The `locked` flag on
/// [`ManagedRecord`] is an orthogonal protection checked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Done,
    Manual,
}

impl CardStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Done => "done",
            Self::Manual => "manual",
        }
    }

    /// Whether the reconciler may overwrite card content for this status.
    #[must_use]
    pub const fn writable(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Default for CardStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Error returned when parsing an enum or key from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseKeyError {}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assignment" => Ok(Self::Assignment),
            "event" => Ok(Self::Event),
            _ => Err(ParseKeyError {
                expected: "item kind",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for CardStatus {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            "manual" => Ok(Self::Manual),
            _ => Err(ParseKeyError {
                expected: "card status",
                got: s.to_string(),
            }),
        }
    }
}

/// Globally unique, run-stable identity of a source item:
/// `<kind>:<course_id>:<item_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub kind: ItemKind,
    pub course_id: u64,
    pub item_id: u64,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.course_id, self.item_id)
    }
}

impl FromStr for ItemKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseKeyError {
            expected: "item key",
            got: s.to_string(),
        };

        let mut parts = s.splitn(3, ':');
        let kind = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let course_id = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let item_id = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        Ok(Self {
            kind,
            course_id,
            item_id,
        })
    }
}

/// One time-bound item fetched from the source system. Immutable per fetch;
/// a later fetch may carry the same key with different content.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub kind: ItemKind,
    pub course_id: u64,
    pub item_id: u64,
    pub title: String,
    /// Due instant for assignments, start instant for events. UTC.
    pub due: Option<DateTime<Utc>>,
    /// Browsable URL shown on the card.
    pub url: String,
    /// Free-form fields folded into the rendered description and (for a
    /// chosen subset) into the content fingerprint.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl SourceItem {
    #[must_use]
    pub const fn key(&self) -> ItemKey {
        ItemKey {
            kind: self.kind,
            course_id: self.course_id,
            item_id: self.item_id,
        }
    }

    /// Truthy `is_submitted` detail, set for assignments the student has
    /// already submitted or had graded.
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.details
            .get("is_submitted")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Bookkeeping entry linking a source item to the destination card the tool
/// created for it.
///
/// The `rendered_*` fields are an exact snapshot of the last content this
/// tool wrote to the card. They are updated atomically with every successful
/// write and are the only basis for detecting "has a human edited this
/// since" — the safe wipe refuses to archive any card whose live content no
/// longer matches the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedRecord {
    pub card_id: String,
    /// Last-applied content fingerprint (lowercase hex SHA-256).
    pub checksum: String,
    pub status: CardStatus,
    pub locked: bool,
    /// List the card was created into. Immutable after creation; a card seen
    /// elsewhere has been claimed by a human.
    pub origin_list_id: String,
    /// Most recent list observed during any detection pass.
    pub last_seen_list_id: String,
    pub rendered_name: String,
    pub rendered_desc: String,
    pub rendered_due: String,
}

#[cfg(test)]
mod tests {
    use super::{CardStatus, ItemKey, ItemKind, ManagedRecord};
    use std::str::FromStr;

    #[test]
    fn enum_json_roundtrips() {
        assert_eq!(
            serde_json::to_string(&ItemKind::Assignment).unwrap(),
            "\"assignment\""
        );
        assert_eq!(serde_json::to_string(&ItemKind::Event).unwrap(), "\"event\"");
        assert_eq!(
            serde_json::to_string(&CardStatus::Manual).unwrap(),
            "\"manual\""
        );

        assert_eq!(
            serde_json::from_str::<ItemKind>("\"event\"").unwrap(),
            ItemKind::Event
        );
        assert_eq!(
            serde_json::from_str::<CardStatus>("\"done\"").unwrap(),
            CardStatus::Done
        );
    }

    #[test]
    fn display_parse_roundtrips() {
        for kind in [ItemKind::Assignment, ItemKind::Event] {
            assert_eq!(ItemKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        for status in [CardStatus::Active, CardStatus::Done, CardStatus::Manual] {
            assert_eq!(CardStatus::from_str(&status.to_string()).unwrap(), status);
        }
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert!(ItemKind::from_str("quiz").is_err());
        assert!(CardStatus::from_str("archived").is_err());
    }

    #[test]
    fn key_roundtrips_through_display() {
        let key = ItemKey {
            kind: ItemKind::Assignment,
            course_id: 101,
            item_id: 555,
        };
        assert_eq!(key.to_string(), "assignment:101:555");
        assert_eq!(ItemKey::from_str("assignment:101:555").unwrap(), key);
    }

    #[test]
    fn key_parse_rejects_malformed_input() {
        assert!(ItemKey::from_str("101:555").is_err());
        assert!(ItemKey::from_str("assignment:101").is_err());
        assert!(ItemKey::from_str("assignment:abc:555").is_err());
        assert!(ItemKey::from_str("quiz:101:555").is_err());
        assert!(ItemKey::from_str("").is_err());
    }

    #[test]
    fn record_defaults_are_safe() {
        let record = ManagedRecord::default();
        assert_eq!(record.status, CardStatus::Active);
        assert!(!record.locked);
        assert!(record.card_id.is_empty());
        assert!(record.rendered_name.is_empty());
        assert!(record.rendered_desc.is_empty());
        assert!(record.rendered_due.is_empty());
    }

    #[test]
    fn record_deserializes_with_missing_fields() {
        let record: ManagedRecord =
            serde_json::from_str(r#"{"card_id": "c1", "checksum": "x"}"#).unwrap();
        assert_eq!(record.card_id, "c1");
        assert_eq!(record.checksum, "x");
        assert_eq!(record.status, CardStatus::Active);
        assert!(!record.locked);
        assert!(record.origin_list_id.is_empty());
    }

    #[test]
    fn only_active_status_is_writable() {
        assert!(CardStatus::Active.writable());
        assert!(!CardStatus::Done.writable());
        assert!(!CardStatus::Manual.writable());
    }
}
