//! The persisted sync state: what this tool has created on the board and
//! what it currently believes about it.
//!
//! A single JSON file, loaded at the start of every cycle and saved by
//! writing to a temporary sibling and atomically renaming over the real
//! path, so a crash mid-write never corrupts the previous good state.
//! Legacy-schema files (the original single-map `assignment_to_card` format)
//! are migrated transparently at load time; migration is one-directional.

use crate::model::ManagedRecord;
use crate::wipe::WipeOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Errors from loading or saving the state file.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read state file: {0}")]
    Read(#[source] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to write state file: {0}")]
    Write(#[source] std::io::Error),
}

/// The whole persisted schema. Every field round-trips on save; unknown
/// keys inside `meta` pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    /// course_id -> destination list id. One list per course, created once.
    pub course_to_list: BTreeMap<String, String>,
    /// `<kind>:<course_id>:<item_id>` -> managed card record.
    pub item_to_card: BTreeMap<String, ManagedRecord>,
    /// list id -> true iff this tool created the list (as opposed to a
    /// pre-existing board list that happens to hold synced cards).
    pub managed_list_ids: BTreeMap<String, bool>,
    /// course_id -> "course summary" card id.
    pub course_info_card: BTreeMap<String, String>,
    /// Free-form bag for cross-cutting state that must survive wipes:
    /// token card ids, protected list ids, and whatever later versions add.
    pub meta: BTreeMap<String, Value>,
}

impl SyncState {
    /// Load state from `path`. A missing file is an empty state, never an
    /// error. Legacy-shaped files are migrated; entries that do not parse
    /// are dropped rather than failing the whole load.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(StateError::Read)?;
        let raw: Value = serde_json::from_str(&content).map_err(StateError::Parse)?;
        Ok(Self::migrate(raw))
    }

    /// Save atomically: write `<path>.tmp`, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(StateError::Write)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        let body = serde_json::to_string_pretty(self)
            .map_err(|e| StateError::Write(std::io::Error::other(e)))?;
        fs::write(&tmp, body).map_err(StateError::Write)?;
        fs::rename(&tmp, path).map_err(StateError::Write)?;
        Ok(())
    }

    /// Map a raw JSON document (current or legacy schema) into the current
    /// in-memory shape. One explicit transform, never type-sniffing at use
    /// sites.
    fn migrate(raw: Value) -> Self {
        let course_to_list = map_of_strings(raw.get("course_to_list"));
        let managed_list_ids = raw
            .get("managed_list_ids")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), v.as_bool().unwrap_or(false)))
                    .collect()
            })
            .unwrap_or_default();
        let course_info_card = map_of_strings(raw.get("course_info_card"));
        let meta = raw
            .get("meta")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        // Current schema: composite keys, extended records. Missing
        // sub-fields are normalized to their defaults by serde.
        let mut item_to_card: BTreeMap<String, ManagedRecord> = BTreeMap::new();
        if let Some(map) = raw.get("item_to_card").and_then(Value::as_object)
            && !map.is_empty()
        {
            for (key, val) in map {
                if let Ok(record) = serde_json::from_value::<ManagedRecord>(val.clone()) {
                    item_to_card.insert(key.clone(), record);
                }
            }
            return Self {
                course_to_list,
                item_to_card,
                managed_list_ids,
                course_info_card,
                meta,
            };
        }

        // Legacy schema: `assignment_to_card` keyed `<course_id>:<item_id>`,
        // implicitly assignment-only, with only card_id + checksum. Keys that
        // are not two colon-delimited integers are discarded.
        if let Some(map) = raw.get("assignment_to_card").and_then(Value::as_object) {
            for (old_key, val) in map {
                let Some(obj) = val.as_object() else { continue };
                let Some((course, item)) = old_key.split_once(':') else {
                    continue;
                };
                if course.parse::<u64>().is_err() || item.parse::<u64>().is_err() {
                    continue;
                }
                item_to_card.insert(
                    format!("assignment:{course}:{item}"),
                    ManagedRecord {
                        card_id: string_field(obj, "card_id"),
                        checksum: string_field(obj, "checksum"),
                        ..ManagedRecord::default()
                    },
                );
            }
        }

        Self {
            course_to_list,
            item_to_card,
            managed_list_ids,
            course_info_card,
            meta,
        }
    }

    /// Drop records whose cards/lists a wipe archived. Ids referenced only
    /// by `meta` are intentionally left alone so the next cycle reopens the
    /// same logical object instead of minting a new one.
    pub fn prune_after_wipe(&mut self, outcome: &WipeOutcome) {
        if !outcome.archived_lists.is_empty() {
            self.course_to_list
                .retain(|_, list_id| !outcome.archived_lists.contains(list_id));
            for list_id in &outcome.archived_lists {
                self.managed_list_ids.remove(list_id);
            }
        }

        if !outcome.archived_cards.is_empty() {
            self.item_to_card
                .retain(|_, record| !outcome.archived_cards.contains(&record.card_id));
            self.course_info_card
                .retain(|_, card_id| !outcome.archived_cards.contains(card_id));
        }
    }

    /// String value at `meta[key]`, empty when absent or non-string.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> String {
        self.meta
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// The explicitly protected list ids (`meta.protected_list_ids`).
    #[must_use]
    pub fn protected_list_ids(&self) -> Vec<String> {
        self.meta
            .get("protected_list_ids")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn map_of_strings(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::SyncState;
    use crate::model::{CardStatus, ManagedRecord};
    use serde_json::json;

    fn tmp_state_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("nested/dir/state.json")
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = SyncState::load(&dir.path().join("absent.json")).expect("load");
        assert_eq!(state, SyncState::default());
    }

    #[test]
    fn save_load_roundtrips_exactly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = tmp_state_path(&dir);

        let mut state = SyncState::default();
        state
            .course_to_list
            .insert("101".into(), "list-1".into());
        state.item_to_card.insert(
            "assignment:101:555".into(),
            ManagedRecord {
                card_id: "c1".into(),
                checksum: "abc".into(),
                status: CardStatus::Done,
                locked: true,
                origin_list_id: "list-1".into(),
                last_seen_list_id: "list-2".into(),
                rendered_name: "Essay".into(),
                rendered_desc: "desc".into(),
                rendered_due: "2024-03-01T10:00:00+00:00".into(),
            },
        );
        state.managed_list_ids.insert("list-1".into(), true);
        state.course_info_card.insert("101".into(), "info-1".into());
        state.meta.insert("token_card_id".into(), json!("tok-1"));
        state
            .meta
            .insert("custom_unknown_key".into(), json!({"nested": [1, 2]}));

        state.save(&path).expect("save");
        let loaded = SyncState::load(&path).expect("load");
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        SyncState::default().save(&path).expect("save");
        assert!(path.exists());
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn legacy_entry_migrates_to_composite_key() {
        let raw = json!({
            "assignment_to_card": {
                "101:555": {"card_id": "c1", "checksum": "x"}
            }
        });
        let state = SyncState::migrate(raw);

        let record = state
            .item_to_card
            .get("assignment:101:555")
            .expect("migrated record");
        assert_eq!(record.card_id, "c1");
        assert_eq!(record.checksum, "x");
        assert_eq!(record.status, CardStatus::Active);
        assert!(!record.locked);
        assert!(record.rendered_name.is_empty());
        assert!(record.rendered_desc.is_empty());
        assert!(record.rendered_due.is_empty());
    }

    #[test]
    fn malformed_legacy_keys_are_dropped_not_fatal() {
        let raw = json!({
            "assignment_to_card": {
                "101:555": {"card_id": "c1", "checksum": "x"},
                "no-colon": {"card_id": "c2", "checksum": "y"},
                "abc:def": {"card_id": "c3", "checksum": "z"},
                "1:2:3": {"card_id": "c4", "checksum": "w"},
                "9:9": "not-an-object"
            }
        });
        let state = SyncState::migrate(raw);
        assert_eq!(state.item_to_card.len(), 1);
        assert!(state.item_to_card.contains_key("assignment:101:555"));
    }

    #[test]
    fn current_schema_fills_missing_subfields() {
        let raw = json!({
            "item_to_card": {
                "event:7:42": {"card_id": "c9", "checksum": "h"}
            },
            "meta": {"protected_list_ids": ["keep-me"]}
        });
        let state = SyncState::migrate(raw);
        let record = &state.item_to_card["event:7:42"];
        assert_eq!(record.status, CardStatus::Active);
        assert!(record.origin_list_id.is_empty());
        assert_eq!(state.protected_list_ids(), vec!["keep-me".to_string()]);
    }

    #[test]
    fn meta_survives_migration_untouched() {
        let raw = json!({
            "assignment_to_card": {},
            "meta": {"token_card_id": "tok-1", "opaque": {"a": 1}}
        });
        let state = SyncState::migrate(raw);
        assert_eq!(state.meta_str("token_card_id"), "tok-1");
        assert_eq!(state.meta["opaque"], json!({"a": 1}));
    }

    #[test]
    fn prune_after_wipe_spares_meta() {
        let mut state = SyncState::default();
        state.course_to_list.insert("101".into(), "l1".into());
        state.managed_list_ids.insert("l1".into(), true);
        state.item_to_card.insert(
            "assignment:101:1".into(),
            ManagedRecord {
                card_id: "c1".into(),
                ..ManagedRecord::default()
            },
        );
        state.course_info_card.insert("101".into(), "c2".into());
        state.meta.insert("token_card_id".into(), json!("c3"));

        state.prune_after_wipe(&crate::wipe::WipeOutcome {
            archived_cards: vec!["c1".into(), "c2".into(), "c3".into()],
            archived_lists: vec!["l1".into()],
        });

        assert!(state.item_to_card.is_empty());
        assert!(state.course_info_card.is_empty());
        assert!(state.course_to_list.is_empty());
        assert!(state.managed_list_ids.is_empty());
        // Meta ids are kept so the next cycle reopens the same card.
        assert_eq!(state.meta_str("token_card_id"), "c3");
    }
}
