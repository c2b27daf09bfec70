//! Safe wipe: archive tool-owned destination objects without deleting
//! anything a human has edited, moved, or protected.
//!
//! The wipe runs in two phases so callers can checkpoint state between them:
//!
//! 1. [`archive_eligible_cards`] walks the board's open cards and archives
//!    exactly those that are tracked, unlocked, `active`, still in their
//!    origin list, and whose live content matches the rendered snapshot the
//!    tool last wrote.
//! 2. [`archive_empty_lists`] archives managed lists that ended up with zero
//!    open cards, minus the explicitly protected set.
//!
//! Running the wipe twice with no destination-side changes in between
//! archives nothing on the second run: archived cards are no longer open,
//! and archived lists are no longer on the board.

use crate::board::{Board, OpenCard};
use crate::model::{CardStatus, ManagedRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// One record the caller considers eligible for archival.
#[derive(Debug, Clone, Default)]
pub struct WipeCandidate {
    pub card_id: String,
    pub status: CardStatus,
    pub locked: bool,
    pub origin_list_id: String,
    pub rendered_name: String,
    pub rendered_desc: String,
    pub rendered_due: String,
}

impl From<&ManagedRecord> for WipeCandidate {
    fn from(record: &ManagedRecord) -> Self {
        Self {
            card_id: record.card_id.clone(),
            status: record.status,
            locked: record.locked,
            origin_list_id: record.origin_list_id.clone(),
            rendered_name: record.rendered_name.clone(),
            rendered_desc: record.rendered_desc.clone(),
            rendered_due: record.rendered_due.clone(),
        }
    }
}

impl WipeCandidate {
    /// A candidate with no snapshot to compare (e.g. course info and token
    /// cards, which the tool fully owns).
    #[must_use]
    pub fn unconditional(card_id: impl Into<String>, origin_list_id: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            origin_list_id: origin_list_id.into(),
            ..Self::default()
        }
    }
}

/// What a wipe archived. The caller prunes its state from this.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WipeOutcome {
    pub archived_cards: Vec<String>,
    pub archived_lists: Vec<String>,
}

/// Phase 1: archive every open, tracked, unprotected, unedited card.
///
/// Protections, in order:
/// - `locked` or status `done`/`manual` — explicit human/override hold;
/// - origin list set and different from the card's current list — a moved
///   card is treated as claimed by a human;
/// - any non-empty rendered snapshot field that no longer matches the live
///   card — content drifted from what the tool last wrote, so a human
///   touched it. Names and descriptions are compared after newline and
///   surrounding-whitespace normalization; due instants at one-second
///   granularity, with both-absent counting as equal.
///
/// A tracked card that is missing remotely is already gone and is not
/// counted as archived.
pub fn archive_eligible_cards<B: Board + ?Sized>(
    board: &mut B,
    candidates: &[WipeCandidate],
) -> Result<Vec<String>> {
    let mut eligible: HashMap<&str, &WipeCandidate> = HashMap::new();
    for candidate in candidates {
        if !candidate.card_id.is_empty() {
            eligible.insert(candidate.card_id.as_str(), candidate);
        }
    }

    let mut archived = Vec::new();
    for open in board.open_cards()? {
        let Some(info) = eligible.get(open.id.as_str()) else {
            continue;
        };

        if info.locked || !info.status.writable() {
            debug!(card = %open.id, status = %info.status, locked = info.locked, "wipe: protected, skipping");
            continue;
        }

        if !info.origin_list_id.is_empty() && open.list_id != info.origin_list_id {
            debug!(card = %open.id, "wipe: moved from origin list, skipping");
            continue;
        }

        let has_snapshot = !info.rendered_name.is_empty()
            || !info.rendered_desc.is_empty()
            || !info.rendered_due.is_empty();
        if has_snapshot {
            let Some(live) = board.card(&open.id)? else {
                // Already gone remotely; nothing to archive.
                continue;
            };
            if !snapshot_matches(info, &live.name, &live.desc, live.due.as_deref()) {
                debug!(card = %open.id, "wipe: content drifted from snapshot, skipping");
                continue;
            }
        }

        board.archive_card(&open.id)?;
        archived.push(open.id);
    }

    info!(archived = archived.len(), "wipe: card pass complete");
    Ok(archived)
}

/// Phase 2: archive managed lists that have no open cards left.
///
/// Only lists still open on the board are considered, and the protected set
/// always wins over the managed set.
pub fn archive_empty_lists<B: Board + ?Sized>(
    board: &mut B,
    managed_list_ids: &BTreeSet<String>,
    protected_list_ids: &BTreeSet<String>,
) -> Result<Vec<String>> {
    let candidates: BTreeSet<&String> = managed_list_ids.difference(protected_list_ids).collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let open_lists = board.lists()?;
    let remaining = board.open_cards()?;
    let occupied: BTreeSet<&str> = remaining
        .iter()
        .map(|card: &OpenCard| card.list_id.as_str())
        .collect();

    let mut archived = Vec::new();
    for list_id in candidates {
        if !open_lists.by_id.contains_key(list_id.as_str()) {
            continue;
        }
        if occupied.contains(list_id.as_str()) {
            continue;
        }
        board.archive_list(list_id)?;
        archived.push(list_id.clone());
    }

    info!(archived = archived.len(), "wipe: list pass complete");
    Ok(archived)
}

/// Run both phases back to back. Callers that need crash-safe checkpoints
/// between the phases invoke them separately.
pub fn wipe_managed<B: Board + ?Sized>(
    board: &mut B,
    candidates: &[WipeCandidate],
    managed_list_ids: &BTreeSet<String>,
    protected_list_ids: &BTreeSet<String>,
) -> Result<WipeOutcome> {
    let archived_cards = archive_eligible_cards(board, candidates)?;
    let archived_lists = archive_empty_lists(board, managed_list_ids, protected_list_ids)?;
    Ok(WipeOutcome {
        archived_cards,
        archived_lists,
    })
}

fn snapshot_matches(
    info: &WipeCandidate,
    live_name: &str,
    live_desc: &str,
    live_due: Option<&str>,
) -> bool {
    if normalize_text(live_name) != normalize_text(&info.rendered_name) {
        return false;
    }
    if normalize_text(live_desc) != normalize_text(&info.rendered_desc) {
        return false;
    }
    due_matches(&info.rendered_due, live_due.unwrap_or_default())
}

fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").trim().to_string()
}

/// Compare two due strings at one-second granularity, tolerant of offset
/// formatting variation. Both absent (or unparseable) counts as equal only
/// when both sides are absent.
fn due_matches(rendered: &str, live: &str) -> bool {
    if rendered.is_empty() && live.is_empty() {
        return true;
    }
    match (parse_due(rendered), parse_due(live)) {
        (None, None) => true,
        (Some(a), Some(b)) => a.timestamp() == b.timestamp(),
        _ => false,
    }
}

fn parse_due(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
