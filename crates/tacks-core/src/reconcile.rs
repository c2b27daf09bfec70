//! One reconciliation cycle: walk the current source items and upsert
//! destination lists/cards, gated by the content fingerprint so unchanged
//! items cost zero destination writes.
//!
//! Failures are isolated per item: a card that cannot be written is reported
//! in the summary and the cycle moves on, and its record is only advanced
//! after a confirmed successful write.

use crate::board::{Board, ensure_label, ensure_list};
use crate::model::{CardStatus, ManagedRecord, SourceItem};
use crate::render::render_card;
use crate::state::SyncState;
use anyhow::{Context as _, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Everything the reconciler needs to know about one course beyond its
/// items: how to name the list, the label, and the summary card.
#[derive(Debug, Clone)]
pub struct CourseContext {
    pub course_id: u64,
    pub list_name: String,
    pub label_name: String,
    pub info_name: String,
    pub info_desc: String,
}

/// One course's worth of work for a cycle.
#[derive(Debug, Clone)]
pub struct CoursePlan {
    pub context: CourseContext,
    pub items: Vec<SourceItem>,
}

/// Result of one reconciliation cycle.
#[derive(Debug, Default, Serialize)]
pub struct CycleSummary {
    pub lists_created: usize,
    pub cards_created: usize,
    pub cards_updated: usize,
    pub cards_unchanged: usize,
    pub done_marked: usize,
    /// Per-item failures that did not stop the cycle.
    pub errors: Vec<String>,
}

/// Reconcile all courses against the board, mutating `state` in place.
///
/// Board-level snapshot fetches (lists, labels, open cards) happen once up
/// front and are fatal; everything per item is isolate-and-continue.
pub fn run_cycle<B: Board + ?Sized>(
    state: &mut SyncState,
    courses: &[CoursePlan],
    board: &mut B,
) -> Result<CycleSummary> {
    let mut summary = CycleSummary::default();

    let mut lists = board.lists().context("failed to list board lists")?;
    let mut labels = board.labels().context("failed to list board labels")?;
    let open: HashMap<String, String> = board
        .open_cards()
        .context("failed to list open cards")?
        .into_iter()
        .map(|card| (card.id, card.list_id))
        .collect();

    for course in courses {
        let course_key = course.context.course_id.to_string();

        let (list_id, created) = match ensure_list(board, &mut lists, &course.context.list_name) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(course = %course_key, error = %e, "failed to ensure course list");
                summary
                    .errors
                    .push(format!("course {course_key}: list: {e}"));
                continue;
            }
        };
        if created {
            state.managed_list_ids.insert(list_id.clone(), true);
            summary.lists_created += 1;
            info!(course = %course_key, list = %list_id, name = %course.context.list_name, "created course list");
        }
        state.course_to_list.insert(course_key.clone(), list_id.clone());

        let label_id = match ensure_label(board, &mut labels, &course.context.label_name, None) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(course = %course_key, error = %e, "failed to ensure course label");
                summary
                    .errors
                    .push(format!("course {course_key}: label: {e}"));
                None
            }
        };

        if let Err(e) = ensure_info_card(state, board, &course.context, &course_key, &list_id) {
            summary
                .errors
                .push(format!("course {course_key}: info card: {e}"));
        }

        for item in &course.items {
            let key = item.key().to_string();
            if let Err(e) = sync_item(
                state,
                board,
                &open,
                &list_id,
                label_id.as_deref(),
                item,
                &mut summary,
            ) {
                warn!(item = %key, error = %e, "item sync failed; continuing");
                summary.errors.push(format!("{key}: {e}"));
            }
        }
    }

    info!(
        lists_created = summary.lists_created,
        cards_created = summary.cards_created,
        cards_updated = summary.cards_updated,
        cards_unchanged = summary.cards_unchanged,
        errors = summary.errors.len(),
        "cycle complete"
    );
    Ok(summary)
}

/// Upsert one item's card. The managed record is only written after the
/// corresponding destination call succeeded.
fn sync_item<B: Board + ?Sized>(
    state: &mut SyncState,
    board: &mut B,
    open: &HashMap<String, String>,
    list_id: &str,
    label_id: Option<&str>,
    item: &SourceItem,
    summary: &mut CycleSummary,
) -> Result<()> {
    let key = item.key().to_string();
    let rendered = render_card(item);
    let due = (!rendered.due.is_empty()).then_some(rendered.due.as_str());

    if !state.item_to_card.contains_key(&key) {
        let label_ids: Vec<String> = label_id.map(str::to_string).into_iter().collect();
        let card_id = board
            .create_card(list_id, &rendered.name, &rendered.desc, due, &label_ids)
            .context("create card")?;
        debug!(item = %key, card = %card_id, "created card");
        state.item_to_card.insert(
            key,
            ManagedRecord {
                card_id,
                checksum: rendered.fingerprint,
                status: CardStatus::Active,
                locked: false,
                origin_list_id: list_id.to_string(),
                last_seen_list_id: list_id.to_string(),
                rendered_name: rendered.name,
                rendered_desc: rendered.desc,
                rendered_due: rendered.due,
            },
        );
        summary.cards_created += 1;
        return Ok(());
    }

    let Some(record) = state.item_to_card.get_mut(&key) else {
        return Ok(());
    };

    // Bookkeeping refresh from the cheap listing; never a destination write.
    if let Some(seen_list) = open.get(&record.card_id) {
        record.last_seen_list_id = seen_list.clone();
    }

    // A submitted assignment gets a green cover and a protective `done`
    // status; after that its content is never overwritten.
    if record.status == CardStatus::Active && item.is_submitted() {
        board
            .set_cover_color(&record.card_id, "green")
            .context("mark submitted")?;
        record.status = CardStatus::Done;
        summary.done_marked += 1;
        debug!(item = %item.key(), card = %record.card_id, "marked submitted assignment done");
        return Ok(());
    }

    if record.locked || !record.status.writable() {
        debug!(item = %item.key(), status = %record.status, locked = record.locked, "record protected, bookkeeping only");
        return Ok(());
    }

    if record.checksum == rendered.fingerprint {
        summary.cards_unchanged += 1;
        return Ok(());
    }

    // Content changed. The card is updated wherever it currently lives —
    // a human move is respected, never reverted.
    board
        .update_card(&record.card_id, &rendered.name, &rendered.desc, due)
        .context("update card")?;
    if let Some(label) = label_id {
        board
            .add_label(&record.card_id, label)
            .context("attach label")?;
    }
    record.checksum = rendered.fingerprint;
    record.rendered_name = rendered.name;
    record.rendered_desc = rendered.desc;
    record.rendered_due = rendered.due;
    summary.cards_updated += 1;
    debug!(item = %item.key(), card = %record.card_id, "updated card");
    Ok(())
}

/// Create the per-course summary card once, pinned to the top of the course
/// list. An existing card is left alone: humans annotate these.
fn ensure_info_card<B: Board + ?Sized>(
    state: &mut SyncState,
    board: &mut B,
    context: &CourseContext,
    course_key: &str,
    list_id: &str,
) -> Result<()> {
    if state.course_info_card.contains_key(course_key) {
        return Ok(());
    }
    let card_id = board.create_card(list_id, &context.info_name, &context.info_desc, None, &[])?;
    board.set_card_pos_top(&card_id)?;
    state
        .course_info_card
        .insert(course_key.to_string(), card_id);
    Ok(())
}

/// Inputs for the meta-tracked status cards.
#[derive(Debug, Clone)]
pub struct StatusCards {
    /// Name of the list holding the status cards.
    pub list_name: String,
    /// When the source API token expires, if the operator configured it.
    pub token_expires_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Maintain the persistent status cards: a token-expiry countdown and a
/// last-sync timestamp.
///
/// Their ids live only in `meta`, which a wipe never prunes, so an archived
/// status card is reopened and updated instead of recreated — the board
/// keeps one logical object across wipes.
pub fn ensure_status_cards<B: Board + ?Sized>(
    state: &mut SyncState,
    board: &mut B,
    status: &StatusCards,
) -> Result<()> {
    let mut lists = board.lists().context("failed to list board lists")?;

    let stored_list = state.meta_str("token_list_id");
    let list_id = if !stored_list.is_empty() && lists.by_id.contains_key(&stored_list) {
        stored_list
    } else {
        let (id, created) = ensure_list(board, &mut lists, &status.list_name)?;
        if created {
            state.managed_list_ids.insert(id.clone(), true);
        }
        state.meta.insert("token_list_id".into(), json!(id));
        id
    };

    if let Some(expires_at) = status.token_expires_at {
        let days_left = (expires_at - status.now).num_days();
        let name = format!("Canvas token: {days_left}d left");
        let desc = format!(
            "Expires {}\nGenerate a fresh token before then and update CANVAS_TOKEN.",
            expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        upsert_meta_card(state, board, "token_card_id", &list_id, &name, &desc)?;
    }

    let desc = format!(
        "Completed {}",
        status.now.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    upsert_meta_card(state, board, "last_sync_card_id", &list_id, "Last sync", &desc)?;
    Ok(())
}

fn upsert_meta_card<B: Board + ?Sized>(
    state: &mut SyncState,
    board: &mut B,
    meta_key: &str,
    list_id: &str,
    name: &str,
    desc: &str,
) -> Result<()> {
    let card_id = state.meta_str(meta_key);

    if !card_id.is_empty() {
        match board.card(&card_id)? {
            Some(live) => {
                if live.closed {
                    board.set_card_closed(&card_id, false)?;
                }
                if live.list_id != list_id {
                    board.move_card(&card_id, list_id)?;
                }
                board.update_card(&card_id, name, desc, None)?;
                return Ok(());
            }
            None => {
                debug!(card = %card_id, key = meta_key, "status card vanished remotely; recreating");
            }
        }
    }

    let new_id = board.create_card(list_id, name, desc, None, &[])?;
    board.set_card_pos_top(&new_id)?;
    state.meta.insert(meta_key.to_string(), json!(new_id));
    Ok(())
}
