//! `tk wipe` — archive tool-owned board content, and nothing else.
//!
//! Destructive, so it is gated: `--confirm` must exactly match the resolved
//! board id, checked before any mutating call. State is pruned and saved
//! after each wipe phase, so a crash mid-wipe never forgets ids that were
//! already archived.

use crate::config::Config;
use crate::trello::TrelloClient;
use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tacks_core::lock::StateLock;
use tacks_core::state::SyncState;
use tacks_core::wipe::{
    WipeCandidate, WipeOutcome, archive_eligible_cards, archive_empty_lists,
};
use tracing::warn;

#[derive(Args, Debug)]
pub struct WipeArgs {
    /// Safety check: must exactly match the resolved board id.
    #[arg(long, default_value = "")]
    pub confirm: String,

    /// Output in JSON (machine-readable) format.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct WipeReport {
    board_id: String,
    archived_cards: usize,
    archived_lists: usize,
}

pub fn run_wipe(args: &WipeArgs, config: &Config) -> Result<()> {
    let mut trello = TrelloClient::new(&config.trello_key, &config.trello_token)
        .bind_board(&config.trello_board_id, &config.trello_board_url)
        .context("failed to resolve Trello board")?;

    let outcome = wipe_board(&mut trello, config, &args.confirm)?;

    let report = WipeReport {
        board_id: trello.board_id().to_string(),
        archived_cards: outcome.archived_cards.len(),
        archived_lists: outcome.archived_lists.len(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("tk wipe (board {})", report.board_id);
        println!("  ✓ {} card(s) archived", report.archived_cards);
        println!("  ✓ {} list(s) archived", report.archived_lists);
    }
    Ok(())
}

/// The full wipe flow against an already-bound client. Shared with
/// `tk sync --wipe`.
pub fn wipe_board(
    trello: &mut TrelloClient,
    config: &Config,
    confirm: &str,
) -> Result<WipeOutcome> {
    let board_id = trello.board_id().to_string();
    if confirm != board_id {
        bail!(
            "refusing to wipe: pass --confirm equal to the resolved board id ({board_id})"
        );
    }

    let _lock = StateLock::acquire(&config.state_file, Duration::from_secs(10))?;
    let mut state = SyncState::load(&config.state_file)?;

    let candidates = collect_candidates(&state);
    let managed: BTreeSet<String> = state
        .managed_list_ids
        .iter()
        .filter(|(_, managed)| **managed)
        .map(|(id, _)| id.clone())
        .collect();
    let protected: BTreeSet<String> = state.protected_list_ids().into_iter().collect();

    warn!(
        board = %board_id,
        cards = candidates.len(),
        lists = managed.len(),
        "wiping managed board content"
    );

    let archived_cards = archive_eligible_cards(trello, &candidates)?;
    let mut outcome = WipeOutcome {
        archived_cards,
        archived_lists: Vec::new(),
    };
    // Checkpoint between phases.
    state.prune_after_wipe(&outcome);
    state.save(&config.state_file)?;

    outcome.archived_lists = archive_empty_lists(trello, &managed, &protected)?;
    state.prune_after_wipe(&outcome);
    state.save(&config.state_file)?;

    Ok(outcome)
}

/// Everything the state tracks a card id for: item cards with their full
/// snapshots, plus the tool-owned course-info and meta status cards (no
/// snapshot — the tool owns them outright).
fn collect_candidates(state: &SyncState) -> Vec<WipeCandidate> {
    let mut candidates: Vec<WipeCandidate> = state
        .item_to_card
        .values()
        .filter(|record| !record.card_id.is_empty())
        .map(WipeCandidate::from)
        .collect();

    for (course_id, card_id) in &state.course_info_card {
        let origin = state
            .course_to_list
            .get(course_id)
            .cloned()
            .unwrap_or_default();
        candidates.push(WipeCandidate::unconditional(card_id.clone(), origin));
    }

    let token_list = state.meta_str("token_list_id");
    for meta_key in ["token_card_id", "last_sync_card_id"] {
        let card_id = state.meta_str(meta_key);
        if !card_id.is_empty() {
            candidates.push(WipeCandidate::unconditional(card_id, token_list.clone()));
        }
    }

    candidates
}
