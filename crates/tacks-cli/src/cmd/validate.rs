//! `tk validate` — prove the Trello credentials and board are reachable,
//! then exit. Makes no mutating call.

use crate::config::Config;
use crate::trello::TrelloClient;
use anyhow::{Context as _, Result};
use tacks_core::board::Board as _;
use tracing::info;

pub fn run_validate(config: &Config) -> Result<()> {
    let mut trello = TrelloClient::new(&config.trello_key, &config.trello_token)
        .bind_board(&config.trello_board_id, &config.trello_board_url)
        .context("failed to resolve Trello board")?;

    let me = trello.validate_auth().context("Trello auth check failed")?;
    let lists = trello.lists().context("board lists fetch failed")?;

    let user = me
        .username
        .or(me.full_name)
        .unwrap_or_else(|| "unknown".to_string());
    info!(user = %user, board = %trello.board_id(), lists = lists.by_id.len(), "Trello OK");
    println!(
        "✓ Trello OK: user={user} board={} ({} open list(s))",
        trello.board_id(),
        lists.by_id.len()
    );
    Ok(())
}
