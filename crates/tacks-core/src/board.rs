//! The narrow contract with the destination board service.
//!
//! Everything the reconciler and the safe wipe need from Trello fits behind
//! this trait, which keeps the core testable against an in-memory fake and
//! keeps HTTP concerns (auth, pagination, retries) out of the algorithms.
//! All calls are blocking; implementations surface transport failures as
//! errors and missing objects as `None`.

use anyhow::Result;
use std::collections::HashMap;

/// Full card detail, fetched only when the wipe needs to compare live
/// content against a rendered snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Card {
    pub id: String,
    pub name: String,
    pub desc: String,
    /// ISO-8601 due instant as the service reports it; `None` when unset.
    pub due: Option<String>,
    pub list_id: String,
    pub closed: bool,
}

/// Cheap open-card listing entry (id + current list only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCard {
    pub id: String,
    pub list_id: String,
}

/// Snapshot of the board's open lists, indexed both ways.
#[derive(Debug, Clone, Default)]
pub struct BoardLists {
    pub by_name: HashMap<String, String>,
    pub by_id: HashMap<String, String>,
}

impl BoardLists {
    pub fn insert(&mut self, id: String, name: String) {
        self.by_name.insert(name.clone(), id.clone());
        self.by_id.insert(id, name);
    }
}

/// A board label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub color: String,
}

/// Destination board operations consumed by the core.
pub trait Board {
    /// Open lists on the board.
    fn lists(&mut self) -> Result<BoardLists>;

    /// Create a list at the bottom of the board; returns its id.
    fn create_list(&mut self, name: &str) -> Result<String>;

    /// All open cards on the board (cheap listing).
    fn open_cards(&mut self) -> Result<Vec<OpenCard>>;

    /// Full detail for one card; `None` when the card no longer exists.
    fn card(&mut self, card_id: &str) -> Result<Option<Card>>;

    /// Create a card; returns its id.
    fn create_card(
        &mut self,
        list_id: &str,
        name: &str,
        desc: &str,
        due: Option<&str>,
        label_ids: &[String],
    ) -> Result<String>;

    /// Overwrite a card's name/desc/due. `None` due clears it.
    fn update_card(&mut self, card_id: &str, name: &str, desc: &str, due: Option<&str>)
    -> Result<()>;

    fn archive_card(&mut self, card_id: &str) -> Result<()>;

    fn archive_list(&mut self, list_id: &str) -> Result<()>;

    /// Reopen (`closed = false`) or archive a card.
    fn set_card_closed(&mut self, card_id: &str, closed: bool) -> Result<()>;

    fn move_card(&mut self, card_id: &str, list_id: &str) -> Result<()>;

    /// Named labels on the board.
    fn labels(&mut self) -> Result<HashMap<String, LabelInfo>>;

    /// Create a label; returns its id.
    fn create_label(&mut self, name: &str, color: &str) -> Result<String>;

    fn update_label_color(&mut self, label_id: &str, color: &str) -> Result<()>;

    /// Attach a label to a card. Must be idempotent: a label already on the
    /// card is not an error.
    fn add_label(&mut self, card_id: &str, label_id: &str) -> Result<()>;

    fn set_card_pos_top(&mut self, card_id: &str) -> Result<()>;

    fn set_cover_color(&mut self, card_id: &str, color: &str) -> Result<()>;
}

/// Resolve a list id by name, creating the list when absent.
///
/// Keyed by name, not id, so a list someone created by hand with the target
/// name is reused instead of duplicated. Returns `(id, created)`.
pub fn ensure_list<B: Board + ?Sized>(
    board: &mut B,
    lists: &mut BoardLists,
    name: &str,
) -> Result<(String, bool)> {
    if let Some(id) = lists.by_name.get(name) {
        return Ok((id.clone(), false));
    }
    let id = board.create_list(name)?;
    lists.insert(id.clone(), name.to_string());
    Ok((id, true))
}

/// Resolve a label id by name, creating it with the deterministic palette
/// color when absent. An explicit `override_color` takes precedence and
/// re-colors an existing label that drifted.
pub fn ensure_label<B: Board + ?Sized>(
    board: &mut B,
    existing: &mut HashMap<String, LabelInfo>,
    name: &str,
    override_color: Option<&str>,
) -> Result<String> {
    if let Some(info) = existing.get(name) {
        let id = info.id.clone();
        if let Some(desired) = override_color
            && !desired.is_empty()
            && info.color != desired
        {
            board.update_label_color(&id, desired)?;
            existing.insert(
                name.to_string(),
                LabelInfo {
                    id: id.clone(),
                    color: desired.to_string(),
                },
            );
        }
        return Ok(id);
    }

    let color = override_color
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| crate::label::color_for(name));
    let id = board.create_label(name, color)?;
    existing.insert(
        name.to_string(),
        LabelInfo {
            id: id.clone(),
            color: color.to_string(),
        },
    );
    Ok(id)
}
