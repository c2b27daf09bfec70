//! In-memory board fake shared by the integration suites.
#![allow(dead_code)] // each test binary uses a different subset

use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tacks_core::board::{Board, BoardLists, Card, LabelInfo, OpenCard};

#[derive(Debug, Clone)]
pub struct FakeList {
    pub name: String,
    pub closed: bool,
}

/// A board that lives in maps. Mutating calls bump `writes` so tests can
/// assert that an unchanged cycle makes zero destination writes.
#[derive(Debug, Default)]
pub struct FakeBoard {
    next_id: u64,
    pub lists: BTreeMap<String, FakeList>,
    pub cards: BTreeMap<String, Card>,
    pub labels: BTreeMap<String, (String, String)>,
    pub card_labels: BTreeMap<String, Vec<String>>,
    pub covers: BTreeMap<String, String>,
    pub writes: usize,
    /// Card names whose creation should fail (error injection).
    pub fail_create_names: BTreeSet<String>,
    /// Card ids whose update should fail (error injection).
    pub fail_update_cards: BTreeSet<String>,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Seed a list as if it pre-existed on the board.
    pub fn seed_list(&mut self, name: &str) -> String {
        let id = self.next("list");
        self.lists.insert(
            id.clone(),
            FakeList {
                name: name.to_string(),
                closed: false,
            },
        );
        id
    }

    /// Seed a card as if it pre-existed on the board.
    pub fn seed_card(&mut self, list_id: &str, name: &str, desc: &str, due: Option<&str>) -> String {
        let id = self.next("card");
        self.cards.insert(
            id.clone(),
            Card {
                id: id.clone(),
                name: name.to_string(),
                desc: desc.to_string(),
                due: due.map(str::to_string),
                list_id: list_id.to_string(),
                closed: false,
            },
        );
        id
    }
}

impl Board for FakeBoard {
    fn lists(&mut self) -> Result<BoardLists> {
        let mut out = BoardLists::default();
        for (id, list) in &self.lists {
            if !list.closed {
                out.insert(id.clone(), list.name.clone());
            }
        }
        Ok(out)
    }

    fn create_list(&mut self, name: &str) -> Result<String> {
        self.writes += 1;
        Ok(self.seed_list(name))
    }

    fn open_cards(&mut self) -> Result<Vec<OpenCard>> {
        Ok(self
            .cards
            .values()
            .filter(|card| !card.closed)
            .map(|card| OpenCard {
                id: card.id.clone(),
                list_id: card.list_id.clone(),
            })
            .collect())
    }

    fn card(&mut self, card_id: &str) -> Result<Option<Card>> {
        Ok(self.cards.get(card_id).cloned())
    }

    fn create_card(
        &mut self,
        list_id: &str,
        name: &str,
        desc: &str,
        due: Option<&str>,
        label_ids: &[String],
    ) -> Result<String> {
        if self.fail_create_names.contains(name) {
            bail!("injected create failure for '{name}'");
        }
        self.writes += 1;
        let id = self.seed_card(list_id, name, desc, due);
        if !label_ids.is_empty() {
            self.card_labels.insert(id.clone(), label_ids.to_vec());
        }
        Ok(id)
    }

    fn update_card(
        &mut self,
        card_id: &str,
        name: &str,
        desc: &str,
        due: Option<&str>,
    ) -> Result<()> {
        if self.fail_update_cards.contains(card_id) {
            bail!("injected update failure for '{card_id}'");
        }
        self.writes += 1;
        let Some(card) = self.cards.get_mut(card_id) else {
            bail!("no such card: {card_id}");
        };
        card.name = name.to_string();
        card.desc = desc.to_string();
        card.due = due.map(str::to_string);
        Ok(())
    }

    fn archive_card(&mut self, card_id: &str) -> Result<()> {
        self.writes += 1;
        let Some(card) = self.cards.get_mut(card_id) else {
            bail!("no such card: {card_id}");
        };
        card.closed = true;
        Ok(())
    }

    fn archive_list(&mut self, list_id: &str) -> Result<()> {
        self.writes += 1;
        let Some(list) = self.lists.get_mut(list_id) else {
            bail!("no such list: {list_id}");
        };
        list.closed = true;
        Ok(())
    }

    fn set_card_closed(&mut self, card_id: &str, closed: bool) -> Result<()> {
        self.writes += 1;
        let Some(card) = self.cards.get_mut(card_id) else {
            bail!("no such card: {card_id}");
        };
        card.closed = closed;
        Ok(())
    }

    fn move_card(&mut self, card_id: &str, list_id: &str) -> Result<()> {
        self.writes += 1;
        let Some(card) = self.cards.get_mut(card_id) else {
            bail!("no such card: {card_id}");
        };
        card.list_id = list_id.to_string();
        Ok(())
    }

    fn labels(&mut self) -> Result<HashMap<String, LabelInfo>> {
        Ok(self
            .labels
            .iter()
            .map(|(id, (name, color))| {
                (
                    name.clone(),
                    LabelInfo {
                        id: id.clone(),
                        color: color.clone(),
                    },
                )
            })
            .collect())
    }

    fn create_label(&mut self, name: &str, color: &str) -> Result<String> {
        self.writes += 1;
        let id = self.next("label");
        self.labels
            .insert(id.clone(), (name.to_string(), color.to_string()));
        Ok(id)
    }

    fn update_label_color(&mut self, label_id: &str, color: &str) -> Result<()> {
        self.writes += 1;
        let Some(label) = self.labels.get_mut(label_id) else {
            bail!("no such label: {label_id}");
        };
        label.1 = color.to_string();
        Ok(())
    }

    fn add_label(&mut self, card_id: &str, label_id: &str) -> Result<()> {
        self.writes += 1;
        let labels = self.card_labels.entry(card_id.to_string()).or_default();
        if !labels.iter().any(|existing| existing == label_id) {
            labels.push(label_id.to_string());
        }
        Ok(())
    }

    fn set_card_pos_top(&mut self, _card_id: &str) -> Result<()> {
        self.writes += 1;
        Ok(())
    }

    fn set_cover_color(&mut self, card_id: &str, color: &str) -> Result<()> {
        self.writes += 1;
        self.covers.insert(card_id.to_string(), color.to_string());
        Ok(())
    }
}
