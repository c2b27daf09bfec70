//! Trello client implementing the core [`Board`] contract.
//!
//! Auth rides in query parameters, so error messages are built from the
//! request path only — the full URL (which embeds the key and token) never
//! reaches logs or error chains.

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tacks_core::board::{Board, BoardLists, Card, LabelInfo, OpenCard};
use tracing::debug;

const API_BASE: &str = "https://api.trello.com/1";

pub struct TrelloClient {
    agent: ureq::Agent,
    key: String,
    token: String,
    board_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "fullName")]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiList {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiCard {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    due: Option<String>,
    #[serde(default, rename = "idList")]
    id_list: String,
    #[serde(default)]
    closed: bool,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: Option<String>,
}

impl TrelloClient {
    #[must_use]
    pub fn new(key: &str, token: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            key: key.to_string(),
            token: token.to_string(),
            board_id: String::new(),
        }
    }

    /// Resolve and bind the working board: an explicit id wins, otherwise
    /// the shortlink is pulled from the board URL and dereferenced.
    pub fn bind_board(mut self, explicit_id: &str, board_url: &str) -> Result<Self> {
        if !explicit_id.is_empty() {
            self.board_id = explicit_id.to_string();
            return Ok(self);
        }
        let shortlink = shortlink_from_url(board_url).ok_or_else(|| {
            anyhow!("could not parse TRELLO_BOARD_URL; set TRELLO_BOARD_ID instead")
        })?;
        let board = self
            .get(&format!("/boards/{shortlink}"), &[("fields", "id")])?
            .ok_or_else(|| anyhow!("board {shortlink} not found"))?;
        self.board_id = field_str(&board, "id")
            .ok_or_else(|| anyhow!("board lookup returned no id"))?;
        Ok(self)
    }

    #[must_use]
    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// Check that the key/token pair works at all.
    pub fn validate_auth(&self) -> Result<Member> {
        let me = self
            .get("/members/me", &[("fields", "id,username,fullName")])?
            .ok_or_else(|| anyhow!("empty response from /members/me"))?;
        Ok(serde_json::from_value(me)?)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Value>> {
        let mut request = self
            .agent
            .get(&format!("{API_BASE}{path}"))
            .query("key", &self.key)
            .query("token", &self.token);
        for (k, v) in query {
            request = request.query(k, v);
        }
        match request.call() {
            Ok(response) => Ok(Some(response.into_json()?)),
            Err(err) => Err(describe_error("GET", path, err)),
        }
    }

    /// GET that maps a 404 to `None` (object gone).
    fn get_optional(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Value>> {
        let mut request = self
            .agent
            .get(&format!("{API_BASE}{path}"))
            .query("key", &self.key)
            .query("token", &self.token);
        for (k, v) in query {
            request = request.query(k, v);
        }
        match request.call() {
            Ok(response) => Ok(Some(response.into_json()?)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(err) => Err(describe_error("GET", path, err)),
        }
    }

    fn send(&self, method: &str, path: &str, form: &[(&str, &str)]) -> Result<Option<Value>> {
        let request = self
            .agent
            .request(method, &format!("{API_BASE}{path}"))
            .query("key", &self.key)
            .query("token", &self.token);
        match request.send_form(form) {
            Ok(response) => {
                let body = response.into_string().unwrap_or_default();
                if body.is_empty() {
                    Ok(None)
                } else {
                    Ok(serde_json::from_str(&body).ok())
                }
            }
            Err(err) => Err(describe_error(method, path, err)),
        }
    }

    fn parse_vec<T: serde::de::DeserializeOwned>(value: Option<Value>) -> Result<Vec<T>> {
        let Some(value) = value else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_value(value)?)
    }
}

impl Board for TrelloClient {
    fn lists(&mut self) -> Result<BoardLists> {
        let raw = self.get(
            &format!("/boards/{}/lists", self.board_id),
            &[("fields", "id,name"), ("filter", "open")],
        )?;
        let mut out = BoardLists::default();
        for list in Self::parse_vec::<ApiList>(raw)? {
            out.insert(list.id, list.name);
        }
        Ok(out)
    }

    fn create_list(&mut self, name: &str) -> Result<String> {
        let board_id = self.board_id.clone();
        let created = self
            .send(
                "POST",
                "/lists",
                &[("name", name), ("idBoard", &board_id), ("pos", "bottom")],
            )?
            .ok_or_else(|| anyhow!("list creation returned no body"))?;
        debug!(list = name, "created list");
        field_str(&created, "id").ok_or_else(|| anyhow!("list creation returned no id"))
    }

    fn open_cards(&mut self) -> Result<Vec<OpenCard>> {
        let raw = self.get(
            &format!("/boards/{}/cards", self.board_id),
            &[("fields", "id,idList"), ("filter", "open")],
        )?;
        Ok(Self::parse_vec::<ApiCard>(raw)?
            .into_iter()
            .map(|card| OpenCard {
                id: card.id,
                list_id: card.id_list,
            })
            .collect())
    }

    fn card(&mut self, card_id: &str) -> Result<Option<Card>> {
        let raw = self.get_optional(
            &format!("/cards/{card_id}"),
            &[("fields", "id,name,desc,due,idList,closed")],
        )?;
        let Some(raw) = raw else { return Ok(None) };
        let card: ApiCard = serde_json::from_value(raw)?;
        Ok(Some(Card {
            id: card.id,
            name: card.name,
            desc: card.desc,
            due: card.due,
            list_id: card.id_list,
            closed: card.closed,
        }))
    }

    fn create_card(
        &mut self,
        list_id: &str,
        name: &str,
        desc: &str,
        due: Option<&str>,
        label_ids: &[String],
    ) -> Result<String> {
        let labels_csv = label_ids.join(",");
        let mut form = vec![("idList", list_id), ("name", name), ("desc", desc)];
        if let Some(due) = due {
            form.push(("due", due));
        }
        if !labels_csv.is_empty() {
            form.push(("idLabels", &labels_csv));
        }
        let created = self
            .send("POST", "/cards", &form)?
            .ok_or_else(|| anyhow!("card creation returned no body"))?;
        field_str(&created, "id").ok_or_else(|| anyhow!("card creation returned no id"))
    }

    fn update_card(
        &mut self,
        card_id: &str,
        name: &str,
        desc: &str,
        due: Option<&str>,
    ) -> Result<()> {
        // An empty `due` clears any previously set instant.
        let form = [
            ("name", name),
            ("desc", desc),
            ("due", due.unwrap_or_default()),
        ];
        self.send("PUT", &format!("/cards/{card_id}"), &form)?;
        Ok(())
    }

    fn archive_card(&mut self, card_id: &str) -> Result<()> {
        self.send("PUT", &format!("/cards/{card_id}"), &[("closed", "true")])?;
        Ok(())
    }

    fn archive_list(&mut self, list_id: &str) -> Result<()> {
        self.send("PUT", &format!("/lists/{list_id}"), &[("closed", "true")])?;
        Ok(())
    }

    fn set_card_closed(&mut self, card_id: &str, closed: bool) -> Result<()> {
        let value = if closed { "true" } else { "false" };
        self.send("PUT", &format!("/cards/{card_id}"), &[("closed", value)])?;
        Ok(())
    }

    fn move_card(&mut self, card_id: &str, list_id: &str) -> Result<()> {
        self.send("PUT", &format!("/cards/{card_id}"), &[("idList", list_id)])?;
        Ok(())
    }

    fn labels(&mut self) -> Result<HashMap<String, LabelInfo>> {
        let raw = self.get(
            &format!("/boards/{}/labels", self.board_id),
            &[("fields", "id,name,color"), ("limit", "1000")],
        )?;
        let mut out = HashMap::new();
        for label in Self::parse_vec::<ApiLabel>(raw)? {
            let name = label.name.trim().to_string();
            if !name.is_empty() {
                out.insert(
                    name,
                    LabelInfo {
                        id: label.id,
                        color: label.color.unwrap_or_default(),
                    },
                );
            }
        }
        Ok(out)
    }

    fn create_label(&mut self, name: &str, color: &str) -> Result<String> {
        let board_id = self.board_id.clone();
        let created = self
            .send(
                "POST",
                "/labels",
                &[("idBoard", &board_id), ("name", name), ("color", color)],
            )?
            .ok_or_else(|| anyhow!("label creation returned no body"))?;
        field_str(&created, "id").ok_or_else(|| anyhow!("label creation returned no id"))
    }

    fn update_label_color(&mut self, label_id: &str, color: &str) -> Result<()> {
        self.send("PUT", &format!("/labels/{label_id}"), &[("color", color)])?;
        Ok(())
    }

    fn add_label(&mut self, card_id: &str, label_id: &str) -> Result<()> {
        let path = format!("/cards/{card_id}/idLabels");
        let request = self
            .agent
            .request("POST", &format!("{API_BASE}{path}"))
            .query("key", &self.key)
            .query("token", &self.token);
        match request.send_form(&[("value", label_id)]) {
            Ok(_) => Ok(()),
            // Trello answers 400 when the label is already on the card.
            Err(ureq::Error::Status(400, response)) => {
                let body = response.into_string().unwrap_or_default().to_lowercase();
                if label_already_present(&body) {
                    Ok(())
                } else {
                    bail!("400 for POST {path}: {}", body.trim())
                }
            }
            Err(err) => Err(describe_error("POST", &path, err)),
        }
    }

    fn set_card_pos_top(&mut self, card_id: &str) -> Result<()> {
        self.send("PUT", &format!("/cards/{card_id}"), &[("pos", "top")])?;
        Ok(())
    }

    fn set_cover_color(&mut self, card_id: &str, color: &str) -> Result<()> {
        self.send(
            "PUT",
            &format!("/cards/{card_id}/cover"),
            &[("color", color), ("brightness", "dark")],
        )?;
        Ok(())
    }
}

/// The `abc123` out of `https://trello.com/b/abc123/board-name`.
fn shortlink_from_url(url: &str) -> Option<String> {
    let mut parts = url.split('/');
    while let Some(part) = parts.next() {
        if part == "b" {
            return parts
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
    }
    None
}

fn label_already_present(body: &str) -> bool {
    body.contains("already") || body.contains("exists")
}

fn field_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Build an error from the request path only; the full URL carries the auth
/// query parameters and must never appear in messages.
fn describe_error(method: &str, path: &str, err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let body = body.trim();
            let mut message = format!("{code} from Trello for {method} {path}");
            if code == 401 {
                message.push_str(
                    "\nTrello auth failed. Double-check TRELLO_KEY and TRELLO_TOKEN (and that \
                     the token was generated for that key, with read/write access).",
                );
            }
            if !body.is_empty() {
                let snippet: String = body.chars().take(300).collect();
                message.push_str("\nResponse: ");
                message.push_str(&snippet);
            }
            anyhow!(message)
        }
        ureq::Error::Transport(t) => {
            anyhow!("transport error for {method} {path}: {}", t.kind())
        }
    }
}
