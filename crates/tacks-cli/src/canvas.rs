//! Canvas LMS client: courses, assignments, and calendar events over the
//! REST API, with Link-header pagination and bearer-token auth.
//!
//! Fetched items are normalized into [`SourceItem`]s here — due/start
//! instants to UTC, HTML descriptions to plain text — so the core never sees
//! raw API shapes.

use crate::html::html_to_text;
use anyhow::{Context as _, Result, anyhow};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration as StdDuration;
use tacks_core::model::{ItemKind, SourceItem};
use tracing::debug;

pub struct CanvasClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanvasCourse {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub enrollment_term_id: Option<u64>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub end_at: Option<String>,
    #[serde(default)]
    pub term: Option<CanvasTerm>,
}

impl CanvasCourse {
    /// Human-facing course title: name, else code, else the id.
    #[must_use]
    pub fn title(&self) -> String {
        self.name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.course_code.clone().filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| format!("Course {}", self.id))
    }

    /// Short label text: code, else the title.
    #[must_use]
    pub fn label(&self) -> String {
        self.course_code
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.title())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanvasTerm {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanvasTeacher {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanvasAssignment {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub unlock_at: Option<String>,
    #[serde(default)]
    pub lock_at: Option<String>,
    #[serde(default)]
    pub submission_types: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub submission: Option<CanvasSubmission>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CanvasSubmission {
    #[serde(default)]
    pub workflow_state: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub graded_at: Option<String>,
}

impl CanvasSubmission {
    fn is_submitted(&self) -> bool {
        let state = self
            .workflow_state
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.submitted_at.is_some()
            || self.graded_at.is_some()
            || matches!(state.as_str(), "submitted" | "graded")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanvasEvent {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CanvasClient {
    #[must_use]
    pub fn new(base_url: &str, token: &str, user_agent: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(StdDuration::from_secs(30))
                .build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Active courses, optionally restricted to one enrollment term.
    pub fn active_courses(&self, term_id: Option<u64>) -> Result<Vec<CanvasCourse>> {
        let mut params = vec![
            ("enrollment_state", "active".to_string()),
            ("per_page", "100".to_string()),
            ("include[]", "term".to_string()),
        ];
        if let Some(term) = term_id {
            params.push(("enrollment_term_id", term.to_string()));
        }
        self.get_paginated(&format!("{}/api/v1/courses", self.base_url), &params)
    }

    pub fn assignments(&self, course_id: u64) -> Result<Vec<CanvasAssignment>> {
        self.get_paginated(
            &format!("{}/api/v1/courses/{course_id}/assignments", self.base_url),
            &[
                ("per_page", "100".to_string()),
                ("include[]", "submission".to_string()),
            ],
        )
    }

    pub fn calendar_events(
        &self,
        course_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CanvasEvent>> {
        self.get_paginated(
            &format!("{}/api/v1/calendar_events", self.base_url),
            &[
                ("context_codes[]", format!("course_{course_id}")),
                ("type", "event".to_string()),
                ("start_date", start.date_naive().to_string()),
                ("end_date", end.date_naive().to_string()),
                ("per_page", "100".to_string()),
            ],
        )
    }

    pub fn teachers(&self, course_id: u64) -> Result<Vec<CanvasTeacher>> {
        self.get_paginated(
            &format!("{}/api/v1/courses/{course_id}/users", self.base_url),
            &[
                ("enrollment_type[]", "teacher".to_string()),
                ("per_page", "100".to_string()),
            ],
        )
    }

    /// All assignments due and events starting within `within_days` of
    /// `now`, as normalized source items.
    pub fn upcoming_items(
        &self,
        course_id: u64,
        within_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SourceItem>> {
        let end = now + Duration::days(within_days);
        let mut items = Vec::new();

        for assignment in self.assignments(course_id)? {
            let due = assignment.due_at.as_deref().and_then(parse_instant);
            if !within_window(due, now, end) {
                continue;
            }
            items.push(assignment_item(course_id, &assignment, due));
        }

        for event in self.calendar_events(course_id, now, end)? {
            let start = event.start_at.as_deref().and_then(parse_instant);
            if !within_window(start, now, end) {
                continue;
            }
            items.push(event_item(course_id, &event, start));
        }

        debug!(course = course_id, items = items.len(), "collected upcoming items");
        Ok(items)
    }

    fn get_paginated<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut next_url = Some(url.to_string());
        let mut first = true;

        while let Some(url) = next_url.take() {
            let mut request = self
                .agent
                .get(&url)
                .set("Authorization", &format!("Bearer {}", self.token))
                .set("User-Agent", &self.user_agent)
                .set("Accept", "application/json");
            if first {
                for (key, value) in params {
                    request = request.query(key, value);
                }
                first = false;
            }

            let response = request.call().map_err(|err| describe_error("GET", &url, &err))?;
            next_url = response.header("link").and_then(parse_next_link);
            let page: Vec<T> = response
                .into_json()
                .with_context(|| format!("failed to decode Canvas response from {url}"))?;
            out.extend(page);
        }

        Ok(out)
    }
}

fn assignment_item(
    course_id: u64,
    assignment: &CanvasAssignment,
    due: Option<DateTime<Utc>>,
) -> SourceItem {
    let submitted = assignment
        .submission
        .as_ref()
        .is_some_and(CanvasSubmission::is_submitted);

    let mut details = BTreeMap::new();
    details.insert("due_at".to_string(), json!(assignment.due_at));
    details.insert("unlock_at".to_string(), json!(assignment.unlock_at));
    details.insert("lock_at".to_string(), json!(assignment.lock_at));
    details.insert(
        "points_possible".to_string(),
        json!(assignment.points_possible),
    );
    details.insert(
        "submission_types".to_string(),
        json!(assignment.submission_types),
    );
    details.insert(
        "description_text".to_string(),
        json!(html_to_text(assignment.description.as_deref().unwrap_or_default())),
    );
    details.insert("is_submitted".to_string(), json!(submitted));

    SourceItem {
        kind: ItemKind::Assignment,
        course_id,
        item_id: assignment.id,
        title: assignment
            .name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Untitled assignment".to_string()),
        due,
        url: assignment.html_url.clone().unwrap_or_default(),
        details,
    }
}

fn event_item(course_id: u64, event: &CanvasEvent, start: Option<DateTime<Utc>>) -> SourceItem {
    let mut details = BTreeMap::new();
    details.insert("start_at".to_string(), json!(event.start_at));
    details.insert("location_name".to_string(), json!(event.location_name));
    details.insert(
        "description_text".to_string(),
        json!(html_to_text(event.description.as_deref().unwrap_or_default())),
    );

    SourceItem {
        kind: ItemKind::Event,
        course_id,
        item_id: event.id,
        title: event
            .title
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Untitled event".to_string()),
        due: start,
        url: event.html_url.clone().unwrap_or_default(),
        details,
    }
}

/// Parse an ISO-8601 instant, tolerating a missing offset (assumed UTC).
fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn within_window(instant: Option<DateTime<Utc>>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    instant.is_some_and(|t| t >= start && t <= end)
}

/// Pull the `rel="next"` URL out of an RFC 5988 Link header.
fn parse_next_link(header: &str) -> Option<String> {
    for part in header.split(',') {
        let part = part.trim();
        if !part.contains("rel=\"next\"") {
            continue;
        }
        let start = part.find('<')? + 1;
        let end = part.find('>')?;
        if end > start {
            return Some(part[start..end].to_string());
        }
    }
    None
}

fn describe_error(method: &str, url: &str, err: &ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, _) => anyhow!("{code} from Canvas for {method} {url}"),
        ureq::Error::Transport(t) => anyhow!("transport error for {method} {url}: {}", t.kind()),
    }
}
