//! Environment configuration.
//!
//! Everything comes from environment variables, optionally seeded from a
//! `.env` file (`ENV_FILE` overrides the path; `DOTENV_OVERRIDE` controls
//! whether file values replace already-exported ones). Required values fail
//! fast with the variable name; nothing here touches the network.

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::env;
use std::path::PathBuf;

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub canvas_base_url: String,
    pub canvas_token: String,
    /// Restrict course listing to one enrollment term when set.
    pub canvas_term_id: Option<u64>,
    /// When the Canvas token was generated, for the expiry countdown card.
    pub canvas_token_created_at: Option<NaiveDate>,
    pub canvas_token_lifetime_days: i64,
    pub trello_key: String,
    pub trello_token: String,
    pub trello_board_id: String,
    pub trello_board_url: String,
    pub due_within_days: i64,
    pub poll_interval_minutes: u64,
    pub state_file: PathBuf,
    pub user_agent: String,
}

impl Config {
    /// Load `.env` (best effort) and read the process environment.
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Split out so tests can feed
    /// a map instead of mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let canvas_base_url = get("CANVAS_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_default();
        let canvas_token = get("CANVAS_TOKEN").unwrap_or_default();
        let canvas_term_id = parse_optional(get("CANVAS_TERM_ID"), "CANVAS_TERM_ID")?;
        let canvas_token_created_at = get("CANVAS_TOKEN_CREATED_AT")
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|e| anyhow::anyhow!("invalid CANVAS_TOKEN_CREATED_AT '{raw}': {e}"))
            })
            .transpose()?;
        let canvas_token_lifetime_days =
            parse_optional(get("CANVAS_TOKEN_LIFETIME_DAYS"), "CANVAS_TOKEN_LIFETIME_DAYS")?
                .unwrap_or(120);

        let trello_key = get("TRELLO_KEY").unwrap_or_default();
        let trello_token = get("TRELLO_TOKEN").unwrap_or_default();
        let trello_board_id = get("TRELLO_BOARD_ID").unwrap_or_default();
        let trello_board_url = get("TRELLO_BOARD_URL").unwrap_or_default();

        let due_within_days =
            parse_optional(get("DUE_WITHIN_DAYS"), "DUE_WITHIN_DAYS")?.unwrap_or(30);
        let poll_interval_minutes =
            parse_optional(get("POLL_INTERVAL_MINUTES"), "POLL_INTERVAL_MINUTES")?.unwrap_or(30);
        let state_file = get("SYNC_STATE_FILE")
            .map_or_else(|| PathBuf::from("data/tacks_state.json"), PathBuf::from);

        require(&canvas_base_url, "CANVAS_BASE_URL")?;
        require(&canvas_token, "CANVAS_TOKEN")?;
        require(&trello_key, "TRELLO_KEY")?;
        require(&trello_token, "TRELLO_TOKEN")?;
        if trello_board_id.is_empty() && trello_board_url.is_empty() {
            bail!("Missing required config: TRELLO_BOARD_ID or TRELLO_BOARD_URL");
        }

        Ok(Self {
            canvas_base_url,
            canvas_token,
            canvas_term_id,
            canvas_token_created_at,
            canvas_token_lifetime_days,
            trello_key,
            trello_token,
            trello_board_id,
            trello_board_url,
            due_within_days,
            poll_interval_minutes,
            state_file,
            user_agent: format!("tacks/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// When the Canvas token expires, if the operator told us when it was
    /// created. Midnight UTC on the expiry date.
    #[must_use]
    pub fn canvas_token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.canvas_token_created_at.map(|created| {
            let expires = created + Duration::days(self.canvas_token_lifetime_days);
            expires
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default()
                .and_utc()
        })
    }
}

fn require(value: &str, name: &str) -> Result<()> {
    if value.is_empty() {
        bail!("Missing required config: {name}");
    }
    Ok(())
}

fn parse_optional<T: std::str::FromStr>(raw: Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    raw.map(|v| {
        v.parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {name}: '{v}' ({e})"))
    })
    .transpose()
}

fn load_dotenv() {
    let env_file = env::var("ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    let override_existing = env::var("DOTENV_OVERRIDE")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(true);

    // A missing .env is fine; only surface real parse failures.
    let result = if override_existing {
        dotenvy::from_path_override(&env_file)
    } else {
        dotenvy::from_path(&env_file)
    };
    if let Err(err) = result
        && !matches!(err, dotenvy::Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound)
    {
        tracing::warn!(file = %env_file, error = %err, "failed to load .env file");
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CANVAS_BASE_URL", "https://canvas.test/"),
            ("CANVAS_TOKEN", "canvas-secret"),
            ("TRELLO_KEY", "key"),
            ("TRELLO_TOKEN", "trello-secret"),
            ("TRELLO_BOARD_ID", "board-1"),
        ])
    }

    fn config_from(vars: &HashMap<&str, &str>) -> anyhow::Result<Config> {
        Config::from_lookup(|name| vars.get(name).map(ToString::to_string))
    }

    #[test]
    fn minimal_config_resolves_with_defaults() {
        let cfg = config_from(&base_vars()).expect("config");
        assert_eq!(cfg.canvas_base_url, "https://canvas.test");
        assert_eq!(cfg.due_within_days, 30);
        assert_eq!(cfg.poll_interval_minutes, 30);
        assert_eq!(cfg.canvas_token_lifetime_days, 120);
        assert!(cfg.canvas_term_id.is_none());
        assert_eq!(cfg.state_file.to_string_lossy(), "data/tacks_state.json");
    }

    #[test]
    fn missing_required_value_names_the_variable() {
        let mut vars = base_vars();
        vars.remove("CANVAS_TOKEN");
        let err = config_from(&vars).expect_err("must fail");
        assert!(err.to_string().contains("CANVAS_TOKEN"));
    }

    #[test]
    fn board_url_substitutes_for_board_id() {
        let mut vars = base_vars();
        vars.remove("TRELLO_BOARD_ID");
        vars.insert("TRELLO_BOARD_URL", "https://trello.com/b/abc123/my-board");
        let cfg = config_from(&vars).expect("config");
        assert!(cfg.trello_board_id.is_empty());
        assert!(!cfg.trello_board_url.is_empty());

        let mut vars = base_vars();
        vars.remove("TRELLO_BOARD_ID");
        let err = config_from(&vars).expect_err("must fail");
        assert!(err.to_string().contains("TRELLO_BOARD_ID or TRELLO_BOARD_URL"));
    }

    #[test]
    fn invalid_integer_is_rejected_with_context() {
        let mut vars = base_vars();
        vars.insert("DUE_WITHIN_DAYS", "soon");
        let err = config_from(&vars).expect_err("must fail");
        assert!(err.to_string().contains("DUE_WITHIN_DAYS"));
    }

    #[test]
    fn token_expiry_is_created_plus_lifetime() {
        let mut vars = base_vars();
        vars.insert("CANVAS_TOKEN_CREATED_AT", "2026-01-01");
        vars.insert("CANVAS_TOKEN_LIFETIME_DAYS", "10");
        let cfg = config_from(&vars).expect("config");
        let expires = cfg.canvas_token_expires_at().expect("expiry");
        assert_eq!(expires.to_rfc3339(), "2026-01-11T00:00:00+00:00");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let mut vars = base_vars();
        vars.insert("DUE_WITHIN_DAYS", "  ");
        let cfg = config_from(&vars).expect("config");
        assert_eq!(cfg.due_within_days, 30);
    }
}
