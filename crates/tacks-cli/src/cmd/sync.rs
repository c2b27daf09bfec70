//! `tk sync` — run one reconciliation cycle, or keep running on an interval.

use crate::canvas::CanvasClient;
use crate::cmd::wipe::wipe_board;
use crate::config::Config;
use crate::trello::TrelloClient;
use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Args;
use std::time::{Duration, Instant};
use tacks_core::lock::StateLock;
use tacks_core::reconcile::{
    CourseContext, CoursePlan, CycleSummary, StatusCards, ensure_status_cards, run_cycle,
};
use tacks_core::state::SyncState;
use tracing::{error, info, warn};

const STATUS_LIST_NAME: &str = "Sync Status";

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Keep syncing on an interval instead of exiting after one cycle.
    #[arg(long)]
    pub watch: bool,

    /// Minutes between cycles with --watch (default: POLL_INTERVAL_MINUTES).
    #[arg(long)]
    pub interval_minutes: Option<u64>,

    /// Run the safe wipe before the cycle (requires --confirm).
    #[arg(long)]
    pub wipe: bool,

    /// Safety check for --wipe: must exactly match the resolved board id.
    #[arg(long, default_value = "")]
    pub confirm: String,

    /// Output in JSON (machine-readable) format.
    #[arg(long)]
    pub json: bool,
}

pub fn run_sync(args: &SyncArgs, config: &Config) -> Result<()> {
    let mut trello = TrelloClient::new(&config.trello_key, &config.trello_token)
        .bind_board(&config.trello_board_id, &config.trello_board_url)
        .context("failed to resolve Trello board")?;
    let canvas = CanvasClient::new(
        &config.canvas_base_url,
        &config.canvas_token,
        &config.user_agent,
    );

    // Safety gate, checked before anything mutating happens anywhere.
    if args.wipe && args.confirm != trello.board_id() {
        anyhow::bail!(
            "refusing to wipe: pass --confirm equal to the resolved board id ({})",
            trello.board_id()
        );
    }

    if !args.watch {
        let summary = run_one(args, config, &canvas, &mut trello)?;
        print_summary(args.json, &summary)?;
        return Ok(());
    }

    let interval_minutes = args
        .interval_minutes
        .unwrap_or(config.poll_interval_minutes);
    let interval = Duration::from_secs((interval_minutes * 60).max(60));

    loop {
        let started = Instant::now();
        match run_one(args, config, &canvas, &mut trello) {
            Ok(summary) => print_summary(args.json, &summary)?,
            Err(e) => error!(error = %e, "sync cycle failed; retrying next tick"),
        }

        let sleep_for = interval.saturating_sub(started.elapsed());
        std::thread::sleep(sleep_for.max(Duration::from_secs(1)));
    }
}

fn run_one(
    args: &SyncArgs,
    config: &Config,
    canvas: &CanvasClient,
    trello: &mut TrelloClient,
) -> Result<CycleSummary> {
    info!(
        board = %trello.board_id(),
        state_file = %config.state_file.display(),
        "starting sync cycle"
    );

    if args.wipe {
        let outcome = wipe_board(trello, config, &args.confirm)?;
        info!(
            cards = outcome.archived_cards.len(),
            lists = outcome.archived_lists.len(),
            "pre-sync wipe complete"
        );
    }

    let _lock = StateLock::acquire(&config.state_file, Duration::from_secs(10))?;
    let mut state = SyncState::load(&config.state_file)?;
    info!(
        courses = state.course_to_list.len(),
        items = state.item_to_card.len(),
        managed_lists = state.managed_list_ids.len(),
        "loaded state"
    );

    let now = Utc::now();
    let courses = canvas
        .active_courses(config.canvas_term_id)
        .context("failed to list Canvas courses")?;

    let mut plans = Vec::new();
    for course in &courses {
        let items = match canvas.upcoming_items(course.id, config.due_within_days, now) {
            Ok(items) => items,
            Err(e) => {
                warn!(course = course.id, error = %e, "failed to fetch items; skipping course");
                continue;
            }
        };

        // The teacher roster is only needed the first time, when the info
        // card gets created.
        let course_key = course.id.to_string();
        let info_desc = if state.course_info_card.contains_key(&course_key) {
            String::new()
        } else {
            course_info_desc(canvas, course)
        };

        plans.push(CoursePlan {
            context: CourseContext {
                course_id: course.id,
                list_name: course.title(),
                label_name: course.label(),
                info_name: "Course info".to_string(),
                info_desc,
            },
            items,
        });
    }

    let summary = run_cycle(&mut state, &plans, trello)?;

    let status = StatusCards {
        list_name: STATUS_LIST_NAME.to_string(),
        token_expires_at: config.canvas_token_expires_at(),
        now,
    };
    if let Err(e) = ensure_status_cards(&mut state, trello, &status) {
        warn!(error = %e, "failed to maintain status cards");
    }

    state.save(&config.state_file)?;
    info!(
        lists_created = summary.lists_created,
        cards_created = summary.cards_created,
        cards_updated = summary.cards_updated,
        "sync complete"
    );
    Ok(summary)
}

fn course_info_desc(canvas: &CanvasClient, course: &crate::canvas::CanvasCourse) -> String {
    let mut lines = Vec::new();
    if let Some(term) = course.term.as_ref().and_then(|t| t.name.clone()) {
        lines.push(format!("Term: {term}"));
    }
    match canvas.teachers(course.id) {
        Ok(teachers) => {
            let names: Vec<String> = teachers
                .into_iter()
                .filter_map(|t| t.display_name.or(t.short_name))
                .collect();
            if !names.is_empty() {
                lines.push(format!("Teachers: {}", names.join(", ")));
            }
        }
        Err(e) => warn!(course = course.id, error = %e, "failed to fetch teacher roster"),
    }
    lines.push(format!("Canvas course id: {}", course.id));
    lines.join("\n")
}

fn print_summary(json: bool, summary: &CycleSummary) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("tk sync");
    println!("  ✓ {} list(s) created", summary.lists_created);
    println!("  ✓ {} card(s) created", summary.cards_created);
    println!("  ✓ {} card(s) updated", summary.cards_updated);
    println!("  ✓ {} card(s) unchanged", summary.cards_unchanged);
    if summary.done_marked > 0 {
        println!("  ✓ {} card(s) marked done", summary.done_marked);
    }
    if !summary.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &summary.errors {
            println!("  • {e}");
        }
    }
    Ok(())
}
