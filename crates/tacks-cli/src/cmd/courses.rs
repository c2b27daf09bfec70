//! `tk courses` — list active Canvas courses so the operator can pick a
//! term id and sanity-check visibility before the first sync.

use crate::canvas::CanvasClient;
use crate::config::Config;
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct CoursesArgs {
    /// Output in JSON (machine-readable) format.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CourseRow {
    id: u64,
    term_id: Option<u64>,
    name: String,
    start_at: Option<String>,
    end_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct CoursesReport {
    /// Highest enrollment term id seen — usually the current term.
    suggested_term_id: Option<u64>,
    courses: Vec<CourseRow>,
}

pub fn run_courses(args: &CoursesArgs, config: &Config) -> Result<()> {
    let canvas = CanvasClient::new(
        &config.canvas_base_url,
        &config.canvas_token,
        &config.user_agent,
    );
    let courses = canvas
        .active_courses(None)
        .context("failed to list Canvas courses")?;

    let report = CoursesReport {
        suggested_term_id: courses.iter().filter_map(|c| c.enrollment_term_id).max(),
        courses: courses
            .iter()
            .map(|c| CourseRow {
                id: c.id,
                term_id: c.enrollment_term_id,
                name: c.title(),
                start_at: c.start_at.clone(),
                end_at: c.end_at.clone(),
            })
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(term) = report.suggested_term_id {
        println!("Suggested current term id: {term}");
    }
    for course in &report.courses {
        println!(
            "course id={} term={} name={} start={} end={}",
            course.id,
            course.term_id.map_or_else(|| "-".to_string(), |t| t.to_string()),
            course.name,
            course.start_at.as_deref().unwrap_or("-"),
            course.end_at.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
