#![forbid(unsafe_code)]

mod canvas;
mod cmd;
mod config;
mod html;
mod trello;

use clap::{Parser, Subcommand};
use config::Config;
use std::env;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tacks: pin Canvas coursework to a Trello board",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run a reconciliation cycle",
        long_about = "Sync upcoming Canvas assignments and events to the Trello board.",
        after_help = "EXAMPLES:\n    # One cycle, then exit\n    tk sync\n\n    # Keep syncing every 30 minutes\n    tk sync --watch\n\n    # Wipe tool-owned content first (destructive; confirm with the board id)\n    tk sync --wipe --confirm 5f1a2b3c4d5e6f7a8b9c0d1e"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        about = "Check Trello credentials and board access",
        after_help = "EXAMPLES:\n    tk validate"
    )]
    Validate,

    #[command(
        about = "List active Canvas courses",
        long_about = "List active Canvas courses with term ids, to pick CANVAS_TERM_ID.",
        after_help = "EXAMPLES:\n    tk courses\n    tk courses --json"
    )]
    Courses(cmd::courses::CoursesArgs),

    #[command(
        about = "Archive tool-owned board content",
        long_about = "Archive every card and list this tool created and still owns. Cards a \
                      human edited, moved, or locked are left untouched.",
        after_help = "EXAMPLES:\n    # Requires the resolved board id as confirmation\n    tk wipe --confirm 5f1a2b3c4d5e6f7a8b9c0d1e"
    )]
    Wipe(cmd::wipe::WipeArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TACKS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tacks=debug,info"
        } else {
            "tacks=info,warn"
        })
    });

    let format = env::var("TACKS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Sync(args) => cmd::sync::run_sync(&args, &config),
        Commands::Validate => cmd::validate::run_validate(&config),
        Commands::Courses(args) => cmd::courses::run_courses(&args, &config),
        Commands::Wipe(args) => cmd::wipe::run_wipe(&args, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn sync_subcommand_parses() {
        let cli = Cli::parse_from(["tk", "sync"]);
        assert!(matches!(cli.command, Commands::Sync(_)));
    }

    #[test]
    fn sync_watch_flags_parse() {
        let cli = Cli::parse_from(["tk", "sync", "--watch", "--interval-minutes", "15"]);
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.watch);
        assert_eq!(args.interval_minutes, Some(15));
    }

    #[test]
    fn sync_wipe_requires_no_confirm_at_parse_time() {
        // The confirm check happens at run time against the resolved board
        // id; parsing alone must accept the bare flag.
        let cli = Cli::parse_from(["tk", "sync", "--wipe"]);
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.wipe);
        assert!(args.confirm.is_empty());
    }

    #[test]
    fn validate_subcommand_parses() {
        let cli = Cli::parse_from(["tk", "validate"]);
        assert!(matches!(cli.command, Commands::Validate));
    }

    #[test]
    fn courses_subcommand_parses() {
        let cli = Cli::parse_from(["tk", "courses", "--json"]);
        let Commands::Courses(args) = cli.command else {
            panic!("expected courses");
        };
        assert!(args.json);
    }

    #[test]
    fn wipe_subcommand_parses_with_confirmation() {
        let cli = Cli::parse_from(["tk", "wipe", "--confirm", "board-1"]);
        let Commands::Wipe(args) = cli.command else {
            panic!("expected wipe");
        };
        assert_eq!(args.confirm, "board-1");
    }

    #[test]
    fn all_subcommands_listed() {
        for args in [
            vec!["tk", "sync"],
            vec!["tk", "validate"],
            vec!["tk", "courses"],
            vec!["tk", "wipe", "--confirm", "x"],
        ] {
            let result = Cli::try_parse_from(args.iter());
            assert!(
                result.is_ok(),
                "Failed to parse: {:?} — error: {:?}",
                args,
                result.err()
            );
        }
    }
}
