use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use crate::builder::{self, BuildOptions, CancelToken};
use crate::error::BuildError;
use crate::store::open_store;
use crate::util::{format_number, format_size};

/// Exit code used when the build was interrupted.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "zimfiction", version, about = "Render fanfiction dumps into a ZIM file")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a ZIM file from an imported story store.
    Build(BuildArgs),
}

#[derive(clap::Args)]
pub struct BuildArgs {
    /// Use threads instead of worker processes (always the case here;
    /// accepted for compatibility).
    #[arg(long)]
    threaded: bool,

    /// Number of render workers (default: cores - 1).
    #[arg(long)]
    workers: Option<usize>,

    /// Write build.log and the final counter report into this directory.
    #[arg(long, value_name = "PATH")]
    log_directory: Option<PathBuf>,

    /// Write an aggregation memory profile into this directory.
    #[arg(long, value_name = "PATH")]
    memprofile_directory: Option<PathBuf>,

    /// Do not include links leaving the archive.
    #[arg(long)]
    no_external_links: bool,

    /// Debug: aggregate stories but render no story pages.
    #[arg(long)]
    debug_skip_stories: bool,

    /// Story store to read, as an opaque connection URL
    /// (json:<path> or a plain path to a JSON-lines dump).
    store_url: String,

    /// Path of the ZIM file to write.
    output: PathBuf,
}

pub fn main() -> ExitCode {
    // clap exits with code 2 on invalid arguments by itself
    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => run_build(args),
    }
}

fn run_build(args: BuildArgs) -> ExitCode {
    if let Err(err) = crate::logging::init(args.log_directory.as_deref()) {
        eprintln!("could not set up logging: {err:#}");
        return ExitCode::from(1);
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("interrupt received, finishing in-flight jobs...");
        handler_token.cancel();
    }) {
        error!(error = %err, "could not install signal handler");
        return ExitCode::from(1);
    }

    let store = match open_store(&args.store_url) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, url = %args.store_url, "could not open store");
            return ExitCode::from(1);
        }
    };

    let options = BuildOptions {
        workers: args.workers.unwrap_or_else(builder::default_workers),
        use_threads: args.threaded,
        skip_stories: args.debug_skip_stories,
        render: crate::templates::RenderOptions {
            include_external_links: !args.no_external_links,
        },
        log_directory: args.log_directory,
        memprofile_directory: args.memprofile_directory,
        metadata: crate::zim::ZimMetadata {
            date: chrono::Local::now().date_naive().to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    match builder::build(store, &args.output, options, cancel) {
        Ok(report) => {
            println!(
                "Wrote {} ({} entries, {} artifacts, {} skipped stories, {} failed artifacts)",
                format_size(report.zim.file_bytes),
                format_number(report.zim.entries),
                format_number(report.stats.artifacts_written),
                format_number(report.stats.stories_skipped),
                format_number(report.stats.artifacts_failed),
            );
            ExitCode::SUCCESS
        }
        Err(BuildError::Cancelled) => {
            error!("build cancelled");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(err) => {
            error!(error = %err, "build failed");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_args_parse() {
        let cli = Cli::try_parse_from([
            "zimfiction",
            "build",
            "--threaded",
            "--workers",
            "4",
            "--no-external-links",
            "--debug-skip-stories",
            "json:/tmp/dump.jsonl",
            "/tmp/out.zim",
        ])
        .unwrap();
        let Command::Build(args) = cli.command;
        assert!(args.threaded);
        assert_eq!(args.workers, Some(4));
        assert!(args.no_external_links);
        assert!(args.debug_skip_stories);
        assert_eq!(args.store_url, "json:/tmp/dump.jsonl");
    }

    #[test]
    fn missing_arguments_fail_parsing() {
        assert!(Cli::try_parse_from(["zimfiction", "build"]).is_err());
    }
}
