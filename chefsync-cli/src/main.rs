//! chefsync: keep a Chef repository and a Chef server in step.
//!
//! # Usage
//!
//! ```text
//! chefsync [global flags] sync
//! chefsync [global flags] prop -f <env> -t <env>
//! chefsync [global flags] save -e <env> [-b <tag>]
//! chefsync [global flags] load -e <env> -b <tag>
//! chefsync [global flags] status [--diff] [--json]
//! ```
//!
//! Exit status: `0` success, `1` operation failure, `2` configuration error,
//! `3` missing snapshot under `on_missing_snapshot: fail`.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use chefsync_core::ConfigError;
use chefsync_sync::SyncError;
use commands::{
    load::{LoadArgs, SnapshotMissing},
    prop::PropArgs,
    save::SaveArgs,
    status::StatusArgs,
    sync::SyncArgs,
    GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "chefsync",
    version,
    about = "Synchronize a Chef repository with a Chef server",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload everything changed since the last checkpoint.
    Sync(SyncArgs),

    /// Copy one environment's cookbook versions onto another.
    Prop(PropArgs),

    /// Snapshot an environment's cookbook versions.
    Save(SaveArgs),

    /// Restore an environment from a snapshot.
    Load(LoadArgs),

    /// Show the checkpoint and what the next sync would upload.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let result = match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Prop(args) => args.run(&cli.global),
        Commands::Save(args) => args.run(&cli.global),
        Commands::Load(args) => args.run(&cli.global),
        Commands::Status(args) => args.run(&cli.global),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Map a failure onto the documented exit statuses.
fn exit_status(err: &anyhow::Error) -> u8 {
    let mut status = 1;
    for cause in err.chain() {
        if cause.downcast_ref::<SnapshotMissing>().is_some() {
            return 3;
        }
        if cause.downcast_ref::<ConfigError>().is_some()
            || matches!(cause.downcast_ref::<SyncError>(), Some(SyncError::Config(_)))
        {
            status = 2;
        }
    }
    status
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
