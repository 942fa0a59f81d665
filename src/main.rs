//! CLI entry point for the bookfetch tool.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

mod cli;
mod commands;

use cli::{Args, Command};
use commands::{
    AppContext, run_download_command, run_import_cookies_command, run_login_command,
    run_logout_command, run_search_command, run_status_command, run_toc_command,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(command = args.command.name(), "CLI arguments parsed");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let ctx = AppContext::from_args(&args)?;

    match &args.command {
        Command::Login { username, password } => {
            run_login_command(&ctx, &cancel, username, password).await
        }
        Command::ImportCookies { source } => run_import_cookies_command(&ctx, source),
        Command::Logout => run_logout_command(&ctx),
        Command::Status => run_status_command(&ctx),
        Command::Download {
            id,
            out,
            no_progress,
        } => run_download_command(&ctx, &cancel, id, out, !no_progress && !args.quiet).await,
        Command::Toc { id, book_id } => run_toc_command(&ctx, &cancel, id, book_id).await,
        Command::Search { query, limit } => {
            run_search_command(&ctx, &cancel, query, *limit).await
        }
    }
}
