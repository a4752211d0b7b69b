//! bookshelf - command-line front end for the book catalog session.
//!
//! Runs the session lifecycle against the shared credential slot, trades an
//! identity token for a backend credential, and reports or clears the
//! stored session. Several `bookshelf watch` processes on the same slot
//! behave like several browser tabs: a logout in one ends them all.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookshelf_core::Config;

const USAGE: &str = "\
Usage: bookshelf <command>

Commands:
  watch                    Run the session lifecycle until the session ends
  login <email> <id-token> Exchange an identity token and store the credential
  store <token>            Store a bearer credential directly
  logout                   Clear the stored credential
  status                   Print the stored credential as JSON";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug). When a
/// log directory is given, a daily-rotated file log is written as well.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bookshelf.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    let config = Config::load()?;
    let log_dir = match command {
        Some("watch") => config.cache_dir().ok().map(|dir| dir.join("logs")),
        _ => None,
    };
    let _guard = init_tracing(log_dir.as_deref());
    info!(command = ?command, "bookshelf starting");

    match (command, &args[args.len().min(2)..]) {
        (Some("watch"), []) => commands::watch(&config).await,
        (Some("login"), [email, id_token]) => commands::login(config, email, id_token).await,
        (Some("store"), [token]) => commands::store(config, token),
        (Some("logout"), []) => commands::logout(config),
        (Some("status"), []) => commands::status(&config),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}
