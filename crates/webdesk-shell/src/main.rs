//! webdesk - terminal shell for the webdesk backend.
//!
//! Reads the stored session at startup and shows either the login prompt or
//! the dashboard summary.

mod app;
mod config;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, Command};

/// Log file name in the cache directory
const LOG_FILE: &str = "webdesk.log";

/// Initialize the tracing subscriber for logging.
///
/// Stderr gets `RUST_LOG` (default `warn`); the log file in `log_dir`, when
/// there is one, gets the same filter without ANSI colors. Keep the returned
/// guard alive until exit so buffered file lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
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

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = config::Config::load()?;
    let _guard = init_tracing(config.cache_dir().ok().as_deref());
    info!(?command, "webdesk starting");

    let mut app = App::new(config)?;
    let result = app.execute(command).await;

    if let Err(ref e) = result {
        eprintln!("Error: {}", e);
    }
    info!("webdesk shutting down");
    result
}
