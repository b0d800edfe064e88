//! Tracing setup
//!
//! stdout belongs to the console, so logs go to `<data dir>/dbpilot/dbpilot.log`,
//! or stderr when that file cannot be opened.

use crate::config::{ConnectionConfig, Settings};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable that overrides the configured filter
pub const LOG_ENV: &str = "DBPILOT_LOG";

/// `DBPILOT_LOG` when set and valid, else the settings' level
pub fn build_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn log_file() -> Option<PathBuf> {
    ConnectionConfig::config_dir().ok().map(|d| d.join("dbpilot.log"))
}

/// Install the global subscriber. Returns where logs are going.
pub fn init(settings: &Settings) -> String {
    let filter = build_filter(settings);
    let registry = tracing_subscriber::registry().with(filter);

    let file = log_file().and_then(|path| {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).ok()?;
        }
        let f = OpenOptions::new().create(true).append(true).open(&path).ok()?;
        Some((path, f))
    });

    match file {
        Some((path, f)) => {
            let _ = registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(f))
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .try_init();
            path.display().to_string()
        }
        None => {
            let _ = registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                )
                .try_init();
            "stderr".to_string()
        }
    }
}
