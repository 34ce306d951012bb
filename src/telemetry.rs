use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, TelemetryConfig};

/// Initialize tracing output per config.
///
/// Honors `RUST_LOG` when set; defaults to `info`. enigo is clamped to
/// error-only so transcribed text cannot leak into the log file through its
/// key-event debug output.
///
/// # Errors
/// Returns error if the log file or its parent directory cannot be created.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,enigo=error"));

    if !config.log_to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
        return Ok(());
    }

    let log_path = Config::expand_path(&config.log_path)?;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_target(false)
        .with_ansi(false)
        .init();

    tracing::info!("logging to {}", log_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use std::path::PathBuf;

    #[test]
    fn test_log_path_tilde_expands_to_home() {
        let home = std::env::var("HOME").unwrap();
        let result = Config::expand_path("~/.vox-hotkey/app.log").unwrap();
        assert_eq!(result, PathBuf::from(home).join(".vox-hotkey/app.log"));
    }

    #[test]
    #[ignore = "global tracing subscriber can only be initialized once per process"]
    fn test_init_with_file_logging() {
        // Covered manually: run the binary with telemetry.log_to_file = true
        // and verify the file is created with ANSI disabled.
    }
}
