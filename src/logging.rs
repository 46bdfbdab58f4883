//! Tracing subscriber setup.

use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "netguard.log";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},netguard=debug,smartcore=warn")))
}

/// Whether `dir` exists (or can be created) and accepts new files.
fn writable_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".netguard_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}

/// Console logging plus an optional daily rolling file under `config.dir`.
pub fn init_logging(config: &LoggingConfig) {
    // `rolling::daily` panics if it cannot create the first file, so check first.
    let file_layer = config.dir.as_deref().and_then(|dir| match writable_dir(dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Flushes on drop; the process owns it until exit.
            Box::leak(Box::new(guard));

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            None
        }
    });

    let (text_layer, json_layer) = if config.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    let _ = tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init();

    if let (true, Some(dir)) = (file_logging_enabled, &config.dir) {
        eprintln!("Logging to: {}/{}", dir.display(), LOG_FILE_NAME);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
