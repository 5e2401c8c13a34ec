//! Tracing setup: console plus file sinks.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{PipelineError, PipelineResult};

/// Initialise the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies. The file sink gets
/// plain (non-ANSI) output and is created eagerly so a broken log path
/// fails the run up front instead of silently dropping logs.
pub fn init(level: &str, log_file: Option<&Path>) -> PipelineResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path).map_err(|e| {
                PipelineError::Config(format!("cannot open log file {}: {e}", path.display()))
            })?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(true)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();
    Ok(())
}
