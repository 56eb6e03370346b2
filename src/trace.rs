//! Structured logging / tracing (C12).
//!
//! The remote-helper binary spans each command it handles and each backend
//! call beneath it; the CLI-equivalent front-ends (out of scope here) would
//! install the same subscriber. When `GIT_REMOTE_GITGRES_DEBUG` names a
//! path, trace output is additionally appended there, matching the "append
//! a structured trace" requirement in §6 — useful since the helper's
//! stdout/stderr are claimed by the remote-helper wire protocol itself.

use crate::config::HelperConfig;
use std::fs::OpenOptions;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Must be called once, before any
/// spans are entered; the remote-helper binary calls this first thing in
/// `main`.
pub fn init(config: &HelperConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.debug_log_path {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let subscriber = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(file)
                    .with_ansi(false)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
            Err(e) => {
                // Fall back to stderr; losing the debug log is not fatal to
                // the helper's own operation.
                let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
                tracing::warn!(error = %e, path = ?config.debug_log_path, "failed to open debug log");
            }
        },
        None => {
            let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}
