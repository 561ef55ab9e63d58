// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging setup shared by the fluxport crates
//!
//! `FLUXPORT_LOG` selects the minimum level written to stderr:
//! `off` (default), `error`, `warn`, `info` or `debug`.

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable holding the log level
pub const LOG_ENV: &str = "FLUXPORT_LOG";

static INIT: Once = Once::new();

/// Minimum level for a `FLUXPORT_LOG` value. `Ok(None)` means logging is off.
pub fn parse_level(value: &str) -> Result<Option<emit::Level>, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" | "none" => Ok(None),
        "error" => Ok(Some(emit::Level::Error)),
        "warn" | "warning" => Ok(Some(emit::Level::Warn)),
        "info" => Ok(Some(emit::Level::Info)),
        "debug" | "trace" => Ok(Some(emit::Level::Debug)),
        other => Err(format!("unknown {LOG_ENV} value '{other}'")),
    }
}

/// Install the stderr emitter once; later calls do nothing
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let value = std::env::var(LOG_ENV).unwrap_or_default();
        let (level, problem) = match parse_level(&value) {
            Ok(None) => return,
            Ok(Some(level)) => (level, None),
            Err(problem) => (emit::Level::Info, Some(problem)),
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if let Some(problem) = problem {
            emit::warn!("{problem}, using info");
        }

        // The runtime must outlive every emitting call
        std::mem::forget(rt);
    });
}

// Routine progress: queries run, files written, points sent (`info`)
// Detail for troubleshooting: row counts, dropped rows, request URLs (`debug`)
// Recoverable problems, e.g. a bucket skipped during export (`warn`)
//
// Re-exported directly rather than wrapped in `macro_rules!`, since a wrapper
// hides call-site locals from emit's template captures (`{count}`).
pub use emit::{debug, error, info, warn};
