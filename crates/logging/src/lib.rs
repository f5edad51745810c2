#![warn(missing_docs)]

//! Shared logging helpers and CLI argument definitions for the KPMacros
//! workspace.
//!
//! Filters are scoped to our own crates so the WebSocket stack stays quiet
//! unless asked for explicitly.

use std::{env, io};

use clap::Args;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directive appended to every computed spec to silence per-frame socket noise.
const QUIET_SOCKET: &str = "tungstenite=warn";

/// Logging controls for CLI apps.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Set global log level to trace (our crates only)
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set global log level to debug (our crates only)
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single global log level for our crates (error|warn|info|debug|trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive (overrides other flags)
    /// e.g. "kp_client=trace,kp_editor=debug"
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// Final filter spec for these flags.
    pub fn spec(&self) -> String {
        compute_spec(
            self.trace,
            self.debug,
            self.log_level.as_deref(),
            self.log_filter.as_deref(),
        )
    }
}

/// List of crate targets that constitute "our" logs.
pub fn our_crates() -> &'static [&'static str] {
    &["kpmacros", "kp_client", "kp_editor", "kp_protocol", "logging"]
}

/// Build a filter directive string that sets the same `level` for all of our crates.
///
/// Always includes the socket-noise suppression directive.
pub fn level_spec_for(level: &str) -> String {
    let lvl = level.to_ascii_lowercase();
    let mut parts: Vec<String> = our_crates()
        .iter()
        .map(|t| format!("{}={}", t, lvl))
        .collect();
    parts.push(QUIET_SOCKET.to_string());
    parts.join(",")
}

/// Compute the final filter spec string with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level` (crate-scoped)
/// - `RUST_LOG` env (plus socket suppression if it says nothing about tungstenite)
/// - default to crate-scoped `info`
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    match env::var("RUST_LOG") {
        Ok(spec) if spec.contains("tungstenite") => spec,
        Ok(spec) => format!("{},{}", spec, QUIET_SOCKET),
        Err(_) => level_spec_for("info"),
    }
}

/// Create an `EnvFilter` from a spec string.
pub fn env_filter_from_spec(spec: &str) -> EnvFilter {
    EnvFilter::new(spec)
}

/// Install the global subscriber: env filter plus compact stderr output.
///
/// Returns false if a subscriber was already installed.
pub fn init(spec: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter_from_spec(spec))
        .with(fmt::layer().without_time().with_writer(io::stderr))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        assert_eq!(
            compute_spec(false, false, Some("debug"), Some("kp_client=trace")),
            "kp_client=trace"
        );
    }

    #[test]
    fn level_flags_scope_to_our_crates() {
        let spec = compute_spec(true, false, None, None);
        assert!(spec.contains("kp_client=trace"));
        assert!(spec.contains("kp_editor=trace"));
        assert!(spec.ends_with(QUIET_SOCKET));

        let spec = compute_spec(false, false, Some("WARN"), None);
        assert!(spec.contains("kp_protocol=warn"));
    }

    #[test]
    fn args_spec_matches_compute_spec() {
        let args = LogArgs {
            debug: true,
            ..LogArgs::default()
        };
        assert_eq!(args.spec(), level_spec_for("debug"));
    }
}
