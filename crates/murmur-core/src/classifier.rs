//! Log line classifier for the Tor daemon's lifecycle signals
//!
//! The daemon's log contract: a line containing `Bootstrapped NN%` is the
//! sole source of bootstrap progress, and a warn/err line with a bind
//! failure is the sole source of the port-conflict error. Everything else is
//! diagnostic noise. The matching rules live here so they can be unit-tested
//! without any process plumbing.

use std::sync::LazyLock;

use regex::Regex;

/// What a single output line means for the daemon lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapSignal {
    /// `Bootstrapped NN%` marker, 0..=100.
    Progress(u8),
    /// A fatal condition with a human-readable message.
    Fatal(String),
    /// No lifecycle meaning; surface for diagnostics only.
    Noise,
}

static BOOTSTRAP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Bootstrapped (\d{1,3})%").expect("Invalid bootstrap regex")
});

static BIND_FAILURE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Tor logs bind failures as e.g.
    //   [warn] Could not bind to 127.0.0.1:9050: Address already in use
    //   [err] Failed to parse/validate config: Failed to bind one of the listener ports.
    Regex::new(r"(?i)\[(warn|err)\].*(address already in use|could not bind|failed to bind)")
        .expect("Invalid bind failure regex")
});

/// Classify a single daemon output line.
pub fn classify_line(line: &str) -> BootstrapSignal {
    if let Some(caps) = BOOTSTRAP_REGEX.captures(line) {
        if let Ok(pct) = caps[1].parse::<u8>() {
            if pct <= 100 {
                return BootstrapSignal::Progress(pct);
            }
        }
        // A percentage above 100 is not a contract we recognize.
        return BootstrapSignal::Noise;
    }

    if BIND_FAILURE_REGEX.is_match(line) {
        return BootstrapSignal::Fatal(format!("daemon port conflict: {}", line.trim()));
    }

    BootstrapSignal::Noise
}
