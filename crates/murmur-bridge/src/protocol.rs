//! Engine control-plane wire format
//!
//! Newline-delimited JSON-RPC 2.0 envelopes. A line with an `id` is a
//! response to one of our requests; a line with a `method` and no `id` is an
//! unsolicited notification. Malformed lines are discarded without aborting
//! the stream; the engine's stderr is never parsed as protocol data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An engine-reported failure inside a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

/// An unsolicited event pushed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// A parsed line from the engine's stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Carries an id that must match a pending request.
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<WireError>,
    },
    /// No id: an event for subscribers.
    Notification(Notification),
}

impl Envelope {
    /// Parse one line. `None` for anything that is not a recognizable
    /// envelope; the caller logs and skips.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

/// An outgoing request frame.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }

    /// Serialize to a single line (without the trailing delimiter).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("request serialization cannot fail")
    }
}
