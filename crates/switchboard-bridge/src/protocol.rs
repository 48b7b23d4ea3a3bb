// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire frames exchanged with the protocol sidecar.
//!
//! Gateway -> sidecar:
//! ```json
//! {"id": 7, "op": "send_message", "args": {"to": "15551234567", "message": {...}}}
//! ```
//!
//! Sidecar -> gateway:
//! ```json
//! {"id": 7, "ok": true, "result": {"message_id": "3EB0...", "timestamp": 1700000000}}
//! {"id": 8, "ok": false, "error": "not logged in"}
//! {"event": {"type": "connected"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_core::SessionEvent;

/// A request to the sidecar.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub op: &'a str,
    pub args: Value,
}

/// Answer to one request.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl Reply {
    /// The result on success, the sidecar's message otherwise.
    pub fn into_result(self) -> Result<Value, String> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "sidecar reported an error".to_string()))
        }
    }
}

/// Any frame the sidecar sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Reply(Reply),
    Event { event: SessionEvent },
}

/// Decodes one text frame. Unknown frames yield `None`.
pub fn decode(text: &str) -> Option<Incoming> {
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable sidecar frame");
            None
        }
    }
}
