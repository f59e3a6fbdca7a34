//! Business handlers.
//!
//! Each handler takes the injected application context plus the session
//! resolved from the request's bearer token, and returns a finished JSON
//! envelope body. Handlers never panic: malformed bodies and non-numeric
//! id fields all collapse into error envelopes.

pub mod files;
pub mod forum;
pub mod messages;
pub mod users;

use crate::session::SessionStore;
use crate::store::Store;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared handles the server wires into every handler at startup.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<Store>,
    pub sessions: Arc<SessionStore>,
    pub upload_dir: PathBuf,
}

/// Timestamp format carried in message/post payloads.
pub fn now_timestamp() -> String {
    chrono::Local::now().format("%a %b %d %H:%M:%S %Y").to_string()
}

/// Parse a request body as JSON. An empty or malformed body degrades to
/// `Null`, which the field helpers treat as "absent".
pub fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or(Value::Null)
}

/// String field lookup; absent or non-string fields read as empty.
pub fn str_field<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Optional numeric id field. Accepts JSON numbers and numeric strings;
/// anything else is a validation error, never a panic.
pub fn id_field(body: &Value, key: &str) -> Result<Option<i64>, String> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("invalid {}", key)),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("invalid {}", key)),
        Some(_) => Err(format!("invalid {}", key)),
    }
}

/// Parse a numeric id out of a query-parameter string.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, String> {
    raw.parse::<i64>().map_err(|_| format!("invalid {}", what))
}
