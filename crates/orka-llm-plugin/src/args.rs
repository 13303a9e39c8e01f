//! Defensive extraction of typed values from an untyped argument bag.
//!
//! Nothing here fails: a missing, mistyped or unparsable value yields the
//! caller's default. A present-but-malformed value is logged at `debug` so a
//! typo can be told apart from an omission when tracing a call.

use orka_plugin_protocol::Args;
use serde_json::Value;
use tracing::debug;

use crate::llm::ChatMessage;

/// Non-empty string at `key`, else `default`.
///
/// Keys ending in `ID` also accept the `Id` spelling (`userID` / `userId`).
pub fn get_string(args: &Args, key: &str, default: &str) -> String {
    if let Some(s) = non_empty_str(args.get(key)) {
        return s.to_string();
    }
    if let Some(stem) = key.strip_suffix("ID")
        && let Some(s) = non_empty_str(args.get(&format!("{stem}Id")))
    {
        return s.to_string();
    }
    default.to_string()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Integer at `key`: native integer, truncated float, or base-10 string.
pub fn get_int(args: &Args, key: &str, default: i64) -> i64 {
    let parsed = match args.get(key) {
        None => return default,
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) if s.is_empty() => return default,
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| malformed(key, default))
}

/// Float at `key`: any JSON number, or a float string. Must be finite as f32.
pub fn get_float32(args: &Args, key: &str, default: f32) -> f32 {
    let parsed = match args.get(key) {
        None => return default,
        Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
        Some(Value::String(s)) if s.is_empty() => return default,
        Some(Value::String(s)) => s.parse::<f32>().ok(),
        Some(_) => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .unwrap_or_else(|| malformed(key, default))
}

/// Boolean at `key`: native boolean, or one of the accepted boolean strings.
pub fn get_bool(args: &Args, key: &str, default: bool) -> bool {
    let parsed = match args.get(key) {
        None => return default,
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) if s.is_empty() => return default,
        Some(Value::String(s)) => parse_bool(s),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| malformed(key, default))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// String list at `key`.
///
/// Accepts an array (string elements kept, others skipped) or a
/// comma-separated string (segments trimmed, empty ones dropped). Anything
/// else, including `null`, is an empty list.
pub fn get_string_slice(args: &Args, key: &str) -> Vec<String> {
    match args.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        Some(_) => malformed(key, Vec::new()),
    }
}

/// Chat messages from `messages`, in order.
///
/// Only object entries with a non-empty string `role` and `content` are kept.
pub fn extract_messages(args: &Args) -> Vec<ChatMessage> {
    let Some(Value::Array(items)) = args.get("messages") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let role = get_string(entry, "role", "");
            let content = get_string(entry, "content", "");
            (!role.is_empty() && !content.is_empty()).then(|| ChatMessage::new(role, content))
        })
        .collect()
}

fn malformed<T>(key: &str, default: T) -> T {
    debug!(key, "Ignoring malformed argument, using default");
    default
}
