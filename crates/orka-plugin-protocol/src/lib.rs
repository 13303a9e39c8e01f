//! Orka Plugin Protocol - wire types exchanged between the Orka host and its plugins.
//!
//! A plugin listens on a loopback TCP port. The host opens a connection and sends
//! [`CallRequest`] frames; the plugin answers each one with exactly one
//! [`CallResponse`] frame, in order.
//!
//! # Framing
//!
//! Frames are newline-delimited JSON (one UTF-8 JSON document per line), capped at
//! [`MAX_FRAME_BYTES`]:
//!
//! ```text
//! → {"method":"Chat","args":{"model":"gpt-4o","prompt":"hi","apiKey":"sk-..."}}
//! ← {"success":true,"data":{"content":"Hello!","finishReason":"stop","usage":{...}}}
//! → {"method":"Foo"}
//! ← {"success":false,"error":"unknown method: Foo"}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Maximum length of a single frame, excluding the trailing newline.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Untyped argument bag carried by a call.
///
/// Values are caller-supplied and untrusted; numbers and booleans may arrive as
/// native JSON values or as strings.
pub type Args = Map<String, Value>;

// ============================================================================
// Request
// ============================================================================

/// A single remote call: logical method name plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    /// Missing or `null` args decode as an empty map.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: Args,
}

impl CallRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Args::new(),
        }
    }

    /// Add an argument, builder style.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Args, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Args>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Response
// ============================================================================

/// Result of a call. Either `success` with `data`, or failure with `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CallResponse {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
