//! JSON-RPC 2.0 envelope helpers: id handling, body inspection, request
//! building. The proxy never models full protocol types; it looks at the few
//! fields routing needs and leaves the rest of the body untouched.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub const DID_OPEN: &str = "textDocument/didOpen";
pub const DID_CHANGE: &str = "textDocument/didChange";
pub const DID_CLOSE: &str = "textDocument/didClose";
pub const COMPLETION: &str = "textDocument/completion";
pub const DOCUMENT_SYMBOL: &str = "textDocument/documentSymbol";
pub const EXIT: &str = "exit";

/// A request id as JSON-RPC allows them: number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// Allocates ids in a private string namespace, so requests the proxy
/// originates can never collide with ids the editor chose.
#[derive(Debug)]
pub struct IdGen {
    prefix: &'static str,
    count: u64,
}

impl IdGen {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, count: 0 }
    }

    pub fn next_id(&mut self) -> RequestId {
        let id = RequestId::String(format!("{}:{}", self.prefix, self.count));
        self.count += 1;
        id
    }
}

/// The message's id, if it has one that maps to a valid JSON-RPC id.
pub fn request_id(body: &Value) -> Option<RequestId> {
    serde_json::from_value(body.get("id")?.clone()).ok()
}

pub fn method(body: &Value) -> Option<&str> {
    body.get("method")?.as_str()
}

pub fn build_request(id: &RequestId, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Rewrites the id of a request or response body in place.
pub fn set_request_id(body: &mut Value, id: &RequestId) -> Result<()> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| Error::Protocol("message body is not a JSON object".into()))?;
    obj.insert("id".to_string(), serde_json::to_value(id)?);
    Ok(())
}
