//! JSON-RPC 2.0 framing used by MCP servers

use serde::{Deserialize, Serialize};

const VERSION: &str = "2.0";

/// Request identifier; MCP servers may echo numbers as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(u64),
    String(String),
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n)
    }
}

#[derive(Debug, Serialize)]
pub struct Request {
    jsonrpc: &'static str,
    pub id: Id,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: impl Into<Id>, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: VERSION,
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A request without an id; never answered
#[derive(Debug, Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: VERSION,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

impl Response {
    pub fn id_matches(&self, expected: &Id) -> bool {
        match (&self.id, expected) {
            (serde_json::Value::Number(n), Id::Number(e)) => n.as_u64() == Some(*e),
            (serde_json::Value::String(s), Id::String(e)) => s == e,
            (serde_json::Value::String(s), Id::Number(e)) => *s == e.to_string(),
            (serde_json::Value::Number(n), Id::String(e)) => n.to_string() == *e,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = Request::new(7u64, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}));
    }

    #[test]
    fn test_notification_has_no_id() {
        let json = serde_json::to_value(Notification::new("notifications/initialized", None)).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_response_id_matching() {
        let numeric: Response = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        assert!(numeric.id_matches(&Id::Number(3)));
        assert!(!numeric.id_matches(&Id::Number(4)));

        let stringly: Response = serde_json::from_str(r#"{"jsonrpc":"2.0","id":"3","result":{}}"#).unwrap();
        assert!(stringly.id_matches(&Id::Number(3)));

        let notification: Response =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).unwrap();
        assert!(!notification.id_matches(&Id::Number(3)));
    }
}
