//! JSON-RPC message types.
//!
//! Only the client side is modelled: outgoing [`Request`]s and incoming
//! [`Response`]s.

use serde::{Deserialize, Serialize};

use crate::id::{Id, IdGenerator};

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// A request sent to the remote peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, always `"2.0"`.
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Correlation identifier. Assigned by [`Request::ensure_id`] before
    /// sending if the caller did not provide one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    /// The method to invoke.
    pub method: String,
    /// Method parameters (method-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Create a request without an identifier
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Set an explicit identifier
    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    /// Assign an identifier from `ids` if the request does not have one yet.
    ///
    /// Calling this more than once leaves the first identifier in place.
    pub fn ensure_id(&mut self, ids: &dyn IdGenerator) -> &Id {
        self.id.get_or_insert_with(|| ids.next_id())
    }
}

/// Error object of a failed JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A response received from the remote peer.
///
/// A response carrying an [`RpcError`] is still a correctly correlated
/// reply; use [`Response::into_result`] to split success from failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Identifier of the request this response answers.
    pub id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Build a successful response
    pub fn success(id: impl Into<Id>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response
    pub fn failure(id: impl Into<Id>, error: RpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// The correlation key of this response
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Split the response into its result value or its error object.
    ///
    /// A response with neither `result` nor `error` yields `Value::Null`.
    pub fn into_result(self) -> Result<serde_json::Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::id::SequentialIds;

    #[test]
    fn ensure_id_assigns_once() {
        let ids = SequentialIds::new();
        let mut request = Request::new("ping", None);

        assert_eq!(request.ensure_id(&ids), &Id::Number(1));
        assert_eq!(request.ensure_id(&ids), &Id::Number(1));
        assert_eq!(request.id(), Some(&Id::Number(1)));
    }

    #[test]
    fn ensure_id_keeps_caller_id() {
        let ids = SequentialIds::new();
        let mut request = Request::new("ping", None).with_id("mine");

        assert_eq!(request.ensure_id(&ids), &Id::from("mine"));
        // the generator was never consulted
        assert_eq!(ids.next_id(), Id::Number(1));
    }

    #[test]
    fn serialize_request() {
        let request = Request::new("subtract", Some(json!([42, 23]))).with_id(1);
        let json = serde_json::to_string(&request).unwrap();

        assert!(json.contains(r#""jsonrpc":"2.0""#));
        assert!(json.contains(r#""method":"subtract""#));
        assert!(json.contains(r#""id":1"#));
    }

    #[test]
    fn serialize_request_without_id_omits_field() {
        let request = Request::new("notify", None);
        let json = serde_json::to_string(&request).unwrap();

        assert!(!json.contains("id"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn deserialize_success_response() {
        let json = r#"{"jsonrpc": "2.0", "result": 19, "id": 3}"#;
        let response: Response = serde_json::from_str(json).unwrap();

        assert_eq!(response.id(), &Id::Number(3));
        assert!(response.is_success());
        assert_eq!(response.into_result().unwrap(), json!(19));
    }

    #[test]
    fn deserialize_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "error": {"code": -32601, "message": "Method not found"},
            "id": "abc"
        }"#;
        let response: Response = serde_json::from_str(json).unwrap();

        assert_eq!(response.id(), &Id::from("abc"));
        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, -32601);
        assert_eq!(error.to_string(), "rpc error -32601: Method not found");
    }
}
