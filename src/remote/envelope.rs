//! Response envelope `{ success, data?, error? }` and error-message extraction.
//!
//! Error bodies are read in this order:
//! 1. typed contract: `error: { kind, message }`
//! 2. schema validation: `error: { name: "ZodError", message: "<issues json>" }` or `error: { issues: [..] }`
//! 3. `error` as a plain string
//! 4. a top-level `message`
//! 5. a generic fallback

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

const GENERIC_MESSAGE: &str = "Server error";
const INVALID_DATA_MESSAGE: &str = "Invalid data";

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    NotFound,
    Conflict,
    Server,
    #[serde(other)]
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: Option<StatusCode>) -> Self {
        match status.map(|s| s.as_u16()) {
            Some(400) | Some(422) => Self::Validation,
            Some(401) | Some(403) => Self::Unauthorized,
            Some(404) => Self::NotFound,
            Some(409) => Self::Conflict,
            Some(s) if s >= 500 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

/// Turn a raw HTTP response into the envelope's `data`.
pub fn parse_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<Option<T>, ApiError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if !status.is_success() => {
            return Err(rejection(Some(status), &Value::Null));
        }
        Err(e) => return Err(ApiError::Decode(format!("body is not JSON: {}", e))),
    };

    if !status.is_success() {
        return Err(rejection(Some(status), &value));
    }

    let envelope: ApiResponse<T> = serde_json::from_value(value.clone())
        .map_err(|e| ApiError::Decode(format!("unexpected envelope: {}", e)))?;
    if !envelope.success {
        return Err(rejection(Some(status), &value));
    }
    Ok(envelope.data)
}

pub fn rejection(status: Option<StatusCode>, body: &Value) -> ApiError {
    let (kind, message) = describe_error(status, body);
    log::warn!("Backend rejected request ({:?}): {}", kind, message);
    ApiError::Rejected {
        status: status.map(|s| s.as_u16()),
        kind,
        message,
    }
}

/// Extract a human-readable message from an error body.
pub fn describe_error(status: Option<StatusCode>, body: &Value) -> (ErrorKind, String) {
    let fallback_kind = ErrorKind::from_status(status);

    match body.get("error") {
        Some(Value::Object(err)) => {
            if let (Some(kind), Some(Value::String(message))) = (err.get("kind"), err.get("message")) {
                if let Ok(kind) = serde_json::from_value::<ErrorKind>(kind.clone()) {
                    return (kind, message.clone());
                }
            }
            if let Some(message) = validation_message(err) {
                return (ErrorKind::Validation, message);
            }
        }
        Some(Value::String(message)) => return (fallback_kind, message.clone()),
        _ => {}
    }

    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return (fallback_kind, message.to_string());
    }

    (fallback_kind, GENERIC_MESSAGE.to_string())
}

/// First issue message of a schema-validation error, if `err` looks like one.
fn validation_message(err: &serde_json::Map<String, Value>) -> Option<String> {
    let issues = if let Some(issues) = err.get("issues") {
        issues.clone()
    } else if err.get("name").and_then(Value::as_str) == Some("ZodError") {
        match err.get("message").and_then(Value::as_str).map(serde_json::from_str::<Value>) {
            Some(Ok(parsed)) => parsed,
            _ => return Some(INVALID_DATA_MESSAGE.to_string()),
        }
    } else {
        return None;
    };

    let Value::Array(issues) = issues else {
        return Some(INVALID_DATA_MESSAGE.to_string());
    };
    Some(
        issues
            .first()
            .and_then(|issue| issue.get("message"))
            .and_then(Value::as_str)
            .unwrap_or(GENERIC_MESSAGE)
            .to_string(),
    )
}

/// A photo reference as the backend hands it back: a bare string or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhotoRef {
    Uri(String),
    Object {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        uri: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
}

impl PhotoRef {
    /// Collapse to one usable string: `url`, then `uri`, then `image`. Blank becomes `None`.
    pub fn into_uri(self) -> Option<String> {
        let candidate = match self {
            Self::Uri(s) => Some(s),
            Self::Object { url, uri, image } => [url, uri, image]
                .into_iter()
                .flatten()
                .find(|s| !s.is_empty()),
        };
        candidate.filter(|s| !s.trim().is_empty())
    }
}

impl From<&str> for PhotoRef {
    fn from(s: &str) -> Self {
        Self::Uri(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_of(body: Value) -> String {
        describe_error(Some(StatusCode::BAD_REQUEST), &body).1
    }

    #[test]
    fn typed_contract_wins() {
        let (kind, message) = describe_error(
            Some(StatusCode::BAD_REQUEST),
            &json!({"success": false, "error": {"kind": "conflict", "message": "Already exists"}}),
        );
        assert_eq!(kind, ErrorKind::Conflict);
        assert_eq!(message, "Already exists");
    }

    #[test]
    fn zod_error_uses_first_issue() {
        let issues = json!([
            {"path": ["title"], "message": "Title too short"},
            {"path": ["location"], "message": "Bad location"}
        ])
        .to_string();
        let body = json!({"success": false, "error": {"name": "ZodError", "message": issues}});
        assert_eq!(message_of(body), "Title too short");
    }

    #[test]
    fn zod_error_with_unparseable_issues() {
        let body = json!({"error": {"name": "ZodError", "message": "not json"}});
        assert_eq!(message_of(body), "Invalid data");
    }

    #[test]
    fn issue_array_field_is_read_directly() {
        let body = json!({"error": {"issues": [{"message": "Required"}]}});
        let (kind, message) = describe_error(None, &body);
        assert_eq!(kind, ErrorKind::Validation);
        assert_eq!(message, "Required");
    }

    #[test]
    fn string_error_and_message_field() {
        assert_eq!(message_of(json!({"error": "Invalid credentials"})), "Invalid credentials");
        assert_eq!(message_of(json!({"message": "Token expired"})), "Token expired");
    }

    #[test]
    fn unknown_shape_falls_back() {
        assert_eq!(message_of(json!({"error": {"code": 7}})), "Server error");
        assert_eq!(message_of(Value::Null), "Server error");
    }

    #[test]
    fn kind_follows_status_when_untyped() {
        let (kind, _) = describe_error(Some(StatusCode::UNAUTHORIZED), &json!({"error": "nope"}));
        assert_eq!(kind, ErrorKind::Unauthorized);
        let (kind, _) = describe_error(Some(StatusCode::BAD_GATEWAY), &Value::Null);
        assert_eq!(kind, ErrorKind::Server);
    }

    #[test]
    fn unsuccessful_envelope_is_an_error() {
        let err = parse_response::<Value>(StatusCode::OK, r#"{"success": false, "error": "Denied"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "Denied");
    }

    #[test]
    fn successful_envelope_yields_data() {
        let data: Option<Vec<u32>> =
            parse_response(StatusCode::OK, r#"{"success": true, "data": [1, 2]}"#).unwrap();
        assert_eq!(data, Some(vec![1, 2]));

        let none: Option<Vec<u32>> = parse_response(StatusCode::OK, r#"{"success": true}"#).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn non_json_error_body_uses_fallback() {
        let err = parse_response::<Value>(StatusCode::INTERNAL_SERVER_ERROR, "<html>").unwrap_err();
        assert!(matches!(
            err,
            ApiError::Rejected { status: Some(500), kind: ErrorKind::Server, .. }
        ));
    }

    #[test]
    fn photo_ref_normalization() {
        let obj: PhotoRef = serde_json::from_value(json!({"url": "http://x/y.jpg"})).unwrap();
        assert_eq!(obj.into_uri().as_deref(), Some("http://x/y.jpg"));

        let obj: PhotoRef = serde_json::from_value(json!({"url": "", "uri": "file:///a.png"})).unwrap();
        assert_eq!(obj.into_uri().as_deref(), Some("file:///a.png"));

        let obj: PhotoRef = serde_json::from_value(json!({"image": "i.jpg", "size": 3})).unwrap();
        assert_eq!(obj.into_uri().as_deref(), Some("i.jpg"));

        assert_eq!(PhotoRef::from("   ").into_uri(), None);
        let empty: PhotoRef = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.into_uri(), None);
    }
}
