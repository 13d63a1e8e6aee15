//! Wire frame types and inbound frame classification.
//!
//! The protocol runs three JSON object shapes over the sockets:
//!
//! - outbound request: `{command, arguments?, customTag?}` (plus
//!   `streamSessionId` and flattened arguments on streaming commands),
//! - inbound reply: `{status, customTag, returnData?, errorCode?, errorDescr?}`,
//! - inbound push: `{command, data?, errorCode?, errorDescr?}`.
//!
//! There is no framing byte: inbound frames are classified by payload shape.
//! An object carrying a `status` field and a non-empty `customTag` is a reply
//! to a correlated call; an object carrying a `command` field is a push frame
//! for a subscription. That rule is load-bearing and must not change.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Error code carried by locally fabricated failure replies.
///
/// Distinguishes "the transport died under us" from genuine server rejections.
pub const TRANSPORT_CLOSED_CODE: &str = "transport_closed";

/// One correlated request on the request/response channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Command name, e.g. `login` or `getCurrentUserData`.
    pub command: String,
    /// Opaque argument payload; the engine never inspects it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Correlation tag echoed back by the server.
    ///
    /// Absent only on fire-and-forget control frames.
    #[serde(
        rename = "customTag",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_tag: Option<String>,
}

impl Request {
    /// Creates a request with no arguments and no tag.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: None,
            custom_tag: None,
        }
    }

    /// Attaches a serialized argument payload.
    pub fn with_arguments<A: Serialize>(mut self, arguments: &A) -> Result<Self> {
        self.arguments = Some(serde_json::to_value(arguments)?);
        Ok(self)
    }

    /// Sets an explicit correlation tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.custom_tag = Some(tag.into());
        self
    }

    /// Assigns a freshly generated correlation tag.
    pub fn with_random_tag(self) -> Self {
        self.with_tag(Uuid::new_v4().to_string())
    }

    /// Returns `true` when no usable correlation tag is set.
    pub(crate) fn tag_is_empty(&self) -> bool {
        self.custom_tag.as_deref().map_or(true, str::is_empty)
    }
}

/// One command on the streaming channel.
///
/// Streaming commands flatten their arguments into the top-level object next
/// to `command` and `streamSessionId`, instead of nesting them under
/// `arguments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRequest {
    /// Command name, e.g. `getCandles` or `stopCandles`.
    pub command: String,
    /// Session handle obtained from the login reply.
    #[serde(
        rename = "streamSessionId",
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_session_id: Option<String>,
    /// Flattened argument fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamRequest {
    /// Creates a streaming command with no session and no extra fields.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stream_session_id: None,
            extra: Map::new(),
        }
    }

    /// Sets the stream session id.
    pub fn with_session(mut self, stream_session_id: impl Into<String>) -> Self {
        self.stream_session_id = Some(stream_session_id.into());
        self
    }

    /// Flattens the fields of `arguments` into the frame.
    ///
    /// `arguments` must serialize to a JSON object.
    pub fn with_extra<A: Serialize>(mut self, arguments: &A) -> Result<Self> {
        match serde_json::to_value(arguments)? {
            Value::Object(fields) => {
                self.extra.extend(fields);
                Ok(self)
            }
            other => Err(Error::invalid_request(format!(
                "stream arguments must be an object, got {other}"
            ))),
        }
    }
}

/// One reply on the request/response channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Response {
    /// `true` when the command succeeded.
    #[serde(default)]
    pub status: bool,
    /// Correlation tag echoing the request.
    #[serde(
        rename = "customTag",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_tag: Option<String>,
    /// Opaque result payload, present only on success.
    #[serde(
        rename = "returnData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub return_data: Option<Value>,
    /// Stream session handle, present on the login reply.
    #[serde(
        rename = "streamSessionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_session_id: Option<String>,
    /// Error code, present only on failure.
    #[serde(
        rename = "errorCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_code: Option<String>,
    /// Error description, present only on failure.
    #[serde(
        rename = "errorDescr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_descr: Option<String>,
}

impl Response {
    /// Fabricates the failure reply delivered to waiters when the transport
    /// dies (as opposed to a genuine server rejection).
    pub fn synthetic_failure(tag: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status: false,
            custom_tag: Some(tag.into()),
            error_code: Some(TRANSPORT_CLOSED_CODE.to_string()),
            error_descr: Some(description.into()),
            ..Self::default()
        }
    }

    /// Converts a failed reply into the matching typed error.
    pub fn into_result(self) -> Result<Self> {
        if self.status {
            return Ok(self);
        }
        let code = self.error_code.unwrap_or_default();
        let description = self.error_descr.unwrap_or_default();
        if code == TRANSPORT_CLOSED_CODE {
            Err(Error::transport_closed(description))
        } else {
            Err(Error::api(code, description))
        }
    }
}

/// One push frame on the streaming channel.
///
/// Push frames carry no correlation tag; routing uses `command` alone, so at
/// most one subscription per push-command type can be open at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Push type, e.g. `candle` or `balance`.
    pub command: String,
    /// Opaque update payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error code, set on server-side stream errors.
    #[serde(
        rename = "errorCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_code: Option<String>,
    /// Error description, set on server-side stream errors.
    #[serde(
        rename = "errorDescr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_descr: Option<String>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Reply to a correlated call, routed by its tag.
    Reply(Response),
    /// Subscription push, routed by its command.
    Push(StreamFrame),
}

impl InboundFrame {
    /// Classifies one inbound frame by payload shape.
    pub fn classify(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let object = value
            .as_object()
            .ok_or_else(|| serde_json::Error::custom("frame is not a JSON object"))?;

        let has_status = object.contains_key("status");
        let tagged = object
            .get("customTag")
            .and_then(Value::as_str)
            .is_some_and(|tag| !tag.is_empty());

        if has_status && tagged {
            return Ok(Self::Reply(serde_json::from_value(value)?));
        }
        if object.get("command").and_then(Value::as_str).is_some() {
            return Ok(Self::Push(serde_json::from_value(value)?));
        }
        if has_status {
            // Untagged reply, e.g. the ack of a fire-and-forget control frame.
            return Ok(Self::Reply(serde_json::from_value(value)?));
        }
        Err(serde_json::Error::custom("frame is neither a reply nor a push").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_minimal_shape() {
        let request = Request::new("ping");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"command": "ping"})
        );
    }

    #[test]
    fn request_serializes_full_shape() {
        let request = Request::new("login")
            .with_arguments(&json!({"userId": "42", "password": "pw"}))
            .unwrap()
            .with_tag("tag-1");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "command": "login",
                "arguments": {"userId": "42", "password": "pw"},
                "customTag": "tag-1",
            })
        );
    }

    #[test]
    fn random_tag_is_set_and_unique() {
        let a = Request::new("ping").with_random_tag();
        let b = Request::new("ping").with_random_tag();
        assert!(!a.tag_is_empty());
        assert_ne!(a.custom_tag, b.custom_tag);
    }

    #[test]
    fn stream_request_flattens_extra_fields() {
        let request = StreamRequest::new("getCandles")
            .with_session("sess-1")
            .with_extra(&json!({"symbol": "EURUSD"}))
            .unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "command": "getCandles",
                "streamSessionId": "sess-1",
                "symbol": "EURUSD",
            })
        );
    }

    #[test]
    fn stream_request_rejects_non_object_extra() {
        let err = StreamRequest::new("getCandles")
            .with_extra(&json!([1, 2]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn classify_reply() {
        let frame =
            InboundFrame::classify(r#"{"status":true,"customTag":"a","returnData":{"x":1}}"#)
                .unwrap();
        match frame {
            InboundFrame::Reply(response) => {
                assert!(response.status);
                assert_eq!(response.custom_tag.as_deref(), Some("a"));
                assert_eq!(response.return_data, Some(json!({"x": 1})));
            }
            InboundFrame::Push(_) => panic!("classified as push"),
        }
    }

    #[test]
    fn classify_push() {
        let frame =
            InboundFrame::classify(r#"{"command":"candle","data":{"symbol":"EURUSD"}}"#).unwrap();
        match frame {
            InboundFrame::Push(push) => {
                assert_eq!(push.command, "candle");
                assert_eq!(push.data, Some(json!({"symbol": "EURUSD"})));
            }
            InboundFrame::Reply(_) => panic!("classified as reply"),
        }
    }

    #[test]
    fn classify_untagged_reply_stays_a_reply() {
        let frame = InboundFrame::classify(r#"{"status":true}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Reply(_)));
    }

    #[test]
    fn classify_rejects_unroutable_frames() {
        assert!(InboundFrame::classify("[1,2]").is_err());
        assert!(InboundFrame::classify(r#"{"foo":"bar"}"#).is_err());
        assert!(InboundFrame::classify("not json").is_err());
    }

    #[test]
    fn synthetic_failure_converts_to_transport_closed() {
        let response = Response::synthetic_failure("a", "read loop terminated");
        assert!(!response.status);
        assert_eq!(
            response.error_code.as_deref(),
            Some(TRANSPORT_CLOSED_CODE)
        );
        let err = response.into_result().unwrap_err();
        assert!(err.is_transport_closed());
    }

    #[test]
    fn server_rejection_converts_to_api_error() {
        let response = Response {
            status: false,
            custom_tag: Some("a".to_string()),
            error_code: Some("BE005".to_string()),
            error_descr: Some("invalid login".to_string()),
            ..Response::default()
        };
        let err = response.into_result().unwrap_err();
        let details = err.as_api().unwrap();
        assert_eq!(details.code, "BE005");
    }

    #[test]
    fn successful_response_passes_through() {
        let response = Response {
            status: true,
            custom_tag: Some("a".to_string()),
            ..Response::default()
        };
        assert!(response.into_result().is_ok());
    }
}
