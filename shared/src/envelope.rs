//! JSON-RPC style envelope exchanged with connectors
//!
//! Requests and responses are loosely shaped on the wire: every field the
//! gateway cares about is optional, and anything else is carried through
//! untouched in `extra`. A key sent as `null` stays distinct from a missing
//! one (`Some(Value::Null)` or `Some(None)` against `None`), so re-serialising
//! a request writes back every key it was given.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Prefix carried by parent paths that is not part of the state key
pub const EDGE_PREFIX: &str = "edge.";

/// Strip the `edge.` prefix from a parent path to get its state key
pub fn state_key(parent: &str) -> &str {
    parent.strip_prefix(EDGE_PREFIX).unwrap_or(parent)
}

/// Deserialize a key that is present, `null` included, as `Some`
///
/// Paired with `#[serde(default)]` so that only a missing key yields `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn text(field: &Option<Option<String>>) -> Option<&str> {
    field.as_ref().and_then(Option::as_deref)
}

/// What a request does to the device attribute named by its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    Write,
    Other,
}

/// Outbound request or inbound notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Validated by the request pipeline; only strings are accepted
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub method: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamsField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `params` as found on the wire
///
/// Objects with the expected field types become [`Params`]; anything else
/// (positional arrays, `null`, mistyped fields) is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamsField {
    Object(Params),
    Raw(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(
        rename = "_type",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<Option<String>>,
    #[serde(
        rename = "_parent",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<Option<String>>,
    /// `Some(Value::Null)` when sent as `null`
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(
        rename = "__request_params",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_params: Option<Option<RequestParams>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Echo of the originating request carried by device notifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(
        rename = "_parent",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    /// Typed params, if the request carries an object of the expected shape
    pub fn params(&self) -> Option<&Params> {
        match &self.params {
            Some(ParamsField::Object(p)) => Some(p),
            _ => None,
        }
    }

    pub fn params_mut(&mut self) -> Option<&mut Params> {
        match &mut self.params {
            Some(ParamsField::Object(p)) => Some(p),
            _ => None,
        }
    }

    pub fn kind(&self) -> CallKind {
        match self.params().and_then(|p| text(&p.kind)) {
            Some("read") => CallKind::Read,
            Some("write") => CallKind::Write,
            _ => CallKind::Other,
        }
    }

    /// Non-empty `params._parent`
    pub fn parent(&self) -> Option<&str> {
        self.params()
            .and_then(|p| text(&p.parent))
            .filter(|p| !p.is_empty())
    }

    /// Non-empty `params.__request_params._parent`
    pub fn notification_parent(&self) -> Option<&str> {
        self.params()
            .and_then(|p| p.request_params.as_ref())
            .and_then(Option::as_ref)
            .and_then(|r| text(&r.parent))
            .filter(|p| !p.is_empty())
    }

    /// The request id when it is a string, empty otherwise
    pub fn id_str(&self) -> &str {
        self.id.as_ref().and_then(Value::as_str).unwrap_or_default()
    }

    pub fn method_str(&self) -> &str {
        text(&self.method).unwrap_or_default()
    }
}

/// Connector response to a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Whether the result is flagged `notification: true`
    pub fn is_notification(&self) -> bool {
        self.result
            .as_ref()
            .and_then(|r| r.get("notification"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A value handed to, or produced by, a transform action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionValue {
    Json(Value),
    Bytes(Bytes),
}

impl ActionValue {
    /// Wrap a wire value, decoding strings that are valid standard base64
    ///
    /// Strings that fail to decode are kept as they are.
    pub fn decode_base64(value: Value) -> Self {
        if let Value::String(s) = &value {
            if let Ok(decoded) = BASE64_STANDARD.decode(s) {
                return ActionValue::Bytes(Bytes::from(decoded));
            }
        }
        ActionValue::Json(value)
    }

    /// Back to JSON; bytes are written as a standard base64 string
    pub fn into_json(self) -> Value {
        match self {
            ActionValue::Json(v) => v,
            ActionValue::Bytes(b) => Value::String(BASE64_STANDARD.encode(&b)),
        }
    }
}

impl From<Value> for ActionValue {
    fn from(value: Value) -> Self {
        ActionValue::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_fields() {
        let req: Request = serde_json::from_value(json!({
            "id": "abc",
            "method": "ble-read",
            "params": {"_type": "read", "_parent": "edge.sensor.temp", "mac": "aa:bb"}
        }))
        .unwrap();

        assert_eq!(req.id_str(), "abc");
        assert_eq!(req.kind(), CallKind::Read);
        assert_eq!(req.parent(), Some("edge.sensor.temp"));
        assert_eq!(req.params().unwrap().extra["mac"], json!("aa:bb"));
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "method": "m",
            "params": {"_type": "write", "value": 3, "unit": "C"}
        });
        let req: Request = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&req).unwrap(), raw);
    }

    #[test]
    fn test_explicit_nulls_survive_roundtrip() {
        let raw = json!({
            "id": "1",
            "method": null,
            "params": {
                "_type": "write",
                "_parent": "edge.x",
                "value": null,
                "__request_params": null
            }
        });
        let req: Request = serde_json::from_value(raw.clone()).unwrap();
        let params = req.params().unwrap();
        assert_eq!(params.value, Some(Value::Null));
        assert_eq!(params.request_params, Some(None));
        assert_eq!(req.method, Some(None));
        assert_eq!(req.kind(), CallKind::Write);
        assert_eq!(serde_json::to_value(&req).unwrap(), raw);

        let raw = json!({"id": null, "params": {"_parent": null, "_type": null}});
        let req: Request = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(req.id, Some(Value::Null));
        assert_eq!(req.parent(), None);
        assert_eq!(req.kind(), CallKind::Other);
        assert_eq!(serde_json::to_value(&req).unwrap(), raw);

        let raw = json!({"method": "m", "params": null});
        let req: Request = serde_json::from_value(raw.clone()).unwrap();
        assert!(req.params().is_none());
        assert_eq!(serde_json::to_value(&req).unwrap(), raw);
    }

    #[test]
    fn test_missing_keys_stay_absent() {
        let req: Request = serde_json::from_value(json!({"params": {"_type": "read"}})).unwrap();
        assert_eq!(req.id, None);
        assert_eq!(req.method, None);
        assert_eq!(req.params().unwrap().value, None);
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"params": {"_type": "read"}}));
    }

    #[test]
    fn test_positional_params_kept_raw() {
        let req: Request = serde_json::from_value(json!({"method": "m", "params": [1, 2]})).unwrap();
        assert!(req.params().is_none());
        assert_eq!(req.kind(), CallKind::Other);
        assert_eq!(serde_json::to_value(&req).unwrap()["params"], json!([1, 2]));
    }

    #[test]
    fn test_empty_parent_is_none() {
        let req: Request =
            serde_json::from_value(json!({"params": {"_type": "read", "_parent": ""}})).unwrap();
        assert_eq!(req.parent(), None);
    }

    #[test]
    fn test_notification_parent() {
        let req: Request = serde_json::from_value(json!({
            "method": "notify",
            "params": {"value": 1, "__request_params": {"_parent": "edge.door.open"}}
        }))
        .unwrap();
        assert_eq!(req.notification_parent(), Some("edge.door.open"));
        assert_eq!(req.parent(), None);
    }

    #[test]
    fn test_state_key() {
        assert_eq!(state_key("edge.sensor.temp"), "sensor.temp");
        assert_eq!(state_key("sensor.temp"), "sensor.temp");
    }

    #[test]
    fn test_response_notification_flag() {
        let resp: Response =
            serde_json::from_value(json!({"result": {"notification": true}})).unwrap();
        assert!(resp.is_notification());

        let resp: Response = serde_json::from_value(json!({"result": {"notification": "yes"}})).unwrap();
        assert!(!resp.is_notification());
    }

    #[test]
    fn test_base64_decoding() {
        assert_eq!(
            ActionValue::decode_base64(json!("AQI=")),
            ActionValue::Bytes(Bytes::from_static(&[1, 2]))
        );
        // not valid base64: left alone
        assert_eq!(
            ActionValue::decode_base64(json!("25")),
            ActionValue::Json(json!("25"))
        );
        assert_eq!(ActionValue::decode_base64(json!(25)), ActionValue::Json(json!(25)));
        assert_eq!(
            ActionValue::Bytes(Bytes::from_static(&[1, 2])).into_json(),
            json!("AQI=")
        );
    }
}
