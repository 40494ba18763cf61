//! Edge object and device model as served by the cloud API

use crate::actions::{read_action, write_action};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The managed device instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeObject {
    pub id: String,
    /// Identifier of the model this object is an instance of
    pub model: String,
    /// Configuration tree used to fill payload templates
    #[serde(default)]
    pub config: Value,
}

/// Device capability description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Read/write transforms per device attribute
    #[serde(default)]
    pub actions: Vec<ModelAction>,
    /// Scheduled and subscribed interactions, in declaration order
    #[serde(default)]
    pub interactions: Vec<ActionConfig>,
}

/// Transform sources for one device attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelAction {
    /// Dotted attribute path, e.g. `edge.sensor.temp`
    pub parent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<String>,
}

impl Model {
    /// Every transform as a `(registry name, source)` pair
    pub fn expressions(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        for action in &self.actions {
            if let Some(src) = &action.read {
                out.push((read_action(&action.parent), src.as_str()));
            }
            if let Some(src) = &action.write {
                out.push((write_action(&action.parent), src.as_str()));
            }
        }
        out
    }
}

/// A recurring or subscribed device interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub id: String,
    /// `schedule` or `subscribe`; anything else fails bootstrap
    #[serde(rename = "type")]
    pub kind: String,
    /// Connector the payload is dispatched to
    pub connector: String,
    pub payload: PayloadTemplate,
    #[serde(default)]
    pub interval: String,
}

/// Request payload, either as template text or as a JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadTemplate {
    Text(String),
    Json(Value),
}

impl PayloadTemplate {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PayloadTemplate::Text(s) => s.clone().into_bytes(),
            PayloadTemplate::Json(v) => v.to_string().into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_expressions() {
        let model: Model = serde_json::from_value(json!({
            "id": "m1",
            "actions": [
                {"parent": "edge.sensor.temp", "read": "value / 10"},
                {"parent": "edge.relay", "read": "value", "write": "value == true"}
            ]
        }))
        .unwrap();

        let names: Vec<String> = model.expressions().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["read.edge.sensor.temp", "read.edge.relay", "write.edge.relay"]
        );
    }

    #[test]
    fn test_payload_forms() {
        let cfg: ActionConfig = serde_json::from_value(json!({
            "id": "poll",
            "type": "schedule",
            "connector": "ble",
            "payload": {"method": "read", "params": {"mac": "{{ object.config.mac }}"}},
            "interval": "@every 10s"
        }))
        .unwrap();
        let payload: Value = serde_json::from_slice(&cfg.payload.to_bytes()).unwrap();
        assert_eq!(payload["params"]["mac"], "{{ object.config.mac }}");

        let text = PayloadTemplate::Text(r#"{"n": {{ object.config.n }}}"#.into());
        assert_eq!(text.to_bytes(), br#"{"n": {{ object.config.n }}}"#.to_vec());
    }
}
