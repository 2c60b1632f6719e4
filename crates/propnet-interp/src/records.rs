//! Serializable port-graph records.
//!
//! The same topology the in-memory node graph expresses with objects is kept
//! here as three flat record kinds: gadgets, ports and connections. Record
//! ids are plain strings so documents stay readable and diffable.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifies a port graph within a store.
    GraphId
);
string_id!(
    /// Identifies a port within its graph.
    PortId
);
string_id!(
    /// Identifies a gadget within its graph.
    GadgetId
);

/// A computation node: a named instance of a registered primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GadgetRecord {
    pub name: GadgetId,
    /// Free-form kind label.
    #[serde(rename = "type")]
    pub kind: String,
    pub primitive_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// A value slot. Owned by a gadget or free-standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRecord {
    pub name: PortId,
    /// Name the owning gadget's primitive uses for this port.
    pub port_name: String,
    pub direction: PortDirection,
    #[serde(default)]
    pub gadget: Option<GadgetId>,
    #[serde(default)]
    pub current_value: serde_json::Value,
}

impl PortRecord {
    /// A free-standing port with no value.
    pub fn free(name: impl Into<String>, direction: PortDirection) -> Self {
        let name = name.into();
        PortRecord {
            port_name: name.clone(),
            name: PortId(name),
            direction,
            gadget: None,
            current_value: serde_json::Value::Null,
        }
    }

    /// A gadget-owned port. Its id is `<gadget>.<port_name>`.
    pub fn owned(gadget: &GadgetId, port_name: impl Into<String>, direction: PortDirection) -> Self {
        let port_name = port_name.into();
        PortRecord {
            name: PortId(format!("{gadget}.{port_name}")),
            port_name,
            direction,
            gadget: Some(gadget.clone()),
            current_value: serde_json::Value::Null,
        }
    }
}

/// A directed edge from one port to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub name: String,
    pub source: PortId,
    pub target: PortId,
}

impl ConnectionRecord {
    /// A connection named `<source>-><target>`.
    pub fn between(source: &PortId, target: &PortId) -> Self {
        ConnectionRecord {
            name: format!("{source}->{target}"),
            source: source.clone(),
            target: target.clone(),
        }
    }
}

/// The serialized form of a whole port graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub gadgets: Vec<GadgetRecord>,
    #[serde(default)]
    pub ports: Vec<PortRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn port_record_uses_camel_case() {
        let gadget = GadgetId::new("sum");
        let port = PortRecord::owned(&gadget, "a", PortDirection::Input);
        let value = serde_json::to_value(&port).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "sum.a",
                "portName": "a",
                "direction": "input",
                "gadget": "sum",
                "currentValue": null,
            })
        );
    }

    #[test]
    fn gadget_record_kind_is_serialized_as_type() {
        let record = GadgetRecord {
            name: GadgetId::new("sum"),
            kind: "arith".into(),
            primitive_name: "add".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], json!("arith"));
        assert_eq!(value["primitiveName"], json!("add"));
    }

    #[test]
    fn free_port_defaults_when_fields_are_omitted() {
        let port: PortRecord = serde_json::from_value(json!({
            "name": "x",
            "portName": "x",
            "direction": "output",
        }))
        .unwrap();
        assert_eq!(port.gadget, None);
        assert_eq!(port.current_value, serde_json::Value::Null);
    }
}
