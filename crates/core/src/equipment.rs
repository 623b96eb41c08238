//! Typed schema for the equipment hierarchy (site → area → line → machine).
//!
//! The hierarchy is owned by an external provider and consumed read-only.
//! Readings arrive as `{key, value, unit}` properties; [`NodeReadings`]
//! lifts the ones the monitoring engine cares about into typed fields so
//! the evaluator never performs string lookups itself.

use serde::{Deserialize, Serialize};

use crate::metric_names::{METRIC_OEE, METRIC_SPEED, METRIC_TEMPERATURE, PROPERTY_STATUS};
use crate::types::EquipmentId;

/// Level of a node within the plant hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Site,
    Area,
    Line,
    Machine,
    Sensor,
}

/// Value of a single equipment property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Flag(value)
    }
}

/// A keyed reading on an equipment node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One node of the equipment hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentNode {
    pub id: EquipmentId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub children: Vec<EquipmentNode>,
}

impl EquipmentNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Attach a property (builder style).
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
        unit: Option<&str>,
    ) -> Self {
        self.properties.push(Property {
            key: key.into(),
            value: value.into(),
            unit: unit.map(str::to_string),
        });
        self
    }

    /// Attach a child node (builder style).
    pub fn with_child(mut self, child: EquipmentNode) -> Self {
        self.children.push(child);
        self
    }

    /// First property with the given key, if any.
    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// Extract the monitored readings of this node.
    pub fn readings(&self) -> NodeReadings {
        let number = |key: &str| self.property(key).and_then(|p| p.value.as_number());
        NodeReadings {
            temperature: number(METRIC_TEMPERATURE),
            speed: number(METRIC_SPEED),
            oee: number(METRIC_OEE),
            status: self
                .property(PROPERTY_STATUS)
                .and_then(|p| p.value.as_text())
                .map(EquipmentStatus::from_text),
        }
    }

    /// Depth-first, parent-before-children traversal.
    ///
    /// The visitor receives each node together with its ancestors, root
    /// first.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&EquipmentNode, &[&EquipmentNode]),
    {
        let mut ancestors = Vec::new();
        self.walk_inner(&mut ancestors, &mut visit);
    }

    fn walk_inner<'a, F>(&'a self, ancestors: &mut Vec<&'a EquipmentNode>, visit: &mut F)
    where
        F: FnMut(&EquipmentNode, &[&EquipmentNode]),
    {
        visit(self, ancestors);
        ancestors.push(self);
        for child in &self.children {
            child.walk_inner(ancestors, visit);
        }
        ancestors.pop();
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(EquipmentNode::node_count).sum::<usize>()
    }
}

/// Separator placed between node names in a hierarchical location.
pub const LOCATION_SEPARATOR: &str = " > ";

/// Build the display location of `node`: ancestor names, then its own name.
pub fn location_path(node: &EquipmentNode, ancestors: &[&EquipmentNode]) -> String {
    ancestors
        .iter()
        .map(|a| a.name.as_str())
        .chain(std::iter::once(node.name.as_str()))
        .collect::<Vec<_>>()
        .join(LOCATION_SEPARATOR)
}

/// Operating status reported through the `status` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EquipmentStatus {
    Running,
    Idle,
    Stopped,
    Maintenance,
    Other(String),
}

impl EquipmentStatus {
    /// Case-insensitive parse; unknown values are kept verbatim.
    pub fn from_text(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "running" => EquipmentStatus::Running,
            "idle" => EquipmentStatus::Idle,
            "stopped" => EquipmentStatus::Stopped,
            "maintenance" => EquipmentStatus::Maintenance,
            _ => EquipmentStatus::Other(text.to_string()),
        }
    }
}

/// Monitored readings of one node, lifted out of its property list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeReadings {
    pub temperature: Option<f64>,
    pub speed: Option<f64>,
    pub oee: Option<f64>,
    pub status: Option<EquipmentStatus>,
}

impl NodeReadings {
    pub fn is_stopped(&self) -> bool {
        matches!(self.status, Some(EquipmentStatus::Stopped))
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.speed.is_none() && self.oee.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
