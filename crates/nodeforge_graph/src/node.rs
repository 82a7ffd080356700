// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph.

use crate::id::{GroupHandle, NodeHandle, PinHandle, SubgraphHandle};
use crate::pin::{Pin, PinDirection, PinSpec};
use egui::{Pos2, Rect, Vec2};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default node size in world units
pub const DEFAULT_NODE_SIZE: Vec2 = Vec2::new(180.0, 80.0);

/// Where the node's label is drawn relative to the body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelPlacement {
    /// No external label
    #[default]
    None,
    /// Left of the body
    Left,
    /// Right of the body
    Right,
}

/// Metadata value attached to nodes and subgraphs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// 2D vector
    Vec2([f32; 2]),
    /// Color (RGBA)
    Color([f32; 4]),
    /// String
    String(String),
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Compact handle
    pub handle: NodeHandle,
    /// External identifier
    pub uuid: Uuid,
    /// Display name
    pub name: String,
    /// Node type tag
    pub node_type: String,
    /// Top-left corner in world space
    pub position: Pos2,
    /// Size in world space
    pub size: Vec2,
    /// Input pins, in insertion order
    pub inputs: Vec<Pin>,
    /// Output pins, in insertion order
    pub outputs: Vec<Pin>,
    /// Selection flag
    pub selected: bool,
    /// Disabled flag
    pub disabled: bool,
    /// Template flag
    pub template: bool,
    /// "Current" flag, e.g. the node being executed by the host
    pub current: bool,
    /// Protected nodes cannot be removed
    pub protected: bool,
    /// Group membership
    pub group: Option<GroupHandle>,
    /// Optional icon glyph
    pub icon: Option<String>,
    /// Label placement
    pub label: LabelPlacement,
    /// Containing subgraph, `None` for the root graph
    pub subgraph: Option<SubgraphHandle>,
    /// Set when this node is an instance of a subgraph
    pub subgraph_target: Option<SubgraphHandle>,
    /// Free-form metadata
    pub metadata: IndexMap<String, MetaValue>,
}

impl Node {
    /// Create a new node with no pins
    pub fn new(
        handle: NodeHandle,
        uuid: Uuid,
        name: impl Into<String>,
        node_type: impl Into<String>,
        position: Pos2,
    ) -> Self {
        Self {
            handle,
            uuid,
            name: name.into(),
            node_type: node_type.into(),
            position,
            size: DEFAULT_NODE_SIZE,
            inputs: Vec::new(),
            outputs: Vec::new(),
            selected: false,
            disabled: false,
            template: false,
            current: false,
            protected: false,
            group: None,
            icon: None,
            label: LabelPlacement::None,
            subgraph: None,
            subgraph_target: None,
            metadata: IndexMap::new(),
        }
    }

    /// Get a pin by handle
    pub fn pin(&self, pin: PinHandle) -> Option<&Pin> {
        self.inputs
            .iter()
            .find(|p| p.handle == pin)
            .or_else(|| self.outputs.iter().find(|p| p.handle == pin))
    }

    /// Get a mutable pin by handle
    pub fn pin_mut(&mut self, pin: PinHandle) -> Option<&mut Pin> {
        if let Some(index) = self.inputs.iter().position(|p| p.handle == pin) {
            return self.inputs.get_mut(index);
        }
        self.outputs.iter_mut().find(|p| p.handle == pin)
    }

    /// Get all pins, inputs first
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Pins of one direction
    pub fn pins_in(&self, direction: PinDirection) -> &[Pin] {
        match direction {
            PinDirection::Input => &self.inputs,
            PinDirection::Output => &self.outputs,
        }
    }

    /// Index of a pin within its direction's sequence
    pub fn pin_index(&self, pin: PinHandle) -> Option<(PinDirection, usize)> {
        if let Some(i) = self.inputs.iter().position(|p| p.handle == pin) {
            return Some((PinDirection::Input, i));
        }
        self.outputs
            .iter()
            .position(|p| p.handle == pin)
            .map(|i| (PinDirection::Output, i))
    }

    /// World-space bounds
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(self.position, self.size)
    }

    /// Whether this node stands in for a subgraph
    pub fn is_subgraph_instance(&self) -> bool {
        self.subgraph_target.is_some()
    }
}

/// Blueprint for a node type: default pins and appearance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTemplate {
    /// Type tag the template creates
    pub type_tag: String,
    /// Default display name
    pub name: String,
    /// Default pins
    pub pins: Vec<PinSpec>,
    /// Icon glyph
    pub icon: Option<String>,
    /// Size override
    pub size: Option<Vec2>,
}

impl NodeTemplate {
    /// Create a template with no pins
    pub fn new(type_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            name: name.into(),
            pins: Vec::new(),
            icon: None,
            size: None,
        }
    }

    /// Add a default pin
    pub fn with_pin(mut self, pin: PinSpec) -> Self {
        self.pins.push(pin);
        self
    }
}

/// Registry of node templates keyed by type tag
#[derive(Debug, Clone, Default)]
pub struct NodeTemplates {
    templates: IndexMap<String, NodeTemplate>,
}

impl NodeTemplates {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any with the same type tag
    pub fn register(&mut self, template: NodeTemplate) {
        self.templates.insert(template.type_tag.clone(), template);
    }

    /// Get a template by type tag
    pub fn get(&self, type_tag: &str) -> Option<&NodeTemplate> {
        self.templates.get(type_tag)
    }

    /// All registered templates
    pub fn iter(&self) -> impl Iterator<Item = &NodeTemplate> {
        self.templates.values()
    }
}
