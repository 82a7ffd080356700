// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for node inputs/outputs.

use crate::id::PinHandle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    /// Input pin
    Input,
    /// Output pin
    Output,
}

impl PinDirection {
    /// The opposite direction
    pub fn flipped(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }

    /// Whether this is an input
    pub fn is_input(self) -> bool {
        self == Self::Input
    }
}

/// Data type that can flow through pins
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinType {
    /// Execution flow
    Flow,
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// String value
    String,
    /// 2D vector
    Vec2,
    /// 3D vector
    Vec3,
    /// 4D vector
    Vec4,
    /// Color (RGBA)
    Color,
    /// Object reference
    Object,
    /// Host-defined type
    Custom(String),
    /// Wildcard, matches every other type
    Any,
}

impl PinType {
    /// Whether this is the wildcard type
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Check if this type can connect to another type
    pub fn compatible_with(&self, other: &PinType) -> bool {
        self.is_wildcard() || other.is_wildcard() || self == other
    }

    /// Short display name
    pub fn name(&self) -> &str {
        match self {
            Self::Flow => "Flow",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::Vec2 => "Vec2",
            Self::Vec3 => "Vec3",
            Self::Vec4 => "Vec4",
            Self::Color => "Color",
            Self::Object => "Object",
            Self::Custom(name) => name,
            Self::Any => "Any",
        }
    }
}

/// Visual pin shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinShape {
    /// Circle
    #[default]
    Circle,
    /// Square
    Square,
    /// Triangle
    Triangle,
    /// Diamond
    Diamond,
}

/// A pin on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    /// Compact handle
    pub handle: PinHandle,
    /// External identifier
    pub uuid: Uuid,
    /// Pin name
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Data type
    pub pin_type: PinType,
    /// Visual shape
    pub shape: PinShape,
    /// True iff at least one connection references this pin.
    /// Maintained by the graph store.
    pub connected: bool,
    /// On a subgraph instance, the interface pin this pin mirrors
    pub mirror_of: Option<PinHandle>,
}

impl Pin {
    /// Create a new unconnected pin
    pub fn new(
        handle: PinHandle,
        uuid: Uuid,
        name: impl Into<String>,
        direction: PinDirection,
        pin_type: PinType,
    ) -> Self {
        Self {
            handle,
            uuid,
            name: name.into(),
            direction,
            pin_type,
            shape: PinShape::default(),
            connected: false,
            mirror_of: None,
        }
    }

    /// Set the shape
    pub fn with_shape(mut self, shape: PinShape) -> Self {
        self.shape = shape;
        self
    }

    /// Whether this pin is an input
    pub fn is_input(&self) -> bool {
        self.direction.is_input()
    }
}

/// Blueprint for a pin, used by node templates and commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSpec {
    /// Pin name
    pub name: String,
    /// Pin direction
    pub direction: PinDirection,
    /// Data type
    pub pin_type: PinType,
    /// Visual shape
    #[serde(default)]
    pub shape: PinShape,
}

impl PinSpec {
    /// Input pin blueprint
    pub fn input(name: impl Into<String>, pin_type: PinType) -> Self {
        Self {
            name: name.into(),
            direction: PinDirection::Input,
            pin_type,
            shape: PinShape::default(),
        }
    }

    /// Output pin blueprint
    pub fn output(name: impl Into<String>, pin_type: PinType) -> Self {
        Self {
            name: name.into(),
            direction: PinDirection::Output,
            pin_type,
            shape: PinShape::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_compatibility() {
        assert!(PinType::Float.compatible_with(&PinType::Float));
        assert!(!PinType::Float.compatible_with(&PinType::Int));
        assert!(PinType::Any.compatible_with(&PinType::Flow));
        assert!(PinType::Vec3.compatible_with(&PinType::Any));
        assert!(PinType::Any.compatible_with(&PinType::Any));
        assert!(PinType::Custom("Mesh".into()).compatible_with(&PinType::Custom("Mesh".into())));
        assert!(!PinType::Custom("Mesh".into()).compatible_with(&PinType::Custom("Light".into())));
    }

    #[test]
    fn test_direction_flip() {
        assert_eq!(PinDirection::Input.flipped(), PinDirection::Output);
        assert_eq!(PinDirection::Output.flipped(), PinDirection::Input);
    }
}
