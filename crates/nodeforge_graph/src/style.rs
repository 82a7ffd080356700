// SPDX-License-Identifier: MIT OR Apache-2.0
//! Colors and scalars handed to the renderer.

use crate::config::ConfigError;
use crate::pin::PinType;
use egui::Color32;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Colors of one node type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePalette {
    /// Body fill
    pub base: Color32,
    /// Header fill
    pub header: Color32,
    /// Accent stripe and icon
    pub accent: Color32,
    /// Outline
    pub border: Color32,
    /// Outline when selected
    pub selected: Color32,
    /// Outline when hovered
    pub hovered: Color32,
    /// Glow around the current node
    pub glow: Color32,
}

impl NodePalette {
    /// Palette built around a header color
    pub fn with_header(header: Color32) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }
}

impl Default for NodePalette {
    fn default() -> Self {
        Self {
            base: Color32::from_rgb(45, 45, 48),
            header: Color32::from_rgb(70, 100, 130),
            accent: Color32::from_rgb(100, 150, 255),
            border: Color32::from_rgb(80, 80, 100),
            selected: Color32::from_rgb(100, 150, 255),
            hovered: Color32::from_rgb(60, 70, 90),
            glow: Color32::from_rgba_unmultiplied(100, 150, 255, 60),
        }
    }
}

/// Colors of one pin type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinPalette {
    /// Unconnected fill
    pub base: Color32,
    /// Fill under the pointer
    pub hover: Color32,
    /// Fill when connected
    pub connected: Color32,
}

impl PinPalette {
    /// Palette derived from one base color
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let lift = |c: u8| c.saturating_add(40);
        Self {
            base: Color32::from_rgb(r / 2, g / 2, b / 2),
            hover: Color32::from_rgb(lift(r), lift(g), lift(b)),
            connected: Color32::from_rgb(r, g, b),
        }
    }
}

/// Visual style of the whole graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStyle {
    /// Palettes by node type tag
    pub nodes: IndexMap<String, NodePalette>,
    /// Palette for unknown node types
    pub default_node: NodePalette,
    /// Palettes by pin type
    pub pins: IndexMap<PinType, PinPalette>,
    /// Palette for unknown pin types
    pub default_pin: PinPalette,
    /// Canvas background
    pub background: Color32,
    /// Grid line spacing in world units
    pub grid_spacing: f32,
    /// Node corner radius
    pub node_corner_radius: f32,
    /// Pin radius
    pub pin_radius: f32,
    /// Connection stroke width
    pub connection_thickness: f32,
    /// Selected connection color
    pub connection_selected: Color32,
    /// Box-select fill
    pub selection_fill: Color32,
    /// Wire preview color while the snap target is illegal
    pub invalid_wire: Color32,
}

impl Default for GraphStyle {
    fn default() -> Self {
        let pins = [
            (PinType::Flow, PinPalette::from_rgb(200, 200, 200)),
            (PinType::Bool, PinPalette::from_rgb(200, 80, 80)),
            (PinType::Int, PinPalette::from_rgb(80, 200, 200)),
            (PinType::Float, PinPalette::from_rgb(80, 200, 80)),
            (PinType::String, PinPalette::from_rgb(200, 180, 150)),
            (PinType::Vec2, PinPalette::from_rgb(200, 200, 80)),
            (PinType::Vec3, PinPalette::from_rgb(200, 150, 80)),
            (PinType::Vec4, PinPalette::from_rgb(200, 100, 200)),
            (PinType::Color, PinPalette::from_rgb(255, 200, 100)),
            (PinType::Object, PinPalette::from_rgb(150, 200, 150)),
            (PinType::Any, PinPalette::from_rgb(150, 150, 150)),
        ];
        let nodes = [
            (crate::subgraph::INTERFACE_INPUT_TYPE, Color32::from_rgb(60, 110, 70)),
            (crate::subgraph::INTERFACE_OUTPUT_TYPE, Color32::from_rgb(110, 70, 60)),
            (crate::subgraph::INSTANCE_TYPE, Color32::from_rgb(90, 80, 130)),
        ];
        Self {
            nodes: nodes
                .into_iter()
                .map(|(tag, header)| (tag.to_string(), NodePalette::with_header(header)))
                .collect(),
            default_node: NodePalette::default(),
            pins: pins.into_iter().collect(),
            default_pin: PinPalette::from_rgb(128, 128, 128),
            background: Color32::from_rgb(30, 30, 30),
            grid_spacing: 20.0,
            node_corner_radius: 6.0,
            pin_radius: 6.0,
            connection_thickness: 2.5,
            connection_selected: Color32::WHITE,
            selection_fill: Color32::from_rgba_unmultiplied(100, 150, 255, 30),
            invalid_wire: Color32::from_rgb(220, 60, 60),
        }
    }
}

impl GraphStyle {
    /// Palette for a node type, falling back to the default
    pub fn node_palette(&self, type_tag: &str) -> &NodePalette {
        self.nodes.get(type_tag).unwrap_or(&self.default_node)
    }

    /// Palette for a pin type, falling back to the default
    pub fn pin_palette(&self, pin_type: &PinType) -> &PinPalette {
        self.pins.get(pin_type).unwrap_or(&self.default_pin)
    }

    /// Register or replace a node type palette
    pub fn set_node_palette(&mut self, type_tag: impl Into<String>, palette: NodePalette) {
        self.nodes.insert(type_tag.into(), palette);
    }

    /// Parse from RON
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_fallbacks() {
        let mut style = GraphStyle::default();
        assert_eq!(style.node_palette("unknown"), &style.default_node);
        assert_eq!(style.pin_palette(&PinType::Custom("Mesh".into())), &style.default_pin);
        assert_eq!(style.pin_palette(&PinType::Float).connected, Color32::from_rgb(80, 200, 80));

        let shader = NodePalette::with_header(Color32::from_rgb(1, 2, 3));
        style.set_node_palette("shader", shader);
        assert_eq!(style.node_palette("shader"), &shader);
    }

    #[test]
    fn test_serialization() {
        let style = GraphStyle::default();
        let ron_str = style.to_ron().unwrap();
        assert_eq!(GraphStyle::from_ron(&ron_str).unwrap(), style);
    }
}
