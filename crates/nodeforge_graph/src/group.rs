// SPDX-License-Identifier: MIT OR Apache-2.0
//! Groups: visual containers clustering a set of nodes.

use crate::id::{GroupHandle, NodeHandle, SubgraphHandle};
use egui::{Color32, Pos2, Rect, Vec2};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visual style variant of a group frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupStyle {
    /// Filled body with a header bar
    #[default]
    Filled,
    /// Outline only
    Outlined,
    /// Header bar only, transparent body
    Minimal,
}

/// A group of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Compact handle
    pub handle: GroupHandle,
    /// External identifier
    pub uuid: Uuid,
    /// Display name
    pub name: String,
    /// Top-left corner in world space
    pub position: Pos2,
    /// Size in world space
    pub size: Vec2,
    /// Frame color
    pub color: Color32,
    /// Style variant
    pub style: GroupStyle,
    /// Collapsed flag
    pub collapsed: bool,
    /// Selection flag
    pub selected: bool,
    /// Scope the group is drawn in
    pub subgraph: Option<SubgraphHandle>,
    /// Member nodes
    pub nodes: IndexSet<NodeHandle>,
}

impl Group {
    /// Create an empty group
    pub fn new(
        handle: GroupHandle,
        uuid: Uuid,
        name: impl Into<String>,
        position: Pos2,
        size: Vec2,
    ) -> Self {
        Self {
            handle,
            uuid,
            name: name.into(),
            position,
            size,
            color: Color32::from_rgb(70, 100, 130),
            style: GroupStyle::default(),
            collapsed: false,
            selected: false,
            subgraph: None,
            nodes: IndexSet::new(),
        }
    }

    /// World-space bounds
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(self.position, self.size)
    }

    /// Header strip of the given height
    pub fn header_rect(&self, header_height: f32) -> Rect {
        Rect::from_min_size(self.position, Vec2::new(self.size.x, header_height.min(self.size.y)))
    }

    /// Square resize handle in the bottom-right corner
    pub fn resize_handle_rect(&self, handle_size: f32) -> Rect {
        let max = self.position + self.size;
        Rect::from_min_max(max - Vec2::splat(handle_size), max)
    }

    /// Whether the node is a member
    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains(&node)
    }
}
