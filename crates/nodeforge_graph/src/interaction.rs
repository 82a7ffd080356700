// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pointer and keyboard state machine.
//!
//! The host feeds discrete [`InputEvent`]s once per frame. Each mode commits
//! only on its transition back to [`InteractionMode::Idle`]; cancelling
//! restores whatever the drag had moved.

use crate::authoring::{WireDrag, WireOutcome};
use crate::config::EditorConfig;
use crate::connection::Endpoint;
use crate::error::ConnectionRejection;
use crate::graph::Graph;
use crate::hit_test::{HitTarget, HitTester};
use crate::id::{ConnectionHandle, GroupHandle, NodeHandle, RerouteHandle, SubgraphHandle};
use crate::pin::PinDirection;
use crate::viewport::Viewport;
use egui::{Key, Modifiers, PointerButton, Pos2, Rect, Vec2};

/// A discrete input event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Pointer moved to a screen position
    PointerMoved(Pos2),
    /// Button pressed
    PointerPressed {
        /// Screen position
        pos: Pos2,
        /// Button
        button: PointerButton,
    },
    /// Button released
    PointerReleased {
        /// Screen position
        pos: Pos2,
        /// Button
        button: PointerButton,
    },
    /// Wheel scrolled, in notches (positive zooms in)
    Wheel {
        /// Screen position
        pos: Pos2,
        /// Notches
        delta: f32,
    },
    /// Key pressed
    Key(Key),
    /// Programmatic cancel
    Cancel,
}

/// Everything the host supplies for one frame
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// Canvas size in pixels
    pub window_size: Vec2,
    /// Seconds since the previous frame
    pub dt: f32,
    /// Held modifiers
    pub modifiers: Modifiers,
    /// Events in arrival order
    pub events: Vec<InputEvent>,
}

/// Current interaction mode
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InteractionMode {
    /// Nothing in progress
    #[default]
    Idle,
    /// Dragging selected nodes
    NodeDrag {
        /// World position where the drag started
        anchor: Pos2,
        /// Start positions of every dragged node
        start: Vec<(NodeHandle, Pos2)>,
    },
    /// Rubber-band selection
    BoxSelect {
        /// Screen anchor
        start: Pos2,
        /// Screen corner under the pointer
        current: Pos2,
        /// Add to the selection instead of replacing it
        additive: bool,
        /// Nodes the rectangle currently touches
        marked: Vec<NodeHandle>,
    },
    /// Authoring a connection
    WireDrag(WireDrag),
    /// Moving a group and its members
    GroupDrag {
        /// Dragged group
        group: GroupHandle,
        /// World position where the drag started
        anchor: Pos2,
        /// Group start position
        start: Pos2,
        /// Member start positions
        members: Vec<(NodeHandle, Pos2)>,
    },
    /// Resizing a group
    GroupResize {
        /// Resized group
        group: GroupHandle,
        /// World position where the drag started
        anchor: Pos2,
        /// Group start size
        start: Vec2,
    },
    /// Moving a reroute waypoint
    RerouteDrag {
        /// Dragged reroute
        reroute: RerouteHandle,
        /// World position where the drag started
        anchor: Pos2,
        /// Reroute start position
        start: Pos2,
    },
    /// Panning with the middle button
    Pan,
}

impl InteractionMode {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::NodeDrag { .. } => "node-drag",
            Self::BoxSelect { .. } => "box-select",
            Self::WireDrag(_) => "wire-drag",
            Self::GroupDrag { .. } => "group-drag",
            Self::GroupResize { .. } => "group-resize",
            Self::RerouteDrag { .. } => "reroute-drag",
            Self::Pan => "pan",
        }
    }
}

/// Entities under the pointer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hover {
    /// Hovered node (also set when hovering one of its pins)
    pub node: Option<NodeHandle>,
    /// Hovered pin
    pub pin: Option<Endpoint>,
    /// Hovered connection
    pub connection: Option<ConnectionHandle>,
    /// Hovered group
    pub group: Option<GroupHandle>,
    /// Hovered reroute
    pub reroute: Option<RerouteHandle>,
}

impl From<HitTarget> for Hover {
    fn from(target: HitTarget) -> Self {
        let mut hover = Self::default();
        match target {
            HitTarget::Pin { endpoint, .. } => {
                hover.node = Some(endpoint.node);
                hover.pin = Some(endpoint);
            }
            HitTarget::Reroute(r) => hover.reroute = Some(r),
            HitTarget::Connection(c) => hover.connection = Some(c),
            HitTarget::Node(n) => hover.node = Some(n),
            HitTarget::GroupResize(g) | HitTarget::GroupHeader(g) | HitTarget::GroupBody(g) => hover.group = Some(g),
            HitTarget::Canvas => {}
        }
        hover
    }
}

/// Something the state machine did that the host may want to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionEvent {
    /// Selection flags changed
    SelectionChanged,
    /// Nodes were moved by a drag
    NodesMoved(Vec<NodeHandle>),
    /// A wire was committed
    ConnectionCreated(ConnectionHandle),
    /// A wire was removed by detaching or deleting
    ConnectionRemoved(ConnectionHandle),
    /// A wire release was refused
    WireRejected(ConnectionRejection),
    /// Nodes were deleted
    NodesDeleted(Vec<NodeHandle>),
    /// Groups were deleted
    GroupsDeleted(Vec<GroupHandle>),
    /// A group was moved
    GroupMoved(GroupHandle),
    /// A group was resized
    GroupResized(GroupHandle),
    /// A reroute was moved
    RerouteMoved(RerouteHandle),
    /// The active mode was cancelled
    Cancelled,
}

/// Mutable borrows the state machine works on
pub struct InteractionContext<'a> {
    /// Graph store
    pub graph: &'a mut Graph,
    /// Viewport
    pub viewport: &'a mut Viewport,
    /// Configuration
    pub config: &'a EditorConfig,
    /// Active subgraph
    pub scope: Option<SubgraphHandle>,
}

impl InteractionContext<'_> {
    fn hit(&self, screen: Pos2) -> HitTarget {
        HitTester::new(self.graph, self.viewport, self.config, self.scope).at(screen)
    }

    fn world(&self, screen: Pos2) -> Pos2 {
        self.viewport.screen_to_world(screen)
    }
}

/// The interaction state machine
#[derive(Debug, Default)]
pub struct Interaction {
    mode: InteractionMode,
    hover: Hover,
    pressed: Option<HitTarget>,
    pointer: Pos2,
    modifiers: Modifiers,
    events: Vec<InteractionEvent>,
}

impl Interaction {
    /// Create an idle state machine
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode
    pub fn mode(&self) -> &InteractionMode {
        &self.mode
    }

    /// Whether no interaction is in progress
    pub fn is_idle(&self) -> bool {
        self.mode == InteractionMode::Idle
    }

    /// Entities under the pointer
    pub fn hover(&self) -> Hover {
        self.hover
    }

    /// Target of the last primary press
    pub fn pressed(&self) -> Option<HitTarget> {
        self.pressed
    }

    /// Last known pointer position
    pub fn pointer(&self) -> Pos2 {
        self.pointer
    }

    /// The in-flight wire, if any
    pub fn wire(&self) -> Option<&WireDrag> {
        match &self.mode {
            InteractionMode::WireDrag(drag) => Some(drag),
            _ => None,
        }
    }

    /// Screen-space selection rectangle, if box-selecting
    pub fn selection_rect(&self) -> Option<Rect> {
        match self.mode {
            InteractionMode::BoxSelect { start, current, .. } => Some(Rect::from_two_pos(start, current)),
            _ => None,
        }
    }

    /// Set the held modifiers for subsequent events
    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    fn additive(&self) -> bool {
        self.modifiers.shift || self.modifiers.ctrl || self.modifiers.command
    }

    /// Take the events produced so far
    pub fn drain_events(&mut self) -> Vec<InteractionEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_mode(&mut self, mode: InteractionMode) {
        if std::mem::discriminant(&mode) != std::mem::discriminant(&self.mode) {
            tracing::trace!(from = self.mode.name(), to = mode.name(), "interaction mode");
        }
        self.mode = mode;
    }

    /// Feed one event
    pub fn handle(&mut self, ctx: &mut InteractionContext<'_>, event: InputEvent) {
        match event {
            InputEvent::PointerMoved(pos) => self.pointer_moved(ctx, pos),
            InputEvent::PointerPressed { pos, button } => self.pointer_pressed(ctx, pos, button),
            InputEvent::PointerReleased { pos, button } => self.pointer_released(ctx, pos, button),
            InputEvent::Wheel { pos, delta } => {
                self.pointer = pos;
                if self.is_idle() {
                    ctx.viewport.zoom_at(pos, delta);
                }
            }
            InputEvent::Key(Key::Escape) | InputEvent::Cancel => self.cancel(ctx.graph),
            InputEvent::Key(Key::Delete | Key::Backspace) => self.delete_selection(ctx.graph),
            InputEvent::Key(_) => {}
        }
        self.update_hover(ctx);
    }

    /// Recompute hover from the last pointer position
    pub fn update_hover(&mut self, ctx: &InteractionContext<'_>) {
        let hover = Hover::from(ctx.hit(self.pointer));
        if hover != self.hover {
            tracing::trace!(?hover, "hover changed");
            self.hover = hover;
        }
    }

    fn pointer_moved(&mut self, ctx: &mut InteractionContext<'_>, pos: Pos2) {
        let delta = pos - self.pointer;
        self.pointer = pos;
        let world = ctx.world(pos);

        match &mut self.mode {
            InteractionMode::Idle => {}
            InteractionMode::NodeDrag { anchor, start } => {
                let offset = world - *anchor;
                for (node, from) in start.iter() {
                    ctx.graph.set_node_position(*node, *from + offset);
                }
            }
            InteractionMode::BoxSelect { start, current, marked, .. } => {
                *current = pos;
                let rect = Rect::from_two_pos(*start, pos);
                *marked = if rect.area() > 0.0 {
                    let tester = HitTester::new(ctx.graph, ctx.viewport, ctx.config, ctx.scope);
                    tester.nodes_in_rect(ctx.viewport.screen_rect_to_world(rect))
                } else {
                    Vec::new()
                };
            }
            InteractionMode::WireDrag(drag) => {
                let tester = HitTester::new(ctx.graph, ctx.viewport, ctx.config, ctx.scope);
                drag.update(ctx.graph, &tester, pos, ctx.config.snap_radius);
            }
            InteractionMode::GroupDrag {
                group,
                anchor,
                start,
                members,
            } => {
                let offset = world - *anchor;
                ctx.graph.set_group_position(*group, *start + offset);
                for (node, from) in members.iter() {
                    ctx.graph.set_node_position(*node, *from + offset);
                }
            }
            InteractionMode::GroupResize { group, anchor, start } => {
                let min = Vec2::from(ctx.config.group_min_size);
                ctx.graph.set_group_size(*group, (*start + (world - *anchor)).max(min));
            }
            InteractionMode::RerouteDrag { reroute, anchor, start } => {
                ctx.graph.move_reroute(*reroute, *start + (world - *anchor));
            }
            InteractionMode::Pan => ctx.viewport.pan_by(delta),
        }
    }

    fn pointer_pressed(&mut self, ctx: &mut InteractionContext<'_>, pos: Pos2, button: PointerButton) {
        self.pointer = pos;
        if !self.is_idle() {
            return;
        }
        match button {
            PointerButton::Middle => self.set_mode(InteractionMode::Pan),
            PointerButton::Primary => self.primary_pressed(ctx, pos),
            _ => {}
        }
    }

    fn primary_pressed(&mut self, ctx: &mut InteractionContext<'_>, pos: Pos2) {
        let target = ctx.hit(pos);
        self.pressed = Some(target);
        let world = ctx.world(pos);
        let additive = self.additive();

        match target {
            HitTarget::Pin { endpoint, direction } => {
                let drag = if direction == PinDirection::Input && ctx.graph.is_connected(endpoint.node, endpoint.pin) {
                    WireDrag::detach(ctx.graph, endpoint, pos)
                } else {
                    WireDrag::begin(ctx.graph, endpoint, pos)
                };
                if let Some(drag) = drag {
                    self.set_mode(InteractionMode::WireDrag(drag));
                }
            }
            HitTarget::Reroute(reroute) => {
                if let Some(r) = ctx.graph.reroute(reroute) {
                    let start = r.position;
                    self.set_mode(InteractionMode::RerouteDrag {
                        reroute,
                        anchor: world,
                        start,
                    });
                }
            }
            HitTarget::Connection(conn) => {
                if additive {
                    ctx.graph.toggle_connection_selected(conn);
                } else {
                    ctx.graph.select_connection(conn, false);
                }
                self.events.push(InteractionEvent::SelectionChanged);
            }
            HitTarget::Node(node) => {
                let already = ctx.graph.node(node).is_some_and(|n| n.selected);
                if !already {
                    ctx.graph.select_node(node, additive);
                    self.events.push(InteractionEvent::SelectionChanged);
                }
                ctx.graph.set_current_node(Some(node));
                let start = ctx
                    .graph
                    .nodes_in(ctx.scope)
                    .filter(|n| n.selected)
                    .map(|n| (n.handle, n.position))
                    .collect();
                self.set_mode(InteractionMode::NodeDrag { anchor: world, start });
            }
            HitTarget::GroupResize(group) => {
                if let Some(g) = ctx.graph.group(group) {
                    let start = g.size;
                    self.set_mode(InteractionMode::GroupResize {
                        group,
                        anchor: world,
                        start,
                    });
                }
            }
            HitTarget::GroupHeader(group) => {
                ctx.graph.select_group(group, additive);
                self.events.push(InteractionEvent::SelectionChanged);
                if let Some(g) = ctx.graph.group(group) {
                    let start = g.position;
                    let members = g
                        .nodes
                        .iter()
                        .filter_map(|n| ctx.graph.node(*n).map(|node| (*n, node.position)))
                        .collect();
                    self.set_mode(InteractionMode::GroupDrag {
                        group,
                        anchor: world,
                        start,
                        members,
                    });
                }
            }
            HitTarget::GroupBody(_) | HitTarget::Canvas => {
                self.set_mode(InteractionMode::BoxSelect {
                    start: pos,
                    current: pos,
                    additive,
                    marked: Vec::new(),
                });
            }
        }
    }

    fn pointer_released(&mut self, ctx: &mut InteractionContext<'_>, pos: Pos2, button: PointerButton) {
        match (button, &self.mode) {
            (PointerButton::Middle, InteractionMode::Pan) => {
                self.set_mode(InteractionMode::Idle);
                return;
            }
            (PointerButton::Primary, InteractionMode::Pan | InteractionMode::Idle) | (PointerButton::Middle, _) => {
                return;
            }
            (PointerButton::Primary, _) => {}
            _ => return,
        }
        if pos != self.pointer {
            self.pointer_moved(ctx, pos);
        }

        match std::mem::take(&mut self.mode) {
            InteractionMode::NodeDrag { start, .. } => {
                let mut moved = Vec::new();
                for (node, from) in start {
                    let Some(current) = ctx.graph.node(node).map(|n| n.position) else {
                        continue;
                    };
                    let snapped = ctx.config.snap_position(current);
                    if snapped != current {
                        ctx.graph.set_node_position(node, snapped);
                    }
                    if snapped != from {
                        moved.push(node);
                    }
                }
                if !moved.is_empty() {
                    tracing::debug!(count = moved.len(), "nodes moved");
                    self.events.push(InteractionEvent::NodesMoved(moved));
                }
            }
            InteractionMode::BoxSelect {
                start,
                current,
                additive,
                marked,
            } => {
                if Rect::from_two_pos(start, current).area() > 0.0 {
                    if !additive {
                        ctx.graph.clear_selection();
                    }
                    for node in marked {
                        ctx.graph.set_node_selected(node, true);
                    }
                    self.events.push(InteractionEvent::SelectionChanged);
                }
            }
            InteractionMode::WireDrag(drag) => self.commit_wire(ctx.graph, drag),
            InteractionMode::GroupDrag { group, start, .. } => {
                if ctx.graph.group(group).is_some_and(|g| g.position != start) {
                    self.events.push(InteractionEvent::GroupMoved(group));
                }
            }
            InteractionMode::GroupResize { group, .. } => {
                self.events.push(InteractionEvent::GroupResized(group));
            }
            InteractionMode::RerouteDrag { reroute, .. } => {
                self.events.push(InteractionEvent::RerouteMoved(reroute));
            }
            InteractionMode::Idle | InteractionMode::Pan => {}
        }
    }

    fn commit_wire(&mut self, graph: &mut Graph, drag: WireDrag) {
        match drag.commit(graph) {
            Ok(WireOutcome::Connected { handle, replaced }) => {
                if let Some(old) = replaced {
                    self.events.push(InteractionEvent::ConnectionRemoved(old));
                }
                self.events.push(InteractionEvent::ConnectionCreated(handle));
            }
            Ok(WireOutcome::Removed(old)) => self.events.push(InteractionEvent::ConnectionRemoved(old)),
            Ok(WireOutcome::Rejected(reason)) => {
                tracing::debug!(%reason, "wire rejected");
                self.events.push(InteractionEvent::WireRejected(reason));
            }
            Ok(WireOutcome::Unchanged | WireOutcome::Discarded) => {}
            Err(err) => tracing::warn!(%err, "wire commit failed"),
        }
    }

    /// Abort the active mode, restoring anything it moved
    pub fn cancel(&mut self, graph: &mut Graph) {
        match std::mem::take(&mut self.mode) {
            InteractionMode::Idle => return,
            InteractionMode::NodeDrag { start, .. } => {
                for (node, from) in start {
                    graph.set_node_position(node, from);
                }
            }
            InteractionMode::GroupDrag {
                group, start, members, ..
            } => {
                graph.set_group_position(group, start);
                for (node, from) in members {
                    graph.set_node_position(node, from);
                }
            }
            InteractionMode::GroupResize { group, start, .. } => {
                graph.set_group_size(group, start);
            }
            InteractionMode::RerouteDrag { reroute, start, .. } => {
                graph.move_reroute(reroute, start);
            }
            InteractionMode::BoxSelect { .. } | InteractionMode::WireDrag(_) | InteractionMode::Pan => {}
        }
        tracing::debug!("interaction cancelled");
        self.events.push(InteractionEvent::Cancelled);
    }

    /// Cancel, then remove the selection
    pub fn delete_selection(&mut self, graph: &mut Graph) {
        self.cancel(graph);
        let removed = graph.remove_selected();
        if removed.is_empty() {
            return;
        }
        self.events
            .extend(removed.connections.into_iter().map(InteractionEvent::ConnectionRemoved));
        if !removed.nodes.is_empty() {
            self.events.push(InteractionEvent::NodesDeleted(removed.nodes));
        }
        if !removed.groups.is_empty() {
            self.events.push(InteractionEvent::GroupsDeleted(removed.groups));
        }
    }
}
