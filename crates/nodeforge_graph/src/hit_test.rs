// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hit testing against the visible slice of the graph.
//!
//! Precedence: pins, reroutes, connection curves, node bodies, group resize
//! handles, group headers, group bodies, then the canvas. Within a kind the
//! last-drawn entity wins, so iteration runs back to front.

use crate::config::EditorConfig;
use crate::connection::Endpoint;
use crate::graph::Graph;
use crate::group::Group;
use crate::id::{ConnectionHandle, GroupHandle, NodeHandle, RerouteHandle, SubgraphHandle};
use crate::layout::{Layout, LineStyle};
use crate::pin::PinDirection;
use crate::viewport::Viewport;
use egui::{Pos2, Rect};

/// What lies under a screen position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    /// A pin
    Pin {
        /// Pin endpoint
        endpoint: Endpoint,
        /// Pin direction
        direction: PinDirection,
    },
    /// A reroute waypoint
    Reroute(RerouteHandle),
    /// A connection curve
    Connection(ConnectionHandle),
    /// A node body
    Node(NodeHandle),
    /// A group's resize handle
    GroupResize(GroupHandle),
    /// A group's header strip
    GroupHeader(GroupHandle),
    /// A group's body
    GroupBody(GroupHandle),
    /// Empty canvas
    Canvas,
}

/// A pin found near a screen position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinHit {
    /// Pin endpoint
    pub endpoint: Endpoint,
    /// Pin direction
    pub direction: PinDirection,
    /// Screen position of the pin
    pub screen: Pos2,
    /// Screen distance from the query point
    pub distance: f32,
}

/// Hit tester over one scope, borrowing the store and the viewport
pub struct HitTester<'a> {
    graph: &'a Graph,
    viewport: &'a Viewport,
    layout: Layout,
    scope: Option<SubgraphHandle>,
    line_style: LineStyle,
    pin_hit_radius: f32,
    connection_threshold: f32,
    reroute_radius: f32,
    group_header_height: f32,
    group_resize_handle: f32,
}

impl<'a> HitTester<'a> {
    /// Build a tester for `scope` using configured radii
    pub fn new(graph: &'a Graph, viewport: &'a Viewport, config: &EditorConfig, scope: Option<SubgraphHandle>) -> Self {
        Self {
            graph,
            viewport,
            layout: config.layout(),
            scope,
            line_style: config.line_style,
            pin_hit_radius: config.pin_radius * config.pin_hit_scale,
            connection_threshold: config.connection_hit_threshold,
            reroute_radius: config.reroute_radius,
            group_header_height: config.group_header_height,
            group_resize_handle: config.group_resize_handle,
        }
    }

    /// Resolve the topmost target under a screen position
    pub fn at(&self, screen: Pos2) -> HitTarget {
        if let Some(hit) = self.pin_at(screen) {
            return HitTarget::Pin {
                endpoint: hit.endpoint,
                direction: hit.direction,
            };
        }
        if let Some(reroute) = self.reroute_at(screen) {
            return HitTarget::Reroute(reroute);
        }
        if let Some(conn) = self.connection_at(screen) {
            return HitTarget::Connection(conn);
        }
        let world = self.viewport.screen_to_world(screen);
        if let Some(node) = self.node_at(world) {
            return HitTarget::Node(node);
        }
        self.group_at(world).unwrap_or(HitTarget::Canvas)
    }

    /// Pin whose hit circle contains the screen position
    pub fn pin_at(&self, screen: Pos2) -> Option<PinHit> {
        let radius = self.pin_hit_radius * self.viewport.scale();
        self.nearest_pin(screen, radius, None)
    }

    /// Nearest pin within `radius` screen pixels, skipping `exclude`.
    /// Nodes drawn later shadow earlier ones.
    pub fn nearest_pin(&self, screen: Pos2, radius: f32, exclude: Option<Endpoint>) -> Option<PinHit> {
        let nodes: Vec<_> = self.graph.nodes_in(self.scope).collect();
        for node in nodes.into_iter().rev() {
            let best = self
                .layout
                .pin_positions(node)
                .into_iter()
                .map(|(pin, direction, world)| {
                    let at = self.viewport.world_to_screen(world);
                    PinHit {
                        endpoint: Endpoint::new(node.handle, pin),
                        direction,
                        screen: at,
                        distance: at.distance(screen),
                    }
                })
                .filter(|hit| hit.distance <= radius && Some(hit.endpoint) != exclude)
                .min_by(|a, b| a.distance.total_cmp(&b.distance));
            if best.is_some() {
                return best;
            }
        }
        None
    }

    /// Reroute under a screen position
    pub fn reroute_at(&self, screen: Pos2) -> Option<RerouteHandle> {
        let conns: Vec<_> = self.graph.connections_in(self.scope).collect();
        conns.into_iter().rev().find_map(|conn| {
            self.graph
                .reroutes_of(conn.handle)
                .filter(|r| self.viewport.world_to_screen(r.position).distance(screen) <= self.reroute_radius)
                .last()
                .map(|r| r.handle)
        })
    }

    /// Connection curve within the configured pixel threshold
    pub fn connection_at(&self, screen: Pos2) -> Option<ConnectionHandle> {
        let conns: Vec<_> = self.graph.connections_in(self.scope).collect();
        conns.into_iter().rev().map(|c| c.handle).find(|&handle| {
            self.layout
                .connection_path(self.graph, handle, self.line_style)
                .map(|path| path.map(|p| self.viewport.world_to_screen(p), self.viewport.scale()))
                .is_some_and(|path| path.distance_to(screen) <= self.connection_threshold)
        })
    }

    /// Node whose body contains a world position
    pub fn node_at(&self, world: Pos2) -> Option<NodeHandle> {
        let nodes: Vec<_> = self.graph.nodes_in(self.scope).collect();
        nodes
            .into_iter()
            .rev()
            .find(|n| self.layout.node_rect(n).contains(world))
            .map(|n| n.handle)
    }

    /// Group region containing a world position
    pub fn group_at(&self, world: Pos2) -> Option<HitTarget> {
        let groups: Vec<&Group> = self.graph.groups_in(self.scope).collect();

        if let Some(g) = topmost_group(&groups, |g| {
            !g.collapsed && g.resize_handle_rect(self.group_resize_handle).contains(world)
        }) {
            return Some(HitTarget::GroupResize(g));
        }
        if let Some(g) = topmost_group(&groups, |g| g.header_rect(self.group_header_height).contains(world)) {
            return Some(HitTarget::GroupHeader(g));
        }
        topmost_group(&groups, |g| !g.collapsed && g.rect().contains(world)).map(HitTarget::GroupBody)
    }

    /// Nodes whose bounds intersect a world rectangle, in insertion order
    pub fn nodes_in_rect(&self, world: Rect) -> Vec<NodeHandle> {
        self.graph
            .nodes_in(self.scope)
            .filter(|n| self.layout.node_rect(n).intersects(world))
            .map(|n| n.handle)
            .collect()
    }
}

fn topmost_group(groups: &[&Group], hit: impl Fn(&Group) -> bool) -> Option<GroupHandle> {
    groups.iter().rev().find(|g| hit(g)).map(|g| g.handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::{PinShape, PinType};
    use egui::Vec2;

    struct Fixture {
        graph: Graph,
        viewport: Viewport,
        config: EditorConfig,
        a: NodeHandle,
        b: NodeHandle,
        a_out: Endpoint,
        conn: ConnectionHandle,
    }

    fn fixture() -> Fixture {
        let config = EditorConfig::default();
        let viewport = Viewport::new(&config);
        let mut graph = Graph::new("hit");
        let a = graph.add_node("A", "t", Pos2::new(0.0, 0.0), None).unwrap();
        let b = graph.add_node("B", "t", Pos2::new(0.0, 300.0), None).unwrap();
        let out = graph
            .add_pin(a, "o", PinDirection::Output, PinType::Float, PinShape::Circle, None)
            .unwrap();
        let input = graph
            .add_pin(b, "i", PinDirection::Input, PinType::Float, PinShape::Circle, None)
            .unwrap();
        let conn = graph.add_connection(a, out, b, input, None).unwrap();
        Fixture {
            graph,
            viewport,
            config,
            a,
            b,
            a_out: Endpoint::new(a, out),
            conn,
        }
    }

    #[test]
    fn test_precedence() {
        let f = fixture();
        let tester = HitTester::new(&f.graph, &f.viewport, &f.config, None);
        let layout = f.config.layout();

        let pin = layout.endpoint_position(&f.graph, f.a_out).unwrap();
        assert!(matches!(tester.at(pin), HitTarget::Pin { endpoint, .. } if endpoint == f.a_out));

        // Straight down between the two pins lies on the wire
        let wire = Pos2::new(pin.x, 190.0);
        assert_eq!(tester.at(wire), HitTarget::Connection(f.conn));

        assert_eq!(tester.at(Pos2::new(120.0, 40.0)), HitTarget::Node(f.a));
        assert_eq!(tester.at(Pos2::new(120.0, 340.0)), HitTarget::Node(f.b));
        assert_eq!(tester.at(Pos2::new(900.0, 900.0)), HitTarget::Canvas);
    }

    #[test]
    fn test_last_drawn_node_wins() {
        let mut f = fixture();
        let top = f.graph.add_node("Top", "t", Pos2::new(50.0, 20.0), None).unwrap();
        let tester = HitTester::new(&f.graph, &f.viewport, &f.config, None);
        assert_eq!(tester.node_at(Pos2::new(100.0, 50.0)), Some(top));
        assert_eq!(tester.node_at(Pos2::new(10.0, 10.0)), Some(f.a));
    }

    #[test]
    fn test_group_regions() {
        let mut f = fixture();
        let g = f
            .graph
            .add_group(None, "G", Pos2::new(500.0, 500.0), Vec2::new(200.0, 100.0), None)
            .unwrap();
        let tester = HitTester::new(&f.graph, &f.viewport, &f.config, None);
        assert_eq!(tester.at(Pos2::new(600.0, 510.0)), HitTarget::GroupHeader(g));
        assert_eq!(tester.at(Pos2::new(600.0, 560.0)), HitTarget::GroupBody(g));
        assert_eq!(tester.at(Pos2::new(695.0, 595.0)), HitTarget::GroupResize(g));
    }

    #[test]
    fn test_reroute_beats_connection() {
        let mut f = fixture();
        let r = f.graph.add_reroute(f.conn, Pos2::new(16.0, 190.0), None, None).unwrap();
        let tester = HitTester::new(&f.graph, &f.viewport, &f.config, None);
        assert_eq!(tester.at(Pos2::new(17.0, 191.0)), HitTarget::Reroute(r));
    }

    #[test]
    fn test_scope_filters_hits() {
        let mut f = fixture();
        let s = f.graph.add_subgraph(None, "S", None).unwrap();
        let tester = HitTester::new(&f.graph, &f.viewport, &f.config, Some(s));
        assert_eq!(tester.at(Pos2::new(120.0, 40.0)), HitTarget::Canvas);
    }

    #[test]
    fn test_nodes_in_rect_intersects() {
        let f = fixture();
        let tester = HitTester::new(&f.graph, &f.viewport, &f.config, None);
        let rect = Rect::from_min_max(Pos2::new(150.0, 70.0), Pos2::new(400.0, 90.0));
        assert_eq!(tester.nodes_in_rect(rect), vec![f.a]);
    }
}
