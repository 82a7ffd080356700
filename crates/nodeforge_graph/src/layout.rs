// SPDX-License-Identifier: MIT OR Apache-2.0
//! Geometry handed to the renderer and the hit tester.
//!
//! Pins sit on the node edges: inputs along the top, outputs along the
//! bottom, each row starting `pin_margin` from the left edge and advancing by
//! `pin_spacing`. Connections therefore leave downwards and arrive from above.

use crate::config::EditorConfig;
use crate::connection::Endpoint;
use crate::graph::Graph;
use crate::id::{ConnectionHandle, PinHandle};
use crate::node::Node;
use crate::pin::PinDirection;
use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Number of segments used when flattening curves
const CURVE_SEGMENTS: usize = 32;

/// Segments per rounded corner
const CORNER_SEGMENTS: usize = 6;

/// How connections are routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineStyle {
    /// Cubic bezier
    #[default]
    Bezier,
    /// Straight segments
    Straight,
    /// Vertical-horizontal-vertical elbows
    RightAngle,
    /// Right angles with rounded corners
    Manhattan,
}

/// Layout metrics derived from the editor configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    /// Node header height in world units
    pub header_height: f32,
    /// Offset of the first pin from the node's left edge
    pub pin_margin: f32,
    /// Distance between consecutive pins
    pub pin_spacing: f32,
    /// Pin radius in world units
    pub pin_radius: f32,
    /// Bezier control-point distance
    pub curvature: f32,
    /// Corner radius for Manhattan routing
    pub corner_radius: f32,
}

impl Layout {
    /// Layout metrics from configuration
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            header_height: config.header_height,
            pin_margin: config.pin_margin,
            pin_spacing: config.pin_spacing,
            pin_radius: config.pin_radius,
            curvature: config.bezier_curvature,
            corner_radius: config.corner_radius,
        }
    }

    /// Node body bounds
    pub fn node_rect(&self, node: &Node) -> Rect {
        node.rect()
    }

    /// Node header strip
    pub fn header_rect(&self, node: &Node) -> Rect {
        Rect::from_min_size(
            node.position,
            Vec2::new(node.size.x, self.header_height.min(node.size.y)),
        )
    }

    /// Position of the `index`-th pin of a direction
    pub fn pin_slot(&self, node: &Node, direction: PinDirection, index: usize) -> Pos2 {
        let x = node.position.x + self.pin_margin + index as f32 * self.pin_spacing;
        let y = match direction {
            PinDirection::Input => node.position.y,
            PinDirection::Output => node.position.y + node.size.y,
        };
        Pos2::new(x, y)
    }

    /// World position of a pin
    pub fn pin_position(&self, node: &Node, pin: PinHandle) -> Option<Pos2> {
        let (direction, index) = node.pin_index(pin)?;
        Some(self.pin_slot(node, direction, index))
    }

    /// All pins of a node with their world positions
    pub fn pin_positions(&self, node: &Node) -> Vec<(PinHandle, PinDirection, Pos2)> {
        let inputs = node
            .inputs
            .iter()
            .enumerate()
            .map(|(i, p)| (p.handle, PinDirection::Input, self.pin_slot(node, PinDirection::Input, i)));
        let outputs = node
            .outputs
            .iter()
            .enumerate()
            .map(|(i, p)| (p.handle, PinDirection::Output, self.pin_slot(node, PinDirection::Output, i)));
        inputs.chain(outputs).collect()
    }

    /// World position of an endpoint
    pub fn endpoint_position(&self, graph: &Graph, end: Endpoint) -> Option<Pos2> {
        self.pin_position(graph.node(end.node)?, end.pin)
    }

    /// Routing of a stored connection through its reroutes
    pub fn connection_path(
        &self,
        graph: &Graph,
        connection: ConnectionHandle,
        style: LineStyle,
    ) -> Option<ConnectionPath> {
        let conn = graph.connection(connection)?;
        let from = self.endpoint_position(graph, conn.source)?;
        let to = self.endpoint_position(graph, conn.target)?;
        let waypoints: Vec<Pos2> = graph.reroutes_of(connection).map(|r| r.position).collect();
        Some(self.wire_path(from, &waypoints, to, style))
    }

    /// Routing from an output position to an input position
    pub fn wire_path(&self, from: Pos2, waypoints: &[Pos2], to: Pos2, style: LineStyle) -> ConnectionPath {
        let mut stops = Vec::with_capacity(waypoints.len() + 2);
        stops.push(from);
        stops.extend_from_slice(waypoints);
        stops.push(to);

        let mut segments = Vec::with_capacity(stops.len() - 1);
        for pair in stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let points = match style {
                LineStyle::Bezier => {
                    let distance = (b.y - a.y).abs();
                    let curvature = self.curvature.min(distance * 0.5).max(self.curvature * 0.5);
                    vec![a, a + Vec2::new(0.0, curvature), b - Vec2::new(0.0, curvature), b]
                }
                LineStyle::Straight => vec![a, b],
                LineStyle::RightAngle | LineStyle::Manhattan => {
                    let mid = (a.y + b.y) * 0.5;
                    vec![a, Pos2::new(a.x, mid), Pos2::new(b.x, mid), b]
                }
            };
            segments.push(points);
        }

        ConnectionPath {
            style,
            corner_radius: self.corner_radius,
            segments,
        }
    }
}

/// Control points of a routed connection, one list per span between stops
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPath {
    /// Routing style
    pub style: LineStyle,
    /// Corner radius for Manhattan routing
    pub corner_radius: f32,
    /// Control points per span. Bezier spans hold four points, polyline
    /// spans hold their corner points.
    pub segments: Vec<Vec<Pos2>>,
}

impl ConnectionPath {
    /// Flatten into a polyline
    pub fn polyline(&self) -> Vec<Pos2> {
        let mut points = Vec::new();
        for span in &self.segments {
            let flattened = match self.style {
                LineStyle::Bezier => bezier_points(span[0], span[1], span[2], span[3], CURVE_SEGMENTS),
                LineStyle::Straight | LineStyle::RightAngle => span.clone(),
                LineStyle::Manhattan => rounded_corners(span, self.corner_radius),
            };
            // Spans share their joining stop
            let skip = usize::from(!points.is_empty());
            points.extend(flattened.into_iter().skip(skip));
        }
        points
    }

    /// Map every control point (e.g. world -> screen)
    pub fn map(&self, f: impl Fn(Pos2) -> Pos2, scale: f32) -> Self {
        Self {
            style: self.style,
            corner_radius: self.corner_radius * scale,
            segments: self
                .segments
                .iter()
                .map(|span| span.iter().map(|p| f(*p)).collect())
                .collect(),
        }
    }

    /// Shortest distance from `point` to the flattened path
    pub fn distance_to(&self, point: Pos2) -> f32 {
        let points = self.polyline();
        points
            .windows(2)
            .map(|seg| distance_to_segment(point, seg[0], seg[1]))
            .fold(f32::INFINITY, f32::min)
    }

    /// Bounds of all control points
    pub fn bounds(&self) -> Rect {
        let mut rect = Rect::NOTHING;
        for p in self.segments.iter().flatten() {
            rect.extend_with(*p);
        }
        rect
    }
}

/// Generate points along a cubic bezier curve
pub fn bezier_points(p0: Pos2, p1: Pos2, p2: Pos2, p3: Pos2, segments: usize) -> Vec<Pos2> {
    let mut points = Vec::with_capacity(segments + 1);
    for i in 0..=segments {
        let t = i as f32 / segments as f32;
        let t2 = t * t;
        let t3 = t2 * t;
        let mt = 1.0 - t;
        let mt2 = mt * mt;
        let mt3 = mt2 * mt;

        let x = mt3 * p0.x + 3.0 * mt2 * t * p1.x + 3.0 * mt * t2 * p2.x + t3 * p3.x;
        let y = mt3 * p0.y + 3.0 * mt2 * t * p1.y + 3.0 * mt * t2 * p2.y + t3 * p3.y;

        points.push(Pos2::new(x, y));
    }
    points
}

/// Replace each interior corner of a polyline with a quarter arc
fn rounded_corners(points: &[Pos2], radius: f32) -> Vec<Pos2> {
    if points.len() < 3 || radius <= 0.0 {
        return points.to_vec();
    }
    let mut out = vec![points[0]];
    for w in points.windows(3) {
        let (prev, corner, next) = (w[0], w[1], w[2]);
        let into = corner - prev;
        let out_of = next - corner;
        let r = radius.min(into.length() * 0.5).min(out_of.length() * 0.5);
        if r <= f32::EPSILON {
            out.push(corner);
            continue;
        }
        let start = corner - into.normalized() * r;
        let end = corner + out_of.normalized() * r;
        // Quadratic approximation of the arc with the corner as control point
        for i in 0..=CORNER_SEGMENTS {
            let t = i as f32 / CORNER_SEGMENTS as f32;
            let mt = 1.0 - t;
            let p = start.to_vec2() * (mt * mt) + corner.to_vec2() * (2.0 * mt * t) + end.to_vec2() * (t * t);
            out.push(p.to_pos2());
        }
    }
    out.push(points[points.len() - 1]);
    out
}

/// Distance from `p` to the segment `a`-`b`
pub fn distance_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}
