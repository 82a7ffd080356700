// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection authoring: the legality rules and the in-flight wire.
//!
//! [`check_connection`] is the single legality predicate used both by
//! [`Graph::add_connection`] and by the wire preview while dragging. A wire
//! picked up from an input pin keeps its original connection in the store
//! until the drag commits, so cancelling never loses an edge.

use crate::connection::Endpoint;
use crate::error::{ConnectionRejection, GraphResult};
use crate::graph::Graph;
use crate::hit_test::HitTester;
use crate::id::{ConnectionHandle, SubgraphHandle};
use crate::pin::PinDirection;
use egui::Pos2;

/// A legal connection in canonical output -> input order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalConnection {
    /// Output endpoint
    pub source: Endpoint,
    /// Input endpoint
    pub target: Endpoint,
    /// Shared scope of both endpoints
    pub scope: Option<SubgraphHandle>,
}

/// Check whether `a` and `b` may be connected, in either order.
///
/// `ignore` names an existing connection that should not count as a
/// duplicate (the wire currently being re-dragged).
pub fn check_connection(
    graph: &Graph,
    a: Endpoint,
    b: Endpoint,
    ignore: Option<ConnectionHandle>,
) -> Result<CanonicalConnection, ConnectionRejection> {
    let node_a = graph.node(a.node).ok_or(ConnectionRejection::MissingNode(a.node))?;
    let node_b = graph.node(b.node).ok_or(ConnectionRejection::MissingNode(b.node))?;
    let pin_a = node_a.pin(a.pin).ok_or(ConnectionRejection::MissingPin(a.node, a.pin))?;
    let pin_b = node_b.pin(b.pin).ok_or(ConnectionRejection::MissingPin(b.node, b.pin))?;

    if pin_a.direction == pin_b.direction {
        return Err(ConnectionRejection::SameDirection);
    }
    let (source, target, out_pin, in_pin) = match pin_a.direction {
        PinDirection::Output => (a, b, pin_a, pin_b),
        PinDirection::Input => (b, a, pin_b, pin_a),
    };

    if source.node == target.node {
        return Err(ConnectionRejection::SelfLoop);
    }

    if graph
        .find_connection(source, target)
        .is_some_and(|c| Some(c.handle) != ignore)
    {
        return Err(ConnectionRejection::Duplicate);
    }

    if !out_pin.pin_type.compatible_with(&in_pin.pin_type) {
        return Err(ConnectionRejection::IncompatibleTypes);
    }
    if out_pin.pin_type.is_wildcard() && in_pin.pin_type.is_wildcard() {
        tracing::debug!(source = %source.node, target = %target.node, "wildcard-to-wildcard connection");
    }

    if node_a.subgraph != node_b.subgraph {
        return Err(ConnectionRejection::ScopeMismatch);
    }

    if let Some(predicate) = graph.can_connect_predicate() {
        if !predicate(out_pin, in_pin) {
            return Err(ConnectionRejection::RefusedByHost);
        }
    }

    Ok(CanonicalConnection {
        source,
        target,
        scope: node_a.subgraph,
    })
}

/// Result of releasing a dragged wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireOutcome {
    /// A new connection was created, possibly replacing the detached one
    Connected {
        /// The new connection
        handle: ConnectionHandle,
        /// The detached connection that was removed
        replaced: Option<ConnectionHandle>,
    },
    /// Dropped back where it came from
    Unchanged,
    /// A detached wire was dropped on empty canvas and removed
    Removed(ConnectionHandle),
    /// The snap target was illegal; nothing changed
    Rejected(ConnectionRejection),
    /// Dropped on nothing; nothing changed
    Discarded,
}

/// An in-flight wire
#[derive(Debug, Clone, PartialEq)]
pub struct WireDrag {
    /// Fixed end of the wire
    pub origin: Endpoint,
    /// Direction of the fixed end
    pub origin_direction: PinDirection,
    /// Free end in screen space
    pub pointer: Pos2,
    /// Magnetic snap candidate
    pub snap: Option<Endpoint>,
    /// Eager legality of connecting to `snap`
    pub legality: Option<Result<CanonicalConnection, ConnectionRejection>>,
    /// Connection picked up from an input pin, removed only on commit
    pub detached: Option<ConnectionHandle>,
}

impl WireDrag {
    /// Start a wire from a pin
    pub fn begin(graph: &Graph, origin: Endpoint, pointer: Pos2) -> Option<Self> {
        let direction = graph.pin(origin.node, origin.pin)?.direction;
        Some(Self {
            origin,
            origin_direction: direction,
            pointer,
            snap: None,
            legality: None,
            detached: None,
        })
    }

    /// Pick up the most recent wire ending at an input pin and continue
    /// dragging from its other end
    pub fn detach(graph: &Graph, input: Endpoint, pointer: Pos2) -> Option<Self> {
        let conn = graph
            .connections_for_pin(input.node, input.pin)
            .filter(|c| c.target == input)
            .last()?;
        let mut drag = Self::begin(graph, conn.source, pointer)?;
        drag.detached = Some(conn.handle);
        Some(drag)
    }

    /// Move the free end and refresh the snap candidate and its legality
    pub fn update(&mut self, graph: &Graph, tester: &HitTester<'_>, pointer: Pos2, snap_radius: f32) {
        self.pointer = pointer;
        let snap = tester
            .nearest_pin(pointer, snap_radius, Some(self.origin))
            .map(|hit| hit.endpoint);
        if snap != self.snap {
            tracing::trace!(?snap, "wire snap target changed");
        }
        self.snap = snap;
        self.legality = snap.map(|target| check_connection(graph, self.origin, target, self.detached));
    }

    /// Whether releasing now would create a connection
    pub fn is_valid(&self) -> bool {
        matches!(self.legality, Some(Ok(_)))
    }

    /// Release the wire
    pub fn commit(self, graph: &mut Graph) -> GraphResult<WireOutcome> {
        let Some(target) = self.snap else {
            return Ok(match self.detached {
                Some(conn) => {
                    graph.remove_connection(conn);
                    WireOutcome::Removed(conn)
                }
                None => WireOutcome::Discarded,
            });
        };

        let canonical = match check_connection(graph, self.origin, target, self.detached) {
            Ok(canonical) => canonical,
            Err(reason) => return Ok(WireOutcome::Rejected(reason)),
        };

        if let Some(detached) = self.detached {
            let unchanged = graph
                .connection(detached)
                .is_some_and(|c| c.key() == (canonical.source, canonical.target));
            if unchanged {
                return Ok(WireOutcome::Unchanged);
            }
            graph.remove_connection(detached);
        }

        let handle = graph.add_connection(
            canonical.source.node,
            canonical.source.pin,
            canonical.target.node,
            canonical.target.pin,
            None,
        )?;
        Ok(WireOutcome::Connected {
            handle,
            replaced: self.detached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::id::{NodeHandle, PinHandle};
    use crate::layout::Layout;
    use crate::pin::{PinShape, PinType};
    use crate::viewport::Viewport;

    fn pin(graph: &mut Graph, node: NodeHandle, direction: PinDirection, pin_type: PinType) -> PinHandle {
        graph.add_pin(node, "p", direction, pin_type, PinShape::Circle, None).unwrap()
    }

    #[test]
    fn test_rules() {
        let mut graph = Graph::new("rules");
        let a = graph.add_node("A", "t", Pos2::ZERO, None).unwrap();
        let b = graph.add_node("B", "t", Pos2::ZERO, None).unwrap();
        let a_out = pin(&mut graph, a, PinDirection::Output, PinType::Float);
        let a_in = pin(&mut graph, a, PinDirection::Input, PinType::Float);
        let b_in = pin(&mut graph, b, PinDirection::Input, PinType::Float);
        let b_int = pin(&mut graph, b, PinDirection::Input, PinType::Int);
        let b_any = pin(&mut graph, b, PinDirection::Input, PinType::Any);
        let b_out = pin(&mut graph, b, PinDirection::Output, PinType::Float);

        let e = Endpoint::new;
        assert_eq!(
            check_connection(&graph, e(a, a_out), e(b, PinHandle(99)), None),
            Err(ConnectionRejection::MissingPin(b, PinHandle(99)))
        );
        assert_eq!(
            check_connection(&graph, e(a, a_out), e(b, b_out), None),
            Err(ConnectionRejection::SameDirection)
        );
        assert_eq!(
            check_connection(&graph, e(a, a_out), e(a, a_in), None),
            Err(ConnectionRejection::SelfLoop)
        );
        assert_eq!(
            check_connection(&graph, e(a, a_out), e(b, b_int), None),
            Err(ConnectionRejection::IncompatibleTypes)
        );
        assert!(check_connection(&graph, e(a, a_out), e(b, b_any), None).is_ok());

        // Reversed order is canonicalized
        let canonical = check_connection(&graph, e(b, b_in), e(a, a_out), None).unwrap();
        assert_eq!(canonical.source, e(a, a_out));
        assert_eq!(canonical.target, e(b, b_in));

        let conn = graph.add_connection(a, a_out, b, b_in, None).unwrap();
        assert_eq!(
            check_connection(&graph, e(a, a_out), e(b, b_in), None),
            Err(ConnectionRejection::Duplicate)
        );
        assert!(check_connection(&graph, e(a, a_out), e(b, b_in), Some(conn)).is_ok());
    }

    #[test]
    fn test_scope_mismatch() {
        let mut graph = Graph::new("scopes");
        let s = graph.add_subgraph(None, "S", None).unwrap();
        let a = graph.add_node("A", "t", Pos2::ZERO, None).unwrap();
        let b = graph.add_node_in(Some(s), "B", "t", Pos2::ZERO, None).unwrap();
        let a_out = pin(&mut graph, a, PinDirection::Output, PinType::Float);
        let b_in = pin(&mut graph, b, PinDirection::Input, PinType::Float);
        assert_eq!(
            check_connection(&graph, Endpoint::new(a, a_out), Endpoint::new(b, b_in), None),
            Err(ConnectionRejection::ScopeMismatch)
        );
    }

    struct Wires {
        graph: Graph,
        viewport: Viewport,
        config: EditorConfig,
        a_out: Endpoint,
        b_in: Endpoint,
        c_in: Endpoint,
    }

    fn wires() -> Wires {
        let config = EditorConfig::default();
        let mut graph = Graph::new("wires");
        let a = graph.add_node("A", "t", Pos2::new(0.0, 0.0), None).unwrap();
        let b = graph.add_node("B", "t", Pos2::new(0.0, 300.0), None).unwrap();
        let c = graph.add_node("C", "t", Pos2::new(400.0, 300.0), None).unwrap();
        let a_out = pin(&mut graph, a, PinDirection::Output, PinType::Float);
        let b_in = pin(&mut graph, b, PinDirection::Input, PinType::Float);
        let c_in = pin(&mut graph, c, PinDirection::Input, PinType::Float);
        Wires {
            graph,
            viewport: Viewport::new(&config),
            config,
            a_out: Endpoint::new(a, a_out),
            b_in: Endpoint::new(b, b_in),
            c_in: Endpoint::new(c, c_in),
        }
    }

    fn screen_of(w: &Wires, end: Endpoint) -> Pos2 {
        let world = Layout::from_config(&w.config).endpoint_position(&w.graph, end).unwrap();
        w.viewport.world_to_screen(world)
    }

    #[test]
    fn test_snap_commits_near_pin() {
        let mut w = wires();
        let near_b = screen_of(&w, w.b_in) + egui::Vec2::new(10.0, -8.0);
        let mut drag = WireDrag::begin(&w.graph, w.a_out, screen_of(&w, w.a_out)).unwrap();
        {
            let tester = HitTester::new(&w.graph, &w.viewport, &w.config, None);
            drag.update(&w.graph, &tester, near_b, w.config.snap_radius);
        }
        assert_eq!(drag.snap, Some(w.b_in));
        assert!(drag.is_valid());

        let outcome = drag.commit(&mut w.graph).unwrap();
        assert!(matches!(outcome, WireOutcome::Connected { replaced: None, .. }));
        assert!(w.graph.is_connected(w.b_in.node, w.b_in.pin));
    }

    #[test]
    fn test_detached_wire_moves_or_stays() {
        let mut w = wires();
        let original = w
            .graph
            .add_connection(w.a_out.node, w.a_out.pin, w.b_in.node, w.b_in.pin, None)
            .unwrap();

        // Dropping back on the same pin keeps the connection
        let mut drag = WireDrag::detach(&w.graph, w.b_in, screen_of(&w, w.b_in)).unwrap();
        assert_eq!(drag.origin, w.a_out);
        {
            let tester = HitTester::new(&w.graph, &w.viewport, &w.config, None);
            drag.update(&w.graph, &tester, screen_of(&w, w.b_in), w.config.snap_radius);
        }
        assert!(drag.is_valid());
        assert_eq!(drag.commit(&mut w.graph).unwrap(), WireOutcome::Unchanged);
        assert!(w.graph.connection(original).is_some());

        // Dropping on another input moves it
        let mut drag = WireDrag::detach(&w.graph, w.b_in, screen_of(&w, w.b_in)).unwrap();
        {
            let tester = HitTester::new(&w.graph, &w.viewport, &w.config, None);
            drag.update(&w.graph, &tester, screen_of(&w, w.c_in), w.config.snap_radius);
        }
        let outcome = drag.commit(&mut w.graph).unwrap();
        assert!(matches!(outcome, WireOutcome::Connected { replaced: Some(r), .. } if r == original));
        assert!(!w.graph.is_connected(w.b_in.node, w.b_in.pin));
        assert!(w.graph.is_connected(w.c_in.node, w.c_in.pin));
        assert_eq!(w.graph.connection_count(), 1);
    }

    #[test]
    fn test_detached_wire_dropped_on_canvas() {
        let mut w = wires();
        let original = w
            .graph
            .add_connection(w.a_out.node, w.a_out.pin, w.b_in.node, w.b_in.pin, None)
            .unwrap();
        let mut drag = WireDrag::detach(&w.graph, w.b_in, screen_of(&w, w.b_in)).unwrap();
        {
            let tester = HitTester::new(&w.graph, &w.viewport, &w.config, None);
            drag.update(&w.graph, &tester, Pos2::new(1000.0, 700.0), w.config.snap_radius);
        }
        assert_eq!(drag.commit(&mut w.graph).unwrap(), WireOutcome::Removed(original));
        assert_eq!(w.graph.connection_count(), 0);
    }

    #[test]
    fn test_illegal_snap_is_rejected() {
        let mut w = wires();
        let a = w.a_out.node;
        let a_in = pin(&mut w.graph, a, PinDirection::Input, PinType::Float);
        let mut drag = WireDrag::begin(&w.graph, w.a_out, screen_of(&w, w.a_out)).unwrap();
        {
            let tester = HitTester::new(&w.graph, &w.viewport, &w.config, None);
            drag.update(&w.graph, &tester, screen_of(&w, Endpoint::new(a, a_in)), w.config.snap_radius);
        }
        assert!(!drag.is_valid());
        assert_eq!(
            drag.commit(&mut w.graph).unwrap(),
            WireOutcome::Rejected(ConnectionRejection::SelfLoop)
        );
        assert_eq!(w.graph.connection_count(), 0);
    }
}
