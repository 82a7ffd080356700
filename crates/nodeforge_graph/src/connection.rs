// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) and reroute definitions.

use crate::id::{ConnectionHandle, NodeHandle, PinHandle, RerouteHandle, SubgraphHandle};
use egui::Pos2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One end of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Node handle
    pub node: NodeHandle,
    /// Pin handle on that node
    pub pin: PinHandle,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(node: NodeHandle, pin: PinHandle) -> Self {
        Self { node, pin }
    }
}

/// A directed connection from an output pin to an input pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Compact handle
    pub handle: ConnectionHandle,
    /// External identifier
    pub uuid: Uuid,
    /// Output side
    pub source: Endpoint,
    /// Input side
    pub target: Endpoint,
    /// Containing subgraph, `None` for the root graph
    pub subgraph: Option<SubgraphHandle>,
    /// Selection flag
    pub selected: bool,
    /// Flow visualization flag
    pub active: bool,
    /// Waypoints in routing order
    pub reroutes: Vec<RerouteHandle>,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        handle: ConnectionHandle,
        uuid: Uuid,
        source: Endpoint,
        target: Endpoint,
        subgraph: Option<SubgraphHandle>,
    ) -> Self {
        Self {
            handle,
            uuid,
            source,
            target,
            subgraph,
            selected: false,
            active: false,
            reroutes: Vec::new(),
        }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node: NodeHandle) -> bool {
        self.source.node == node || self.target.node == node
    }

    /// Check if this connection involves a specific pin
    pub fn involves_pin(&self, node: NodeHandle, pin: PinHandle) -> bool {
        self.source == Endpoint::new(node, pin) || self.target == Endpoint::new(node, pin)
    }

    /// The (source, target) pair that must be unique across the store
    pub fn key(&self) -> (Endpoint, Endpoint) {
        (self.source, self.target)
    }

    /// The endpoint opposite to `node`/`pin`, if it is one of ours
    pub fn other_end(&self, node: NodeHandle, pin: PinHandle) -> Option<Endpoint> {
        let end = Endpoint::new(node, pin);
        if self.source == end {
            Some(self.target)
        } else if self.target == end {
            Some(self.source)
        } else {
            None
        }
    }
}

/// A routing waypoint on a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reroute {
    /// Compact handle
    pub handle: RerouteHandle,
    /// External identifier
    pub uuid: Uuid,
    /// Owning connection
    pub connection: ConnectionHandle,
    /// Position within the connection's waypoint list
    pub index: usize,
    /// World-space position
    pub position: Pos2,
    /// Selection flag
    pub selected: bool,
}
