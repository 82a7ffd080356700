// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entity identity: compact handles and the uuid registry.
//!
//! Every persistent entity is addressed two ways. A handle is a small integer
//! allocated monotonically per entity kind and never reused, so a stale handle
//! held by the host can only ever miss. A [`Uuid`] is the external identity
//! that survives serialization. [`IdentityRegistry`] keeps both directions of
//! that binding and is updated in the same step as the store itself.

use crate::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Common behaviour of all handle types
pub trait Handle: Copy + Eq + std::hash::Hash + fmt::Debug {
    /// Build a handle from its raw value
    fn from_raw(raw: u32) -> Self;

    /// Raw integer value
    fn raw(self) -> u32;
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl Handle for $name {
            fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Handle of a node
    NodeHandle, "node"
);
define_handle!(
    /// Handle of a pin (unique across all nodes)
    PinHandle, "pin"
);
define_handle!(
    /// Handle of a connection
    ConnectionHandle, "connection"
);
define_handle!(
    /// Handle of a group
    GroupHandle, "group"
);
define_handle!(
    /// Handle of a subgraph
    SubgraphHandle, "subgraph"
);
define_handle!(
    /// Handle of a reroute waypoint
    RerouteHandle, "reroute"
);

/// Monotonic handle allocator for one entity kind.
///
/// Once `u32::MAX` has been handed out (or reserved by an import) the
/// allocator is exhausted and refuses further handles.
#[derive(Debug, Clone, Default)]
pub struct HandleAllocator {
    next: u32,
    exhausted: bool,
}

impl HandleAllocator {
    /// Allocate the next handle, or `None` when the handle space is used up
    pub fn allocate<H: Handle>(&mut self) -> Option<H> {
        if self.exhausted {
            return None;
        }
        let handle = H::from_raw(self.next);
        match self.next.checked_add(1) {
            Some(next) => self.next = next,
            None => self.exhausted = true,
        }
        Some(handle)
    }

    /// Make sure future allocations come after `handle`
    pub fn reserve<H: Handle>(&mut self, handle: H) {
        match handle.raw().checked_add(1) {
            Some(next) => self.next = self.next.max(next),
            None => self.exhausted = true,
        }
    }
}

/// Reference to any registered entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    /// A node
    Node(NodeHandle),
    /// A pin, together with its owning node
    Pin(NodeHandle, PinHandle),
    /// A connection
    Connection(ConnectionHandle),
    /// A group
    Group(GroupHandle),
    /// A subgraph
    Subgraph(SubgraphHandle),
    /// A reroute waypoint
    Reroute(RerouteHandle),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(h) => write!(f, "{h}"),
            Self::Pin(node, pin) => write!(f, "{node}/{pin}"),
            Self::Connection(h) => write!(f, "{h}"),
            Self::Group(h) => write!(f, "{h}"),
            Self::Subgraph(h) => write!(f, "{h}"),
            Self::Reroute(h) => write!(f, "{h}"),
        }
    }
}

/// Bidirectional uuid <-> handle index plus the per-kind allocators
#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    nodes: HandleAllocator,
    pins: HandleAllocator,
    connections: HandleAllocator,
    groups: HandleAllocator,
    subgraphs: HandleAllocator,
    reroutes: HandleAllocator,
    by_uuid: HashMap<Uuid, EntityRef>,
    by_entity: HashMap<EntityRef, Uuid>,
}

impl IdentityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node handle
    pub fn next_node(&mut self) -> GraphResult<NodeHandle> {
        self.nodes.allocate().ok_or(GraphError::HandlesExhausted("node"))
    }

    /// Allocate a pin handle
    pub fn next_pin(&mut self) -> GraphResult<PinHandle> {
        self.pins.allocate().ok_or(GraphError::HandlesExhausted("pin"))
    }

    /// Allocate a connection handle
    pub fn next_connection(&mut self) -> GraphResult<ConnectionHandle> {
        self.connections.allocate().ok_or(GraphError::HandlesExhausted("connection"))
    }

    /// Allocate a group handle
    pub fn next_group(&mut self) -> GraphResult<GroupHandle> {
        self.groups.allocate().ok_or(GraphError::HandlesExhausted("group"))
    }

    /// Allocate a subgraph handle
    pub fn next_subgraph(&mut self) -> GraphResult<SubgraphHandle> {
        self.subgraphs.allocate().ok_or(GraphError::HandlesExhausted("subgraph"))
    }

    /// Allocate a reroute handle
    pub fn next_reroute(&mut self) -> GraphResult<RerouteHandle> {
        self.reroutes.allocate().ok_or(GraphError::HandlesExhausted("reroute"))
    }

    /// Advance the allocator of the entity's kind past its handle(s).
    /// Used when importing documents that carry explicit handles.
    pub fn reserve(&mut self, entity: EntityRef) {
        match entity {
            EntityRef::Node(h) => self.nodes.reserve(h),
            EntityRef::Pin(node, pin) => {
                self.nodes.reserve(node);
                self.pins.reserve(pin);
            }
            EntityRef::Connection(h) => self.connections.reserve(h),
            EntityRef::Group(h) => self.groups.reserve(h),
            EntityRef::Subgraph(h) => self.subgraphs.reserve(h),
            EntityRef::Reroute(h) => self.reroutes.reserve(h),
        }
    }

    /// Whether a uuid is already bound to some entity
    pub fn contains_uuid(&self, uuid: &Uuid) -> bool {
        self.by_uuid.contains_key(uuid)
    }

    /// Bind a uuid to an entity. Returns `false` (and changes nothing) if the
    /// uuid is already taken.
    pub fn register(&mut self, uuid: Uuid, entity: EntityRef) -> bool {
        if self.by_uuid.contains_key(&uuid) {
            return false;
        }
        if let Some(old) = self.by_entity.insert(entity, uuid) {
            self.by_uuid.remove(&old);
        }
        self.by_uuid.insert(uuid, entity);
        true
    }

    /// Remove an entity's binding, returning its uuid
    pub fn unregister(&mut self, entity: EntityRef) -> Option<Uuid> {
        let uuid = self.by_entity.remove(&entity)?;
        self.by_uuid.remove(&uuid);
        Some(uuid)
    }

    /// Resolve a uuid
    pub fn resolve(&self, uuid: &Uuid) -> Option<EntityRef> {
        self.by_uuid.get(uuid).copied()
    }

    /// Uuid of an entity
    pub fn uuid_of(&self, entity: EntityRef) -> Option<Uuid> {
        self.by_entity.get(&entity).copied()
    }

    /// Resolve a uuid to a node handle
    pub fn node(&self, uuid: &Uuid) -> Option<NodeHandle> {
        match self.resolve(uuid)? {
            EntityRef::Node(h) => Some(h),
            _ => None,
        }
    }

    /// Resolve a uuid to a pin and its owning node
    pub fn pin(&self, uuid: &Uuid) -> Option<(NodeHandle, PinHandle)> {
        match self.resolve(uuid)? {
            EntityRef::Pin(node, pin) => Some((node, pin)),
            _ => None,
        }
    }

    /// Resolve a uuid to a connection handle
    pub fn connection(&self, uuid: &Uuid) -> Option<ConnectionHandle> {
        match self.resolve(uuid)? {
            EntityRef::Connection(h) => Some(h),
            _ => None,
        }
    }

    /// Resolve a uuid to a group handle
    pub fn group(&self, uuid: &Uuid) -> Option<GroupHandle> {
        match self.resolve(uuid)? {
            EntityRef::Group(h) => Some(h),
            _ => None,
        }
    }

    /// Resolve a uuid to a subgraph handle
    pub fn subgraph(&self, uuid: &Uuid) -> Option<SubgraphHandle> {
        match self.resolve(uuid)? {
            EntityRef::Subgraph(h) => Some(h),
            _ => None,
        }
    }

    /// Resolve a uuid to a reroute handle
    pub fn reroute(&self, uuid: &Uuid) -> Option<RerouteHandle> {
        match self.resolve(uuid)? {
            EntityRef::Reroute(h) => Some(h),
            _ => None,
        }
    }

    /// Number of registered entities of all kinds
    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }

    /// Whether no entity is registered
    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty()
    }

    /// Check that both directions agree; returns the offending entities
    pub fn inconsistencies(&self) -> Vec<EntityRef> {
        self.by_entity
            .iter()
            .filter(|(entity, uuid)| self.by_uuid.get(*uuid) != Some(*entity))
            .map(|(entity, _)| *entity)
            .collect()
    }
}
