// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph store: exclusive owner of every node, pin, connection, group,
//! subgraph and reroute.
//!
//! Mutations either succeed with every invariant intact or return an error
//! and leave the store untouched. Lookups by stale handles return `None`.
//! Handles are never reused, so a stale handle cannot alias a newer entity.

use crate::authoring::{self, CanonicalConnection};
use crate::connection::{Connection, Endpoint, Reroute};
use crate::error::{GraphError, GraphResult};
use crate::group::Group;
use crate::id::{
    ConnectionHandle, EntityRef, GroupHandle, IdentityRegistry, NodeHandle, PinHandle,
    RerouteHandle, SubgraphHandle,
};
use crate::node::{LabelPlacement, MetaValue, Node, NodeTemplates};
use crate::pin::{Pin, PinDirection, PinShape, PinType};
use crate::subgraph::Subgraph;
use egui::{Pos2, Rect, Vec2};
use indexmap::IndexMap;
use std::fmt;
use uuid::Uuid;

/// Callback receiving a node's handle and uuid
pub type NodeCallback = Box<dyn FnMut(NodeHandle, Uuid)>;

/// Callback receiving a connection
pub type ConnectionCallback = Box<dyn FnMut(&Connection)>;

/// Host predicate called with (output pin, input pin)
pub type CanConnectPredicate = Box<dyn Fn(&Pin, &Pin) -> bool>;

/// Host callbacks, invoked synchronously after the mutation that causes them.
/// Callbacks must not mutate the store.
#[derive(Default)]
pub struct GraphCallbacks {
    /// A node was created
    pub on_node_created: Option<NodeCallback>,
    /// A node was removed
    pub on_node_removed: Option<NodeCallback>,
    /// A connection was created
    pub on_connection_created: Option<ConnectionCallback>,
    /// A connection was removed
    pub on_connection_removed: Option<ConnectionCallback>,
    /// Extra legality check; can only narrow what the store allows
    pub can_connect: Option<CanConnectPredicate>,
}

impl fmt::Debug for GraphCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphCallbacks")
            .field("on_node_created", &self.on_node_created.is_some())
            .field("on_node_removed", &self.on_node_removed.is_some())
            .field("on_connection_created", &self.on_connection_created.is_some())
            .field("on_connection_removed", &self.on_connection_removed.is_some())
            .field("can_connect", &self.can_connect.is_some())
            .finish()
    }
}

/// A broken store invariant, reported by [`Graph::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Connection endpoint missing or wrong direction
    BadEndpoint(ConnectionHandle),
    /// A pin's `connected` flag disagrees with the connection list
    StaleConnectedFlag(NodeHandle, PinHandle),
    /// Two connections share the same endpoints
    DuplicateConnection(ConnectionHandle),
    /// Connection endpoints live in different scopes
    ScopeMismatch(ConnectionHandle),
    /// Group membership and node back-reference disagree
    GroupMembership(GroupHandle, NodeHandle),
    /// Subgraph containment and node back-reference disagree
    SubgraphMembership(SubgraphHandle, NodeHandle),
    /// Interface node missing, uncontained or unprotected
    InterfaceNode(SubgraphHandle),
    /// Following parent links from this subgraph revisits a subgraph
    ParentCycle(SubgraphHandle),
    /// Instance pins do not mirror the target interface
    InstanceMirror(NodeHandle),
    /// Reroute and connection disagree
    Reroute(RerouteHandle),
    /// Uuid index and entity disagree
    Identity(EntityRef),
}

/// Entities removed by [`Graph::remove_selected`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedSelection {
    /// Removed connections (not counting those cascaded from nodes)
    pub connections: Vec<ConnectionHandle>,
    /// Removed nodes
    pub nodes: Vec<NodeHandle>,
    /// Removed groups
    pub groups: Vec<GroupHandle>,
}

impl RemovedSelection {
    /// Whether nothing was removed
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.nodes.is_empty() && self.groups.is_empty()
    }
}

/// A node graph
#[derive(Debug, Default)]
pub struct Graph {
    /// Graph name
    pub name: String,
    pub(crate) registry: IdentityRegistry,
    pub(crate) nodes: IndexMap<NodeHandle, Node>,
    pub(crate) connections: IndexMap<ConnectionHandle, Connection>,
    pub(crate) groups: IndexMap<GroupHandle, Group>,
    pub(crate) subgraphs: IndexMap<SubgraphHandle, Subgraph>,
    pub(crate) reroutes: IndexMap<RerouteHandle, Reroute>,
    pub(crate) callbacks: GraphCallbacks,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Identity registry (uuid <-> handle)
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Host callbacks
    pub fn callbacks_mut(&mut self) -> &mut GraphCallbacks {
        &mut self.callbacks
    }

    pub(crate) fn can_connect_predicate(&self) -> Option<&CanConnectPredicate> {
        self.callbacks.can_connect.as_ref()
    }

    pub(crate) fn claim_uuid(&self, uuid: Option<Uuid>) -> GraphResult<Uuid> {
        match uuid {
            Some(uuid) if self.registry.contains_uuid(&uuid) => Err(GraphError::DuplicateUuid(uuid)),
            Some(uuid) => Ok(uuid),
            None => Ok(Uuid::new_v4()),
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node to the root graph
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        node_type: impl Into<String>,
        position: Pos2,
        uuid: Option<Uuid>,
    ) -> GraphResult<NodeHandle> {
        self.add_node_in(None, name, node_type, position, uuid)
    }

    /// Add a node to a scope (`None` = root graph)
    pub fn add_node_in(
        &mut self,
        scope: Option<SubgraphHandle>,
        name: impl Into<String>,
        node_type: impl Into<String>,
        position: Pos2,
        uuid: Option<Uuid>,
    ) -> GraphResult<NodeHandle> {
        let handle = self.insert_node(scope, name, node_type, position, uuid)?;
        self.notify_node_created(handle);
        Ok(handle)
    }

    /// Insert a node without announcing it. Callers finish building the
    /// node, then call [`Graph::notify_node_created`].
    pub(crate) fn insert_node(
        &mut self,
        scope: Option<SubgraphHandle>,
        name: impl Into<String>,
        node_type: impl Into<String>,
        position: Pos2,
        uuid: Option<Uuid>,
    ) -> GraphResult<NodeHandle> {
        if let Some(s) = scope {
            if !self.subgraphs.contains_key(&s) {
                return Err(GraphError::NotFound(EntityRef::Subgraph(s)));
            }
        }
        let uuid = self.claim_uuid(uuid)?;
        let handle = self.registry.next_node()?;
        self.registry.register(uuid, EntityRef::Node(handle));

        let mut node = Node::new(handle, uuid, name, node_type, position);
        node.subgraph = scope;
        self.nodes.insert(handle, node);
        if let Some(sub) = scope.and_then(|s| self.subgraphs.get_mut(&s)) {
            sub.nodes.push(handle);
        }
        tracing::debug!(%handle, %uuid, "node created");
        Ok(handle)
    }

    pub(crate) fn notify_node_created(&mut self, handle: NodeHandle) {
        let Some(uuid) = self.nodes.get(&handle).map(|n| n.uuid) else {
            return;
        };
        if let Some(cb) = self.callbacks.on_node_created.as_mut() {
            cb(handle, uuid);
        }
    }

    /// Add a node and its default pins from a registered template.
    /// Unknown type tags create a bare node of that type.
    pub fn add_node_from_template(
        &mut self,
        templates: &NodeTemplates,
        scope: Option<SubgraphHandle>,
        type_tag: &str,
        position: Pos2,
        uuid: Option<Uuid>,
    ) -> GraphResult<NodeHandle> {
        let Some(template) = templates.get(type_tag) else {
            return self.add_node_in(scope, type_tag, type_tag, position, uuid);
        };
        let handle = self.add_node_in(scope, template.name.clone(), type_tag, position, uuid)?;
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.icon = template.icon.clone();
            if let Some(size) = template.size {
                node.size = size;
            }
        }
        for spec in &template.pins {
            self.add_pin(handle, spec.name.clone(), spec.direction, spec.pin_type.clone(), spec.shape, None)?;
        }
        Ok(handle)
    }

    /// Remove a node, cascading to its connections and memberships
    pub fn remove_node(&mut self, handle: NodeHandle) -> GraphResult<Node> {
        let node = self
            .nodes
            .get(&handle)
            .ok_or(GraphError::NotFound(EntityRef::Node(handle)))?;
        if node.protected || self.interface_owner(handle).is_some() {
            return Err(GraphError::Protected(handle));
        }
        self.remove_node_unchecked(handle)
            .ok_or(GraphError::NotFound(EntityRef::Node(handle)))
    }

    /// Removal without the protection check, used by subgraph teardown
    pub(crate) fn remove_node_unchecked(&mut self, handle: NodeHandle) -> Option<Node> {
        if !self.nodes.contains_key(&handle) {
            return None;
        }

        let incident: Vec<ConnectionHandle> = self
            .connections
            .values()
            .filter(|c| c.involves_node(handle))
            .map(|c| c.handle)
            .collect();
        for conn in incident {
            self.remove_connection(conn);
        }

        self.remove_node_from_group(handle);

        let node = self.nodes.shift_remove(&handle)?;
        if let Some(sub) = node.subgraph.and_then(|s| self.subgraphs.get_mut(&s)) {
            sub.nodes.retain(|n| *n != handle);
        }
        for pin in node.pins() {
            self.registry.unregister(EntityRef::Pin(handle, pin.handle));
        }
        self.registry.unregister(EntityRef::Node(handle));

        tracing::debug!(%handle, "node removed");
        if let Some(cb) = self.callbacks.on_node_removed.as_mut() {
            cb(handle, node.uuid);
        }
        Some(node)
    }

    /// Get a node by handle
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(&handle)
    }

    /// Get a node by uuid
    pub fn node_by_uuid(&self, uuid: &Uuid) -> Option<&Node> {
        self.node(self.registry.node(uuid)?)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node handles
    pub fn node_handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.keys().copied()
    }

    /// Nodes contained directly by a scope
    pub fn nodes_in(&self, scope: Option<SubgraphHandle>) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.subgraph == scope)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Move a node to an absolute position
    pub fn set_node_position(&mut self, handle: NodeHandle, position: Pos2) -> bool {
        match self.nodes.get_mut(&handle) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    /// Move a node by a world-space delta
    pub fn translate_node(&mut self, handle: NodeHandle, delta: Vec2) -> bool {
        match self.nodes.get_mut(&handle) {
            Some(node) => {
                node.position += delta;
                true
            }
            None => false,
        }
    }

    /// Resize a node
    pub fn set_node_size(&mut self, handle: NodeHandle, size: Vec2) -> bool {
        self.update_node(handle, |n| n.size = size)
    }

    /// Rename a node
    pub fn set_node_name(&mut self, handle: NodeHandle, name: impl Into<String>) -> bool {
        let name = name.into();
        self.update_node(handle, |n| n.name = name)
    }

    /// Set the disabled flag
    pub fn set_node_disabled(&mut self, handle: NodeHandle, disabled: bool) -> bool {
        self.update_node(handle, |n| n.disabled = disabled)
    }

    /// Set the template flag
    pub fn set_node_template(&mut self, handle: NodeHandle, template: bool) -> bool {
        self.update_node(handle, |n| n.template = template)
    }

    /// Mark a node as the current one; at most one node is current
    pub fn set_current_node(&mut self, handle: Option<NodeHandle>) {
        for node in self.nodes.values_mut() {
            node.current = Some(node.handle) == handle;
        }
    }

    /// Set the protected flag
    pub fn set_node_protected(&mut self, handle: NodeHandle, protected: bool) -> bool {
        if self.interface_owner(handle).is_some() {
            // Interface nodes stay protected
            return false;
        }
        self.update_node(handle, |n| n.protected = protected)
    }

    /// Set the icon glyph
    pub fn set_node_icon(&mut self, handle: NodeHandle, icon: Option<String>) -> bool {
        self.update_node(handle, |n| n.icon = icon)
    }

    /// Set the label placement
    pub fn set_node_label(&mut self, handle: NodeHandle, label: LabelPlacement) -> bool {
        self.update_node(handle, |n| n.label = label)
    }

    /// Insert or replace a metadata entry
    pub fn set_node_metadata(&mut self, handle: NodeHandle, key: impl Into<String>, value: MetaValue) -> bool {
        let key = key.into();
        self.update_node(handle, |n| {
            n.metadata.insert(key, value);
        })
    }

    fn update_node(&mut self, handle: NodeHandle, f: impl FnOnce(&mut Node)) -> bool {
        match self.nodes.get_mut(&handle) {
            Some(node) => {
                f(node);
                true
            }
            None => false,
        }
    }

    /// Union of the bounds of the given nodes
    pub fn bounds_of(&self, nodes: impl IntoIterator<Item = NodeHandle>) -> Option<Rect> {
        nodes
            .into_iter()
            .filter_map(|h| self.node(h))
            .map(Node::rect)
            .reduce(|a, b| a.union(b))
    }

    // ------------------------------------------------------------------
    // Pins
    // ------------------------------------------------------------------

    /// Append a pin to a node's input or output sequence
    pub fn add_pin(
        &mut self,
        node: NodeHandle,
        name: impl Into<String>,
        direction: PinDirection,
        pin_type: PinType,
        shape: PinShape,
        uuid: Option<Uuid>,
    ) -> GraphResult<PinHandle> {
        let target = self
            .nodes
            .get(&node)
            .ok_or(GraphError::NotFound(EntityRef::Node(node)))?;
        if target.is_subgraph_instance() {
            // Instance pins are owned by the interface mirror
            return Err(GraphError::Protected(node));
        }
        let uuid = self.claim_uuid(uuid)?;
        let handle = self.registry.next_pin()?;
        self.registry.register(uuid, EntityRef::Pin(node, handle));

        let pin = Pin::new(handle, uuid, name, direction, pin_type).with_shape(shape);
        if let Some(target) = self.nodes.get_mut(&node) {
            match direction {
                PinDirection::Input => target.inputs.push(pin),
                PinDirection::Output => target.outputs.push(pin),
            }
        }
        tracing::debug!(%node, pin = %handle, "pin added");

        if let Some(sub) = self.interface_owner(node) {
            self.resync_instances(sub)?;
        }
        Ok(handle)
    }

    /// Remove a pin and every connection touching it
    pub fn remove_pin(&mut self, node: NodeHandle, pin: PinHandle) -> GraphResult<Pin> {
        let owner = self
            .nodes
            .get(&node)
            .ok_or(GraphError::NotFound(EntityRef::Node(node)))?;
        if owner.pin(pin).is_none() {
            return Err(GraphError::NotFound(EntityRef::Pin(node, pin)));
        }
        if owner.is_subgraph_instance() {
            return Err(GraphError::Protected(node));
        }
        let removed = self
            .remove_pin_unchecked(node, pin)
            .ok_or(GraphError::NotFound(EntityRef::Pin(node, pin)))?;
        if let Some(sub) = self.interface_owner(node) {
            self.resync_instances(sub)?;
        }
        Ok(removed)
    }

    pub(crate) fn remove_pin_unchecked(&mut self, node: NodeHandle, pin: PinHandle) -> Option<Pin> {
        let incident: Vec<ConnectionHandle> = self
            .connections
            .values()
            .filter(|c| c.involves_pin(node, pin))
            .map(|c| c.handle)
            .collect();
        for conn in incident {
            self.remove_connection(conn);
        }

        let owner = self.nodes.get_mut(&node)?;
        let removed = if let Some(i) = owner.inputs.iter().position(|p| p.handle == pin) {
            owner.inputs.remove(i)
        } else {
            let i = owner.outputs.iter().position(|p| p.handle == pin)?;
            owner.outputs.remove(i)
        };
        self.registry.unregister(EntityRef::Pin(node, pin));
        tracing::debug!(%node, %pin, "pin removed");
        Some(removed)
    }

    /// Get a pin
    pub fn pin(&self, node: NodeHandle, pin: PinHandle) -> Option<&Pin> {
        self.node(node)?.pin(pin)
    }

    /// Get a pin by uuid, together with its node
    pub fn pin_by_uuid(&self, uuid: &Uuid) -> Option<(NodeHandle, &Pin)> {
        let (node, pin) = self.registry.pin(uuid)?;
        Some((node, self.pin(node, pin)?))
    }

    /// Rename a pin. Interface pins propagate to instances.
    pub fn set_pin_name(&mut self, node: NodeHandle, pin: PinHandle, name: impl Into<String>) -> bool {
        let Some(p) = self.nodes.get_mut(&node).and_then(|n| n.pin_mut(pin)) else {
            return false;
        };
        p.name = name.into();
        if let Some(sub) = self.interface_owner(node) {
            // Renames only touch existing mirror pins, so nothing is allocated
            if let Err(err) = self.resync_instances(sub) {
                tracing::warn!(%err, "instance resync after rename failed");
            }
        }
        true
    }

    /// Whether the pin has at least one connection
    pub fn is_connected(&self, node: NodeHandle, pin: PinHandle) -> bool {
        self.pin(node, pin).is_some_and(|p| p.connected)
    }

    fn refresh_connected(&mut self, end: Endpoint) {
        let connected = self
            .connections
            .values()
            .any(|c| c.involves_pin(end.node, end.pin));
        if let Some(p) = self.nodes.get_mut(&end.node).and_then(|n| n.pin_mut(end.pin)) {
            p.connected = connected;
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Add a connection. The pair may be given in either order; it is stored
    /// output -> input.
    pub fn add_connection(
        &mut self,
        source_node: NodeHandle,
        source_pin: PinHandle,
        target_node: NodeHandle,
        target_pin: PinHandle,
        uuid: Option<Uuid>,
    ) -> GraphResult<ConnectionHandle> {
        let canonical = authoring::check_connection(
            self,
            Endpoint::new(source_node, source_pin),
            Endpoint::new(target_node, target_pin),
            None,
        )?;
        let uuid = self.claim_uuid(uuid)?;
        self.insert_connection(canonical, uuid)
    }

    fn insert_connection(&mut self, canonical: CanonicalConnection, uuid: Uuid) -> GraphResult<ConnectionHandle> {
        let handle = self.registry.next_connection()?;
        self.registry.register(uuid, EntityRef::Connection(handle));

        let conn = Connection::new(handle, uuid, canonical.source, canonical.target, canonical.scope);
        if let Some(sub) = canonical.scope.and_then(|s| self.subgraphs.get_mut(&s)) {
            sub.connections.push(handle);
        }
        self.connections.insert(handle, conn);
        self.refresh_connected(canonical.source);
        self.refresh_connected(canonical.target);

        tracing::debug!(%handle, source = %canonical.source.node, target = %canonical.target.node, "connection created");
        if let Some(cb) = self.callbacks.on_connection_created.as_mut() {
            if let Some(conn) = self.connections.get(&handle) {
                cb(conn);
            }
        }
        Ok(handle)
    }

    /// Remove a connection and its reroutes
    pub fn remove_connection(&mut self, handle: ConnectionHandle) -> Option<Connection> {
        let conn = self.connections.shift_remove(&handle)?;
        for reroute in &conn.reroutes {
            if let Some(r) = self.reroutes.shift_remove(reroute) {
                self.registry.unregister(EntityRef::Reroute(r.handle));
            }
        }
        if let Some(sub) = conn.subgraph.and_then(|s| self.subgraphs.get_mut(&s)) {
            sub.connections.retain(|c| *c != handle);
        }
        self.registry.unregister(EntityRef::Connection(handle));
        self.refresh_connected(conn.source);
        self.refresh_connected(conn.target);

        tracing::debug!(%handle, "connection removed");
        if let Some(cb) = self.callbacks.on_connection_removed.as_mut() {
            cb(&conn);
        }
        Some(conn)
    }

    /// Get a connection by handle
    pub fn connection(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    /// Get a connection by uuid
    pub fn connection_by_uuid(&self, uuid: &Uuid) -> Option<&Connection> {
        self.connection(self.registry.connection(uuid)?)
    }

    /// Get all connections in insertion order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Connections contained by a scope
    pub fn connections_in(&self, scope: Option<SubgraphHandle>) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.subgraph == scope)
    }

    /// Connections ending at one of the node's inputs
    pub fn input_connections(&self, node: NodeHandle) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.target.node == node)
    }

    /// Connections leaving one of the node's outputs
    pub fn output_connections(&self, node: NodeHandle) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.source.node == node)
    }

    /// Connections touching a pin
    pub fn connections_for_pin(&self, node: NodeHandle, pin: PinHandle) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.involves_pin(node, pin))
    }

    /// Find the connection between two exact endpoints
    pub fn find_connection(&self, source: Endpoint, target: Endpoint) -> Option<&Connection> {
        self.connections.values().find(|c| c.key() == (source, target))
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Set the flow-visualization flag
    pub fn set_connection_active(&mut self, handle: ConnectionHandle, active: bool) -> bool {
        match self.connections.get_mut(&handle) {
            Some(conn) => {
                conn.active = active;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create an empty group in a scope
    pub fn add_group(
        &mut self,
        scope: Option<SubgraphHandle>,
        name: impl Into<String>,
        position: Pos2,
        size: Vec2,
        uuid: Option<Uuid>,
    ) -> GraphResult<GroupHandle> {
        if let Some(s) = scope {
            if !self.subgraphs.contains_key(&s) {
                return Err(GraphError::NotFound(EntityRef::Subgraph(s)));
            }
        }
        let uuid = self.claim_uuid(uuid)?;
        let handle = self.registry.next_group()?;
        self.registry.register(uuid, EntityRef::Group(handle));
        let mut group = Group::new(handle, uuid, name, position, size);
        group.subgraph = scope;
        self.groups.insert(handle, group);
        tracing::debug!(%handle, "group created");
        Ok(handle)
    }

    /// Remove a group. Member nodes stay; only their membership is cleared.
    pub fn remove_group(&mut self, handle: GroupHandle) -> Option<Group> {
        let group = self.groups.shift_remove(&handle)?;
        for node in &group.nodes {
            if let Some(n) = self.nodes.get_mut(node) {
                n.group = None;
            }
        }
        self.registry.unregister(EntityRef::Group(handle));
        tracing::debug!(%handle, "group removed");
        Some(group)
    }

    /// Put a node into a group, leaving its previous group first
    pub fn add_node_to_group(&mut self, group: GroupHandle, node: NodeHandle) -> GraphResult<()> {
        if !self.groups.contains_key(&group) {
            return Err(GraphError::NotFound(EntityRef::Group(group)));
        }
        let current = self
            .nodes
            .get(&node)
            .ok_or(GraphError::NotFound(EntityRef::Node(node)))?
            .group;
        if current == Some(group) {
            return Ok(());
        }
        self.remove_node_from_group(node);
        if let Some(g) = self.groups.get_mut(&group) {
            g.nodes.insert(node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.group = Some(group);
        }
        Ok(())
    }

    /// Take a node out of its group. Returns the group it left.
    pub fn remove_node_from_group(&mut self, node: NodeHandle) -> Option<GroupHandle> {
        let group = self.nodes.get_mut(&node)?.group.take()?;
        if let Some(g) = self.groups.get_mut(&group) {
            g.nodes.shift_remove(&node);
        }
        Some(group)
    }

    /// Get a group
    pub fn group(&self, handle: GroupHandle) -> Option<&Group> {
        self.groups.get(&handle)
    }

    /// Get a group by uuid
    pub fn group_by_uuid(&self, uuid: &Uuid) -> Option<&Group> {
        self.group(self.registry.group(uuid)?)
    }

    /// All groups
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Groups drawn in a scope
    pub fn groups_in(&self, scope: Option<SubgraphHandle>) -> impl Iterator<Item = &Group> {
        self.groups.values().filter(move |g| g.subgraph == scope)
    }

    /// Move a group and its members by a world-space delta
    pub fn translate_group(&mut self, handle: GroupHandle, delta: Vec2) -> bool {
        let Some(group) = self.groups.get_mut(&handle) else {
            return false;
        };
        group.position += delta;
        let members: Vec<NodeHandle> = group.nodes.iter().copied().collect();
        for node in members {
            self.translate_node(node, delta);
        }
        true
    }

    /// Move a group (without members) to an absolute position
    pub fn set_group_position(&mut self, handle: GroupHandle, position: Pos2) -> bool {
        self.update_group(handle, |g| g.position = position)
    }

    /// Resize a group
    pub fn set_group_size(&mut self, handle: GroupHandle, size: Vec2) -> bool {
        self.update_group(handle, |g| g.size = size)
    }

    /// Collapse or expand a group
    pub fn set_group_collapsed(&mut self, handle: GroupHandle, collapsed: bool) -> bool {
        self.update_group(handle, |g| g.collapsed = collapsed)
    }

    fn update_group(&mut self, handle: GroupHandle, f: impl FnOnce(&mut Group)) -> bool {
        match self.groups.get_mut(&handle) {
            Some(group) => {
                f(group);
                true
            }
            None => false,
        }
    }

    /// Grow or shrink a group to wrap its members with `padding`, leaving
    /// room for a header of `header_height`
    pub fn fit_group_to_nodes(&mut self, handle: GroupHandle, padding: f32, header_height: f32) -> bool {
        let Some(group) = self.groups.get(&handle) else {
            return false;
        };
        let Some(bounds) = self.bounds_of(group.nodes.iter().copied()) else {
            return false;
        };
        let min = bounds.min - Vec2::new(padding, padding + header_height);
        let max = bounds.max + Vec2::splat(padding);
        self.update_group(handle, |g| {
            g.position = min;
            g.size = max - min;
        })
    }

    // ------------------------------------------------------------------
    // Reroutes
    // ------------------------------------------------------------------

    /// Insert a waypoint into a connection. `index` of `None` appends.
    pub fn add_reroute(
        &mut self,
        connection: ConnectionHandle,
        position: Pos2,
        index: Option<usize>,
        uuid: Option<Uuid>,
    ) -> GraphResult<RerouteHandle> {
        let len = self
            .connections
            .get(&connection)
            .ok_or(GraphError::NotFound(EntityRef::Connection(connection)))?
            .reroutes
            .len();
        let uuid = self.claim_uuid(uuid)?;
        let handle = self.registry.next_reroute()?;
        self.registry.register(uuid, EntityRef::Reroute(handle));

        let index = index.map_or(len, |i| i.min(len));
        self.reroutes.insert(
            handle,
            Reroute {
                handle,
                uuid,
                connection,
                index,
                position,
                selected: false,
            },
        );
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.reroutes.insert(index, handle);
        }
        self.renumber_reroutes(connection);
        Ok(handle)
    }

    /// Remove a waypoint
    pub fn remove_reroute(&mut self, handle: RerouteHandle) -> Option<Reroute> {
        let reroute = self.reroutes.shift_remove(&handle)?;
        if let Some(conn) = self.connections.get_mut(&reroute.connection) {
            conn.reroutes.retain(|r| *r != handle);
        }
        self.registry.unregister(EntityRef::Reroute(handle));
        self.renumber_reroutes(reroute.connection);
        Some(reroute)
    }

    /// Move a waypoint
    pub fn move_reroute(&mut self, handle: RerouteHandle, position: Pos2) -> bool {
        match self.reroutes.get_mut(&handle) {
            Some(r) => {
                r.position = position;
                true
            }
            None => false,
        }
    }

    fn renumber_reroutes(&mut self, connection: ConnectionHandle) {
        let Some(conn) = self.connections.get(&connection) else {
            return;
        };
        for (i, h) in conn.reroutes.iter().enumerate() {
            if let Some(r) = self.reroutes.get_mut(h) {
                r.index = i;
            }
        }
    }

    /// Get a reroute
    pub fn reroute(&self, handle: RerouteHandle) -> Option<&Reroute> {
        self.reroutes.get(&handle)
    }

    /// Get a reroute by uuid
    pub fn reroute_by_uuid(&self, uuid: &Uuid) -> Option<&Reroute> {
        self.reroute(self.registry.reroute(uuid)?)
    }

    /// Waypoints of a connection in routing order
    pub fn reroutes_of(&self, connection: ConnectionHandle) -> impl Iterator<Item = &Reroute> {
        self.connections
            .get(&connection)
            .into_iter()
            .flat_map(|c| c.reroutes.iter())
            .filter_map(|h| self.reroutes.get(h))
    }

    /// All reroutes
    pub fn reroutes(&self) -> impl Iterator<Item = &Reroute> {
        self.reroutes.values()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Clear selection across all kinds
    pub fn clear_selection(&mut self) {
        self.nodes.values_mut().for_each(|n| n.selected = false);
        self.connections.values_mut().for_each(|c| c.selected = false);
        self.groups.values_mut().for_each(|g| g.selected = false);
        self.reroutes.values_mut().for_each(|r| r.selected = false);
    }

    /// Select a node, replacing the selection unless `additive`
    pub fn select_node(&mut self, handle: NodeHandle, additive: bool) -> bool {
        if !self.nodes.contains_key(&handle) {
            return false;
        }
        if !additive {
            self.clear_selection();
        }
        self.set_node_selected(handle, true)
    }

    /// Set a node's selection flag
    pub fn set_node_selected(&mut self, handle: NodeHandle, selected: bool) -> bool {
        self.update_node(handle, |n| n.selected = selected)
    }

    /// Select a connection, replacing the selection unless `additive`
    pub fn select_connection(&mut self, handle: ConnectionHandle, additive: bool) -> bool {
        if !self.connections.contains_key(&handle) {
            return false;
        }
        if !additive {
            self.clear_selection();
        }
        self.set_connection_selected(handle, true)
    }

    /// Set a connection's selection flag
    pub fn set_connection_selected(&mut self, handle: ConnectionHandle, selected: bool) -> bool {
        match self.connections.get_mut(&handle) {
            Some(c) => {
                c.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Flip a connection's selection flag
    pub fn toggle_connection_selected(&mut self, handle: ConnectionHandle) -> bool {
        match self.connections.get_mut(&handle) {
            Some(c) => {
                c.selected = !c.selected;
                true
            }
            None => false,
        }
    }

    /// Select a group, replacing the selection unless `additive`
    pub fn select_group(&mut self, handle: GroupHandle, additive: bool) -> bool {
        if !self.groups.contains_key(&handle) {
            return false;
        }
        if !additive {
            self.clear_selection();
        }
        self.update_group(handle, |g| g.selected = true)
    }

    /// Selected nodes
    pub fn selected_nodes(&self) -> Vec<NodeHandle> {
        self.nodes.values().filter(|n| n.selected).map(|n| n.handle).collect()
    }

    /// Selected connections
    pub fn selected_connections(&self) -> Vec<ConnectionHandle> {
        self.connections.values().filter(|c| c.selected).map(|c| c.handle).collect()
    }

    /// Selected groups
    pub fn selected_groups(&self) -> Vec<GroupHandle> {
        self.groups.values().filter(|g| g.selected).map(|g| g.handle).collect()
    }

    /// Whether anything is selected
    pub fn has_selection(&self) -> bool {
        self.nodes.values().any(|n| n.selected)
            || self.connections.values().any(|c| c.selected)
            || self.groups.values().any(|g| g.selected)
    }

    /// Remove selected connections, then selected unprotected nodes, then
    /// selected groups
    pub fn remove_selected(&mut self) -> RemovedSelection {
        let mut removed = RemovedSelection::default();
        for conn in self.selected_connections() {
            if self.remove_connection(conn).is_some() {
                removed.connections.push(conn);
            }
        }
        for node in self.selected_nodes() {
            match self.remove_node(node) {
                Ok(_) => removed.nodes.push(node),
                Err(err) => tracing::debug!(%node, %err, "selected node kept"),
            }
        }
        for group in self.selected_groups() {
            if self.remove_group(group).is_some() {
                removed.groups.push(group);
            }
        }
        removed
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    /// Check every store invariant, returning what is broken
    pub fn validate(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        let mut seen = std::collections::HashSet::new();
        for conn in self.connections.values() {
            let source = self.pin(conn.source.node, conn.source.pin);
            let target = self.pin(conn.target.node, conn.target.pin);
            let ok = matches!((source, target), (Some(s), Some(t))
                if s.direction == PinDirection::Output && t.direction == PinDirection::Input && s.connected && t.connected);
            if !ok {
                violations.push(InvariantViolation::BadEndpoint(conn.handle));
            }
            if !seen.insert(conn.key()) {
                violations.push(InvariantViolation::DuplicateConnection(conn.handle));
            }
            let scopes = (
                self.node(conn.source.node).map(|n| n.subgraph),
                self.node(conn.target.node).map(|n| n.subgraph),
            );
            if scopes.0 != scopes.1 || scopes.0 != Some(conn.subgraph) {
                violations.push(InvariantViolation::ScopeMismatch(conn.handle));
            }
            for (i, r) in conn.reroutes.iter().enumerate() {
                match self.reroutes.get(r) {
                    Some(reroute) if reroute.connection == conn.handle && reroute.index == i => {}
                    _ => violations.push(InvariantViolation::Reroute(*r)),
                }
            }
        }

        for node in self.nodes.values() {
            for pin in node.pins() {
                let expected = self.connections.values().any(|c| c.involves_pin(node.handle, pin.handle));
                if pin.connected != expected {
                    violations.push(InvariantViolation::StaleConnectedFlag(node.handle, pin.handle));
                }
                if self.registry.uuid_of(EntityRef::Pin(node.handle, pin.handle)) != Some(pin.uuid) {
                    violations.push(InvariantViolation::Identity(EntityRef::Pin(node.handle, pin.handle)));
                }
            }
            if let Some(g) = node.group {
                if !self.groups.get(&g).is_some_and(|g| g.contains(node.handle)) {
                    violations.push(InvariantViolation::GroupMembership(g, node.handle));
                }
            }
            if let Some(s) = node.subgraph {
                if !self.subgraphs.get(&s).is_some_and(|s| s.nodes.contains(&node.handle)) {
                    violations.push(InvariantViolation::SubgraphMembership(s, node.handle));
                }
            }
            if node.is_subgraph_instance() && !self.instance_mirrors_interface(node.handle) {
                violations.push(InvariantViolation::InstanceMirror(node.handle));
            }
            if self.registry.uuid_of(EntityRef::Node(node.handle)) != Some(node.uuid) {
                violations.push(InvariantViolation::Identity(EntityRef::Node(node.handle)));
            }
        }

        for group in self.groups.values() {
            for member in &group.nodes {
                if self.nodes.get(member).and_then(|n| n.group) != Some(group.handle) {
                    violations.push(InvariantViolation::GroupMembership(group.handle, *member));
                }
            }
        }

        for sub in self.subgraphs.values() {
            for member in &sub.nodes {
                if self.nodes.get(member).and_then(|n| n.subgraph) != Some(sub.handle) {
                    violations.push(InvariantViolation::SubgraphMembership(sub.handle, *member));
                }
            }
            for interface in [sub.input_node, sub.output_node] {
                let ok = self
                    .nodes
                    .get(&interface)
                    .is_some_and(|n| n.protected && n.subgraph == Some(sub.handle));
                if !ok {
                    violations.push(InvariantViolation::InterfaceNode(sub.handle));
                }
            }
            if self.parent_chain_cycles(sub.handle) {
                violations.push(InvariantViolation::ParentCycle(sub.handle));
            }
        }

        for reroute in self.reroutes.values() {
            if !self
                .connections
                .get(&reroute.connection)
                .is_some_and(|c| c.reroutes.contains(&reroute.handle))
            {
                violations.push(InvariantViolation::Reroute(reroute.handle));
            }
        }

        violations.extend(self.registry.inconsistencies().into_iter().map(InvariantViolation::Identity));
        violations
    }
}
