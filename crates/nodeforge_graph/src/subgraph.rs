// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subgraphs: nested scopes, their interface nodes, instance mirroring and
//! the navigation stack.
//!
//! Every subgraph owns two protected interface nodes. The output pins of the
//! "Inputs" node are the subgraph's exposed inputs; the input pins of the
//! "Outputs" node are its exposed outputs. An instance node placed in an outer
//! scope mirrors that interface with directions swapped, and is regenerated by
//! [`Graph::resync_instance`] after every interface change.

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::id::{ConnectionHandle, EntityRef, NodeHandle, PinHandle, SubgraphHandle};
use crate::node::{MetaValue, Node};
use crate::pin::{Pin, PinDirection, PinShape, PinType};
use crate::viewport::{Viewport, ViewportState};
use egui::Pos2;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Type tag of interface input nodes
pub const INTERFACE_INPUT_TYPE: &str = "subgraph.inputs";
/// Type tag of interface output nodes
pub const INTERFACE_OUTPUT_TYPE: &str = "subgraph.outputs";
/// Type tag of subgraph instance nodes
pub const INSTANCE_TYPE: &str = "subgraph.instance";

const INTERFACE_OFFSET: f32 = 300.0;

/// A nested graph scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    /// Compact handle
    pub handle: SubgraphHandle,
    /// External identifier
    pub uuid: Uuid,
    /// Display name
    pub name: String,
    /// Enclosing subgraph, `None` if top-level
    pub parent: Option<SubgraphHandle>,
    /// Contained nodes in insertion order
    pub nodes: Vec<NodeHandle>,
    /// Contained connections in insertion order
    pub connections: Vec<ConnectionHandle>,
    /// Interface input node
    pub input_node: NodeHandle,
    /// Interface output node
    pub output_node: NodeHandle,
    /// Viewport saved when the user last left this scope
    pub saved_view: Option<ViewportState>,
    /// Expanded in outline views
    pub expanded: bool,
    /// Free-form metadata
    pub metadata: IndexMap<String, MetaValue>,
}

impl Subgraph {
    /// Whether a node is one of the two interface nodes
    pub fn is_interface_node(&self, node: NodeHandle) -> bool {
        self.input_node == node || self.output_node == node
    }
}

impl Graph {
    /// Create a subgraph together with its two interface nodes
    pub fn add_subgraph(
        &mut self,
        parent: Option<SubgraphHandle>,
        name: impl Into<String>,
        uuid: Option<Uuid>,
    ) -> GraphResult<SubgraphHandle> {
        if let Some(p) = parent {
            if !self.subgraphs.contains_key(&p) {
                return Err(GraphError::NotFound(EntityRef::Subgraph(p)));
            }
        }
        let uuid = self.claim_uuid(uuid)?;
        let handle = self.registry.next_subgraph()?;
        let input_node = self.registry.next_node()?;
        let output_node = self.registry.next_node()?;
        self.registry.register(uuid, EntityRef::Subgraph(handle));

        self.subgraphs.insert(
            handle,
            Subgraph {
                handle,
                uuid,
                name: name.into(),
                parent,
                nodes: vec![input_node, output_node],
                connections: Vec::new(),
                input_node,
                output_node,
                saved_view: None,
                expanded: true,
                metadata: IndexMap::new(),
            },
        );
        self.insert_interface_node(handle, input_node, "Inputs", INTERFACE_INPUT_TYPE, -INTERFACE_OFFSET);
        self.insert_interface_node(handle, output_node, "Outputs", INTERFACE_OUTPUT_TYPE, INTERFACE_OFFSET);
        tracing::debug!(%handle, %uuid, "subgraph created");

        self.notify_node_created(input_node);
        self.notify_node_created(output_node);
        Ok(handle)
    }

    fn insert_interface_node(
        &mut self,
        scope: SubgraphHandle,
        handle: NodeHandle,
        name: &str,
        node_type: &str,
        x: f32,
    ) {
        let uuid = Uuid::new_v4();
        self.registry.register(uuid, EntityRef::Node(handle));
        let mut node = Node::new(handle, uuid, name, node_type, Pos2::new(x, 0.0));
        node.subgraph = Some(scope);
        node.protected = true;
        self.nodes.insert(handle, node);
    }

    /// Remove a subgraph, its contents, nested subgraphs and every instance
    /// node targeting it
    pub fn remove_subgraph(&mut self, handle: SubgraphHandle) -> GraphResult<Subgraph> {
        if !self.subgraphs.contains_key(&handle) {
            return Err(GraphError::NotFound(EntityRef::Subgraph(handle)));
        }

        // Breadth-first over the parent links. The visited set keeps a
        // malformed parent cycle from looping.
        let mut doomed = vec![handle];
        let mut visited = HashSet::from([handle]);
        let mut next = 0;
        while let Some(&current) = doomed.get(next) {
            next += 1;
            for sub in self.subgraphs.values() {
                if sub.parent == Some(current) && visited.insert(sub.handle) {
                    doomed.push(sub.handle);
                }
            }
        }
        for &nested in doomed[1..].iter().rev() {
            self.remove_single_subgraph(nested)?;
        }
        self.remove_single_subgraph(handle)
    }

    fn remove_single_subgraph(&mut self, handle: SubgraphHandle) -> GraphResult<Subgraph> {
        let instances: Vec<NodeHandle> = self
            .nodes
            .values()
            .filter(|n| n.subgraph_target == Some(handle))
            .map(|n| n.handle)
            .collect();
        for node in instances {
            self.remove_node_unchecked(node);
        }

        let contained = self
            .subgraphs
            .get(&handle)
            .map(|s| s.nodes.clone())
            .unwrap_or_default();
        for node in contained {
            self.remove_node_unchecked(node);
        }

        let groups: Vec<_> = self.groups_in(Some(handle)).map(|g| g.handle).collect();
        for group in groups {
            self.remove_group(group);
        }

        let sub = self
            .subgraphs
            .shift_remove(&handle)
            .ok_or(GraphError::NotFound(EntityRef::Subgraph(handle)))?;
        self.registry.unregister(EntityRef::Subgraph(handle));
        tracing::debug!(%handle, "subgraph removed");
        Ok(sub)
    }

    /// Get a subgraph
    pub fn subgraph(&self, handle: SubgraphHandle) -> Option<&Subgraph> {
        self.subgraphs.get(&handle)
    }

    /// Get a subgraph by uuid
    pub fn subgraph_by_uuid(&self, uuid: &Uuid) -> Option<&Subgraph> {
        self.subgraph(self.registry.subgraph(uuid)?)
    }

    /// All subgraphs
    pub fn subgraphs(&self) -> impl Iterator<Item = &Subgraph> {
        self.subgraphs.values()
    }

    /// Subgraphs directly nested in a scope
    pub fn subgraphs_in(&self, parent: Option<SubgraphHandle>) -> impl Iterator<Item = &Subgraph> {
        self.subgraphs.values().filter(move |s| s.parent == parent)
    }

    /// Rename a subgraph; instance nodes keep their own names
    pub fn set_subgraph_name(&mut self, handle: SubgraphHandle, name: impl Into<String>) -> bool {
        match self.subgraphs.get_mut(&handle) {
            Some(sub) => {
                sub.name = name.into();
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_saved_view(&mut self, handle: SubgraphHandle, view: ViewportState) {
        if let Some(sub) = self.subgraphs.get_mut(&handle) {
            sub.saved_view = Some(view);
        }
    }

    /// The subgraph whose interface node this is
    pub fn interface_owner(&self, node: NodeHandle) -> Option<SubgraphHandle> {
        let scope = self.nodes.get(&node)?.subgraph?;
        self.subgraphs
            .get(&scope)
            .filter(|s| s.is_interface_node(node))
            .map(|s| s.handle)
    }

    /// Scope chain from `scope` outwards, starting with `scope` itself
    pub fn ancestors(&self, scope: Option<SubgraphHandle>) -> Vec<SubgraphHandle> {
        let mut chain = Vec::new();
        let mut current = scope;
        while let Some(s) = current {
            if chain.contains(&s) {
                break;
            }
            chain.push(s);
            current = self.subgraphs.get(&s).and_then(|sub| sub.parent);
        }
        chain
    }

    /// Whether following parent links from `start` ever revisits a subgraph
    pub(crate) fn parent_chain_cycles(&self, start: SubgraphHandle) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(start);
        while let Some(s) = current {
            if !visited.insert(s) {
                return true;
            }
            current = self.subgraphs.get(&s).and_then(|sub| sub.parent);
        }
        false
    }

    /// Every subgraph whose contents are pulled in by `target`: nested
    /// subgraphs and targets of instance nodes, transitively
    fn dependencies(&self, target: SubgraphHandle) -> HashSet<SubgraphHandle> {
        let mut seen = HashSet::new();
        let mut stack = vec![target];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            stack.extend(self.subgraphs_in(Some(current)).map(|s| s.handle));
            stack.extend(self.nodes_in(Some(current)).filter_map(|n| n.subgraph_target));
        }
        seen
    }

    fn would_recurse(&self, scope: Option<SubgraphHandle>, target: SubgraphHandle) -> bool {
        let deps = self.dependencies(target);
        self.ancestors(scope).iter().any(|s| deps.contains(s))
    }

    /// Place an instance node of `target` into `scope`
    pub fn add_subgraph_instance(
        &mut self,
        scope: Option<SubgraphHandle>,
        target: SubgraphHandle,
        position: Pos2,
        uuid: Option<Uuid>,
    ) -> GraphResult<NodeHandle> {
        let name = self
            .subgraphs
            .get(&target)
            .ok_or(GraphError::NotFound(EntityRef::Subgraph(target)))?
            .name
            .clone();
        if self.would_recurse(scope, target) {
            return Err(GraphError::RecursiveInstance(target));
        }
        let node = self.insert_node(scope, name, INSTANCE_TYPE, position, uuid)?;
        if let Some(n) = self.nodes.get_mut(&node) {
            n.subgraph_target = Some(target);
        }
        if let Err(err) = self.resync_instance(node) {
            // The node was never announced, so its removal is not either
            let on_removed = self.callbacks.on_node_removed.take();
            self.remove_node_unchecked(node);
            self.callbacks.on_node_removed = on_removed;
            return Err(err);
        }
        self.notify_node_created(node);
        Ok(node)
    }

    /// Add an exposed pin to a subgraph's interface. `direction` is as seen
    /// from outside: an `Input` lands on the interface input node as an output.
    pub fn add_interface_pin(
        &mut self,
        subgraph: SubgraphHandle,
        direction: PinDirection,
        name: impl Into<String>,
        pin_type: PinType,
    ) -> GraphResult<PinHandle> {
        let sub = self
            .subgraphs
            .get(&subgraph)
            .ok_or(GraphError::NotFound(EntityRef::Subgraph(subgraph)))?;
        let node = match direction {
            PinDirection::Input => sub.input_node,
            PinDirection::Output => sub.output_node,
        };
        self.add_pin(node, name, direction.flipped(), pin_type, PinShape::default(), None)
    }

    /// Remove an exposed pin from either interface node
    pub fn remove_interface_pin(&mut self, subgraph: SubgraphHandle, pin: PinHandle) -> GraphResult<Pin> {
        let sub = self
            .subgraphs
            .get(&subgraph)
            .ok_or(GraphError::NotFound(EntityRef::Subgraph(subgraph)))?;
        let (input_node, output_node) = (sub.input_node, sub.output_node);
        let node = if self.pin(input_node, pin).is_some() {
            input_node
        } else {
            output_node
        };
        self.remove_pin(node, pin)
    }

    /// Move a node into another scope. Connections that would cross scopes
    /// afterwards are removed.
    pub fn set_node_subgraph(&mut self, node: NodeHandle, scope: Option<SubgraphHandle>) -> GraphResult<()> {
        let current = self
            .nodes
            .get(&node)
            .ok_or(GraphError::NotFound(EntityRef::Node(node)))?;
        if let Some(s) = scope {
            if !self.subgraphs.contains_key(&s) {
                return Err(GraphError::NotFound(EntityRef::Subgraph(s)));
            }
        }
        if current.subgraph == scope {
            return Ok(());
        }
        if self.interface_owner(node).is_some() {
            return Err(GraphError::Protected(node));
        }
        if let Some(target) = current.subgraph_target {
            if self.would_recurse(scope, target) {
                return Err(GraphError::RecursiveInstance(target));
            }
        }
        let old_scope = current.subgraph;

        let crossing: Vec<_> = self
            .connections()
            .filter(|c| c.involves_node(node))
            .map(|c| c.handle)
            .collect();
        for conn in crossing {
            self.remove_connection(conn);
        }
        self.remove_node_from_group(node);

        if let Some(sub) = old_scope.and_then(|s| self.subgraphs.get_mut(&s)) {
            sub.nodes.retain(|n| *n != node);
        }
        if let Some(sub) = scope.and_then(|s| self.subgraphs.get_mut(&s)) {
            sub.nodes.push(node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.subgraph = scope;
        }
        tracing::debug!(%node, "node moved to another scope");
        Ok(())
    }

    /// Regenerate the pins of every instance of `subgraph`
    pub(crate) fn resync_instances(&mut self, subgraph: SubgraphHandle) -> GraphResult<()> {
        let instances: Vec<NodeHandle> = self
            .nodes
            .values()
            .filter(|n| n.subgraph_target == Some(subgraph))
            .map(|n| n.handle)
            .collect();
        for instance in instances {
            self.resync_instance(instance)?;
        }
        Ok(())
    }

    /// Regenerate an instance node's pins from its target's interface.
    /// Pins already mirroring an interface pin keep their handle, uuid and
    /// connections; pins whose interface pin is gone are removed.
    ///
    /// Fails only when the pin handle space is exhausted.
    pub fn resync_instance(&mut self, instance: NodeHandle) -> GraphResult<()> {
        let Some(target) = self.nodes.get(&instance).and_then(|n| n.subgraph_target) else {
            return Ok(());
        };
        let Some((exposed_inputs, exposed_outputs)) = self.interface_pins(target) else {
            return Ok(());
        };
        let Some(node) = self.nodes.get(&instance) else {
            return Ok(());
        };

        let stale: Vec<PinHandle> = node
            .pins()
            .filter(|p| {
                let interface = match p.direction {
                    PinDirection::Input => &exposed_inputs,
                    PinDirection::Output => &exposed_outputs,
                };
                !interface.iter().any(|ip| Some(ip.handle) == p.mirror_of)
            })
            .map(|p| p.handle)
            .collect();
        for pin in stale {
            self.remove_pin_unchecked(instance, pin);
        }

        let inputs = self.mirror_pins(instance, &exposed_inputs, PinDirection::Input)?;
        let outputs = match self.mirror_pins(instance, &exposed_outputs, PinDirection::Output) {
            Ok(outputs) => outputs,
            Err(err) => {
                self.forget_fresh_pins(instance, &inputs);
                return Err(err);
            }
        };
        if let Some(node) = self.nodes.get_mut(&instance) {
            node.inputs = inputs;
            node.outputs = outputs;
        }
        tracing::trace!(%instance, %target, "instance pins resynchronized");
        Ok(())
    }

    fn interface_pins(&self, subgraph: SubgraphHandle) -> Option<(Vec<Pin>, Vec<Pin>)> {
        let sub = self.subgraphs.get(&subgraph)?;
        let inputs = self.nodes.get(&sub.input_node)?.outputs.clone();
        let outputs = self.nodes.get(&sub.output_node)?.inputs.clone();
        Some((inputs, outputs))
    }

    /// Unregister mirror pins built for `instance` that never made it onto
    /// the node
    fn forget_fresh_pins(&mut self, instance: NodeHandle, pins: &[Pin]) {
        let Some(node) = self.nodes.get(&instance) else {
            return;
        };
        let fresh: Vec<PinHandle> = pins
            .iter()
            .filter(|p| node.pin(p.handle).is_none())
            .map(|p| p.handle)
            .collect();
        for pin in fresh {
            self.registry.unregister(EntityRef::Pin(instance, pin));
        }
    }

    fn mirror_pins(
        &mut self,
        instance: NodeHandle,
        interface: &[Pin],
        direction: PinDirection,
    ) -> GraphResult<Vec<Pin>> {
        let mut pins = Vec::with_capacity(interface.len());
        for source in interface {
            let existing = self
                .nodes
                .get(&instance)
                .and_then(|n| n.pins_in(direction).iter().find(|p| p.mirror_of == Some(source.handle)))
                .cloned();
            let pin = match existing {
                Some(mut pin) => {
                    pin.name.clone_from(&source.name);
                    pin.pin_type = source.pin_type.clone();
                    pin.shape = source.shape;
                    pin
                }
                None => {
                    let handle = match self.registry.next_pin() {
                        Ok(handle) => handle,
                        Err(err) => {
                            self.forget_fresh_pins(instance, &pins);
                            return Err(err);
                        }
                    };
                    let uuid = Uuid::new_v4();
                    self.registry.register(uuid, EntityRef::Pin(instance, handle));
                    let mut pin = Pin::new(handle, uuid, source.name.clone(), direction, source.pin_type.clone())
                        .with_shape(source.shape);
                    pin.mirror_of = Some(source.handle);
                    pin
                }
            };
            pins.push(pin);
        }
        Ok(pins)
    }

    /// Whether an instance's pins match its target interface by order,
    /// name and type
    pub fn instance_mirrors_interface(&self, instance: NodeHandle) -> bool {
        let Some(node) = self.nodes.get(&instance) else {
            return false;
        };
        let Some((inputs, outputs)) = node.subgraph_target.and_then(|t| self.interface_pins(t)) else {
            return false;
        };
        let same = |a: &[Pin], b: &[Pin]| {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(x, y)| x.name == y.name && x.pin_type == y.pin_type)
        };
        same(&node.inputs, &inputs) && same(&node.outputs, &outputs)
    }
}

/// Navigation stack of entered subgraphs. Empty means the root graph.
#[derive(Debug, Clone, Default)]
pub struct SubgraphNavigator {
    stack: Vec<SubgraphHandle>,
    root_view: Option<ViewportState>,
}

impl SubgraphNavigator {
    /// Create a navigator at the root graph
    pub fn new() -> Self {
        Self::default()
    }

    /// The active subgraph, `None` for the root graph
    pub fn active(&self) -> Option<SubgraphHandle> {
        self.stack.last().copied()
    }

    /// Entered subgraphs, outermost first
    pub fn stack(&self) -> &[SubgraphHandle] {
        &self.stack
    }

    /// Navigation depth
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Enter a subgraph, saving the outgoing view and restoring the incoming
    /// one. A first entry centers on the subgraph's contents at scale 1.
    pub fn enter(&mut self, graph: &mut Graph, viewport: &mut Viewport, handle: SubgraphHandle) -> GraphResult<()> {
        let saved = graph
            .subgraph(handle)
            .ok_or(GraphError::NotFound(EntityRef::Subgraph(handle)))?
            .saved_view;

        self.save_view(graph, viewport.state());
        self.stack.push(handle);

        let view = match saved {
            Some(view) => view,
            None => {
                let contents = graph.nodes_in(Some(handle)).map(|n| n.handle).collect::<Vec<_>>();
                let center = graph.bounds_of(contents).map_or(Pos2::ZERO, |b| b.center());
                let (min, max) = viewport.scale_range();
                let scale = 1.0_f32.clamp(min, max);
                ViewportState {
                    pan: viewport.window_size() * 0.5 - center.to_vec2() * scale,
                    scale,
                }
            }
        };
        viewport.set_state(view);
        tracing::debug!(subgraph = %handle, depth = self.stack.len(), "entered subgraph");
        Ok(())
    }

    /// Leave the active subgraph. Returns the subgraph left, or `None` at
    /// the root.
    pub fn exit(&mut self, graph: &mut Graph, viewport: &mut Viewport) -> Option<SubgraphHandle> {
        let left = self.stack.pop()?;
        graph.set_saved_view(left, viewport.state());

        let view = match self.active() {
            None => self.root_view.take(),
            Some(parent) => graph.subgraph(parent).and_then(|s| s.saved_view),
        };
        viewport.set_state(view.unwrap_or(ViewportState::IDENTITY));
        tracing::debug!(subgraph = %left, depth = self.stack.len(), "exited subgraph");
        Some(left)
    }

    /// Drop a removed subgraph (and anything entered below it) from the stack
    pub fn forget(&mut self, handle: SubgraphHandle) {
        if let Some(i) = self.stack.iter().position(|s| *s == handle) {
            self.stack.truncate(i);
        }
    }

    /// Return to the root graph without restoring views
    pub fn reset(&mut self) {
        self.stack.clear();
        self.root_view = None;
    }

    fn save_view(&mut self, graph: &mut Graph, view: ViewportState) {
        match self.active() {
            None => self.root_view = Some(view),
            Some(current) => graph.set_saved_view(current, view),
        }
    }
}
