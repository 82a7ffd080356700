// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence format.
//!
//! A [`GraphDocument`] references entities by uuid, and also records every
//! handle so that loading reproduces the exact handle <-> uuid bindings.
//! Selection and `current` flags are session state and are not saved; pin
//! `connected` flags are recomputed from the connection list on load.

use crate::connection::{Connection, Endpoint, Reroute};
use crate::error::GraphError;
use crate::graph::{Graph, InvariantViolation};
use crate::group::{Group, GroupStyle};
use crate::id::{ConnectionHandle, EntityRef, GroupHandle, NodeHandle, PinHandle, RerouteHandle, SubgraphHandle};
use crate::node::{LabelPlacement, MetaValue, Node};
use crate::pin::{Pin, PinDirection, PinShape, PinType};
use crate::subgraph::Subgraph;
use crate::viewport::ViewportState;
use egui::{Color32, Pos2, Vec2};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Current document format version
pub const DOCUMENT_VERSION: u32 = 1;

/// Errors while encoding or decoding a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// RON syntax or shape error
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// RON serializer error
    #[error("RON serialize error: {0}")]
    RonSerialize(#[from] ron::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document references entities inconsistently
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Two records claim the same handle
    #[error("Duplicate handle: {0}")]
    DuplicateHandle(EntityRef),

    /// The document was written by a newer format
    #[error("Unsupported document version {0}")]
    UnsupportedVersion(u32),

    /// The loaded graph breaks store invariants
    #[error("Document breaks {} store invariant(s), first: {:?}", .0.len(), .0.first())]
    Invariants(Vec<InvariantViolation>),
}

/// A saved pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinRecord {
    /// Handle
    pub handle: PinHandle,
    /// Uuid
    pub uuid: Uuid,
    /// Name
    pub name: String,
    /// Data type
    pub pin_type: PinType,
    /// Visual shape
    #[serde(default)]
    pub shape: PinShape,
    /// Interface pin mirrored by an instance pin
    #[serde(default)]
    pub mirror_of: Option<Uuid>,
}

/// A saved node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Handle
    pub handle: NodeHandle,
    /// Uuid
    pub uuid: Uuid,
    /// Display name
    pub name: String,
    /// Type tag
    pub node_type: String,
    /// World position
    pub position: Pos2,
    /// World size
    pub size: Vec2,
    /// Input pins in order
    #[serde(default)]
    pub inputs: Vec<PinRecord>,
    /// Output pins in order
    #[serde(default)]
    pub outputs: Vec<PinRecord>,
    /// Disabled flag
    #[serde(default)]
    pub disabled: bool,
    /// Template flag
    #[serde(default)]
    pub template: bool,
    /// Protected flag
    #[serde(default)]
    pub protected: bool,
    /// Icon glyph
    #[serde(default)]
    pub icon: Option<String>,
    /// Label placement
    #[serde(default)]
    pub label: LabelPlacement,
    /// Containing subgraph
    #[serde(default)]
    pub subgraph: Option<Uuid>,
    /// Instanced subgraph
    #[serde(default)]
    pub subgraph_target: Option<Uuid>,
    /// Metadata
    #[serde(default)]
    pub metadata: IndexMap<String, MetaValue>,
}

/// A saved reroute waypoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerouteRecord {
    /// Handle
    pub handle: RerouteHandle,
    /// Uuid
    pub uuid: Uuid,
    /// World position
    pub position: Pos2,
}

/// A saved connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Handle
    pub handle: ConnectionHandle,
    /// Uuid
    pub uuid: Uuid,
    /// Output node
    pub source_node: Uuid,
    /// Output pin
    pub source_pin: Uuid,
    /// Input node
    pub target_node: Uuid,
    /// Input pin
    pub target_pin: Uuid,
    /// Containing subgraph
    #[serde(default)]
    pub subgraph: Option<Uuid>,
    /// Waypoints in routing order
    #[serde(default)]
    pub reroutes: Vec<RerouteRecord>,
}

/// A saved group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Handle
    pub handle: GroupHandle,
    /// Uuid
    pub uuid: Uuid,
    /// Display name
    pub name: String,
    /// World position
    pub position: Pos2,
    /// World size
    pub size: Vec2,
    /// Frame color
    pub color: Color32,
    /// Style variant
    #[serde(default)]
    pub style: GroupStyle,
    /// Collapsed flag
    #[serde(default)]
    pub collapsed: bool,
    /// Scope
    #[serde(default)]
    pub subgraph: Option<Uuid>,
    /// Member nodes
    #[serde(default)]
    pub nodes: Vec<Uuid>,
}

/// A saved subgraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphRecord {
    /// Handle
    pub handle: SubgraphHandle,
    /// Uuid
    pub uuid: Uuid,
    /// Display name
    pub name: String,
    /// Enclosing subgraph
    #[serde(default)]
    pub parent: Option<Uuid>,
    /// Contained nodes
    #[serde(default)]
    pub nodes: Vec<Uuid>,
    /// Contained connections
    #[serde(default)]
    pub connections: Vec<Uuid>,
    /// Interface input node
    pub input_node: Uuid,
    /// Interface output node
    pub output_node: Uuid,
    /// Viewport saved on exit
    #[serde(default)]
    pub saved_view: Option<ViewportState>,
    /// Expansion flag
    #[serde(default)]
    pub expanded: bool,
    /// Metadata
    #[serde(default)]
    pub metadata: IndexMap<String, MetaValue>,
}

/// A whole graph in its persisted form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Format version
    pub version: u32,
    /// Graph name
    pub name: String,
    /// Nodes in insertion order
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// Connections in insertion order
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    /// Subgraphs in insertion order
    #[serde(default)]
    pub subgraphs: Vec<SubgraphRecord>,
    /// Groups in insertion order
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
}

impl GraphDocument {
    /// Snapshot a graph
    pub fn from_graph(graph: &Graph) -> Self {
        let node_uuid = |h: NodeHandle| graph.node(h).map(|n| n.uuid);
        let sub_uuid = |h: Option<SubgraphHandle>| h.and_then(|s| graph.subgraph(s)).map(|s| s.uuid);
        let pin_uuids: HashMap<PinHandle, Uuid> = graph
            .nodes()
            .flat_map(Node::pins)
            .map(|p| (p.handle, p.uuid))
            .collect();
        let pin_uuid = |h: PinHandle| pin_uuids.get(&h).copied();

        let pin_record = |pin: &Pin| PinRecord {
            handle: pin.handle,
            uuid: pin.uuid,
            name: pin.name.clone(),
            pin_type: pin.pin_type.clone(),
            shape: pin.shape,
            mirror_of: pin.mirror_of.and_then(pin_uuid),
        };

        let nodes = graph
            .nodes()
            .map(|n| NodeRecord {
                handle: n.handle,
                uuid: n.uuid,
                name: n.name.clone(),
                node_type: n.node_type.clone(),
                position: n.position,
                size: n.size,
                inputs: n.inputs.iter().map(pin_record).collect(),
                outputs: n.outputs.iter().map(pin_record).collect(),
                disabled: n.disabled,
                template: n.template,
                protected: n.protected,
                icon: n.icon.clone(),
                label: n.label,
                subgraph: sub_uuid(n.subgraph),
                subgraph_target: sub_uuid(n.subgraph_target),
                metadata: n.metadata.clone(),
            })
            .collect();

        let connections = graph
            .connections()
            .filter_map(|c| {
                Some(ConnectionRecord {
                    handle: c.handle,
                    uuid: c.uuid,
                    source_node: node_uuid(c.source.node)?,
                    source_pin: graph.pin(c.source.node, c.source.pin)?.uuid,
                    target_node: node_uuid(c.target.node)?,
                    target_pin: graph.pin(c.target.node, c.target.pin)?.uuid,
                    subgraph: sub_uuid(c.subgraph),
                    reroutes: graph
                        .reroutes_of(c.handle)
                        .map(|r| RerouteRecord {
                            handle: r.handle,
                            uuid: r.uuid,
                            position: r.position,
                        })
                        .collect(),
                })
            })
            .collect();

        let subgraphs = graph
            .subgraphs()
            .filter_map(|s| {
                Some(SubgraphRecord {
                    handle: s.handle,
                    uuid: s.uuid,
                    name: s.name.clone(),
                    parent: sub_uuid(s.parent),
                    nodes: s.nodes.iter().filter_map(|n| node_uuid(*n)).collect(),
                    connections: s
                        .connections
                        .iter()
                        .filter_map(|c| graph.connection(*c).map(|c| c.uuid))
                        .collect(),
                    input_node: node_uuid(s.input_node)?,
                    output_node: node_uuid(s.output_node)?,
                    saved_view: s.saved_view,
                    expanded: s.expanded,
                    metadata: s.metadata.clone(),
                })
            })
            .collect();

        let groups = graph
            .groups()
            .map(|g| GroupRecord {
                handle: g.handle,
                uuid: g.uuid,
                name: g.name.clone(),
                position: g.position,
                size: g.size,
                color: g.color,
                style: g.style,
                collapsed: g.collapsed,
                subgraph: sub_uuid(g.subgraph),
                nodes: g.nodes.iter().filter_map(|n| node_uuid(*n)).collect(),
            })
            .collect();

        Self {
            version: DOCUMENT_VERSION,
            name: graph.name.clone(),
            nodes,
            connections,
            subgraphs,
            groups,
        }
    }

    /// Rebuild a graph. Fails on dangling uuids, duplicate uuids or handles,
    /// and on any broken store invariant.
    pub fn to_graph(&self) -> Result<Graph, DocumentError> {
        if self.version > DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion(self.version));
        }
        let mut graph = Graph::new(self.name.clone());
        let mut pin_handles = HashSet::new();

        // Bind every identity first so references resolve in any order
        for record in &self.subgraphs {
            bind(&mut graph, record.uuid, EntityRef::Subgraph(record.handle))?;
        }
        for record in &self.nodes {
            bind(&mut graph, record.uuid, EntityRef::Node(record.handle))?;
            for pin in record.inputs.iter().chain(&record.outputs) {
                if !pin_handles.insert(pin.handle) {
                    return Err(DocumentError::DuplicateHandle(EntityRef::Pin(record.handle, pin.handle)));
                }
                bind(&mut graph, pin.uuid, EntityRef::Pin(record.handle, pin.handle))?;
            }
        }
        for record in &self.connections {
            bind(&mut graph, record.uuid, EntityRef::Connection(record.handle))?;
            for r in &record.reroutes {
                bind(&mut graph, r.uuid, EntityRef::Reroute(r.handle))?;
            }
        }
        for record in &self.groups {
            bind(&mut graph, record.uuid, EntityRef::Group(record.handle))?;
        }

        for record in &self.subgraphs {
            let subgraph = Subgraph {
                handle: record.handle,
                uuid: record.uuid,
                name: record.name.clone(),
                parent: subgraph_ref(&graph, record.parent)?,
                nodes: record
                    .nodes
                    .iter()
                    .map(|uuid| node_ref(&graph, *uuid))
                    .collect::<Result<_, _>>()?,
                connections: record
                    .connections
                    .iter()
                    .map(|uuid| graph.registry.connection(uuid).ok_or(GraphError::UnknownUuid(*uuid)))
                    .collect::<Result<_, _>>()?,
                input_node: node_ref(&graph, record.input_node)?,
                output_node: node_ref(&graph, record.output_node)?,
                saved_view: record.saved_view,
                expanded: record.expanded,
                metadata: record.metadata.clone(),
            };
            graph.subgraphs.insert(record.handle, subgraph);
        }

        for record in &self.nodes {
            let mut node = Node::new(
                record.handle,
                record.uuid,
                record.name.clone(),
                record.node_type.clone(),
                record.position,
            );
            node.size = record.size;
            node.disabled = record.disabled;
            node.template = record.template;
            node.protected = record.protected;
            node.icon = record.icon.clone();
            node.label = record.label;
            node.subgraph = subgraph_ref(&graph, record.subgraph)?;
            node.subgraph_target = subgraph_ref(&graph, record.subgraph_target)?;
            node.metadata = record.metadata.clone();
            node.inputs = pins(&graph, &record.inputs, PinDirection::Input)?;
            node.outputs = pins(&graph, &record.outputs, PinDirection::Output)?;
            graph.nodes.insert(record.handle, node);
        }

        for record in &self.connections {
            let source = endpoint(&graph, record.source_node, record.source_pin)?;
            let target = endpoint(&graph, record.target_node, record.target_pin)?;
            let scope = subgraph_ref(&graph, record.subgraph)?;
            let mut conn = Connection::new(record.handle, record.uuid, source, target, scope);
            for (index, r) in record.reroutes.iter().enumerate() {
                conn.reroutes.push(r.handle);
                graph.reroutes.insert(
                    r.handle,
                    Reroute {
                        handle: r.handle,
                        uuid: r.uuid,
                        connection: record.handle,
                        index,
                        position: r.position,
                        selected: false,
                    },
                );
            }
            for end in [source, target] {
                if let Some(pin) = graph.nodes.get_mut(&end.node).and_then(|n| n.pin_mut(end.pin)) {
                    pin.connected = true;
                }
            }
            graph.connections.insert(record.handle, conn);
        }

        for record in &self.groups {
            let mut group = Group::new(record.handle, record.uuid, record.name.clone(), record.position, record.size);
            group.color = record.color;
            group.style = record.style;
            group.collapsed = record.collapsed;
            group.subgraph = subgraph_ref(&graph, record.subgraph)?;
            let members = record
                .nodes
                .iter()
                .map(|uuid| node_ref(&graph, *uuid))
                .collect::<Result<IndexSet<_>, _>>()?;
            for member in &members {
                if let Some(node) = graph.nodes.get_mut(member) {
                    node.group = Some(record.handle);
                }
            }
            group.nodes = members;
            graph.groups.insert(record.handle, group);
        }

        let violations = graph.validate();
        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), "document rejected");
            return Err(DocumentError::Invariants(violations));
        }
        tracing::debug!(
            nodes = graph.node_count(),
            connections = graph.connection_count(),
            "document loaded"
        );
        Ok(graph)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, DocumentError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Deserialize from RON
    pub fn from_ron(s: &str) -> Result<Self, DocumentError> {
        Ok(ron::from_str(s)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(s: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(s)?)
    }
}

fn bind(graph: &mut Graph, uuid: Uuid, entity: EntityRef) -> Result<(), DocumentError> {
    if graph.registry.uuid_of(entity).is_some() {
        return Err(DocumentError::DuplicateHandle(entity));
    }
    if !graph.registry.register(uuid, entity) {
        return Err(GraphError::DuplicateUuid(uuid).into());
    }
    graph.registry.reserve(entity);
    Ok(())
}

fn node_ref(graph: &Graph, uuid: Uuid) -> Result<NodeHandle, GraphError> {
    graph.registry.node(&uuid).ok_or(GraphError::UnknownUuid(uuid))
}

fn subgraph_ref(graph: &Graph, uuid: Option<Uuid>) -> Result<Option<SubgraphHandle>, GraphError> {
    uuid.map(|u| graph.registry.subgraph(&u).ok_or(GraphError::UnknownUuid(u)))
        .transpose()
}

fn endpoint(graph: &Graph, node: Uuid, pin: Uuid) -> Result<Endpoint, GraphError> {
    let node = node_ref(graph, node)?;
    match graph.registry.pin(&pin) {
        Some((owner, pin)) if owner == node => Ok(Endpoint::new(node, pin)),
        _ => Err(GraphError::UnknownUuid(pin)),
    }
}

fn pins(graph: &Graph, records: &[PinRecord], direction: PinDirection) -> Result<Vec<Pin>, GraphError> {
    records
        .iter()
        .map(|r| {
            let mut pin = Pin::new(r.handle, r.uuid, r.name.clone(), direction, r.pin_type.clone()).with_shape(r.shape);
            pin.mirror_of = match r.mirror_of {
                Some(uuid) => Some(graph.registry.pin(&uuid).ok_or(GraphError::UnknownUuid(uuid))?.1),
                None => None,
            };
            Ok(pin)
        })
        .collect()
}

impl Graph {
    /// Snapshot into a document
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument::from_graph(self)
    }

    /// Rebuild from a document
    pub fn from_document(document: &GraphDocument) -> Result<Self, DocumentError> {
        document.to_graph()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Graph {
        let mut graph = Graph::new("doc");
        let a = graph.add_node("A", "math.add", Pos2::new(10.0, 20.0), None).unwrap();
        let b = graph.add_node("B", "math.mul", Pos2::new(300.0, 20.0), None).unwrap();
        let out = graph
            .add_pin(a, "out", PinDirection::Output, PinType::Float, PinShape::Circle, None)
            .unwrap();
        let input = graph
            .add_pin(b, "in", PinDirection::Input, PinType::Float, PinShape::Diamond, None)
            .unwrap();
        let conn = graph.add_connection(a, out, b, input, None).unwrap();
        graph.add_reroute(conn, Pos2::new(150.0, 200.0), None, None).unwrap();
        graph.set_node_metadata(a, "note", MetaValue::String("hello".into()));

        let s = graph.add_subgraph(None, "Inner", None).unwrap();
        graph
            .add_interface_pin(s, PinDirection::Input, "x", PinType::Int)
            .unwrap();
        graph.add_subgraph_instance(None, s, Pos2::new(0.0, 400.0), None).unwrap();

        let g = graph
            .add_group(None, "G", Pos2::ZERO, Vec2::new(600.0, 200.0), None)
            .unwrap();
        graph.add_node_to_group(g, a).unwrap();
        graph
    }

    fn topology(graph: &Graph) -> Vec<(Uuid, Uuid, Uuid, Uuid)> {
        graph
            .connections()
            .map(|c| {
                (
                    graph.node(c.source.node).unwrap().uuid,
                    graph.pin(c.source.node, c.source.pin).unwrap().uuid,
                    graph.node(c.target.node).unwrap().uuid,
                    graph.pin(c.target.node, c.target.pin).unwrap().uuid,
                )
            })
            .collect()
    }

    #[test]
    fn test_ron_round_trip() {
        let graph = sample();
        let doc = graph.to_document();
        let text = doc.to_ron().unwrap();
        let loaded = Graph::from_document(&GraphDocument::from_ron(&text).unwrap()).unwrap();

        assert_eq!(loaded.to_document(), doc);
        assert_eq!(topology(&loaded), topology(&graph));
        for node in graph.nodes() {
            let other = loaded.node(node.handle).unwrap();
            assert_eq!(other.uuid, node.uuid);
            for pin in node.pins() {
                assert_eq!(other.pin(pin.handle).unwrap().connected, pin.connected);
            }
        }
        assert!(loaded.validate().is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let graph = sample();
        let doc = graph.to_document();
        let back = GraphDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_allocators_resume() {
        let graph = sample();
        let mut loaded = Graph::from_document(&graph.to_document()).unwrap();
        let highest = graph.node_handles().max().unwrap();
        let fresh = loaded.add_node("New", "t", Pos2::ZERO, None).unwrap();
        assert!(fresh > highest);
    }

    #[test]
    fn test_connected_flags_recomputed() {
        let graph = sample();
        let mut doc = graph.to_document();
        doc.connections.clear();
        for sub in &mut doc.subgraphs {
            sub.connections.clear();
        }
        let loaded = Graph::from_document(&doc).unwrap();
        assert!(loaded.nodes().flat_map(Node::pins).all(|p| !p.connected));
        assert_eq!(loaded.reroutes().count(), 0);
    }

    #[test]
    fn test_dangling_uuid_rejected() {
        let graph = sample();
        let mut doc = graph.to_document();
        let missing = Uuid::new_v4();
        doc.connections[0].source_node = missing;
        assert!(matches!(
            Graph::from_document(&doc),
            Err(DocumentError::Graph(GraphError::UnknownUuid(u))) if u == missing
        ));
    }

    #[test]
    fn test_duplicate_uuid_rejected() {
        let graph = sample();
        let mut doc = graph.to_document();
        let dup = doc.nodes[0].uuid;
        doc.groups[0].uuid = dup;
        assert!(matches!(
            Graph::from_document(&doc),
            Err(DocumentError::Graph(GraphError::DuplicateUuid(u))) if u == dup
        ));
    }

    #[test]
    fn test_broken_invariants_rejected() {
        let graph = sample();
        let mut doc = graph.to_document();
        // Interface nodes must stay protected
        for node in &mut doc.nodes {
            node.protected = false;
        }
        assert!(matches!(Graph::from_document(&doc), Err(DocumentError::Invariants(_))));
    }

    fn violations(doc: &GraphDocument) -> Vec<InvariantViolation> {
        match Graph::from_document(doc) {
            Err(DocumentError::Invariants(found)) => found,
            other => panic!("expected invariant failure, got {other:?}"),
        }
    }

    #[test]
    fn test_self_parent_rejected() {
        let graph = sample();
        let mut doc = graph.to_document();
        let sub = &mut doc.subgraphs[0];
        sub.parent = Some(sub.uuid);
        let handle = sub.handle;
        assert!(violations(&doc).contains(&InvariantViolation::ParentCycle(handle)));
    }

    #[test]
    fn test_parent_cycle_rejected() {
        let mut graph = Graph::new("cycle");
        let outer = graph.add_subgraph(None, "Outer", None).unwrap();
        let inner = graph.add_subgraph(Some(outer), "Inner", None).unwrap();
        let mut doc = graph.to_document();
        let inner_uuid = graph.subgraph(inner).unwrap().uuid;
        for record in &mut doc.subgraphs {
            if record.handle == outer {
                record.parent = Some(inner_uuid);
            }
        }
        let found = violations(&doc);
        assert!(found.contains(&InvariantViolation::ParentCycle(outer)));
        assert!(found.contains(&InvariantViolation::ParentCycle(inner)));
    }

    #[test]
    fn test_dangling_subgraph_refs_rejected() {
        let graph = sample();
        let missing = Uuid::new_v4();

        let mut doc = graph.to_document();
        doc.nodes[0].subgraph = Some(missing);
        assert!(matches!(
            Graph::from_document(&doc),
            Err(DocumentError::Graph(GraphError::UnknownUuid(u))) if u == missing
        ));

        let mut doc = graph.to_document();
        doc.subgraphs[0].parent = Some(missing);
        assert!(matches!(
            Graph::from_document(&doc),
            Err(DocumentError::Graph(GraphError::UnknownUuid(u))) if u == missing
        ));

        let mut doc = graph.to_document();
        let instance = doc.nodes.iter_mut().find(|n| n.subgraph_target.is_some()).unwrap();
        instance.subgraph_target = Some(missing);
        assert!(matches!(
            Graph::from_document(&doc),
            Err(DocumentError::Graph(GraphError::UnknownUuid(u))) if u == missing
        ));
    }

    #[test]
    fn test_max_handle_exhausts_allocator() {
        let graph = sample();
        let mut doc = graph.to_document();
        let last = doc.nodes.iter_mut().find(|n| n.name == "B").unwrap();
        last.handle = NodeHandle(u32::MAX);
        last.inputs[0].handle = PinHandle(u32::MAX);

        let mut loaded = Graph::from_document(&doc).unwrap();
        let b = loaded.node(NodeHandle(u32::MAX)).unwrap();
        assert_eq!(b.name, "B");
        assert!(b.pin(PinHandle(u32::MAX)).unwrap().connected);

        let nodes = loaded.node_count();
        let subgraphs = loaded.subgraphs().count();
        assert_eq!(
            loaded.add_node("New", "t", Pos2::ZERO, None),
            Err(GraphError::HandlesExhausted("node"))
        );
        assert_eq!(
            loaded.add_subgraph(None, "New", None),
            Err(GraphError::HandlesExhausted("node"))
        );
        let a = loaded.nodes().find(|n| n.name == "A").unwrap().handle;
        assert_eq!(
            loaded.add_pin(a, "extra", PinDirection::Input, PinType::Float, PinShape::Circle, None),
            Err(GraphError::HandlesExhausted("pin"))
        );
        assert_eq!(loaded.node_count(), nodes);
        assert_eq!(loaded.subgraphs().count(), subgraphs);
        assert!(loaded.validate().is_empty());
    }

    #[test]
    fn test_interface_nodes_stay_protected() {
        let graph = sample();
        let doc = graph.to_document();
        let mut loaded = Graph::from_document(&GraphDocument::from_ron(&doc.to_ron().unwrap()).unwrap()).unwrap();
        let sub = loaded.subgraphs().next().unwrap().clone();
        for interface in [sub.input_node, sub.output_node] {
            assert!(loaded.node(interface).unwrap().protected);
            assert_eq!(loaded.remove_node(interface), Err(GraphError::Protected(interface)));
        }

        // Only the interface node's flag cleared
        let input_uuid = loaded.node(sub.input_node).unwrap().uuid;
        let mut doc = loaded.to_document();
        for record in &mut doc.nodes {
            if record.uuid == input_uuid {
                record.protected = false;
            }
        }
        assert_eq!(violations(&doc), vec![InvariantViolation::InterfaceNode(sub.handle)]);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut doc = sample().to_document();
        doc.version = DOCUMENT_VERSION + 1;
        assert!(matches!(
            Graph::from_document(&doc),
            Err(DocumentError::UnsupportedVersion(_))
        ));
    }
}
