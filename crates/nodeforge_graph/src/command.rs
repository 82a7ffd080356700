// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named-command dispatch.
//!
//! Handlers are registered under dotted names (`node.add`, `view.zoomToFit`)
//! and receive their payload as JSON. Each handler declares a typed payload
//! struct; the bus deserializes into it and turns any mismatch into
//! [`GraphError::InvalidPayload`] before the handler runs, so a bad payload
//! never mutates anything. `null` is accepted wherever a payload has no
//! required fields.

use crate::editor::GraphEditor;
use crate::error::{GraphError, GraphResult};
use crate::id::{ConnectionHandle, EntityRef, GroupHandle, NodeHandle, PinHandle, SubgraphHandle};
use crate::pin::{PinDirection, PinShape, PinType};
use egui::{Pos2, Vec2};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

/// Type-erased command handler
pub type CommandFn = Box<dyn Fn(&mut GraphEditor, Value) -> GraphResult<Value>>;

/// Registry of named commands.
///
/// [`CommandBus::new`] comes with the built-in editor commands;
/// `CommandBus::default()` is empty.
#[derive(Default)]
pub struct CommandBus {
    handlers: IndexMap<String, CommandFn>,
}

impl fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBus")
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandBus {
    /// Create a bus with the built-in commands
    pub fn new() -> Self {
        let mut bus = Self::default();
        builtins::register(&mut bus);
        bus
    }

    /// Bind a handler with a typed payload, replacing any previous binding
    pub fn register<P, F>(&mut self, name: impl Into<String>, handler: F)
    where
        P: DeserializeOwned,
        F: Fn(&mut GraphEditor, P) -> GraphResult<Value> + 'static,
    {
        let name = name.into();
        let command = name.clone();
        self.handlers.insert(
            name,
            Box::new(move |editor, payload| {
                let payload = if payload.is_null() {
                    Value::Object(serde_json::Map::new())
                } else {
                    payload
                };
                let payload = serde_json::from_value::<P>(payload).map_err(|e| GraphError::InvalidPayload {
                    command: command.clone(),
                    reason: e.to_string(),
                })?;
                handler(editor, payload)
            }),
        );
    }

    /// Remove a binding
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.shift_remove(name).is_some()
    }

    /// Whether a command is bound
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Bound command names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub(crate) fn invoke(&self, editor: &mut GraphEditor, name: &str, payload: Value) -> GraphResult<Value> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| GraphError::UnknownCommand(name.to_string()))?;
        tracing::debug!(command = name, "dispatch");
        handler(editor, payload)
    }
}

/// An entity named either by handle or by uuid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key<H> {
    /// Compact handle
    Handle(H),
    /// External uuid
    Uuid(Uuid),
}

impl<H> From<H> for Key<H> {
    fn from(handle: H) -> Self {
        Self::Handle(handle)
    }
}

mod builtins {
    use super::*;
    use crate::graph::Graph;

    fn node(graph: &Graph, key: Key<NodeHandle>) -> GraphResult<NodeHandle> {
        match key {
            Key::Handle(h) if graph.node(h).is_some() => Ok(h),
            Key::Handle(h) => Err(GraphError::NotFound(EntityRef::Node(h))),
            Key::Uuid(u) => graph.registry().node(&u).ok_or(GraphError::UnknownUuid(u)),
        }
    }

    fn pin(graph: &Graph, node: NodeHandle, key: Key<PinHandle>) -> GraphResult<PinHandle> {
        match key {
            Key::Handle(h) if graph.pin(node, h).is_some() => Ok(h),
            Key::Handle(h) => Err(GraphError::NotFound(EntityRef::Pin(node, h))),
            Key::Uuid(u) => match graph.registry().pin(&u) {
                Some((owner, pin)) if owner == node => Ok(pin),
                _ => Err(GraphError::UnknownUuid(u)),
            },
        }
    }

    fn connection(graph: &Graph, key: Key<ConnectionHandle>) -> GraphResult<ConnectionHandle> {
        match key {
            Key::Handle(h) if graph.connection(h).is_some() => Ok(h),
            Key::Handle(h) => Err(GraphError::NotFound(EntityRef::Connection(h))),
            Key::Uuid(u) => graph.registry().connection(&u).ok_or(GraphError::UnknownUuid(u)),
        }
    }

    fn group(graph: &Graph, key: Key<GroupHandle>) -> GraphResult<GroupHandle> {
        match key {
            Key::Handle(h) if graph.group(h).is_some() => Ok(h),
            Key::Handle(h) => Err(GraphError::NotFound(EntityRef::Group(h))),
            Key::Uuid(u) => graph.registry().group(&u).ok_or(GraphError::UnknownUuid(u)),
        }
    }

    fn subgraph(graph: &Graph, key: Key<SubgraphHandle>) -> GraphResult<SubgraphHandle> {
        match key {
            Key::Handle(h) if graph.subgraph(h).is_some() => Ok(h),
            Key::Handle(h) => Err(GraphError::NotFound(EntityRef::Subgraph(h))),
            Key::Uuid(u) => graph.registry().subgraph(&u).ok_or(GraphError::UnknownUuid(u)),
        }
    }

    fn created<H: Serialize>(handle: H, uuid: Option<Uuid>) -> Value {
        json!({ "handle": handle, "uuid": uuid })
    }

    #[derive(Deserialize)]
    struct NodeAdd {
        #[serde(rename = "type")]
        node_type: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        position: [f32; 2],
        #[serde(default)]
        uuid: Option<Uuid>,
    }

    #[derive(Deserialize)]
    struct NodeRef {
        node: Key<NodeHandle>,
    }

    #[derive(Deserialize)]
    struct NodeMove {
        node: Key<NodeHandle>,
        position: [f32; 2],
    }

    #[derive(Deserialize)]
    struct PinAdd {
        node: Key<NodeHandle>,
        name: String,
        direction: PinDirection,
        pin_type: PinType,
        #[serde(default)]
        shape: PinShape,
        #[serde(default)]
        uuid: Option<Uuid>,
    }

    #[derive(Deserialize)]
    struct PinRef {
        node: Key<NodeHandle>,
        pin: Key<PinHandle>,
    }

    #[derive(Deserialize)]
    struct ConnectionAdd {
        source_node: Key<NodeHandle>,
        source_pin: Key<PinHandle>,
        target_node: Key<NodeHandle>,
        target_pin: Key<PinHandle>,
        #[serde(default)]
        uuid: Option<Uuid>,
    }

    #[derive(Deserialize)]
    struct ConnectionRef {
        connection: Key<ConnectionHandle>,
    }

    #[derive(Deserialize)]
    struct GroupAdd {
        name: String,
        #[serde(default)]
        position: [f32; 2],
        #[serde(default)]
        size: Option<[f32; 2]>,
        #[serde(default)]
        nodes: Vec<Key<NodeHandle>>,
        #[serde(default)]
        uuid: Option<Uuid>,
    }

    #[derive(Deserialize)]
    struct GroupRef {
        group: Key<GroupHandle>,
    }

    #[derive(Deserialize)]
    struct SubgraphAdd {
        name: String,
        #[serde(default)]
        uuid: Option<Uuid>,
    }

    #[derive(Deserialize)]
    struct SubgraphRef {
        subgraph: Key<SubgraphHandle>,
    }

    #[derive(Deserialize, Default)]
    struct ZoomToFit {
        #[serde(default)]
        selected_only: bool,
    }

    #[derive(Deserialize)]
    struct Empty {}

    const GROUP_PADDING: f32 = 20.0;
    const DEFAULT_GROUP_SIZE: [f32; 2] = [400.0, 300.0];

    pub(super) fn register(bus: &mut CommandBus) {
        bus.register("node.add", |ed: &mut GraphEditor, p: NodeAdd| {
            let scope = ed.active_subgraph();
            let position = Pos2::from(p.position);
            let templates = ed.templates().clone();
            let graph = ed.graph_mut();
            let handle = graph.add_node_from_template(&templates, scope, &p.node_type, position, p.uuid)?;
            if let Some(name) = p.name {
                graph.set_node_name(handle, name);
            }
            Ok(created(handle, graph.node(handle).map(|n| n.uuid)))
        });

        bus.register("node.remove", |ed: &mut GraphEditor, p: NodeRef| {
            let graph = ed.graph_mut();
            let handle = node(graph, p.node)?;
            graph.remove_node(handle)?;
            Ok(Value::Null)
        });

        bus.register("node.move", |ed: &mut GraphEditor, p: NodeMove| {
            let graph = ed.graph_mut();
            let handle = node(graph, p.node)?;
            graph.set_node_position(handle, Pos2::from(p.position));
            Ok(Value::Null)
        });

        bus.register("pin.add", |ed: &mut GraphEditor, p: PinAdd| {
            let graph = ed.graph_mut();
            let owner = node(graph, p.node)?;
            let handle = graph.add_pin(owner, p.name, p.direction, p.pin_type, p.shape, p.uuid)?;
            Ok(created(handle, graph.pin(owner, handle).map(|pin| pin.uuid)))
        });

        bus.register("pin.remove", |ed: &mut GraphEditor, p: PinRef| {
            let graph = ed.graph_mut();
            let owner = node(graph, p.node)?;
            let handle = pin(graph, owner, p.pin)?;
            graph.remove_pin(owner, handle)?;
            Ok(Value::Null)
        });

        bus.register("connection.add", |ed: &mut GraphEditor, p: ConnectionAdd| {
            let graph = ed.graph_mut();
            let source = node(graph, p.source_node)?;
            let source_pin = pin(graph, source, p.source_pin)?;
            let target = node(graph, p.target_node)?;
            let target_pin = pin(graph, target, p.target_pin)?;
            let handle = graph.add_connection(source, source_pin, target, target_pin, p.uuid)?;
            Ok(created(handle, graph.connection(handle).map(|c| c.uuid)))
        });

        bus.register("connection.remove", |ed: &mut GraphEditor, p: ConnectionRef| {
            let graph = ed.graph_mut();
            let handle = connection(graph, p.connection)?;
            graph.remove_connection(handle);
            Ok(Value::Null)
        });

        bus.register("group.add", |ed: &mut GraphEditor, p: GroupAdd| {
            let scope = ed.active_subgraph();
            let graph = ed.graph_mut();
            let members = p
                .nodes
                .into_iter()
                .map(|key| node(graph, key))
                .collect::<GraphResult<Vec<_>>>()?;
            let size = Vec2::from(p.size.unwrap_or(DEFAULT_GROUP_SIZE));
            let handle = graph.add_group(scope, p.name, Pos2::from(p.position), size, p.uuid)?;
            for member in &members {
                graph.add_node_to_group(handle, *member)?;
            }
            if p.size.is_none() && !members.is_empty() {
                let header = ed.config().group_header_height;
                ed.graph_mut().fit_group_to_nodes(handle, GROUP_PADDING, header);
            }
            let graph = ed.graph();
            Ok(created(handle, graph.group(handle).map(|g| g.uuid)))
        });

        bus.register("group.remove", |ed: &mut GraphEditor, p: GroupRef| {
            let graph = ed.graph_mut();
            let handle = group(graph, p.group)?;
            graph.remove_group(handle);
            Ok(Value::Null)
        });

        bus.register("subgraph.add", |ed: &mut GraphEditor, p: SubgraphAdd| {
            let parent = ed.active_subgraph();
            let graph = ed.graph_mut();
            let handle = graph.add_subgraph(parent, p.name, p.uuid)?;
            Ok(created(handle, graph.subgraph(handle).map(|s| s.uuid)))
        });

        bus.register("subgraph.enter", |ed: &mut GraphEditor, p: SubgraphRef| {
            let handle = subgraph(ed.graph(), p.subgraph)?;
            ed.enter_subgraph(handle)?;
            Ok(Value::Null)
        });

        bus.register("subgraph.exit", |ed: &mut GraphEditor, _: Empty| {
            Ok(json!(ed.exit_subgraph()))
        });

        bus.register("view.zoomToFit", |ed: &mut GraphEditor, p: ZoomToFit| {
            ed.zoom_to_fit(p.selected_only);
            Ok(Value::Null)
        });

        bus.register("view.centerOnNode", |ed: &mut GraphEditor, p: NodeRef| {
            let handle = node(ed.graph(), p.node)?;
            ed.center_on_node(handle)?;
            Ok(Value::Null)
        });

        bus.register("selection.clear", |ed: &mut GraphEditor, _: Empty| {
            ed.graph_mut().clear_selection();
            Ok(Value::Null)
        });

        bus.register("selection.delete", |ed: &mut GraphEditor, _: Empty| {
            ed.cancel_interaction();
            let removed = ed.graph_mut().remove_selected();
            Ok(json!({
                "connections": removed.connections,
                "nodes": removed.nodes,
                "groups": removed.groups,
            }))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditorEvent;
    use crate::node::NodeTemplate;
    use crate::pin::PinSpec;

    fn handle(value: &Value) -> u32 {
        value["handle"].as_u64().unwrap() as u32
    }

    #[test]
    fn test_builtins_registered() {
        let bus = CommandBus::new();
        for name in [
            "node.add",
            "node.remove",
            "node.move",
            "pin.add",
            "pin.remove",
            "connection.add",
            "connection.remove",
            "group.add",
            "group.remove",
            "subgraph.add",
            "subgraph.enter",
            "subgraph.exit",
            "view.zoomToFit",
            "view.centerOnNode",
            "selection.clear",
            "selection.delete",
        ] {
            assert!(bus.contains(name), "{name}");
        }
        assert_eq!(CommandBus::default().names().count(), 0);
    }

    #[test]
    fn test_build_graph_through_commands() {
        let mut ed = GraphEditor::default();
        let a = ed
            .dispatch("node.add", json!({ "type": "math", "name": "A", "position": [0.0, 0.0] }))
            .unwrap();
        let b = ed
            .dispatch("node.add", json!({ "type": "math", "name": "B", "position": [200.0, 0.0] }))
            .unwrap();
        let out = ed
            .dispatch(
                "pin.add",
                json!({ "node": handle(&a), "name": "out", "direction": "Output", "pin_type": "Float" }),
            )
            .unwrap();
        // Refer to B by uuid
        let input = ed
            .dispatch(
                "pin.add",
                json!({ "node": b["uuid"], "name": "in", "direction": "Input", "pin_type": "Float" }),
            )
            .unwrap();
        let conn = ed
            .dispatch(
                "connection.add",
                json!({
                    "source_node": handle(&a),
                    "source_pin": handle(&out),
                    "target_node": handle(&b),
                    "target_pin": input["uuid"],
                }),
            )
            .unwrap();

        let graph = ed.graph();
        assert_eq!(graph.node(NodeHandle(handle(&a))).unwrap().name, "A");
        assert!(graph.is_connected(NodeHandle(handle(&b)), PinHandle(handle(&input))));
        assert!(graph.connection(ConnectionHandle(handle(&conn))).is_some());

        ed.dispatch("connection.remove", json!({ "connection": conn["uuid"] }))
            .unwrap();
        assert_eq!(ed.graph().connection_count(), 0);
    }

    #[test]
    fn test_node_add_uses_templates() {
        let mut ed = GraphEditor::default();
        ed.templates_mut().register(
            NodeTemplate::new("math.add", "Add")
                .with_pin(PinSpec::input("a", PinType::Float))
                .with_pin(PinSpec::output("sum", PinType::Float)),
        );
        let n = ed.dispatch("node.add", json!({ "type": "math.add" })).unwrap();
        let node = ed.graph().node(NodeHandle(handle(&n))).unwrap();
        assert_eq!(node.name, "Add");
        assert_eq!(node.inputs.len(), 1);
        assert_eq!(node.outputs.len(), 1);
    }

    #[test]
    fn test_unknown_command_reports_error() {
        let mut ed = GraphEditor::default();
        let err = ed.dispatch("node.explode", Value::Null).unwrap_err();
        assert_eq!(err, GraphError::UnknownCommand("node.explode".into()));
        assert_eq!(
            ed.drain_events(),
            vec![EditorEvent::Error {
                command: "node.explode".into(),
                error: err,
            }]
        );
    }

    #[test]
    fn test_invalid_payload_does_not_mutate() {
        let mut ed = GraphEditor::default();
        let err = ed
            .dispatch("node.add", json!({ "name": "missing type" }))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidPayload { ref command, .. } if command == "node.add"));
        assert_eq!(ed.graph().node_count(), 0);

        let err = ed.dispatch("node.move", json!({ "node": 0, "position": "far" })).unwrap_err();
        assert!(matches!(err, GraphError::InvalidPayload { .. }));
    }

    #[test]
    fn test_protected_and_missing() {
        let mut ed = GraphEditor::default();
        let s = ed.dispatch("subgraph.add", json!({ "name": "S" })).unwrap();
        let interface = ed.graph().subgraph(SubgraphHandle(handle(&s))).unwrap().input_node;
        let err = ed.dispatch("node.remove", json!({ "node": interface })).unwrap_err();
        assert_eq!(err, GraphError::Protected(interface));

        let err = ed.dispatch("node.remove", json!({ "node": 999 })).unwrap_err();
        assert_eq!(err, GraphError::NotFound(EntityRef::Node(NodeHandle(999))));
    }

    #[test]
    fn test_navigation_commands() {
        let mut ed = GraphEditor::default();
        let s = ed.dispatch("subgraph.add", json!({ "name": "S" })).unwrap();
        ed.dispatch("subgraph.enter", json!({ "subgraph": s["uuid"] })).unwrap();
        assert_eq!(ed.active_subgraph(), Some(SubgraphHandle(handle(&s))));

        // Nodes land in the active scope
        let n = ed.dispatch("node.add", json!({ "type": "t" })).unwrap();
        assert_eq!(
            ed.graph().node(NodeHandle(handle(&n))).unwrap().subgraph,
            Some(SubgraphHandle(handle(&s)))
        );

        let left = ed.dispatch("subgraph.exit", Value::Null).unwrap();
        assert_eq!(left, json!(handle(&s)));
        assert_eq!(ed.dispatch("subgraph.exit", Value::Null).unwrap(), Value::Null);
        assert!(ed.dispatch("subgraph.enter", json!({ "subgraph": 42 })).is_err());
    }

    #[test]
    fn test_group_and_selection_commands() {
        let mut ed = GraphEditor::default();
        let a = ed
            .dispatch("node.add", json!({ "type": "t", "position": [100.0, 100.0] }))
            .unwrap();
        let g = ed
            .dispatch("group.add", json!({ "name": "G", "nodes": [handle(&a)] }))
            .unwrap();
        let group = ed.graph().group(GroupHandle(handle(&g))).unwrap();
        assert!(group.contains(NodeHandle(handle(&a))));
        assert!(group.rect().contains(Pos2::new(100.0, 100.0)));

        ed.graph_mut().select_node(NodeHandle(handle(&a)), false);
        let removed = ed.dispatch("selection.delete", Value::Null).unwrap();
        assert_eq!(removed["nodes"], json!([handle(&a)]));
        assert_eq!(ed.graph().node_count(), 0);

        ed.dispatch("group.remove", json!({ "group": handle(&g) })).unwrap();
        assert_eq!(ed.graph().groups().count(), 0);
        ed.dispatch("selection.clear", json!({})).unwrap();
    }

    #[test]
    fn test_custom_command() {
        let mut ed = GraphEditor::default();
        #[derive(Deserialize)]
        struct Rename {
            name: String,
        }
        ed.commands_mut().register("graph.rename", |ed: &mut GraphEditor, p: Rename| {
            ed.graph_mut().name = p.name;
            Ok(Value::Null)
        });
        ed.dispatch("graph.rename", json!({ "name": "Shader" })).unwrap();
        assert_eq!(ed.graph().name, "Shader");
        assert!(ed.commands_mut().unregister("graph.rename"));
    }
}
