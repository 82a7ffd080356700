// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end editing scenarios driven through the public API.

use egui::{PointerButton, Pos2, Vec2};
use nodeforge_graph::{
    ConnectionRejection, EditorConfig, FrameInput, GraphEditor, GraphError, InputEvent, NodeHandle, PinDirection,
    PinHandle, PinShape, PinType,
};

struct TwoNodes {
    editor: GraphEditor,
    a: NodeHandle,
    a_out: PinHandle,
    b: NodeHandle,
    b_in: PinHandle,
}

fn two_nodes() -> TwoNodes {
    let mut editor = GraphEditor::new(EditorConfig::default());
    let graph = editor.graph_mut();
    let a = graph.add_node("In", "t", Pos2::new(0.0, 0.0), None).unwrap();
    let b = graph.add_node("Out", "t", Pos2::new(200.0, 0.0), None).unwrap();
    let a_out = graph
        .add_pin(a, "a_out", PinDirection::Output, PinType::Float, PinShape::Circle, None)
        .unwrap();
    let b_in = graph
        .add_pin(b, "b_in", PinDirection::Input, PinType::Float, PinShape::Circle, None)
        .unwrap();
    graph.add_connection(a, a_out, b, b_in, None).unwrap();
    TwoNodes {
        editor,
        a,
        a_out,
        b,
        b_in,
    }
}

fn click_frame(events: Vec<InputEvent>) -> FrameInput {
    FrameInput {
        window_size: Vec2::new(1280.0, 720.0),
        dt: 1.0 / 60.0,
        events,
        ..FrameInput::default()
    }
}

#[test]
fn test_connect_two_nodes() {
    let t = two_nodes();
    let graph = t.editor.graph();
    assert!(graph.is_connected(t.a, t.a_out));
    assert!(graph.is_connected(t.b, t.b_in));
    assert_eq!(t.editor.evaluation_order().nodes, vec![t.a, t.b]);
    assert!(graph.validate().is_empty());
}

#[test]
fn test_duplicate_connection_refused() {
    let mut t = two_nodes();
    let graph = t.editor.graph_mut();
    let err = graph.add_connection(t.a, t.a_out, t.b, t.b_in, None).unwrap_err();
    assert_eq!(err, GraphError::IllegalConnection(ConnectionRejection::Duplicate));
    assert_eq!(graph.connection_count(), 1);
}

#[test]
fn test_remove_node_cascades() {
    let mut t = two_nodes();
    let graph = t.editor.graph_mut();
    graph.remove_node(t.a).unwrap();
    assert_eq!(graph.connection_count(), 0);
    assert!(!graph.is_connected(t.b, t.b_in));
    assert!(graph.node(t.b).is_some());
    assert!(graph.node(t.a).is_none());
    assert!(graph.validate().is_empty());
}

#[test]
fn test_cycle_is_reported_not_looped() {
    let mut editor = GraphEditor::default();
    let graph = editor.graph_mut();
    let mut nodes = Vec::new();
    for name in ["X", "Y", "Z"] {
        let n = graph.add_node(name, "t", Pos2::ZERO, None).unwrap();
        let i = graph
            .add_pin(n, "in", PinDirection::Input, PinType::Flow, PinShape::Triangle, None)
            .unwrap();
        let o = graph
            .add_pin(n, "out", PinDirection::Output, PinType::Flow, PinShape::Triangle, None)
            .unwrap();
        nodes.push((n, i, o));
    }
    let (x, y, z) = (nodes[0], nodes[1], nodes[2]);
    graph.add_connection(x.0, x.2, y.0, y.1, None).unwrap();
    graph.add_connection(y.0, y.2, z.0, z.1, None).unwrap();
    graph.add_connection(z.0, z.2, x.0, x.1, None).unwrap();

    let order = editor.evaluation_order();
    assert_eq!(order.len(), 3);
    assert!(order.has_cycle());
    let mut seen = order.nodes.clone();
    seen.sort();
    assert_eq!(seen, vec![x.0, y.0, z.0]);
}

#[test]
fn test_subgraph_instance_mirrors_interface() {
    let mut editor = GraphEditor::default();
    let graph = editor.graph_mut();
    let s = graph.add_subgraph(None, "S", None).unwrap();
    graph
        .add_interface_pin(s, PinDirection::Input, "in", PinType::Float)
        .unwrap();
    graph
        .add_interface_pin(s, PinDirection::Output, "out", PinType::Float)
        .unwrap();
    let i = graph.add_subgraph_instance(None, s, Pos2::ZERO, None).unwrap();

    let node = graph.node(i).unwrap();
    assert_eq!(node.inputs.len(), 1);
    assert_eq!(node.inputs[0].name, "in");
    assert_eq!(node.inputs[0].pin_type, PinType::Float);
    assert_eq!(node.outputs.len(), 1);
    assert_eq!(node.outputs[0].name, "out");

    graph
        .add_interface_pin(s, PinDirection::Input, "in2", PinType::Int)
        .unwrap();
    let node = graph.node(i).unwrap();
    assert_eq!(node.inputs.len(), 2);
    assert_eq!(node.inputs[1].name, "in2");
    assert_eq!(node.inputs[1].pin_type, PinType::Int);
    assert!(graph.validate().is_empty());
}

#[test]
fn test_box_select_from_canvas() {
    let mut editor = GraphEditor::default();
    let inside = editor
        .graph_mut()
        .add_node("Inside", "t", Pos2::new(100.0, 100.0), None)
        .unwrap();
    let outside = editor
        .graph_mut()
        .add_node("Outside", "t", Pos2::new(400.0, 400.0), None)
        .unwrap();

    editor.frame(click_frame(vec![
        InputEvent::PointerPressed {
            pos: Pos2::new(10.0, 10.0),
            button: PointerButton::Primary,
        },
        InputEvent::PointerMoved(Pos2::new(200.0, 200.0)),
        InputEvent::PointerReleased {
            pos: Pos2::new(200.0, 200.0),
            button: PointerButton::Primary,
        },
    ]));

    assert!(editor.graph().node(inside).unwrap().selected);
    assert!(!editor.graph().node(outside).unwrap().selected);
}

#[test]
fn test_enter_exit_restores_view() {
    let mut editor = GraphEditor::default();
    let s = editor.graph_mut().add_subgraph(None, "S", None).unwrap();
    editor.viewport_mut().pan_by(Vec2::new(123.0, -45.0));
    editor.viewport_mut().zoom_at(Pos2::new(300.0, 200.0), 3.0);
    let before = editor.viewport().state();

    editor.enter_subgraph(s).unwrap();
    editor.viewport_mut().pan_by(Vec2::new(-500.0, 500.0));
    editor.exit_subgraph();
    assert!(editor.viewport().state().approx_eq(&before, 1e-4));
}

#[test]
fn test_wheel_at_bound_does_not_drift() {
    let mut editor = GraphEditor::default();
    let pointer = Pos2::new(321.0, 123.0);
    for _ in 0..200 {
        editor.handle_event(InputEvent::Wheel { pos: pointer, delta: 1.0 });
    }
    let at_max = editor.viewport().state();
    assert_eq!(at_max.scale, editor.config().max_zoom);

    editor.handle_event(InputEvent::Wheel { pos: pointer, delta: 1.0 });
    assert_eq!(editor.viewport().state(), at_max);
}

#[test]
fn test_delete_with_empty_selection_is_noop() {
    let mut t = two_nodes();
    t.editor.frame(click_frame(vec![InputEvent::Key(egui::Key::Delete)]));
    assert_eq!(t.editor.graph().node_count(), 2);
    assert_eq!(t.editor.graph().connection_count(), 1);
    assert!(t.editor.drain_events().is_empty());
}

#[test]
fn test_delete_selected_connection_by_click() {
    let mut t = two_nodes();
    let conn = t.editor.graph().connections().next().unwrap().handle;
    let style = t.editor.config().line_style;
    let path = t
        .editor
        .layout()
        .connection_path(t.editor.graph(), conn, style)
        .unwrap();
    let points = path.polyline();
    let on_wire = points[points.len() / 2];

    t.editor.frame(click_frame(vec![
        InputEvent::PointerPressed {
            pos: on_wire,
            button: PointerButton::Primary,
        },
        InputEvent::PointerReleased {
            pos: on_wire,
            button: PointerButton::Primary,
        },
        InputEvent::Key(egui::Key::Delete),
    ]));
    assert_eq!(t.editor.graph().connection_count(), 0);
    assert!(!t.editor.graph().is_connected(t.a, t.a_out));
}
