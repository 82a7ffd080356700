// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame-driven editor façade.
//!
//! [`GraphEditor`] owns the store, the viewport, the navigation stack and the
//! interaction state machine, and sequences them the way a host frame does:
//! `begin_frame`, events and mutations, `end_frame`. Renderers read the
//! visible slice and its geometry between frames.

use crate::authoring::WireDrag;
use crate::command::CommandBus;
use crate::config::EditorConfig;
use crate::connection::Connection;
use crate::document::{DocumentError, GraphDocument};
use crate::error::{GraphError, GraphResult};
use crate::evaluation::{self, ConnectionRecord, EvaluationOrder};
use crate::graph::Graph;
use crate::group::Group;
use crate::hit_test::{HitTarget, HitTester};
use crate::id::{EntityRef, NodeHandle, SubgraphHandle};
use crate::interaction::{FrameInput, InputEvent, Interaction, InteractionContext, InteractionEvent};
use crate::layout::{ConnectionPath, Layout};
use crate::node::{Node, NodeTemplates};
use crate::style::GraphStyle;
use crate::subgraph::{Subgraph, SubgraphNavigator};
use crate::viewport::Viewport;
use egui::{Pos2, Vec2};
use serde_json::Value;

/// Something the host should react to
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// Produced by the interaction state machine
    Interaction(InteractionEvent),
    /// Navigation entered a subgraph
    SubgraphEntered(SubgraphHandle),
    /// Navigation left a subgraph
    SubgraphExited(SubgraphHandle),
    /// A command ran successfully
    CommandExecuted {
        /// Command name
        command: String,
    },
    /// A command failed
    Error {
        /// Command name
        command: String,
        /// What went wrong
        error: GraphError,
    },
}

/// Wire preview for the renderer, in screen space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WirePreview {
    /// Output end
    pub from: Pos2,
    /// Input end (the pointer or the snapped pin)
    pub to: Pos2,
    /// `Some(valid)` when snapped to a candidate pin
    pub legal: Option<bool>,
}

/// Node graph editor
pub struct GraphEditor {
    graph: Graph,
    viewport: Viewport,
    navigator: SubgraphNavigator,
    interaction: Interaction,
    config: EditorConfig,
    style: GraphStyle,
    templates: NodeTemplates,
    commands: CommandBus,
    events: Vec<EditorEvent>,
    frame: u64,
}

impl Default for GraphEditor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl GraphEditor {
    /// Create an editor over an empty graph
    pub fn new(config: EditorConfig) -> Self {
        Self::with_graph(Graph::new("Untitled"), config)
    }

    /// Create an editor over an existing graph
    pub fn with_graph(graph: Graph, config: EditorConfig) -> Self {
        Self {
            graph,
            viewport: Viewport::new(&config),
            navigator: SubgraphNavigator::new(),
            interaction: Interaction::new(),
            config,
            style: GraphStyle::default(),
            templates: NodeTemplates::new(),
            commands: CommandBus::new(),
            events: Vec::new(),
            frame: 0,
        }
    }

    /// The graph store
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable graph store
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// The viewport
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Mutable viewport
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// Configuration
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Replace the configuration, keeping the current view
    pub fn set_config(&mut self, config: EditorConfig) {
        let state = self.viewport.state();
        let window = self.viewport.window_size();
        self.viewport = Viewport::new(&config);
        self.viewport.set_window_size(window);
        self.viewport.set_state(state);
        self.config = config;
    }

    /// Visual style
    pub fn style(&self) -> &GraphStyle {
        &self.style
    }

    /// Mutable visual style
    pub fn style_mut(&mut self) -> &mut GraphStyle {
        &mut self.style
    }

    /// Node templates used by `node.add`
    pub fn templates(&self) -> &NodeTemplates {
        &self.templates
    }

    /// Mutable node templates
    pub fn templates_mut(&mut self) -> &mut NodeTemplates {
        &mut self.templates
    }

    /// Command bus
    pub fn commands_mut(&mut self) -> &mut CommandBus {
        &mut self.commands
    }

    /// Interaction state machine
    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    /// Navigation stack
    pub fn navigator(&self) -> &SubgraphNavigator {
        &self.navigator
    }

    /// Active subgraph, `None` at the root
    pub fn active_subgraph(&self) -> Option<SubgraphHandle> {
        self.navigator.active()
    }

    /// Layout metrics for the current configuration
    pub fn layout(&self) -> Layout {
        self.config.layout()
    }

    /// Frames completed so far
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Start a frame: resize and advance any viewport tween
    pub fn begin_frame(&mut self, window_size: Vec2, dt: f32) {
        if window_size.x > 0.0 && window_size.y > 0.0 {
            self.viewport.set_window_size(window_size);
        }
        self.viewport.tick(dt);
    }

    /// Feed one input event to the state machine
    pub fn handle_event(&mut self, event: InputEvent) {
        let mut ctx = InteractionContext {
            graph: &mut self.graph,
            viewport: &mut self.viewport,
            config: &self.config,
            scope: self.navigator.active(),
        };
        self.interaction.handle(&mut ctx, event);
    }

    /// Finish a frame: refresh hover and collect interaction events
    pub fn end_frame(&mut self) {
        let ctx = InteractionContext {
            graph: &mut self.graph,
            viewport: &mut self.viewport,
            config: &self.config,
            scope: self.navigator.active(),
        };
        self.interaction.update_hover(&ctx);
        self.events
            .extend(self.interaction.drain_events().into_iter().map(EditorEvent::Interaction));
        self.frame += 1;
    }

    /// Run a whole frame of host input
    pub fn frame(&mut self, input: FrameInput) {
        self.begin_frame(input.window_size, input.dt);
        self.interaction.set_modifiers(input.modifiers);
        for event in input.events {
            self.handle_event(event);
        }
        self.end_frame();
    }

    /// Abort whatever the pointer is doing
    pub fn cancel_interaction(&mut self) {
        self.interaction.cancel(&mut self.graph);
    }

    /// Take the queued events
    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: EditorEvent) {
        self.events.push(event);
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Run a named command. Failures are also queued as
    /// [`EditorEvent::Error`].
    pub fn dispatch(&mut self, command: &str, payload: Value) -> GraphResult<Value> {
        let commands = std::mem::take(&mut self.commands);
        let result = commands.invoke(self, command, payload);
        self.commands = commands;

        match &result {
            Ok(_) => self.push_event(EditorEvent::CommandExecuted {
                command: command.to_string(),
            }),
            Err(error) => {
                tracing::warn!(command, %error, "command failed");
                self.push_event(EditorEvent::Error {
                    command: command.to_string(),
                    error: error.clone(),
                });
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Enter a subgraph
    pub fn enter_subgraph(&mut self, handle: SubgraphHandle) -> GraphResult<()> {
        self.cancel_interaction();
        self.navigator.enter(&mut self.graph, &mut self.viewport, handle)?;
        self.push_event(EditorEvent::SubgraphEntered(handle));
        Ok(())
    }

    /// Leave the active subgraph
    pub fn exit_subgraph(&mut self) -> Option<SubgraphHandle> {
        self.cancel_interaction();
        let left = self.navigator.exit(&mut self.graph, &mut self.viewport)?;
        self.push_event(EditorEvent::SubgraphExited(left));
        Some(left)
    }

    /// Remove a subgraph, leaving it first if it is on the navigation stack
    pub fn remove_subgraph(&mut self, handle: SubgraphHandle) -> GraphResult<Subgraph> {
        while self.navigator.stack().contains(&handle) {
            self.exit_subgraph();
        }
        let removed = self.graph.remove_subgraph(handle)?;
        self.navigator.forget(handle);
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    /// Frame the nodes of the active scope, or only the selected ones.
    /// An empty subset resets to identity.
    pub fn zoom_to_fit(&mut self, selected_only: bool) {
        let nodes: Vec<NodeHandle> = self
            .graph
            .nodes_in(self.navigator.active())
            .filter(|n| !selected_only || n.selected)
            .map(|n| n.handle)
            .collect();
        let target = self
            .viewport
            .fit_state(self.graph.bounds_of(nodes), self.config.fit_padding);
        self.viewport
            .animate_to(target, self.config.transition_duration, self.config.transition_easing);
    }

    /// Center the view on a node without changing scale
    pub fn center_on_node(&mut self, node: NodeHandle) -> GraphResult<()> {
        let center = self
            .graph
            .node(node)
            .ok_or(GraphError::NotFound(EntityRef::Node(node)))?
            .rect()
            .center();
        let target = self.viewport.centered_on(center);
        self.viewport
            .animate_to(target, self.config.transition_duration, self.config.transition_easing);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries for the renderer
    // ------------------------------------------------------------------

    /// Nodes of the active scope that overlap the window
    pub fn visible_nodes(&self) -> impl Iterator<Item = &Node> {
        let visible = self.viewport.visible_world_rect();
        self.graph
            .nodes_in(self.navigator.active())
            .filter(move |n| n.rect().intersects(visible))
    }

    /// Connections of the active scope with their routed paths, where the
    /// path overlaps the window
    pub fn visible_connections(&self) -> Vec<(Connection, ConnectionPath)> {
        let visible = self.viewport.visible_world_rect();
        let layout = self.layout();
        self.graph
            .connections_in(self.navigator.active())
            .filter_map(|c| {
                let path = layout.connection_path(&self.graph, c.handle, self.config.line_style)?;
                path.bounds().intersects(visible).then(|| (c.clone(), path))
            })
            .collect()
    }

    /// Groups of the active scope that overlap the window
    pub fn visible_groups(&self) -> impl Iterator<Item = &Group> {
        let visible = self.viewport.visible_world_rect();
        self.graph
            .groups_in(self.navigator.active())
            .filter(move |g| g.rect().intersects(visible))
    }

    /// Resolve what lies under a screen position in the active scope
    pub fn hit_test(&self, screen: Pos2) -> HitTarget {
        HitTester::new(&self.graph, &self.viewport, &self.config, self.navigator.active()).at(screen)
    }

    /// In-flight wire, in screen space
    pub fn wire_preview(&self) -> Option<WirePreview> {
        let drag: &WireDrag = self.interaction.wire()?;
        let layout = self.layout();
        let origin = self
            .viewport
            .world_to_screen(layout.endpoint_position(&self.graph, drag.origin)?);
        let snapped = drag
            .snap
            .and_then(|end| layout.endpoint_position(&self.graph, end))
            .map(|p| self.viewport.world_to_screen(p));
        let free = snapped.unwrap_or(drag.pointer);
        let (from, to) = if drag.origin_direction.is_input() {
            (free, origin)
        } else {
            (origin, free)
        };
        Some(WirePreview {
            from,
            to,
            legal: drag.legality.as_ref().map(Result::is_ok),
        })
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Topological order over the active scope
    pub fn evaluation_order(&self) -> EvaluationOrder {
        evaluation::evaluation_order(&self.graph, self.navigator.active())
    }

    /// Connections feeding a node
    pub fn input_connections(&self, node: NodeHandle) -> Vec<ConnectionRecord> {
        evaluation::input_connections(&self.graph, node)
    }

    /// Connections leaving a node
    pub fn output_connections(&self, node: NodeHandle) -> Vec<ConnectionRecord> {
        evaluation::output_connections(&self.graph, node)
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Snapshot the graph
    pub fn to_document(&self) -> GraphDocument {
        self.graph.to_document()
    }

    /// Replace the graph with a loaded document, returning to the root at
    /// identity. On failure the current graph is kept.
    pub fn load_document(&mut self, document: &GraphDocument) -> Result<(), DocumentError> {
        let graph = Graph::from_document(document)?;
        self.interaction = Interaction::new();
        self.navigator.reset();
        self.viewport.reset();
        self.graph = graph;
        tracing::info!(name = %self.graph.name, nodes = self.graph.node_count(), "document loaded");
        Ok(())
    }
}
