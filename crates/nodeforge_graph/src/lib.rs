// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph editing core.
//!
//! This crate provides the model and behaviour behind an interactive node
//! graph editor, independent of any renderer:
//! - A graph store of nodes, typed pins, connections, groups and reroutes
//! - Nested subgraphs with mirrored interface pins and a navigation stack
//! - Connection authoring with magnetic snap and a host-extensible legality check
//! - A pointer/keyboard state machine with hit testing
//! - Topological evaluation order over the active scope
//!
//! ## Architecture
//!
//! Every entity has a compact [`id`] handle and a uuid. The [`Graph`] owns
//! all entities; everything else refers to them by handle. [`GraphEditor`]
//! drives the store once per host frame and exposes the geometry a renderer
//! needs. Documents round-trip through RON or JSON.

pub mod authoring;
pub mod command;
pub mod config;
pub mod connection;
pub mod document;
pub mod editor;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod group;
pub mod hit_test;
pub mod id;
pub mod interaction;
pub mod layout;
pub mod node;
pub mod pin;
pub mod style;
pub mod subgraph;
pub mod viewport;

pub use authoring::{check_connection, WireDrag, WireOutcome};
pub use command::{CommandBus, Key};
pub use config::{ConfigError, EditorConfig};
pub use connection::{Connection, Endpoint, Reroute};
pub use document::{DocumentError, GraphDocument};
pub use editor::{EditorEvent, GraphEditor};
pub use error::{ConnectionRejection, GraphError, GraphResult};
pub use evaluation::{evaluation_order, EvaluationOrder};
pub use graph::{Graph, GraphCallbacks, InvariantViolation};
pub use group::Group;
pub use hit_test::{HitTarget, HitTester};
pub use id::{
    ConnectionHandle, EntityRef, GroupHandle, IdentityRegistry, NodeHandle, PinHandle, RerouteHandle, SubgraphHandle,
};
pub use interaction::{FrameInput, InputEvent, Interaction, InteractionEvent, InteractionMode};
pub use layout::{Layout, LineStyle};
pub use node::{Node, NodeTemplate, NodeTemplates};
pub use pin::{Pin, PinDirection, PinShape, PinSpec, PinType};
pub use style::GraphStyle;
pub use subgraph::{Subgraph, SubgraphNavigator};
pub use viewport::{Easing, Viewport, ViewportState};
