// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types shared across the graph core.

use crate::id::{EntityRef, NodeHandle, PinHandle, SubgraphHandle};
use uuid::Uuid;

/// Errors reported by store, subgraph and command operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// An operation referenced an unknown handle or uuid
    #[error("Entity not found: {0}")]
    NotFound(EntityRef),

    /// A uuid did not resolve to any entity
    #[error("Unknown uuid: {0}")]
    UnknownUuid(Uuid),

    /// A connection attempt broke a legality rule
    #[error("Illegal connection: {0}")]
    IllegalConnection(#[from] ConnectionRejection),

    /// Attempt to remove a protected node
    #[error("Node is protected: {0}")]
    Protected(NodeHandle),

    /// Uuid collision on import or explicit-uuid creation
    #[error("Duplicate uuid: {0}")]
    DuplicateUuid(Uuid),

    /// Every handle of one entity kind has been allocated
    #[error("No {0} handles left")]
    HandlesExhausted(&'static str),

    /// Subgraph instance would contain itself
    #[error("Recursive subgraph instance of {0}")]
    RecursiveInstance(SubgraphHandle),

    /// A command payload failed to deserialize
    #[error("Invalid payload for '{command}': {reason}")]
    InvalidPayload {
        /// Command name
        command: String,
        /// Deserializer message
        reason: String,
    },

    /// No handler is bound to this command name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Why a proposed connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionRejection {
    /// Node does not exist
    #[error("node {0} does not exist")]
    MissingNode(NodeHandle),

    /// Pin does not exist on the claimed node
    #[error("pin {1} does not exist on {0}")]
    MissingPin(NodeHandle, PinHandle),

    /// Both pins share one direction
    #[error("pins have the same direction")]
    SameDirection,

    /// Both pins belong to one node
    #[error("self-loop")]
    SelfLoop,

    /// The exact connection already exists
    #[error("connection already exists")]
    Duplicate,

    /// Pin types do not match and neither is the wildcard
    #[error("incompatible pin types")]
    IncompatibleTypes,

    /// Endpoints live in different subgraph scopes
    #[error("endpoints are in different subgraphs")]
    ScopeMismatch,

    /// The host predicate refused the connection
    #[error("refused by host predicate")]
    RefusedByHost,
}

/// Result type for graph operations
pub type GraphResult<T> = std::result::Result<T, GraphError>;
