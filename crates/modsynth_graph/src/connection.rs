// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use crate::node::NodeId;
use crate::value::ValueKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An output socket of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketRef {
    /// Node owning the output
    pub node: NodeId,
    /// Output index
    pub output: usize,
}

/// A connection from an output socket to an input socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    /// Source node
    pub source: NodeId,
    /// Source output index
    pub output: usize,
    /// Target node
    pub target: NodeId,
    /// Target input index
    pub input: usize,
}

impl Connection {
    /// Create a new connection
    pub fn new(source: NodeId, output: usize, target: NodeId, input: usize) -> Self {
        Self {
            source,
            output,
            target,
            input,
        }
    }

    /// The source socket
    pub fn source_socket(&self) -> SocketRef {
        SocketRef {
            node: self.source,
            output: self.output,
        }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.source, self.output, self.target, self.input)
    }
}

/// Error when creating a connection. The graph is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    /// Output index out of range
    #[error("Node {node} has no output {index}")]
    OutputOutOfRange {
        /// Source node
        node: NodeId,
        /// Rejected index
        index: usize,
    },

    /// Input index out of range
    #[error("Node {node} has no input {index}")]
    InputOutOfRange {
        /// Target node
        node: NodeId,
        /// Rejected index
        index: usize,
    },

    /// Socket kinds differ
    #[error("Cannot connect {output} output to {input} input")]
    TypeMismatch {
        /// Kind of the source output
        output: ValueKind,
        /// Kind of the target input
        input: ValueKind,
    },

    /// The target input already has a connection
    #[error("Input {index} of node {node} is already connected")]
    InputOccupied {
        /// Target node
        node: NodeId,
        /// Occupied input
        index: usize,
    },

    /// The connection would close a cycle
    #[error("Connection would create a cycle")]
    WouldCycle,
}
