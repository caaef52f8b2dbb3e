// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation state and results.

use crate::backend::{BackendError, CompileError};
use crate::context::RenderContext;
use crate::node::NodeId;
use crate::shader::LibraryId;

/// Context handed to [`Node::solve`](crate::node::Node::solve)
pub struct SolveContext<'a> {
    render: &'a mut RenderContext,
    compiles: usize,
    reuses: usize,
    renders: usize,
}

impl<'a> SolveContext<'a> {
    /// Create a solve context over a locked render context
    pub fn new(render: &'a mut RenderContext) -> Self {
        Self {
            render,
            compiles: 0,
            reuses: 0,
            renders: 0,
        }
    }

    /// GPU context for compilation and rendering
    pub fn render(&mut self) -> &mut RenderContext {
        self.render
    }

    /// Count a program compilation
    pub fn record_compile(&mut self) {
        self.compiles += 1;
    }

    /// Count a program taken from the cache
    pub fn record_reuse(&mut self) {
        self.reuses += 1;
    }

    /// Count a render pass
    pub fn record_render(&mut self) {
        self.renders += 1;
    }
}

/// Evaluation state of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    /// Output is up to date
    Clean,
    /// Output is stale and will be recomputed on the next solve
    Dirty,
    /// Last evaluation failed; the previous output is kept
    Failed {
        /// Human-readable failure description
        diagnostic: String,
    },
}

impl NodeStatus {
    /// Check if the node is in the failed state
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Summary of one [`NodeGraph::solve`](crate::graph::NodeGraph::solve)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// Every node in topological visitation order
    pub visited: Vec<NodeId>,
    /// Nodes that were dirty and evaluated successfully
    pub evaluated: Vec<NodeId>,
    /// Nodes whose evaluation failed, with diagnostics
    pub failed: Vec<(NodeId, String)>,
    /// Programs compiled (cache misses)
    pub compiles: usize,
    /// Programs taken from the cache
    pub cache_reuses: usize,
    /// Render passes executed
    pub renders: usize,
}

impl SolveReport {
    /// Check if every dirty node evaluated successfully
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Check if the solve did no GPU work at all
    pub fn is_noop(&self) -> bool {
        self.evaluated.is_empty() && self.failed.is_empty() && self.compiles == 0 && self.renders == 0
    }

    pub(crate) fn absorb(&mut self, ctx: &SolveContext<'_>) {
        self.compiles += ctx.compiles;
        self.cache_reuses += ctx.reuses;
        self.renders += ctx.renders;
    }
}

/// Error returned by a node evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    /// Program compilation failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The node's library is not registered
    #[error("Shader library not registered: {0}")]
    MissingLibrary(LibraryId),
}

impl NodeError {
    /// Diagnostic text recorded on the failed node
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Compile(err) => err.diagnostic.clone(),
            other => other.to_string(),
        }
    }
}
