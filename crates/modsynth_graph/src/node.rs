// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node contract, node kinds and the kind registry.

use crate::constant::ConstantNode;
use crate::context::RenderContext;
use crate::evaluation::{NodeError, SolveContext};
use crate::param::{ParamDecl, ParamError, Params};
use crate::shader::kinds;
use crate::value::{Value, ValueKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a node within one graph.
///
/// Ids are handed out by the owning graph in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name and kind of an input or output socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketSpec {
    /// Display name
    pub name: String,
    /// Value kind carried by the socket
    pub kind: ValueKind,
}

impl SocketSpec {
    /// Create a socket description
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// An evaluatable unit of the graph.
///
/// The graph owns every node and only talks to it through this trait.
/// `solve` receives one entry per input socket: `Some` with the upstream
/// output value when the socket is connected and the source has produced
/// a value, `None` otherwise.
pub trait Node: Send {
    /// Registry code of this node kind
    fn kind_code(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;

    /// Declared parameters
    fn params(&self) -> &Params;

    /// Mutable access to parameter values
    fn params_mut(&mut self) -> &mut Params;

    /// Input sockets, in order
    fn inputs(&self) -> Vec<SocketSpec> {
        self.params().socket_specs()
    }

    /// Output sockets, in order
    fn outputs(&self) -> Vec<SocketSpec>;

    /// Add a parameter declaration
    fn declare_param(&mut self, decl: ParamDecl) -> Result<(), ParamError> {
        let _ = decl;
        Err(ParamError::FixedDeclarations(self.kind_code().to_string()))
    }

    /// Remove a parameter declaration
    fn remove_param(&mut self, name: &str) -> Result<(), ParamError> {
        let _ = name;
        Err(ParamError::FixedDeclarations(self.kind_code().to_string()))
    }

    /// Evaluate the node, returning one value per output socket
    fn solve(&mut self, inputs: &[Option<Value>], ctx: &mut SolveContext<'_>) -> Result<Vec<Value>, NodeError>;

    /// Free any GPU resources held by the node
    fn release(&mut self, render: &mut RenderContext) {
        let _ = render;
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Produces an image from parameters alone
    Generator,
    /// Transforms one or more input images
    Operator,
    /// Brings in external data such as images
    External,
    /// Samples its input at several locations
    Multisample,
    /// Terminal output node
    Result,
    /// Constant scalar or vector
    Value,
}

/// Factory producing a fresh node of one kind
pub type NodeBuilder = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Node type definition
#[derive(Clone)]
pub struct NodeType {
    /// Unique registry code, e.g. `NOI`
    pub code: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Factory for new instances
    pub builder: NodeBuilder,
}

impl NodeType {
    /// Create a new node type
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: NodeCategory,
        description: impl Into<String>,
        builder: impl Fn() -> Box<dyn Node> + Send + Sync + 'static,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            category,
            description: description.into(),
            builder: Arc::new(builder),
        }
    }

    /// Build a new instance of this type
    pub fn build(&self) -> Box<dyn Node> {
        (self.builder)()
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Registry of available node types, keyed by code
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    types: IndexMap<String, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the constant and built-in shader kinds
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for kind in [ValueKind::Scalar, ValueKind::Vec2, ValueKind::Vec3, ValueKind::Vec4] {
            let code = ConstantNode::code_for(kind);
            registry.register(NodeType::new(
                code,
                ConstantNode::name_for(kind),
                NodeCategory::Value,
                format!("Constant {kind} value"),
                move || Box::new(ConstantNode::new(kind)),
            ));
        }
        for shader in kinds::builtin() {
            registry.register(shader.into_node_type());
        }
        registry
    }

    /// Register a node type, replacing any previous type with the same code
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.code.clone(), node_type);
    }

    /// Get a node type by code
    pub fn get(&self, code: &str) -> Option<&NodeType> {
        self.types.get(code)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Create a node from a type code
    pub fn create_node(&self, code: &str) -> Option<Box<dyn Node>> {
        self.get(code).map(NodeType::build)
    }
}
