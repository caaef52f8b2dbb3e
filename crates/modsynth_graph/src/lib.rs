// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow node graph for procedural texture synthesis.
//!
//! A [`NodeGraph`] owns a set of nodes connected output-to-input into a
//! directed acyclic graph. Solving the graph evaluates every dirty node in
//! topological order. Shader nodes turn their parameters into generated
//! WGSL, compile it through a shared [`ProgramCache`] and render into
//! their own texture.
//!
//! ## Architecture
//!
//! - [`value`]: typed values flowing along edges
//! - [`param`]: named node parameters
//! - [`node`]: the node contract and the kind registry
//! - [`graph`]: connection rules, dirty tracking and solving
//! - [`shader`]: shader nodes, libraries, code generation and caching
//! - [`backend`]: GPU primitives, with `wgpu` and validating backends
//!
//! ```no_run
//! use modsynth_graph::{NodeGraph, NodeRegistry, RenderContext};
//!
//! let registry = NodeRegistry::with_builtin();
//! let mut graph = NodeGraph::new(RenderContext::validating().into_shared());
//! let noise = graph.create_from(&registry, "NOI").unwrap();
//! let output = graph.create_from(&registry, "OUT").unwrap();
//! graph.connect(noise, 0, output, 0).unwrap();
//! let report = graph.solve();
//! assert!(report.is_success());
//! ```

pub mod backend;
pub mod connection;
pub mod constant;
pub mod context;
pub mod evaluation;
pub mod graph;
pub mod node;
pub mod param;
pub mod settings;
pub mod shader;
pub mod value;

pub use backend::{
    BackendError, CompileError, GpuBackend, TexturePixels, ValidatingBackend, WgpuBackend, TEXTURE_FORMATS,
};
pub use connection::{Connection, ConnectionError, SocketRef};
pub use constant::ConstantNode;
pub use context::{RenderContext, SharedRenderContext};
pub use evaluation::{NodeError, NodeStatus, SolveContext, SolveReport};
pub use graph::{GraphError, NodeGraph};
pub use node::{Node, NodeCategory, NodeId, NodeRegistry, NodeType, SocketSpec};
pub use param::{Param, ParamDecl, ParamError, Params};
pub use settings::{AdapterPreference, RenderSettings, PREVIEW_SIZE};
pub use shader::{LibraryId, ProgramCache, ProgramSignature, ShaderLibraries, ShaderNode, ShaderNodeType};
pub use value::{TextureHandle, Value, ValueKind};
