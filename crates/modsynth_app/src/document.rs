// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph documents: a RON description of nodes and connections.
//!
//! ```ron
//! (
//!     nodes: [
//!         (key: "noise", code: "NOI", params: { "Scale": Scalar(4.0) }),
//!         (key: "out", code: "OUT"),
//!     ],
//!     connections: [
//!         (from: "noise", output: 0, to: "out", input: 0),
//!     ],
//! )
//! ```

use crate::error::{AppError, Result};
use crate::export;
use indexmap::IndexMap;
use modsynth_graph::{NodeGraph, NodeId, NodeRegistry, SharedRenderContext, TextureHandle, Value};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameter receiving the texture uploaded from a node's `image` path
pub const IMAGE_PARAM: &str = "Image";

/// One node of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Unique key used by connections and output file names
    pub key: String,
    /// Registry code
    pub code: String,
    /// Parameter values set after creation
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    /// Image uploaded into the node's `Image` parameter, relative to the document
    #[serde(default)]
    pub image: Option<PathBuf>,
}

/// One connection of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    /// Source node key
    pub from: String,
    /// Source output index
    #[serde(default)]
    pub output: usize,
    /// Target node key
    pub to: String,
    /// Target input index
    pub input: usize,
}

/// A serialized graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Nodes in creation order
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    /// Connections, applied after every node exists
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
}

/// Mapping from document keys to the nodes built for them
#[derive(Debug, Default)]
pub struct BuiltGraph {
    nodes: IndexMap<String, NodeId>,
    uploads: Vec<TextureHandle>,
}

impl BuiltGraph {
    /// Node built for `key`
    pub fn id(&self, key: &str) -> Option<NodeId> {
        self.nodes.get(key).copied()
    }

    /// Key of a node
    pub fn key(&self, id: NodeId) -> Option<&str> {
        self.nodes.iter().find(|(_, n)| **n == id).map(|(key, _)| key.as_str())
    }

    /// Keys and nodes in document order
    pub fn nodes(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.nodes.iter().map(|(key, id)| (key.as_str(), *id))
    }

    /// Destroy the textures uploaded for image nodes
    pub fn release_uploads(&mut self, render: &SharedRenderContext) {
        let mut render = render.lock();
        for texture in self.uploads.drain(..) {
            render.destroy_texture(texture);
        }
    }
}

impl GraphDocument {
    /// Parse a document from RON text
    pub fn from_ron(text: &str) -> std::result::Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Load a document from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        let document = Self::from_ron(&text).map_err(|e| AppError::ron(path, e))?;
        tracing::info!(
            "Loaded {:?}: {} nodes, {} connections",
            path,
            document.nodes.len(),
            document.connections.len()
        );
        Ok(document)
    }

    /// Create the document's nodes and connections in `graph`.
    ///
    /// Image paths are resolved against `base_dir`.
    pub fn build(&self, graph: &mut NodeGraph, registry: &NodeRegistry, base_dir: &Path) -> Result<BuiltGraph> {
        let mut built = BuiltGraph::default();
        if let Err(e) = self.build_into(graph, registry, base_dir, &mut built) {
            built.release_uploads(graph.render_context());
            return Err(e);
        }
        Ok(built)
    }

    fn build_into(
        &self,
        graph: &mut NodeGraph,
        registry: &NodeRegistry,
        base_dir: &Path,
        built: &mut BuiltGraph,
    ) -> Result<()> {
        for entry in &self.nodes {
            if built.nodes.contains_key(&entry.key) {
                return Err(AppError::DuplicateKey(entry.key.clone()));
            }
            let node_error = |source| AppError::Node {
                key: entry.key.clone(),
                source,
            };

            let id = graph.create_from(registry, &entry.code).map_err(node_error)?;
            built.nodes.insert(entry.key.clone(), id);

            for (name, value) in &entry.params {
                graph.set_param(id, name, *value).map_err(node_error)?;
            }

            if let Some(image) = &entry.image {
                let path = base_dir.join(image);
                let (width, height, texels) = export::load_image(&path)?;
                let texture = graph.render_context().lock().upload_texture(width, height, &texels)?;
                built.uploads.push(texture);
                graph
                    .set_param(id, IMAGE_PARAM, Value::Texture2D(texture))
                    .map_err(node_error)?;
                tracing::debug!("Uploaded {:?} ({width}x{height}) for `{}`", path, entry.key);
            }
        }

        for connection in &self.connections {
            let source = built
                .id(&connection.from)
                .ok_or_else(|| AppError::UnknownKey(connection.from.clone()))?;
            let target = built
                .id(&connection.to)
                .ok_or_else(|| AppError::UnknownKey(connection.to.clone()))?;
            graph
                .connect(source, connection.output, target, connection.input)
                .map_err(|source| AppError::Connect {
                    from: format!("{}:{}", connection.from, connection.output),
                    to: format!("{}:{}", connection.to, connection.input),
                    source,
                })?;
        }
        Ok(())
    }
}
