// SPDX-License-Identifier: MIT OR Apache-2.0
//! The node graph: ownership, connection rules, dirty tracking and solving.

use crate::connection::{Connection, ConnectionError, SocketRef};
use crate::context::SharedRenderContext;
use crate::evaluation::{NodeStatus, SolveContext, SolveReport};
use crate::node::{Node, NodeId, NodeRegistry, SocketSpec};
use crate::param::{ParamDecl, ParamError, Params};
use crate::value::{TextureHandle, Value};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Per-node bookkeeping owned by the graph
struct NodeSlot {
    node: Box<dyn Node>,
    inputs: Vec<SocketSpec>,
    sources: Vec<Option<SocketRef>>,
    outputs: Vec<SocketSpec>,
    values: Vec<Option<Value>>,
    /// Outgoing connections, used for downstream traversal
    dependents: Vec<Connection>,
    dirty: bool,
    failure: Option<String>,
}

impl NodeSlot {
    fn new(node: Box<dyn Node>) -> Self {
        let inputs = node.inputs();
        let outputs = node.outputs();
        Self {
            sources: vec![None; inputs.len()],
            values: vec![None; outputs.len()],
            inputs,
            outputs,
            node,
            dependents: Vec::new(),
            dirty: true,
            failure: None,
        }
    }
}

/// Nodes a `connect` turned from clean to dirty, kept until the next mutation
struct PendingConnect {
    connection: Connection,
    newly_dirty: Vec<NodeId>,
}

/// A directed acyclic graph of nodes rendering through a shared GPU context.
///
/// The graph exclusively owns its nodes; callers refer to them by
/// [`NodeId`]. Every mutator and [`solve`](Self::solve) take `&mut self`
/// and nodes never see the graph, so the graph cannot change while it is
/// being solved.
pub struct NodeGraph {
    render: SharedRenderContext,
    nodes: IndexMap<NodeId, NodeSlot>,
    next_id: u64,
    has_changes: bool,
    pending: Option<PendingConnect>,
}

impl NodeGraph {
    /// Create an empty graph rendering through `render`
    pub fn new(render: SharedRenderContext) -> Self {
        Self {
            render,
            nodes: IndexMap::new(),
            next_id: 1,
            has_changes: false,
            pending: None,
        }
    }

    /// The render context this graph uses
    pub fn render_context(&self) -> &SharedRenderContext {
        &self.render
    }

    /// Create a default node of kind `T`
    pub fn create<T: Node + Default + 'static>(&mut self) -> NodeId {
        self.add_boxed(Box::new(T::default()))
    }

    /// Add an already built node
    pub fn add_node(&mut self, node: impl Node + 'static) -> NodeId {
        self.add_boxed(Box::new(node))
    }

    /// Create a node by registry code
    pub fn create_from(&mut self, registry: &NodeRegistry, code: &str) -> Result<NodeId, GraphError> {
        let node = registry
            .create_node(code)
            .ok_or_else(|| GraphError::UnknownNodeKind(code.to_string()))?;
        Ok(self.add_boxed(node))
    }

    /// Add a boxed node. New nodes start dirty.
    pub fn add_boxed(&mut self, node: Box<dyn Node>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        tracing::debug!("Created node {id} ({})", node.kind_code());
        self.nodes.insert(id, NodeSlot::new(node));
        self.pending = None;
        id
    }

    /// Remove a node and every connection touching it.
    ///
    /// Nodes that lost an input are marked dirty. Returns `false` if the
    /// node does not exist.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(mut slot) = self.nodes.shift_remove(&id) else {
            return false;
        };
        self.pending = None;

        for source in slot.sources.iter().flatten() {
            if let Some(upstream) = self.nodes.get_mut(&source.node) {
                upstream.dependents.retain(|c| c.target != id);
            }
        }
        for connection in &slot.dependents {
            if let Some(downstream) = self.nodes.get_mut(&connection.target) {
                if let Some(source) = downstream.sources.get_mut(connection.input) {
                    *source = None;
                }
            }
        }
        for connection in &slot.dependents {
            self.mark_dirty_from(connection.target);
        }

        slot.node.release(&mut self.render.lock());
        tracing::debug!("Removed node {id}");
        true
    }

    /// Connect an output socket to an input socket.
    ///
    /// On success the target and everything downstream of it become dirty.
    /// On failure nothing changes.
    pub fn connect(
        &mut self,
        source: NodeId,
        output: usize,
        target: NodeId,
        input: usize,
    ) -> Result<(), ConnectionError> {
        if let Err(err) = self.validate_connection(source, output, target, input) {
            tracing::warn!("Rejected connection {source}:{output} -> {target}:{input}: {err}");
            return Err(err);
        }

        let connection = Connection::new(source, output, target, input);
        if let Some(slot) = self.nodes.get_mut(&target) {
            slot.sources[input] = Some(connection.source_socket());
        }
        if let Some(slot) = self.nodes.get_mut(&source) {
            slot.dependents.push(connection);
        }
        let newly_dirty = self.mark_dirty_from(target);
        self.pending = Some(PendingConnect {
            connection,
            newly_dirty,
        });
        tracing::debug!("Connected {connection}");
        Ok(())
    }

    fn validate_connection(
        &self,
        source: NodeId,
        output: usize,
        target: NodeId,
        input: usize,
    ) -> Result<(), ConnectionError> {
        let source_slot = self.nodes.get(&source).ok_or(ConnectionError::UnknownNode(source))?;
        let target_slot = self.nodes.get(&target).ok_or(ConnectionError::UnknownNode(target))?;

        let output_spec = source_slot
            .outputs
            .get(output)
            .ok_or(ConnectionError::OutputOutOfRange { node: source, index: output })?;
        let input_spec = target_slot
            .inputs
            .get(input)
            .ok_or(ConnectionError::InputOutOfRange { node: target, index: input })?;

        if !output_spec.kind.can_connect_to(input_spec.kind) {
            return Err(ConnectionError::TypeMismatch {
                output: output_spec.kind,
                input: input_spec.kind,
            });
        }
        if target_slot.sources[input].is_some() {
            return Err(ConnectionError::InputOccupied { node: target, index: input });
        }
        if self.reaches(target, source) {
            return Err(ConnectionError::WouldCycle);
        }
        Ok(())
    }

    /// Remove a connection. Returns `false` if it does not exist.
    ///
    /// Undoing the connection made by the immediately preceding `connect`
    /// restores the dirty flags that `connect` raised.
    pub fn remove_connection(&mut self, source: NodeId, output: usize, target: NodeId, input: usize) -> bool {
        let connection = Connection::new(source, output, target, input);
        let Some(slot) = self.nodes.get_mut(&target) else {
            return false;
        };
        match slot.sources.get_mut(input) {
            Some(existing) if *existing == Some(connection.source_socket()) => *existing = None,
            _ => return false,
        }
        if let Some(slot) = self.nodes.get_mut(&source) {
            slot.dependents.retain(|c| *c != connection);
        }
        self.mark_dirty_from(target);

        if let Some(pending) = self.pending.take() {
            if pending.connection == connection {
                for id in pending.newly_dirty {
                    if let Some(slot) = self.nodes.get_mut(&id) {
                        slot.dirty = false;
                    }
                }
            }
        }
        tracing::debug!("Disconnected {connection}");
        true
    }

    /// Evaluate every dirty node in topological order.
    ///
    /// A node that fails keeps its previous output, is reported in the
    /// returned [`SolveReport`] and does not stop the rest of the graph.
    pub fn solve(&mut self) -> SolveReport {
        self.pending = None;
        let order = self.topological_order();
        let mut report = SolveReport::default();

        let mut render = self.render.lock();
        let mut ctx = SolveContext::new(&mut render);

        for id in order {
            report.visited.push(id);
            let Some(slot) = self.nodes.get(&id) else {
                continue;
            };
            if !slot.dirty {
                continue;
            }

            let inputs: Vec<Option<Value>> = slot
                .sources
                .iter()
                .map(|source| {
                    source.and_then(|s| self.nodes.get(&s.node)?.values.get(s.output).copied().flatten())
                })
                .collect();

            let Some(slot) = self.nodes.get_mut(&id) else {
                continue;
            };
            tracing::debug!("Evaluating node {id} ({})", slot.node.kind_code());
            match slot.node.solve(&inputs, &mut ctx) {
                Ok(values) => {
                    for (slot_value, value) in slot.values.iter_mut().zip(values) {
                        *slot_value = Some(value);
                    }
                    slot.failure = None;
                    slot.node.params_mut().take_changed();
                    report.evaluated.push(id);
                }
                Err(err) => {
                    let diagnostic = err.diagnostic();
                    tracing::warn!(
                        "Node {id} ({}) failed: {}",
                        slot.node.kind_code(),
                        diagnostic.lines().next().unwrap_or_default()
                    );
                    slot.failure = Some(diagnostic.clone());
                    report.failed.push((id, diagnostic));
                }
            }
            slot.dirty = false;
        }

        report.absorb(&ctx);
        report
    }

    /// Topological order of all nodes, ties broken by ascending id
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .map(|(id, slot)| (*id, slot.sources.iter().flatten().count()))
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| Reverse(*id))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            let Some(slot) = self.nodes.get(&id) else {
                continue;
            };
            for connection in &slot.dependents {
                if let Some(degree) = in_degree.get_mut(&connection.target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(connection.target));
                    }
                }
            }
        }
        order
    }

    /// Whether `to` is reachable from `from` along connections (or equal to it)
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(slot) = self.nodes.get(&id) {
                stack.extend(slot.dependents.iter().map(|c| c.target));
            }
        }
        false
    }

    /// Mark `start` and everything downstream dirty, returning the nodes
    /// that were clean before
    fn mark_dirty_from(&mut self, start: NodeId) -> Vec<NodeId> {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        let mut flipped = Vec::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(slot) = self.nodes.get_mut(&id) {
                if !slot.dirty {
                    slot.dirty = true;
                    flipped.push(id);
                }
                stack.extend(slot.dependents.iter().map(|c| c.target));
            }
        }
        flipped
    }

    /// Mark every node dirty so the next solve re-evaluates the whole graph
    pub fn mark_all_dirty(&mut self) {
        self.pending = None;
        for slot in self.nodes.values_mut() {
            slot.dirty = true;
        }
    }

    /// Whether any node's parameters changed since [`clear_changes`](Self::clear_changes)
    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Reset the change flag
    pub fn clear_changes(&mut self) {
        self.has_changes = false;
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut NodeSlot, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn params_changed(&mut self, id: NodeId) {
        self.pending = None;
        self.has_changes = true;
        self.mark_dirty_from(id);
    }

    /// Set a parameter value. The node and its dependents become dirty.
    pub fn set_param(&mut self, id: NodeId, name: &str, value: Value) -> Result<(), GraphError> {
        self.slot_mut(id)?.node.params_mut().set(name, value)?;
        self.params_changed(id);
        Ok(())
    }

    /// Set one component of a parameter value
    pub fn set_param_component(&mut self, id: NodeId, name: &str, index: usize, component: f32) -> Result<(), GraphError> {
        self.slot_mut(id)?
            .node
            .params_mut()
            .set_component(name, index, component)?;
        self.params_changed(id);
        Ok(())
    }

    /// Add a parameter declaration to a node. Socket parameters add an input.
    pub fn declare_param(&mut self, id: NodeId, decl: ParamDecl) -> Result<(), GraphError> {
        self.slot_mut(id)?.node.declare_param(decl)?;
        self.sync_inputs(id);
        self.params_changed(id);
        Ok(())
    }

    /// Remove a parameter declaration. A connection to its socket is dropped.
    pub fn remove_param(&mut self, id: NodeId, name: &str) -> Result<(), GraphError> {
        self.slot_mut(id)?.node.remove_param(name)?;
        self.sync_inputs(id);
        self.params_changed(id);
        Ok(())
    }

    /// Re-read a node's input sockets, keeping connections by socket name
    fn sync_inputs(&mut self, id: NodeId) {
        let Some(slot) = self.nodes.get_mut(&id) else {
            return;
        };
        let inputs = slot.node.inputs();
        let mut sources = vec![None; inputs.len()];
        for (spec, source) in slot.inputs.iter().zip(&slot.sources) {
            if let (Some(source), Some(index)) = (source, inputs.iter().position(|s| s == spec)) {
                sources[index] = Some(*source);
            }
        }
        let old_sources: Vec<NodeId> = slot.sources.iter().flatten().map(|s| s.node).collect();
        slot.inputs = inputs;
        slot.sources = sources.clone();

        for upstream in old_sources {
            if let Some(upstream) = self.nodes.get_mut(&upstream) {
                upstream.dependents.retain(|c| c.target != id);
            }
        }
        for (input, source) in sources.iter().enumerate() {
            if let Some(source) = source {
                if let Some(upstream) = self.nodes.get_mut(&source.node) {
                    upstream
                        .dependents
                        .push(Connection::new(source.node, source.output, id, input));
                }
            }
        }
    }

    /// Get a node
    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(&id).map(|slot| slot.node.as_ref())
    }

    /// Check if a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node ids in creation order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All connections, ordered by target then input
    pub fn connections(&self) -> Vec<Connection> {
        let mut connections: Vec<Connection> = self
            .nodes
            .values()
            .flat_map(|slot| slot.dependents.iter().copied())
            .collect();
        connections.sort_by_key(|c| (c.target, c.input));
        connections
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.nodes.values().map(|slot| slot.dependents.len()).sum()
    }

    /// Input sockets of a node
    pub fn inputs(&self, id: NodeId) -> Option<&[SocketSpec]> {
        self.nodes.get(&id).map(|slot| slot.inputs.as_slice())
    }

    /// Output sockets of a node
    pub fn outputs(&self, id: NodeId) -> Option<&[SocketSpec]> {
        self.nodes.get(&id).map(|slot| slot.outputs.as_slice())
    }

    /// Source connected to an input socket
    pub fn input_source(&self, id: NodeId, input: usize) -> Option<SocketRef> {
        self.nodes.get(&id)?.sources.get(input).copied().flatten()
    }

    /// Value currently held by an output socket
    pub fn output_value(&self, id: NodeId, output: usize) -> Option<Value> {
        self.nodes.get(&id)?.values.get(output).copied().flatten()
    }

    /// Texture held by a node's first texture output
    pub fn texture(&self, id: NodeId) -> Option<TextureHandle> {
        self.nodes.get(&id)?.values.iter().flatten().find_map(Value::texture)
    }

    /// Evaluation state of a node. A failure is reported until the node
    /// evaluates successfully again.
    pub fn status(&self, id: NodeId) -> Option<NodeStatus> {
        let slot = self.nodes.get(&id)?;
        Some(match (&slot.failure, slot.dirty) {
            (Some(diagnostic), _) => NodeStatus::Failed {
                diagnostic: diagnostic.clone(),
            },
            (None, true) => NodeStatus::Dirty,
            (None, false) => NodeStatus::Clean,
        })
    }

    /// Check if a node is dirty
    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|slot| slot.dirty)
    }

    /// Whether a node's parameters changed since it was last evaluated
    pub fn is_changed(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|slot| slot.node.params().is_changed())
    }

    /// Registry code of a node
    pub fn kind_code(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|slot| slot.node.kind_code())
    }

    /// Parameters of a node
    pub fn params(&self, id: NodeId) -> Option<&Params> {
        self.nodes.get(&id).map(|slot| slot.node.params())
    }

    /// Current value of a parameter
    pub fn param(&self, id: NodeId, name: &str) -> Result<Value, GraphError> {
        self.slot(id)?
            .node
            .params()
            .value(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()).into())
    }

    /// Check if a node declares a parameter
    pub fn has_param(&self, id: NodeId, name: &str) -> bool {
        self.params(id).is_some_and(|params| params.contains(name))
    }
}

impl Drop for NodeGraph {
    fn drop(&mut self) {
        let mut render = self.render.lock();
        for slot in self.nodes.values_mut() {
            slot.node.release(&mut render);
        }
    }
}

impl std::fmt::Debug for NodeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeGraph")
            .field("nodes", &self.nodes.len())
            .field("connections", &self.connection_count())
            .field("has_changes", &self.has_changes)
            .finish_non_exhaustive()
    }
}

/// Error from a graph operation other than connecting
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// No registered node kind has this code
    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    /// Node not found
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    /// Parameter access failed
    #[error(transparent)]
    Param(#[from] ParamError),
}
