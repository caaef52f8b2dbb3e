// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural invariants of `NodeGraph` under random edit sequences.

use modsynth_graph::{
    Connection, ConstantNode, NodeGraph, NodeId, NodeRegistry, RenderContext, RenderSettings, ValidatingBackend,
    Value,
};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    AddMix,
    AddValue,
    Connect(Attempt),
    Disconnect(usize),
    RemoveNode(usize),
    SetFactor(usize, f32),
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    source: usize,
    output: usize,
    target: usize,
    input: usize,
}

fn attempt() -> impl Strategy<Value = Attempt> {
    (0..16usize, 0..2usize, 0..16usize, 0..4usize).prop_map(|(source, output, target, input)| Attempt {
        source,
        output,
        target,
        input,
    })
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::AddMix),
        1 => Just(Op::AddValue),
        6 => attempt().prop_map(Op::Connect),
        1 => (0..16usize).prop_map(Op::Disconnect),
        1 => (0..16usize).prop_map(Op::RemoveNode),
        1 => (0..16usize, 0.0f32..1.0).prop_map(|(index, value)| Op::SetFactor(index, value)),
    ]
}

fn new_graph() -> NodeGraph {
    let settings = RenderSettings {
        preview_size: 4,
        ..Default::default()
    };
    NodeGraph::new(RenderContext::new(ValidatingBackend::new(), settings).into_shared())
}

fn pick(graph: &NodeGraph, index: usize) -> Option<NodeId> {
    let ids: Vec<_> = graph.node_ids().collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

fn resolve(graph: &NodeGraph, attempt: Attempt) -> Option<(NodeId, usize, NodeId, usize)> {
    Some((
        pick(graph, attempt.source)?,
        attempt.output,
        pick(graph, attempt.target)?,
        attempt.input,
    ))
}

fn apply(graph: &mut NodeGraph, registry: &NodeRegistry, op: &Op) {
    match *op {
        Op::AddMix => {
            graph.create_from(registry, "MIX").unwrap();
        }
        Op::AddValue => {
            graph.create::<ConstantNode>();
        }
        Op::Connect(attempt) => {
            if let Some((source, output, target, input)) = resolve(graph, attempt) {
                let _ = graph.connect(source, output, target, input);
            }
        }
        Op::Disconnect(index) => {
            let connections = graph.connections();
            if !connections.is_empty() {
                let c = connections[index % connections.len()];
                assert!(graph.remove_connection(c.source, c.output, c.target, c.input));
            }
        }
        Op::RemoveNode(index) => {
            if let Some(id) = pick(graph, index) {
                assert!(graph.remove_node(id));
            }
        }
        Op::SetFactor(index, value) => {
            if let Some(id) = pick(graph, index) {
                let _ = graph.set_param(id, "Factor", Value::Scalar(value));
            }
        }
    }
}

fn build(ops: &[Op]) -> NodeGraph {
    let registry = NodeRegistry::with_builtin();
    let mut graph = new_graph();
    for op in ops {
        apply(&mut graph, &registry, op);
    }
    graph
}

type Snapshot = (Vec<Connection>, Vec<(NodeId, bool)>);

fn snapshot(graph: &NodeGraph) -> Snapshot {
    let dirty = graph.node_ids().map(|id| (id, graph.is_dirty(id))).collect();
    (graph.connections(), dirty)
}

proptest! {
    #[test]
    fn edges_stay_acyclic_with_single_fan_in(ops in prop::collection::vec(op(), 0..60)) {
        let graph = build(&ops);

        prop_assert_eq!(graph.topological_order().len(), graph.node_count());

        let mut targets = HashSet::new();
        for c in graph.connections() {
            prop_assert!(targets.insert((c.target, c.input)), "two edges into {:?}", (c.target, c.input));
            prop_assert_eq!(graph.input_source(c.target, c.input), Some(c.source_socket()));
        }
    }

    #[test]
    fn topological_order_respects_edges(ops in prop::collection::vec(op(), 0..60)) {
        let graph = build(&ops);
        let order = graph.topological_order();
        let position = |id: NodeId| order.iter().position(|&n| n == id);
        for c in graph.connections() {
            prop_assert!(position(c.source) < position(c.target));
        }
    }

    #[test]
    fn rejected_connect_changes_nothing(ops in prop::collection::vec(op(), 0..40), attempt in attempt(), solve in any::<bool>()) {
        let mut graph = build(&ops);
        if solve {
            graph.solve();
        }
        let Some((source, output, target, input)) = resolve(&graph, attempt) else {
            return Ok(());
        };
        let before = snapshot(&graph);
        if graph.connect(source, output, target, input).is_err() {
            prop_assert_eq!(snapshot(&graph), before);
        }
    }

    #[test]
    fn connect_then_remove_round_trips(ops in prop::collection::vec(op(), 0..40), attempt in attempt(), solve in any::<bool>()) {
        let mut graph = build(&ops);
        if solve {
            graph.solve();
        }
        let Some((source, output, target, input)) = resolve(&graph, attempt) else {
            return Ok(());
        };
        let before = snapshot(&graph);
        if graph.connect(source, output, target, input).is_ok() {
            prop_assert!(graph.remove_connection(source, output, target, input));
            prop_assert_eq!(graph.input_source(target, input), None);
            prop_assert_eq!(snapshot(&graph), before);
        }
    }
}
