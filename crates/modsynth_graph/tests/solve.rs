// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end solving against the validating backend.

use modsynth_graph::{
    ConstantNode, NodeCategory, NodeGraph, NodeId, NodeRegistry, NodeStatus, ParamDecl, RenderContext,
    RenderSettings, ShaderNode, ShaderNodeType, SharedRenderContext, TextureHandle, TexturePixels, ValidatingBackend,
    Value,
};

fn context() -> SharedRenderContext {
    let settings = RenderSettings {
        preview_size: 16,
        ..Default::default()
    };
    RenderContext::new(ValidatingBackend::new(), settings).into_shared()
}

fn pixels(graph: &NodeGraph, id: NodeId) -> TexturePixels {
    let texture = graph.texture(id).expect("node has a texture");
    graph.render_context().lock().read_texture(texture).unwrap()
}

/// noise -> threshold -> output, plus an unconnected colour node
struct Chain {
    graph: NodeGraph,
    noise: NodeId,
    threshold: NodeId,
    output: NodeId,
    color: NodeId,
}

fn chain(render: SharedRenderContext) -> Chain {
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render);
    let noise = graph.create_from(&registry, "NOI").unwrap();
    let threshold = graph.create_from(&registry, "THR").unwrap();
    let output = graph.create_from(&registry, "OUT").unwrap();
    let color = graph.create_from(&registry, "COL").unwrap();
    graph.connect(noise, 0, threshold, 0).unwrap();
    graph.connect(threshold, 0, output, 0).unwrap();
    Chain {
        graph,
        noise,
        threshold,
        output,
        color,
    }
}

#[test]
fn second_solve_does_no_work() {
    let mut c = chain(context());

    let first = c.graph.solve();
    assert!(first.is_success());
    assert_eq!(first.evaluated.len(), 4);
    assert_eq!(first.compiles, 4);
    assert_eq!(first.renders, 4);

    let second = c.graph.solve();
    assert!(second.is_noop());
    assert_eq!(second.compiles, 0);
    assert_eq!(second.renders, 0);
    assert_eq!(second.visited, first.visited);
    for id in [c.noise, c.threshold, c.output, c.color] {
        assert_eq!(c.graph.status(id), Some(NodeStatus::Clean));
    }
}

#[test]
fn param_change_dirties_only_downstream() {
    let mut c = chain(context());
    c.graph.solve();
    let before = pixels(&c.graph, c.output);

    c.graph.set_param(c.noise, "Scale", Value::Scalar(4.0)).unwrap();
    assert!(c.graph.is_dirty(c.noise));
    assert!(c.graph.is_dirty(c.threshold));
    assert!(c.graph.is_dirty(c.output));
    assert!(!c.graph.is_dirty(c.color));

    let report = c.graph.solve();
    assert_eq!(report.evaluated, vec![c.noise, c.threshold, c.output]);
    assert_eq!(report.compiles, 0);
    assert_eq!(report.renders, 3);
    assert_ne!(pixels(&c.graph, c.output), before);
}

#[test]
fn visit_order_is_topological_with_id_ties() {
    let mut c = chain(context());
    let report = c.graph.solve();
    assert_eq!(report.visited, vec![c.noise, c.threshold, c.output, c.color]);
}

#[test]
fn identical_graphs_render_identically() {
    let mut a = chain(context());
    let mut b = chain(context());
    for c in [&mut a, &mut b] {
        c.graph.set_param(c.threshold, "Feather", Value::Scalar(0.25)).unwrap();
    }

    let report_a = a.graph.solve();
    let report_b = b.graph.solve();
    assert_eq!(report_a.visited, report_b.visited);
    assert_eq!(pixels(&a.graph, a.output), pixels(&b.graph, b.output));
}

#[test]
fn compile_failure_is_isolated() {
    let render = context();
    render
        .lock()
        .register_library("broken", "fn broken(uv: vec2<f32>) -> vec4<f32> { return missing_value; }")
        .unwrap();
    let broken_kind = ShaderNodeType::new("BAD", "Broken", NodeCategory::Generator, "broken", "broken");

    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render);
    let color = graph.create_from(&registry, "COL").unwrap();
    let broken = graph.add_node(ShaderNode::new(&broken_kind));
    let output = graph.create_from(&registry, "OUT").unwrap();
    graph.connect(broken, 0, output, 0).unwrap();

    let report = graph.solve();
    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    let (failed, diagnostic) = &report.failed[0];
    assert_eq!(*failed, broken);
    assert!(diagnostic.contains("missing_value"), "{diagnostic}");

    assert!(report.evaluated.contains(&color));
    assert!(report.evaluated.contains(&output));
    assert!(graph.texture(color).is_some());
    assert!(graph.texture(broken).is_none());
    assert!(matches!(graph.status(broken), Some(NodeStatus::Failed { .. })));
    assert_eq!(graph.status(color), Some(NodeStatus::Clean));

    let again = graph.solve();
    assert!(again.is_noop());
    assert!(graph.status(broken).is_some_and(|s| s.is_failed()));
}

#[test]
fn missing_library_recovers_once_registered() {
    let render = context();
    let kind = ShaderNodeType::new("LATE", "Late", NodeCategory::Generator, "late_fill", "late")
        .with_param(ParamDecl::scalar("Level", 0.5));

    let mut graph = NodeGraph::new(render.clone());
    let late = graph.add_node(ShaderNode::new(&kind));

    let report = graph.solve();
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("late"));

    render
        .lock()
        .register_library(
            "late",
            "fn late_fill(uv: vec2<f32>, level: f32) -> vec4<f32> { return vec4<f32>(level); }",
        )
        .unwrap();
    assert!(graph.solve().is_noop());

    graph.set_param(late, "Level", Value::Scalar(0.75)).unwrap();
    assert!(graph.status(late).is_some_and(|s| s.is_failed()));
    let report = graph.solve();
    assert!(report.is_success());
    assert_eq!(report.compiles, 1);
    assert_eq!(graph.status(late), Some(NodeStatus::Clean));
    assert!(graph.texture(late).is_some());
}

#[test]
fn failed_node_keeps_previous_output() {
    let render = context();
    render
        .lock()
        .register_library(
            "tint",
            "fn tint(uv: vec2<f32>, color: vec4<f32>) -> vec4<f32> { return color; }",
        )
        .unwrap();
    let kind = ShaderNodeType::new("TINT", "Tint", NodeCategory::Generator, "tint", "tint")
        .with_param(ParamDecl::vec4("Color", [1.0, 0.0, 0.0, 1.0]));

    let mut graph = NodeGraph::new(render);
    let tint = graph.add_node(ShaderNode::new(&kind));
    assert!(graph.solve().is_success());
    let texture = graph.texture(tint);
    assert!(texture.is_some());

    graph.declare_param(tint, ParamDecl::scalar("Gain", 1.0)).unwrap();
    let report = graph.solve();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(graph.texture(tint), texture);

    graph.remove_param(tint, "Gain").unwrap();
    let report = graph.solve();
    assert!(report.is_success());
    assert_eq!(report.compiles, 0);
    assert_eq!(report.renders, 1);
    assert_eq!(graph.status(tint), Some(NodeStatus::Clean));
}

#[test]
fn declaration_change_recompiles() {
    let render = context();
    render
        .lock()
        .register_library(
            "tint",
            "fn tint(uv: vec2<f32>, color: vec4<f32>) -> vec4<f32> { return color; }",
        )
        .unwrap();
    let kind = ShaderNodeType::new("TINT", "Tint", NodeCategory::Generator, "tint", "tint");

    let mut graph = NodeGraph::new(render.clone());
    let tint = graph.add_node(ShaderNode::new(&kind));
    assert_eq!(graph.solve().failed.len(), 1);

    graph
        .declare_param(tint, ParamDecl::vec4("Color", [0.0, 1.0, 0.0, 1.0]))
        .unwrap();
    let report = graph.solve();
    assert!(report.is_success());
    assert_eq!(report.compiles, 1);

    graph.set_param_component(tint, "Color", 2, 1.0).unwrap();
    let report = graph.solve();
    assert_eq!(report.compiles, 0);
    assert_eq!(report.renders, 1);
    assert_eq!(render.lock().programs().len(), 1);
}

#[test]
fn socket_param_pulls_upstream_value() {
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(context());
    let factor = graph.add_node(ConstantNode::with_value(Value::Scalar(0.9)));
    let mix = graph.create_from(&registry, "MIX").unwrap();

    graph.connect(factor, 0, mix, 2).unwrap();
    graph.solve();
    let driven = pixels(&graph, mix);

    assert!(graph.remove_connection(factor, 0, mix, 2));
    graph.solve();
    let fallback = pixels(&graph, mix);
    assert_ne!(driven, fallback);

    graph.set_param(factor, "Value", Value::Scalar(0.5)).unwrap();
    graph.connect(factor, 0, mix, 2).unwrap();
    graph.solve();
    assert_eq!(pixels(&graph, mix), fallback);
}

#[test]
fn upstream_texture_change_reaches_output() {
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(context());
    let a = graph.create_from(&registry, "COL").unwrap();
    let b = graph.create_from(&registry, "COL").unwrap();
    let mix = graph.create_from(&registry, "MIX").unwrap();
    graph.connect(a, 0, mix, 0).unwrap();
    graph.connect(b, 0, mix, 1).unwrap();

    let report = graph.solve();
    assert_eq!(report.compiles, 2);
    assert_eq!(report.cache_reuses, 1);
    let before = pixels(&graph, mix);

    graph.set_param_component(b, "Color", 0, 0.0).unwrap();
    let report = graph.solve();
    assert_eq!(report.evaluated, vec![b, mix]);
    assert_ne!(pixels(&graph, mix), before);
}

#[test]
fn shared_signature_compiles_once() {
    let render = context();
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render.clone());
    let a = graph.create_from(&registry, "NOI").unwrap();
    let b = graph.create_from(&registry, "NOI").unwrap();
    graph.set_param(b, "Scale", Value::Scalar(2.0)).unwrap();

    let report = graph.solve();
    assert_eq!(report.compiles, 1);
    assert_eq!(report.cache_reuses, 1);
    assert_eq!(render.lock().programs().len(), 1);

    let mut other = NodeGraph::new(render.clone());
    other.create_from(&registry, "NOI").unwrap();
    let report = other.solve();
    assert_eq!(report.compiles, 0);
    assert_eq!(report.cache_reuses, 1);

    drop(other);
    assert!(graph.remove_node(a));
    assert_eq!(render.lock().programs().len(), 1);
    assert!(graph.remove_node(b));
    assert!(render.lock().programs().is_empty());
}

#[test]
fn remove_node_frees_texture() {
    let render = context();
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render.clone());
    let color = graph.create_from(&registry, "COL").unwrap();
    graph.solve();

    let texture = graph.texture(color).unwrap();
    assert_eq!(render.lock().texture_size(texture), Some((16, 16)));
    assert!(graph.remove_node(color));
    assert_eq!(render.lock().texture_size(texture), None);
}

#[test]
fn dropping_graph_releases_programs() {
    let render = context();
    {
        let mut c = chain(render.clone());
        c.graph.solve();
        assert_eq!(render.lock().programs().len(), 4);
    }
    assert!(render.lock().programs().is_empty());
}

#[test]
fn preview_size_change_recreates_textures() {
    let render = context();
    let mut c = chain(render.clone());
    c.graph.solve();
    let old = c.graph.texture(c.output).unwrap();

    render.lock().set_preview_size(8);
    c.graph.mark_all_dirty();
    let report = c.graph.solve();
    assert_eq!(report.compiles, 0);

    let new = c.graph.texture(c.output).unwrap();
    assert_ne!(old, new);
    assert_eq!(render.lock().texture_size(old), None);
    let resized = pixels(&c.graph, c.output);
    assert_eq!((resized.width, resized.height), (8, 8));
}

#[test]
fn failed_resize_keeps_previous_texture() {
    let render = context();
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render.clone());
    let image = graph.create_from(&registry, "IMG").unwrap();
    let output = graph.create_from(&registry, "OUT").unwrap();
    graph.connect(image, 0, output, 0).unwrap();
    assert!(graph.solve().is_success());
    let previous = graph.texture(image).unwrap();

    render.lock().set_preview_size(8);
    graph.mark_all_dirty();
    graph
        .set_param(image, "Image", Value::Texture2D(TextureHandle(999)))
        .unwrap();
    let report = graph.solve();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, image);
    assert_eq!(graph.texture(image), Some(previous));
    assert_eq!(render.lock().texture_size(previous), Some((16, 16)));
    assert_eq!(graph.status(output), Some(NodeStatus::Clean));
    let resized = pixels(&graph, output);
    assert_eq!((resized.width, resized.height), (8, 8));
}

#[test]
fn uploaded_image_feeds_image_node() {
    let render = context();
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render.clone());
    let image = graph.create_from(&registry, "IMG").unwrap();
    let output = graph.create_from(&registry, "OUT").unwrap();
    graph.connect(image, 0, output, 0).unwrap();

    let texels: Vec<f32> = (0..2 * 2 * 4).map(|i| i as f32 / 16.0).collect();
    let handle = render.lock().upload_texture(2, 2, &texels).unwrap();
    graph.set_param(image, "Image", Value::Texture2D(handle)).unwrap();

    let report = graph.solve();
    assert!(report.is_success());
    assert_eq!(report.renders, 2);
    assert!(graph.texture(output).is_some());
}

#[test]
fn unknown_kind_is_rejected() {
    let mut graph = NodeGraph::new(context());
    let err = graph.create_from(&NodeRegistry::with_builtin(), "NOPE").unwrap_err();
    assert_eq!(err.to_string(), "Unknown node kind: NOPE");
    assert_eq!(graph.node_count(), 0);
}
