// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rendering through a real adapter. Tests return early when no adapter can
//! render to a float RGBA texture.

use modsynth_graph::{
    GpuBackend, NodeGraph, NodeRegistry, RenderContext, RenderSettings, SharedRenderContext, Value, WgpuBackend,
    TEXTURE_FORMATS,
};

const SIZE: u32 = 4;

fn settings() -> RenderSettings {
    RenderSettings {
        preview_size: SIZE,
        ..Default::default()
    }
}

fn backend() -> Option<WgpuBackend> {
    match WgpuBackend::headless(&settings()) {
        Ok(backend) => Some(backend),
        Err(err) => {
            eprintln!("skipping: {err}");
            None
        }
    }
}

fn context() -> Option<SharedRenderContext> {
    backend().map(|backend| RenderContext::new(backend, settings()).into_shared())
}

fn approx(a: [f32; 4], b: [f32; 4]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-3)
}

#[test]
fn solid_color_reaches_output() {
    let Some(render) = context() else {
        return;
    };
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render.clone());
    let color = graph.create_from(&registry, "COL").unwrap();
    let output = graph.create_from(&registry, "OUT").unwrap();
    graph.connect(color, 0, output, 0).unwrap();
    graph
        .set_param(color, "Color", Value::Vec4([1.0, 0.25, 0.0, 1.0]))
        .unwrap();

    let report = graph.solve();
    assert!(report.is_success(), "{:?}", report.failed);

    let pixels = render.lock().read_texture(graph.texture(output).unwrap()).unwrap();
    assert_eq!((pixels.width, pixels.height), (SIZE, SIZE));
    for y in 0..SIZE {
        for x in 0..SIZE {
            let texel = pixels.texel(x, y).unwrap();
            assert!(approx(texel, [1.0, 0.25, 0.0, 1.0]), "({x}, {y}) = {texel:?}");
        }
    }
}

#[test]
fn every_builtin_kind_compiles() {
    let Some(render) = context() else {
        return;
    };
    let registry = NodeRegistry::with_builtin();
    let mut graph = NodeGraph::new(render);
    for kind in registry.types() {
        graph.create_from(&registry, &kind.code).unwrap();
    }
    let report = graph.solve();
    assert!(report.is_success(), "{:?}", report.failed);
}

#[test]
fn selected_format_is_a_node_format() {
    let Some(backend) = backend() else {
        return;
    };
    assert!(TEXTURE_FORMATS.contains(&backend.texture_format()));
}

#[test]
fn upload_and_read_back() {
    let Some(mut backend) = backend() else {
        return;
    };
    let texture = backend.create_texture(3, 2).unwrap();
    let data: Vec<f32> = (0..3 * 2 * 4).map(|i| i as f32 * 0.5).collect();
    backend.upload_texture(texture, &data).unwrap();

    let pixels = backend.read_texture(texture).unwrap();
    assert_eq!(pixels.data, data);
    assert_eq!(pixels.texel(2, 1), Some([20.0, 20.5, 21.0, 21.5]));
    backend.destroy_texture(texture);
    assert_eq!(backend.texture_size(texture), None);
}

#[test]
fn invalid_program_reports_diagnostic() {
    let Some(render) = context() else {
        return;
    };
    render
        .lock()
        .register_library("bad", "fn bad(uv: vec2<f32>) -> vec4<f32> { return uv; }")
        .unwrap();
    let kind = modsynth_graph::ShaderNodeType::new(
        "BAD",
        "Bad",
        modsynth_graph::NodeCategory::Generator,
        "bad",
        "bad",
    );
    let mut graph = NodeGraph::new(render.clone());
    let bad = graph.add_node(modsynth_graph::ShaderNode::new(&kind));

    let report = graph.solve();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, bad);
    assert!(!report.failed[0].1.is_empty());
    assert!(render.lock().programs().is_empty());
}
