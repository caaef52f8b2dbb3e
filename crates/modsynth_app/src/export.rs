// SPDX-License-Identifier: MIT OR Apache-2.0
//! Conversion between image files and float texels.

use crate::document::BuiltGraph;
use crate::error::{AppError, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use modsynth_graph::{NodeGraph, TexturePixels};
use std::path::{Path, PathBuf};

/// Registry code of the nodes whose textures are exported
pub const OUTPUT_CODE: &str = "OUT";

/// Decode an image file into its size and row-major RGBA floats in `0..=1`
pub fn load_image(path: &Path) -> Result<(u32, u32, Vec<f32>)> {
    let image = image::open(path).map_err(|source| AppError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = image.to_rgba32f();
    let (width, height) = rgba.dimensions();
    Ok((width, height, rgba.into_raw()))
}

fn quantize(channel: f32) -> u8 {
    (channel * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Convert float texels to 8-bit RGBA, clamping to `0..=1`
pub fn to_rgba8(pixels: &TexturePixels) -> RgbaImage {
    ImageBuffer::from_fn(pixels.width, pixels.height, |x, y| {
        let texel = pixels.texel(x, y).unwrap_or_default();
        Rgba(texel.map(quantize))
    })
}

/// Write texels as a PNG, creating parent directories
pub fn write_png(pixels: &TexturePixels, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
    }
    to_rgba8(pixels)
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| AppError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Write every output node's texture to `<output_dir>/<key>.png`.
///
/// Output nodes without a texture (never evaluated successfully) are skipped.
pub fn export_outputs(graph: &NodeGraph, built: &BuiltGraph, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (key, id) in built.nodes() {
        if graph.kind_code(id) != Some(OUTPUT_CODE) {
            continue;
        }
        let Some(texture) = graph.texture(id) else {
            tracing::warn!("Output `{key}` has no texture, skipping");
            continue;
        };
        let pixels = graph.render_context().lock().read_texture(texture)?;
        let path = output_dir.join(format!("{key}.png"));
        write_png(&pixels, &path)?;
        tracing::info!("Wrote {:?} ({}x{})", path, pixels.width, pixels.height);
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::GraphDocument;
    use modsynth_graph::{NodeRegistry, RenderContext};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("modsynth_export_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_quantize_clamps() {
        assert_eq!(quantize(-0.5), 0);
        assert_eq!(quantize(0.5), 128);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(4.0), 255);
    }

    #[test]
    fn test_png_round_trip() {
        let dir = scratch_dir("png");
        let pixels = TexturePixels {
            width: 2,
            height: 1,
            data: vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        };
        let path = dir.join("nested").join("pair.png");
        write_png(&pixels, &path).unwrap();

        let (width, height, texels) = load_image(&path).unwrap();
        assert_eq!((width, height), (2, 1));
        assert_eq!(texels, pixels.data);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let err = load_image(Path::new("/nonexistent/modsynth.png")).unwrap_err();
        assert!(matches!(err, AppError::Image { .. }));
    }

    #[test]
    fn test_export_outputs() {
        let dir = scratch_dir("outputs");
        let document = GraphDocument::from_ron(
            r#"(
                nodes: [
                    (key: "color", code: "COL"),
                    (key: "final", code: "OUT"),
                    (key: "unused", code: "OUT"),
                ],
                connections: [(from: "color", to: "final", input: 0)],
            )"#,
        )
        .unwrap();
        let mut graph = NodeGraph::new(RenderContext::validating().into_shared());
        let built = document
            .build(&mut graph, &NodeRegistry::with_builtin(), Path::new("."))
            .unwrap();
        assert!(graph.solve().is_success());

        let written = export_outputs(&graph, &built, &dir).unwrap();
        assert_eq!(written, [dir.join("final.png"), dir.join("unused.png")]);
        let (width, height, _) = load_image(&written[0]).unwrap();
        assert_eq!((width, height), (modsynth_graph::PREVIEW_SIZE, modsynth_graph::PREVIEW_SIZE));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
