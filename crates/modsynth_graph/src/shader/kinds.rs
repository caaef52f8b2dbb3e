// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in shader node kinds.

use crate::node::NodeCategory;
use crate::param::ParamDecl;
use crate::shader::library::{SHAPES_LIBRARY, TEXTURE_LIBRARY};
use crate::shader::node::ShaderNodeType;

/// Every built-in shader node kind, in registry order
pub fn builtin() -> Vec<ShaderNodeType> {
    vec![
        color(),
        mix(),
        simple_gradient(),
        noise(),
        threshold(),
        image(),
        uv(),
        radial_gradient(),
        normal_map(),
        output(),
        circle(),
        rounded_box(),
    ]
}

fn color() -> ShaderNodeType {
    ShaderNodeType::new("COL", "Color", NodeCategory::Generator, "solid_color", TEXTURE_LIBRARY)
        .with_description("Uniform colour fill")
        .with_param(ParamDecl::vec4("Color", [1.0, 1.0, 1.0, 1.0]))
}

fn mix() -> ShaderNodeType {
    ShaderNodeType::new("MIX", "Mix", NodeCategory::Operator, "mix_textures", TEXTURE_LIBRARY)
        .with_description("Blend two textures: 0 mix, 1 add, 2 subtract, 3 multiply")
        .with_param(ParamDecl::texture("A").as_socket())
        .with_param(ParamDecl::texture("B").as_socket())
        .with_param(ParamDecl::scalar("Factor", 0.5).as_socket())
        .with_param(ParamDecl::scalar("Mode", 0.0))
}

fn simple_gradient() -> ShaderNodeType {
    ShaderNodeType::new("SGR", "Simple Gradient", NodeCategory::Generator, "simple_gradient", TEXTURE_LIBRARY)
        .with_description("Linear gradient along an angle in radians")
        .with_param(ParamDecl::scalar("Angle", 0.0))
}

fn noise() -> ShaderNodeType {
    ShaderNodeType::new("NOI", "Noise", NodeCategory::Generator, "value_noise", TEXTURE_LIBRARY)
        .with_description("Smooth value noise")
        .with_param(ParamDecl::scalar("Scale", 8.0))
        .with_param(ParamDecl::scalar("Pattern X", 0.0))
        .with_param(ParamDecl::scalar("Pattern Y", 0.0))
}

fn threshold() -> ShaderNodeType {
    ShaderNodeType::new("THR", "Threshold", NodeCategory::Operator, "threshold_texture", TEXTURE_LIBRARY)
        .with_description("Soft luminance threshold")
        .with_param(ParamDecl::texture("Input").as_socket())
        .with_param(ParamDecl::scalar("Threshold", 0.5))
        .with_param(ParamDecl::scalar("Feather", 0.1))
}

fn image() -> ShaderNodeType {
    ShaderNodeType::new("IMG", "Image", NodeCategory::External, "image_texture", TEXTURE_LIBRARY)
        .with_description("Uploaded image")
        .with_param(ParamDecl::texture("Image"))
}

fn uv() -> ShaderNodeType {
    ShaderNodeType::new("UVS", "UV", NodeCategory::Generator, "uv_transform", TEXTURE_LIBRARY)
        .with_description("Transformed texture coordinates: clamp 0, repeat 1, mirror 2")
        .with_param(ParamDecl::scalar("Clamp", 0.0))
        .with_param(ParamDecl::texture("Deform").as_socket())
        .with_param(ParamDecl::scalar("Deform Amount", 0.0))
        .with_param(ParamDecl::vec2("Repeat", [1.0, 1.0]))
        .with_param(ParamDecl::vec2("Position", [0.0, 0.0]))
        .with_param(ParamDecl::vec2("Scale", [1.0, 1.0]))
        .with_param(ParamDecl::scalar("Rotation", 0.0))
}

fn radial_gradient() -> ShaderNodeType {
    ShaderNodeType::new("RGR", "Radial Gradient", NodeCategory::Generator, "radial_gradient", TEXTURE_LIBRARY)
        .with_description("Gradient falling off from the centre")
}

fn normal_map() -> ShaderNodeType {
    ShaderNodeType::new("NRM", "Normal Map", NodeCategory::Multisample, "normal_from_height", TEXTURE_LIBRARY)
        .with_description("Tangent-space normals from a height texture")
        .with_param(ParamDecl::texture("Height").as_socket())
        .with_param(ParamDecl::scalar("Scale", 0.1))
}

fn output() -> ShaderNodeType {
    ShaderNodeType::new("OUT", "Output", NodeCategory::Result, "output_texture", TEXTURE_LIBRARY)
        .with_description("Final image")
        .with_param(ParamDecl::texture("Input").as_socket())
}

fn circle() -> ShaderNodeType {
    ShaderNodeType::new("SCIRCLE", "Circle", NodeCategory::Generator, "shape_circle", SHAPES_LIBRARY)
        .with_description("Filled circle")
        .with_param(ParamDecl::scalar("Radius", 0.5))
}

fn rounded_box() -> ShaderNodeType {
    ShaderNodeType::new("SBOX", "Box", NodeCategory::Generator, "shape_box", SHAPES_LIBRARY)
        .with_description("Filled box with per-corner radii")
        .with_param(ParamDecl::vec2("Bounds", [0.5, 0.5]))
        .with_param(ParamDecl::vec4("Border Radius", [0.0; 4]))
}
