// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader nodes: libraries, code generation and the program cache.

pub mod cache;
pub mod codegen;
pub mod kinds;
pub mod library;
pub mod node;

pub use cache::{AcquiredProgram, ProgramCache, ProgramSignature};
pub use codegen::GeneratedProgram;
pub use library::{LibraryError, LibraryId, ShaderLibraries, SHAPES_LIBRARY, TEXTURE_LIBRARY};
pub use node::{ShaderNode, ShaderNodeType, OUTPUT_SOCKET};
