// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reusable WGSL libraries that node programs are composed from.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of the built-in texture library
pub const TEXTURE_LIBRARY: &str = "texture";
/// Id of the built-in shape library
pub const SHAPES_LIBRARY: &str = "shapes";

const TEXTURE_SOURCE: &str = include_str!("wgsl/texture.wgsl");
const SHAPES_SOURCE: &str = include_str!("wgsl/shapes.wgsl");

/// Identifier of a shader library
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(String);

impl LibraryId {
    /// Create a library id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LibraryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LibraryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Registry of library sources by id.
///
/// Sources are immutable once registered, so a program signature that
/// names a library always refers to the same text.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibraries {
    sources: IndexMap<LibraryId, String>,
}

impl ShaderLibraries {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the `texture` and `shapes` libraries
    pub fn with_builtin() -> Self {
        let mut libraries = Self::new();
        libraries
            .sources
            .insert(LibraryId::new(TEXTURE_LIBRARY), TEXTURE_SOURCE.to_string());
        libraries
            .sources
            .insert(LibraryId::new(SHAPES_LIBRARY), SHAPES_SOURCE.to_string());
        libraries
    }

    /// Register a new library
    pub fn register(&mut self, id: impl Into<LibraryId>, source: impl Into<String>) -> Result<(), LibraryError> {
        let id = id.into();
        if self.sources.contains_key(&id) {
            return Err(LibraryError::Duplicate(id));
        }
        tracing::debug!("Registered shader library {id}");
        self.sources.insert(id, source.into());
        Ok(())
    }

    /// Get a library's source
    pub fn get(&self, id: &LibraryId) -> Option<&str> {
        self.sources.get(id).map(String::as_str)
    }

    /// Check if a library is registered
    pub fn contains(&self, id: &LibraryId) -> bool {
        self.sources.contains_key(id)
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &LibraryId> {
        self.sources.keys()
    }
}

/// Error when registering a library
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LibraryError {
    /// A library with this id already exists
    #[error("Shader library already registered: {0}")]
    Duplicate(LibraryId),
}
