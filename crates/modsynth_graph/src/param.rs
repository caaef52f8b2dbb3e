// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named, typed node parameters.

use crate::node::SocketSpec;
use crate::value::{TextureHandle, Value, ValueKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Declaration of a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    /// Display name, also the lookup key
    pub name: String,
    /// Initial value; its kind is the parameter's kind
    pub default: Value,
    /// Whether the parameter is also exposed as an input socket
    pub socket: bool,
}

impl ParamDecl {
    /// Declare a plain parameter
    pub fn new(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default,
            socket: false,
        }
    }

    /// Declare a scalar parameter
    pub fn scalar(name: impl Into<String>, default: f32) -> Self {
        Self::new(name, Value::Scalar(default))
    }

    /// Declare a 2D vector parameter
    pub fn vec2(name: impl Into<String>, default: [f32; 2]) -> Self {
        Self::new(name, Value::Vec2(default))
    }

    /// Declare a 3D vector parameter
    pub fn vec3(name: impl Into<String>, default: [f32; 3]) -> Self {
        Self::new(name, Value::Vec3(default))
    }

    /// Declare a 4D vector parameter
    pub fn vec4(name: impl Into<String>, default: [f32; 4]) -> Self {
        Self::new(name, Value::Vec4(default))
    }

    /// Declare a texture parameter, initially unbound
    pub fn texture(name: impl Into<String>) -> Self {
        Self::new(name, Value::Texture2D(TextureHandle::UNBOUND))
    }

    /// Also expose the parameter as an input socket
    pub fn as_socket(mut self) -> Self {
        self.socket = true;
        self
    }

    /// Kind of this parameter
    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }
}

/// A declared parameter with its current value
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    decl: ParamDecl,
    value: Value,
}

impl Param {
    /// Parameter name
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    /// Parameter kind
    pub fn kind(&self) -> ValueKind {
        self.decl.kind()
    }

    /// Current value
    pub fn value(&self) -> Value {
        self.value
    }

    /// Whether the parameter doubles as an input socket
    pub fn is_socket(&self) -> bool {
        self.decl.socket
    }

    /// The declaration this parameter was created from
    pub fn decl(&self) -> &ParamDecl {
        &self.decl
    }
}

/// Ordered set of parameters plus the node's `changed` flag
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: IndexMap<String, Param>,
    changed: bool,
}

impl Params {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a parameter set from declarations. A repeated name keeps the
    /// first declaration and logs a warning.
    pub fn from_decls(decls: impl IntoIterator<Item = ParamDecl>) -> Self {
        let mut params = Self::new();
        for decl in decls {
            if let Err(e) = params.declare(decl) {
                tracing::warn!("Skipping declaration: {e}");
            }
        }
        params.changed = false;
        params
    }

    /// Add a new parameter declaration at the end of the set
    pub fn declare(&mut self, decl: ParamDecl) -> Result<(), ParamError> {
        if self.entries.contains_key(&decl.name) {
            return Err(ParamError::Duplicate(decl.name));
        }
        let value = decl.default;
        self.entries.insert(decl.name.clone(), Param { decl, value });
        self.changed = true;
        Ok(())
    }

    /// Remove a parameter declaration, keeping the order of the others
    pub fn remove(&mut self, name: &str) -> Result<ParamDecl, ParamError> {
        let param = self
            .entries
            .shift_remove(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        self.changed = true;
        Ok(param.decl)
    }

    /// Check if a parameter is declared
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Get a parameter by name
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.get(name)
    }

    /// Get a parameter's current value
    pub fn value(&self, name: &str) -> Option<Value> {
        self.entries.get(name).map(Param::value)
    }

    /// Replace a parameter's value. The kind must match the declaration.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        let param = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        if param.kind() != value.kind() {
            return Err(ParamError::KindMismatch {
                name: name.to_string(),
                expected: param.kind(),
                got: value.kind(),
            });
        }
        param.value = value;
        self.changed = true;
        Ok(())
    }

    /// Replace one numeric component of a parameter's value
    pub fn set_component(&mut self, name: &str, index: usize, component: f32) -> Result<(), ParamError> {
        let param = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        let mut value = param.value;
        if !value.set_component(index, component) {
            return Err(ParamError::ComponentOutOfRange {
                name: name.to_string(),
                index,
                kind: param.kind(),
            });
        }
        param.value = value;
        self.changed = true;
        Ok(())
    }

    /// Iterate over parameters in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.entries.values()
    }

    /// Number of declared parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no parameters are declared
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Input sockets contributed by socket parameters, in declaration order
    pub fn socket_specs(&self) -> Vec<SocketSpec> {
        self.entries
            .values()
            .filter(|p| p.is_socket())
            .map(|p| SocketSpec::new(p.name(), p.kind()))
            .collect()
    }

    /// Whether any parameter changed since the flag was last cleared
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Read and clear the changed flag
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Error when reading or writing a parameter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    /// No parameter with this name
    #[error("Unknown parameter: {0}")]
    Unknown(String),

    /// Value kind does not match the declaration
    #[error("Parameter {name} expects {expected}, got {got}")]
    KindMismatch {
        /// Parameter name
        name: String,
        /// Declared kind
        expected: ValueKind,
        /// Kind of the rejected value
        got: ValueKind,
    },

    /// Component index outside the parameter's kind, or a texture parameter
    #[error("Component {index} out of range for {kind} parameter {name}")]
    ComponentOutOfRange {
        /// Parameter name
        name: String,
        /// Rejected index
        index: usize,
        /// Declared kind
        kind: ValueKind,
    },

    /// A parameter with this name is already declared
    #[error("Parameter already declared: {0}")]
    Duplicate(String),

    /// The node kind has a fixed parameter set
    #[error("Node kind {0} does not accept parameter declarations")]
    FixedDeclarations(String),
}
