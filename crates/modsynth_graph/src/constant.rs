// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constant value nodes.

use crate::evaluation::{NodeError, SolveContext};
use crate::node::{Node, SocketSpec};
use crate::param::{ParamDecl, Params};
use crate::value::{Value, ValueKind};

/// Name of the single parameter and output of a constant node
pub const VALUE_PARAM: &str = "Value";

/// Node that emits its `Value` parameter unchanged
#[derive(Debug, Clone)]
pub struct ConstantNode {
    kind: ValueKind,
    params: Params,
}

impl ConstantNode {
    /// Create a zero-valued constant of the given kind.
    ///
    /// Texture constants are not meaningful; `Texture2D` falls back to `Scalar`.
    pub fn new(kind: ValueKind) -> Self {
        let kind = match kind {
            ValueKind::Texture2D => ValueKind::Scalar,
            other => other,
        };
        Self {
            kind,
            params: Params::from_decls([ParamDecl::new(VALUE_PARAM, Value::zero(kind))]),
        }
    }

    /// Create a constant holding `value`
    pub fn with_value(value: Value) -> Self {
        let mut node = Self::new(value.kind());
        // Kinds agree by construction.
        let _ = node.params.set(VALUE_PARAM, value);
        node.params.take_changed();
        node
    }

    /// Registry code for a constant of `kind`
    pub fn code_for(kind: ValueKind) -> &'static str {
        match kind {
            ValueKind::Vec2 => "VEC2",
            ValueKind::Vec3 => "VEC3",
            ValueKind::Vec4 => "VEC4",
            ValueKind::Scalar | ValueKind::Texture2D => "VAL",
        }
    }

    /// Display name for a constant of `kind`
    pub fn name_for(kind: ValueKind) -> &'static str {
        match kind {
            ValueKind::Vec2 => "Vector 2",
            ValueKind::Vec3 => "Vector 3",
            ValueKind::Vec4 => "Vector 4",
            ValueKind::Scalar | ValueKind::Texture2D => "Value",
        }
    }
}

impl Default for ConstantNode {
    fn default() -> Self {
        Self::new(ValueKind::Scalar)
    }
}

impl Node for ConstantNode {
    fn kind_code(&self) -> &str {
        Self::code_for(self.kind)
    }

    fn name(&self) -> &str {
        Self::name_for(self.kind)
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::new(VALUE_PARAM, self.kind)]
    }

    fn solve(&mut self, _inputs: &[Option<Value>], _ctx: &mut SolveContext<'_>) -> Result<Vec<Value>, NodeError> {
        let value = self
            .params
            .value(VALUE_PARAM)
            .unwrap_or_else(|| Value::zero(self.kind));
        Ok(vec![value])
    }
}
