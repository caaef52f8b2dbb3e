// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed values flowing along graph edges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a texture owned by a [`GpuBackend`](crate::backend::GpuBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureHandle(pub u64);

impl TextureHandle {
    /// Handle that refers to no texture. Sampling it yields transparent black.
    pub const UNBOUND: Self = Self(0);

    /// Whether this handle refers to an actual texture
    pub fn is_bound(self) -> bool {
        self != Self::UNBOUND
    }
}

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// Semantic type of a socket or parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Single float
    Scalar,
    /// 2D vector
    Vec2,
    /// 3D vector
    Vec3,
    /// 4D vector / colour
    Vec4,
    /// RGBA floating-point texture
    Texture2D,
}

impl ValueKind {
    /// Number of float components carried by this kind, zero for textures
    pub fn component_count(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Texture2D => 0,
        }
    }

    /// Matching WGSL type name
    pub fn wgsl_type(self) -> &'static str {
        match self {
            Self::Scalar => "f32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
            Self::Texture2D => "texture_2d<f32>",
        }
    }

    /// Stable tag used when hashing parameter declarations
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Texture2D => 5,
        }
    }

    /// Check if an output of this kind may feed an input of `other`.
    ///
    /// There is no implicit coercion: kinds must be equal.
    pub fn can_connect_to(self, other: ValueKind) -> bool {
        self == other
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scalar => "Scalar",
            Self::Vec2 => "Vec2",
            Self::Vec3 => "Vec3",
            Self::Vec4 => "Vec4",
            Self::Texture2D => "Texture2D",
        };
        f.write_str(name)
    }
}

/// Value carried by a socket or stored in a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Single float
    Scalar(f32),
    /// 2D vector
    Vec2([f32; 2]),
    /// 3D vector
    Vec3([f32; 3]),
    /// 4D vector / colour
    Vec4([f32; 4]),
    /// Texture reference
    Texture2D(TextureHandle),
}

impl Value {
    /// Zero value (or an unbound texture) of the given kind
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Scalar => Self::Scalar(0.0),
            ValueKind::Vec2 => Self::Vec2([0.0; 2]),
            ValueKind::Vec3 => Self::Vec3([0.0; 3]),
            ValueKind::Vec4 => Self::Vec4([0.0; 4]),
            ValueKind::Texture2D => Self::Texture2D(TextureHandle::UNBOUND),
        }
    }

    /// Get the kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Vec2(_) => ValueKind::Vec2,
            Self::Vec3(_) => ValueKind::Vec3,
            Self::Vec4(_) => ValueKind::Vec4,
            Self::Texture2D(_) => ValueKind::Texture2D,
        }
    }

    /// Numeric payload padded with zeros to four floats, `None` for textures
    pub fn components(&self) -> Option<[f32; 4]> {
        match *self {
            Self::Scalar(x) => Some([x, 0.0, 0.0, 0.0]),
            Self::Vec2([x, y]) => Some([x, y, 0.0, 0.0]),
            Self::Vec3([x, y, z]) => Some([x, y, z, 0.0]),
            Self::Vec4(v) => Some(v),
            Self::Texture2D(_) => None,
        }
    }

    /// Texture handle if this is a texture value
    pub fn texture(&self) -> Option<TextureHandle> {
        match *self {
            Self::Texture2D(handle) => Some(handle),
            _ => None,
        }
    }

    /// Scalar payload if this is a scalar value
    pub fn as_scalar(&self) -> Option<f32> {
        match *self {
            Self::Scalar(x) => Some(x),
            _ => None,
        }
    }

    /// Overwrite one numeric component, returning `false` when the index is
    /// outside this value's component range or the value is a texture
    pub fn set_component(&mut self, index: usize, component: f32) -> bool {
        let slot = match self {
            Self::Scalar(x) if index == 0 => x,
            Self::Vec2(v) => match v.get_mut(index) {
                Some(slot) => slot,
                None => return false,
            },
            Self::Vec3(v) => match v.get_mut(index) {
                Some(slot) => slot,
                None => return false,
            },
            Self::Vec4(v) => match v.get_mut(index) {
                Some(slot) => slot,
                None => return false,
            },
            _ => return false,
        };
        *slot = component;
        true
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Scalar(value)
    }
}

impl From<[f32; 2]> for Value {
    fn from(value: [f32; 2]) -> Self {
        Self::Vec2(value)
    }
}

impl From<[f32; 3]> for Value {
    fn from(value: [f32; 3]) -> Self {
        Self::Vec3(value)
    }
}

impl From<[f32; 4]> for Value {
    fn from(value: [f32; 4]) -> Self {
        Self::Vec4(value)
    }
}

impl From<TextureHandle> for Value {
    fn from(value: TextureHandle) -> Self {
        Self::Texture2D(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_implicit_coercion() {
        assert!(ValueKind::Vec3.can_connect_to(ValueKind::Vec3));
        assert!(!ValueKind::Scalar.can_connect_to(ValueKind::Vec3));
        assert!(!ValueKind::Vec4.can_connect_to(ValueKind::Texture2D));
    }

    #[test]
    fn test_components_are_padded() {
        assert_eq!(Value::Vec2([1.0, 2.0]).components(), Some([1.0, 2.0, 0.0, 0.0]));
        assert_eq!(Value::Texture2D(TextureHandle(3)).components(), None);
    }

    #[test]
    fn test_set_component() {
        let mut color = Value::Vec4([0.0; 4]);
        assert!(color.set_component(2, 0.5));
        assert_eq!(color, Value::Vec4([0.0, 0.0, 0.5, 0.0]));
        assert!(!color.set_component(4, 1.0));

        let mut scalar = Value::Scalar(1.0);
        assert!(!scalar.set_component(1, 2.0));

        let mut texture = Value::zero(ValueKind::Texture2D);
        assert!(!texture.set_component(0, 1.0));
    }
}
