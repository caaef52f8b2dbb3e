// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rendering configuration shared by every node of a render context.

use serde::{Deserialize, Serialize};

/// Default edge length, in texels, of a shader node's output texture
pub const PREVIEW_SIZE: u32 = 128;

/// Adapter selection preference for the headless GPU backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdapterPreference {
    /// Prefer integrated / power-saving adapters
    LowPower,
    /// Prefer discrete adapters
    #[default]
    HighPerformance,
}

/// Render settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Edge length of every shader node's square output texture
    pub preview_size: u32,
    /// Adapter power preference
    pub power_preference: AdapterPreference,
    /// Force a software adapter
    pub force_fallback_adapter: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            preview_size: PREVIEW_SIZE,
            power_preference: AdapterPreference::default(),
            force_fallback_adapter: false,
        }
    }
}

impl RenderSettings {
    /// Preview size clamped to at least one texel
    pub fn texture_size(&self) -> u32 {
        self.preview_size.max(1)
    }
}
