//! Render Layers
//!
//! Every diagram instance draws into three layers: a static background
//! (panels, terminals), a dynamic layer (wires the trainee has placed) and an
//! animated layer (current-flow effects). Layers are immutable values; the
//! cache swaps in a new layer whenever size or content changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kurbo::Size;

use super::draw::DrawBuffer;

/// How often a layer's content changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerRole {
    /// Rebuilt only when marked dirty
    Static,
    /// Rebuilt on every state change
    Dynamic,
    /// Rebuilt every frame while animations run
    Animated,
}

impl LayerRole {
    /// Suffix used for layer ids inside a layer set
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerRole::Static => "static",
            LayerRole::Dynamic => "dynamic",
            LayerRole::Animated => "animated",
        }
    }
}

impl std::fmt::Display for LayerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A render target with dirty tracking
#[derive(Debug, Clone, PartialEq)]
pub struct RenderLayer {
    pub id: String,
    pub role: LayerRole,
    pub size: Size,
    pub dirty: bool,
    /// Last committed draw commands, if any
    pub content: Option<Arc<DrawBuffer>>,
    pub created_at: DateTime<Utc>,
}

impl RenderLayer {
    /// Create a new, dirty, empty layer
    pub fn new(id: impl Into<String>, role: LayerRole, size: Size, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role,
            size,
            dirty: true,
            content: None,
            created_at: now,
        }
    }

    /// Copy of this layer with new content, marked clean
    pub fn with_content(&self, content: Arc<DrawBuffer>) -> Self {
        Self {
            content: Some(content),
            dirty: false,
            ..self.clone()
        }
    }

    /// Copy of this layer with the dirty flag set
    pub fn with_dirty(&self, dirty: bool) -> Self {
        Self {
            dirty,
            ..self.clone()
        }
    }
}

/// The three layers of one diagram instance
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSet {
    pub static_layer: RenderLayer,
    pub dynamic_layer: RenderLayer,
    pub animated_layer: RenderLayer,
}

impl LayerSet {
    /// Layer id for a role within a diagram
    pub fn layer_id(diagram_id: &str, role: LayerRole) -> String {
        format!("{}/{}", diagram_id, role)
    }

    /// Layers in draw order
    pub fn iter(&self) -> impl Iterator<Item = &RenderLayer> {
        [&self.static_layer, &self.dynamic_layer, &self.animated_layer].into_iter()
    }
}
