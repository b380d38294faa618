//! Template renderer port
//!
//! Rendering and interpolation live outside the core; the engine hands the
//! renderer a template code, channel, locale, and payload and consumes the
//! rendered subject/body/metadata.

use async_trait::async_trait;
use thiserror::Error;

use crate::data::types::Metadata;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("render failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub code: String,
    /// Base channel the message will travel on
    pub channel: String,
    /// Requested locale; empty means the renderer default
    pub locale: String,
    pub data: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
    pub metadata: Metadata,
    /// Locale the renderer actually used
    pub locale: String,
}

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, request: RenderRequest) -> Result<Rendered, RenderError>;
}
