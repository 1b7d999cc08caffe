use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::domain::{
    error::ValidationError,
    params::{ImageType, OutputFormat, RenderParams},
};

/// Box of the rendered root element in CSS pixels, relative to the page.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// A decoded diagram plus the resolved parameters and the artifact to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub source: String,
    pub params: RenderParams,
    pub format: OutputFormat,
}

impl RenderRequest {
    pub fn new(source: impl Into<String>, params: RenderParams, format: OutputFormat) -> Self {
        Self {
            source: source.into(),
            params,
            format,
        }
    }
}

/// Encoded artifact produced by a successful render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    Svg(String),
    Raster {
        bytes: Bytes,
        image_type: ImageType,
        width: u32,
        height: u32,
    },
    Document(Bytes),
}

impl RenderOutput {
    pub fn content_type(&self) -> &'static str {
        match self {
            RenderOutput::Svg(_) => "image/svg+xml",
            RenderOutput::Raster { image_type, .. } => image_type.mime(),
            RenderOutput::Document(_) => "application/pdf",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub output: RenderOutput,
    pub bounds: BoundingBox,
}

/// Rejections raised by the diagramming library. Both are caused by the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagramError {
    #[error("unknown diagram type: {message}")]
    UnknownDiagramType { message: String },
    #[error("{message}")]
    Generic { message: String },
}

impl DiagramError {
    pub fn kind(&self) -> &'static str {
        match self {
            DiagramError::UnknownDiagramType { .. } => "unknown_diagram",
            DiagramError::Generic { .. } => "diagram_failed",
        }
    }
}

/// Failures of the rendering environment itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("failed to open page: {message}")]
    OpenPage { message: String },
    #[error("failed to load host document {url}: {message}")]
    Navigation { url: String, message: String },
    #[error("renderer entry point unavailable: {message}")]
    EntryPoint { message: String },
    #[error("rendered element `{selector}` not found within {waited:?}")]
    ElementMissing {
        selector: &'static str,
        waited: Duration,
    },
    #[error("rendered element has an empty bounding box")]
    EmptyBounds,
    #[error("capture failed: {message}")]
    Capture { message: String },
    #[error("document packaging failed: {message}")]
    Document { message: String },
    #[error("browser protocol error: {message}")]
    Protocol { message: String },
}

impl ResourceError {
    pub fn open_page(message: impl Into<String>) -> Self {
        Self::OpenPage {
            message: message.into(),
        }
    }

    pub fn entry_point(message: impl Into<String>) -> Self {
        Self::EntryPoint {
            message: message.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::Capture {
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Diagram(#[from] DiagramError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("no rendering page became available within {waited:?}")]
    Saturated { waited: Duration },
}

impl RenderError {
    /// Metric label for this failure.
    pub fn label(&self) -> &'static str {
        match self {
            RenderError::Validation(_) => "invalid",
            RenderError::Diagram(inner) => inner.kind(),
            RenderError::Resource(_) => "resource_error",
            RenderError::Saturated { .. } => "saturated",
        }
    }
}
