//! Structured call contract between the service and the host document's
//! `window.inkRender` entry point.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::page::{DiagramPage, locate_diagram};
use super::types::{BoundingBox, DiagramError, RenderError, ResourceError};
use crate::domain::params::RenderParams;

/// Revision of the call payload understood by `renderer.mjs`.
pub const CALL_VERSION: u32 = 1;

/// Function applied to the page's global object to reach the entry point.
///
/// The argument travels as a serialized protocol value, never as script text.
pub const ENTRY_POINT_FUNCTION: &str = r#"async function (call) {
  if (typeof window.inkRender !== 'function') {
    return { status: 'missing_entry_point' };
  }
  return await window.inkRender(call);
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallSize {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCall {
    pub version: u32,
    pub definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<CallSize>,
}

impl RenderCall {
    pub fn new(definition: &str, params: &RenderParams) -> Self {
        let size = (!params.size.is_unset()).then_some(CallSize {
            width: params.size.width,
            height: params.size.height,
        });

        Self {
            version: CALL_VERSION,
            definition: definition.to_string(),
            theme: params.theme.map(|theme| theme.as_str()),
            background_color: params
                .background
                .as_ref()
                .filter(|color| !color.is_empty())
                .cloned(),
            size,
        }
    }
}

/// Reply produced by the entry point. It never throws across the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderReply {
    Rendered,
    UnknownDiagram { message: String },
    Failed { message: String },
    MissingEntryPoint,
}

impl RenderReply {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ResourceError> {
        serde_json::from_value(value)
            .map_err(|err| ResourceError::entry_point(format!("unparseable reply: {err}")))
    }

    fn into_result(self) -> Result<(), RenderError> {
        match self {
            RenderReply::Rendered => Ok(()),
            RenderReply::UnknownDiagram { message } => {
                Err(DiagramError::UnknownDiagramType { message }.into())
            }
            RenderReply::Failed { message } => Err(DiagramError::Generic { message }.into()),
            RenderReply::MissingEntryPoint => Err(ResourceError::entry_point(
                "window.inkRender is not defined",
            )
            .into()),
        }
    }
}

/// Load the host document, render `call` into it and wait for the root element.
pub async fn render_diagram(
    page: &dyn DiagramPage,
    host_url: &str,
    call: &RenderCall,
    element_wait: Duration,
) -> Result<BoundingBox, RenderError> {
    page.open_host(host_url).await?;
    debug!(
        target = "application::render",
        stage = "host_loaded",
        host_url = host_url,
        "Host document loaded"
    );

    let reply = RenderReply::from_value(page.call_renderer(call).await?)?;
    reply.into_result()?;

    let bounds = locate_diagram(page, element_wait).await?;
    debug!(
        target = "application::render",
        stage = "diagram_rendered",
        width = bounds.width,
        height = bounds.height,
        "Diagram rendered in host document"
    );
    Ok(bounds)
}

/// Serialized markup of the rendered root element.
pub async fn diagram_markup(
    page: &dyn DiagramPage,
    element_wait: Duration,
) -> Result<String, ResourceError> {
    page.diagram_markup()
        .await?
        .ok_or(ResourceError::ElementMissing {
            selector: super::page::ROOT_SELECTOR,
            waited: element_wait,
        })
}
