//! Seam between the render pipeline and the browser that hosts the diagramming library.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::bridge::RenderCall;
use super::types::{BoundingBox, ResourceError};
use crate::domain::params::ImageType;

/// Selector of the root element produced by the host document.
pub const ROOT_SELECTOR: &str = "#container > svg";

/// Interval between lookups while waiting for the root element.
pub const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Screenshot settings for a single capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub image_type: ImageType,
    pub omit_background: bool,
    pub quality: Option<u8>,
}

/// One isolated, single-use page inside the rendering engine.
///
/// Implementations must tolerate `close` being called from a task other than
/// the one that drove the page.
#[async_trait]
pub trait DiagramPage: Send + Sync {
    /// Navigate to the host document and wait for it to load.
    async fn open_host(&self, url: &str) -> Result<(), ResourceError>;

    /// Invoke the host document's entry point with `call` and return its raw reply.
    async fn call_renderer(&self, call: &RenderCall) -> Result<serde_json::Value, ResourceError>;

    /// Box of the element matching [`ROOT_SELECTOR`], if it exists.
    async fn diagram_box(&self) -> Result<Option<BoundingBox>, ResourceError>;

    /// Serialized markup of the element matching [`ROOT_SELECTOR`], if it exists.
    async fn diagram_markup(&self) -> Result<Option<String>, ResourceError>;

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<(), ResourceError>;

    /// Capture the region `clip` of the page.
    async fn capture(
        &self,
        clip: BoundingBox,
        options: CaptureOptions,
    ) -> Result<Bytes, ResourceError>;

    async fn close(&self) -> Result<(), ResourceError>;
}

/// Opens fresh pages on demand.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn DiagramPage>, ResourceError>;
}

/// Poll for the root element until it appears or `wait` elapses.
pub async fn locate_diagram(
    page: &dyn DiagramPage,
    wait: Duration,
) -> Result<BoundingBox, ResourceError> {
    let lookup = async {
        loop {
            if let Some(bounds) = page.diagram_box().await? {
                return Ok::<_, ResourceError>(bounds);
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(wait, lookup).await {
        Ok(result) => result,
        Err(_) => Err(ResourceError::ElementMissing {
            selector: ROOT_SELECTOR,
            waited: wait,
        }),
    }
}
