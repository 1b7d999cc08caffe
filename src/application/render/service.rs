use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use super::bridge::{RenderCall, diagram_markup, render_diagram};
use super::document::{DOCUMENT_JPEG_QUALITY, PageGeometry, package_jpeg};
use super::page::DiagramPage;
use super::pool::PagePool;
use super::raster::{capture_raster, measure_diagram};
use super::types::{BoundingBox, RenderError, RenderOutput, RenderRequest, RenderResult};
use crate::domain::params::{ImageType, OutputFormat, RenderParams};

/// Drives one request through lease, bridge, output stage and release.
#[derive(Clone)]
pub struct DiagramRenderer {
    pool: PagePool,
    host_url: Arc<str>,
    element_wait: Duration,
}

impl DiagramRenderer {
    pub fn new(pool: PagePool, host_url: impl Into<Arc<str>>, element_wait: Duration) -> Self {
        Self {
            pool,
            host_url: host_url.into(),
            element_wait,
        }
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        let started_at = Instant::now();
        let format = request.format.label();

        let result = self.render_leased(request).await;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.label(),
        };
        counter!("mermaid_ink_render_total", "format" => format, "result" => outcome)
            .increment(1);
        histogram!("mermaid_ink_render_ms", "format" => format).record(elapsed_ms as f64);

        match &result {
            Ok(rendered) => info!(
                target = "application::render",
                op = "render",
                result = "ok",
                format = format,
                elapsed_ms = elapsed_ms,
                source_bytes = request.source.len(),
                width = rendered.bounds.width,
                height = rendered.bounds.height,
                "Diagram rendered"
            ),
            Err(err) => warn!(
                target = "application::render",
                op = "render",
                result = outcome,
                format = format,
                elapsed_ms = elapsed_ms,
                error = %err,
                "Diagram render failed"
            ),
        }

        result
    }

    /// Render `source` with library defaults and measure the root element.
    pub async fn natural_size(&self, source: &str) -> Result<BoundingBox, RenderError> {
        let lease = self.pool.acquire().await?;
        let outcome = self.measure(lease.page(), source).await;
        lease.release().await;
        outcome
    }

    async fn render_leased(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        let lease = self.pool.acquire().await?;
        let outcome = self.produce(lease.page(), request).await;
        lease.release().await;
        outcome
    }

    async fn measure(&self, page: &dyn DiagramPage, source: &str) -> Result<BoundingBox, RenderError> {
        let call = RenderCall::new(source, &RenderParams::natural());
        render_diagram(page, &self.host_url, &call, self.element_wait).await?;
        Ok(measure_diagram(page, self.element_wait).await?)
    }

    async fn produce(
        &self,
        page: &dyn DiagramPage,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        let call = RenderCall::new(&request.source, &request.params);
        let bounds = render_diagram(page, &self.host_url, &call, self.element_wait).await?;

        match request.format {
            OutputFormat::Svg => {
                let markup = diagram_markup(page, self.element_wait).await?;
                Ok(RenderResult {
                    output: RenderOutput::Svg(markup),
                    bounds,
                })
            }
            OutputFormat::Image(image_type) => {
                let capture =
                    capture_raster(page, &request.params, image_type, None, self.element_wait)
                        .await?;
                Ok(RenderResult {
                    output: RenderOutput::Raster {
                        bytes: capture.bytes,
                        image_type: capture.image_type,
                        width: capture.width,
                        height: capture.height,
                    },
                    bounds: capture.bounds,
                })
            }
            OutputFormat::Pdf => {
                let capture = capture_raster(
                    page,
                    &request.params,
                    ImageType::Jpeg,
                    Some(DOCUMENT_JPEG_QUALITY),
                    self.element_wait,
                )
                .await?;
                let geometry =
                    PageGeometry::compute(request.params.size, capture.width, capture.height);
                let bytes = package_jpeg(&capture.bytes, capture.width, capture.height, &geometry)?;
                debug!(
                    target = "application::render",
                    stage = "document_packaged",
                    page_width = geometry.page_width,
                    page_height = geometry.page_height,
                    bytes = bytes.len(),
                    "Diagram packaged as document"
                );
                Ok(RenderResult {
                    output: RenderOutput::Document(bytes),
                    bounds: capture.bounds,
                })
            }
        }
    }
}
