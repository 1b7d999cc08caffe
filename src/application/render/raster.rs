//! Screenshot capture of the rendered root element.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::page::{CaptureOptions, DiagramPage, locate_diagram};
use super::types::{BoundingBox, ResourceError};
use crate::domain::params::{ImageType, RenderParams};

#[derive(Debug, Clone, PartialEq)]
pub struct RasterCapture {
    pub bytes: Bytes,
    pub image_type: ImageType,
    /// Intrinsic pixel dimensions read from the encoded header.
    pub width: u32,
    pub height: u32,
    pub bounds: BoundingBox,
}

/// Box of the root element, rejecting boxes without area.
pub async fn measure_diagram(
    page: &dyn DiagramPage,
    element_wait: Duration,
) -> Result<BoundingBox, ResourceError> {
    let bounds = locate_diagram(page, element_wait).await?;
    if !bounds.has_area() {
        return Err(ResourceError::EmptyBounds);
    }
    Ok(bounds)
}

/// Capture the rendered diagram as `image_type`.
///
/// When both dimensions were requested the viewport is resized first; the
/// capture region is always the root element's box. A transparent background
/// is only honoured by encodings with an alpha channel; JPEG captures keep the
/// page backdrop.
pub async fn capture_raster(
    page: &dyn DiagramPage,
    params: &RenderParams,
    image_type: ImageType,
    quality: Option<u8>,
    element_wait: Duration,
) -> Result<RasterCapture, ResourceError> {
    if let Some((width, height)) = params.size.both() {
        page.resize_viewport(width, height).await?;
    }

    let bounds = measure_diagram(page, element_wait).await?;
    let options = CaptureOptions {
        image_type,
        omit_background: params.omits_background() && image_type.supports_alpha(),
        quality,
    };
    let bytes = page.capture(bounds, options).await?;
    let (width, height) = intrinsic_size(&bytes)?;

    debug!(
        target = "application::render",
        stage = "raster_captured",
        image_type = image_type.as_str(),
        width,
        height,
        bytes = bytes.len(),
        "Diagram captured"
    );

    Ok(RasterCapture {
        bytes,
        image_type,
        width,
        height,
        bounds,
    })
}

pub fn intrinsic_size(bytes: &[u8]) -> Result<(u32, u32), ResourceError> {
    let size = imagesize::blob_size(bytes)
        .map_err(|err| ResourceError::capture(format!("unreadable image header: {err}")))?;
    let width = u32::try_from(size.width)
        .map_err(|_| ResourceError::capture("image width out of range"))?;
    let height = u32::try_from(size.height)
        .map_err(|_| ResourceError::capture("image height out of range"))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::testing::{PageScript, ScriptedPage, png_fixture};
    use crate::domain::params::RenderSize;

    const WAIT: Duration = Duration::from_millis(40);

    #[tokio::test]
    async fn captures_root_box_without_resizing() {
        let page = ScriptedPage::new(PageScript::rendered());
        let capture = capture_raster(&page, &RenderParams::natural(), ImageType::Png, None, WAIT)
            .await
            .expect("capture");

        let log = page.log();
        assert!(log.resizes.is_empty());
        assert_eq!(log.captures.len(), 1);
        assert_eq!(log.captures[0].0, capture.bounds);
        assert!(!log.captures[0].1.omit_background);
        assert_eq!((capture.width, capture.height), (320, 180));
    }

    #[tokio::test]
    async fn resizes_viewport_only_when_both_dimensions_set() {
        let page = ScriptedPage::new(PageScript::rendered());
        let params = RenderParams {
            size: RenderSize {
                width: Some(640),
                height: None,
            },
            ..RenderParams::natural()
        };
        capture_raster(&page, &params, ImageType::Png, None, WAIT)
            .await
            .expect("capture");
        assert!(page.log().resizes.is_empty());

        let page = ScriptedPage::new(PageScript::rendered());
        let params = RenderParams {
            size: RenderSize {
                width: Some(640),
                height: Some(480),
            },
            ..RenderParams::natural()
        };
        let capture = capture_raster(&page, &params, ImageType::Png, None, WAIT)
            .await
            .expect("capture");
        assert_eq!(page.log().resizes, vec![(640, 480)]);
        assert_eq!((capture.width, capture.height), (640, 480));
    }

    #[tokio::test]
    async fn transparent_background_omits_backdrop() {
        let page = ScriptedPage::new(PageScript::rendered());
        let params = RenderParams {
            background: Some("transparent".to_string()),
            ..RenderParams::natural()
        };
        capture_raster(&page, &params, ImageType::Webp, None, WAIT)
            .await
            .expect("capture");
        let (_, options) = page.log().captures[0];
        assert!(options.omit_background);
        assert_eq!(options.image_type, ImageType::Webp);

        let page = ScriptedPage::new(PageScript::rendered());
        let params = RenderParams {
            background: Some("Transparent".to_string()),
            ..RenderParams::natural()
        };
        capture_raster(&page, &params, ImageType::Png, None, WAIT)
            .await
            .expect("capture");
        assert!(!page.log().captures[0].1.omit_background);
    }

    #[tokio::test]
    async fn jpeg_capture_keeps_backdrop_when_transparent() {
        let page = ScriptedPage::new(PageScript::rendered());
        let params = RenderParams {
            background: Some("transparent".to_string()),
            ..RenderParams::natural()
        };
        capture_raster(&page, &params, ImageType::Jpeg, Some(80), WAIT)
            .await
            .expect("capture");
        let (_, options) = page.log().captures[0];
        assert_eq!(options.image_type, ImageType::Jpeg);
        assert!(!options.omit_background);
    }

    #[tokio::test]
    async fn zero_area_box_is_a_resource_error() {
        let page = ScriptedPage::new(PageScript {
            bounds: Some(BoundingBox::default()),
            ..PageScript::rendered()
        });
        let err = capture_raster(&page, &RenderParams::natural(), ImageType::Png, None, WAIT)
            .await
            .expect_err("empty box");
        assert_eq!(err, ResourceError::EmptyBounds);
        assert!(page.log().captures.is_empty());
    }

    #[tokio::test]
    async fn capture_failure_propagates() {
        let page = ScriptedPage::new(PageScript {
            fail_capture: true,
            ..PageScript::rendered()
        });
        let err = capture_raster(&page, &RenderParams::natural(), ImageType::Png, None, WAIT)
            .await
            .expect_err("capture fails");
        assert!(matches!(err, ResourceError::Capture { .. }));
    }

    #[test]
    fn intrinsic_size_reads_png_header() {
        assert_eq!(intrinsic_size(&png_fixture(1024, 77)).expect("png"), (1024, 77));
        assert!(intrinsic_size(b"not an image").is_err());
    }
}
