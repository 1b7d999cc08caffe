//! Rendering pipeline: page leasing, the host-document bridge, raster capture
//! and document packaging.
//!
//! The browser itself sits behind [`PageSource`]; everything here is driven
//! through that seam so the pipeline can run against scripted pages in tests.

mod bridge;
mod document;
mod page;
mod pool;
mod raster;
mod service;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{CALL_VERSION, CallSize, ENTRY_POINT_FUNCTION, RenderCall, RenderReply};
pub use document::{PageGeometry, package_jpeg};
pub use page::{CaptureOptions, DiagramPage, PageSource, ROOT_SELECTOR};
pub use pool::{PageLease, PagePool};
pub use raster::{RasterCapture, intrinsic_size};
pub use service::DiagramRenderer;
pub use types::{
    BoundingBox, DiagramError, RenderError, RenderOutput, RenderRequest, RenderResult,
    ResourceError,
};
