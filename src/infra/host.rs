//! Serves the host document and the diagramming library to the headless browser.
//!
//! The host page and its bootstrap module are embedded in the binary. Files
//! under `vendor/` are read from the configured library directory so the
//! library can be upgraded without rebuilding.

use std::{
    borrow::Cow,
    path::{Component, Path as FsPath, PathBuf},
    sync::Arc,
};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use include_dir::{Dir, include_dir};
use mime_guess::Mime;
use tracing::warn;

use crate::application::error::ErrorReport;

static HOST_DOCUMENT_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static/host");

const VENDOR_PREFIX: &str = "vendor/";
const SOURCE: &str = "infra::host::serve";

/// Location of the on-disk library files exposed under `vendor/`.
#[derive(Debug, Clone)]
pub struct HostAssets {
    library_dir: Arc<PathBuf>,
}

impl HostAssets {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Arc::new(library_dir.into()),
        }
    }

    async fn load(&self, candidate: &str) -> Result<Option<Asset>, StatusCode> {
        if let Some(relative) = candidate.strip_prefix(VENDOR_PREFIX) {
            return self.load_vendor(relative).await;
        }

        Ok(HOST_DOCUMENT_ASSETS.get_file(candidate).map(|file| Asset {
            contents: Cow::Borrowed(file.contents()),
            mime: guess_mime(FsPath::new(candidate)),
        }))
    }

    async fn load_vendor(&self, relative: &str) -> Result<Option<Asset>, StatusCode> {
        let Some(path) = confine(&self.library_dir, relative) else {
            return Ok(None);
        };

        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Some(Asset {
                contents: Cow::Owned(contents),
                mime: guess_mime(&path),
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                warn!(
                    target = "infra::host",
                    op = "host::load_vendor",
                    path = %path.display(),
                    error = %err,
                    "Failed to read library file"
                );
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Serve a host asset by its path below the host prefix.
pub async fn serve(State(assets): State<HostAssets>, path: Option<Path<String>>) -> Response {
    let candidate = path
        .map(|Path(value)| value.trim_start_matches('/').to_string())
        .unwrap_or_default();

    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
        return not_found_response();
    }

    match assets.load(&candidate).await {
        Ok(Some(asset)) => asset.into_response(),
        Ok(None) => not_found_response(),
        Err(status) => rejected_response(status),
    }
}

/// Join `relative` onto `root` when it contains only normal components.
fn confine(root: &FsPath, relative: &str) -> Option<PathBuf> {
    let relative = FsPath::new(relative);
    let mut components = relative.components().peekable();
    components.peek()?;
    if components.all(|component| matches!(component, Component::Normal(_))) {
        Some(root.join(relative))
    } else {
        None
    }
}

// Module scripts are refused by the browser unless served as JavaScript.
fn guess_mime(path: &FsPath) -> Mime {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mjs" | "js") => mime_guess::mime::TEXT_JAVASCRIPT,
        _ => mime_guess::from_path(path).first_or_octet_stream(),
    }
}

fn not_found_response() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(SOURCE, StatusCode::NOT_FOUND, "Host asset not found")
        .attach(&mut response);
    response
}

fn rejected_response(status: StatusCode) -> Response {
    let mut response = status.into_response();
    ErrorReport::from_message(SOURCE, status, "Host asset could not be read")
        .attach(&mut response);
    response
}

struct Asset {
    contents: Cow<'static, [u8]>,
    mime: Mime,
}

impl IntoResponse for Asset {
    fn into_response(self) -> Response {
        let bytes = match self.contents {
            Cow::Borrowed(slice) => Bytes::from_static(slice),
            Cow::Owned(bytes) => Bytes::from(bytes),
        };
        let len = bytes.len();
        let mut response = Response::new(Body::from(bytes));

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(self.mime.as_ref()) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
            headers.insert(header::CONTENT_LENGTH, value);
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        response
    }
}
