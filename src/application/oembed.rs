//! oEmbed metadata for image URLs served by this service.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::application::render::{DiagramRenderer, RenderError};
use crate::domain::source::decode_source;

pub const DEFAULT_MAX_WIDTH: u32 = 800;
pub const DEFAULT_MAX_HEIGHT: u32 = 600;

/// Identity advertised in oEmbed responses and the canonical host accepted in URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OembedProvider {
    pub host: String,
    pub provider_name: String,
    pub provider_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OembedQuery {
    pub url: Option<String>,
    pub format: Option<String>,
    pub maxwidth: Option<String>,
    pub maxheight: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OembedResponse {
    pub version: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub provider_name: String,
    pub provider_url: String,
    pub url: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Error)]
pub enum OembedError {
    #[error("The requested format is not supported. Only json is supported.")]
    UnsupportedFormat { format: String },
    #[error("query \"url\" is required")]
    MissingUrl,
    #[error("{reason}")]
    NotFound { reason: String },
    #[error("invalid encoded code")]
    InvalidCode,
    #[error(transparent)]
    Render(RenderError),
}

impl OembedError {
    fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct OembedService {
    renderer: DiagramRenderer,
    provider: Arc<OembedProvider>,
}

impl OembedService {
    pub fn new(renderer: DiagramRenderer, provider: OembedProvider) -> Self {
        Self {
            renderer,
            provider: Arc::new(provider),
        }
    }

    pub async fn resolve(&self, query: &OembedQuery) -> Result<OembedResponse, OembedError> {
        if let Some(format) = query
            .format
            .as_deref()
            .filter(|format| !format.is_empty() && *format != "json")
        {
            return Err(OembedError::UnsupportedFormat {
                format: format.to_string(),
            });
        }

        let url = query
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(OembedError::MissingUrl)?;

        let max_width = parse_limit(query.maxwidth.as_deref(), DEFAULT_MAX_WIDTH);
        let max_height = parse_limit(query.maxheight.as_deref(), DEFAULT_MAX_HEIGHT);
        debug!(
            target = "application::oembed",
            max_width, max_height, "oEmbed size limits requested"
        );

        let code = self.extract_code(url)?;
        let source = decode_source(&code).map_err(|_| OembedError::InvalidCode)?;

        let bounds = self
            .renderer
            .natural_size(&source)
            .await
            .map_err(|err| match err {
                RenderError::Diagram(_) | RenderError::Validation(_) => OembedError::InvalidCode,
                other => OembedError::Render(other),
            })?;

        Ok(OembedResponse {
            version: "1.0",
            kind: "photo",
            provider_name: self.provider.provider_name.clone(),
            provider_url: self.provider.provider_url.clone(),
            url: url.to_string(),
            width: bounds.width,
            height: bounds.height,
        })
    }

    /// Validate `raw` against the canonical image URL shape and return its encoded code.
    pub fn extract_code(&self, raw: &str) -> Result<String, OembedError> {
        let url = Url::parse(raw).map_err(|_| OembedError::not_found("Invalid URL"))?;

        if url.scheme() != "https" {
            return Err(OembedError::not_found("URL protocol supported: https"));
        }
        let host_matches = url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.provider.host));
        if !host_matches {
            return Err(OembedError::not_found(format!(
                "URL hostname supported: {}",
                self.provider.host
            )));
        }

        image_code(url.path())
            .map(str::to_string)
            .ok_or_else(|| OembedError::not_found("URL pathname supported: /img/:code"))
    }
}

/// Match `/img/<code>` with an optional trailing slash.
fn image_code(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('/')?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let (prefix, code) = rest.split_once('/')?;
    if !prefix.eq_ignore_ascii_case("img") || code.is_empty() || code.contains('/') {
        return None;
    }
    Some(code)
}

fn parse_limit(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
