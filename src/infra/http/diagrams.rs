//! Artifact routes: `/svg`, `/img` and `/pdf`.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;

use super::{ARTIFACT_CACHE_CONTROL, HttpState};
use crate::{
    application::{
        error::HttpError,
        render::{RenderOutput, RenderRequest},
    },
    domain::{
        params::{OutputFormat, RawRenderParams, RenderParams},
        source::decode_source,
    },
};

const PDF_DISPOSITION: &str = "inline; filename=diagram.pdf";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct DiagramQuery {
    theme: Option<String>,
    #[serde(rename = "backgroundColor")]
    background_color: Option<String>,
    #[serde(rename = "bgColor")]
    bg_color: Option<String>,
    width: Option<String>,
    height: Option<String>,
    scale: Option<String>,
    #[serde(rename = "type")]
    image_type: Option<String>,
}

impl From<DiagramQuery> for RawRenderParams {
    fn from(query: DiagramQuery) -> Self {
        RawRenderParams {
            theme: query.theme,
            background_color: query.background_color,
            bg_color: query.bg_color,
            width: query.width,
            height: query.height,
            scale: query.scale,
            image_type: query.image_type,
        }
    }
}

pub(super) async fn svg(
    State(state): State<HttpState>,
    Path(code): Path<String>,
    Query(query): Query<DiagramQuery>,
) -> Response {
    render(&state, &code, query, |_| OutputFormat::Svg).await
}

pub(super) async fn img(
    State(state): State<HttpState>,
    Path(code): Path<String>,
    Query(query): Query<DiagramQuery>,
) -> Response {
    render(&state, &code, query, |params| {
        OutputFormat::Image(params.image_type)
    })
    .await
}

pub(super) async fn pdf(
    State(state): State<HttpState>,
    Path(code): Path<String>,
    Query(query): Query<DiagramQuery>,
) -> Response {
    render(&state, &code, query, |_| OutputFormat::Pdf).await
}

async fn render(
    state: &HttpState,
    code: &str,
    query: DiagramQuery,
    format: impl FnOnce(&RenderParams) -> OutputFormat,
) -> Response {
    let request = match prepare(state, code, query, format) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    match state.renderer.render(&request).await {
        Ok(result) => artifact_response(result.output),
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn prepare(
    state: &HttpState,
    code: &str,
    query: DiagramQuery,
    format: impl FnOnce(&RenderParams) -> OutputFormat,
) -> Result<RenderRequest, HttpError> {
    let source = decode_source(code)?;
    let params = state.resolver.resolve(&RawRenderParams::from(query))?;
    let format = format(&params);
    Ok(RenderRequest::new(source, params, format))
}

fn artifact_response(output: RenderOutput) -> Response {
    let content_type = output.content_type();
    match output {
        RenderOutput::Svg(markup) => {
            let mut response = Response::new(Body::from(markup));
            insert_common_headers(&mut response, content_type);
            response
        }
        RenderOutput::Raster { bytes, .. } => binary_response(bytes, content_type),
        RenderOutput::Document(bytes) => {
            let mut response = binary_response(bytes, content_type);
            response
                .headers_mut()
                .insert(CONTENT_DISPOSITION, HeaderValue::from_static(PDF_DISPOSITION));
            response
        }
    }
}

fn binary_response(bytes: Bytes, content_type: &'static str) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    insert_common_headers(&mut response, content_type);
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        response.headers_mut().insert(CONTENT_LENGTH, value);
    }
    response
}

fn insert_common_headers(response: &mut Response, content_type: &'static str) {
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(ARTIFACT_CACHE_CONTROL));
}
