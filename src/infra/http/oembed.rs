use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::{ARTIFACT_CACHE_CONTROL, HttpState};
use crate::application::{error::HttpError, oembed::OembedQuery};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct OembedParams {
    url: Option<String>,
    format: Option<String>,
    maxwidth: Option<String>,
    maxheight: Option<String>,
}

pub(super) async fn oembed(
    State(state): State<HttpState>,
    Query(params): Query<OembedParams>,
) -> Response {
    let query = OembedQuery {
        url: params.url,
        format: params.format,
        maxwidth: params.maxwidth,
        maxheight: params.maxheight,
    };

    match state.oembed.resolve(&query).await {
        Ok(metadata) => {
            let mut response = Json(metadata).into_response();
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static(ARTIFACT_CACHE_CONTROL));
            response
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}
