mod diagrams;
mod middleware;
mod oembed;

use axum::{
    Router,
    extract::FromRef,
    http::{Method, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
};

use crate::{
    application::{oembed::OembedService, render::DiagramRenderer},
    domain::params::ParamResolver,
    infra::host::{self, HostAssets},
};

use self::middleware::{log_responses, set_request_context};

/// Value attached to every rendered artifact.
const ARTIFACT_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Clone)]
pub struct HttpState {
    pub renderer: DiagramRenderer,
    pub resolver: ParamResolver,
    pub oembed: OembedService,
    pub host: HostAssets,
}

impl FromRef<HttpState> for HostAssets {
    fn from_ref(state: &HttpState) -> Self {
        state.host.clone()
    }
}

pub fn build_router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/svg/{code}", get(diagrams::svg))
        .route("/img/{code}", get(diagrams::img))
        .route("/pdf/{code}", get(diagrams::pdf))
        .route("/services/oembed", get(oembed::oembed))
        .route("/_host/{*path}", get(host::serve))
        .route("/_health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .layer(cors)
        .layer(CatchPanicLayer::new())
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
