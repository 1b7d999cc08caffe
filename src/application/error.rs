use std::{borrow::Cow, error::Error as StdError};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        oembed::OembedError,
        render::{RenderError, ResourceError},
    },
    config::LoadError,
    domain::error::ValidationError,
    infra::error::InfraError,
};

/// Diagnostic attached to error responses for the response-logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: Cow<'static, str>,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<Cow<'static, str>>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            public_message: public_message.into(),
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<Cow<'static, str>>,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message: public_message.into(),
            report: ErrorReport::from_error(source, status, error),
        }
    }

    /// Client-attributable failure whose message is safe to show as-is.
    fn client(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        Self::from_error(source, status, error.to_string(), error)
    }

    fn internal(source: &'static str, error: &dyn StdError) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            error,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message.into_owned()).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<ValidationError> for HttpError {
    fn from(error: ValidationError) -> Self {
        HttpError::client(
            "infra::http::validation_error_to_http_error",
            StatusCode::BAD_REQUEST,
            &error,
        )
    }
}

impl From<RenderError> for HttpError {
    fn from(error: RenderError) -> Self {
        const SOURCE: &str = "infra::http::render_error_to_http_error";
        match &error {
            RenderError::Validation(_) | RenderError::Diagram(_) => {
                HttpError::client(SOURCE, StatusCode::BAD_REQUEST, &error)
            }
            RenderError::Saturated { .. } => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
            RenderError::Resource(_) => HttpError::internal(SOURCE, &error),
        }
    }
}

impl From<ResourceError> for HttpError {
    fn from(error: ResourceError) -> Self {
        HttpError::from(RenderError::from(error))
    }
}

impl From<OembedError> for HttpError {
    fn from(error: OembedError) -> Self {
        const SOURCE: &str = "infra::http::oembed_error_to_http_error";
        match error {
            OembedError::UnsupportedFormat { .. } => {
                HttpError::client(SOURCE, StatusCode::NOT_IMPLEMENTED, &error)
            }
            OembedError::MissingUrl | OembedError::InvalidCode => {
                HttpError::client(SOURCE, StatusCode::BAD_REQUEST, &error)
            }
            OembedError::NotFound { .. } => HttpError::client(SOURCE, StatusCode::NOT_FOUND, &error),
            OembedError::Render(inner) => HttpError::from(inner),
        }
    }
}

/// Failures that abort process startup or shutdown.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
