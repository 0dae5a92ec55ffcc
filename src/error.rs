use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
    #[error("invalid {key}: {message}")]
    Config { key: &'static str, message: String },
    #[error("Cannot {method} {path}")]
    RouteNotFound { method: String, path: String },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let error = match self {
            Error::RouteNotFound { .. } => "Route not found",
            _ => "Something went wrong!",
        };

        (
            self.status(),
            Json(json!({ "error": error, "message": self.to_string() })),
        )
            .into_response()
    }
}
