use crate::db::DbError;
use crate::ocr::OcrError;
use log::error;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported content type '{0}', expected image/jpeg")]
    UnsupportedMediaType(String),

    #[error("No image data received")]
    EmptyImage,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::EmptyImage
            | AppError::InvalidImage(_)
            | AppError::InvalidJson(_)
            | AppError::MissingFields(_) => StatusCode::BAD_REQUEST,
            AppError::Ocr(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OcrError> for AppError {
    fn from(e: OcrError) -> Self {
        AppError::Ocr(e.to_string())
    }
}

impl warp::reject::Reject for AppError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'a str,
    message: String,
}

/// Renders every rejection as a JSON error body.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(e) = err.find::<AppError>() {
        (e.status(), e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        (StatusCode::LENGTH_REQUIRED, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::MethodNotAllowed>() {
        (StatusCode::METHOD_NOT_ALLOWED, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Unhandled rejection".to_string(),
        )
    };

    let body = ErrorBody {
        status: "error",
        message,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
