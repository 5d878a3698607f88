use actix_web::http::{header::ContentType, StatusCode};
use actix_web::{HttpResponse, ResponseError};

use crate::repo::RepoError;
use crate::views;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("unauthorized")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("bad request")] BadRequest,
    #[error("too many requests")] TooManyRequests,
    #[error("internal error")] Internal,
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => AppError::NotFound,
            RepoError::Conflict => AppError::Conflict,
            RepoError::Internal(msg) => {
                tracing::error!(error = %msg, "repository failure");
                AppError::Internal
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        tracing::error!(error = %e, "session token failure");
        AppError::Internal
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(e: argon2::password_hash::Error) -> Self {
        tracing::error!(error = %e, "password hashing failure");
        AppError::Internal
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status)
            .content_type(ContentType::html())
            .body(views::error_page(status.as_u16(), &self.to_string()))
    }
}
