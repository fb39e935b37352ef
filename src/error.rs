use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// Validation messages are localized to Russian. Existing clients match on the
// exact text, so these strings must not be reworded.
pub const MSG_DUPLICATE_CATEGORY: &str = "Указанная категория уже есть в БД";
pub const MSG_DUPLICATE_GENRE: &str = "Указанный жанр уже есть в БД";
pub const MSG_DUPLICATE_TITLE: &str = "Такое произведение уже существует в БД";
pub const MSG_DUPLICATE_REVIEW: &str = "Ревью оставлять можно только один раз";
pub const MSG_RESERVED_USERNAME: &str =
    "Вы не можете использовать \"me\" в качестве имени пользователя.";
pub const MSG_WRONG_CODE: &str = "Введен неверный проверочный код.";
pub const MSG_FUTURE_YEAR: &str = "Год выпуска не может быть больше текущего.";
pub const MSG_SCORE_RANGE: &str = "Оценка должна быть целым числом от 1 до 10.";
pub const MSG_USERNAME_TAKEN: &str = "Пользователь с таким именем уже существует.";
pub const MSG_EMAIL_TAKEN: &str = "Пользователь с таким email уже существует.";
pub const MSG_UNKNOWN_GENRE: &str = "Жанр с указанным slug не найден.";
pub const MSG_UNKNOWN_CATEGORY: &str = "Категория с указанным slug не найдена.";

/// ErrorBody
///
/// The JSON body every error response carries: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub detail: String,
}

/// ApiError
///
/// The request-level error taxonomy: validation failures surface the exact
/// message, authorization failures stay deliberately uninformative, and
/// anything unexpected collapses to a generic 500 after being logged at the
/// point of failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Учетные данные не были предоставлены.")]
    Unauthorized,
    #[error("У вас недостаточно прав для выполнения данного действия.")]
    Forbidden,
    #[error("Страница не найдена.")]
    NotFound,
    #[error("Внутренняя ошибка сервера.")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// RepoError
///
/// Failures surfaced by the persistence layer. `Conflict` and `Invalid` carry
/// the client-facing message decided at the query site (which unique index or
/// slug lookup failed); everything else is a backend fault.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    /// A store-level unique constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    /// A referenced slug or record did not resolve; nothing was written.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict(msg) | RepoError::Invalid(msg) => ApiError::Validation(msg),
            RepoError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                ApiError::Internal
            }
        }
    }
}
