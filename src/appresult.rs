use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<ChatError>() {
            Some(err) => err.status(),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{:?}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Failures of a single chat operation. None of these are fatal to the
/// service, and only the auth variants are fatal to a connection.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("missing bearer credential")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] jsonwebtoken::errors::Error),
    #[error("unsupported role {0:?}")]
    UnknownRole(String),

    #[error("only patients can open a room")]
    PatientsOnly,
    #[error("not a participant of room {0}")]
    NotParticipant(i64),

    #[error("room {0} not found")]
    RoomNotFound(i64),
    #[error("practitioner {0} not found")]
    PractitionerNotFound(i64),

    #[error("message body is empty")]
    EmptyMessage,

    // the source is logged, never shown to clients
    #[error("storage unavailable")]
    Storage(#[from] sqlx::Error),
    #[error("internal error")]
    Task(#[from] tokio::task::JoinError),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        use ChatError::*;
        match self {
            MissingCredential | InvalidCredential(_) | UnknownRole(_) => StatusCode::UNAUTHORIZED,
            PatientsOnly => StatusCode::FORBIDDEN,
            // participants and strangers see the same answer for a room
            NotParticipant(_) | RoomNotFound(_) | PractitionerNotFound(_) => StatusCode::NOT_FOUND,
            EmptyMessage => StatusCode::BAD_REQUEST,
            Storage(_) | Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_keep_their_status_through_anyhow() {
        let response = AppError::from(ChatError::PatientsOnly).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AppError::from(ChatError::NotParticipant(3)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::from(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn storage_detail_stays_out_of_the_message() {
        let err = ChatError::from(sqlx::Error::Protocol("no such table: messages".into()));
        assert_eq!(err.to_string(), "storage unavailable");
        assert!(format!("{err:?}").contains("no such table"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
