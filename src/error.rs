use crate::corrector::CorrectionError;
use crate::loader::LoadError;
use thiserror::Error;

/// Failures of the user table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Nom d'utilisateur et mot de passe requis")]
    EmptyField,

    #[error("Nom d'utilisateur déjà utilisé")]
    UsernameTaken,

    #[error("Nom d'utilisateur invalide (lettres, chiffres, '_', '-' et '.' uniquement)")]
    InvalidUsername,

    #[error("user store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("user store is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("password hashing failed")]
    Hash,
}

/// Errors surfaced by the upload service.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Non authentifié")]
    Unauthorized,

    #[error("Accès non autorisé")]
    Forbidden,

    #[error("Fichier introuvable")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Format non supporté ({0})")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Load(LoadError),

    #[error(transparent)]
    Correction(#[from] CorrectionError),

    #[error("language model failed: {0}")]
    Llm(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LoadError> for AppError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::UnsupportedFormat(what) => AppError::UnsupportedFormat(what),
            other => AppError::Load(other),
        }
    }
}

#[cfg(feature = "web")]
impl From<crate::llm::LlmError> for AppError {
    fn from(err: crate::llm::LlmError) -> Self {
        AppError::Llm(err.to_string())
    }
}

#[cfg(feature = "web")]
impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Io(std::io::Error::other(err))
    }
}

#[cfg(feature = "web")]
impl AppError {
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(feature = "web")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("request failed: {}", self);
        }
        (status, axum::Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
