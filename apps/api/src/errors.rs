use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ml_client::MlError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// The three upstream variants carry the pipeline stage that failed
/// ("profile", "cluster", "recommend", "visualize", "model-statistics") so a
/// failed submission reports where it broke.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Profile incomplete: {0}")]
    ProfileIncomplete(String),

    #[error("ML engine unreachable during {stage}: {detail}")]
    UpstreamUnavailable { stage: &'static str, detail: String },

    #[error("ML engine error during {stage} (status {status}): {detail}")]
    Upstream {
        stage: &'static str,
        status: u16,
        detail: String,
    },

    #[error("ML engine returned incomplete data during {stage}: {detail}")]
    UpstreamIncomplete { stage: &'static str, detail: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Translates a gateway error into the application taxonomy, tagging it
    /// with the pipeline stage that made the call.
    pub fn from_ml(stage: &'static str, err: MlError) -> Self {
        match err {
            MlError::Unavailable(detail) => AppError::UpstreamUnavailable { stage, detail },
            MlError::Api { status, message } => AppError::Upstream {
                stage,
                status,
                detail: message,
            },
            MlError::Parse(e) => AppError::UpstreamIncomplete {
                stage,
                detail: e.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, hint) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::ProfileIncomplete(msg) => (
                StatusCode::BAD_REQUEST,
                "PROFILE_INCOMPLETE",
                msg.clone(),
                Some("Submit the questionnaire before requesting derived results.".to_string()),
            ),
            AppError::UpstreamUnavailable { stage, detail } => {
                tracing::error!("ML engine unreachable during {stage}: {detail}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "ML_ENGINE_UNAVAILABLE",
                    format!("The ML engine could not be reached during {stage}"),
                    Some(
                        "Ensure the ML engine is running and reachable at ML_ENGINE_URL."
                            .to_string(),
                    ),
                )
            }
            AppError::Upstream { stage, status, detail } => {
                tracing::error!("ML engine error during {stage} (status {status}): {detail}");
                (
                    StatusCode::BAD_GATEWAY,
                    "ML_ENGINE_ERROR",
                    format!("The ML engine failed during {stage}"),
                    None,
                )
            }
            AppError::UpstreamIncomplete { stage, detail } => {
                tracing::error!("ML engine returned incomplete data during {stage}: {detail}");
                (
                    StatusCode::BAD_GATEWAY,
                    "ML_ENGINE_INCOMPLETE_DATA",
                    format!("The ML engine returned incomplete data during {stage}"),
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(hint) = hint {
            error["hint"] = json!(hint);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
