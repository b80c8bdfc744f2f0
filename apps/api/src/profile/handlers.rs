use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::derived::{
    ClusterAssignment, ProfileRecord, RecommendationRecord, VisualizationBundle,
};
use crate::profile::repair::repair_recommendations;
use crate::profile::submission::{submit_questionnaire, SubmissionRequest, SubmissionSnapshot};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub profile: Option<ProfileRecord>,
    pub cluster: Option<ClusterAssignment>,
    pub recommendations: Vec<RecommendationRecord>,
}

/// POST /api/v1/profile/submit
pub async fn handle_submit(
    State(state): State<AppState>,
    Json(request): Json<SubmissionRequest>,
) -> Result<Json<SubmissionSnapshot>, AppError> {
    let snapshot = submit_questionnaire(state.ml.clone(), state.store.clone(), request).await?;
    Ok(Json(snapshot))
}

/// GET /api/v1/profile
///
/// Returns the stored snapshot with repair applied: incomplete recommendation
/// records are regenerated in place when possible, and upstream trouble
/// during that repair degrades to the stored records instead of an error.
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ProfileResponse>, AppError> {
    let doc = state
        .store
        .load(params.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", params.user_id)))?;

    let recommendations =
        repair_recommendations(state.ml.as_ref(), state.store.as_ref(), params.user_id, &doc)
            .await?;

    Ok(Json(ProfileResponse {
        profile: doc.profile,
        cluster: doc.cluster,
        recommendations,
    }))
}

/// GET /api/v1/profile/visualization
pub async fn handle_get_visualization(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<VisualizationBundle>, AppError> {
    let bundle = state
        .viz_cache
        .fetch(state.ml.clone(), state.store.clone(), params.user_id)
        .await?;
    Ok(Json(bundle))
}

/// GET /api/v1/model-statistics, a read-through to the ML engine. No caching.
pub async fn handle_model_statistics(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state
        .ml
        .model_statistics()
        .await
        .map_err(|e| AppError::from_ml("model-statistics", e))?;
    Ok(Json(stats))
}
