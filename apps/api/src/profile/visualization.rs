//! Visualization cache manager.
//!
//! Per user the stored bundle is `Absent`, `Stale` or `Fresh`. Staleness is
//! detected structurally: a bundle with no recommended indices while
//! recommendations exist was generated for a different (or broken)
//! recommendation set, never via a stored version field. A `Fresh` bundle
//! is returned verbatim with zero upstream calls.
//!
//! This module is the only caller of `compute_visualization`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ml_client::{usable_career_id, MlGateway, WireVisualization};
use crate::models::derived::{DerivedState, RecommendationRecord, VisualizationBundle};
use crate::profile::store::DerivedStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Absent,
    Stale,
    Fresh,
}

/// Classifies the stored bundle against the current recommendations.
pub fn classify(state: &DerivedState) -> CacheState {
    match &state.visualization {
        None => CacheState::Absent,
        Some(bundle)
            if !state.recommendations.is_empty()
                && bundle.recommended_career_indices.is_empty() =>
        {
            CacheState::Stale
        }
        Some(_) => CacheState::Fresh,
    }
}

/// Career ids to highlight, in rank order, skipping records whose stored id
/// is empty or a string artifact. An empty result is valid: the upstream is
/// then asked for an unhighlighted layout.
pub fn recommended_career_ids(recommendations: &[RecommendationRecord]) -> Vec<String> {
    recommendations
        .iter()
        .filter_map(|rec| usable_career_id(&rec.career_id))
        .collect()
}

/// Promotes a wire response to a stored bundle, rejecting responses missing
/// the career coordinate arrays.
pub fn validate_bundle(wire: WireVisualization) -> Result<VisualizationBundle, AppError> {
    let (Some(careers_2d), Some(careers_3d)) = (wire.careers_2d, wire.careers_3d) else {
        return Err(AppError::UpstreamIncomplete {
            stage: "visualize",
            detail: "response is missing careers_2d/careers_3d".to_string(),
        });
    };
    Ok(VisualizationBundle {
        user_2d: wire.user_2d,
        user_3d: wire.user_3d,
        careers_2d,
        careers_3d,
        career_titles: wire.career_titles,
        recommended_career_indices: wire.recommended_career_indices,
        clusters_2d: wire.clusters_2d,
        clusters_3d: wire.clusters_3d,
        students_2d: wire.students_2d,
        students_3d: wire.students_3d,
        student_clusters: wire.student_clusters,
        last_generated: Utc::now(),
    })
}

/// Serves visualization requests from the stored bundle, regenerating on
/// `Absent`/`Stale`. Concurrent regenerations for the same user share one
/// upstream call through a per-user guard with a double-checked read.
pub struct VisualizationCache {
    inflight: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl VisualizationCache {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fetch(
        &self,
        ml: Arc<dyn MlGateway>,
        store: Arc<dyn DerivedStateStore>,
        user_id: Uuid,
    ) -> Result<VisualizationBundle, AppError> {
        let state = load_state(store.as_ref(), user_id).await?;
        ensure_vector(&state)?;

        if let Some(bundle) = fresh_bundle(&state) {
            return Ok(bundle);
        }

        let guard = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _held = guard.lock().await;

        // Every exit below must fall through to the removal, or a failed
        // fetch would strand the guard entry in the map.
        let result = async {
            // A concurrent caller may have regenerated while we waited.
            let state = load_state(store.as_ref(), user_id).await?;
            ensure_vector(&state)?;
            match fresh_bundle(&state) {
                Some(bundle) => Ok(bundle),
                None => regenerate(ml, store, user_id, state).await,
            }
        }
        .await;

        self.inflight.lock().await.remove(&user_id);
        result
    }
}

/// The stored bundle, but only when it is still valid for the current
/// recommendations.
fn fresh_bundle(state: &DerivedState) -> Option<VisualizationBundle> {
    match classify(state) {
        CacheState::Fresh => state.visualization.clone(),
        _ => None,
    }
}

impl Default for VisualizationCache {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_state(
    store: &dyn DerivedStateStore,
    user_id: Uuid,
) -> Result<DerivedState, AppError> {
    store
        .load(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
}

fn ensure_vector(state: &DerivedState) -> Result<(), AppError> {
    let has_vector = state
        .profile
        .as_ref()
        .is_some_and(|p| !p.combined_vector.is_empty());
    if has_vector {
        Ok(())
    } else {
        Err(AppError::ProfileIncomplete(
            "no combined vector on record; the questionnaire has not been completed".to_string(),
        ))
    }
}

/// Calls the upstream and persists the bundle. Runs on its own task so a
/// disconnected client cannot abandon the persist halfway.
async fn regenerate(
    ml: Arc<dyn MlGateway>,
    store: Arc<dyn DerivedStateStore>,
    user_id: Uuid,
    state: DerivedState,
) -> Result<VisualizationBundle, AppError> {
    let combined_vector = state
        .profile
        .as_ref()
        .map(|p| p.combined_vector.clone())
        .unwrap_or_default();
    let ids = recommended_career_ids(&state.recommendations);
    if ids.is_empty() && !state.recommendations.is_empty() {
        warn!(
            "user {user_id} has {} recommendations but no usable career ids; requesting unhighlighted layout",
            state.recommendations.len()
        );
    }

    let task = tokio::spawn(async move {
        let wire = ml
            .compute_visualization(&combined_vector, (!ids.is_empty()).then_some(ids.as_slice()))
            .await
            .map_err(|e| AppError::from_ml("visualize", e))?;
        let bundle = validate_bundle(wire)?;
        store.replace_visualization(user_id, &bundle).await?;
        info!(
            "Generated visualization for user {user_id} ({} careers, {} highlighted)",
            bundle.careers_2d.len(),
            bundle.recommended_career_indices.len()
        );
        Ok(bundle)
    });

    task.await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("visualization task failed: {e}")))?
}
