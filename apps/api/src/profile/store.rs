//! Derived-state persistence.
//!
//! The user's derived-state record is the only shared mutable resource in
//! this service. All writes replace a whole subtree, `profile` + `cluster`
//! + `recommendations` as a set, or `visualization` alone, never individual
//! fields, so concurrent writers degrade to last-writer-wins on complete,
//! self-consistent snapshots.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::derived::{
    ClusterAssignment, DerivedState, ProfileRecord, RecommendationRecord, VisualizationBundle,
};

/// Repository seam for the per-user derived-state document. Injected as
/// `Arc<dyn DerivedStateStore>` so the engine never touches ambient globals.
#[async_trait]
pub trait DerivedStateStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<Option<DerivedState>, AppError>;

    /// Replaces `profile`, `cluster` and `recommendations` wholesale and
    /// installs `visualization` as the new cache entry, all in one commit.
    async fn replace_submission(
        &self,
        user_id: Uuid,
        profile: &ProfileRecord,
        cluster: &ClusterAssignment,
        recommendations: &[RecommendationRecord],
        visualization: &VisualizationBundle,
    ) -> Result<(), AppError>;

    /// Replaces the `recommendations` subtree wholesale. Clears
    /// `visualization`: a stored bundle is only valid for the
    /// recommendation set it was generated from.
    async fn replace_recommendations(
        &self,
        user_id: Uuid,
        recommendations: &[RecommendationRecord],
    ) -> Result<(), AppError>;

    /// Replaces the `visualization` subtree alone.
    async fn replace_visualization(
        &self,
        user_id: Uuid,
        bundle: &VisualizationBundle,
    ) -> Result<(), AppError>;
}

/// Postgres-backed store: one row per user in `derived_state`, the four
/// subtrees as JSONB columns (see migrations/0001_derived_state.sql).
pub struct PgDerivedStateStore {
    pool: PgPool,
}

impl PgDerivedStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("derived-state serialization: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("derived-state deserialization: {e}")))
}

type StateRow = (
    Option<serde_json::Value>,
    Option<serde_json::Value>,
    serde_json::Value,
    Option<serde_json::Value>,
);

#[async_trait]
impl DerivedStateStore for PgDerivedStateStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<DerivedState>, AppError> {
        let row: Option<StateRow> = sqlx::query_as(
            "SELECT profile, cluster, recommendations, visualization
             FROM derived_state WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((profile, cluster, recommendations, visualization)) = row else {
            return Ok(None);
        };

        Ok(Some(DerivedState {
            profile: profile.map(from_json).transpose()?,
            cluster: cluster.map(from_json).transpose()?,
            recommendations: from_json(recommendations)?,
            visualization: visualization.map(from_json).transpose()?,
        }))
    }

    async fn replace_submission(
        &self,
        user_id: Uuid,
        profile: &ProfileRecord,
        cluster: &ClusterAssignment,
        recommendations: &[RecommendationRecord],
        visualization: &VisualizationBundle,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO derived_state (user_id, profile, cluster, recommendations, visualization, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (user_id) DO UPDATE
            SET profile = EXCLUDED.profile,
                cluster = EXCLUDED.cluster,
                recommendations = EXCLUDED.recommendations,
                visualization = EXCLUDED.visualization,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(to_json(profile)?)
        .bind(to_json(cluster)?)
        .bind(to_json(&recommendations)?)
        .bind(to_json(visualization)?)
        .execute(&self.pool)
        .await?;

        info!(
            "Replaced derived state for user {user_id} ({} recommendations)",
            recommendations.len()
        );
        Ok(())
    }

    async fn replace_recommendations(
        &self,
        user_id: Uuid,
        recommendations: &[RecommendationRecord],
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE derived_state
             SET recommendations = $2, visualization = NULL, updated_at = now()
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(to_json(&recommendations)?)
        .execute(&self.pool)
        .await?;

        info!(
            "Replaced {} recommendations for user {user_id} (visualization invalidated)",
            recommendations.len()
        );
        Ok(())
    }

    async fn replace_visualization(
        &self,
        user_id: Uuid,
        bundle: &VisualizationBundle,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE derived_state
             SET visualization = $2, updated_at = now()
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(to_json(bundle)?)
        .execute(&self.pool)
        .await?;

        info!("Stored visualization bundle for user {user_id}");
        Ok(())
    }
}

/// In-memory store used by the unit tests.
#[cfg(test)]
pub struct MemoryStore {
    states: tokio::sync::RwLock<std::collections::HashMap<Uuid, DerivedState>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            states: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub async fn seed(&self, user_id: Uuid, state: DerivedState) {
        self.states.write().await.insert(user_id, state);
    }
}

#[cfg(test)]
#[async_trait]
impl DerivedStateStore for MemoryStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<DerivedState>, AppError> {
        Ok(self.states.read().await.get(&user_id).cloned())
    }

    async fn replace_submission(
        &self,
        user_id: Uuid,
        profile: &ProfileRecord,
        cluster: &ClusterAssignment,
        recommendations: &[RecommendationRecord],
        visualization: &VisualizationBundle,
    ) -> Result<(), AppError> {
        self.states.write().await.insert(
            user_id,
            DerivedState {
                profile: Some(profile.clone()),
                cluster: Some(cluster.clone()),
                recommendations: recommendations.to_vec(),
                visualization: Some(visualization.clone()),
            },
        );
        Ok(())
    }

    async fn replace_recommendations(
        &self,
        user_id: Uuid,
        recommendations: &[RecommendationRecord],
    ) -> Result<(), AppError> {
        let mut states = self.states.write().await;
        let state = states.entry(user_id).or_default();
        state.recommendations = recommendations.to_vec();
        state.visualization = None;
        Ok(())
    }

    async fn replace_visualization(
        &self,
        user_id: Uuid,
        bundle: &VisualizationBundle,
    ) -> Result<(), AppError> {
        let mut states = self.states.write().await;
        let state = states.entry(user_id).or_default();
        state.visualization = Some(bundle.clone());
        Ok(())
    }
}
