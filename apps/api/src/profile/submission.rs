//! Questionnaire submission: one linear pipeline with no partial commit.
//!
//! profile → cluster → normalize skills → recommend → visualize → persist.
//! A failure at any stage aborts the whole submission and leaves the prior
//! derived-state record untouched; the error names the stage that failed.
//! The single persist replaces all three derived subtrees and installs the
//! freshly computed bundle as the new visualization cache entry.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ml_client::{MlGateway, QuestionnaireResponses};
use crate::models::derived::{
    ClusterAssignment, ProfileRecord, RawResponses, RecommendationRecord, VisualizationBundle,
};
use crate::profile::skills::normalize_skills;
use crate::profile::store::DerivedStateStore;
use crate::profile::visualization::{recommended_career_ids, validate_bundle};

const TOP_K: usize = 5;

#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub riasec_responses: RawResponses,
    #[serde(default)]
    pub skill_responses: RawResponses,
    #[serde(default)]
    pub subject_preferences: RawResponses,
}

/// The complete snapshot computed by a submission, echoed to the client so
/// it can render without a follow-up fetch.
#[derive(Debug, Serialize)]
pub struct SubmissionSnapshot {
    pub profile: ProfileRecord,
    pub cluster: ClusterAssignment,
    pub recommendations: Vec<RecommendationRecord>,
    pub visualization: VisualizationBundle,
}

/// Runs the full submission pipeline and commits the snapshot.
///
/// The pipeline body runs on its own task: a client that disconnects
/// mid-submission cannot leave the derived-state record half-written; the
/// in-flight upstream calls and the final persist run to completion and the
/// response is simply discarded.
pub async fn submit_questionnaire(
    ml: Arc<dyn MlGateway>,
    store: Arc<dyn DerivedStateStore>,
    request: SubmissionRequest,
) -> Result<SubmissionSnapshot, AppError> {
    if request.riasec_responses.is_empty() {
        return Err(AppError::Validation(
            "riasec_responses must not be empty".to_string(),
        ));
    }

    let task = tokio::spawn(run_pipeline(ml, store, request));
    task.await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("submission task failed: {e}")))?
}

async fn run_pipeline(
    ml: Arc<dyn MlGateway>,
    store: Arc<dyn DerivedStateStore>,
    request: SubmissionRequest,
) -> Result<SubmissionSnapshot, AppError> {
    let user_id = request.user_id;
    info!("Processing questionnaire submission for user {user_id}");

    let responses = QuestionnaireResponses {
        riasec_responses: request.riasec_responses.clone(),
        skill_responses: request.skill_responses.clone(),
        subject_preferences: request.subject_preferences.clone(),
    };
    let vectors = ml
        .compute_profile(&responses)
        .await
        .map_err(|e| AppError::from_ml("profile", e))?;

    let cluster = ml
        .compute_cluster(&vectors.combined_vector)
        .await
        .map_err(|e| AppError::from_ml("cluster", e))?;

    // Skill source precedence: the processed skills from the profile
    // response, falling back to the raw questionnaire answers.
    let raw_skills = if vectors.skills.is_empty() {
        request.skill_responses.clone()
    } else {
        vectors.skills.clone()
    };
    let user_skills = normalize_skills(&raw_skills);
    if user_skills.is_empty() {
        warn!("user {user_id} has no usable skill data; skill gaps will be empty");
    }

    let items = ml
        .compute_recommendations(&vectors.combined_vector, &user_skills, TOP_K)
        .await
        .map_err(|e| AppError::from_ml("recommend", e))?;

    let now = Utc::now();
    let recommendations: Vec<RecommendationRecord> = items
        .iter()
        .map(|item| RecommendationRecord::from_wire(item, now))
        .collect();
    for rec in recommendations.iter().filter(|r| r.career_id.is_empty()) {
        warn!(
            "recommendation '{}' for user {user_id} has no usable career id; it cannot be highlighted",
            rec.title
        );
    }

    let ids = recommended_career_ids(&recommendations);
    let wire = ml
        .compute_visualization(&vectors.combined_vector, (!ids.is_empty()).then_some(ids.as_slice()))
        .await
        .map_err(|e| AppError::from_ml("visualize", e))?;
    let visualization = validate_bundle(wire)?;

    let profile = ProfileRecord {
        riasec_responses: request.riasec_responses,
        skill_responses: request.skill_responses,
        subject_preferences: request.subject_preferences,
        riasec_profile: vectors.riasec_profile,
        riasec_vector: vectors.riasec_vector,
        skill_vector: vectors.skill_vector,
        subject_vector: vectors.subject_vector,
        combined_vector: vectors.combined_vector,
        skills: raw_skills,
        last_updated: now,
    };

    store
        .replace_submission(user_id, &profile, &cluster, &recommendations, &visualization)
        .await?;

    info!(
        "Submission committed for user {user_id}: cluster '{}', {} recommendations",
        cluster.cluster_name,
        recommendations.len()
    );

    Ok(SubmissionSnapshot {
        profile,
        cluster,
        recommendations,
        visualization,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use crate::models::derived::DerivedState;
    use crate::profile::repair::is_complete;
    use crate::profile::store::MemoryStore;
    use crate::profile::testing::{
        complete_record, sample_cluster, sample_profile_record, sample_vectors, stored_bundle,
        wire_recommendation, wire_visualization, ScriptedGateway,
    };
    use crate::profile::visualization::{classify, CacheState};

    fn request(user_id: Uuid) -> SubmissionRequest {
        let answers: RawResponses = (1..=5)
            .map(|i| (format!("q{i}"), json!(4)))
            .collect();
        SubmissionRequest {
            user_id,
            riasec_responses: answers.clone(),
            skill_responses: answers.clone(),
            subject_preferences: answers,
        }
    }

    fn happy_gateway() -> ScriptedGateway {
        ScriptedGateway {
            profile_response: Some(sample_vectors()),
            cluster_response: Some(sample_cluster()),
            recommend_response: Some(vec![
                wire_recommendation("c0", "Engineer"),
                wire_recommendation("c1", "Nurse"),
                wire_recommendation("c2", "Teacher"),
                wire_recommendation("c3", "Designer"),
                wire_recommendation("c4", "Analyst"),
            ]),
            visualize_response: Some(wire_visualization(10, vec![0, 1, 2, 3, 4])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn full_submission_produces_a_complete_snapshot() {
        let gateway = Arc::new(happy_gateway());
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();

        let snapshot = submit_questionnaire(gateway.clone(), store.clone(), request(user_id))
            .await
            .unwrap();

        assert_eq!(snapshot.profile.combined_vector.len(), 20);
        assert_eq!(snapshot.recommendations.len(), 5);
        assert!(snapshot.recommendations.iter().all(is_complete));
        assert!(snapshot.visualization.recommended_career_indices.len() <= 5);

        let stored = store.load(user_id).await.unwrap().unwrap();
        assert_eq!(stored.recommendations, snapshot.recommendations);
        assert_eq!(classify(&stored), CacheState::Fresh);
        // The gateway was asked to highlight the five stored career ids.
        let ids = gateway.last_visualize_ids.lock().unwrap().clone().unwrap();
        assert_eq!(ids.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn empty_riasec_responses_are_rejected_before_any_upstream_call() {
        let gateway = Arc::new(happy_gateway());
        let store = Arc::new(MemoryStore::new());
        let mut req = request(Uuid::new_v4());
        req.riasec_responses.clear();

        let err = submit_questionnaire(gateway.clone(), store, req)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(gateway.profile_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mid_pipeline_failure_leaves_prior_state_untouched() {
        let gateway = Arc::new(ScriptedGateway {
            fail_stage: Some("recommend"),
            ..happy_gateway()
        });
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        let prior = DerivedState {
            profile: Some(sample_profile_record()),
            cluster: Some(sample_cluster()),
            recommendations: vec![complete_record("old", "Old Career")],
            visualization: Some(stored_bundle(vec![0])),
        };
        store.seed(user_id, prior.clone()).await;

        let err = submit_questionnaire(gateway.clone(), store.clone(), request(user_id))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::UpstreamUnavailable { stage: "recommend", .. }
        ));
        assert_eq!(gateway.visualize_calls.load(Ordering::SeqCst), 0);
        let after = store.load(user_id).await.unwrap().unwrap();
        assert_eq!(after.recommendations, prior.recommendations);
        assert_eq!(after.visualization, prior.visualization);
    }

    #[tokio::test]
    async fn incomplete_visualization_response_aborts_the_submission() {
        let mut gateway = happy_gateway();
        gateway.visualize_response = Some(crate::ml_client::WireVisualization::default());
        let gateway = Arc::new(gateway);
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();

        let err = submit_questionnaire(gateway, store.clone(), request(user_id))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::UpstreamIncomplete { stage: "visualize", .. }
        ));
        assert!(store.load(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resubmission_replaces_recommendations_wholesale() {
        let gateway = Arc::new(happy_gateway());
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        let prior = DerivedState {
            profile: Some(sample_profile_record()),
            cluster: Some(sample_cluster()),
            recommendations: vec![
                complete_record("old-1", "Old A"),
                complete_record("old-2", "Old B"),
            ],
            visualization: Some(stored_bundle(vec![0, 1])),
        };
        store.seed(user_id, prior).await;

        let snapshot = submit_questionnaire(gateway, store.clone(), request(user_id))
            .await
            .unwrap();

        let after = store.load(user_id).await.unwrap().unwrap();
        // Replaced, not appended.
        assert_eq!(after.recommendations.len(), 5);
        assert!(after
            .recommendations
            .iter()
            .all(|r| !r.career_id.starts_with("old")));
        // The stored bundle is the one computed by this submission.
        assert_eq!(after.visualization, Some(snapshot.visualization));
    }

    #[tokio::test]
    async fn all_empty_career_ids_degrade_to_unhighlighted_visualization() {
        let mut gateway = happy_gateway();
        gateway.recommend_response = Some(vec![
            crate::ml_client::WireRecommendation {
                title: Some("Anonymous".to_string()),
                domain: Some("Arts".to_string()),
                salary_range: Some("$40k".to_string()),
                skill_gaps: Some([("drawing".to_string(), 0.4)].into_iter().collect()),
                ..Default::default()
            },
        ]);
        gateway.visualize_response = Some(wire_visualization(10, vec![]));
        let gateway = Arc::new(gateway);
        let store = Arc::new(MemoryStore::new());

        let snapshot = submit_questionnaire(gateway.clone(), store, request(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(snapshot.recommendations[0].career_id, "");
        let ids = gateway.last_visualize_ids.lock().unwrap().clone().unwrap();
        assert_eq!(ids, None);
    }

    #[tokio::test]
    async fn skills_fall_back_to_request_responses_when_upstream_omits_them() {
        let mut vectors = sample_vectors();
        vectors.skills.clear();
        let mut gateway = happy_gateway();
        gateway.profile_response = Some(vectors);
        let gateway = Arc::new(gateway);
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();

        let snapshot = submit_questionnaire(gateway, store, request(user_id))
            .await
            .unwrap();

        // The stored skill record is the raw request answers (1-5 scale).
        assert_eq!(snapshot.profile.skills.len(), 5);
        assert_eq!(snapshot.profile.skills["q1"], json!(4));
    }
}
