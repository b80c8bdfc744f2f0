//! Scripted ML gateway and fixture builders shared by the profile unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::ml_client::{
    MlError, MlGateway, ProfileVectors, QuestionnaireResponses, WireRecommendation,
    WireVisualization,
};
use crate::models::derived::{
    ClusterAssignment, ProfileRecord, RawResponses, RecommendationRecord, RiasecProfile,
    VisualizationBundle,
};

/// A gateway whose responses are canned up front. Counts calls per endpoint
/// so tests can assert that cache hits and idempotent repairs make zero
/// upstream calls. Setting `fail_stage` makes that endpoint report a
/// network-level outage.
#[derive(Default)]
pub struct ScriptedGateway {
    pub profile_response: Option<ProfileVectors>,
    pub cluster_response: Option<ClusterAssignment>,
    pub recommend_response: Option<Vec<WireRecommendation>>,
    pub visualize_response: Option<WireVisualization>,
    pub fail_stage: Option<&'static str>,
    pub profile_calls: AtomicUsize,
    pub cluster_calls: AtomicUsize,
    pub recommend_calls: AtomicUsize,
    pub visualize_calls: AtomicUsize,
    /// The `recommended_career_ids` argument of the last visualize call.
    pub last_visualize_ids: Mutex<Option<Option<Vec<String>>>>,
}

impl ScriptedGateway {
    fn outcome<T: Clone>(
        &self,
        stage: &'static str,
        response: &Option<T>,
    ) -> Result<T, MlError> {
        if self.fail_stage == Some(stage) {
            return Err(MlError::Unavailable("scripted outage".to_string()));
        }
        response
            .clone()
            .ok_or_else(|| MlError::Unavailable(format!("no scripted {stage} response")))
    }
}

#[async_trait]
impl MlGateway for ScriptedGateway {
    async fn compute_profile(
        &self,
        _responses: &QuestionnaireResponses,
    ) -> Result<ProfileVectors, MlError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome("profile", &self.profile_response)
    }

    async fn compute_cluster(
        &self,
        _combined_vector: &[f64],
    ) -> Result<ClusterAssignment, MlError> {
        self.cluster_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome("cluster", &self.cluster_response)
    }

    async fn compute_recommendations(
        &self,
        _combined_vector: &[f64],
        _user_skills: &BTreeMap<String, f64>,
        _top_k: usize,
    ) -> Result<Vec<WireRecommendation>, MlError> {
        self.recommend_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome("recommend", &self.recommend_response)
    }

    async fn compute_visualization(
        &self,
        _combined_vector: &[f64],
        recommended_career_ids: Option<&[String]>,
    ) -> Result<WireVisualization, MlError> {
        self.visualize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_visualize_ids.lock().unwrap() =
            Some(recommended_career_ids.map(|ids| ids.to_vec()));
        self.outcome("visualize", &self.visualize_response)
    }

    async fn model_statistics(&self) -> Result<serde_json::Value, MlError> {
        Ok(serde_json::json!({ "model_info": {} }))
    }
}

pub fn sample_riasec() -> RiasecProfile {
    RiasecProfile {
        realistic: 0.4,
        investigative: 0.9,
        artistic: 0.2,
        social: 0.5,
        enterprising: 0.3,
        conventional: 0.6,
    }
}

/// A 20-dimensional combined vector (6 RIASEC + 10 skills + 4 subjects).
pub fn sample_combined_vector() -> Vec<f64> {
    (0..20).map(|i| i as f64 / 20.0).collect()
}

pub fn sample_vectors() -> ProfileVectors {
    ProfileVectors {
        riasec_profile: sample_riasec(),
        riasec_vector: vec![0.4, 0.9, 0.2, 0.5, 0.3, 0.6],
        skill_vector: vec![0.5; 10],
        subject_vector: vec![0.25; 4],
        combined_vector: sample_combined_vector(),
        skills: raw_skills(),
    }
}

pub fn raw_skills() -> RawResponses {
    [
        ("programming", serde_json::json!(5)),
        ("communication", serde_json::json!(3)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn sample_cluster() -> ClusterAssignment {
    ClusterAssignment {
        cluster_id: 2,
        cluster_name: "Analytical Explorers".to_string(),
        algorithm_used: Some("kmeans".to_string()),
    }
}

pub fn sample_profile_record() -> ProfileRecord {
    ProfileRecord {
        riasec_responses: RawResponses::new(),
        skill_responses: RawResponses::new(),
        subject_preferences: RawResponses::new(),
        riasec_profile: sample_riasec(),
        riasec_vector: vec![0.4, 0.9, 0.2, 0.5, 0.3, 0.6],
        skill_vector: vec![0.5; 10],
        subject_vector: vec![0.25; 4],
        combined_vector: sample_combined_vector(),
        skills: raw_skills(),
        last_updated: Utc::now(),
    }
}

pub fn wire_recommendation(career_id: &str, title: &str) -> WireRecommendation {
    WireRecommendation {
        career_id: Some(career_id.to_string()),
        title: Some(title.to_string()),
        description: Some(format!("{title} description")),
        similarity_score: Some(0.85),
        domain: Some("Technology".to_string()),
        salary_range: Some("$70k-$120k".to_string()),
        required_skills: Some(vec!["programming".to_string()]),
        skill_gaps: Some([("programming".to_string(), 0.2)].into_iter().collect()),
        ..Default::default()
    }
}

pub fn complete_record(career_id: &str, title: &str) -> RecommendationRecord {
    RecommendationRecord {
        career_id: career_id.to_string(),
        title: title.to_string(),
        description: String::new(),
        similarity_score: 0.8,
        domain: "Technology".to_string(),
        salary_range: "$70k-$120k".to_string(),
        required_skills: vec!["programming".to_string()],
        skill_gaps: [("programming".to_string(), 0.2)].into_iter().collect(),
        timestamp: Utc::now(),
    }
}

pub fn wire_visualization(career_count: usize, recommended: Vec<usize>) -> WireVisualization {
    WireVisualization {
        user_2d: vec![0.1, 0.2],
        user_3d: vec![0.1, 0.2, 0.3],
        careers_2d: Some(vec![vec![0.0, 0.0]; career_count]),
        careers_3d: Some(vec![vec![0.0, 0.0, 0.0]; career_count]),
        career_titles: (0..career_count).map(|i| format!("Career {i}")).collect(),
        recommended_career_indices: recommended,
        ..Default::default()
    }
}

pub fn stored_bundle(recommended: Vec<usize>) -> VisualizationBundle {
    VisualizationBundle {
        user_2d: vec![0.1, 0.2],
        user_3d: vec![0.1, 0.2, 0.3],
        careers_2d: vec![vec![0.0, 0.0]; 10],
        careers_3d: vec![vec![0.0, 0.0, 0.0]; 10],
        career_titles: (0..10).map(|i| format!("Career {i}")).collect(),
        recommended_career_indices: recommended,
        clusters_2d: Vec::new(),
        clusters_3d: Vec::new(),
        students_2d: Vec::new(),
        students_3d: Vec::new(),
        student_clusters: Vec::new(),
        last_generated: Utc::now(),
    }
}
