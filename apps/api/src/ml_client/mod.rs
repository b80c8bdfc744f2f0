//! ML gateway client: the single point of entry for all ML engine calls.
//!
//! ARCHITECTURAL RULE: no other module may call the ML engine directly.
//! All four endpoints (profile, cluster, recommend, visualize) plus the
//! statistics read-through go through this module.
//!
//! Every call carries an explicit timeout and translates failures uniformly:
//! network-level failure becomes [`MlError::Unavailable`], a non-2xx status
//! becomes [`MlError::Api`], and undecodable JSON becomes [`MlError::Parse`].
//! There is no internal retry; retry policy, if any, belongs to the caller.
//! The gateway never invents defaults for incomplete items; missing optional
//! fields stay `None` and the caller decides what to substitute.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::derived::{ClusterAssignment, RawResponses, RiasecProfile};

const PROFILE_TIMEOUT: Duration = Duration::from_secs(10);
const CLUSTER_TIMEOUT: Duration = Duration::from_secs(10);
const RECOMMEND_TIMEOUT: Duration = Duration::from_secs(30);
const VISUALIZE_TIMEOUT: Duration = Duration::from_secs(30);
// External metrics can take a while to compute upstream.
const STATISTICS_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum MlError {
    #[error("ML engine unreachable: {0}")]
    Unavailable(String),

    #[error("ML engine returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode ML engine response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Request body for `POST /profile`.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireResponses {
    pub riasec_responses: RawResponses,
    pub skill_responses: RawResponses,
    pub subject_preferences: RawResponses,
}

/// Response of `POST /profile`: the derived vectors for one user.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileVectors {
    pub riasec_profile: RiasecProfile,
    pub riasec_vector: Vec<f64>,
    pub skill_vector: Vec<f64>,
    pub subject_vector: Vec<f64>,
    pub combined_vector: Vec<f64>,
    /// Skills on the raw 1-5 scale; may be absent upstream.
    #[serde(default)]
    pub skills: RawResponses,
}

/// One item of the `POST /recommend` response, exactly as the upstream sent
/// it. Display fields stay optional here; defaults are applied by callers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireRecommendation {
    #[serde(default)]
    pub career_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub similarity_score: Option<f64>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default)]
    pub required_skills: Option<Vec<String>>,
    #[serde(default)]
    pub skill_gaps: Option<BTreeMap<String, f64>>,
}

/// Response of `POST /visualize`. `careers_2d`/`careers_3d` stay optional at
/// the wire level: the visualization cache manager is the one that decides a
/// bundle missing them is unusable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireVisualization {
    #[serde(default)]
    pub user_2d: Vec<f64>,
    #[serde(default)]
    pub user_3d: Vec<f64>,
    #[serde(default)]
    pub careers_2d: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub careers_3d: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub career_titles: Vec<String>,
    #[serde(default)]
    pub recommended_career_indices: Vec<usize>,
    #[serde(default)]
    pub clusters_2d: Vec<Vec<f64>>,
    #[serde(default)]
    pub clusters_3d: Vec<Vec<f64>>,
    #[serde(default)]
    pub students_2d: Vec<Vec<f64>>,
    #[serde(default)]
    pub students_3d: Vec<Vec<f64>>,
    #[serde(default)]
    pub student_clusters: Vec<i32>,
}

/// The gateway seam. Carried in `AppState` as `Arc<dyn MlGateway>` so the
/// cache/repair engine is testable without a running ML engine.
#[async_trait]
pub trait MlGateway: Send + Sync {
    async fn compute_profile(
        &self,
        responses: &QuestionnaireResponses,
    ) -> Result<ProfileVectors, MlError>;

    async fn compute_cluster(&self, combined_vector: &[f64])
        -> Result<ClusterAssignment, MlError>;

    async fn compute_recommendations(
        &self,
        combined_vector: &[f64],
        user_skills: &BTreeMap<String, f64>,
        top_k: usize,
    ) -> Result<Vec<WireRecommendation>, MlError>;

    /// `recommended_career_ids = None` asks for an unhighlighted layout (all
    /// careers, no recommended indices), a valid degraded result.
    async fn compute_visualization(
        &self,
        combined_vector: &[f64],
        recommended_career_ids: Option<&[String]>,
    ) -> Result<WireVisualization, MlError>;

    async fn model_statistics(&self) -> Result<serde_json::Value, MlError>;
}

/// Production gateway over the ML engine's HTTP API.
#[derive(Clone)]
pub struct HttpMlGateway {
    client: Client,
    base_url: String,
}

impl HttpMlGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, MlError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| MlError::Unavailable(e.to_string()))?;
        Self::decode(path, response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<T, MlError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| MlError::Unavailable(e.to_string()))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, MlError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MlError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(MlError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        debug!("ML engine {path} responded with {} bytes", body.len());
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Serialize)]
struct ClusterRequest<'a> {
    combined_vector: &'a [f64],
}

#[derive(Serialize)]
struct RecommendRequest<'a> {
    combined_vector: &'a [f64],
    user_skills: &'a BTreeMap<String, f64>,
    top_k: usize,
}

#[derive(Serialize)]
struct VisualizeRequest<'a> {
    combined_vector: &'a [f64],
    #[serde(skip_serializing_if = "Option::is_none")]
    recommended_career_ids: Option<&'a [String]>,
}

#[async_trait]
impl MlGateway for HttpMlGateway {
    async fn compute_profile(
        &self,
        responses: &QuestionnaireResponses,
    ) -> Result<ProfileVectors, MlError> {
        self.post_json("/profile", responses, PROFILE_TIMEOUT).await
    }

    async fn compute_cluster(
        &self,
        combined_vector: &[f64],
    ) -> Result<ClusterAssignment, MlError> {
        self.post_json("/cluster", &ClusterRequest { combined_vector }, CLUSTER_TIMEOUT)
            .await
    }

    async fn compute_recommendations(
        &self,
        combined_vector: &[f64],
        user_skills: &BTreeMap<String, f64>,
        top_k: usize,
    ) -> Result<Vec<WireRecommendation>, MlError> {
        self.post_json(
            "/recommend",
            &RecommendRequest {
                combined_vector,
                user_skills,
                top_k,
            },
            RECOMMEND_TIMEOUT,
        )
        .await
    }

    async fn compute_visualization(
        &self,
        combined_vector: &[f64],
        recommended_career_ids: Option<&[String]>,
    ) -> Result<WireVisualization, MlError> {
        self.post_json(
            "/visualize",
            &VisualizeRequest {
                combined_vector,
                recommended_career_ids,
            },
            VISUALIZE_TIMEOUT,
        )
        .await
    }

    async fn model_statistics(&self) -> Result<serde_json::Value, MlError> {
        self.get_json("/model-statistics", STATISTICS_TIMEOUT).await
    }
}

/// Resolves a wire item's career id with explicit precedence: `career_id`,
/// then `id`. String artifacts of sloppy upstream serialization (`""`,
/// `"null"`, `"undefined"`) count as absent.
pub fn resolve_career_id(item: &WireRecommendation) -> Option<String> {
    [item.career_id.as_deref(), item.id.as_deref()]
        .into_iter()
        .flatten()
        .find_map(usable_career_id)
}

/// Filters a stored or wire career id down to a usable one.
pub fn usable_career_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    if matches!(id, "" | "null" | "undefined") {
        None
    } else {
        Some(id.to_string())
    }
}
