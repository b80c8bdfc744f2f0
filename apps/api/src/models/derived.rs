//! The per-user derived-state record: everything computed from questionnaire
//! answers (profile vectors, cluster assignment, ranked recommendations,
//! embedding visualization), as opposed to raw account data.
//!
//! One document per user. `profile`/`cluster`/`recommendations` are created
//! or wholesale-replaced only by a submission; `visualization` is a cache
//! that is cleared whenever the recommendations it was generated for are
//! replaced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ml_client::{resolve_career_id, WireRecommendation};

/// Raw questionnaire answers keyed by question/skill name. Values arrive as
/// numbers or numeric strings; consumers parse and validate on use.
pub type RawResponses = BTreeMap<String, serde_json::Value>;

/// RIASEC interest scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiasecProfile {
    #[serde(rename = "R")]
    pub realistic: f64,
    #[serde(rename = "I")]
    pub investigative: f64,
    #[serde(rename = "A")]
    pub artistic: f64,
    #[serde(rename = "S")]
    pub social: f64,
    #[serde(rename = "E")]
    pub enterprising: f64,
    #[serde(rename = "C")]
    pub conventional: f64,
}

/// Processed profile stored at submission time. Keeps the original responses
/// so results can be regenerated without redoing the questionnaire.
///
/// `skills` stays on the raw 1-5 scale; consumers renormalize to [0, 1] on
/// every use. Normalized values are never the canonical skill record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default)]
    pub riasec_responses: RawResponses,
    #[serde(default)]
    pub skill_responses: RawResponses,
    #[serde(default)]
    pub subject_preferences: RawResponses,
    pub riasec_profile: RiasecProfile,
    pub riasec_vector: Vec<f64>,
    pub skill_vector: Vec<f64>,
    pub subject_vector: Vec<f64>,
    /// 20-dimensional feature vector (6 RIASEC + 10 skills + 4 subjects).
    pub combined_vector: Vec<f64>,
    #[serde(default)]
    pub skills: RawResponses,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub cluster_id: i32,
    pub cluster_name: String,
    #[serde(default)]
    pub algorithm_used: Option<String>,
}

/// A single ranked career recommendation.
///
/// `career_id` may be empty when the upstream item carried no usable id; such
/// a record is stored anyway but cannot be highlighted in the visualization.
/// `domain`/`salary_range` keep the legacy `"Unknown"`/`"N/A"` sentinels that
/// existing stored data uses for "missing"; the repair pipeline treats the
/// sentinels and structural absence as equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub career_id: String,
    pub title: String,
    pub description: String,
    pub similarity_score: f64,
    pub domain: String,
    pub salary_range: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub skill_gaps: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl RecommendationRecord {
    /// Maps a wire item into the canonical record shape, applying the
    /// caller-side defaults for missing optional display fields. The career
    /// id goes through the ordered resolution function; an item with no
    /// usable id is stored with an empty `career_id`.
    pub fn from_wire(item: &WireRecommendation, timestamp: DateTime<Utc>) -> Self {
        RecommendationRecord {
            career_id: resolve_career_id(item).unwrap_or_default(),
            title: item.title.clone().unwrap_or_default(),
            description: item.description.clone().unwrap_or_default(),
            similarity_score: item.similarity_score.unwrap_or(0.0),
            domain: item
                .domain
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            salary_range: item
                .salary_range
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "N/A".to_string()),
            required_skills: item.required_skills.clone().unwrap_or_default(),
            skill_gaps: item.skill_gaps.clone().unwrap_or_default(),
            timestamp,
        }
    }
}

/// Cached embedding-space visualization. Valid only for the recommendations
/// that were current when it was generated; `recommended_career_indices`
/// index into `careers_2d`/`careers_3d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationBundle {
    pub user_2d: Vec<f64>,
    pub user_3d: Vec<f64>,
    pub careers_2d: Vec<Vec<f64>>,
    pub careers_3d: Vec<Vec<f64>>,
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
    pub last_generated: DateTime<Utc>,
}

/// The full derived-state document for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivedState {
    pub profile: Option<ProfileRecord>,
    pub cluster: Option<ClusterAssignment>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationRecord>,
    pub visualization: Option<VisualizationBundle>,
}
