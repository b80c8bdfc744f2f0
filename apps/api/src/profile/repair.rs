//! Recommendation repair: silently heals stored recommendation records that
//! are missing display-critical fields, using the profile's stored
//! combined vector and raw skills.
//!
//! Best-effort by design: the user must always see *some* recommendations.
//! Upstream failure during regeneration falls back to the stored records
//! with display defaults; it is never surfaced as a request error.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ml_client::MlGateway;
use crate::models::derived::{DerivedState, RecommendationRecord};
use crate::profile::skills::normalize_skills;
use crate::profile::store::DerivedStateStore;

const DEFAULT_TOP_K: usize = 5;

/// A record is complete when it carries a domain, a salary range and a
/// non-empty skill-gap map. The legacy `"Unknown"`/`"N/A"` sentinels written
/// by older submissions count as missing, same as structural absence.
pub fn is_complete(rec: &RecommendationRecord) -> bool {
    let has_domain = !rec.domain.trim().is_empty() && rec.domain != "Unknown";
    let has_salary = !rec.salary_range.trim().is_empty() && rec.salary_range != "N/A";
    has_domain && has_salary && !rec.skill_gaps.is_empty()
}

/// Regeneration is only worthwhile when something is incomplete AND the
/// combined vector needed to regenerate exists.
pub fn needs_repair(state: &DerivedState) -> bool {
    let has_vector = state
        .profile
        .as_ref()
        .is_some_and(|p| !p.combined_vector.is_empty());
    has_vector && state.recommendations.iter().any(|rec| !is_complete(rec))
}

/// Returns the user's recommendations, healed if necessary.
///
/// Idempotent: an already-complete sequence (or one with no combined vector
/// to regenerate from) is returned unchanged without any upstream call.
/// A successful regeneration is persisted as a wholesale replacement with
/// fresh timestamps; a failed one falls back to the stored records with
/// display defaults applied.
pub async fn repair_recommendations(
    ml: &dyn MlGateway,
    store: &dyn DerivedStateStore,
    user_id: Uuid,
    state: &DerivedState,
) -> Result<Vec<RecommendationRecord>, AppError> {
    if !needs_repair(state) {
        return Ok(state.recommendations.clone());
    }
    // needs_repair guarantees a profile with a combined vector.
    let Some(profile) = state.profile.as_ref() else {
        return Ok(state.recommendations.clone());
    };

    let user_skills = normalize_skills(&profile.skills);
    let top_k = match state.recommendations.len() {
        0 => DEFAULT_TOP_K,
        n => n,
    };

    match ml
        .compute_recommendations(&profile.combined_vector, &user_skills, top_k)
        .await
    {
        Ok(items) => {
            let now = Utc::now();
            let repaired: Vec<RecommendationRecord> = items
                .iter()
                .map(|item| RecommendationRecord::from_wire(item, now))
                .collect();
            for rec in repaired.iter().filter(|r| r.career_id.is_empty()) {
                warn!(
                    "regenerated recommendation '{}' has no usable career id; stored but not highlightable",
                    rec.title
                );
            }
            store.replace_recommendations(user_id, &repaired).await?;
            info!(
                "Repaired {} recommendations for user {user_id}",
                repaired.len()
            );
            Ok(repaired)
        }
        Err(e) => {
            warn!(
                "recommendation repair for user {user_id} failed ({e}); returning stored records with display defaults"
            );
            Ok(state
                .recommendations
                .iter()
                .map(with_display_defaults)
                .collect())
        }
    }
}

/// Fills empty display fields so a record that could not be repaired still
/// renders. The record itself stays incomplete in storage.
fn with_display_defaults(rec: &RecommendationRecord) -> RecommendationRecord {
    let mut rec = rec.clone();
    if rec.domain.trim().is_empty() {
        rec.domain = "Unknown".to_string();
    }
    if rec.salary_range.trim().is_empty() {
        rec.salary_range = "N/A".to_string();
    }
    rec
}
