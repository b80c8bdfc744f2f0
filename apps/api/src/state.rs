use std::sync::Arc;

use crate::ml_client::MlGateway;
use crate::profile::store::DerivedStateStore;
use crate::profile::visualization::VisualizationCache;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The only path to the ML engine; handlers never build their own client.
    pub ml: Arc<dyn MlGateway>,
    /// Per-user derived-state repository.
    pub store: Arc<dyn DerivedStateStore>,
    /// Visualization cache manager with per-user in-flight de-duplication.
    pub viz_cache: Arc<VisualizationCache>,
}
