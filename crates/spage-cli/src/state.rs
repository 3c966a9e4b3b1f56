//! Application state shared across handlers

use std::sync::Arc;

use spage_core::FinalizationStore;
use spage_store::AnyStore;

use crate::config::NodeConfig;

/// State handed to every HTTP handler
pub struct AppState {
    /// Node configuration
    pub config: NodeConfig,
    /// Store backend
    pub store: Arc<AnyStore>,
    /// Finalization map reader for the history endpoint
    pub finals: FinalizationStore<AnyStore>,
}

impl AppState {
    /// Create application state over an already-constructed store
    pub fn new(config: NodeConfig, store: Arc<AnyStore>) -> Self {
        Self {
            finals: FinalizationStore::new(Arc::clone(&store)),
            config,
            store,
        }
    }
}
