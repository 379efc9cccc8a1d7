//! HTTP and WebSocket API

mod handlers;
mod types;
mod ws;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;
#[allow(unused_imports)]
pub use ws::{serve, Frame, TrafficClass};

use crate::db::Database;
use crate::runtime::ProductionOrchestrator;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ProductionOrchestrator>,
    pub db: Database,
    pub chat_batch_threshold: usize,
    pub voice_batch_threshold: usize,
}

impl AppState {
    pub fn new(
        orchestrator: ProductionOrchestrator,
        db: Database,
        chat_batch_threshold: usize,
        voice_batch_threshold: usize,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            db,
            chat_batch_threshold,
            voice_batch_threshold,
        }
    }

    pub fn batch_threshold(&self, class: TrafficClass) -> usize {
        match class {
            TrafficClass::Chat => self.chat_batch_threshold,
            TrafficClass::Voice => self.voice_batch_threshold,
        }
    }
}
