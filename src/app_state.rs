use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::models::job::JobRef;
use crate::services::{
    intake::Intake, queue::TaskQueue, storage::ObjectStore, store::JobStore,
    verification::VerificationGate,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub intake: Intake,
    pub gate: VerificationGate,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue<JobRef>>,
    pub tokens: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn TaskQueue<JobRef>>,
        tokens: TokenVerifier,
    ) -> Self {
        Self {
            intake: Intake::new(Arc::clone(&store), objects, Arc::clone(&queue)),
            gate: VerificationGate::new(Arc::clone(&store)),
            store,
            queue,
            tokens: Arc::new(tokens),
        }
    }
}
