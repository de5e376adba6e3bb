pub mod agents;
pub mod meetings;
pub mod webhook;

use std::sync::Arc;

use crate::config::WebhookConfig;
use crate::db::Database;
use crate::lifecycle::MeetingLifecycle;

/// Shared state for all API routes.
#[derive(Clone)]
pub struct ApiState {
    pub db: Database,
    pub lifecycle: Arc<MeetingLifecycle>,
    pub webhook: WebhookConfig,
    /// Call type assumed when a payload does not carry one.
    pub default_call_type: String,
}
