use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use chime_core::config::ChimeConfig;
use chime_scheduler::ReminderService;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: ChimeConfig,
    pub reminders: ReminderService,
}

impl AppState {
    pub fn new(config: ChimeConfig, reminders: ReminderService) -> Self {
        Self { config, reminders }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/reminder",
            post(crate::http::reminders::add_reminder)
                .delete(crate::http::reminders::delete_reminder),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
