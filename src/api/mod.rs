//! HTTP surface: loan registration, collateral top-ups, loan snapshots.

pub mod applications;
pub mod health;
pub mod loans;
pub mod top_ups;

use axum::{
    routing::{get, post},
    Router,
};

use crate::lifecycle::LifecycleEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: LifecycleEngine,
}

impl AppState {
    pub fn new(engine: LifecycleEngine) -> Self {
        Self { engine }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/loan-applications", post(applications::submit_application))
        .route("/collateral-top-ups", post(top_ups::submit_top_up))
        .route("/loans", get(loans::list_loans))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .with_state(state)
}
