use axum::{routing::get, Router};

use crate::state::AppState;

pub mod auth;
pub mod bills;
pub mod bills_owner;
pub mod concerns;
pub mod concerns_owner;
pub mod health;
pub mod properties;
pub mod tenant;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(auth::router())
        .merge(properties::router())
        .merge(tenant::router())
        .merge(bills::router())
        .merge(bills_owner::router())
        .merge(concerns::router())
        .merge(concerns_owner::router())
}
