use axum::{middleware, routing::get, Router};

use crate::limit::throttle_api;
use crate::state::AppState;

pub mod handlers;
pub mod repo;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/assignments", get(handlers::index).post(handlers::store))
        .route(
            "/assignments/:id",
            get(handlers::show)
                .put(handlers::update)
                .delete(handlers::destroy),
        )
        .route_layer(middleware::from_fn_with_state(state, throttle_api))
}
