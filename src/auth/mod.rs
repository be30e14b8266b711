use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::limit::{throttle_api, throttle_login, throttle_register};
use crate::state::AppState;

mod claims;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;

pub fn router(state: AppState) -> Router<AppState> {
    let register = Router::new()
        .route("/auth/register", post(handlers::register))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            throttle_register,
        ));

    let login = Router::new()
        .route("/auth/login", post(handlers::login))
        .route_layer(middleware::from_fn_with_state(state.clone(), throttle_login));

    let session = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/profile", get(handlers::profile))
        .route_layer(middleware::from_fn_with_state(state, throttle_api));

    Router::new().merge(register).merge(login).merge(session)
}
