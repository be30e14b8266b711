use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::auth::extractors::AuthUser;
use crate::auth::jwt::issue_token;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::{AuthToken, NewUser, User};
use crate::error::{ops, ApiError};
use crate::response::Envelope;
use crate::state::AppState;
use crate::validate::{int_field, str_field, validate, Rule, RuleSet};

const REGISTER_RULES: &RuleSet = &[
    ("name", &[Rule::Required, Rule::Str, Rule::Max(255)]),
    ("email", &[Rule::Required, Rule::Str, Rule::Email, Rule::Max(255)]),
    ("password", &[Rule::Required, Rule::Str, Rule::Min(8), Rule::Confirmed]),
    ("department", &[Rule::Required, Rule::Str, Rule::Max(100)]),
    ("year", &[Rule::Required, Rule::Integer, Rule::Min(1), Rule::Max(6)]),
];

const LOGIN_RULES: &RuleSet = &[
    ("email", &[Rule::Required, Rule::Email]),
    ("password", &[Rule::Required]),
];

/// Unwraps the optional JSON body; a missing or malformed body validates
/// like an empty field map.
pub(crate) fn json_body(body: Option<Json<Value>>) -> Value {
    body.map(|Json(v)| v).unwrap_or(Value::Null)
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<Response, ApiError> {
    let body = json_body(body);
    let mut errors = validate(&body, REGISTER_RULES).err().unwrap_or_default();

    let email = str_field(&body, "email").unwrap_or_default().to_lowercase();

    // unique:users,email reports through the same 422 map as the shape
    // rules; the lookup runs once the email's own rules pass.
    if !errors.0.contains_key("email") && !email.is_empty() {
        let taken = User::find_by_email(&state.db, &email)
            .await
            .map_err(ApiError::internal(&ops::REGISTRATION))?
            .is_some();
        if taken {
            warn!(email = %email, "email already registered");
            errors.push("email", "The email has already been taken.");
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let password = str_field(&body, "password").unwrap_or_default();
    let hash = hash_password(&password).map_err(ApiError::internal(&ops::REGISTRATION))?;

    let user = User::create(
        &state.db,
        NewUser {
            name: &str_field(&body, "name").unwrap_or_default(),
            email: &email,
            password_hash: &hash,
            department: &str_field(&body, "department").unwrap_or_default(),
            year: int_field(&body, "year").unwrap_or_default() as i32,
        },
    )
    .await
    .map_err(ApiError::internal(&ops::REGISTRATION))?;

    let token = issue_token(&state, user.id)
        .await
        .map_err(ApiError::internal(&ops::REGISTRATION))?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Envelope::ok("User registered successfully")
        .data(json!({ "token": token, "token_type": "Bearer" }))
        .with_status(StatusCode::CREATED))
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<Response, ApiError> {
    let body = json_body(body);
    validate(&body, LOGIN_RULES).map_err(ApiError::Validation)?;

    let email = str_field(&body, "email").unwrap_or_default().to_lowercase();
    let password = str_field(&body, "password").unwrap_or_default();

    let user = User::find_by_email(&state.db, &email)
        .await
        .map_err(ApiError::internal(&ops::LOGIN))?
        .ok_or_else(|| {
            warn!(email = %email, "login unknown email");
            ApiError::InvalidCredentials
        })?;

    let ok = verify_password(&password, &user.password_hash)
        .map_err(ApiError::internal(&ops::LOGIN))?;
    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = issue_token(&state, user.id)
        .await
        .map_err(ApiError::internal(&ops::LOGIN))?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Envelope::ok("Login successful")
        .data(json!({ "token": token, "token_type": "Bearer" }))
        .with_status(StatusCode::OK))
}

#[instrument(skip(state, auth))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let revoked = AuthToken::revoke(&state.db, auth.token_id)
        .await
        .map_err(ApiError::internal(&ops::LOGOUT))?;
    if !revoked {
        // Extractor already confirmed the row; a concurrent logout won the race.
        warn!(user_id = %auth.user_id, "token already revoked");
    }

    info!(user_id = %auth.user_id, "user logged out");
    Ok(Envelope::ok("Logout successful").with_status(StatusCode::OK))
}

#[instrument(skip(state, auth))]
pub async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await
        .map_err(ApiError::internal(&ops::PROFILE))?
        .ok_or(ApiError::NotAuthenticated)?;

    Ok(Envelope::ok("Profile retrieved successfully")
        .data(json!({ "user": user }))
        .with_status(StatusCode::OK))
}
