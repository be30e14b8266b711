use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::assignments::repo::{Assignment, AssignmentPatch, AssignmentStatus, NewAssignment};
use crate::auth::extractors::AuthUser;
use crate::auth::handlers::json_body;
use crate::error::{ops, ApiError};
use crate::response::Envelope;
use crate::state::AppState;
use crate::validate::{str_field, validate, Rule, RuleSet};

const STORE_RULES: &RuleSet = &[
    ("title", &[Rule::Required, Rule::Str, Rule::Max(255)]),
    ("description", &[Rule::Required, Rule::Str]),
    ("subject", &[Rule::Required, Rule::Str, Rule::Max(100)]),
    ("status", &[Rule::Sometimes, Rule::In(AssignmentStatus::VALUES)]),
];

const UPDATE_RULES: &RuleSet = &[
    ("title", &[Rule::Sometimes, Rule::Required, Rule::Str, Rule::Max(255)]),
    ("description", &[Rule::Sometimes, Rule::Required, Rule::Str]),
    ("subject", &[Rule::Sometimes, Rule::Required, Rule::Str, Rule::Max(100)]),
    ("status", &[Rule::Sometimes, Rule::Required, Rule::In(AssignmentStatus::VALUES)]),
];

/// Ids arrive as a raw path segment; anything that is not a plain integer
/// is rejected before the store is ever consulted.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| ApiError::InvalidId)
}

fn status_field(body: &Value) -> Option<AssignmentStatus> {
    str_field(body, "status").and_then(|s| AssignmentStatus::parse(&s))
}

#[instrument(skip(state, auth))]
pub async fn index(State(state): State<AppState>, auth: AuthUser) -> Result<Response, ApiError> {
    let assignments = Assignment::list_by_user(&state.db, auth.user_id)
        .await
        .map_err(ApiError::internal(&ops::FETCH_ASSIGNMENTS))?;

    Ok(Envelope::ok("Assignments retrieved successfully")
        .data(json!({ "assignments": assignments }))
        .with_status(StatusCode::OK))
}

#[instrument(skip(state, auth, body))]
pub async fn store(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Option<Json<Value>>,
) -> Result<Response, ApiError> {
    let body = json_body(body);
    validate(&body, STORE_RULES).map_err(ApiError::Validation)?;

    let new = NewAssignment {
        title: str_field(&body, "title").unwrap_or_default(),
        description: str_field(&body, "description").unwrap_or_default(),
        subject: str_field(&body, "subject").unwrap_or_default(),
        status: status_field(&body).unwrap_or(AssignmentStatus::Pending),
    };

    let assignment = Assignment::create(&state.db, auth.user_id, new)
        .await
        .map_err(ApiError::internal(&ops::CREATE_ASSIGNMENT))?;

    info!(user_id = %auth.user_id, assignment_id = assignment.id, "assignment created");
    Ok(Envelope::ok("Assignment created successfully")
        .data(json!({ "assignment": assignment }))
        .with_status(StatusCode::CREATED))
}

#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;

    let assignment = Assignment::find_for_user(&state.db, auth.user_id, id)
        .await
        .map_err(ApiError::internal(&ops::FETCH_ASSIGNMENT))?
        .ok_or(ApiError::AssignmentNotFound)?;

    Ok(Envelope::ok("Assignment retrieved successfully")
        .data(json!({ "assignment": assignment }))
        .with_status(StatusCode::OK))
}

#[instrument(skip(state, auth, body))]
pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;

    // Existence check first, matching the 404-before-422 contract.
    let existing = Assignment::find_for_user(&state.db, auth.user_id, id)
        .await
        .map_err(ApiError::internal(&ops::UPDATE_ASSIGNMENT))?
        .ok_or(ApiError::AssignmentNotFound)?;

    let body = json_body(body);
    validate(&body, UPDATE_RULES).map_err(ApiError::Validation)?;

    let patch = AssignmentPatch {
        title: str_field(&body, "title"),
        description: str_field(&body, "description"),
        subject: str_field(&body, "subject"),
        status: status_field(&body),
    };

    // An empty body is a legal no-op update.
    if patch.is_empty() {
        return Ok(Envelope::ok("Assignment updated successfully")
            .data(json!({ "assignment": existing }))
            .with_status(StatusCode::OK));
    }

    let assignment = Assignment::update_for_user(&state.db, auth.user_id, id, patch)
        .await
        .map_err(ApiError::internal(&ops::UPDATE_ASSIGNMENT))?
        .ok_or(ApiError::AssignmentNotFound)?;

    info!(user_id = %auth.user_id, assignment_id = assignment.id, "assignment updated");
    Ok(Envelope::ok("Assignment updated successfully")
        .data(json!({ "assignment": assignment }))
        .with_status(StatusCode::OK))
}

#[instrument(skip(state, auth))]
pub async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;

    let deleted = Assignment::delete_for_user(&state.db, auth.user_id, id)
        .await
        .map_err(ApiError::internal(&ops::DELETE_ASSIGNMENT))?;
    if !deleted {
        return Err(ApiError::AssignmentNotFound);
    }

    info!(user_id = %auth.user_id, assignment_id = id, "assignment deleted");
    Ok(Envelope::ok("Assignment deleted successfully").with_status(StatusCode::OK))
}
