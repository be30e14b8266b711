use std::net::SocketAddr;

use axum::{http::StatusCode, middleware, response::Response, routing::get, Router};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{normalize_errors, ApiError};
use crate::limit::throttle_public;
use crate::response::Envelope;
use crate::state::AppState;
use crate::{assignments, auth};

async fn banner() -> Response {
    Envelope::ok("Campus Assignment Management API")
        .data(json!({ "version": "1.0.0", "status": "running" }))
        .with_status(StatusCode::OK)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

pub fn build_app(state: AppState) -> Router {
    let root = Router::new()
        .route("/", get(banner))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            throttle_public,
        ));

    Router::new()
        .merge(auth::router(state.clone()))
        .merge(assignments::router(state.clone()))
        .merge(root)
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(normalize_errors))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}


/// End-to-end tests against a real Postgres instance. `#[sqlx::test]`
/// provisions a throwaway database per test and runs the migrations, so
/// these drive the full router down to the owner-scoped SQL.
#[cfg(test)]
mod db_tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use sqlx::PgPool;
    use tower::ServiceExt;

    use super::*;
    use crate::limit::RateLimiter;

    fn test_app(pool: PgPool) -> Router {
        let config = AppState::fake().config;
        build_app(AppState::from_parts(
            pool,
            config,
            Arc::new(RateLimiter::default()),
        ))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).expect("body is JSON"))
    }

    fn register_body(email: &str) -> Value {
        json!({
            "name": "Test User",
            "email": email,
            "password": "supersecret",
            "password_confirmation": "supersecret",
            "department": "CS",
            "year": 2,
        })
    }

    async fn register(app: &Router, email: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(register_body(email)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["token"].as_str().expect("token").to_string()
    }

    async fn create_assignment(app: &Router, token: &str) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/assignments",
            Some(token),
            Some(json!({ "title": "T", "description": "D", "subject": "S" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["assignment"]["id"].as_i64().expect("id")
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn created_assignment_reads_back_as_pending(pool: PgPool) {
        let app = test_app(pool);
        let token = register(&app, "owner@example.com").await;
        let id = create_assignment(&app, &token).await;

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/assignments/{id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let assignment = &body["data"]["assignment"];
        assert_eq!(assignment["title"], Value::String("T".into()));
        assert_eq!(assignment["description"], Value::String("D".into()));
        assert_eq!(assignment["subject"], Value::String("S".into()));
        assert_eq!(assignment["status"], Value::String("Pending".into()));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn cross_owner_access_reads_as_absent_and_changes_nothing(pool: PgPool) {
        let app = test_app(pool);
        let owner = register(&app, "owner@example.com").await;
        let intruder = register(&app, "intruder@example.com").await;
        let id = create_assignment(&app, &owner).await;
        let uri = format!("/assignments/{id}");

        let (status, body) = send(&app, Method::GET, &uri, Some(&intruder), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], Value::String("ASSIGNMENT_NOT_FOUND".into()));

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&intruder),
            Some(json!({ "title": "Hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&intruder), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Still present and untouched for the owner.
        let (status, body) = send(&app, Method::GET, &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["assignment"]["title"], Value::String("T".into()));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_email_creates_no_second_user(pool: PgPool) {
        let app = test_app(pool.clone());
        register(&app, "ada@example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(register_body("ada@example.com")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error_code"], Value::String("VALIDATION_ERROR".into()));
        assert_eq!(
            body["errors"]["email"][0],
            Value::String("The email has already been taken.".into())
        );

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn taken_email_reports_alongside_other_field_errors(pool: PgPool) {
        let app = test_app(pool);
        register(&app, "ada@example.com").await;

        let mut body = register_body("ada@example.com");
        body["password"] = json!("short");
        body["password_confirmation"] = json!("short");
        let (status, body) = send(&app, Method::POST, "/auth/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["errors"]["password"][0],
            Value::String("The password must be at least 8 characters.".into())
        );
        assert_eq!(
            body["errors"]["email"][0],
            Value::String("The email has already been taken.".into())
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn store_without_title_persists_nothing(pool: PgPool) {
        let app = test_app(pool.clone());
        let token = register(&app, "owner@example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/assignments",
            Some(&token),
            Some(json!({ "description": "D", "subject": "S" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["errors"]["title"][0],
            Value::String("The title field is required.".into())
        );

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assignments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_update_is_a_noop(pool: PgPool) {
        let app = test_app(pool.clone());
        let token = register(&app, "owner@example.com").await;
        let id = create_assignment(&app, &token).await;

        let before: (time::OffsetDateTime,) =
            sqlx::query_as("SELECT updated_at FROM assignments WHERE id = $1")
                .bind(id)
                .fetch_one(&pool)
                .await
                .unwrap();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/assignments/{id}"),
            Some(&token),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["assignment"]["title"], Value::String("T".into()));

        let after: (time::OffsetDateTime,) =
            sqlx::query_as("SELECT updated_at FROM assignments WHERE id = $1")
                .bind(id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(before.0, after.0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn logout_revokes_the_token(pool: PgPool) {
        let app = test_app(pool);
        let token = register(&app, "owner@example.com").await;

        let (status, _) = send(&app, Method::POST, "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, "/auth/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], Value::String("UNAUTHENTICATED".into()));
    }
}
