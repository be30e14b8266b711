use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. The password hash never reaches JSON.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub department: String,
    pub year: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub department: &'a str,
    pub year: i32,
}

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, department, year, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, department, year, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn create(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, department, year)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, password_hash, department, year, created_at
            "#,
        )
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.department)
        .bind(new.year)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}

/// Session row backing a bearer token. Presence of the row means the token
/// is live; logout deletes it.
pub struct AuthToken;

impl AuthToken {
    pub async fn insert(db: &PgPool, token_id: Uuid, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO auth_tokens (id, user_id) VALUES ($1, $2)")
            .bind(token_id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn is_active(db: &PgPool, token_id: Uuid) -> anyhow::Result<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM auth_tokens WHERE id = $1")
            .bind(token_id)
            .fetch_optional(db)
            .await?;
        Ok(row.is_some())
    }

    pub async fn revoke(db: &PgPool, token_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE id = $1")
            .bind(token_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
