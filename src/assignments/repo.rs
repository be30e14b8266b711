use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Workflow state of an assignment. The API validates the value but does
/// not enforce transition order; any status may replace any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_status")]
pub enum AssignmentStatus {
    Pending,
    Submitted,
    Approved,
}

impl AssignmentStatus {
    pub const VALUES: &'static [&'static str] = &["Pending", "Submitted", "Approved"];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Submitted" => Some(Self::Submitted),
            "Approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub status: AssignmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub struct NewAssignment {
    pub title: String,
    pub description: String,
    pub subject: String,
    pub status: AssignmentStatus,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct AssignmentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub status: Option<AssignmentStatus>,
}

impl AssignmentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.subject.is_none()
            && self.status.is_none()
    }
}

impl Assignment {
    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Assignment>> {
        let rows = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, user_id, title, description, subject, status, created_at, updated_at
            FROM assignments
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        new: NewAssignment,
    ) -> anyhow::Result<Assignment> {
        let row = sqlx::query_as::<_, Assignment>(
            r#"
            INSERT INTO assignments (user_id, title, description, subject, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, title, description, subject, status, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(new.title)
        .bind(new.description)
        .bind(new.subject)
        .bind(new.status)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Owner-scoped lookup: rows outside `user_id`'s ownership are never
    /// returned, so cross-owner access reads as absence.
    pub async fn find_for_user(
        db: &PgPool,
        user_id: Uuid,
        id: i64,
    ) -> anyhow::Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, user_id, title, description, subject, status, created_at, updated_at
            FROM assignments
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn update_for_user(
        db: &PgPool,
        user_id: Uuid,
        id: i64,
        patch: AssignmentPatch,
    ) -> anyhow::Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, Assignment>(
            r#"
            UPDATE assignments
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                subject = COALESCE($5, subject),
                status = COALESCE($6, status),
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, description, subject, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.subject)
        .bind(patch.status)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete_for_user(db: &PgPool, user_id: Uuid, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_accepts_declared_values_only() {
        assert_eq!(AssignmentStatus::parse("Pending"), Some(AssignmentStatus::Pending));
        assert_eq!(AssignmentStatus::parse("Submitted"), Some(AssignmentStatus::Submitted));
        assert_eq!(AssignmentStatus::parse("Approved"), Some(AssignmentStatus::Approved));
        assert_eq!(AssignmentStatus::parse("pending"), None);
        assert_eq!(AssignmentStatus::parse("Rejected"), None);
    }

    #[test]
    fn status_serializes_as_declared_label() {
        let json = serde_json::to_string(&AssignmentStatus::Pending).unwrap();
        assert_eq!(json, "\"Pending\"");
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(AssignmentPatch::default().is_empty());
        let patch = AssignmentPatch {
            title: Some("T".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
