use crate::database::error::{DatabaseError, DbResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Transaction as SqlxTransaction;
use sqlx::{FromRow, PgPool, Postgres};
use std::fmt;
use uuid::Uuid;

/// Who performed an action. Always passed explicitly by the caller; there is
/// no ambient request context to fall back on.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: String,
}

impl Actor {
    /// Actor for background tasks and unattributed writes
    pub fn system() -> Self {
        Self {
            id: None,
            name: "system".to_string(),
        }
    }

    pub fn named(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Note,
    StatusChange,
    Payment,
    Assignment,
    Import,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Note => "note",
            ActivityKind::StatusChange => "status_change",
            ActivityKind::Payment => "payment",
            ActivityKind::Assignment => "assignment",
            ActivityKind::Import => "import",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Activity entity: immutable timeline entry on an account
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub account_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_name: String,
    pub activity_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for appending an activity
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub account_id: Uuid,
    pub actor: Actor,
    pub kind: ActivityKind,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// Append-only repository for the account timeline
pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an activity outside of any caller transaction
    pub async fn append(&self, activity: &NewActivity) -> DbResult<Activity> {
        sqlx::query_as::<_, Activity>(
            "INSERT INTO activities (account_id, actor_id, actor_name, activity_type, description, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, account_id, actor_id, actor_name, activity_type, description, metadata, created_at",
        )
        .bind(activity.account_id)
        .bind(activity.actor.id)
        .bind(&activity.actor.name)
        .bind(activity.kind.as_str())
        .bind(&activity.description)
        .bind(&activity.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Append an activity within the caller's transaction
    pub async fn append_tx(
        &self,
        tx: &mut SqlxTransaction<'static, Postgres>,
        activity: &NewActivity,
    ) -> DbResult<Activity> {
        sqlx::query_as::<_, Activity>(
            "INSERT INTO activities (account_id, actor_id, actor_name, activity_type, description, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, account_id, actor_id, actor_name, activity_type, description, metadata, created_at",
        )
        .bind(activity.account_id)
        .bind(activity.actor.id)
        .bind(&activity.actor.name)
        .bind(activity.kind.as_str())
        .bind(&activity.description)
        .bind(&activity.metadata)
        .fetch_one(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_kind_strings() {
        assert_eq!(ActivityKind::Note.as_str(), "note");
        assert_eq!(ActivityKind::StatusChange.as_str(), "status_change");
        assert_eq!(ActivityKind::Payment.as_str(), "payment");
        assert_eq!(ActivityKind::Assignment.as_str(), "assignment");
        assert_eq!(ActivityKind::Import.as_str(), "import");
    }

    #[test]
    fn test_system_actor_has_no_id() {
        let actor = Actor::system();
        assert_eq!(actor.id, None);
        assert_eq!(actor.name, "system");
    }
}
