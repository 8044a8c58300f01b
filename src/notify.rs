//! One-shot messages shown by the next command after a mutation.
//!
//! Each user has a single slot: flashing replaces whatever is pending, and
//! taking deletes the row in the same statement, so a message is shown once.

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub message: String,
}

pub async fn flash<'e, E: SqliteExecutor<'e>>(
    ex: E,
    user: &str,
    kind: NotificationKind,
    message: &str,
) -> Result<Notification> {
    let n = Notification {
        id: Uuid::new_v4().to_string(),
        kind,
        message: message.to_string(),
    };
    sqlx::query(
        r#"
        INSERT INTO notifications (user_id, id, kind, message)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (user_id) DO UPDATE SET
            id = excluded.id,
            kind = excluded.kind,
            message = excluded.message,
            created_at = datetime('now')
        "#,
    )
    .bind(user)
    .bind(&n.id)
    .bind(n.kind)
    .bind(&n.message)
    .execute(ex)
    .await?;

    debug!(user, id = %n.id, "notification queued");
    Ok(n)
}

/// Removes and returns the pending message, if any.
pub async fn take<'e, E: SqliteExecutor<'e>>(ex: E, user: &str) -> Result<Option<Notification>> {
    let n = sqlx::query_as::<_, Notification>(
        "DELETE FROM notifications WHERE user_id = ? RETURNING id, kind, message",
    )
    .bind(user)
    .fetch_optional(ex)
    .await?;
    Ok(n)
}
