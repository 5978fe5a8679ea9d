//! Role assignment with the admin-floor invariant.
//!
//! An account holds exactly one role out of the closed set {ADMIN, USER}.
//! Reassignment runs in a single transaction that first locks the role
//! catalog rows, serializing concurrent role changes so the ADMIN head
//! count read inside the transaction cannot go stale under concurrent
//! demotions.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use std::fmt;
use std::str::FromStr;
use tracing::Instrument;
use uuid::Uuid;

use super::storage::{self, UserRecord};

/// Closed set of authorization levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "USER" => Ok(Self::User),
            other => Err(anyhow::anyhow!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a role reassignment attempt.
#[derive(Debug)]
pub(crate) enum RoleChange {
    Updated(Box<UserRecord>),
    /// Rejected: the change would leave zero administrators.
    LastAdmin,
    UserNotFound,
}

/// Reassign an account's single role, enforcing the admin floor.
pub(crate) async fn set_role(pool: &PgPool, user_id: Uuid, new_role: Role) -> Result<RoleChange> {
    let mut tx = pool.begin().await.context("begin role transaction")?;

    // Lock the catalog rows first: every role mutation passes through here,
    // so the admin count below is serialized against concurrent demotions.
    let query = "SELECT id, name FROM roles WHERE name IN ('ADMIN', 'USER') FOR UPDATE";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let role_rows = sqlx::query(query)
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lock role catalog")?;
    let new_role_id: Uuid = role_rows
        .iter()
        .find(|row| row.get::<String, _>("name") == new_role.as_str())
        .map(|row| row.get("id"))
        .context("role catalog is missing a seeded role")?;

    let query = r"
        SELECT r.name
        FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id = $1
    ";
    let current: Option<String> = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to load current role")?
        .map(|row| row.get("name"));

    if current.is_none() {
        let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1) AS exists")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .context("failed to check user existence")?
            .get("exists");
        if !exists {
            let _ = tx.rollback().await;
            return Ok(RoleChange::UserNotFound);
        }
    }

    let demoting_admin =
        current.as_deref() == Some(Role::Admin.as_str()) && new_role != Role::Admin;
    if demoting_admin {
        let query = r"
            SELECT COUNT(*) AS admins
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE r.name = 'ADMIN'
        ";
        let admins: i64 = sqlx::query(query)
            .fetch_one(&mut *tx)
            .await
            .context("failed to count administrators")?
            .get("admins");
        if admins <= 1 {
            let _ = tx.rollback().await;
            return Ok(RoleChange::LastAdmin);
        }
    }

    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to remove existing role assignment")?;

    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(new_role_id)
        .execute(&mut *tx)
        .await
        .context("failed to insert role assignment")?;

    tx.commit().await.context("commit role transaction")?;

    let record = storage::find_user_by_id(pool, user_id)
        .await?
        .context("user vanished after role change")?;
    Ok(RoleChange::Updated(Box::new(record)))
}
