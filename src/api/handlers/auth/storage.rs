//! Database access layer for identity records.
//!
//! All lookups are case-insensitive over email/username. Multi-table writes
//! (account creation, email verification, password update) run in a single
//! transaction so a partial failure never leaves an orphaned account.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::AuthConfig;
use super::roles::Role;
use super::utils::{build_verify_url, generate_one_time_token, is_unique_violation};
use crate::api::email::templates;

/// Outcome when attempting to create the account record set.
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created(Box<UserRecord>),
    Conflict,
}

/// Fully-loaded identity record: account plus its one-to-one satellites.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) surname: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) status: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) phone: String,
    pub(crate) profile_picture: String,
    pub(crate) email_verified: bool,
    pub(crate) role: String,
}

/// Field set for a new registration; the password arrives already hashed.
#[derive(Debug)]
pub(crate) struct NewAccount {
    pub(crate) name: String,
    pub(crate) surname: String,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) phone: String,
    pub(crate) profile_picture: String,
}

const USER_SELECT: &str = r"
    SELECT u.id, u.name, u.surname, u.username, u.email, u.password_hash,
           u.status, u.created_at, u.updated_at,
           p.phone, p.profile_picture,
           e.email_verified,
           COALESCE(r.name, 'USER') AS role
    FROM users u
    JOIN user_profiles p ON p.user_id = u.id
    JOIN user_emails e ON e.user_id = u.id
    JOIN user_password_resets pr ON pr.user_id = u.id
    LEFT JOIN user_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
";

fn map_user_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        surname: row.get("surname"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        phone: row.get("phone"),
        profile_picture: row.get("profile_picture"),
        email_verified: row.get("email_verified"),
        role: row.get("role"),
    }
}

/// Look up an account by email or username (input must be normalized).
pub(crate) async fn find_user_by_identifier(
    pool: &PgPool,
    identifier: &str,
) -> Result<Option<UserRecord>> {
    let query = &format!("{USER_SELECT} WHERE lower(u.email) = $1 OR lower(u.username) = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = "users by identifier"
    );
    let row = sqlx::query(query)
        .bind(identifier)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by identifier")?;
    Ok(row.as_ref().map(map_user_row))
}

pub(crate) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = &format!("{USER_SELECT} WHERE lower(u.email) = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = "users by email"
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by email")?;
    Ok(row.as_ref().map(map_user_row))
}

pub(crate) async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = &format!("{USER_SELECT} WHERE u.id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = "users by id"
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by id")?;
    Ok(row.as_ref().map(map_user_row))
}

/// All accounts currently holding the given role, oldest first. Accounts
/// without a role assignment row count as USER, matching the projection.
pub(crate) async fn list_users_by_role(pool: &PgPool, role: Role) -> Result<Vec<UserRecord>> {
    let query =
        &format!("{USER_SELECT} WHERE COALESCE(r.name, 'USER') = $1 ORDER BY u.created_at");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = "users by role"
    );
    let rows = sqlx::query(query)
        .bind(role.as_str())
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users by role")?;
    Ok(rows.iter().map(map_user_row).collect())
}

/// Case-insensitive existence check over both unique fields.
pub(crate) async fn user_exists(pool: &PgPool, email: &str, username: &str) -> Result<bool> {
    let query = r"
        SELECT EXISTS(
            SELECT 1 FROM users
            WHERE lower(email) = $1 OR lower(username) = $2
        ) AS exists
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(username)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check user existence")?;
    Ok(row.get("exists"))
}

/// Create the full account record set atomically: account (inactive), profile,
/// email verification (unverified, token pending), password reset (empty), and
/// the default USER role assignment. The verification token and its outbox row
/// are written in the same transaction, so a committed account always has a
/// deliverable verification email queued.
pub(crate) async fn create_account(
    pool: &PgPool,
    account: &NewAccount,
    config: &AuthConfig,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO users (name, surname, username, email, password_hash, status)
        VALUES ($1, $2, $3, $4, $5, FALSE)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(&account.name)
        .bind(&account.surname)
        .bind(account.username.to_lowercase())
        .bind(account.email.to_lowercase())
        .bind(&account.password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    let query = r"
        INSERT INTO user_profiles (user_id, phone, profile_picture)
        VALUES ($1, $2, $3)
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(&account.phone)
        .bind(&account.profile_picture)
        .execute(&mut *tx)
        .await
        .context("failed to insert user profile")?;

    let token = generate_one_time_token()?;
    let query = r"
        INSERT INTO user_emails
            (user_id, email_verified, verification_token, verification_token_expires_at)
        VALUES ($1, FALSE, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(&token)
        .bind(config.verification_token_ttl_seconds())
        .execute(&mut *tx)
        .await
        .context("failed to insert email verification record")?;

    let query = "INSERT INTO user_password_resets (user_id) VALUES ($1)";
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to insert password reset record")?;

    let query = r"
        INSERT INTO user_roles (user_id, role_id)
        SELECT $1, id FROM roles WHERE name = $2
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(Role::User.as_str())
        .execute(&mut *tx)
        .await
        .context("failed to assign default role")?;

    let verify_url = build_verify_url(config.frontend_base_url(), &token);
    enqueue_email(
        &mut *tx,
        &account.email.to_lowercase(),
        templates::VERIFY_EMAIL,
        &json!({ "name": account.name, "verify_url": verify_url }),
    )
    .await?;

    tx.commit().await.context("commit signup transaction")?;

    let record = find_user_by_id(pool, user_id)
        .await?
        .context("created user vanished before reload")?;
    Ok(SignupOutcome::Created(Box::new(record)))
}

/// Replace the current verification token (used by resend flows).
pub(crate) async fn set_verification_token(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        UPDATE user_emails
        SET verification_token = $2,
            verification_token_expires_at = NOW() + ($3 * INTERVAL '1 second')
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update verification token")?;
    Ok(())
}

/// Look up the account holding an unexpired verification token. Expired and
/// unknown tokens are indistinguishable here by design.
pub(crate) async fn find_user_by_verification_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<UserRecord>> {
    let query = &format!(
        "{USER_SELECT} WHERE e.verification_token = $1 AND e.verification_token_expires_at > NOW()"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = "users by verification token"
    );
    let row = sqlx::query(query)
        .bind(token)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by verification token")?;
    Ok(row.as_ref().map(map_user_row))
}

/// Flip the verified flag, clear the token, and activate the account in one
/// transaction.
pub(crate) async fn mark_email_verified(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    let query = r"
        UPDATE user_emails
        SET email_verified = TRUE,
            verification_token = NULL,
            verification_token_expires_at = NULL
        WHERE user_id = $1
    ";
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to mark email verified")?;

    let query = "UPDATE users SET status = TRUE, updated_at = NOW() WHERE id = $1";
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to activate user")?;

    tx.commit().await.context("commit verify transaction")?;
    Ok(())
}

/// Store a fresh password reset token and queue the reset email atomically.
pub(crate) async fn store_reset_token(
    pool: &PgPool,
    user: &UserRecord,
    token: &str,
    ttl_seconds: i64,
    reset_url: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin reset-token transaction")?;

    let query = r"
        UPDATE user_password_resets
        SET reset_token = $2,
            reset_token_expires_at = NOW() + ($3 * INTERVAL '1 second')
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .bind(token)
        .bind(ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update reset token")?;

    enqueue_email(
        &mut *tx,
        &user.email,
        templates::PASSWORD_RESET,
        &json!({ "name": user.name, "reset_url": reset_url }),
    )
    .await?;

    tx.commit().await.context("commit reset-token transaction")?;
    Ok(())
}

/// Look up the account holding an unexpired reset token.
pub(crate) async fn find_user_by_reset_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<UserRecord>> {
    let query = &format!(
        "{USER_SELECT} WHERE pr.reset_token = $1 AND pr.reset_token_expires_at > NOW()"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = "users by reset token"
    );
    let row = sqlx::query(query)
        .bind(token)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by reset token")?;
    Ok(row.as_ref().map(map_user_row))
}

/// Replace the stored hash and clear the reset token in one transaction.
pub(crate) async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin password transaction")?;

    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await
        .context("failed to update password hash")?;

    let query = r"
        UPDATE user_password_resets
        SET reset_token = NULL, reset_token_expires_at = NULL
        WHERE user_id = $1
    ";
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to clear reset token")?;

    tx.commit().await.context("commit password transaction")?;
    Ok(())
}

/// Queue an outbound email row for the background worker.
pub(crate) async fn enqueue_email<'c>(
    executor: impl PgExecutor<'c>,
    to_email: &str,
    template: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to serialize email payload")?;
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(executor)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}
