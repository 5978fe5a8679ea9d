//! Startup seeding: role catalog and the bootstrap administrator.
//!
//! Both steps run before the server accepts traffic and are idempotent, so
//! restarting never creates duplicate roles or extra admin accounts. The
//! bootstrap admin guarantees the admin-floor invariant holds from the very
//! first request.

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::{PgPool, Row};
use tracing::{Instrument, info};
use uuid::Uuid;

use super::{AuthConfig, password::hash_password, roles::Role, utils::normalize_identifier};

/// Make sure both role names exist.
pub async fn seed_roles(pool: &PgPool) -> Result<()> {
    let query = r"
        INSERT INTO roles (name)
        VALUES ($1), ($2)
        ON CONFLICT (name) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(Role::Admin.as_str())
        .bind(Role::User.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to seed roles")?;
    Ok(())
}

/// Create the bootstrap administrator if configured and absent.
///
/// An existing account with the configured email is promoted to ADMIN but
/// otherwise left untouched, so a rerun changes nothing.
pub async fn seed_default_admin(pool: &PgPool, config: &AuthConfig) -> Result<()> {
    let Some(admin) = config.bootstrap_admin() else {
        return Ok(());
    };
    let email = normalize_identifier(&admin.email);
    let username = normalize_identifier(&admin.username);

    let mut tx = pool.begin().await.context("begin admin seed transaction")?;

    let existing: Option<Uuid> =
        sqlx::query("SELECT id FROM users WHERE lower(email) = $1 OR lower(username) = $2")
            .bind(&email)
            .bind(&username)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to check for existing admin")?
            .map(|row| row.get("id"));

    let user_id = match existing {
        Some(id) => id,
        None => {
            let password_hash = hash_password(admin.password.expose_secret())?;
            let query = r"
                INSERT INTO users (name, surname, username, email, password_hash, status)
                VALUES ('Admin', 'Admin', $1, $2, $3, TRUE)
                RETURNING id
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let id: Uuid = sqlx::query(query)
                .bind(&username)
                .bind(&email)
                .bind(&password_hash)
                .fetch_one(&mut *tx)
                .instrument(span)
                .await
                .context("failed to insert bootstrap admin")?
                .get("id");

            sqlx::query(
                "INSERT INTO user_profiles (user_id, phone, profile_picture) VALUES ($1, '', $2)",
            )
            .bind(id)
            .bind(config.default_avatar_url())
            .execute(&mut *tx)
            .await
            .context("failed to insert admin profile")?;

            // The bootstrap account is born verified and active.
            sqlx::query("INSERT INTO user_emails (user_id, email_verified) VALUES ($1, TRUE)")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("failed to insert admin email record")?;

            sqlx::query("INSERT INTO user_password_resets (user_id) VALUES ($1)")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("failed to insert admin reset record")?;

            info!(email = %email, "bootstrap administrator created");
            id
        }
    };

    let query = r"
        INSERT INTO user_roles (user_id, role_id)
        SELECT $1, id FROM roles WHERE name = $2
        ON CONFLICT (user_id) DO UPDATE SET role_id = EXCLUDED.role_id
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(Role::Admin.as_str())
        .execute(&mut *tx)
        .await
        .context("failed to assign admin role")?;

    tx.commit().await.context("commit admin seed transaction")?;
    Ok(())
}
