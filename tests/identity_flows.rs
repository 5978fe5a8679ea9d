//! Database-backed flow tests.
//!
//! These run against a live PostgreSQL server named by `CUSTODIA_TEST_DSN`
//! (a superuser DSN, e.g. `postgres://postgres@localhost/postgres`) and are
//! skipped when it is not set. Each test creates its own throwaway database
//! so concurrent tests never observe each other's accounts.

use anyhow::{Context, Result};
use axum::{
    Json,
    body::to_bytes,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use custodia::api::handlers::auth::{
    AuthConfig, AuthState,
    login::login,
    register::register,
    seed::{seed_default_admin, seed_roles},
    types::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, SetRoleRequest, VerifyEmailRequest},
    verification::verify_email,
};
use custodia::api::handlers::users::{ListUsersQuery, list_users, set_user_role};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::{env, sync::Arc};
use url::Url;
use uuid::Uuid;

struct TestDb {
    server: PgPool,
    pool: PgPool,
    name: String,
}

impl TestDb {
    /// Create a dedicated database on the configured server, or `None` when
    /// no test server is available.
    async fn create(tag: &str) -> Result<Option<Self>> {
        let Ok(dsn) = env::var("CUSTODIA_TEST_DSN") else {
            eprintln!("Skipping integration test: CUSTODIA_TEST_DSN is not set");
            return Ok(None);
        };

        let server = PgPoolOptions::new()
            .max_connections(1)
            .connect(&dsn)
            .await
            .context("failed to connect to the test server")?;

        let name = format!("custodia_{tag}_{}", Uuid::new_v4().simple());
        sqlx::query(&format!(r#"CREATE DATABASE "{name}""#))
            .execute(&server)
            .await
            .context("failed to create test database")?;

        let mut url = Url::parse(&dsn).context("invalid CUSTODIA_TEST_DSN")?;
        url.set_path(&name);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url.as_str())
            .await
            .context("failed to connect to the test database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        seed_roles(&pool).await?;

        Ok(Some(Self { server, pool, name }))
    }

    async fn cleanup(self) -> Result<()> {
        self.pool.close().await;
        sqlx::query(&format!(r#"DROP DATABASE "{}""#, self.name))
            .execute(&self.server)
            .await
            .context("failed to drop test database")?;
        Ok(())
    }
}

fn auth_state() -> Arc<AuthState> {
    let config = AuthConfig::new(
        SecretString::from("0123456789abcdef0123456789abcdef"),
        "https://app.example.com".to_string(),
    );
    Arc::new(AuthState::from_config(config).expect("auth state"))
}

fn admin_auth_state() -> Arc<AuthState> {
    let config = AuthConfig::new(
        SecretString::from("0123456789abcdef0123456789abcdef"),
        "https://app.example.com".to_string(),
    )
    .with_bootstrap_admin(
        "root@example.com".to_string(),
        "root".to_string(),
        SecretString::from("RootPassw0rd1"),
    );
    Arc::new(AuthState::from_config(config).expect("auth state"))
}

fn register_request(name: &str, username: &str, email: &str) -> RegisterRequest {
    RegisterRequest {
        name: name.to_string(),
        surname: "Doe".to_string(),
        username: username.to_string(),
        email: email.to_string(),
        password: "Passw0rd1".to_string(),
        phone: None,
        profile_picture: None,
    }
}

async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .context("failed to read response body")?;
    serde_json::from_slice(&bytes).context("failed to decode response body")
}

async fn verification_token(pool: &PgPool, user_id: Uuid) -> Result<String> {
    sqlx::query("SELECT verification_token FROM user_emails WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("failed to read verification token")?
        .get::<Option<String>, _>("verification_token")
        .context("no verification token stored")
}

async fn call_verify(pool: &PgPool, token: &str) -> Response {
    verify_email(
        Extension(pool.clone()),
        Some(Json(VerifyEmailRequest {
            token: token.to_string(),
        })),
    )
    .await
    .into_response()
}

fn bearer(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, format!("Bearer {token}").parse()?);
    Ok(headers)
}

#[tokio::test]
async fn duplicate_registration_conflicts_ignore_case() -> Result<()> {
    let Some(db) = TestDb::create("dup").await? else {
        return Ok(());
    };
    let state = auth_state();

    let response = register(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Some(Json(register_request("Alice", "alice", "alice@example.com"))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Same email, shouting; different username.
    let response = register(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Some(Json(register_request("Mallory", "mallory", "ALICE@EXAMPLE.COM"))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Same username, different case and email.
    let response = register(
        Extension(db.pool.clone()),
        Extension(state),
        Some(Json(register_request("Mallory", "Alice", "mallory@example.com"))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    db.cleanup().await
}

#[tokio::test]
async fn verification_token_works_exactly_once() -> Result<()> {
    let Some(db) = TestDb::create("verify").await? else {
        return Ok(());
    };
    let state = auth_state();

    let response = register(
        Extension(db.pool.clone()),
        Extension(state),
        Some(Json(register_request("Alice", "alice", "alice@example.com"))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: RegisterResponse = json_body(response).await?;

    let token = verification_token(&db.pool, created.user.id).await?;

    let response = call_verify(&db.pool, &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Consuming the token cleared it, so a replay no longer matches anything.
    let response = call_verify(&db.pool, &token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    db.cleanup().await
}

#[tokio::test]
async fn register_verify_login_round_trip() -> Result<()> {
    let Some(db) = TestDb::create("flow").await? else {
        return Ok(());
    };
    let state = auth_state();

    let response = register(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Some(Json(register_request("Alice", "alice", "alice@example.com"))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: RegisterResponse = json_body(response).await?;
    assert!(!created.user.is_email_verified);

    // Login before verification is refused.
    let response = login(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            identifier: "alice".to_string(),
            password: "Passw0rd1".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let token = verification_token(&db.pool, created.user.id).await?;
    let response = call_verify(&db.pool, &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(
        Extension(db.pool.clone()),
        Extension(state),
        Some(Json(LoginRequest {
            identifier: "alice@example.com".to_string(),
            password: "Passw0rd1".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let session: LoginResponse = json_body(response).await?;
    assert!(session.success);
    assert!(!session.token.is_empty());
    assert_eq!(session.user.id, created.user.id);
    assert_eq!(session.user.role, "USER");

    db.cleanup().await
}

#[tokio::test]
async fn last_admin_cannot_be_demoted() -> Result<()> {
    let Some(db) = TestDb::create("admin").await? else {
        return Ok(());
    };
    let state = admin_auth_state();
    seed_default_admin(&db.pool, &state.config).await?;

    let response = login(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            identifier: "root".to_string(),
            password: "RootPassw0rd1".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let session: LoginResponse = json_body(response).await?;
    assert_eq!(session.user.role, "ADMIN");
    let admin_id = session.user.id;

    // The sole administrator cannot demote themselves.
    let response = set_user_role(
        bearer(&session.token)?,
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Path(admin_id),
        Some(Json(SetRoleRequest {
            role: "USER".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Bring up a second account and promote it.
    let response = register(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Some(Json(register_request("Bob", "bob", "bob@example.com"))),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: RegisterResponse = json_body(response).await?;
    let token = verification_token(&db.pool, created.user.id).await?;
    let response = call_verify(&db.pool, &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = set_user_role(
        bearer(&session.token)?,
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Path(created.user.id),
        Some(Json(SetRoleRequest {
            role: "ADMIN".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    let response = list_users(
        bearer(&session.token)?,
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Query(ListUsersQuery {
            role: Some("ADMIN".to_string()),
        }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    // With a second administrator in place the original can step down.
    let response = set_user_role(
        bearer(&session.token)?,
        Extension(db.pool.clone()),
        Extension(state),
        Path(admin_id),
        Some(Json(SetRoleRequest {
            role: "USER".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    db.cleanup().await
}
