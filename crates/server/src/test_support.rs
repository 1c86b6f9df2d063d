//! Shared helpers for the in-file route tests: an in-memory database,
//! identity-provider tokens, signed webhook deliveries, and a oneshot
//! client over the full router.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower::util::ServiceExt;

use crate::{
    app,
    config::Config,
    db::models::Role,
    db::Database,
    middleware::auth::Claims,
    services::webhook::SignatureVerifier,
    AppState,
};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_dGVzdC13ZWJob29rLXNlY3JldA==";

fn test_config(checkout_auto_complete: bool) -> Config {
    Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        checkout_auto_complete,
    }
}

async fn state_with(config: Config) -> AppState {
    // A single connection keeps every query on the same in-memory database.
    let options: SqliteConnectOptions = "sqlite::memory:"
        .parse::<SqliteConnectOptions>()
        .expect("valid sqlite url")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("connect in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");

    AppState {
        db: Database { pool },
        config,
    }
}

pub async fn test_state() -> AppState {
    state_with(test_config(true)).await
}

/// State where paid checkouts stay `pending` until payment confirmation.
pub async fn test_state_manual_completion() -> AppState {
    state_with(test_config(false)).await
}

/// Mints a bearer token the way the identity provider would.
pub fn token_for(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        name: user_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode token")
}

/// Inserts a profile (and its role detail row) the way the identity webhook
/// would provision it.
pub async fn seed_profile(state: &AppState, id: &str, full_name: &str, role: Role) {
    sqlx::query(
        "INSERT INTO profiles (id, email, full_name, role, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(format!("{id}@example.com"))
    .bind(full_name)
    .bind(role.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db.pool)
    .await
    .expect("seed profile");

    let detail_sql = match role {
        Role::Instructor => Some("INSERT INTO instructor_details (id) VALUES (?)"),
        Role::Student => Some("INSERT INTO student_details (id) VALUES (?)"),
        Role::Admin => None,
    };
    if let Some(sql) = detail_sql {
        sqlx::query(sql)
            .bind(id)
            .execute(&state.db.pool)
            .await
            .expect("seed detail row");
    }
}

/// Sends one request through the full router and decodes the JSON body.
pub async fn send(
    state: &AppState,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = app(state.clone())
        .oneshot(request)
        .await
        .expect("router response");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, value)
}

/// Delivers an identity webhook, signed correctly or deliberately broken.
pub async fn send_webhook(
    state: &AppState,
    event: &Value,
    valid_signature: bool,
) -> (StatusCode, Value) {
    let payload = event.to_string();
    let timestamp = Utc::now();
    let msg_id = "msg_test";

    let signature = if valid_signature {
        SignatureVerifier::new(WEBHOOK_SECRET).sign(msg_id, timestamp, &payload)
    } else {
        "v1,bm90LWEtcmVhbC1zaWduYXR1cmU=".to_string()
    };

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/identity")
        .header(header::CONTENT_TYPE, "application/json")
        .header("svix-id", msg_id)
        .header("svix-timestamp", timestamp.timestamp().to_string())
        .header("svix-signature", signature)
        .body(Body::from(payload))
        .expect("build webhook request");

    let response = app(state.clone())
        .oneshot(request)
        .await
        .expect("router response");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, value)
}
