use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::models::Role,
    error::{AppError, Result},
    services::webhook::SignatureVerifier,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/identity", post(identity_webhook))
}

#[derive(Debug, Deserialize)]
struct IdentityEvent {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct UserCreatedData {
    id: String,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    unsafe_metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SessionCreatedData {
    user_id: String,
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Receiver for the identity provider's delivery webhooks. The signature is
/// verified against the raw body before any event is processed.
async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode> {
    let msg_id = header_value(&headers, "svix-id");
    let timestamp = header_value(&headers, "svix-timestamp");
    let signature = header_value(&headers, "svix-signature");

    let verifier = SignatureVerifier::new(&state.config.webhook_secret);
    let validation = verifier.verify(msg_id, timestamp, signature, &body);
    if !validation.is_valid() {
        tracing::warn!("Rejected identity webhook: {}", validation.error_message());
        return Err(AppError::Validation(validation.error_message().to_string()));
    }

    let event: IdentityEvent = serde_json::from_str(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;

    match event.kind.as_str() {
        "user.created" => handle_user_created(&state, event.data).await?,
        "session.created" => handle_session_created(&state, event.data).await?,
        other => {
            tracing::debug!("Ignoring identity webhook event type {other}");
        }
    }

    Ok(StatusCode::OK)
}

/// Provisions the profile row plus the role's detail table. Role comes from
/// signup-time metadata and defaults to student. The provider retries
/// deliveries, so a redelivered event must succeed without a second row.
async fn handle_user_created(state: &AppState, data: serde_json::Value) -> Result<()> {
    let data: UserCreatedData = serde_json::from_value(data)
        .map_err(|e| AppError::Validation(format!("Invalid user.created payload: {e}")))?;

    let role = data
        .unsafe_metadata
        .get("role")
        .and_then(|v| v.as_str())
        .and_then(Role::parse)
        .unwrap_or(Role::Student);

    let email = data
        .email_addresses
        .first()
        .map(|e| e.email_address.clone())
        .unwrap_or_default();

    let full_name = format!(
        "{} {}",
        data.first_name.as_deref().unwrap_or(""),
        data.last_name.as_deref().unwrap_or("")
    )
    .trim()
    .to_string();

    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT OR IGNORE INTO profiles (id, email, full_name, image_url, role, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&data.id)
    .bind(&email)
    .bind(&full_name)
    .bind(&data.image_url)
    .bind(role.as_str())
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    match role {
        Role::Instructor => {
            sqlx::query("INSERT OR IGNORE INTO instructor_details (id) VALUES (?)")
                .bind(&data.id)
                .execute(&state.db.pool)
                .await?;
        }
        Role::Student => {
            sqlx::query("INSERT OR IGNORE INTO student_details (id) VALUES (?)")
                .bind(&data.id)
                .execute(&state.db.pool)
                .await?;
        }
        Role::Admin => {}
    }

    tracing::info!("Provisioned profile {} as {}", data.id, role.as_str());
    Ok(())
}

/// Appends a login-history record for the admin dashboard. A session for a
/// not-yet-provisioned user is still logged, with fallback fields.
async fn handle_session_created(state: &AppState, data: serde_json::Value) -> Result<()> {
    let data: SessionCreatedData = serde_json::from_value(data)
        .map_err(|e| AppError::Validation(format!("Invalid session.created payload: {e}")))?;

    let profile = sqlx::query_as::<_, (String, String)>(
        "SELECT full_name, role FROM profiles WHERE id = ?",
    )
    .bind(&data.user_id)
    .fetch_optional(&state.db.pool)
    .await?;

    let (full_name, role) =
        profile.unwrap_or_else(|| ("Unknown User".to_string(), "student".to_string()));

    sqlx::query(
        "INSERT INTO login_logs (id, user_id, full_name, role, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&data.user_id)
    .bind(&full_name)
    .bind(&role)
    .bind("Success")
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db.pool)
    .await?;

    Ok(())
}
