use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::EnrollmentStatus,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/enrollments", get(list_enrollments))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub course_id: String,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentResponse {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub price_paid: f64,
    pub status: EnrollmentStatus,
    pub created_at: String,
}

/// The read-path gate: lesson content unlocks only once the enrollment is
/// completed. Pending rows (a paid checkout awaiting confirmation) do not.
pub(crate) async fn has_completed_enrollment(
    pool: &sqlx::SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments \
         WHERE user_id = ? AND course_id = ? AND status = 'completed'",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<EnrollmentResponse>> {
    if body.price < 0.0 {
        return Err(AppError::Validation(
            "Price must be zero or positive".to_string(),
        ));
    }

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses WHERE id = ?")
        .bind(&body.course_id)
        .fetch_one(&state.db.pool)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    // Free courses complete immediately. Paid checkouts either complete as
    // well (simulated payment success, the default) or stay pending until a
    // payment-confirmation step exists.
    let status = if body.price == 0.0 || state.config.checkout_auto_complete {
        EnrollmentStatus::Completed
    } else {
        EnrollmentStatus::Pending
    };

    let enrollment_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // One conditional upsert keyed on (user, course): a double submit can
    // never produce two rows or lose an update, and the latest submission's
    // price and status win.
    sqlx::query(
        "INSERT INTO enrollments (id, user_id, course_id, price_paid, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id, course_id) \
         DO UPDATE SET price_paid = excluded.price_paid, status = excluded.status",
    )
    .bind(&enrollment_id)
    .bind(&user.id)
    .bind(&body.course_id)
    .bind(body.price)
    .bind(status.as_str())
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    // Re-read: on conflict the original row id and created_at survive.
    let row = sqlx::query_as::<_, (String, f64, String, String)>(
        "SELECT id, price_paid, status, created_at FROM enrollments \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(&user.id)
    .bind(&body.course_id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(EnrollmentResponse {
        id: row.0,
        user_id: user.id,
        course_id: body.course_id,
        price_paid: row.1,
        status: if row.2 == "completed" {
            EnrollmentStatus::Completed
        } else {
            EnrollmentStatus::Pending
        },
        created_at: row.3,
    }))
}

#[derive(Debug, Serialize)]
pub struct EnrollmentListItem {
    pub course_id: String,
    pub course_title: String,
    pub price_paid: f64,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentListResponse {
    pub enrollments: Vec<EnrollmentListItem>,
}

async fn list_enrollments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<EnrollmentListResponse>> {
    let rows = sqlx::query_as::<_, (String, String, f64, String, String)>(
        "SELECT e.course_id, c.title, e.price_paid, e.status, e.created_at \
         FROM enrollments e JOIN courses c ON e.course_id = c.id \
         WHERE e.user_id = ? ORDER BY e.created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let enrollments = rows
        .into_iter()
        .map(
            |(course_id, course_title, price_paid, status, created_at)| EnrollmentListItem {
                course_id,
                course_title,
                price_paid,
                status,
                created_at,
            },
        )
        .collect();

    Ok(Json(EnrollmentListResponse { enrollments }))
}
