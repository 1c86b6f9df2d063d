use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::enrollments::has_completed_enrollment,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_lesson))
        .route("/module/:module_id", get(list_lessons))
        .route("/:id", get(get_lesson).patch(update_lesson).delete(delete_lesson))
}

#[derive(Debug, Deserialize)]
pub struct CreateLessonRequest {
    pub module_id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLessonRequest {
    pub video_url: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LessonResponse {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub video_url: Option<String>,
    pub content: Option<String>,
    pub position: i64,
}

#[derive(Debug, Serialize)]
pub struct LessonListResponse {
    pub lessons: Vec<LessonResponse>,
}

// Walks module -> course to check the acting user owns the tree.
async fn check_module_owner(
    pool: &sqlx::SqlitePool,
    module_id: &str,
    user_id: &str,
) -> Result<()> {
    let owner = sqlx::query_scalar::<_, String>(
        "SELECT c.instructor_id FROM modules m \
         JOIN courses c ON m.course_id = c.id WHERE m.id = ?",
    )
    .bind(module_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;

    if owner != user_id {
        return Err(AppError::Forbidden(
            "Only the course instructor can modify this module".to_string(),
        ));
    }
    Ok(())
}

async fn check_lesson_owner(
    pool: &sqlx::SqlitePool,
    lesson_id: &str,
    user_id: &str,
) -> Result<()> {
    let owner = sqlx::query_scalar::<_, String>(
        "SELECT c.instructor_id FROM lessons l \
         JOIN modules m ON l.module_id = m.id \
         JOIN courses c ON m.course_id = c.id WHERE l.id = ?",
    )
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

    if owner != user_id {
        return Err(AppError::Forbidden(
            "Only the course instructor can modify this lesson".to_string(),
        ));
    }
    Ok(())
}

async fn create_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateLessonRequest>,
) -> Result<Json<LessonResponse>> {
    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Lesson title is required".to_string()));
    }
    check_module_owner(&state.db.pool, &body.module_id, &user.id).await?;

    let lesson_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // Same append-only rule as modules, scoped per module.
    sqlx::query(
        "INSERT INTO lessons (id, module_id, title, position, created_at) \
         VALUES (?, ?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM lessons WHERE module_id = ?), ?)",
    )
    .bind(&lesson_id)
    .bind(&body.module_id)
    .bind(&body.title)
    .bind(&body.module_id)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let position =
        sqlx::query_scalar::<_, i64>("SELECT position FROM lessons WHERE id = ?")
            .bind(&lesson_id)
            .fetch_one(&state.db.pool)
            .await?;

    Ok(Json(LessonResponse {
        id: lesson_id,
        module_id: body.module_id,
        title: body.title,
        video_url: None,
        content: None,
        position,
    }))
}

/// Lesson bodies are paid content: the listing is gated the same way as the
/// learn view. Owners preview, admins moderate, everyone else needs a
/// completed enrollment.
async fn list_lessons(
    State(state): State<AppState>,
    user: AuthUser,
    Path(module_id): Path<String>,
) -> Result<Json<LessonListResponse>> {
    let (course_id, owner) = sqlx::query_as::<_, (String, String)>(
        "SELECT c.id, c.instructor_id FROM modules m \
         JOIN courses c ON m.course_id = c.id WHERE m.id = ?",
    )
    .bind(&module_id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;

    if owner != user.id && !user.is_admin() {
        let enrolled = has_completed_enrollment(&state.db.pool, &user.id, &course_id).await?;
        if !enrolled {
            return Err(AppError::Forbidden(
                "You are not enrolled in this course".to_string(),
            ));
        }
    }

    let rows = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>, i64)>(
        "SELECT id, module_id, title, video_url, content, position FROM lessons \
         WHERE module_id = ? ORDER BY position ASC",
    )
    .bind(&module_id)
    .fetch_all(&state.db.pool)
    .await?;

    let lessons = rows
        .into_iter()
        .map(
            |(id, module_id, title, video_url, content, position)| LessonResponse {
                id,
                module_id,
                title,
                video_url,
                content,
                position,
            },
        )
        .collect();

    Ok(Json(LessonListResponse { lessons }))
}

async fn get_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<LessonResponse>> {
    check_lesson_owner(&state.db.pool, &id, &user.id).await?;

    let row = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>, i64)>(
        "SELECT id, module_id, title, video_url, content, position FROM lessons WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    let (id, module_id, title, video_url, content, position) = row;
    Ok(Json(LessonResponse {
        id,
        module_id,
        title,
        video_url,
        content,
        position,
    }))
}

async fn update_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateLessonRequest>,
) -> Result<Json<LessonResponse>> {
    check_lesson_owner(&state.db.pool, &id, &user.id).await?;

    let current = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, i64)>(
        "SELECT module_id, title, video_url, content, position FROM lessons WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    let video_url = body.video_url.or(current.2);
    let content = body.content.or(current.3);

    sqlx::query("UPDATE lessons SET video_url = ?, content = ? WHERE id = ?")
        .bind(&video_url)
        .bind(&content)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(LessonResponse {
        id,
        module_id: current.0,
        title: current.1,
        video_url,
        content,
        position: current.4,
    }))
}

async fn delete_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    check_lesson_owner(&state.db.pool, &id, &user.id).await?;

    sqlx::query("DELETE FROM lessons WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}
