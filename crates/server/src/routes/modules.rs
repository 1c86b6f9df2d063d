use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::courses::check_course_owner,
    routes::enrollments::has_completed_enrollment,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_module))
        .route("/course/:course_id", get(list_modules))
        .route("/:id", delete(delete_module))
}

#[derive(Debug, Deserialize)]
pub struct CreateModuleRequest {
    pub course_id: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ModuleResponse {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub position: i64,
}

#[derive(Debug, Serialize)]
pub struct ModuleListResponse {
    pub modules: Vec<ModuleResponse>,
}

async fn create_module(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateModuleRequest>,
) -> Result<Json<ModuleResponse>> {
    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Module title is required".to_string()));
    }
    check_course_owner(&state.db.pool, &body.course_id, &user.id).await?;

    let module_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // Append-only position: max + 1 among existing siblings, 0 when none.
    // Allocated inside the insert so the read and write cannot interleave.
    sqlx::query(
        "INSERT INTO modules (id, course_id, title, position, created_at) \
         VALUES (?, ?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM modules WHERE course_id = ?), ?)",
    )
    .bind(&module_id)
    .bind(&body.course_id)
    .bind(&body.title)
    .bind(&body.course_id)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let position =
        sqlx::query_scalar::<_, i64>("SELECT position FROM modules WHERE id = ?")
            .bind(&module_id)
            .fetch_one(&state.db.pool)
            .await?;

    Ok(Json(ModuleResponse {
        id: module_id,
        course_id: body.course_id,
        title: body.title,
        position,
    }))
}

/// Module titles reveal an unpublished course's outline, so the listing is
/// gated like the learn view: owner, admin, or a completed enrollment.
async fn list_modules(
    State(state): State<AppState>,
    user: AuthUser,
    Path(course_id): Path<String>,
) -> Result<Json<ModuleListResponse>> {
    let owner =
        sqlx::query_scalar::<_, String>("SELECT instructor_id FROM courses WHERE id = ?")
            .bind(&course_id)
            .fetch_optional(&state.db.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    if owner != user.id && !user.is_admin() {
        let enrolled = has_completed_enrollment(&state.db.pool, &user.id, &course_id).await?;
        if !enrolled {
            return Err(AppError::Forbidden(
                "You are not enrolled in this course".to_string(),
            ));
        }
    }

    // Positions may have gaps after deletions; ascending order is the only
    // contract.
    let rows = sqlx::query_as::<_, (String, String, String, i64)>(
        "SELECT id, course_id, title, position FROM modules \
         WHERE course_id = ? ORDER BY position ASC",
    )
    .bind(&course_id)
    .fetch_all(&state.db.pool)
    .await?;

    let modules = rows
        .into_iter()
        .map(|(id, course_id, title, position)| ModuleResponse {
            id,
            course_id,
            title,
            position,
        })
        .collect();

    Ok(Json(ModuleListResponse { modules }))
}

async fn delete_module(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let course_id =
        sqlx::query_scalar::<_, String>("SELECT course_id FROM modules WHERE id = ?")
            .bind(&id)
            .fetch_optional(&state.db.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;

    check_course_owner(&state.db.pool, &course_id, &user.id).await?;

    // Cascades to the module's lessons; surviving siblings keep their
    // positions.
    sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}
