use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Role,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/students", get(list_students))
        .route("/instructors", get(list_instructors))
        .route("/users/:id/role", patch(set_role))
        .route("/courses/:id/publish", post(set_publication))
        .route("/logins", get(list_logins))
}

fn require_admin(user: &AuthUser) -> Result<()> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Admin access required".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StudentRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub institution: String,
    pub phone_number: String,
    pub bio: String,
    pub points: i64,
}

#[derive(Debug, Serialize)]
pub struct StudentListResponse {
    pub students: Vec<StudentRow>,
}

async fn list_students(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<StudentListResponse>> {
    require_admin(&user)?;

    let rows = sqlx::query_as::<
        _,
        (String, String, String, Option<String>, Option<String>, Option<String>, Option<i64>),
    >(
        "SELECT p.id, p.full_name, p.email, d.institution, d.phone_number, d.bio, d.points \
         FROM profiles p LEFT JOIN student_details d ON p.id = d.id \
         WHERE p.role = 'student' ORDER BY p.created_at DESC",
    )
    .fetch_all(&state.db.pool)
    .await?;

    let students = rows
        .into_iter()
        .map(
            |(id, full_name, email, institution, phone_number, bio, points)| StudentRow {
                id,
                full_name,
                email,
                institution: institution.unwrap_or_else(|| "-".to_string()),
                phone_number: phone_number.unwrap_or_else(|| "-".to_string()),
                bio: bio.unwrap_or_default(),
                points: points.unwrap_or(0),
            },
        )
        .collect();

    Ok(Json(StudentListResponse { students }))
}

#[derive(Debug, Serialize)]
pub struct InstructorRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub institution: String,
    pub phone_number: String,
    pub bio: String,
    pub bank_name: String,
    pub account_number: String,
    pub balance: f64,
}

#[derive(Debug, Serialize)]
pub struct InstructorListResponse {
    pub instructors: Vec<InstructorRow>,
}

async fn list_instructors(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<InstructorListResponse>> {
    require_admin(&user)?;

    let rows = sqlx::query_as::<
        _,
        (
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<f64>,
        ),
    >(
        "SELECT p.id, p.full_name, p.email, d.institution, d.phone_number, d.bio, \
         d.bank_name, d.account_number, d.balance \
         FROM profiles p LEFT JOIN instructor_details d ON p.id = d.id \
         WHERE p.role = 'instructor' ORDER BY p.created_at DESC",
    )
    .fetch_all(&state.db.pool)
    .await?;

    let instructors = rows
        .into_iter()
        .map(
            |(
                id,
                full_name,
                email,
                institution,
                phone_number,
                bio,
                bank_name,
                account_number,
                balance,
            )| InstructorRow {
                id,
                full_name,
                email,
                institution: institution.unwrap_or_else(|| "-".to_string()),
                phone_number: phone_number.unwrap_or_else(|| "-".to_string()),
                bio: bio.unwrap_or_default(),
                bank_name: bank_name.unwrap_or_else(|| "-".to_string()),
                account_number: account_number.unwrap_or_else(|| "-".to_string()),
                balance: balance.unwrap_or(0.0),
            },
        )
        .collect();

    Ok(Json(InstructorListResponse { instructors }))
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct SetRoleResponse {
    pub id: String,
    pub role: Role,
}

/// Role is mutable only by an admin actor. Promoting a user provisions the
/// detail row their new role reads from, if it is missing.
async fn set_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<SetRoleResponse>> {
    require_admin(&user)?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    sqlx::query("UPDATE profiles SET role = ? WHERE id = ?")
        .bind(body.role.as_str())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    match body.role {
        Role::Instructor => {
            sqlx::query("INSERT OR IGNORE INTO instructor_details (id) VALUES (?)")
                .bind(&id)
                .execute(&state.db.pool)
                .await?;
        }
        Role::Student => {
            sqlx::query("INSERT OR IGNORE INTO student_details (id) VALUES (?)")
                .bind(&id)
                .execute(&state.db.pool)
                .await?;
        }
        Role::Admin => {}
    }

    Ok(Json(SetRoleResponse {
        id,
        role: body.role,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetPublicationRequest {
    pub is_published: bool,
}

/// Moderator override: sets an explicit publication state on any course,
/// unlike the owner's toggle.
async fn set_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SetPublicationRequest>,
) -> Result<Json<crate::routes::courses::PublishResponse>> {
    require_admin(&user)?;

    let result = sqlx::query("UPDATE courses SET is_published = ? WHERE id = ?")
        .bind(body.is_published)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    Ok(Json(crate::routes::courses::PublishResponse {
        id,
        is_published: body.is_published,
    }))
}

#[derive(Debug, Serialize)]
pub struct LoginLogRow {
    pub user_id: String,
    pub full_name: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct LoginLogResponse {
    pub logins: Vec<LoginLogRow>,
}

async fn list_logins(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<LoginLogResponse>> {
    require_admin(&user)?;

    let rows = sqlx::query_as::<_, (String, String, String, String, String)>(
        "SELECT user_id, full_name, role, status, created_at FROM login_logs \
         ORDER BY created_at DESC LIMIT 100",
    )
    .fetch_all(&state.db.pool)
    .await?;

    let logins = rows
        .into_iter()
        .map(
            |(user_id, full_name, role, status, created_at)| LoginLogRow {
                user_id,
                full_name,
                role,
                status,
                created_at,
            },
        )
        .collect();

    Ok(Json(LoginLogResponse { logins }))
}
