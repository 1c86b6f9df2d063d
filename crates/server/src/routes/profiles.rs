use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Role,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_profile).patch(update_profile))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub institution: String,
    pub phone_number: String,
    pub bio: String,
    // Instructor-only fields; zeroed/blank for students.
    pub bank_name: String,
    pub account_number: String,
    pub balance: f64,
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub institution: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
}

async fn load_profile(state: &AppState, user: &AuthUser) -> Result<ProfileResponse> {
    let (email, full_name) = sqlx::query_as::<_, (String, String)>(
        "SELECT email, full_name FROM profiles WHERE id = ?",
    )
    .bind(&user.id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    let mut response = ProfileResponse {
        id: user.id.clone(),
        email,
        full_name,
        role: user.role,
        institution: String::new(),
        phone_number: String::new(),
        bio: String::new(),
        bank_name: String::new(),
        account_number: String::new(),
        balance: 0.0,
        points: 0,
    };

    match user.role {
        Role::Instructor => {
            let details = sqlx::query_as::<
                _,
                (Option<String>, Option<String>, Option<String>, Option<String>, Option<String>, f64),
            >(
                "SELECT institution, phone_number, bio, bank_name, account_number, balance \
                 FROM instructor_details WHERE id = ?",
            )
            .bind(&user.id)
            .fetch_optional(&state.db.pool)
            .await?;

            if let Some((institution, phone_number, bio, bank_name, account_number, balance)) =
                details
            {
                response.institution = institution.unwrap_or_default();
                response.phone_number = phone_number.unwrap_or_default();
                response.bio = bio.unwrap_or_default();
                response.bank_name = bank_name.unwrap_or_default();
                response.account_number = account_number.unwrap_or_default();
                response.balance = balance;
            }
        }
        Role::Student => {
            let details = sqlx::query_as::<
                _,
                (Option<String>, Option<String>, Option<String>, i64),
            >(
                "SELECT institution, phone_number, bio, points FROM student_details WHERE id = ?",
            )
            .bind(&user.id)
            .fetch_optional(&state.db.pool)
            .await?;

            if let Some((institution, phone_number, bio, points)) = details {
                response.institution = institution.unwrap_or_default();
                response.phone_number = phone_number.unwrap_or_default();
                response.bio = bio.unwrap_or_default();
                response.points = points;
            }
        }
        Role::Admin => {}
    }

    Ok(response)
}

async fn get_profile(State(state): State<AppState>, user: AuthUser) -> Result<Json<ProfileResponse>> {
    Ok(Json(load_profile(&state, &user).await?))
}

/// Updates the core profile row and the role's detail table together.
async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>> {
    // No detail table exists for admins; accepting these fields would
    // silently drop them. Checked before any write so nothing is partially
    // applied.
    if user.role == Role::Admin
        && (body.institution.is_some()
            || body.phone_number.is_some()
            || body.bio.is_some()
            || body.bank_name.is_some()
            || body.account_number.is_some())
    {
        return Err(AppError::Validation(
            "Admin profiles have no detail fields".to_string(),
        ));
    }

    if let Some(full_name) = &body.full_name {
        if full_name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        sqlx::query("UPDATE profiles SET full_name = ? WHERE id = ?")
            .bind(full_name)
            .bind(&user.id)
            .execute(&state.db.pool)
            .await?;
    }

    let now = Utc::now().to_rfc3339();
    match user.role {
        Role::Instructor => {
            sqlx::query(
                "UPDATE instructor_details SET \
                 institution = COALESCE(?, institution), \
                 phone_number = COALESCE(?, phone_number), \
                 bio = COALESCE(?, bio), \
                 bank_name = COALESCE(?, bank_name), \
                 account_number = COALESCE(?, account_number), \
                 updated_at = ? WHERE id = ?",
            )
            .bind(&body.institution)
            .bind(&body.phone_number)
            .bind(&body.bio)
            .bind(&body.bank_name)
            .bind(&body.account_number)
            .bind(&now)
            .bind(&user.id)
            .execute(&state.db.pool)
            .await?;
        }
        Role::Student => {
            sqlx::query(
                "UPDATE student_details SET \
                 institution = COALESCE(?, institution), \
                 phone_number = COALESCE(?, phone_number), \
                 bio = COALESCE(?, bio), \
                 updated_at = ? WHERE id = ?",
            )
            .bind(&body.institution)
            .bind(&body.phone_number)
            .bind(&body.bio)
            .bind(&now)
            .bind(&user.id)
            .execute(&state.db.pool)
            .await?;
        }
        Role::Admin => {}
    }

    Ok(Json(load_profile(&state, &user).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::db::models::Role;
    use crate::test_support::{seed_profile, send, test_state, token_for};

    #[tokio::test]
    async fn instructor_profile_updates_both_tables() {
        let state = test_state().await;
        seed_profile(&state, "ins_1", "Old Name", Role::Instructor).await;
        let token = token_for("ins_1");

        let (status, body) = send(
            &state,
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({
                "full_name": "New Name",
                "bio": "Teaches Rust",
                "bank_name": "First Bank",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["full_name"], "New Name");
        assert_eq!(body["bio"], "Teaches Rust");
        assert_eq!(body["bank_name"], "First Bank");
    }

    #[tokio::test]
    async fn partial_update_keeps_existing_detail_fields() {
        let state = test_state().await;
        seed_profile(&state, "stu_1", "Student", Role::Student).await;
        let token = token_for("stu_1");

        send(
            &state,
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({ "institution": "State University" })),
        )
        .await;
        let (_, body) = send(
            &state,
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({ "bio": "Learning" })),
        )
        .await;

        assert_eq!(body["institution"], "State University");
        assert_eq!(body["bio"], "Learning");
    }

    #[tokio::test]
    async fn admin_detail_fields_are_rejected_not_dropped() {
        let state = test_state().await;
        seed_profile(&state, "adm_1", "Admin", Role::Admin).await;
        let token = token_for("adm_1");

        let (status, body) = send(
            &state,
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({ "bio": "No table for this" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Admin"));

        // The name alone still updates.
        let (status, body) = send(
            &state,
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({ "full_name": "Root Admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["full_name"], "Root Admin");
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let state = test_state().await;
        seed_profile(&state, "stu_1", "Student", Role::Student).await;

        let (status, _) = send(
            &state,
            Method::PATCH,
            "/api/profile",
            Some(&token_for("stu_1")),
            Some(json!({ "full_name": " " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
