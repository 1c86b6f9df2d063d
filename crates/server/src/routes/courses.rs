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
        .route("/", get(list_courses).post(create_course))
        .route("/mine", get(list_own_courses))
        .route("/:id", get(get_course).patch(update_course))
        .route("/:id/publish", post(toggle_publish))
        .route("/:id/learn", get(learn_course))
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub is_published: bool,
    pub instructor_id: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CourseListResponse {
    pub courses: Vec<CourseResponse>,
}

type CourseRow = (String, String, String, f64, String, bool, String, String);

fn course_response(row: CourseRow) -> CourseResponse {
    let (id, title, description, price, category, is_published, instructor_id, created_at) = row;
    CourseResponse {
        id,
        title,
        description,
        price,
        category,
        is_published,
        instructor_id,
        created_at,
    }
}

const COURSE_COLUMNS: &str =
    "id, title, description, price, category, is_published, instructor_id, created_at";

// Helper to check that the acting user owns the course. Publication
// moderation is the only mutation admins may perform on foreign courses.
pub(crate) async fn check_course_owner(
    pool: &sqlx::SqlitePool,
    course_id: &str,
    user_id: &str,
) -> Result<()> {
    let owner = sqlx::query_scalar::<_, String>("SELECT instructor_id FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    if owner != user_id {
        return Err(AppError::Forbidden(
            "Only the course instructor can modify this course".to_string(),
        ));
    }
    Ok(())
}

async fn create_course(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateCourseRequest>,
) -> Result<Json<CourseResponse>> {
    if !user.is_instructor() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only instructors can create courses".to_string(),
        ));
    }
    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Course title is required".to_string()));
    }
    if body.price < 0.0 {
        return Err(AppError::Validation(
            "Price must be zero or positive".to_string(),
        ));
    }

    let course_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO courses (id, title, description, price, category, is_published, instructor_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&course_id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(body.price)
    .bind(&body.category)
    .bind(false)
    .bind(&user.id)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(CourseResponse {
        id: course_id,
        title: body.title,
        description: body.description,
        price: body.price,
        category: body.category,
        is_published: false,
        instructor_id: user.id,
        created_at: now,
    }))
}

/// Public catalog: published courses only.
async fn list_courses(State(state): State<AppState>) -> Result<Json<CourseListResponse>> {
    let rows = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE is_published = 1 ORDER BY created_at DESC"
    ))
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(CourseListResponse {
        courses: rows.into_iter().map(course_response).collect(),
    }))
}

async fn list_own_courses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CourseListResponse>> {
    let rows = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE instructor_id = ? ORDER BY created_at DESC"
    ))
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(CourseListResponse {
        courses: rows.into_iter().map(course_response).collect(),
    }))
}

async fn get_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CourseResponse>> {
    let row = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"
    ))
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    // Drafts are visible to their instructor and to admins only.
    if !row.5 && row.6 != user.id && !user.is_admin() {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    Ok(Json(course_response(row)))
}

async fn update_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateCourseRequest>,
) -> Result<Json<CourseResponse>> {
    check_course_owner(&state.db.pool, &id, &user.id).await?;

    if let Some(title) = &body.title {
        if title.trim().is_empty() {
            return Err(AppError::Validation("Course title is required".to_string()));
        }
    }
    if let Some(price) = body.price {
        if price < 0.0 {
            return Err(AppError::Validation(
                "Price must be zero or positive".to_string(),
            ));
        }
    }

    let current = sqlx::query_as::<_, CourseRow>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"
    ))
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    let title = body.title.unwrap_or(current.1);
    let description = body.description.unwrap_or(current.2);
    let price = body.price.unwrap_or(current.3);
    let category = body.category.unwrap_or(current.4);

    sqlx::query("UPDATE courses SET title = ?, description = ?, price = ?, category = ? WHERE id = ?")
        .bind(&title)
        .bind(&description)
        .bind(price)
        .bind(&category)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(CourseResponse {
        id,
        title,
        description,
        price,
        category,
        is_published: current.5,
        instructor_id: current.6,
        created_at: current.7,
    }))
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub id: String,
    pub is_published: bool,
}

async fn toggle_publish(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PublishResponse>> {
    let row = sqlx::query_as::<_, (String, bool)>(
        "SELECT instructor_id, is_published FROM courses WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    if row.0 != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the course instructor or an admin can change publication".to_string(),
        ));
    }

    let is_published = !row.1;
    sqlx::query("UPDATE courses SET is_published = ? WHERE id = ?")
        .bind(is_published)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(PublishResponse { id, is_published }))
}

// Learn view: the full curriculum snapshot a learner consumes.

#[derive(Debug, Serialize)]
pub struct LearnQuestion {
    pub id: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option: i64,
}

#[derive(Debug, Serialize)]
pub struct LearnQuiz {
    pub id: String,
    pub title: String,
    pub questions: Vec<LearnQuestion>,
}

#[derive(Debug, Serialize)]
pub struct LearnLesson {
    pub id: String,
    pub title: String,
    pub video_url: Option<String>,
    pub content: Option<String>,
    pub position: i64,
    pub quiz: Option<LearnQuiz>,
}

#[derive(Debug, Serialize)]
pub struct LearnModule {
    pub id: String,
    pub title: String,
    pub position: i64,
    pub lessons: Vec<LearnLesson>,
}

#[derive(Debug, Serialize)]
pub struct LearnCourseResponse {
    pub id: String,
    pub title: String,
    pub modules: Vec<LearnModule>,
}

async fn learn_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<LearnCourseResponse>> {
    let course = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id, title, instructor_id FROM courses WHERE id = ?",
    )
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    // Access gate: instructors preview their own course, admins moderate,
    // everyone else needs a completed enrollment. A pending enrollment
    // does not unlock content.
    let is_owner = course.2 == user.id;
    if !is_owner && !user.is_admin() {
        let enrolled = has_completed_enrollment(&state.db.pool, &user.id, &id).await?;
        if !enrolled {
            return Err(AppError::Forbidden(
                "You are not enrolled in this course".to_string(),
            ));
        }
    }

    // Siblings sort by position ascending; gaps from deletions are fine.
    let module_rows = sqlx::query_as::<_, (String, String, i64)>(
        "SELECT id, title, position FROM modules WHERE course_id = ? ORDER BY position ASC",
    )
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    let mut modules = Vec::with_capacity(module_rows.len());
    for (module_id, module_title, module_position) in module_rows {
        let lesson_rows =
            sqlx::query_as::<_, (String, String, Option<String>, Option<String>, i64)>(
                "SELECT id, title, video_url, content, position FROM lessons \
                 WHERE module_id = ? ORDER BY position ASC",
            )
            .bind(&module_id)
            .fetch_all(&state.db.pool)
            .await?;

        let mut lessons = Vec::with_capacity(lesson_rows.len());
        for (lesson_id, lesson_title, video_url, content, lesson_position) in lesson_rows {
            let quiz = load_quiz(&state.db.pool, &lesson_id).await?;
            lessons.push(LearnLesson {
                id: lesson_id,
                title: lesson_title,
                video_url,
                content,
                position: lesson_position,
                quiz,
            });
        }

        modules.push(LearnModule {
            id: module_id,
            title: module_title,
            position: module_position,
            lessons,
        });
    }

    Ok(Json(LearnCourseResponse {
        id: course.0,
        title: course.1,
        modules,
    }))
}

async fn load_quiz(pool: &sqlx::SqlitePool, lesson_id: &str) -> Result<Option<LearnQuiz>> {
    let quiz = sqlx::query_as::<_, (String, String)>(
        "SELECT id, title FROM quizzes WHERE lesson_id = ?",
    )
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?;

    let Some((quiz_id, quiz_title)) = quiz else {
        return Ok(None);
    };

    let question_rows = sqlx::query_as::<_, (String, String, String, i64)>(
        "SELECT id, question_text, options, correct_option FROM questions \
         WHERE quiz_id = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(&quiz_id)
    .fetch_all(pool)
    .await?;

    let questions = question_rows
        .into_iter()
        .map(|(qid, question_text, options, correct_option)| LearnQuestion {
            id: qid,
            question_text,
            options: serde_json::from_str(&options).unwrap_or_default(),
            correct_option,
        })
        .collect();

    Ok(Some(LearnQuiz {
        id: quiz_id,
        title: quiz_title,
        questions,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::db::models::Role;
    use crate::test_support::{seed_profile, send, test_state, token_for};

    #[tokio::test]
    async fn course_creation_requires_instructor_role() {
        let state = test_state().await;
        seed_profile(&state, "stu_1", "Student One", Role::Student).await;
        let token = token_for("stu_1");

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token),
            Some(json!({ "title": "Intro to Rust" })),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("instructors"));
    }

    #[tokio::test]
    async fn empty_title_is_rejected_before_persistence() {
        let state = test_state().await;
        seed_profile(&state, "ins_1", "Instructor", Role::Instructor).await;
        let token = token_for("ins_1");

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token),
            Some(json!({ "title": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses")
                .fetch_one(&state.db.pool)
                .await
                .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn catalog_lists_only_published_courses() {
        let state = test_state().await;
        seed_profile(&state, "ins_1", "Instructor", Role::Instructor).await;
        let token = token_for("ins_1");

        let (_, draft) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token),
            Some(json!({ "title": "Draft" })),
        )
        .await;
        let (_, published) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token),
            Some(json!({ "title": "Live" })),
        )
        .await;
        let publish_uri = format!("/api/courses/{}/publish", published["id"].as_str().unwrap());
        let (status, _) = send(&state, Method::POST, &publish_uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        seed_profile(&state, "stu_1", "Student", Role::Student).await;
        let (_, catalog) = send(
            &state,
            Method::GET,
            "/api/courses",
            Some(&token_for("stu_1")),
            None,
        )
        .await;

        let courses = catalog["courses"].as_array().unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0]["title"], "Live");
        assert_ne!(courses[0]["id"], draft["id"]);
    }

    #[tokio::test]
    async fn only_owner_can_edit_course() {
        let state = test_state().await;
        seed_profile(&state, "ins_1", "Owner", Role::Instructor).await;
        seed_profile(&state, "ins_2", "Other", Role::Instructor).await;

        let (_, course) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token_for("ins_1")),
            Some(json!({ "title": "Mine", "price": 10.0 })),
        )
        .await;
        let uri = format!("/api/courses/{}", course["id"].as_str().unwrap());

        let (status, _) = send(
            &state,
            Method::PATCH,
            &uri,
            Some(&token_for("ins_2")),
            Some(json!({ "title": "Hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated) = send(
            &state,
            Method::PATCH,
            &uri,
            Some(&token_for("ins_1")),
            Some(json!({ "price": 25.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Mine");
        assert_eq!(updated["price"], 25.0);
    }

    #[tokio::test]
    async fn admin_can_toggle_publication_of_foreign_course() {
        let state = test_state().await;
        seed_profile(&state, "ins_1", "Owner", Role::Instructor).await;
        seed_profile(&state, "adm_1", "Admin", Role::Admin).await;

        let (_, course) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token_for("ins_1")),
            Some(json!({ "title": "Moderated" })),
        )
        .await;
        let uri = format!("/api/courses/{}/publish", course["id"].as_str().unwrap());

        let (status, body) = send(&state, Method::POST, &uri, Some(&token_for("adm_1")), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_published"], true);
    }

    #[tokio::test]
    async fn learn_view_is_denied_without_enrollment() {
        let state = test_state().await;
        seed_profile(&state, "ins_1", "Owner", Role::Instructor).await;
        seed_profile(&state, "stu_1", "Student", Role::Student).await;

        let (_, course) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token_for("ins_1")),
            Some(json!({ "title": "Locked" })),
        )
        .await;
        let uri = format!("/api/courses/{}/learn", course["id"].as_str().unwrap());

        let (status, body) = send(&state, Method::GET, &uri, Some(&token_for("stu_1")), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.get("modules").is_none());
    }

    #[tokio::test]
    async fn learn_view_returns_modules_in_position_order() {
        let state = test_state().await;
        seed_profile(&state, "ins_1", "Owner", Role::Instructor).await;
        let token = token_for("ins_1");

        let (_, course) = send(
            &state,
            Method::POST,
            "/api/courses",
            Some(&token),
            Some(json!({ "title": "Ordered", "price": 0.0 })),
        )
        .await;
        let course_id = course["id"].as_str().unwrap().to_string();

        for title in ["First", "Second", "Third"] {
            let (status, _) = send(
                &state,
                Method::POST,
                "/api/modules",
                Some(&token),
                Some(json!({ "course_id": course_id, "title": title })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        // The owner previews without an enrollment row.
        let uri = format!("/api/courses/{course_id}/learn");
        let (status, body) = send(&state, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let titles: Vec<&str> = body["modules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }
}
