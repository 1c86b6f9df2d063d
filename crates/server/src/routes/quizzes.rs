use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::enrollments::has_completed_enrollment,
    services::grading::{score, AnswerSheet, QuestionKey},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lesson/:lesson_id", get(get_or_create_quiz))
        .route("/:id/questions", put(save_questions))
        .route("/:id/check", post(check_answers))
        .route("/questions/:id", delete(delete_question))
}

#[derive(Debug, Deserialize)]
pub struct QuestionInput {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option: i64,
}

#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub id: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option: i64,
}

#[derive(Debug, Serialize)]
pub struct QuizResponse {
    pub id: String,
    pub lesson_id: String,
    pub title: String,
    pub questions: Vec<QuestionResponse>,
}

#[derive(Debug, Deserialize)]
pub struct SaveQuestionsRequest {
    pub questions: Vec<QuestionInput>,
}

async fn quiz_course_owner(pool: &sqlx::SqlitePool, quiz_id: &str) -> Result<(String, String)> {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT c.id, c.instructor_id FROM quizzes q \
         JOIN lessons l ON q.lesson_id = l.id \
         JOIN modules m ON l.module_id = m.id \
         JOIN courses c ON m.course_id = c.id WHERE q.id = ?",
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    Ok(row)
}

async fn load_questions(pool: &sqlx::SqlitePool, quiz_id: &str) -> Result<Vec<QuestionResponse>> {
    // No position column on questions: insertion order is the read order.
    let rows = sqlx::query_as::<_, (String, String, String, i64)>(
        "SELECT id, question_text, options, correct_option FROM questions \
         WHERE quiz_id = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, question_text, options, correct_option)| QuestionResponse {
            id,
            question_text,
            options: serde_json::from_str(&options).unwrap_or_default(),
            correct_option,
        })
        .collect())
}

/// Authoring entry point: fetches the lesson's quiz, creating an empty one
/// on the first visit.
async fn get_or_create_quiz(
    State(state): State<AppState>,
    user: AuthUser,
    Path(lesson_id): Path<String>,
) -> Result<Json<QuizResponse>> {
    let lesson = sqlx::query_as::<_, (String, String)>(
        "SELECT l.title, c.instructor_id FROM lessons l \
         JOIN modules m ON l.module_id = m.id \
         JOIN courses c ON m.course_id = c.id WHERE l.id = ?",
    )
    .bind(&lesson_id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

    if lesson.1 != user.id {
        return Err(AppError::Forbidden(
            "Only the course instructor can author this quiz".to_string(),
        ));
    }

    let existing = sqlx::query_as::<_, (String, String)>(
        "SELECT id, title FROM quizzes WHERE lesson_id = ?",
    )
    .bind(&lesson_id)
    .fetch_optional(&state.db.pool)
    .await?;

    let (quiz_id, title) = match existing {
        Some(q) => q,
        None => {
            let quiz_id = Uuid::new_v4().to_string();
            let title = format!("Practice: {}", lesson.0);
            sqlx::query(
                "INSERT INTO quizzes (id, lesson_id, title, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&quiz_id)
            .bind(&lesson_id)
            .bind(&title)
            .bind(Utc::now().to_rfc3339())
            .execute(&state.db.pool)
            .await?;
            (quiz_id, title)
        }
    };

    let questions = load_questions(&state.db.pool, &quiz_id).await?;

    Ok(Json(QuizResponse {
        id: quiz_id,
        lesson_id,
        title,
        questions,
    }))
}

/// Bulk replace-on-save: validates the whole set up front, then swaps the
/// persisted questions for the submitted ones in a single transaction so a
/// concurrent reader never observes an empty quiz. Question ids are
/// regenerated on every save.
async fn save_questions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(quiz_id): Path<String>,
    Json(body): Json<SaveQuestionsRequest>,
) -> Result<Json<QuizResponse>> {
    let (_, owner) = quiz_course_owner(&state.db.pool, &quiz_id).await?;
    if owner != user.id {
        return Err(AppError::Forbidden(
            "Only the course instructor can author this quiz".to_string(),
        ));
    }

    if body.questions.is_empty() {
        return Err(AppError::Validation(
            "A quiz needs at least one question".to_string(),
        ));
    }

    for (index, question) in body.questions.iter().enumerate() {
        if question.question_text.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "Question {}: text is required",
                index + 1
            )));
        }
        if question.options.is_empty() || question.options.iter().any(|o| o.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "Question {}: every option needs text",
                index + 1
            )));
        }
        if question.correct_option < 0 || question.correct_option >= question.options.len() as i64 {
            return Err(AppError::Validation(format!(
                "Question {}: correct option is out of range",
                index + 1
            )));
        }
    }

    let now = Utc::now().to_rfc3339();

    let mut tx = state.db.pool.begin().await?;

    sqlx::query("DELETE FROM questions WHERE quiz_id = ?")
        .bind(&quiz_id)
        .execute(&mut *tx)
        .await?;

    for question in &body.questions {
        let options = serde_json::to_string(&question.options)
            .map_err(|e| AppError::Internal(format!("Failed to encode options: {e}")))?;

        sqlx::query(
            "INSERT INTO questions (id, quiz_id, question_text, options, correct_option, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&quiz_id)
        .bind(&question.question_text)
        .bind(&options)
        .bind(question.correct_option)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let (lesson_id, title) = sqlx::query_as::<_, (String, String)>(
        "SELECT lesson_id, title FROM quizzes WHERE id = ?",
    )
    .bind(&quiz_id)
    .fetch_one(&state.db.pool)
    .await?;

    let questions = load_questions(&state.db.pool, &quiz_id).await?;

    Ok(Json(QuizResponse {
        id: quiz_id,
        lesson_id,
        title,
        questions,
    }))
}

/// Removes one persisted question. Unsaved questions only ever exist in the
/// authoring client and never reach this endpoint.
async fn delete_question(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let owner = sqlx::query_scalar::<_, String>(
        "SELECT c.instructor_id FROM questions qn \
         JOIN quizzes q ON qn.quiz_id = q.id \
         JOIN lessons l ON q.lesson_id = l.id \
         JOIN modules m ON l.module_id = m.id \
         JOIN courses c ON m.course_id = c.id WHERE qn.id = ?",
    )
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    if owner != user.id {
        return Err(AppError::Forbidden(
            "Only the course instructor can author this quiz".to_string(),
        ));
    }

    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}

// Read-time grading: nothing is persisted, no score aggregate exists.

#[derive(Debug, Deserialize)]
pub struct SelectionInput {
    pub question_id: String,
    pub option: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckAnswersRequest {
    pub selections: Vec<SelectionInput>,
}

#[derive(Debug, Serialize)]
pub struct CheckAnswersResponse {
    pub quiz_id: String,
    pub results: Vec<crate::services::grading::GradedAnswer>,
    pub correct: usize,
    pub total: usize,
}

async fn check_answers(
    State(state): State<AppState>,
    user: AuthUser,
    Path(quiz_id): Path<String>,
    Json(body): Json<CheckAnswersRequest>,
) -> Result<Json<CheckAnswersResponse>> {
    let (course_id, owner) = quiz_course_owner(&state.db.pool, &quiz_id).await?;

    if owner != user.id && !user.is_admin() {
        let enrolled = has_completed_enrollment(&state.db.pool, &user.id, &course_id).await?;
        if !enrolled {
            return Err(AppError::Forbidden(
                "You are not enrolled in this course".to_string(),
            ));
        }
    }

    let key: Vec<QuestionKey> = sqlx::query_as::<_, (String, i64)>(
        "SELECT id, correct_option FROM questions WHERE quiz_id = ? \
         ORDER BY created_at ASC, rowid ASC",
    )
    .bind(&quiz_id)
    .fetch_all(&state.db.pool)
    .await?
    .into_iter()
    .map(|(question_id, correct_option)| QuestionKey {
        question_id,
        correct_option,
    })
    .collect();

    // Selections are applied in submission order, so re-selecting a
    // question keeps only the last choice.
    let mut sheet = AnswerSheet::new();
    for selection in &body.selections {
        sheet.select(&selection.question_id, selection.option);
    }

    let results = sheet.grade(&key);
    let (correct, total) = score(&results);

    Ok(Json(CheckAnswersResponse {
        quiz_id,
        results,
        correct,
        total,
    }))
}
