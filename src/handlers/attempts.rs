// src/handlers/attempts.rs

use std::collections::HashMap;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use sqlx::{PgPool, types::Json as SqlJson};

use crate::{
    analytics::{self, CompletedAttempt},
    error::AppError,
    models::{
        attempt::{Attempt, AttemptSummary, StartAttemptRequest, SubmitAttemptRequest},
        test::Test,
    },
    scoring::{self, AnswerKey, ChapterScores, SubjectScores},
    utils::jwt::Claims,
};

/// Helper struct for fetching answer keys from the database.
#[derive(sqlx::FromRow)]
struct AnswerKeyRow {
    id: i64,
    subject: String,
    chapter: String,
    correct_answer: SqlJson<serde_json::Value>,
}

/// Starts a new attempt for a test.
///
/// Resolves `total_questions` from the test's question list; that denominator
/// stays fixed for the attempt's lifetime. Section-restricted tests are
/// invisible to users outside the section, so starting one fails with 404.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let section_id: Option<i64> = sqlx::query_scalar("SELECT section_id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::AuthError("Unknown user".to_string()))?;

    let test = sqlx::query_as::<_, Test>(
        r#"
        SELECT id, title, level, section_id, question_ids, created_at
        FROM tests
        WHERE id = $1 AND (section_id IS NULL OR section_id = $2)
        "#,
    )
    .bind(req.test_id)
    .bind(section_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let total_questions = test.question_ids.0.len() as i64;

    let attempt_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO attempts (user_id, test_id, status, total_questions)
        VALUES ($1, $2, 'in-progress', $3)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(test.id)
    .bind(total_questions)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(serde_json::json!({
        "attempt_id": attempt_id,
        "total_questions": total_questions,
    })))
}

/// Grades and finalizes an in-progress attempt.
///
/// The attempt must belong to the caller and still be 'in-progress'. The
/// final transition is a conditional UPDATE filtered on that status, so of two
/// concurrent submissions exactly one succeeds; the loser gets 404.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.responses.is_empty() {
        return Err(AppError::BadRequest("No responses submitted".to_string()));
    }

    let user_id = claims.user_id()?;

    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT id, user_id, test_id, status, started_at, completed_at,
               time_taken_sec, answers, score, total_questions,
               score_percentage, subject_scores, chapter_scores
        FROM attempts
        WHERE id = $1 AND user_id = $2 AND status = 'in-progress'
        "#,
    )
    .bind(req.attempt_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(
        "Attempt not found or already completed".to_string(),
    ))?;

    let question_ids: Vec<i64> = req.responses.iter().map(|r| r.question_id).collect();

    let key_rows: Vec<AnswerKeyRow> = sqlx::query_as(
        r#"
        SELECT id, subject, chapter, correct_answer
        FROM questions
        WHERE id = ANY($1)
        "#,
    )
    .bind(&question_ids)
    .fetch_all(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let keys: HashMap<i64, AnswerKey> = key_rows
        .into_iter()
        .map(|row| {
            (
                row.id,
                AnswerKey {
                    subject: row.subject,
                    chapter: row.chapter,
                    correct_answer: row.correct_answer.0,
                },
            )
        })
        .collect();

    let paper = scoring::grade(&req.responses, &keys);
    // Denominator fixed at start time; missing responses count as wrong.
    let score_percentage = scoring::percentage(paper.score, attempt.total_questions);
    let completed_at = req.completed_at.unwrap_or_else(Utc::now);

    let updated = sqlx::query(
        r#"
        UPDATE attempts
        SET status = 'completed',
            completed_at = $1,
            time_taken_sec = $2,
            answers = $3,
            score = $4,
            score_percentage = $5,
            subject_scores = $6,
            chapter_scores = $7
        WHERE id = $8 AND user_id = $9 AND status = 'in-progress'
        "#,
    )
    .bind(completed_at)
    .bind(req.time_taken_sec)
    .bind(SqlJson(&paper.answers))
    .bind(paper.score)
    .bind(score_percentage)
    .bind(SqlJson(&paper.subject_scores))
    .bind(SqlJson(&paper.chapter_scores))
    .bind(attempt.id)
    .bind(user_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to finalize attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    // Lost a concurrent submit race after our read.
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Attempt not found or already completed".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({
        "attempt_id": attempt.id,
        "score": paper.score,
        "total_questions": attempt.total_questions,
        "score_percentage": score_percentage,
        "subject_scores": paper.subject_scores,
        "chapter_scores": paper.chapter_scores,
        "message": "Attempt submitted successfully"
    })))
}

/// Lists the caller's completed attempts, most recent first.
pub async fn my_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_as::<_, AttemptSummary>(
        r#"
        SELECT a.id, a.test_id, t.title AS test_title, a.completed_at,
               a.score, a.total_questions, a.score_percentage
        FROM attempts a
        JOIN tests t ON t.id = a.test_id
        WHERE a.user_id = $1 AND a.status = 'completed'
        ORDER BY a.completed_at DESC
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}

/// Row shape for the analytics fold.
#[derive(sqlx::FromRow)]
struct CompletedAttemptRow {
    test_title: String,
    completed_at: chrono::DateTime<chrono::Utc>,
    score_percentage: f64,
    subject_scores: SqlJson<SubjectScores>,
    chapter_scores: SqlJson<ChapterScores>,
}

/// Computes the caller's analytics summary over all completed attempts.
/// Recomputed fresh on every request; nothing derived is persisted.
pub async fn my_analytics(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<CompletedAttemptRow> = sqlx::query_as(
        r#"
        SELECT t.title AS test_title,
               COALESCE(a.completed_at, a.started_at) AS completed_at,
               a.score_percentage, a.subject_scores, a.chapter_scores
        FROM attempts a
        JOIN tests t ON t.id = a.test_id
        WHERE a.user_id = $1 AND a.status = 'completed'
        ORDER BY a.completed_at ASC
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load attempts for analytics: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let attempts: Vec<CompletedAttempt> = rows
        .into_iter()
        .map(|row| CompletedAttempt {
            test_title: row.test_title,
            completed_at: row.completed_at,
            score_percentage: row.score_percentage,
            subject_scores: row.subject_scores.0,
            chapter_scores: row.chapter_scores.0,
        })
        .collect();

    Ok(Json(analytics::aggregate(&attempts)))
}
