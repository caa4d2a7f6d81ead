// src/handlers/catalog.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        question::{PublicQuestion, Question},
        test::{Test, TestSummary},
    },
    utils::jwt::Claims,
};

/// Looks up the caller's section id from the users table.
async fn caller_section(pool: &PgPool, claims: &Claims) -> Result<Option<i64>, AppError> {
    let row: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT section_id FROM users WHERE id = $1")
            .bind(claims.user_id()?)
            .fetch_optional(pool)
            .await?;

    row.map(|(section_id,)| section_id)
        .ok_or(AppError::AuthError("Unknown user".to_string()))
}

/// Lists the tests visible to the caller, most recent first.
///
/// Tests without a section restriction are visible to everyone; restricted
/// tests only to users of the matching section.
pub async fn list_tests(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let section_id = caller_section(&pool, &claims).await?;

    let tests = sqlx::query_as::<_, TestSummary>(
        r#"
        SELECT
            id,
            title,
            level,
            jsonb_array_length(question_ids)::BIGINT AS question_count,
            created_at
        FROM tests
        WHERE section_id IS NULL OR section_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(section_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list tests: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(tests))
}

/// Returns one test with its questions, correct answers hidden.
pub async fn get_test(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let section_id = caller_section(&pool, &claims).await?;

    let test = sqlx::query_as::<_, Test>(
        r#"
        SELECT id, title, level, section_id, question_ids, created_at
        FROM tests
        WHERE id = $1 AND (section_id IS NULL OR section_id = $2)
        "#,
    )
    .bind(id)
    .bind(section_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Test not found".to_string()))?;

    let questions = if test.question_ids.0.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as::<_, Question>(
            r#"
            SELECT id, subject, chapter, content, options, correct_answer,
                   difficulty, level, created_at
            FROM questions
            WHERE id = ANY($1)
            ORDER BY array_position($1, id)
            "#,
        )
        .bind(&test.question_ids.0)
        .fetch_all(&pool)
        .await?
    };

    // Map to PublicQuestion to hide the answer key
    let public_questions: Vec<PublicQuestion> =
        questions.into_iter().map(PublicQuestion::from).collect();

    Ok(Json(serde_json::json!({
        "id": test.id,
        "title": test.title,
        "level": test.level,
        "questions": public_questions,
    })))
}
