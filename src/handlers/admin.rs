// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::CreateQuestionRequest,
        section::{CreateSectionRequest, Section},
        test::CreateTestRequest,
        user::User,
    },
    utils::hash::hash_password,
};

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role, section_id, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// DTO for Admin creating a user (can specify role and section).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    /// 'student', 'teacher' or 'admin'.
    pub role: String,
    pub section_id: Option<i64>,
}

/// Creates a new user with a specific role.
/// Admin only.
pub async fn create_user(
    State(pool): State<PgPool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if !["student", "teacher", "admin"].contains(&payload.role.as_str()) {
        return Err(AppError::BadRequest("Invalid role".to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, password, role, section_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&payload.username)
    .bind(&hashed_password)
    .bind(&payload.role)
    .bind(payload.section_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to create user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub role: Option<String>,
    pub section_id: Option<i64>,
    pub password: Option<String>,
}

/// Updates role, section assignment or password of a user.
/// Admin only.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Check existence
    sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    // Perform updates sequentially if fields are present
    if let Some(new_role) = payload.role {
        if !["student", "teacher", "admin"].contains(&new_role.as_str()) {
            return Err(AppError::BadRequest("Invalid role".to_string()));
        }
        sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(&new_role)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_section) = payload.section_id {
        sqlx::query("UPDATE users SET section_id = $1 WHERE id = $2")
            .bind(new_section)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    if let Some(new_password) = payload.password {
        let hashed = hash_password(&new_password)?;
        sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(&hashed)
            .bind(id)
            .execute(&pool)
            .await?;
    }

    Ok(Json(serde_json::json!({"message": "User updated"})))
}

/// Deletes a user and their attempts.
/// Admin only.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a section.
/// Admin only.
pub async fn create_section(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateSectionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar("INSERT INTO sections (name) VALUES ($1) RETURNING id")
        .bind(&payload.name)
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create section: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Lists all sections.
/// Admin only.
pub async fn list_sections(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let sections = sqlx::query_as::<_, Section>(
        "SELECT id, name, created_at FROM sections ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(sections))
}

/// Creates a new question in the catalog.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    // The answer key must be a string or an array of strings.
    let answer_ok = match &payload.correct_answer {
        serde_json::Value::String(_) => true,
        serde_json::Value::Array(items) => {
            !items.is_empty() && items.iter().all(|i| i.is_string())
        }
        _ => false,
    };
    if !answer_ok {
        return Err(AppError::BadRequest(
            "correct_answer must be a string or a non-empty array of strings".to_string(),
        ));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (subject, chapter, content, options, correct_answer, difficulty, level)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&payload.subject)
    .bind(&payload.chapter)
    .bind(&payload.content)
    .bind(sqlx::types::Json(&payload.options))
    .bind(sqlx::types::Json(&payload.correct_answer))
    .bind(&payload.difficulty)
    .bind(&payload.level)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Deletes a question.
/// Admin only.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a test definition.
/// Admin only.
pub async fn create_test(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    // All referenced questions must exist.
    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE id = ANY($1)")
        .bind(&payload.question_ids)
        .fetch_one(&pool)
        .await?;
    if found != payload.question_ids.len() as i64 {
        return Err(AppError::BadRequest(
            "One or more question ids do not exist".to_string(),
        ));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tests (title, level, section_id, question_ids)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.level)
    .bind(payload.section_id)
    .bind(sqlx::types::Json(&payload.question_ids))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create test: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Deletes a test definition.
/// Admin only.
pub async fn delete_test(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM tests WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
