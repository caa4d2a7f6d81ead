// src/models/section.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'sections' table: an organizational grouping of students
/// above the level of an individual account.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub name: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a section.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSectionRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}
