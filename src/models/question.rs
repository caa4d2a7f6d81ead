// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Curriculum subject (e.g., "Biology").
    pub subject: String,

    /// Chapter within the subject (e.g., "Cells").
    pub chapter: String,

    /// The text content of the question.
    pub content: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// The correct answer: a JSON string for single-choice questions, a JSON
    /// array of strings for multiple-choice. Grading compares structurally.
    pub correct_answer: Json<serde_json::Value>,

    /// Difficulty label (e.g., 'easy', 'medium', 'hard').
    pub difficulty: String,

    /// Exam level the question targets (e.g., 'NEET', 'JEE').
    pub level: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to a test-taker (excludes the correct answer).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub subject: String,
    pub chapter: String,
    pub content: String,
    pub options: Json<Vec<String>>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            subject: q.subject,
            chapter: q.chapter,
            content: q.content,
            options: q.options,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 100))]
    pub chapter: String,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    /// String or array of strings; anything else is rejected in the handler.
    pub correct_answer: serde_json::Value,
    #[validate(length(min = 1, max = 20))]
    pub difficulty: String,
    #[validate(length(min = 1, max = 50))]
    pub level: String,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
