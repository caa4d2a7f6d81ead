// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::scoring::{ChapterScores, GradedAnswer, ResponseInput, SubjectScores};

/// Represents the 'attempts' table: one user's run through a test.
///
/// Status transitions only `in-progress -> completed`, exactly once; the
/// transition is a conditional UPDATE filtered on the current status, so a
/// concurrent double-submit loses the race and sees NotFound.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,

    /// 'in-progress' or 'completed'.
    pub status: String,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub time_taken_sec: Option<i64>,

    /// Graded answers, empty while in progress.
    pub answers: Json<Vec<GradedAnswer>>,

    /// Count of correct answers.
    pub score: i64,

    /// Fixed at start from the test's question list; does not shrink when
    /// fewer responses are submitted.
    pub total_questions: i64,

    pub score_percentage: f64,

    pub subject_scores: Json<SubjectScores>,
    pub chapter_scores: Json<ChapterScores>,
}

/// Row shape for attempt history listings (joined with the test title).
#[derive(Debug, Serialize, FromRow)]
pub struct AttemptSummary {
    pub id: i64,
    pub test_id: i64,
    pub test_title: String,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub score: i64,
    pub total_questions: i64,
    pub score_percentage: f64,
}

/// DTO for starting an attempt.
#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub test_id: i64,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub attempt_id: i64,
    pub responses: Vec<ResponseInput>,
    /// Client-reported completion time; defaults to the server clock.
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub time_taken_sec: Option<i64>,
}
