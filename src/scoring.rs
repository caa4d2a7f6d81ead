// src/scoring.rs

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single submitted answer, as sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInput {
    pub question_id: i64,
    /// Selected answer: a string for single-choice, an array of strings for
    /// multiple-choice. Compared structurally against the stored key.
    pub selected_answer: Value,
}

/// A graded answer, stored as part of the attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question_id: i64,
    pub selected_answer: Value,
    pub is_correct: bool,
}

/// correct/total counters plus the derived percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub correct: i64,
    pub total: i64,
    pub percentage: f64,
}

impl ScoreBucket {
    pub fn finalize(correct: i64, total: i64) -> Self {
        ScoreBucket {
            correct,
            total,
            percentage: percentage(correct, total),
        }
    }
}

/// subject -> rollup. BTreeMap keeps serialized output deterministic.
pub type SubjectScores = BTreeMap<String, ScoreBucket>;
/// subject -> chapter -> rollup.
pub type ChapterScores = BTreeMap<String, BTreeMap<String, ScoreBucket>>;

/// The answer key for one question: taxonomy plus the stored correct answer.
#[derive(Debug, Clone)]
pub struct AnswerKey {
    pub subject: String,
    pub chapter: String,
    pub correct_answer: Value,
}

/// Result of grading one set of responses.
#[derive(Debug)]
pub struct GradedPaper {
    pub answers: Vec<GradedAnswer>,
    pub score: i64,
    pub subject_scores: SubjectScores,
    pub chapter_scores: ChapterScores,
}

/// Percentage of `correct` out of `total`, rounded to 2 decimal places.
/// Guards the empty denominator.
pub fn percentage(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(correct as f64 / total as f64 * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Grades submitted responses against the answer keys.
///
/// Responses whose question id has no key are silently skipped: they count
/// neither toward the score nor toward the subject/chapter totals. The
/// attempt's `total_questions` denominator is fixed at start time and is NOT
/// derived here, so unanswered questions are effectively graded as wrong.
pub fn grade(responses: &[ResponseInput], keys: &HashMap<i64, AnswerKey>) -> GradedPaper {
    let mut answers = Vec::with_capacity(responses.len());
    let mut score = 0i64;
    let mut subject_counts: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    let mut chapter_counts: BTreeMap<String, BTreeMap<String, (i64, i64)>> = BTreeMap::new();

    for response in responses {
        let Some(key) = keys.get(&response.question_id) else {
            continue;
        };

        // Deep structural equality; array answers are order-sensitive.
        let is_correct = response.selected_answer == key.correct_answer;
        if is_correct {
            score += 1;
        }

        let subject = subject_counts.entry(key.subject.clone()).or_default();
        subject.1 += 1;
        if is_correct {
            subject.0 += 1;
        }

        let chapter = chapter_counts
            .entry(key.subject.clone())
            .or_default()
            .entry(key.chapter.clone())
            .or_default();
        chapter.1 += 1;
        if is_correct {
            chapter.0 += 1;
        }

        answers.push(GradedAnswer {
            question_id: response.question_id,
            selected_answer: response.selected_answer.clone(),
            is_correct,
        });
    }

    let subject_scores = subject_counts
        .into_iter()
        .map(|(subject, (correct, total))| (subject, ScoreBucket::finalize(correct, total)))
        .collect();

    let chapter_scores = chapter_counts
        .into_iter()
        .map(|(subject, chapters)| {
            let rollups = chapters
                .into_iter()
                .map(|(chapter, (correct, total))| (chapter, ScoreBucket::finalize(correct, total)))
                .collect();
            (subject, rollups)
        })
        .collect();

    GradedPaper {
        answers,
        score,
        subject_scores,
        chapter_scores,
    }
}
