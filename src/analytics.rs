// src/analytics.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scoring::{ChapterScores, ScoreBucket, SubjectScores, round2};

/// One completed attempt, as read back from storage for aggregation.
#[derive(Debug, Clone)]
pub struct CompletedAttempt {
    pub test_title: String,
    pub completed_at: DateTime<Utc>,
    pub score_percentage: f64,
    pub subject_scores: SubjectScores,
    pub chapter_scores: ChapterScores,
}

/// One point on the trend chart.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressionPoint {
    pub test_name: String,
    pub date: DateTime<Utc>,
    pub score: f64,
    pub subject_scores: SubjectScores,
}

/// Per-user summary, recomputed fresh on every read. Never persisted.
#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub average_score: f64,
    pub tests_taken: usize,
    pub subject_performance: SubjectScores,
    pub chapter_performance: ChapterScores,
    pub score_progression: Vec<ProgressionPoint>,
}

/// Folds a user's completed attempts into summary statistics.
///
/// Subject and chapter performance sum the stored correct/total counts and
/// re-derive percentages from the sums. Averaging the per-attempt percentages
/// instead would over-weight attempts with few questions.
pub fn aggregate(attempts: &[CompletedAttempt]) -> AnalyticsSummary {
    let mut attempts: Vec<&CompletedAttempt> = attempts.iter().collect();
    // Oldest first; stable so same input always yields the same progression.
    attempts.sort_by_key(|a| a.completed_at);

    let tests_taken = attempts.len();
    let average_score = if tests_taken == 0 {
        0.0
    } else {
        round2(attempts.iter().map(|a| a.score_percentage).sum::<f64>() / tests_taken as f64)
    };

    let mut subject_counts: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    let mut chapter_counts: BTreeMap<String, BTreeMap<String, (i64, i64)>> = BTreeMap::new();
    let mut score_progression = Vec::with_capacity(tests_taken);

    for attempt in &attempts {
        for (subject, bucket) in &attempt.subject_scores {
            let counts = subject_counts.entry(subject.clone()).or_default();
            counts.0 += bucket.correct;
            counts.1 += bucket.total;
        }
        for (subject, chapters) in &attempt.chapter_scores {
            let by_chapter = chapter_counts.entry(subject.clone()).or_default();
            for (chapter, bucket) in chapters {
                let counts = by_chapter.entry(chapter.clone()).or_default();
                counts.0 += bucket.correct;
                counts.1 += bucket.total;
            }
        }
        score_progression.push(ProgressionPoint {
            test_name: attempt.test_title.clone(),
            date: attempt.completed_at,
            score: attempt.score_percentage,
            subject_scores: attempt.subject_scores.clone(),
        });
    }

    let subject_performance = subject_counts
        .into_iter()
        .map(|(subject, (correct, total))| (subject, ScoreBucket::finalize(correct, total)))
        .collect();

    let chapter_performance = chapter_counts
        .into_iter()
        .map(|(subject, chapters)| {
            let rollups = chapters
                .into_iter()
                .map(|(chapter, (correct, total))| (chapter, ScoreBucket::finalize(correct, total)))
                .collect();
            (subject, rollups)
        })
        .collect();

    AnalyticsSummary {
        average_score,
        tests_taken,
        subject_performance,
        chapter_performance,
        score_progression,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn subject(entries: &[(&str, i64, i64)]) -> SubjectScores {
        entries
            .iter()
            .map(|(name, correct, total)| (name.to_string(), ScoreBucket::finalize(*correct, *total)))
            .collect()
    }

    fn attempt(day: u32, title: &str, score: f64, subjects: SubjectScores) -> CompletedAttempt {
        CompletedAttempt {
            test_title: title.to_string(),
            completed_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            score_percentage: score,
            subject_scores: subjects,
            chapter_scores: ChapterScores::new(),
        }
    }

    #[test]
    fn empty_history_yields_zeroed_summary() {
        let summary = aggregate(&[]);
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.tests_taken, 0);
        assert!(summary.subject_performance.is_empty());
        assert!(summary.chapter_performance.is_empty());
        assert!(summary.score_progression.is_empty());
    }

    #[test]
    fn sums_counts_instead_of_averaging_percentages() {
        // One attempt 1/1 (100%), one attempt 0/9 (0%). Count-based rollup
        // gives 1/10 = 10%, not the naive (100+0)/2 = 50%.
        let attempts = vec![
            attempt(1, "Mini test", 100.0, subject(&[("Math", 1, 1)])),
            attempt(2, "Full test", 0.0, subject(&[("Math", 0, 9)])),
        ];

        let summary = aggregate(&attempts);
        assert_eq!(
            summary.subject_performance["Math"],
            ScoreBucket::finalize(1, 10)
        );
        assert_eq!(summary.subject_performance["Math"].percentage, 10.0);
        assert_eq!(summary.average_score, 50.0);
    }

    #[test]
    fn biology_counts_sum_to_expected_percentage() {
        let attempts = vec![
            attempt(1, "Mock A", 80.0, subject(&[("Biology", 8, 10)])),
            attempt(2, "Mock B", 60.0, subject(&[("Biology", 3, 5)])),
        ];

        let summary = aggregate(&attempts);
        let biology = &summary.subject_performance["Biology"];
        assert_eq!(biology.correct, 11);
        assert_eq!(biology.total, 15);
        assert_eq!(biology.percentage, 73.33);
    }

    #[test]
    fn progression_is_chronological_and_idempotent() {
        // Deliberately out of order on input.
        let attempts = vec![
            attempt(20, "Third", 90.0, subject(&[("Math", 9, 10)])),
            attempt(5, "First", 50.0, subject(&[("Math", 5, 10)])),
            attempt(12, "Second", 70.0, subject(&[("Math", 7, 10)])),
        ];

        let first = aggregate(&attempts);
        let names: Vec<&str> = first
            .score_progression
            .iter()
            .map(|p| p.test_name.as_str())
            .collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);

        let second = aggregate(&attempts);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn chapter_performance_sums_across_attempts() {
        let mut chapters_a = ChapterScores::new();
        chapters_a.insert(
            "Biology".to_string(),
            [("Cells".to_string(), ScoreBucket::finalize(4, 5))]
                .into_iter()
                .collect(),
        );
        let mut chapters_b = ChapterScores::new();
        chapters_b.insert(
            "Biology".to_string(),
            [("Cells".to_string(), ScoreBucket::finalize(1, 5))]
                .into_iter()
                .collect(),
        );

        let mut a = attempt(1, "A", 80.0, subject(&[("Biology", 4, 5)]));
        a.chapter_scores = chapters_a;
        let mut b = attempt(2, "B", 20.0, subject(&[("Biology", 1, 5)]));
        b.chapter_scores = chapters_b;

        let summary = aggregate(&[a, b]);
        assert_eq!(
            summary.chapter_performance["Biology"]["Cells"],
            ScoreBucket::finalize(5, 10)
        );
    }
}
