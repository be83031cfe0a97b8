use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{debug, info};

use crate::{
    attempts::AttemptRecord,
    config::DetectorConfig,
    scoring::{compute_overall_score, mean},
};

pub const UNKNOWN_STUDENT: &str = "Unknown";

const CONCEPT_PREFIX: &str = "concept_gap_";
const CONFIDENCE_KEY: &str = "confidence_gap";
const SPEED_KEY: &str = "speed_gap";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Ranking weight used when ordering recommendations.
    pub fn weight(self) -> u8 {
        match self {
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Rough time needed to close a gap of this severity.
    pub fn improvement_time(self) -> &'static str {
        match self {
            Severity::High => "2-3 weeks",
            Severity::Medium => "1-2 weeks",
            Severity::Low => "3-5 days",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// What kind of gap was detected.
///
/// Concept topics are stored in key form (lowercase, spaces as underscores),
/// so two spellings of one topic map to the same gap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GapKind {
    Concept { topic: String },
    Confidence,
    Speed,
}

impl GapKind {
    pub fn concept(topic: &str) -> Self {
        GapKind::Concept {
            topic: topic.to_lowercase().replace(' ', "_"),
        }
    }

    /// Display key, e.g. `concept_gap_long_division` or `speed_gap`.
    pub fn key(&self) -> String {
        match self {
            GapKind::Concept { topic } => format!("{CONCEPT_PREFIX}{topic}"),
            GapKind::Confidence => CONFIDENCE_KEY.to_string(),
            GapKind::Speed => SPEED_KEY.to_string(),
        }
    }

    pub fn parse_key(key: &str) -> Option<Self> {
        match key {
            CONFIDENCE_KEY => Some(GapKind::Confidence),
            SPEED_KEY => Some(GapKind::Speed),
            _ => key
                .strip_prefix(CONCEPT_PREFIX)
                .filter(|topic| !topic.is_empty())
                .map(GapKind::concept),
        }
    }

    /// Human-facing topic name for concept gaps: underscores become spaces
    /// and each word is capitalized.
    pub fn topic_title(&self) -> Option<String> {
        match self {
            GapKind::Concept { topic } => Some(title_case(&topic.replace('_', " "))),
            _ => None,
        }
    }
}

impl fmt::Display for GapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<GapKind> for String {
    fn from(kind: GapKind) -> Self {
        kind.key()
    }
}

impl TryFrom<String> for GapKind {
    type Error = String;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        GapKind::parse_key(&key).ok_or_else(|| format!("unknown gap key: {key}"))
    }
}

/// Uppercase the first letter of every run of letters, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;

    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }

    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapEntry {
    pub severity: Severity,
    /// Heuristic strength in [0, 1], not a statistical confidence interval.
    pub confidence: f64,
    pub affected_questions: usize,
    pub description: String,
}

pub type GapMap = IndexMap<GapKind, GapEntry>;

/// Outcome of analyzing one student's attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub student_id: String,
    pub total_attempts: usize,
    pub correct_answers: usize,
    pub accuracy: f64,
    pub avg_time: f64,
    /// Gaps in detection order: concept gaps by topic, then confidence, then speed.
    pub gaps: GapMap,
    pub overall_score: f64,
}

impl AnalysisResult {
    pub fn empty() -> Self {
        Self {
            student_id: UNKNOWN_STUDENT.to_string(),
            total_attempts: 0,
            correct_answers: 0,
            accuracy: 0.0,
            avg_time: 0.0,
            gaps: GapMap::new(),
            overall_score: 0.0,
        }
    }

    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }
}

/// Runs the concept, confidence and speed detectors over an attempt history.
#[derive(Debug, Clone, Default)]
pub struct GapDetector {
    config: DetectorConfig,
}

impl GapDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, attempts: &[AttemptRecord]) -> AnalysisResult {
        if attempts.is_empty() {
            debug!("No attempts to analyze");
            return AnalysisResult::empty();
        }

        let total_attempts = attempts.len();
        let correct_answers = attempts.iter().filter(|a| a.correct).count();
        let accuracy = correct_answers as f64 / total_attempts as f64;

        let times: Vec<f64> = attempts.iter().map(|a| a.time_taken).collect();
        let avg_time = mean(&times);

        let mut gaps = detect_concept_gaps(attempts, &self.config);
        gaps.extend(detect_confidence_gap(attempts, avg_time, &self.config));
        gaps.extend(detect_speed_gap(attempts, avg_time, &self.config));

        let overall_score = compute_overall_score(accuracy, gaps.len(), &times, &self.config);

        let student_id = attempts[0]
            .student_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_STUDENT.to_string());

        info!(
            student = %student_id,
            attempts = total_attempts,
            accuracy,
            gaps = gaps.len(),
            overall_score,
            "Analysis complete"
        );

        AnalysisResult {
            student_id,
            total_attempts,
            correct_answers,
            accuracy,
            avg_time,
            gaps,
            overall_score,
        }
    }
}

fn wrong_ratio(attempts: &[&AttemptRecord]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    let wrong = attempts.iter().filter(|a| !a.correct).count();
    wrong as f64 / attempts.len() as f64
}

/// Severity bands for topic accuracy. Under the default 0.6 gate the `Low`
/// band is unreachable.
pub fn severity_from_accuracy(accuracy: f64, config: &DetectorConfig) -> Severity {
    if accuracy < config.high_severity_accuracy {
        Severity::High
    } else if accuracy < config.medium_severity_accuracy {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Topics answered poorly across enough attempts. Attempts without a topic,
/// or with a blank one, are ignored.
pub fn detect_concept_gaps(attempts: &[AttemptRecord], config: &DetectorConfig) -> GapMap {
    let mut by_topic: IndexMap<&str, (usize, usize)> = IndexMap::new();

    for attempt in attempts {
        if let Some(topic) = attempt.topic.as_deref().filter(|t| !t.trim().is_empty()) {
            let (total, correct) = by_topic.entry(topic).or_insert((0, 0));
            *total += 1;
            if attempt.correct {
                *correct += 1;
            }
        }
    }

    let mut gaps = GapMap::new();

    for (topic, (total, correct)) in by_topic {
        if total < config.min_attempts_threshold {
            debug!("Skipping topic {topic}: only {total} attempts");
            continue;
        }

        let topic_accuracy = correct as f64 / total as f64;

        if topic_accuracy < config.concept_accuracy_gate {
            debug!("Concept gap in {topic}: accuracy {topic_accuracy:.3}");
            gaps.insert(
                GapKind::concept(topic),
                GapEntry {
                    severity: severity_from_accuracy(topic_accuracy, config),
                    confidence: 1.0 - topic_accuracy,
                    affected_questions: total,
                    description: format!(
                        "Struggling with {topic}: {:.1}% accuracy",
                        topic_accuracy * 100.0
                    ),
                },
            );
        }
    }

    gaps
}

/// Slow answers that are still mostly wrong.
pub fn detect_confidence_gap(
    attempts: &[AttemptRecord],
    avg_time: f64,
    config: &DetectorConfig,
) -> Option<(GapKind, GapEntry)> {
    let threshold = avg_time * config.slow_time_factor;
    let slow: Vec<&AttemptRecord> = attempts
        .iter()
        .filter(|a| a.time_taken > threshold)
        .collect();

    if slow.is_empty() {
        return None;
    }

    let ratio = wrong_ratio(&slow);
    debug!(
        "{} attempts over {threshold:.1}s, {ratio:.3} wrong",
        slow.len()
    );

    if ratio <= config.confidence_gap_ratio {
        return None;
    }

    let severity = if ratio > config.confidence_high_ratio {
        Severity::High
    } else {
        Severity::Medium
    };

    Some((
        GapKind::Confidence,
        GapEntry {
            severity,
            confidence: ratio,
            affected_questions: slow.len(),
            description: format!(
                "Takes excessive time ({threshold:.1}s+) but still gets answers wrong"
            ),
        },
    ))
}

/// Rushed answers that are often wrong.
pub fn detect_speed_gap(
    attempts: &[AttemptRecord],
    avg_time: f64,
    config: &DetectorConfig,
) -> Option<(GapKind, GapEntry)> {
    let threshold = avg_time * config.fast_time_factor;
    let fast: Vec<&AttemptRecord> = attempts
        .iter()
        .filter(|a| a.time_taken < threshold)
        .collect();

    if fast.len() <= config.min_fast_attempts {
        return None;
    }

    let ratio = wrong_ratio(&fast);
    debug!(
        "{} attempts under {threshold:.1}s, {ratio:.3} wrong",
        fast.len()
    );

    if ratio <= config.speed_gap_ratio {
        return None;
    }

    Some((
        GapKind::Speed,
        GapEntry {
            severity: Severity::Medium,
            confidence: ratio,
            affected_questions: fast.len(),
            description: "Answers too quickly without careful consideration".to_string(),
        },
    ))
}
