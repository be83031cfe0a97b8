use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::{
    analysis::{AnalysisResult, GapEntry, GapKind, Severity},
    config::{MAX_RECOMMENDATIONS, RecommenderConfig},
};

pub const MAINTENANCE_TITLE: &str = "Continued Practice & Advancement";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Priority::Low,
            Severity::Medium => Priority::Medium,
            Severity::High => Priority::High,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub practice_type: String,
    pub target_topics: Vec<String>,
    pub duration: String,
    pub expected_impact: f64,
    pub steps: Vec<String>,
}

/// Reference material for topics the library knows about.
#[derive(Debug, Clone, PartialEq)]
pub struct Intervention {
    pub topic: &'static str,
    pub practice_problems: u32,
    pub estimated_time: &'static str,
    pub key_concepts: &'static [&'static str],
}

const INTERVENTION_LIBRARY: &[Intervention] = &[
    Intervention {
        topic: "fractions",
        practice_problems: 15,
        estimated_time: "45 minutes",
        key_concepts: &["Numerator", "Denominator", "Simplification", "Comparison"],
    },
    Intervention {
        topic: "algebra",
        practice_problems: 12,
        estimated_time: "60 minutes",
        key_concepts: &["Variables", "Equations", "Solving", "Substitution"],
    },
    Intervention {
        topic: "geometry",
        practice_problems: 10,
        estimated_time: "50 minutes",
        key_concepts: &["Shapes", "Area", "Perimeter", "Angles"],
    },
];

/// Case-insensitive lookup in the intervention library.
pub fn intervention_for(topic: &str) -> Option<&'static Intervention> {
    INTERVENTION_LIBRARY
        .iter()
        .find(|i| i.topic.eq_ignore_ascii_case(topic.trim()))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn concept_review(topic: &str, gap: &GapEntry) -> Recommendation {
    Recommendation {
        title: format!("Focused {topic} Review"),
        description: gap.description.clone(),
        priority: gap.severity.into(),
        practice_type: "Structured Review + Practice".to_string(),
        target_topics: vec![topic.to_string()],
        duration: "2-3 days, 30-45 min daily".to_string(),
        expected_impact: 0.25,
        steps: vec![
            format!("1. Review key concepts in {topic}"),
            "2. Work through 5-7 example problems".to_string(),
            "3. Practice 10 similar problems".to_string(),
            "4. Take a quick assessment".to_string(),
        ],
    }
}

fn confidence_building(gap: &GapEntry) -> Recommendation {
    Recommendation {
        title: "Confidence & Clarity Building".to_string(),
        description: gap.description.clone(),
        priority: gap.severity.into(),
        practice_type: "Guided Problem-Solving".to_string(),
        target_topics: strings(&["All covered topics"]),
        duration: "1-2 weeks, 20 min daily".to_string(),
        expected_impact: 0.20,
        steps: strings(&[
            "1. Start with easier problems to build momentum",
            "2. Work through step-by-step solutions",
            "3. Write down reasoning before answering",
            "4. Review mistakes carefully",
            "5. Gradually increase difficulty",
        ]),
    }
}

/// Always MEDIUM, whatever the gap severity.
fn deliberate_practice(gap: &GapEntry) -> Recommendation {
    Recommendation {
        title: "Deliberate, Focused Practice".to_string(),
        description: gap.description.clone(),
        priority: Priority::Medium,
        practice_type: "Slow & Thoughtful Practice".to_string(),
        target_topics: strings(&["Problem-solving strategy"]),
        duration: "1 week, 25 min daily".to_string(),
        expected_impact: 0.15,
        steps: strings(&[
            "1. Set a timer for 3-5 minutes per problem",
            "2. Read the question carefully twice",
            "3. Plan your approach before answering",
            "4. Work through each step deliberately",
            "5. Double-check your answer",
        ]),
    }
}

pub fn maintenance() -> Recommendation {
    Recommendation {
        title: MAINTENANCE_TITLE.to_string(),
        description: "Student is performing well; continue with current pace".to_string(),
        priority: Priority::Low,
        practice_type: "Regular Practice + Challenge".to_string(),
        target_topics: strings(&["All topics"]),
        duration: "Ongoing".to_string(),
        expected_impact: 0.10,
        steps: strings(&[
            "1. Continue regular daily practice",
            "2. Try progressively harder problems",
            "3. Explore different problem types",
            "4. Help other students",
        ]),
    }
}

/// Template for a single gap.
pub fn recommend_for(kind: &GapKind, gap: &GapEntry) -> Recommendation {
    match kind {
        GapKind::Concept { .. } => {
            let topic = kind.topic_title().unwrap_or_default();
            concept_review(&topic, gap)
        }
        GapKind::Confidence => confidence_building(gap),
        GapKind::Speed => deliberate_practice(gap),
    }
}

/// Turns detected gaps into a ranked list of interventions.
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    config: RecommenderConfig,
}

impl RecommendationEngine {
    pub fn new(config: RecommenderConfig) -> Self {
        Self { config }
    }

    /// Highest severity first; equal severities keep detection order.
    /// Never empty: with no gaps the maintenance plan is returned.
    pub fn generate(&self, analysis: &AnalysisResult) -> Vec<Recommendation> {
        let mut ranked: Vec<(&GapKind, &GapEntry)> = analysis.gaps.iter().collect();
        ranked.sort_by(|a, b| b.1.severity.weight().cmp(&a.1.severity.weight()));

        let mut recommendations: Vec<Recommendation> = ranked
            .into_iter()
            .map(|(kind, gap)| {
                debug!("Recommending for {kind} ({})", gap.severity);
                recommend_for(kind, gap)
            })
            .collect();

        if recommendations.is_empty() {
            recommendations.push(maintenance());
        }

        recommendations.truncate(self.config.max_recommendations.min(MAX_RECOMMENDATIONS));

        info!(
            student = %analysis.student_id,
            count = recommendations.len(),
            "Generated recommendations"
        );

        recommendations
    }
}
