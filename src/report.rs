//! Tabular gap report and plain-text summaries of an analysis.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use csv::{ReaderBuilder, Terminator, Trim, WriterBuilder};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

use crate::{
    analysis::{AnalysisResult, GapKind, Severity},
    recommend::{Recommendation, intervention_for},
};

pub const REPORT_HEADER: [&str; 4] = ["Gap Type", "Severity", "Confidence", "Affected Questions"];

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("report header does not match, expected: {}", REPORT_HEADER.join(","))]
    BadHeader,

    #[error("line {line}: expected 4 fields, found {found}")]
    RowWidth { line: usize, found: usize },

    #[error("line {line}: {message}")]
    BadField { line: usize, message: String },

    #[error("malformed report: {0}")]
    Malformed(String),
}

/// One row of the gap report.
#[derive(Debug, Clone, PartialEq)]
pub struct GapReportRow {
    pub kind: GapKind,
    pub severity: Severity,
    /// Fraction in [0, 1]; written as a percentage with one decimal.
    pub confidence: f64,
    pub affected_questions: usize,
}

pub fn report_rows(analysis: &AnalysisResult) -> Vec<GapReportRow> {
    analysis
        .gaps
        .iter()
        .map(|(kind, gap)| GapReportRow {
            kind: kind.clone(),
            severity: gap.severity,
            confidence: gap.confidence,
            affected_questions: gap.affected_questions,
        })
        .collect()
}

pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

fn parse_percent(line: usize, value: &str) -> Result<f64, ReportError> {
    value
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map(|p| p / 100.0)
        .map_err(|_| ReportError::BadField {
            line,
            message: format!("invalid confidence {value:?}"),
        })
}

pub fn render_report(analysis: &AnalysisResult) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(REPORT_HEADER)?;

    for row in report_rows(analysis) {
        writer.write_record([
            row.kind.key(),
            row.severity.to_string(),
            format_percent(row.confidence),
            row.affected_questions.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush report: {}", e.error()))?;
    String::from_utf8(bytes).context("report is not valid UTF-8")
}

/// Parse a report produced by [`render_report`]. Line numbers count from 1
/// including the header.
pub fn parse_report(text: &str) -> Result<Vec<GapReportRow>, ReportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader
        .records()
        .filter(|r| !matches!(r, Ok(record) if record.iter().all(str::is_empty)));

    match records.next() {
        Some(Ok(header)) if header.iter().eq(REPORT_HEADER) => {}
        Some(Err(e)) => return Err(ReportError::Malformed(e.to_string())),
        _ => return Err(ReportError::BadHeader),
    }

    records
        .map(|record| {
            let record = record.map_err(|e| ReportError::Malformed(e.to_string()))?;
            let line_no = record.position().map_or(0, |p| p.line() as usize);
            let fields: Vec<&str> = record.iter().collect();

            let [kind, severity, confidence, affected] = fields.as_slice() else {
                return Err(ReportError::RowWidth {
                    line: line_no,
                    found: fields.len(),
                });
            };

            let bad = |message: String| ReportError::BadField {
                line: line_no,
                message,
            };

            Ok(GapReportRow {
                kind: GapKind::parse_key(kind).ok_or_else(|| bad(format!("unknown gap {kind:?}")))?,
                severity: severity.parse().map_err(bad)?,
                confidence: parse_percent(line_no, confidence)?,
                affected_questions: affected
                    .parse()
                    .map_err(|_| bad(format!("invalid count {affected:?}")))?,
            })
        })
        .collect()
}

/// File name for a report written at `now`.
pub fn report_file_name(now: DateTime<Local>) -> String {
    format!("analysis_report_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

pub fn write_report(analysis: &AnalysisResult, path: &Path) -> Result<()> {
    fs::write(path, render_report(analysis)?)
        .with_context(|| format!("failed to write report to {}", path.display()))?;

    info!("Wrote gap report to {}", path.display());
    Ok(())
}

/// Write a timestamped report into `dir`, returning its path.
pub fn write_report_in(analysis: &AnalysisResult, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report directory {}", dir.display()))?;

    let path = dir.join(report_file_name(Local::now()));
    write_report(analysis, &path)?;
    Ok(path)
}

/// Pattern summary followed by the gap table.
pub fn render_summary(analysis: &AnalysisResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("Student: {}\n", analysis.student_id));
    out.push_str(&format!("Total attempts: {}\n", analysis.total_attempts));
    out.push_str(&format!(
        "Correct answers: {}/{}\n",
        analysis.correct_answers, analysis.total_attempts
    ));
    out.push_str(&format!("Avg time (sec): {:.1}\n", analysis.avg_time));
    out.push_str(&format!("Accuracy: {}\n", format_percent(analysis.accuracy)));
    out.push_str(&format!(
        "Overall score: {}\n",
        format_percent(analysis.overall_score)
    ));

    if !analysis.has_gaps() {
        out.push_str("\nNo learning gaps detected.\n");
        return out;
    }

    out.push_str("\nDetected gaps:\n");
    for (kind, gap) in &analysis.gaps {
        out.push_str(&format!(
            "  [{}] {} (confidence {}, {} questions, est. {} to address)\n",
            gap.severity,
            kind,
            format_percent(gap.confidence),
            gap.affected_questions,
            gap.severity.improvement_time()
        ));
        out.push_str(&format!("      {}\n", gap.description));
    }

    out
}

pub fn render_recommendations(recommendations: &[Recommendation]) -> String {
    let mut out = String::new();

    for (i, rec) in recommendations.iter().enumerate() {
        out.push_str(&format!("{}. {} [{}]\n", i + 1, rec.title, rec.priority));
        out.push_str(&format!("   {}\n", rec.description));
        out.push_str(&format!(
            "   {} | {} | expected impact +{}\n",
            rec.practice_type,
            rec.duration,
            format_percent(rec.expected_impact)
        ));
        out.push_str(&format!("   Targets: {}\n", rec.target_topics.join(", ")));

        for topic in &rec.target_topics {
            if let Some(lib) = intervention_for(topic) {
                out.push_str(&format!(
                    "   Key concepts: {} ({} problems, ~{})\n",
                    lib.key_concepts.join(", "),
                    lib.practice_problems,
                    lib.estimated_time
                ));
            }
        }

        for step in &rec.steps {
            out.push_str(&format!("     {step}\n"));
        }
    }

    out
}
