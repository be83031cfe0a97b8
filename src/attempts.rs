use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::info;

pub const STUDENT_ID_COLUMN: &str = "Student_ID";
pub const TOPIC_COLUMN: &str = "Topic";
pub const CORRECT_COLUMN: &str = "Correct";
pub const TIME_TAKEN_COLUMN: &str = "Time_Taken";

/// Rejections for attempt data that cannot be analyzed.
///
/// Rows are numbered from 1, counting data rows only.
#[derive(Debug, Error, PartialEq)]
pub enum AttemptError {
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("row {row}: expected {expected} fields, found {found}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}: correct must be 0 or 1, got {value:?}")]
    InvalidCorrect { row: usize, value: String },

    #[error("row {row}: time taken must be a number, got {value:?}")]
    UnparsableTime { row: usize, value: String },

    #[error("row {row}: time taken must be finite and non-negative, got {value}")]
    InvalidTime { row: usize, value: f64 },

    #[error("row {row}: malformed table: {message}")]
    Malformed { row: usize, message: String },
}

/// One question attempt by a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(
        rename = "Student_ID",
        default,
        deserialize_with = "deserialize_non_blank",
        skip_serializing_if = "Option::is_none"
    )]
    pub student_id: Option<String>,
    #[serde(
        rename = "Topic",
        default,
        deserialize_with = "deserialize_non_blank",
        skip_serializing_if = "Option::is_none"
    )]
    pub topic: Option<String>,
    #[serde(rename = "Correct", deserialize_with = "deserialize_correct")]
    pub correct: bool,
    #[serde(rename = "Time_Taken")]
    pub time_taken: f64,
}

impl AttemptRecord {
    pub fn new(topic: impl Into<String>, correct: bool, time_taken: f64) -> Self {
        Self {
            student_id: None,
            topic: Some(topic.into()),
            correct,
            time_taken,
        }
    }

    /// Attempt with no topic recorded.
    pub fn untagged(correct: bool, time_taken: f64) -> Self {
        Self {
            student_id: None,
            topic: None,
            correct,
            time_taken,
        }
    }

    pub fn with_student(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    pub fn validate(&self, row: usize) -> Result<(), AttemptError> {
        if !self.time_taken.is_finite() || self.time_taken < 0.0 {
            return Err(AttemptError::InvalidTime {
                row,
                value: self.time_taken,
            });
        }
        Ok(())
    }
}

pub fn validate_attempts(attempts: &[AttemptRecord]) -> Result<(), AttemptError> {
    attempts
        .iter()
        .enumerate()
        .try_for_each(|(i, attempt)| attempt.validate(i + 1))
}

/// Blank strings count as missing, as empty table cells do.
fn deserialize_non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Accepts `true`/`false` as well as the 0/1 encoding used by exported tables.
fn deserialize_correct<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CorrectFlag {
        Flag(bool),
        Number(i64),
        Float(f64),
    }

    match CorrectFlag::deserialize(deserializer)? {
        CorrectFlag::Flag(flag) => Ok(flag),
        CorrectFlag::Number(0) => Ok(false),
        CorrectFlag::Number(1) => Ok(true),
        CorrectFlag::Float(f) if f == 0.0 => Ok(false),
        CorrectFlag::Float(f) if f == 1.0 => Ok(true),
        CorrectFlag::Number(n) => Err(serde::de::Error::custom(format!(
            "correct must be 0 or 1, got {n}"
        ))),
        CorrectFlag::Float(f) => Err(serde::de::Error::custom(format!(
            "correct must be 0 or 1, got {f}"
        ))),
    }
}

fn parse_correct(row: usize, value: &str) -> Result<bool, AttemptError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(true),
        "0" | "0.0" | "false" => Ok(false),
        _ => Err(AttemptError::InvalidCorrect {
            row,
            value: value.to_string(),
        }),
    }
}

fn parse_time(row: usize, value: &str) -> Result<f64, AttemptError> {
    value
        .parse::<f64>()
        .map_err(|_| AttemptError::UnparsableTime {
            row,
            value: value.to_string(),
        })
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field.filter(|s| !s.is_empty()).map(str::to_string)
}

fn malformed(row: usize, err: csv::Error) -> AttemptError {
    AttemptError::Malformed {
        row,
        message: err.to_string(),
    }
}

/// Parse a comma-delimited attempt table.
///
/// `Correct` and `Time_Taken` are required; `Student_ID` and `Topic` are
/// optional and empty cells are treated as missing. Fields are trimmed and
/// may be quoted, including across lines.
pub fn parse_attempt_table(text: &str) -> Result<Vec<AttemptRecord>, AttemptError> {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader.headers().map_err(|e| malformed(0, e))?.clone();
    let column = |name: &str| header.iter().position(|h| h == name);

    let correct_col = column(CORRECT_COLUMN).ok_or(AttemptError::MissingColumn(CORRECT_COLUMN))?;
    let time_col =
        column(TIME_TAKEN_COLUMN).ok_or(AttemptError::MissingColumn(TIME_TAKEN_COLUMN))?;
    let student_col = column(STUDENT_ID_COLUMN);
    let topic_col = column(TOPIC_COLUMN);

    let mut attempts = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let fields: StringRecord = record.map_err(|e| malformed(row, e))?;

        if fields.iter().all(str::is_empty) {
            continue;
        }

        if fields.len() != header.len() {
            return Err(AttemptError::RowWidth {
                row,
                expected: header.len(),
                found: fields.len(),
            });
        }

        let attempt = AttemptRecord {
            student_id: student_col.and_then(|c| non_empty(fields.get(c))),
            topic: topic_col.and_then(|c| non_empty(fields.get(c))),
            correct: parse_correct(row, &fields[correct_col])?,
            time_taken: parse_time(row, &fields[time_col])?,
        };

        attempt.validate(row)?;
        attempts.push(attempt);
    }

    Ok(attempts)
}

/// Load attempts from a `.json` array of records or a comma-delimited table.
pub fn load_attempts(path: &Path) -> Result<Vec<AttemptRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read attempts from {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let attempts = if is_json {
        let attempts: Vec<AttemptRecord> = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        validate_attempts(&attempts)?;
        attempts
    } else {
        parse_attempt_table(&text).with_context(|| format!("invalid table {}", path.display()))?
    };

    info!("Loaded {} attempts from {}", attempts.len(), path.display());
    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_attempt_table_basic() {
        let text = "Student_ID,Topic,Correct,Time_Taken\n\
                    S001,Fractions,1,30.5\n\
                    S001,Algebra,0,12\n";

        let attempts = parse_attempt_table(text).unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].student_id.as_deref(), Some("S001"));
        assert_eq!(attempts[0].topic.as_deref(), Some("Fractions"));
        assert!(attempts[0].correct);
        assert_eq!(attempts[0].time_taken, 30.5);
        assert!(!attempts[1].correct);
    }

    #[test]
    fn test_parse_attempt_table_quoted_fields() {
        let text = "Student_ID,Topic,Correct,Time_Taken\n\
                    S1,\"Ratios, rates\",1,10\n\
                    S1,\"Long\nDivision\",0,12\n";

        let attempts = parse_attempt_table(text).unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].topic.as_deref(), Some("Ratios, rates"));
        assert_eq!(attempts[1].topic.as_deref(), Some("Long\nDivision"));
        assert!(!attempts[1].correct);
    }

    #[test]
    fn test_parse_attempt_table_without_topic() {
        let text = "Correct,Time_Taken\n1,10\n0,20\n";

        let attempts = parse_attempt_table(text).unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.topic.is_none()));
        assert!(attempts.iter().all(|a| a.student_id.is_none()));
    }

    #[test]
    fn test_parse_attempt_table_empty() {
        assert!(parse_attempt_table("").unwrap().is_empty());
        assert!(
            parse_attempt_table("Correct,Time_Taken\n")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_parse_attempt_table_missing_column() {
        let err = parse_attempt_table("Topic,Correct\nA,1\n").unwrap_err();
        assert_eq!(err, AttemptError::MissingColumn(TIME_TAKEN_COLUMN));
    }

    #[test]
    fn test_parse_attempt_table_rejects_bad_correct() {
        let err = parse_attempt_table("Correct,Time_Taken\n1,5\n2,5\n").unwrap_err();
        assert_eq!(
            err,
            AttemptError::InvalidCorrect {
                row: 2,
                value: "2".to_string()
            }
        );
    }

    #[test]
    fn test_parse_attempt_table_rejects_negative_time() {
        let err = parse_attempt_table("Correct,Time_Taken\n1,-3\n").unwrap_err();
        assert_eq!(err, AttemptError::InvalidTime { row: 1, value: -3.0 });
    }

    #[test]
    fn test_parse_attempt_table_rejects_short_row() {
        let err = parse_attempt_table("Topic,Correct,Time_Taken\nA,1\n").unwrap_err();
        assert_eq!(
            err,
            AttemptError::RowWidth {
                row: 1,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_json_records_accept_numeric_and_bool_correct() {
        let json = r#"[
            {"Student_ID": "S9", "Topic": "Geometry", "Correct": 1, "Time_Taken": 20},
            {"Topic": "Geometry", "Correct": false, "Time_Taken": 25.5}
        ]"#;

        let attempts: Vec<AttemptRecord> = serde_json::from_str(json).unwrap();
        assert!(attempts[0].correct);
        assert!(!attempts[1].correct);
        assert_eq!(attempts[1].student_id, None);
    }

    #[test]
    fn test_json_blank_topic_and_student_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.json");
        fs::write(
            &path,
            r#"[
                {"Student_ID": "", "Topic": "", "Correct": 0, "Time_Taken": 10},
                {"Student_ID": " ", "Topic": "  ", "Correct": 0, "Time_Taken": 10},
                {"Topic": null, "Correct": 0, "Time_Taken": 10}
            ]"#,
        )
        .unwrap();

        let attempts = load_attempts(&path).unwrap();
        assert_eq!(attempts.len(), 3);
        assert!(attempts.iter().all(|a| a.topic.is_none()));
        assert!(attempts.iter().all(|a| a.student_id.is_none()));
    }

    #[test]
    fn test_json_records_reject_out_of_range_correct() {
        let json = r#"[{"Correct": 3, "Time_Taken": 20}]"#;
        assert!(serde_json::from_str::<Vec<AttemptRecord>>(json).is_err());
    }

    #[test]
    fn test_load_attempts_from_files() {
        let dir = tempfile::tempdir().unwrap();

        let csv_path = dir.path().join("attempts.csv");
        let mut csv = fs::File::create(&csv_path).unwrap();
        writeln!(csv, "Student_ID,Topic,Correct,Time_Taken").unwrap();
        writeln!(csv, "S1,Algebra,1,10").unwrap();
        drop(csv);

        let json_path = dir.path().join("attempts.json");
        fs::write(
            &json_path,
            r#"[{"Student_ID":"S1","Topic":"Algebra","Correct":1,"Time_Taken":10}]"#,
        )
        .unwrap();

        let from_csv = load_attempts(&csv_path).unwrap();
        let from_json = load_attempts(&json_path).unwrap();
        assert_eq!(from_csv, from_json);
    }

    #[test]
    fn test_load_attempts_rejects_negative_time_in_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"[{"Correct":1,"Time_Taken":-1}]"#).unwrap();

        assert!(load_attempts(&path).is_err());
    }

    #[test]
    fn test_load_attempts_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_attempts(&dir.path().join("nope.csv")).is_err());
    }
}
