//! Format validity: does the content match its declared format?

use crate::dataset::{Item, MediaFormat};

use super::report::{QualityDimension, QualityIssue, QualityIssueType, Severity};

/// Scores 1.0 when content matches the declared format, 0.5 when it is a
/// valid but different known format, and 0.0 otherwise.
#[derive(Debug, Clone, Default)]
pub struct FormatValidator;

impl FormatValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, item: &Item) -> (f64, Vec<QualityIssue>) {
        let content = item.content();
        if content.is_empty() {
            return (
                0.0,
                vec![issue(
                    QualityIssueType::EmptyContent,
                    Severity::Critical,
                    "Empty content has no valid format",
                )],
            );
        }

        let declared = item.declared_format();
        let detected = item.detected_format();
        let utf8 = std::str::from_utf8(content).ok();

        if declared == MediaFormat::Unknown {
            return if detected != MediaFormat::Unknown || utf8.is_some() {
                (
                    0.5,
                    vec![issue(
                        QualityIssueType::FormatMismatch,
                        Severity::Minor,
                        format!("No declared format; content looks like {}", describe(detected, utf8)),
                    )],
                )
            } else {
                (0.0, vec![self.invalid(declared)])
            };
        }

        if declared.is_textual() {
            return self.check_textual(declared, detected, utf8);
        }

        if compatible(declared, detected) {
            (1.0, Vec::new())
        } else if detected != MediaFormat::Unknown {
            (0.5, vec![self.mismatch(declared, detected)])
        } else {
            (0.0, vec![self.invalid(declared)])
        }
    }

    fn check_textual(
        &self,
        declared: MediaFormat,
        detected: MediaFormat,
        utf8: Option<&str>,
    ) -> (f64, Vec<QualityIssue>) {
        let Some(text) = utf8 else {
            return if detected != MediaFormat::Unknown {
                (0.5, vec![self.mismatch(declared, detected)])
            } else {
                (0.0, vec![self.invalid(declared)])
            };
        };

        let valid = match declared {
            MediaFormat::Json => serde_json::from_str::<serde_json::Value>(text).is_ok(),
            MediaFormat::Csv => csv_is_rectangular(text),
            MediaFormat::Xml => {
                let trimmed = text.trim();
                trimmed.starts_with('<') && trimmed.ends_with('>')
            }
            _ => !text.contains('\0'),
        };

        if valid {
            (1.0, Vec::new())
        } else {
            // Still readable plain text, just not the declared structure.
            (0.5, vec![self.mismatch(declared, MediaFormat::PlainText)])
        }
    }

    fn mismatch(&self, declared: MediaFormat, detected: MediaFormat) -> QualityIssue {
        issue(
            QualityIssueType::FormatMismatch,
            Severity::Major,
            format!("Declared {} but content is {}", declared, detected),
        )
    }

    fn invalid(&self, declared: MediaFormat) -> QualityIssue {
        issue(
            QualityIssueType::InvalidContent,
            Severity::Critical,
            format!("Content is not valid {}", declared),
        )
    }
}

/// Containers whose signatures cannot be told apart reliably count as a match.
fn compatible(declared: MediaFormat, detected: MediaFormat) -> bool {
    use MediaFormat::*;
    declared == detected
        || matches!((declared, detected), (Mkv, Webm) | (Webm, Mkv))
        || matches!(
            (declared, detected),
            (Mp4 | M4a | Mov, Mp4 | M4a | Mov)
        )
}

fn csv_is_rectangular(text: &str) -> bool {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(text.as_bytes());
    let mut rows = 0usize;
    for record in reader.records() {
        if record.is_err() {
            return false;
        }
        rows += 1;
    }
    rows > 0
}

fn describe(detected: MediaFormat, utf8: Option<&str>) -> String {
    match (detected, utf8) {
        (MediaFormat::Unknown, Some(_)) => "text".to_string(),
        (format, _) => format.to_string(),
    }
}

fn issue(kind: QualityIssueType, severity: Severity, description: impl Into<String>) -> QualityIssue {
    QualityIssue::new(QualityDimension::FormatValidity, kind, severity, description)
}
