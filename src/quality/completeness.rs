//! Completeness checking for items.
//!
//! Measures how much of an item's declared structure is actually filled in:
//! non-blank lines for text, non-empty cells for CSV, non-null leaves for JSON.

use crate::dataset::{Item, MediaFormat};

use super::report::{QualityDimension, QualityIssue, QualityIssueType, Severity};

/// Checks the completeness of items.
#[derive(Debug, Clone, Default)]
pub struct CompletenessChecker;

impl CompletenessChecker {
    pub fn new() -> Self {
        Self
    }

    /// Returns a tuple of (score, issues) where score is 0.0-1.0.
    pub fn check(&self, item: &Item, text: Option<&str>) -> (f64, Vec<QualityIssue>) {
        let mut issues = Vec::new();

        if item.content().is_empty() {
            issues.push(issue(
                QualityIssueType::EmptyContent,
                Severity::Critical,
                "Item has no content",
            ));
            return (0.0, issues);
        }

        let Some(text) = text else {
            // Structure of binary media is judged by format validity.
            return (1.0, issues);
        };

        if text.trim().is_empty() {
            issues.push(issue(
                QualityIssueType::BlankContent,
                Severity::Critical,
                "Item contains only whitespace",
            ));
            return (0.0, issues);
        }

        let score = match item.declared_format() {
            MediaFormat::Csv => self
                .csv_completeness(text, &mut issues)
                .unwrap_or_else(|| self.line_completeness(text, &mut issues)),
            MediaFormat::Json => self
                .json_completeness(text, &mut issues)
                .unwrap_or_else(|| self.line_completeness(text, &mut issues)),
            _ => self.line_completeness(text, &mut issues),
        };
        (score, issues)
    }

    /// Fraction of non-blank lines.
    fn line_completeness(&self, text: &str, issues: &mut Vec<QualityIssue>) -> f64 {
        let total = text.lines().count().max(1);
        let filled = text.lines().filter(|l| !l.trim().is_empty()).count();
        let ratio = filled as f64 / total as f64;
        if ratio < 0.5 {
            issues.push(issue(
                QualityIssueType::BlankContent,
                Severity::Major,
                format!("Only {} of {} lines have content", filled, total),
            ));
        }
        ratio
    }

    /// Fraction of non-empty cells, scaled by row-width consistency.
    ///
    /// Returns `None` if the content is not parseable as CSV.
    fn csv_completeness(&self, text: &str, issues: &mut Vec<QualityIssue>) -> Option<f64> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut width = None;
        let (mut rows, mut consistent, mut cells, mut filled) = (0usize, 0usize, 0usize, 0usize);
        for record in reader.records() {
            let record = record.ok()?;
            let expected = *width.get_or_insert(record.len());
            rows += 1;
            if record.len() == expected {
                consistent += 1;
            }
            cells += record.len();
            filled += record.iter().filter(|c| !c.trim().is_empty()).count();
        }
        if rows == 0 || cells == 0 {
            return None;
        }

        let fill = filled as f64 / cells as f64;
        let consistency = consistent as f64 / rows as f64;
        if consistent < rows {
            issues.push(issue(
                QualityIssueType::InconsistentRows,
                Severity::Major,
                format!("{} of {} rows differ from the header width", rows - consistent, rows),
            ));
        }
        if filled < cells {
            issues.push(issue(
                QualityIssueType::MissingValues,
                Severity::Minor,
                format!("{} of {} cells are empty", cells - filled, cells),
            ));
        }
        Some(fill * consistency)
    }

    /// Fraction of leaves that are neither null nor empty strings.
    fn json_completeness(&self, text: &str, issues: &mut Vec<QualityIssue>) -> Option<f64> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        let (mut leaves, mut filled) = (0usize, 0usize);
        count_leaves(&value, &mut leaves, &mut filled);
        if leaves == 0 {
            issues.push(issue(
                QualityIssueType::MissingValues,
                Severity::Critical,
                "JSON document has no values",
            ));
            return Some(0.0);
        }
        if filled < leaves {
            issues.push(issue(
                QualityIssueType::MissingValues,
                Severity::Minor,
                format!("{} of {} JSON values are null or empty", leaves - filled, leaves),
            ));
        }
        Some(filled as f64 / leaves as f64)
    }
}

fn count_leaves(value: &serde_json::Value, leaves: &mut usize, filled: &mut usize) {
    use serde_json::Value;
    match value {
        Value::Object(map) => map.values().for_each(|v| count_leaves(v, leaves, filled)),
        Value::Array(items) => items.iter().for_each(|v| count_leaves(v, leaves, filled)),
        Value::Null => *leaves += 1,
        Value::String(s) => {
            *leaves += 1;
            if !s.trim().is_empty() {
                *filled += 1;
            }
        }
        _ => {
            *leaves += 1;
            *filled += 1;
        }
    }
}

fn issue(kind: QualityIssueType, severity: Severity, description: impl Into<String>) -> QualityIssue {
    QualityIssue::new(QualityDimension::Completeness, kind, severity, description)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, content: &str) -> f64 {
        let item = Item::from_bytes(name, 0, content);
        CompletenessChecker::new().check(&item, Some(content)).0
    }

    #[test]
    fn test_empty_and_blank() {
        let item = Item::from_bytes("a.txt", 0, "");
        let (score, issues) = CompletenessChecker::new().check(&item, Some(""));
        assert_eq!(score, 0.0);
        assert_eq!(issues[0].issue_type, QualityIssueType::EmptyContent);
        assert_eq!(check("a.txt", "  \n\n "), 0.0);
    }

    #[test]
    fn test_text_line_ratio() {
        assert_eq!(check("a.txt", "one\ntwo\nthree"), 1.0);
        assert!((check("a.txt", "one\n\ntwo\n\n") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_csv_cells_and_consistency() {
        assert_eq!(check("t.csv", "a,b\n1,2\n3,4"), 1.0);
        let partial = check("t.csv", "a,b\n1,\n3,4");
        assert!((partial - 5.0 / 6.0).abs() < 1e-9);
        let ragged = check("t.csv", "a,b\n1,2,3\n4,5");
        assert!(ragged < 1.0);
    }

    #[test]
    fn test_json_leaves() {
        assert_eq!(check("d.json", r#"{"a": 1, "b": "x"}"#), 1.0);
        assert!((check("d.json", r#"{"a": null, "b": [1, ""]}"#) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(check("d.json", "{}"), 0.0);
    }

    #[test]
    fn test_binary_is_complete() {
        let item = Item::from_bytes("p.png", 0, vec![1, 2, 3]);
        assert_eq!(CompletenessChecker::new().check(&item, None).0, 1.0);
    }
}
