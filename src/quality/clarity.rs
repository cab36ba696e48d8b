//! Clarity scoring: how free an item is of noise.

use super::report::{QualityDimension, QualityIssue, QualityIssueType, Severity};

/// Identical non-whitespace characters in a row beyond this length are noise.
const MAX_RUN_LENGTH: usize = 8;

/// Maximum share of the score removed by repeated-character runs.
const MAX_RUN_PENALTY: f64 = 0.5;

/// Byte entropy (bits) at or above which binary content is fully clear.
const FULL_ENTROPY_BITS: f64 = 2.0;

/// Scores text by its printable-character ratio and binary content by its
/// byte entropy.
#[derive(Debug, Clone, Default)]
pub struct ClarityAnalyzer;

impl ClarityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, content: &[u8], text: Option<&str>) -> (f64, Vec<QualityIssue>) {
        if content.is_empty() {
            return (0.0, Vec::new());
        }
        match text {
            Some(text) => self.text_clarity(text),
            None => self.binary_clarity(content),
        }
    }

    fn text_clarity(&self, text: &str) -> (f64, Vec<QualityIssue>) {
        let mut issues = Vec::new();
        let mut total = 0usize;
        let mut noise = 0usize;
        let mut run_chars = 0usize;
        let mut run_len = 0usize;
        let mut prev: Option<char> = None;

        for c in text.chars() {
            total += 1;
            if c == '\u{fffd}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
                noise += 1;
            }

            if Some(c) == prev && !c.is_whitespace() {
                run_len += 1;
            } else {
                if run_len > MAX_RUN_LENGTH {
                    run_chars += run_len;
                }
                run_len = 1;
            }
            prev = Some(c);
        }
        if run_len > MAX_RUN_LENGTH {
            run_chars += run_len;
        }

        if total == 0 {
            return (0.0, issues);
        }

        let printable = 1.0 - noise as f64 / total as f64;
        if noise > 0 {
            issues.push(issue(
                QualityIssueType::NoiseCharacters,
                if printable < 0.9 { Severity::Major } else { Severity::Minor },
                format!("{} of {} characters are control or replacement characters", noise, total),
            ));
        }

        let penalty = (run_chars as f64 / total as f64).min(MAX_RUN_PENALTY);
        if run_chars > 0 {
            issues.push(issue(
                QualityIssueType::RepeatedCharacters,
                Severity::Minor,
                format!("{} characters are in runs longer than {}", run_chars, MAX_RUN_LENGTH),
            ));
        }

        (printable * (1.0 - penalty), issues)
    }

    fn binary_clarity(&self, content: &[u8]) -> (f64, Vec<QualityIssue>) {
        let entropy = byte_entropy(content);
        let score = (entropy / FULL_ENTROPY_BITS).min(1.0);
        let mut issues = Vec::new();
        if score < 1.0 {
            issues.push(issue(
                QualityIssueType::LowEntropy,
                Severity::Major,
                format!("Byte entropy is {:.2} bits", entropy),
            ));
        }
        (score, issues)
    }
}

/// Shannon entropy of the byte distribution, in bits (0-8).
pub fn byte_entropy(content: &[u8]) -> f64 {
    if content.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for b in content {
        counts[*b as usize] += 1;
    }
    let n = content.len() as f64;
    counts
        .iter()
        .filter(|c| **c > 0)
        .map(|c| {
            let p = *c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

fn issue(kind: QualityIssueType, severity: Severity, description: impl Into<String>) -> QualityIssue {
    QualityIssue::new(QualityDimension::Clarity, kind, severity, description)
}
