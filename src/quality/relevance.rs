//! Relevance scoring: substance of the content and fit to target domains.

use std::collections::HashSet;

use crate::classify::{tokenize, Domain};

use super::report::{QualityDimension, QualityIssue, QualityIssueType, Severity};

/// Word count at which text length is fully adequate.
const ADEQUATE_WORDS: usize = 20;

/// Binary size at which content length is fully adequate.
const ADEQUATE_BINARY_BYTES: usize = 1024;

/// Only the first words are used for lexical diversity.
const DIVERSITY_WINDOW: usize = 200;

/// Type-token ratio at which diversity is fully adequate.
const FULL_DIVERSITY_RATIO: f64 = 0.5;

/// Scores how much usable substance an item carries.
///
/// When target domains are configured, items detected outside them keep
/// only half their score.
#[derive(Debug, Clone, Default)]
pub struct RelevanceChecker {
    target_domains: Vec<Domain>,
}

impl RelevanceChecker {
    pub fn new(target_domains: Vec<Domain>) -> Self {
        Self { target_domains }
    }

    pub fn target_domains(&self) -> &[Domain] {
        &self.target_domains
    }

    pub fn check(
        &self,
        content: &[u8],
        text: Option<&str>,
        domain: Option<Domain>,
    ) -> (f64, Vec<QualityIssue>) {
        let mut issues = Vec::new();
        let base = match text {
            Some(text) => self.text_relevance(text, &mut issues),
            None => (content.len() as f64 / ADEQUATE_BINARY_BYTES as f64).min(1.0),
        };

        if self.target_domains.is_empty() {
            return (base, issues);
        }
        let on_target = domain.is_some_and(|d| self.target_domains.contains(&d));
        if !on_target {
            issues.push(issue(
                QualityIssueType::OffTargetDomain,
                Severity::Major,
                match domain {
                    Some(d) => format!("Domain '{}' is not a target domain", d),
                    None => "Domain could not be determined".to_string(),
                },
            ));
            return (base * 0.5, issues);
        }
        (base, issues)
    }

    fn text_relevance(&self, text: &str, issues: &mut Vec<QualityIssue>) -> f64 {
        let words = tokenize(text);
        if words.is_empty() {
            return 0.0;
        }

        let length = (words.len() as f64 / ADEQUATE_WORDS as f64).min(1.0);
        if words.len() < ADEQUATE_WORDS {
            issues.push(issue(
                QualityIssueType::TooShort,
                Severity::Minor,
                format!("Only {} words (at least {} expected)", words.len(), ADEQUATE_WORDS),
            ));
        }

        let window = &words[..words.len().min(DIVERSITY_WINDOW)];
        let unique: HashSet<&str> = window.iter().map(String::as_str).collect();
        let ratio = unique.len() as f64 / window.len() as f64;
        let diversity = (ratio / FULL_DIVERSITY_RATIO).min(1.0);
        if diversity < 1.0 {
            issues.push(issue(
                QualityIssueType::LowDiversity,
                Severity::Minor,
                format!("Type-token ratio is {:.2}", ratio),
            ));
        }

        0.5 * length + 0.5 * diversity
    }
}

fn issue(kind: QualityIssueType, severity: Severity, description: impl Into<String>) -> QualityIssue {
    QualityIssue::new(QualityDimension::Relevance, kind, severity, description)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TEXT: &str = "Researchers measured the growth of seedlings under varied light \
        conditions across three greenhouses and recorded daily temperature humidity and soil \
        moisture for every tray";

    fn score(checker: &RelevanceChecker, text: &str, domain: Option<Domain>) -> f64 {
        checker.check(text.as_bytes(), Some(text), domain).0
    }

    #[test]
    fn test_long_diverse_text() {
        let checker = RelevanceChecker::default();
        assert_eq!(score(&checker, LONG_TEXT, None), 1.0);
    }

    #[test]
    fn test_short_text_partial() {
        let checker = RelevanceChecker::default();
        let s = score(&checker, "five distinct words right here", None);
        assert!((s - (0.5 * 5.0 / 20.0 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_repetitive_text() {
        let checker = RelevanceChecker::default();
        let text = "spam ".repeat(40);
        let s = score(&checker, &text, None);
        assert!(s < 0.6);
    }

    #[test]
    fn test_target_domain_penalty() {
        let checker = RelevanceChecker::new(vec![Domain::Medical]);
        assert_eq!(score(&checker, LONG_TEXT, Some(Domain::Medical)), 1.0);
        assert_eq!(score(&checker, LONG_TEXT, Some(Domain::Legal)), 0.5);
        assert_eq!(score(&checker, LONG_TEXT, None), 0.5);
    }

    #[test]
    fn test_binary_size() {
        let checker = RelevanceChecker::default();
        assert_eq!(checker.check(&[0u8; 2048], None, None).0, 1.0);
        assert!((checker.check(&[0u8; 512], None, None).0 - 0.5).abs() < 1e-9);
    }
}
