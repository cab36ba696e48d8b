//! Label taxonomy for item classification.
//!
//! Defines the subject domains and content types an item can be labelled
//! with, plus the keyword lexicons used to detect domains in text.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Minimum lexicon hits for a domain to be assigned.
pub const MIN_DOMAIN_HITS: usize = 2;

/// Word count above which unmatched text is labelled `general`.
pub const GENERAL_DOMAIN_MIN_WORDS: usize = 20;

/// Splits text into lowercase word tokens, dropping punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Subject domain of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Technical,
    Medical,
    Legal,
    Financial,
    Scientific,
    General,
}

impl Domain {
    /// Returns all domains. Lexicon ties resolve in this order.
    pub fn all() -> Vec<Domain> {
        vec![
            Domain::Technical,
            Domain::Medical,
            Domain::Legal,
            Domain::Financial,
            Domain::Scientific,
            Domain::General,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Technical => "technical",
            Domain::Medical => "medical",
            Domain::Legal => "legal",
            Domain::Financial => "financial",
            Domain::Scientific => "scientific",
            Domain::General => "general",
        }
    }

    /// Keywords that indicate this domain (lowercase).
    pub fn lexicon(&self) -> &'static [&'static str] {
        match self {
            Domain::Technical => &[
                "software", "server", "database", "api", "code", "function", "compiler",
                "network", "kernel", "algorithm", "deploy", "debug", "configuration", "cpu",
                "memory", "protocol", "library", "framework", "linux", "cloud",
            ],
            Domain::Medical => &[
                "patient", "clinical", "diagnosis", "treatment", "hospital", "symptom",
                "symptoms", "medication", "dose", "therapy", "disease", "physician", "surgery",
                "prescribed", "chronic", "infection", "nurse", "vaccine",
            ],
            Domain::Legal => &[
                "contract", "court", "plaintiff", "defendant", "statute", "clause",
                "liability", "attorney", "jurisdiction", "agreement", "tribunal", "lawsuit",
                "compliance", "regulation", "hereby", "party", "parties", "judge",
            ],
            Domain::Financial => &[
                "revenue", "profit", "investment", "market", "stock", "bank", "interest",
                "loan", "equity", "dividend", "portfolio", "fiscal", "quarterly", "earnings",
                "budget", "inflation", "asset", "assets", "credit",
            ],
            Domain::Scientific => &[
                "hypothesis", "experiment", "data", "analysis", "theory", "molecule",
                "particle", "sample", "measurement", "research", "laboratory", "species",
                "variable", "observation", "results", "methodology", "quantum", "protein",
            ],
            Domain::General => &[],
        }
    }

    /// Detects the dominant domain from lowercase words.
    ///
    /// A domain needs at least [`MIN_DOMAIN_HITS`] lexicon hits; text of at
    /// least [`GENERAL_DOMAIN_MIN_WORDS`] words without a winner is `general`.
    pub fn detect<S: AsRef<str>>(words: &[S]) -> Option<Domain> {
        let mut best: Option<(Domain, usize)> = None;
        for domain in Domain::all() {
            let lexicon = domain.lexicon();
            if lexicon.is_empty() {
                continue;
            }
            let hits = words
                .iter()
                .filter(|w| lexicon.contains(&w.as_ref()))
                .count();
            if hits >= MIN_DOMAIN_HITS && best.map_or(true, |(_, top)| hits > top) {
                best = Some((domain, hits));
            }
        }

        match best {
            Some((domain, _)) => Some(domain),
            None if words.len() >= GENERAL_DOMAIN_MIN_WORDS => Some(Domain::General),
            None => None,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Domain::all()
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| format!("unknown domain '{}'", s))
    }
}

/// Structural kind of an item's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    /// Speaker-turn dialogue.
    Conversation,
    /// Steps, commands or question/answer prompts.
    Instruction,
    /// Source code.
    Code,
    /// Delimited rows.
    Tabular,
    /// JSON or markup documents.
    Structured,
    /// Free-running text.
    Prose,
}

impl ContentType {
    pub fn all() -> Vec<ContentType> {
        vec![
            ContentType::Conversation,
            ContentType::Instruction,
            ContentType::Code,
            ContentType::Tabular,
            ContentType::Structured,
            ContentType::Prose,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Conversation => "conversation",
            ContentType::Instruction => "instruction",
            ContentType::Code => "code",
            ContentType::Tabular => "tabular",
            ContentType::Structured => "structured",
            ContentType::Prose => "prose",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
