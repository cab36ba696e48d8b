//! Stop-word based language identification.

/// Minimum stop-word hits before a language is reported.
const MIN_HITS: usize = 3;

/// Minimum share of words that must be stop words of the winning language.
const MIN_HIT_RATIO: f64 = 0.05;

/// Languages the detector can report, as ISO 639-1 codes with their stop words.
const STOP_WORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "is", "are", "was", "were", "of", "to", "in", "that", "it", "with",
            "for", "on", "this", "be", "have", "has", "not", "but", "they", "you", "from",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "y", "es", "son", "que", "en", "un", "una", "por", "con",
            "para", "del", "se", "no", "su", "pero", "como", "muy", "está",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "et", "est", "sont", "que", "dans", "un", "une", "pour", "avec",
            "des", "du", "ce", "pas", "sur", "qui", "mais", "nous", "vous", "très",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "sind", "nicht", "mit", "ein", "eine", "für",
            "auf", "den", "dem", "von", "zu", "sich", "auch", "aber", "wir", "ich", "sehr",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "as", "e", "é", "são", "que", "em", "um", "uma", "para", "com", "não",
            "do", "da", "dos", "das", "mas", "muito", "também", "você", "está",
        ],
    ),
    (
        "it",
        &[
            "il", "lo", "gli", "le", "e", "è", "sono", "che", "di", "un", "una", "per", "con",
            "non", "del", "della", "ma", "anche", "molto", "questo", "nel", "sei",
        ],
    ),
    (
        "nl",
        &[
            "de", "het", "een", "en", "is", "zijn", "niet", "met", "van", "voor", "op", "dat",
            "die", "ook", "maar", "wij", "ik", "je", "heel", "naar", "bij", "er",
        ],
    ),
];

/// Identifies the language of text by stop-word voting.
#[derive(Debug, Clone, Default)]
pub struct LanguageDetector;

impl LanguageDetector {
    pub fn new() -> Self {
        Self
    }

    /// Languages this detector can report.
    pub fn supported_languages(&self) -> Vec<&'static str> {
        STOP_WORDS.iter().map(|(code, _)| *code).collect()
    }

    /// Detects the language of already tokenised lowercase words.
    ///
    /// Returns `None` when no language has enough stop-word evidence. Ties
    /// resolve in the order of [`LanguageDetector::supported_languages`].
    pub fn detect_words<S: AsRef<str>>(&self, words: &[S]) -> Option<&'static str> {
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(&'static str, usize)> = None;
        for (code, stop_words) in STOP_WORDS {
            let hits = words
                .iter()
                .filter(|w| stop_words.contains(&w.as_ref()))
                .count();
            if best.map_or(true, |(_, top)| hits > top) {
                best = Some((code, hits));
            }
        }

        let (code, hits) = best?;
        let ratio = hits as f64 / words.len() as f64;
        (hits >= MIN_HITS && ratio >= MIN_HIT_RATIO).then_some(code)
    }

    pub fn detect(&self, text: &str) -> Option<&'static str> {
        self.detect_words(&super::taxonomy::tokenize(text))
    }
}
