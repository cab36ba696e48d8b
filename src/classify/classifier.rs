//! Per-item classification and dataset-level label distributions.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataset::{Item, ItemId, MediaFormat, Modality};

use super::language::LanguageDetector;
use super::taxonomy::{tokenize, ContentType, Domain};

/// Share of non-blank lines that must look like code.
const CODE_LINE_RATIO: f64 = 0.3;

static SPEAKER_TURN: OnceLock<Regex> = OnceLock::new();
static CODE_LINE: OnceLock<Regex> = OnceLock::new();
static NUMBERED_STEP: OnceLock<Regex> = OnceLock::new();
static INSTRUCTION_PROMPT: OnceLock<Regex> = OnceLock::new();

fn speaker_turn() -> &'static Regex {
    SPEAKER_TURN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(user|assistant|system|human|ai|bot|agent|customer|speaker\s*\d*)\s*:")
            .expect("Invalid regex for speaker turns")
    })
}

fn code_line() -> &'static Regex {
    CODE_LINE.get_or_init(|| {
        Regex::new(
            r"^\s*(fn|def|class|import|from\s+\S+\s+import|#include|public|private|function|const|let|var|package|use|return|if\s*\(|for\s*\()\b|[{};]\s*$",
        )
        .expect("Invalid regex for code lines")
    })
}

fn numbered_step() -> &'static Regex {
    NUMBERED_STEP.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+[.)]\s|step\s+\d+)").expect("Invalid regex for numbered steps")
    })
}

fn instruction_prompt() -> &'static Regex {
    INSTRUCTION_PROMPT.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(###\s*instruction|(please\s+)?(write|explain|describe|summarize|translate|list|create|generate|classify)\b)",
        )
        .expect("Invalid regex for instruction prompts")
    })
}

/// Labels assigned to one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub item_id: ItemId,
    pub modality: Modality,
    /// ISO 639-1 code.
    pub language: Option<String>,
    pub domain: Option<Domain>,
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Classification {
    /// Classification for an item whose content could not be analysed.
    pub fn unknown(item_id: ItemId) -> Self {
        Self {
            item_id,
            modality: Modality::Unknown,
            language: None,
            domain: None,
            content_type: None,
            attributes: BTreeMap::new(),
        }
    }
}

/// Normalised label distributions over a batch.
///
/// Each distribution covers only the items whose label is known, so its
/// values sum to 1.0 whenever it is non-empty. Items without a label are
/// counted in `unclassified` under the dimension name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationAggregate {
    pub modality: BTreeMap<String, f64>,
    pub language: BTreeMap<String, f64>,
    pub domain: BTreeMap<String, f64>,
    pub content_type: BTreeMap<String, f64>,
    pub unclassified: BTreeMap<String, u64>,
    pub total_items: u64,
}

impl ClassificationAggregate {
    pub fn is_empty(&self) -> bool {
        self.total_items == 0
    }
}

/// Detects modality, language, domain and content type per item.
///
/// Classification of one item never looks at another, so batches can be
/// split across workers freely.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    language: LanguageDetector,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            language: LanguageDetector::new(),
        }
    }

    pub fn classify_item(&self, item: &Item) -> Classification {
        let descriptor = item.descriptor();
        let declared = item.declared_format();
        let format = match declared {
            MediaFormat::Unknown => item.detected_format(),
            known => known,
        };
        let text = item.text_content();

        let modality = match format.modality() {
            Modality::Unknown if text.is_some() => Modality::Text,
            modality => modality,
        };

        let mut attributes = BTreeMap::new();
        attributes.insert("format".to_string(), format.name().to_string());
        attributes.insert("size_bytes".to_string(), item.content().len().to_string());

        let (language, domain, content_type) = match &text {
            Some(text) => {
                let words = tokenize(text);
                attributes.insert("word_count".to_string(), words.len().to_string());
                attributes.insert("line_count".to_string(), text.lines().count().to_string());
                let language = self
                    .language
                    .detect_words(&words)
                    .map(str::to_string)
                    .or_else(|| descriptor.metadata.get("language").cloned());
                let domain = Domain::detect(&words).or_else(|| metadata_domain(item));
                (language, domain, detect_content_type(text, declared))
            }
            None => {
                if format == MediaFormat::Png {
                    if let Some((width, height)) = png_dimensions(item.content()) {
                        attributes.insert("width".to_string(), width.to_string());
                        attributes.insert("height".to_string(), height.to_string());
                    }
                }
                let language = match modality {
                    Modality::Audio | Modality::Video => descriptor.metadata.get("language").cloned(),
                    _ => None,
                };
                (language, metadata_domain(item), None)
            }
        };

        Classification {
            item_id: item.id().clone(),
            modality,
            language: language.filter(|l| !l.trim().is_empty()),
            domain,
            content_type,
            attributes,
        }
    }

    /// Classifies every item, keyed by item id.
    pub fn classify_batch(&self, items: &[Item]) -> BTreeMap<ItemId, Classification> {
        items
            .iter()
            .map(|item| (item.id().clone(), self.classify_item(item)))
            .collect()
    }

    /// Builds per-dimension distributions. An empty input yields empty maps.
    pub fn aggregate<'a>(
        &self,
        classifications: impl IntoIterator<Item = &'a Classification>,
    ) -> ClassificationAggregate {
        let mut counts: [BTreeMap<String, u64>; 4] = Default::default();
        let mut unclassified: BTreeMap<String, u64> = BTreeMap::new();
        let mut total = 0u64;

        for c in classifications {
            total += 1;
            let labels = [
                c.modality.is_known().then(|| c.modality.as_str().to_string()),
                c.language.clone(),
                c.domain.map(|d| d.as_str().to_string()),
                c.content_type.map(|t| t.as_str().to_string()),
            ];
            for (dim, label) in labels.into_iter().enumerate() {
                match label {
                    Some(label) => *counts[dim].entry(label).or_insert(0) += 1,
                    None => *unclassified.entry(DIMENSIONS[dim].to_string()).or_insert(0) += 1,
                }
            }
        }

        let [modality, language, domain, content_type] = counts.map(normalise);
        ClassificationAggregate {
            modality,
            language,
            domain,
            content_type,
            unclassified,
            total_items: total,
        }
    }
}

const DIMENSIONS: [&str; 4] = ["modality", "language", "domain", "content_type"];

fn normalise(counts: BTreeMap<String, u64>) -> BTreeMap<String, f64> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .into_iter()
        .map(|(label, n)| (label, n as f64 / total as f64))
        .collect()
}

fn metadata_domain(item: &Item) -> Option<Domain> {
    item.descriptor()
        .metadata
        .get("domain")
        .and_then(|d| d.parse().ok())
}

fn detect_content_type(text: &str, declared: MediaFormat) -> Option<ContentType> {
    match declared {
        MediaFormat::Csv => return Some(ContentType::Tabular),
        MediaFormat::Json | MediaFormat::Xml => return Some(ContentType::Structured),
        _ => {}
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if looks_structured(trimmed) {
        return Some(ContentType::Structured);
    }

    let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
    if looks_tabular(&lines) {
        return Some(ContentType::Tabular);
    }
    if lines.iter().filter(|l| speaker_turn().is_match(l)).count() >= 2 {
        return Some(ContentType::Conversation);
    }
    let code_lines = lines.iter().filter(|l| code_line().is_match(l)).count();
    if code_lines >= 2 && code_lines as f64 / lines.len() as f64 >= CODE_LINE_RATIO {
        return Some(ContentType::Code);
    }
    if instruction_prompt().is_match(trimmed)
        || lines.iter().filter(|l| numbered_step().is_match(l)).count() >= 2
    {
        return Some(ContentType::Instruction);
    }
    Some(ContentType::Prose)
}

fn looks_structured(trimmed: &str) -> bool {
    let json_like = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if json_like && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return true;
    }
    trimmed.starts_with('<') && trimmed.ends_with('>')
}

/// Two or more lines sharing the same non-zero delimiter count.
fn looks_tabular(lines: &[&str]) -> bool {
    if lines.len() < 2 {
        return false;
    }
    [',', '\t', ';', '|'].iter().any(|&delim| {
        let first = lines[0].matches(delim).count();
        first > 0 && lines.iter().all(|l| l.matches(delim).count() == first)
    })
}

/// Reads width and height from a PNG IHDR chunk.
fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ItemDescriptor;

    fn text_item(name: &str, ordinal: u64, text: &str) -> Item {
        Item::from_bytes(name, ordinal, text)
    }

    fn png_item() -> Item {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        bytes.extend_from_slice(&[0, 0, 0, 13]);
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&640u32.to_be_bytes());
        bytes.extend_from_slice(&480u32.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        Item::from_bytes("photo.png", 0, bytes)
    }

    #[test]
    fn test_classify_english_medical_text() {
        let classifier = Classifier::new();
        let item = text_item(
            "note.txt",
            0,
            "The patient was given treatment for the infection and the symptoms improved.",
        );
        let c = classifier.classify_item(&item);
        assert_eq!(c.modality, Modality::Text);
        assert_eq!(c.language.as_deref(), Some("en"));
        assert_eq!(c.domain, Some(Domain::Medical));
        assert_eq!(c.content_type, Some(ContentType::Prose));
        assert_eq!(c.attributes.get("format").map(String::as_str), Some("txt"));
    }

    #[test]
    fn test_content_types() {
        let classifier = Classifier::new();
        let cases = [
            ("chat.txt", "User: hello there\nAssistant: hi, how can I help?", ContentType::Conversation),
            ("main.txt", "fn main() {\n    let x = 1;\n    println!(\"{}\", x);\n}", ContentType::Code),
            ("table.txt", "id,name\n1,alpha\n2,beta", ContentType::Tabular),
            ("doc.txt", "{\"key\": [1, 2, 3]}", ContentType::Structured),
            ("task.txt", "Summarize the following article in two sentences.", ContentType::Instruction),
            ("data.csv", "free text in a csv file", ContentType::Tabular),
        ];
        for (name, text, expected) in cases {
            let c = classifier.classify_item(&text_item(name, 0, text));
            assert_eq!(c.content_type, Some(expected), "{}", name);
        }
    }

    #[test]
    fn test_classify_png_attributes() {
        let c = Classifier::new().classify_item(&png_item());
        assert_eq!(c.modality, Modality::Image);
        assert_eq!(c.content_type, None);
        assert_eq!(c.attributes.get("width").map(String::as_str), Some("640"));
        assert_eq!(c.attributes.get("height").map(String::as_str), Some("480"));
    }

    #[test]
    fn test_audio_language_from_metadata() {
        let descriptor = ItemDescriptor::new("clip.wav", 0, 4)
            .with_metadata("language", "fr")
            .with_metadata("domain", "legal");
        let item = Item::new(descriptor, b"RIFF".to_vec());
        let c = Classifier::new().classify_item(&item);
        assert_eq!(c.modality, Modality::Audio);
        assert_eq!(c.language.as_deref(), Some("fr"));
        assert_eq!(c.domain, Some(Domain::Legal));
    }

    #[test]
    fn test_unknown_modality() {
        let item = Item::from_bytes("blob.bin", 0, vec![0x00, 0xff, 0x10, 0x80]);
        let c = Classifier::new().classify_item(&item);
        assert_eq!(c.modality, Modality::Unknown);
        assert_eq!(c.language, None);
    }

    #[test]
    fn test_classify_batch_keys() {
        let items = vec![text_item("a.txt", 0, "alpha"), png_item()];
        let batch = Classifier::new().classify_batch(&items);
        assert_eq!(batch.len(), 2);
        assert!(batch.contains_key(&ItemId::new("photo.png")));
    }

    #[test]
    fn test_aggregate_excludes_unknowns() {
        let classifier = Classifier::new();
        let mut text = Classification::unknown(ItemId::new("a"));
        text.modality = Modality::Text;
        text.language = Some("en".to_string());
        let mut image = Classification::unknown(ItemId::new("b"));
        image.modality = Modality::Image;
        let unknown = Classification::unknown(ItemId::new("c"));

        let agg = classifier.aggregate(&[text, image, unknown]);
        assert_eq!(agg.total_items, 3);
        assert_eq!(agg.modality.get("text"), Some(&0.5));
        assert_eq!(agg.modality.get("image"), Some(&0.5));
        assert_eq!(agg.language.get("en"), Some(&1.0));
        assert_eq!(agg.unclassified.get("modality"), Some(&1));
        assert_eq!(agg.unclassified.get("language"), Some(&2));
        assert!(agg.domain.is_empty());

        let sum: f64 = agg.modality.values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_empty() {
        let none: Vec<Classification> = Vec::new();
        let agg = Classifier::new().aggregate(&none);
        assert!(agg.is_empty());
        assert!(agg.modality.is_empty());
        assert!(agg.unclassified.is_empty());
    }
}
