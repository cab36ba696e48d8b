//! Item classification: modality, language, domain and content type.

pub mod classifier;
pub mod language;
pub mod taxonomy;

pub use crate::dataset::Modality;
pub use classifier::{Classification, ClassificationAggregate, Classifier};
pub use language::LanguageDetector;
pub use taxonomy::{tokenize, ContentType, Domain};
