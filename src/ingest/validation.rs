//! File acceptance rules for ingestion.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::dataset::{MediaFormat, Modality};

/// Extensions accepted for ingestion, grouped by modality.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "csv", "json", "xml", // text
    "mp3", "wav", "m4a", "flac", // audio
    "mp4", "avi", "mov", "mkv", "webm", // video
    "jpg", "jpeg", "png", "gif", "bmp", "webp", // image
];

const MIB: u64 = 1024 * 1024;

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();

fn unsafe_chars() -> &'static Regex {
    UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^\w\s.-]").expect("Invalid regex for file names"))
}

/// Why a file was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileRejection {
    #[error("File '{0}' has no extension")]
    MissingExtension(String),

    #[error("File type '.{0}' not allowed")]
    ExtensionNotAllowed(String),

    #[error("File exceeds maximum size of {limit_mib} MiB for {modality} ({size} bytes)")]
    TooLarge {
        modality: Modality,
        size: u64,
        limit_mib: u64,
    },
}

/// Largest accepted file size for a modality.
pub fn max_file_size(modality: Modality) -> u64 {
    match modality {
        Modality::Text => 100 * MIB,
        Modality::Audio => 500 * MIB,
        Modality::Video => 2 * 1024 * MIB,
        Modality::Image => 50 * MIB,
        Modality::Unknown => 100 * MIB,
    }
}

/// Checks a file name and size against the ingestion rules and returns the
/// modality the file will be stored under.
pub fn validate_file(file_name: &str, size_bytes: u64) -> Result<Modality, FileRejection> {
    let ext = match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => return Err(FileRejection::MissingExtension(file_name.to_string())),
    };

    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(FileRejection::ExtensionNotAllowed(ext));
    }

    let modality = MediaFormat::from_extension(&ext).modality();
    let limit = max_file_size(modality);
    if size_bytes > limit {
        return Err(FileRejection::TooLarge {
            modality,
            size: size_bytes,
            limit_mib: limit / MIB,
        });
    }

    Ok(modality)
}

/// Strips directory components and every character outside word characters,
/// whitespace, `.` and `-`.
pub fn sanitize_filename(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let cleaned = unsafe_chars().replace_all(base, "");
    cleaned.trim_start_matches('.').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_allowed_types() {
        assert_eq!(validate_file("notes.TXT", 10), Ok(Modality::Text));
        assert_eq!(validate_file("clip.mkv", 10), Ok(Modality::Video));
        assert_eq!(validate_file("voice.flac", 10), Ok(Modality::Audio));
        assert_eq!(validate_file("photo.jpeg", 10), Ok(Modality::Image));
    }

    #[test]
    fn test_validate_rejections() {
        assert!(matches!(
            validate_file("README", 10),
            Err(FileRejection::MissingExtension(_))
        ));
        assert_eq!(
            validate_file("run.exe", 10),
            Err(FileRejection::ExtensionNotAllowed("exe".to_string()))
        );
        assert!(matches!(
            validate_file("big.png", 51 * MIB),
            Err(FileRejection::TooLarge {
                modality: Modality::Image,
                ..
            })
        ));
        assert!(validate_file("big.mp4", 51 * MIB).is_ok());
    }

    #[test]
    fn test_size_limits() {
        assert_eq!(max_file_size(Modality::Text), 100 * MIB);
        assert_eq!(max_file_size(Modality::Video), 2048 * MIB);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(sanitize_filename("C:\\data\\report (final).csv"), "report final.csv");
        assert_eq!(sanitize_filename("weird$name!.json"), "weirdname.json");
        assert_eq!(sanitize_filename(".hidden.txt"), "hidden.txt");
    }
}
