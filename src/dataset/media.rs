//! Media format detection from media types, file names and content bytes.

use serde::{Deserialize, Serialize};

/// Coarse modality of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
    Video,
    Image,
    Unknown,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Audio => "audio",
            Modality::Video => "video",
            Modality::Image => "image",
            Modality::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Modality::Unknown
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete file formats accepted by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    PlainText,
    Csv,
    Json,
    Xml,
    Pdf,
    Mp3,
    Wav,
    M4a,
    Flac,
    Mp4,
    Avi,
    Mov,
    Mkv,
    Webm,
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
    Unknown,
}

impl MediaFormat {
    /// Maps a (lowercase) file extension to its format.
    pub fn from_extension(ext: &str) -> MediaFormat {
        match ext.to_lowercase().as_str() {
            "txt" => MediaFormat::PlainText,
            "csv" => MediaFormat::Csv,
            "json" => MediaFormat::Json,
            "xml" => MediaFormat::Xml,
            "pdf" => MediaFormat::Pdf,
            "mp3" => MediaFormat::Mp3,
            "wav" => MediaFormat::Wav,
            "m4a" => MediaFormat::M4a,
            "flac" => MediaFormat::Flac,
            "mp4" => MediaFormat::Mp4,
            "avi" => MediaFormat::Avi,
            "mov" => MediaFormat::Mov,
            "mkv" => MediaFormat::Mkv,
            "webm" => MediaFormat::Webm,
            "jpg" | "jpeg" => MediaFormat::Jpeg,
            "png" => MediaFormat::Png,
            "gif" => MediaFormat::Gif,
            "bmp" => MediaFormat::Bmp,
            "webp" => MediaFormat::Webp,
            _ => MediaFormat::Unknown,
        }
    }

    /// Maps a file name to its format via the extension.
    pub fn from_file_name(name: &str) -> MediaFormat {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => MediaFormat::Unknown,
        }
    }

    /// Maps a declared media type (parameters ignored) to its format.
    pub fn from_media_type(media_type: &str) -> MediaFormat {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match essence.as_str() {
            "text/plain" => MediaFormat::PlainText,
            "text/csv" => MediaFormat::Csv,
            "application/json" => MediaFormat::Json,
            "application/xml" | "text/xml" => MediaFormat::Xml,
            "application/pdf" => MediaFormat::Pdf,
            "audio/mpeg" => MediaFormat::Mp3,
            "audio/wav" | "audio/x-wav" => MediaFormat::Wav,
            "audio/mp4" | "audio/x-m4a" => MediaFormat::M4a,
            "audio/flac" => MediaFormat::Flac,
            "video/mp4" => MediaFormat::Mp4,
            "video/x-msvideo" => MediaFormat::Avi,
            "video/quicktime" => MediaFormat::Mov,
            "video/x-matroska" => MediaFormat::Mkv,
            "video/webm" => MediaFormat::Webm,
            "image/jpeg" => MediaFormat::Jpeg,
            "image/png" => MediaFormat::Png,
            "image/gif" => MediaFormat::Gif,
            "image/bmp" => MediaFormat::Bmp,
            "image/webp" => MediaFormat::Webp,
            _ => MediaFormat::Unknown,
        }
    }

    /// Canonical media type for this format.
    pub fn media_type(&self) -> &'static str {
        match self {
            MediaFormat::PlainText => "text/plain",
            MediaFormat::Csv => "text/csv",
            MediaFormat::Json => "application/json",
            MediaFormat::Xml => "application/xml",
            MediaFormat::Pdf => "application/pdf",
            MediaFormat::Mp3 => "audio/mpeg",
            MediaFormat::Wav => "audio/wav",
            MediaFormat::M4a => "audio/mp4",
            MediaFormat::Flac => "audio/flac",
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::Avi => "video/x-msvideo",
            MediaFormat::Mov => "video/quicktime",
            MediaFormat::Mkv => "video/x-matroska",
            MediaFormat::Webm => "video/webm",
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Bmp => "image/bmp",
            MediaFormat::Webp => "image/webp",
            MediaFormat::Unknown => "application/octet-stream",
        }
    }

    /// Short lowercase name, used as the `format` attribute.
    pub fn name(&self) -> &'static str {
        match self {
            MediaFormat::PlainText => "txt",
            MediaFormat::Csv => "csv",
            MediaFormat::Json => "json",
            MediaFormat::Xml => "xml",
            MediaFormat::Pdf => "pdf",
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Wav => "wav",
            MediaFormat::M4a => "m4a",
            MediaFormat::Flac => "flac",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Avi => "avi",
            MediaFormat::Mov => "mov",
            MediaFormat::Mkv => "mkv",
            MediaFormat::Webm => "webm",
            MediaFormat::Jpeg => "jpeg",
            MediaFormat::Png => "png",
            MediaFormat::Gif => "gif",
            MediaFormat::Bmp => "bmp",
            MediaFormat::Webp => "webp",
            MediaFormat::Unknown => "unknown",
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            MediaFormat::PlainText
            | MediaFormat::Csv
            | MediaFormat::Json
            | MediaFormat::Xml
            | MediaFormat::Pdf => Modality::Text,
            MediaFormat::Mp3 | MediaFormat::Wav | MediaFormat::M4a | MediaFormat::Flac => {
                Modality::Audio
            }
            MediaFormat::Mp4
            | MediaFormat::Avi
            | MediaFormat::Mov
            | MediaFormat::Mkv
            | MediaFormat::Webm => Modality::Video,
            MediaFormat::Jpeg
            | MediaFormat::Png
            | MediaFormat::Gif
            | MediaFormat::Bmp
            | MediaFormat::Webp => Modality::Image,
            MediaFormat::Unknown => Modality::Unknown,
        }
    }

    /// Formats whose content is UTF-8 text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            MediaFormat::PlainText | MediaFormat::Csv | MediaFormat::Json | MediaFormat::Xml
        )
    }

    /// Detects a binary format from its magic bytes.
    ///
    /// Textual formats are not sniffed here because any UTF-8 buffer would
    /// match; callers validate those by parsing.
    pub fn sniff(bytes: &[u8]) -> MediaFormat {
        let starts = |magic: &[u8]| bytes.starts_with(magic);
        let riff_kind = |kind: &[u8]| bytes.len() >= 12 && starts(b"RIFF") && &bytes[8..12] == kind;

        if starts(b"%PDF-") {
            MediaFormat::Pdf
        } else if starts(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]) {
            MediaFormat::Png
        } else if starts(&[0xff, 0xd8, 0xff]) {
            MediaFormat::Jpeg
        } else if starts(b"GIF87a") || starts(b"GIF89a") {
            MediaFormat::Gif
        } else if riff_kind(b"WEBP") {
            MediaFormat::Webp
        } else if riff_kind(b"WAVE") {
            MediaFormat::Wav
        } else if riff_kind(b"AVI ") {
            MediaFormat::Avi
        } else if starts(b"ID3") || starts(&[0xff, 0xfb]) || starts(&[0xff, 0xf3]) {
            MediaFormat::Mp3
        } else if starts(b"fLaC") {
            MediaFormat::Flac
        } else if starts(&[0x1a, 0x45, 0xdf, 0xa3]) {
            // Matroska and WebM share the EBML header; the doctype tells them apart.
            if bytes.windows(4).take(64).any(|w| w == b"webm") {
                MediaFormat::Webm
            } else {
                MediaFormat::Mkv
            }
        } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            match &bytes[8..12] {
                b"qt  " => MediaFormat::Mov,
                b"M4A " => MediaFormat::M4a,
                _ => MediaFormat::Mp4,
            }
        } else if starts(b"BM") && bytes.len() >= 14 {
            MediaFormat::Bmp
        } else {
            MediaFormat::Unknown
        }
    }
}

impl std::fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_images() {
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        assert_eq!(MediaFormat::sniff(&png), MediaFormat::Png);
        assert_eq!(MediaFormat::sniff(&[0xff, 0xd8, 0xff, 0xe0]), MediaFormat::Jpeg);
        assert_eq!(MediaFormat::sniff(b"GIF89a...."), MediaFormat::Gif);
    }

    #[test]
    fn test_sniff_riff_containers() {
        let mut wav = b"RIFF".to_vec();
        wav.extend_from_slice(&[0, 0, 0, 0]);
        wav.extend_from_slice(b"WAVE");
        assert_eq!(MediaFormat::sniff(&wav), MediaFormat::Wav);

        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0, 0, 0, 0]);
        webp.extend_from_slice(b"WEBP");
        assert_eq!(MediaFormat::sniff(&webp), MediaFormat::Webp);
    }

    #[test]
    fn test_sniff_iso_media() {
        let mut mp4 = vec![0, 0, 0, 0x18];
        mp4.extend_from_slice(b"ftypisom");
        assert_eq!(MediaFormat::sniff(&mp4), MediaFormat::Mp4);

        let mut mov = vec![0, 0, 0, 0x14];
        mov.extend_from_slice(b"ftypqt  ");
        assert_eq!(MediaFormat::sniff(&mov), MediaFormat::Mov);
    }

    #[test]
    fn test_sniff_text_is_unknown() {
        assert_eq!(MediaFormat::sniff(b"hello"), MediaFormat::Unknown);
        assert_eq!(MediaFormat::sniff(&[]), MediaFormat::Unknown);
    }

    #[test]
    fn test_media_type_mapping() {
        assert_eq!(
            MediaFormat::from_media_type("text/plain; charset=utf-8"),
            MediaFormat::PlainText
        );
        assert_eq!(MediaFormat::from_media_type("image/png"), MediaFormat::Png);
        assert_eq!(
            MediaFormat::from_media_type("application/octet-stream"),
            MediaFormat::Unknown
        );
        assert_eq!(MediaFormat::Png.media_type(), "image/png");
    }

    #[test]
    fn test_modality() {
        assert_eq!(MediaFormat::from_extension("WAV").modality(), Modality::Audio);
        assert_eq!(MediaFormat::from_extension("mkv").modality(), Modality::Video);
        assert_eq!(MediaFormat::from_extension("csv").modality(), Modality::Text);
        assert_eq!(MediaFormat::from_file_name(".hidden").modality(), Modality::Unknown);
    }
}
