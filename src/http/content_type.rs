//! Content-type classification.
//!
//! One table drives every lookup: enum ↔ extension and enum ↔ MIME string.
//! Reverse maps are built once on first use and never mutated. Unknown
//! inputs fall back to `OctetStream`.

use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentType {
    Invalid,

    // Scripts
    Html,
    Css,
    Js,

    // Images
    Png,
    Jpeg,
    Gif,
    Webp,
    Ico,
    Svg,

    // Audio
    Mp3,
    M4a,
    Aac,
    Ogg,
    Opus,
    Flac,
    Wav,

    // Video
    Mp4,
    Webm,
    Mkv,
    Mov,
    Avi,

    // Fonts
    Woff,
    Woff2,
    Ttf,
    Otf,

    // Documents and text
    Plain,
    Json,
    Xml,
    Csv,
    Markdown,

    // Archives and binaries
    Zip,
    Gz,
    Tar,
    SevenZip,
    Rar,
    Pdf,
    Wasm,

    /// Catch-all for anything unrecognised.
    OctetStream,
}

/// (type, extension, MIME). Every defined type appears exactly once.
const TABLE: &[(ContentType, &str, &str)] = &[
    (ContentType::Html, ".html", "text/html"),
    (ContentType::Css, ".css", "text/css"),
    (ContentType::Js, ".js", "application/javascript"),
    (ContentType::Png, ".png", "image/png"),
    (ContentType::Jpeg, ".jpeg", "image/jpeg"),
    (ContentType::Gif, ".gif", "image/gif"),
    (ContentType::Webp, ".webp", "image/webp"),
    (ContentType::Ico, ".ico", "image/vnd.microsoft.icon"),
    (ContentType::Svg, ".svg", "image/svg+xml"),
    (ContentType::Mp3, ".mp3", "audio/mpeg"),
    (ContentType::M4a, ".m4a", "audio/mp4"),
    (ContentType::Aac, ".aac", "audio/aac"),
    (ContentType::Ogg, ".ogg", "audio/ogg"),
    (ContentType::Opus, ".opus", "audio/opus"),
    (ContentType::Flac, ".flac", "audio/flac"),
    (ContentType::Wav, ".wav", "audio/wav"),
    (ContentType::Mp4, ".mp4", "video/mp4"),
    (ContentType::Webm, ".webm", "video/webm"),
    (ContentType::Mkv, ".mkv", "video/x-matroska"),
    (ContentType::Mov, ".mov", "video/quicktime"),
    (ContentType::Avi, ".avi", "video/x-msvideo"),
    (ContentType::Woff, ".woff", "font/woff"),
    (ContentType::Woff2, ".woff2", "font/woff2"),
    (ContentType::Ttf, ".ttf", "font/ttf"),
    (ContentType::Otf, ".otf", "font/otf"),
    (ContentType::Plain, ".txt", "text/plain"),
    (ContentType::Json, ".json", "application/json"),
    (ContentType::Xml, ".xml", "application/xml"),
    (ContentType::Csv, ".csv", "text/csv"),
    (ContentType::Markdown, ".md", "text/markdown"),
    (ContentType::Zip, ".zip", "application/zip"),
    (ContentType::Gz, ".gz", "application/gzip"),
    (ContentType::Tar, ".tar", "application/x-tar"),
    (ContentType::SevenZip, ".7z", "application/x-7z-compressed"),
    (ContentType::Rar, ".rar", "application/vnd.rar"),
    (ContentType::Pdf, ".pdf", "application/pdf"),
    (ContentType::Wasm, ".wasm", "application/wasm"),
    (ContentType::OctetStream, ".bin", "application/octet-stream"),
];

/// Extra spellings accepted on input only.
const EXTENSION_ALIASES: &[(&str, ContentType)] = &[(".jpg", ContentType::Jpeg), (".htm", ContentType::Html)];

static BY_EXTENSION: LazyLock<HashMap<&'static str, ContentType>> = LazyLock::new(|| {
    TABLE
        .iter()
        .map(|&(ty, ext, _)| (ext, ty))
        .chain(EXTENSION_ALIASES.iter().copied())
        .collect()
});

static BY_MIME: LazyLock<HashMap<&'static str, ContentType>> =
    LazyLock::new(|| TABLE.iter().map(|&(ty, _, mime)| (mime, ty)).collect());

impl ContentType {
    /// Every defined (non-invalid) content type.
    pub fn all() -> impl Iterator<Item = ContentType> {
        TABLE.iter().map(|&(ty, _, _)| ty)
    }

    fn row(self) -> Option<&'static (ContentType, &'static str, &'static str)> {
        TABLE.iter().find(|(ty, _, _)| *ty == self)
    }

    /// Map a file extension (`"png"`, `".PNG"`, `"photo.png"` all work).
    pub fn from_extension(input: &str) -> ContentType {
        let trimmed = input.trim();
        let ext = match trimmed.rfind('.') {
            Some(pos) => &trimmed[pos..],
            None => trimmed,
        };
        let normalized = if ext.starts_with('.') {
            ext.to_ascii_lowercase()
        } else {
            format!(".{}", ext.to_ascii_lowercase())
        };
        BY_EXTENSION
            .get(normalized.as_str())
            .copied()
            .unwrap_or(ContentType::OctetStream)
    }

    /// Canonical extension including the leading dot. Empty for `Invalid`.
    pub fn extension(self) -> &'static str {
        self.row().map_or("", |&(_, ext, _)| ext)
    }

    /// Map a MIME string; parameters such as `; charset=utf-8` are ignored.
    pub fn from_mime(input: &str) -> ContentType {
        let essence = input
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        BY_MIME
            .get(essence.as_str())
            .copied()
            .unwrap_or(ContentType::OctetStream)
    }

    /// MIME string. `Invalid` renders as octet-stream.
    pub fn mime(self) -> &'static str {
        self.row()
            .map_or("application/octet-stream", |&(_, _, mime)| mime)
    }

    /// Value for a `Content-Type` header.
    pub fn header_value(self) -> String {
        let mime = self.mime();
        if mime.starts_with("text/")
            || matches!(self, ContentType::Js | ContentType::Json | ContentType::Xml | ContentType::Svg)
        {
            format!("{mime}; charset=utf-8")
        } else {
            mime.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_round_trip() {
        for ty in ContentType::all() {
            assert_eq!(ContentType::from_extension(ty.extension()), ty, "{ty:?}");
        }
    }

    #[test]
    fn mime_round_trip() {
        for ty in ContentType::all() {
            assert_eq!(ContentType::from_mime(ty.mime()), ty, "{ty:?}");
        }
    }

    #[test]
    fn table_has_no_duplicates() {
        assert_eq!(BY_MIME.len(), TABLE.len());
        assert_eq!(BY_EXTENSION.len(), TABLE.len() + EXTENSION_ALIASES.len());
        assert!(!ContentType::all().any(|ty| ty == ContentType::Invalid));
    }

    #[test]
    fn unknown_falls_back_to_octet_stream() {
        assert_eq!(ContentType::from_extension(".exe"), ContentType::OctetStream);
        assert_eq!(ContentType::from_extension(""), ContentType::OctetStream);
        assert_eq!(ContentType::from_mime("application/x-unknown"), ContentType::OctetStream);
    }

    #[test]
    fn lenient_inputs() {
        assert_eq!(ContentType::from_extension("PNG"), ContentType::Png);
        assert_eq!(ContentType::from_extension("photo.JPG"), ContentType::Jpeg);
        assert_eq!(ContentType::from_extension("archive.tar.gz"), ContentType::Gz);
        assert_eq!(ContentType::from_mime("Text/HTML; charset=utf-8"), ContentType::Html);
    }

    #[test]
    fn header_value_adds_charset_to_text() {
        assert_eq!(ContentType::Html.header_value(), "text/html; charset=utf-8");
        assert_eq!(ContentType::Png.header_value(), "image/png");
        assert_eq!(ContentType::Invalid.mime(), "application/octet-stream");
        assert_eq!(ContentType::Invalid.extension(), "");
    }
}
