//! Pure pre-flight checks: URL policy, file-name cleanup, and the
//! type/size gate applied before any bytes move.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::domain::model::FALLBACK_FILE_NAME;
use crate::domain::DownloadError;

/// Hard cap applied when the caller does not configure one.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Longest file name we are willing to display or suggest.
const MAX_FILE_NAME_LEN: usize = 255;

/// Extensions that are never downloadable, whatever the declared type says.
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "pif", "msi", "msp", "sh", "ps1", "vbs", "jar", "app",
    "dmg", "deb", "rpm", "apk",
];

/// MIME type -> accepted extensions. A declared type outside this table is
/// rejected; an absent declared type is not.
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    // documents
    ("application/pdf", &["pdf"]),
    ("application/msword", &["doc"]),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        &["docx"],
    ),
    ("application/vnd.ms-excel", &["xls"]),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        &["xlsx"],
    ),
    ("application/vnd.ms-powerpoint", &["ppt"]),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        &["pptx"],
    ),
    ("application/vnd.oasis.opendocument.text", &["odt"]),
    ("application/rtf", &["rtf"]),
    // plain text and code
    ("text/plain", &["txt", "md", "csv"]),
    ("text/markdown", &["md"]),
    ("text/csv", &["csv"]),
    ("application/json", &["json"]),
    ("application/xml", &["xml"]),
    ("text/xml", &["xml"]),
    // images
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
    ("image/svg+xml", &["svg"]),
    ("image/bmp", &["bmp"]),
    // archives
    ("application/zip", &["zip"]),
    ("application/vnd.rar", &["rar"]),
    ("application/x-rar-compressed", &["rar"]),
    ("application/x-7z-compressed", &["7z"]),
    ("application/gzip", &["gz"]),
    ("application/x-tar", &["tar"]),
    // audio and video
    ("audio/mpeg", &["mp3"]),
    ("audio/wav", &["wav"]),
    ("audio/ogg", &["ogg"]),
    ("video/mp4", &["mp4"]),
    ("video/webm", &["webm"]),
    ("video/quicktime", &["mov"]),
];

// Matches runs of dots left over from path traversal sequences.
static DOT_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("dot-run pattern"));

/// Parse `raw` against the application origin and enforce the scheme policy.
///
/// Purely syntactic: no network access. Relative inputs resolve against
/// `base_origin`; absolute inputs pass through. Anything that is not plain or
/// secure HTTP is rejected.
pub fn validate_target_url(raw: &str, base_origin: &str) -> Result<Url, DownloadError> {
    let base = Url::parse(base_origin)
        .map_err(|e| DownloadError::InvalidUrl(format!("bad base origin: {e}")))?;

    let resolved = base
        .join(raw.trim())
        .map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;

    match resolved.scheme() {
        "http" | "https" => Ok(resolved),
        other => Err(DownloadError::InvalidUrl(format!(
            "scheme '{other}' is not allowed"
        ))),
    }
}

/// Make a user-supplied name safe to show and to save under.
///
/// Path separators become `.`, other reserved punctuation becomes `_`, dot
/// runs collapse to a single dot, and the ends are stripped of dots and
/// whitespace. Idempotent: a sanitized name passes through unchanged.
pub fn sanitize_file_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '.',
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();

    let collapsed = DOT_RUNS.replace_all(&mapped, ".");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());

    let truncated: String = trimmed.chars().take(MAX_FILE_NAME_LEN).collect();
    // Truncation may expose a trailing dot or space again.
    let cleaned = truncated.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if cleaned.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Policy gate run before any byte transfer.
///
/// The extension blocklist wins over everything else; declared size and
/// declared type are only checked when present.
pub fn validate_declared_type(
    file_name: &str,
    declared_type: Option<&str>,
    declared_size: Option<u64>,
    max_size_bytes: u64,
) -> Result<(), DownloadError> {
    let extension = extension_of(file_name);
    if BLOCKED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(DownloadError::BlockedExtension(extension));
    }

    if let Some(size) = declared_size {
        if size > max_size_bytes {
            return Err(DownloadError::TooLarge {
                size,
                limit: max_size_bytes,
            });
        }
    }

    if let Some(declared) = declared_type {
        if !declared_type_is_allowed(declared) {
            return Err(DownloadError::UnsupportedType(declared.to_string()));
        }
    }

    Ok(())
}

/// Last `.`-delimited segment of `file_name`, lower-cased; empty if none.
fn extension_of(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Accepts either a MIME type (optionally with parameters) or a bare
/// extension, with or without a leading dot.
fn declared_type_is_allowed(declared: &str) -> bool {
    let normalized = declared
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if normalized.contains('/') {
        ALLOWED_TYPES.iter().any(|(mime, _)| *mime == normalized)
    } else {
        let bare = normalized.trim_start_matches('.');
        ALLOWED_TYPES
            .iter()
            .any(|(_, exts)| exts.contains(&bare))
    }
}
