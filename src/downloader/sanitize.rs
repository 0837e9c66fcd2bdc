//! Safe artifact names from Drive display names

use once_cell::sync::Lazy;
use regex::Regex;

/// Extension every artifact gets, whatever the source file had
pub const ARTIFACT_EXTENSION: &str = "txt";
/// Upper bound for the whole artifact name, extension included
pub const MAX_ARTIFACT_NAME_LEN: usize = 100;

const FALLBACK_STEM: &str = "untitled";

/// Extensions stripped whatever their case
const KNOWN_EXTENSIONS: &[&str] = &[
    "txt", "text", "md", "rtf", "doc", "docx", "odt", "pdf", "htm", "html", "xml", "json",
    "csv", "log", "vtt", "srt", "sbv",
];

static HOSTILE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]|\s+"#).unwrap());
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

pub fn sanitize_filename(name: &str) -> String {
    sanitize_with(name, ARTIFACT_EXTENSION, MAX_ARTIFACT_NAME_LEN)
}

/// Replace path-hostile characters and whitespace with `_`, collapse and trim
/// underscores, swap the extension for `extension` and cap the total length
/// at `max_len` characters by shortening the stem.
pub fn sanitize_with(name: &str, extension: &str, max_len: usize) -> String {
    let stem = strip_extension(name.trim());
    let replaced = HOSTILE.replace_all(stem, "_");
    let collapsed = UNDERSCORES.replace_all(&replaced, "_");
    let mut stem = trim_edges(&collapsed).to_string();

    if stem.is_empty() {
        stem = FALLBACK_STEM.to_string();
    }

    let budget = max_len.saturating_sub(extension.chars().count() + 1).max(1);
    if stem.chars().count() > budget {
        let truncated: String = stem.chars().take(budget).collect();
        stem = match trim_edges(&truncated) {
            "" => truncated,
            trimmed => trimmed.to_string(),
        };
    }

    format!("{}.{}", stem, extension)
}

/// Drop a trailing `.ext`: a known extension in any case, or 1-5 lowercase
/// ASCII letters and digits with at least one letter. `J.Doe` or `10.Jun`
/// stay part of the name.
fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && looks_like_extension(ext) => stem,
        _ => name,
    }
}

fn looks_like_extension(ext: &str) -> bool {
    if KNOWN_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
    {
        return true;
    }
    (1..=5).contains(&ext.len())
        && ext
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && ext.chars().any(|c| c.is_ascii_lowercase())
}

fn trim_edges(value: &str) -> &str {
    value.trim_matches(|c| c == '_' || c == '.')
}
