//! Client filename sanitizing.
//!
//! Uploaded filenames only name the scratch file and donate their extension
//! to the stored object, so they are reduced to a plain ASCII base name.

use std::path::Path;

/// Name used when nothing survives sanitizing.
pub const FALLBACK_NAME: &str = "upload";

/// Longest sanitized name kept, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Reduce `file_name` to a safe base name.
///
/// Directory components are stripped, whitespace runs become `_`, and any
/// character outside `[A-Za-z0-9._-]` is dropped. Leading and trailing `.`
/// and `_` are trimmed so the result can never be `.`/`..` or a dotfile.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let mut name = filtered.trim_matches(['.', '_']);
    if name.len() > MAX_NAME_LEN {
        // Keep the tail so the extension survives.
        name = name[name.len() - MAX_NAME_LEN..].trim_start_matches(['.', '_']);
    }

    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Extension of a sanitized name including the leading dot, or `""`.
pub fn extension(sanitized: &str) -> String {
    Path::new(sanitized)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}
