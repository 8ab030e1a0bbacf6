use once_cell::sync::Lazy;
use regex::Regex;

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("regex"));

/// Collapse extraction artifacts while preserving paragraph structure.
pub fn clean_page_text(text: &str) -> String {
    let replaced = text.replace('\u{a0}', " ");
    EXCESS_NEWLINES
        .replace_all(&replaced, "\n\n")
        .trim()
        .to_string()
}

/// Derive a model tag from a manual filename, e.g. "SV650_Manual.pdf" -> "SV650".
/// Manuals are conventionally named `<model>_<anything>.pdf`.
pub fn model_tag_from_filename(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    stem.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .next()
        .unwrap_or(stem)
        .to_string()
}
