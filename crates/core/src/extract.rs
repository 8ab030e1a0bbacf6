use std::fs;
use std::path::Path;

use crate::error::{ExtractError, Result};
use crate::normalize::{clean_page_text, model_tag_from_filename};

/// Pages shorter than this after cleaning are dropped (covers, blanks,
/// imprint pages).
pub const MIN_PAGE_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct ManualPage {
    /// 1-based page number in the source document.
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ManualDocument {
    pub source_file: String,
    pub model_tag: String,
    pub pages: Vec<ManualPage>,
    /// Page count of the source before the short-page filter.
    pub total_pages: u32,
}

/// Load a manual and return its cleaned, non-empty pages.
pub fn load_document(path: &Path) -> Result<ManualDocument> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase());
    let raw_pages = match ext.as_deref() {
        Some("pdf") => pdf_pages(path)?,
        Some("txt") | Some("text") => text_pages(path)?,
        _ => return Err(ExtractError::UnsupportedInput(path.to_path_buf())),
    };
    let source_file = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let total_pages = raw_pages.len() as u32;
    let pages = raw_pages
        .into_iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let text = clean_page_text(&raw);
            if text.chars().count() < MIN_PAGE_CHARS {
                return None;
            }
            Some(ManualPage {
                number: idx as u32 + 1,
                text,
            })
        })
        .collect();
    Ok(ManualDocument {
        model_tag: model_tag_from_filename(&source_file),
        source_file,
        pages,
        total_pages,
    })
}

fn pdf_pages(path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(path).map_err(|e| ExtractError::Pdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// Form-feed separated pages, used by fixtures and plain-text manuals.
fn text_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes).to_string();
    Ok(content.split('\u{c}').map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAGE_ONE: &str =
        "Tire pressure should be 32 PSI front and 36 PSI rear when the tires are cold.";

    #[test]
    fn loads_text_manual_with_page_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("SV650_Manual.txt");
        let page_two = "Chain slack must be between 20 and 30 mm, measured at the midpoint.";
        fs::write(&path, format!("{PAGE_ONE}\u{c}{page_two}")).unwrap();

        let doc = load_document(&path).unwrap();
        assert_eq!(doc.source_file, "SV650_Manual.txt");
        assert_eq!(doc.model_tag, "SV650");
        assert_eq!(doc.total_pages, 2);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].number, 1);
        assert_eq!(doc.pages[1].number, 2);
        assert!(doc.pages[0].text.contains("32 PSI"));
    }

    #[test]
    fn short_pages_are_dropped_but_numbering_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cover.txt");
        fs::write(&path, format!("COVER\u{c}{PAGE_ONE}")).unwrap();

        let doc = load_document(&path).unwrap();
        assert_eq!(doc.total_pages, 2);
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].number, 2);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manual.docx");
        fs::write(&path, "irrelevant").unwrap();
        assert!(matches!(
            load_document(&path),
            Err(ExtractError::UnsupportedInput(_))
        ));
    }
}
