use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::extract::ManualDocument;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub source_file: String,
    pub model_tag: String,
    pub page_number: u32,
    /// Position of the chunk within its page.
    pub ordinal: u32,
    pub text: String,
}

pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn chunk_document(&self, document: &ManualDocument) -> Vec<ChunkRecord> {
        document
            .pages
            .par_iter()
            .map(|page| {
                self.split_page(&page.text)
                    .into_iter()
                    .enumerate()
                    .map(|(ordinal, text)| ChunkRecord {
                        source_file: document.source_file.clone(),
                        model_tag: document.model_tag.clone(),
                        page_number: page.number,
                        ordinal: ordinal as u32,
                        text,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Fixed-size overlapping character windows, breaking on whitespace
    /// where a break exists in the back half of the window.
    pub fn split_page(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size.saturating_sub(1));
        let mut windows = Vec::new();
        let mut start = 0usize;
        while start < chars.len() {
            let hard_end = (start + size).min(chars.len());
            let end = if hard_end < chars.len() {
                break_point(&chars, start, hard_end)
            } else {
                hard_end
            };
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                windows.push(trimmed.to_string());
            }
            if end == chars.len() {
                break;
            }
            start = end.saturating_sub(overlap).max(start + 1);
        }
        windows
    }
}

fn break_point(chars: &[char], start: usize, hard_end: usize) -> usize {
    let min_end = start + (hard_end - start) / 2;
    let mut idx = hard_end;
    while idx > min_end {
        if chars[idx - 1].is_whitespace() {
            return idx;
        }
        idx -= 1;
    }
    hard_end
}
