mod chunk;
mod error;
mod extract;
mod normalize;

pub use chunk::{ChunkConfig, ChunkRecord, Chunker};
pub use error::{ExtractError, Result};
pub use extract::{load_document, ManualDocument, ManualPage, MIN_PAGE_CHARS};
pub use normalize::{clean_page_text, model_tag_from_filename};
