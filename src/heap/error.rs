use std::io;
use thiserror::Error;

use super::PageId;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("heap store initialization failed: {0}")]
    StoreInit(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("page out of range: page_id={0}")]
    PageOutOfRange(PageId),

    #[error("page {0} is corrupt: {1}")]
    PageCorrupt(PageId, String),

    #[error("encoded page {id} needs {encoded} bytes, page size is {page_size}")]
    PageTooLarge {
        id: PageId,
        encoded: usize,
        page_size: usize,
    },

    #[error("heap is full: cannot allocate page {0}")]
    HeapFull(PageId),

    #[error("invalid wine record: {0}")]
    InvalidRecord(String),
}

pub type HeapResult<T> = Result<T, HeapError>;
