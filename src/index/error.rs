use std::io;
use thiserror::Error;

use crate::buffer::PoolError;

use super::NodeId;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index store initialization failed: {0}")]
    IndexInit(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("node not found: node_id={0}")]
    NodeNotFound(NodeId),

    #[error("index file record is corrupt: {0}")]
    CorruptRecord(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised by B+ tree operations; store and pool failures met
/// inside the tree are wrapped here
#[derive(Debug, Error)]
pub enum BPlusTreeError {
    #[error("invalid fan-out {0}: must be at least 2")]
    InvalidFanout(usize),

    #[error("node {0} has an unexpected variant")]
    WrongNodeVariant(NodeId),

    #[error(transparent)]
    Pool(#[from] PoolError<IndexError>),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type BPlusTreeResult<T> = Result<T, BPlusTreeError>;
