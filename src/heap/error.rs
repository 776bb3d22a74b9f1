use crate::file::FileError;
use crate::record::RecordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Heap file not found: {0}")]
    NotFound(String),

    #[error("Heap file already exists: {0}")]
    AlreadyExists(String),

    #[error("Bad scan parameter: {0}")]
    BadScanParam(String),

    #[error("Record of {len} bytes exceeds the maximum of {max}")]
    OversizeRecord { len: usize, max: usize },

    #[error("No current record")]
    NoCurrentRecord,

    #[error("Corrupted file header: {0}")]
    CorruptHeader(String),
}

pub type HeapResult<T> = Result<T, HeapError>;
