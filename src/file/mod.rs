mod buffer_manager;
mod error;
mod file_manager;
mod pool;

pub use buffer_manager::BufferManager;
pub use error::{FileError, FileResult};
pub use file_manager::{FileHandle, PagedFileManager};
pub use pool::{BufferPool, SharedPool, lock_pool};

/// Page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Default number of frames in the buffer pool
pub const BUFFER_POOL_SIZE: usize = 10000;

/// Page ID type
pub type PageId = usize;
