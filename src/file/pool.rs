use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::FileResult;
use super::file_manager::FileHandle;
use super::PageId;

/// Buffer pool shared between the heap-file handles of one process
pub type SharedPool<B> = Arc<Mutex<B>>;

/// Lock a shared pool. A panic while the lock was held does not invalidate
/// pin bookkeeping, so a poisoned lock is recovered rather than propagated.
pub fn lock_pool<B>(pool: &SharedPool<B>) -> MutexGuard<'_, B> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The page-buffering interface the heap layer is written against.
///
/// `allocate_page` and `read_page` pin the page; every pin must be matched
/// by exactly one `unpin_page`, which also reports whether the caller
/// modified the frame. `page`/`page_mut` only give access to pinned frames.
pub trait BufferPool {
    fn create_file(&mut self, name: &str) -> FileResult<()>;

    fn open_file(&mut self, name: &str) -> FileResult<FileHandle>;

    /// Close one reference to a file; the last close flushes its pages.
    fn close_file(&mut self, file: FileHandle) -> FileResult<()>;

    fn destroy_file(&mut self, name: &str) -> FileResult<()>;

    fn first_page_id(&mut self, file: FileHandle) -> FileResult<PageId>;

    fn allocate_page(&mut self, file: FileHandle) -> FileResult<PageId>;

    fn read_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()>;

    fn unpin_page(&mut self, file: FileHandle, page_id: PageId, dirty: bool) -> FileResult<()>;

    /// Write back and drop every buffered page of a file. Fails if any of
    /// them is still pinned.
    fn flush_file(&mut self, file: FileHandle) -> FileResult<()>;

    fn page(&self, file: FileHandle, page_id: PageId) -> FileResult<&[u8]>;

    fn page_mut(&mut self, file: FileHandle, page_id: PageId) -> FileResult<&mut [u8]>;
}
