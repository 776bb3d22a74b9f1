//! Scope-bound page pins.
//!
//! A `PinnedPage` owns exactly one pin on a buffered page. The pin is
//! returned to the pool either by `release`, which reports unpin failures,
//! or when the guard is dropped, which can only log them.

use std::sync::Arc;

use crate::file::{BufferPool, FileHandle, FileResult, PageId, SharedPool, lock_pool};

pub struct PinnedPage<B: BufferPool> {
    pool: SharedPool<B>,
    file: FileHandle,
    page_id: PageId,
    /// Handed to the pool at unpin time
    dirty: bool,
    released: bool,
}

impl<B: BufferPool> PinnedPage<B> {
    /// Pin an existing page
    pub fn read(pool: &SharedPool<B>, file: FileHandle, page_id: PageId) -> FileResult<Self> {
        lock_pool(pool).read_page(file, page_id)?;
        Ok(Self::pinned(pool, file, page_id))
    }

    /// Extend the file by one page and pin it
    pub fn allocate(pool: &SharedPool<B>, file: FileHandle) -> FileResult<Self> {
        let page_id = lock_pool(pool).allocate_page(file)?;
        Ok(Self::pinned(pool, file, page_id))
    }

    fn pinned(pool: &SharedPool<B>, file: FileHandle, page_id: PageId) -> Self {
        Self {
            pool: Arc::clone(pool),
            file,
            page_id,
            dirty: false,
            released: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Run `f` over the frame's bytes. The pool stays locked for the call,
    /// so `f` must not touch the pool or drop another guard.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> FileResult<R> {
        let pool = lock_pool(&self.pool);
        Ok(f(pool.page(self.file, self.page_id)?))
    }

    /// Mutable counterpart of `with_bytes`. Does not mark the page dirty.
    pub fn with_bytes_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> FileResult<R> {
        let mut pool = lock_pool(&self.pool);
        Ok(f(pool.page_mut(self.file, self.page_id)?))
    }

    /// Return the pin to the pool. Later calls, and the drop, are no-ops
    /// even if this one fails.
    pub fn release(&mut self) -> FileResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        lock_pool(&self.pool).unpin_page(self.file, self.page_id, self.dirty)
    }
}

impl<B: BufferPool> Drop for PinnedPage<B> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("failed to unpin page {} on drop: {err}", self.page_id);
        }
    }
}
