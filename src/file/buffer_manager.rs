use lru::LruCache;

use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, PagedFileManager};
use super::pool::BufferPool;
use super::{BUFFER_POOL_SIZE, PAGE_SIZE, PageId};
use crate::config::StorageConfig;

/// A key identifying a page in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    file: FileHandle,
    page_id: PageId,
}

/// Entry in the buffer pool
struct BufferEntry {
    /// The actual page data
    data: Vec<u8>,
    /// Whether this page has been modified since it was read
    dirty: bool,
    /// Outstanding pins; a pinned frame is never chosen for eviction
    pin_count: usize,
}

/// Manages a buffer pool of pinned frames with LRU eviction of unpinned ones
pub struct BufferManager {
    /// Underlying file manager
    file_manager: PagedFileManager,
    /// Frames in recency order. The cache itself is unbounded; capacity is
    /// enforced by `make_room`, which skips pinned frames.
    buffer_pool: LruCache<BufferKey, BufferEntry, ahash::RandomState>,
    /// Maximum number of frames
    max_pool_size: usize,
    /// Reusable buffer for loading pages (recycled from evicted frames)
    load_buffer: Vec<u8>,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self::with_capacity(file_manager, BUFFER_POOL_SIZE)
    }

    /// Create a new buffer manager with specified capacity
    pub fn with_capacity(file_manager: PagedFileManager, capacity: usize) -> Self {
        Self {
            file_manager,
            buffer_pool: LruCache::unbounded_with_hasher(ahash::RandomState::new()),
            max_pool_size: capacity.max(1),
            load_buffer: vec![0u8; PAGE_SIZE],
        }
    }

    /// Build the file manager and buffer pool described by a configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        let file_manager = PagedFileManager::with_max_files(config.max_open_files);
        Self::with_capacity(file_manager, config.buffer_pool_size)
    }

    /// Get a reference to the file manager
    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    /// Get a mutable reference to the file manager
    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    /// Flush all dirty pages to disk, pinned or not
    pub fn flush_all(&mut self) -> FileResult<()> {
        let mut dirty_pages = Vec::new();

        for (key, entry) in self.buffer_pool.iter() {
            if entry.dirty {
                dirty_pages.push(*key);
            }
        }

        for key in dirty_pages {
            // peek_mut keeps the recency order untouched
            if let Some(entry) = self.buffer_pool.peek_mut(&key)
                && entry.dirty
            {
                self.file_manager
                    .write_page(key.file, key.page_id, &entry.data)?;
                entry.dirty = false;
            }
        }

        self.file_manager.sync_all()?;

        Ok(())
    }

    /// Evict unpinned frames until there is room for one more
    fn make_room(&mut self) -> FileResult<()> {
        while self.buffer_pool.len() >= self.max_pool_size {
            let victim = self
                .buffer_pool
                .iter()
                .rev()
                .find(|(_, entry)| entry.pin_count == 0)
                .map(|(key, _)| *key);

            let Some(key) = victim else {
                return Err(FileError::BufferPoolFull);
            };

            if let Some(entry) = self.buffer_pool.peek(&key)
                && entry.dirty
            {
                self.file_manager
                    .write_page(key.file, key.page_id, &entry.data)?;
            }

            if let Some(entry) = self.buffer_pool.pop(&key) {
                self.load_buffer = entry.data;
            }
        }

        Ok(())
    }

    fn pinned_entry(&self, file: FileHandle, page_id: PageId) -> FileResult<&BufferEntry> {
        let entry = self
            .buffer_pool
            .peek(&BufferKey { file, page_id })
            .ok_or(FileError::PageNotFound(page_id))?;
        if entry.pin_count == 0 {
            return Err(FileError::PageNotPinned(page_id));
        }
        Ok(entry)
    }

    fn pinned_entry_mut(
        &mut self,
        file: FileHandle,
        page_id: PageId,
    ) -> FileResult<&mut BufferEntry> {
        let entry = self
            .buffer_pool
            .peek_mut(&BufferKey { file, page_id })
            .ok_or(FileError::PageNotFound(page_id))?;
        if entry.pin_count == 0 {
            return Err(FileError::PageNotPinned(page_id));
        }
        Ok(entry)
    }

    fn pinned_page_of(&self, file: FileHandle) -> Option<PageId> {
        self.buffer_pool
            .iter()
            .find(|(key, entry)| key.file == file && entry.pin_count > 0)
            .map(|(key, _)| key.page_id)
    }

    /// Write the file's dirty frames and drop all of its frames, pinned or
    /// not. Every frame is dropped even after a failed write; the first
    /// error is returned.
    fn write_back_and_drop(&mut self, file: FileHandle) -> FileResult<()> {
        let keys: Vec<BufferKey> = self
            .buffer_pool
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, _)| *key)
            .collect();

        let mut result = Ok(());
        for key in keys {
            if let Some(entry) = self.buffer_pool.pop(&key)
                && entry.dirty
                && let Err(err) = self.file_manager.write_page(key.file, key.page_id, &entry.data)
                && result.is_ok()
            {
                result = Err(err);
            }
        }

        result.and(self.file_manager.sync_file(file))
    }

    /// Get the number of pages currently in the buffer pool
    pub fn buffer_pool_size(&self) -> usize {
        self.buffer_pool.len()
    }

    /// Check if a page is in the buffer pool
    pub fn is_page_cached(&self, file: FileHandle, page_id: PageId) -> bool {
        self.buffer_pool.contains(&BufferKey { file, page_id })
    }

    /// Get the number of dirty pages in the buffer pool
    pub fn dirty_page_count(&self) -> usize {
        self.buffer_pool.iter().filter(|(_, e)| e.dirty).count()
    }

    /// Pin count of a buffered page (0 if not buffered)
    pub fn pin_count(&self, file: FileHandle, page_id: PageId) -> usize {
        self.buffer_pool
            .peek(&BufferKey { file, page_id })
            .map_or(0, |entry| entry.pin_count)
    }

    /// Total pins held across all frames
    pub fn total_pins(&self) -> usize {
        self.buffer_pool.iter().map(|(_, e)| e.pin_count).sum()
    }
}

impl BufferPool for BufferManager {
    fn create_file(&mut self, name: &str) -> FileResult<()> {
        self.file_manager.create_file(name)
    }

    fn open_file(&mut self, name: &str) -> FileResult<FileHandle> {
        self.file_manager.open_file(name)
    }

    fn close_file(&mut self, file: FileHandle) -> FileResult<()> {
        if self.file_manager.open_count(file)? > 1 {
            return self.file_manager.close_file(file);
        }

        // Frames must not outlive the handle, so a leaked pin does not keep
        // the file open. It is reported once the file is closed.
        let leaked = self.pinned_page_of(file);
        if let Some(page_id) = leaked {
            log::warn!("closing file with page {page_id} still pinned");
        }
        let written = self.write_back_and_drop(file);
        self.file_manager.close_file(file)?;
        written?;

        match leaked {
            Some(page_id) => Err(FileError::PagePinned(page_id)),
            None => Ok(()),
        }
    }

    fn destroy_file(&mut self, name: &str) -> FileResult<()> {
        self.file_manager.remove_file(name)
    }

    fn first_page_id(&mut self, file: FileHandle) -> FileResult<PageId> {
        self.file_manager.first_page_id(file)
    }

    fn allocate_page(&mut self, file: FileHandle) -> FileResult<PageId> {
        self.make_room()?;
        let page_id = self.file_manager.allocate_page(file)?;

        let mut data = std::mem::take(&mut self.load_buffer);
        data.clear();
        data.resize(PAGE_SIZE, 0);

        self.buffer_pool.put(
            BufferKey { file, page_id },
            BufferEntry {
                data,
                dirty: false,
                pin_count: 1,
            },
        );
        Ok(page_id)
    }

    fn read_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let key = BufferKey { file, page_id };

        // get_mut promotes the frame to most recently used
        if let Some(entry) = self.buffer_pool.get_mut(&key) {
            entry.pin_count += 1;
            return Ok(());
        }

        self.make_room()?;

        if self.load_buffer.len() != PAGE_SIZE {
            self.load_buffer = vec![0u8; PAGE_SIZE];
        }
        self.file_manager
            .read_page(file, page_id, &mut self.load_buffer)?;

        let data = std::mem::take(&mut self.load_buffer);
        self.buffer_pool.put(
            key,
            BufferEntry {
                data,
                dirty: false,
                pin_count: 1,
            },
        );

        Ok(())
    }

    fn unpin_page(&mut self, file: FileHandle, page_id: PageId, dirty: bool) -> FileResult<()> {
        let entry = self.pinned_entry_mut(file, page_id)?;
        entry.pin_count -= 1;
        entry.dirty |= dirty;
        Ok(())
    }

    fn flush_file(&mut self, file: FileHandle) -> FileResult<()> {
        if let Some(page_id) = self.pinned_page_of(file) {
            return Err(FileError::PagePinned(page_id));
        }
        self.write_back_and_drop(file)
    }

    fn page(&self, file: FileHandle, page_id: PageId) -> FileResult<&[u8]> {
        Ok(&self.pinned_entry(file, page_id)?.data)
    }

    fn page_mut(&mut self, file: FileHandle, page_id: PageId) -> FileResult<&mut [u8]> {
        Ok(&mut self.pinned_entry_mut(file, page_id)?.data)
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        if let Err(err) = self.flush_all() {
            log::error!("failed to flush buffer pool on drop: {err}");
        }
    }
}
