use super::error::{HeapError, HeapResult};
use super::guard::PinnedPage;
use super::header::FileHeader;
use crate::file::{BufferPool, FileError, FileHandle, PageId, SharedPool, lock_pool};
use crate::record::{Page, Record, RecordError, RecordId, RecordResult};

/// An open heap file.
///
/// Holds the header page pinned for its whole lifetime, plus at most one
/// pinned data page (the current page). Closing, or dropping, releases
/// both pins and closes the underlying file.
///
/// The header is never cached: every handle open on the same file shares
/// one header frame, so counts and chain ends are read from it and
/// updated in it on each access.
pub struct HeapFile<B: BufferPool> {
    pool: SharedPool<B>,
    file: FileHandle,
    name: String,
    header_page: PinnedPage<B>,
    current: Option<PinnedPage<B>>,
    /// Cursor; only meaningful while it lies on the current page
    pub(super) current_record: Option<RecordId>,
    closed: bool,
}

impl<B: BufferPool> HeapFile<B> {
    /// Open a heap file, pinning its header page and first data page
    pub fn open(pool: SharedPool<B>, name: &str) -> HeapResult<Self> {
        let file = lock_pool(&pool).open_file(name).map_err(|err| match err {
            FileError::FileNotFound(_) => HeapError::NotFound(name.to_string()),
            other => other.into(),
        })?;

        // any pins taken by a failing pin_pages are released by their guards
        // before the file is closed again
        let (header, header_page, current) = match Self::pin_pages(&pool, file) {
            Ok(pinned) => pinned,
            Err(err) => {
                if let Err(close_err) = lock_pool(&pool).close_file(file) {
                    log::error!("failed to close {name} after a failed open: {close_err}");
                }
                return Err(err);
            }
        };

        log::debug!(
            "opened heap file {name}: {} pages, {} records",
            header.page_count,
            header.record_count
        );

        Ok(Self {
            pool,
            file,
            name: name.to_string(),
            header_page,
            current,
            current_record: None,
            closed: false,
        })
    }

    #[allow(clippy::type_complexity)]
    fn pin_pages(
        pool: &SharedPool<B>,
        file: FileHandle,
    ) -> HeapResult<(FileHeader, PinnedPage<B>, Option<PinnedPage<B>>)> {
        let header_page_id = lock_pool(pool).first_page_id(file)?;
        let header_page = PinnedPage::read(pool, file, header_page_id)?;
        let header = header_page.with_bytes(FileHeader::read_from)??;

        let current = match header.first_page {
            Some(page_id) => Some(PinnedPage::read(pool, file, page_id)?),
            None => None,
        };

        Ok((header, header_page, current))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current contents of the header page
    pub fn header(&self) -> HeapResult<FileHeader> {
        self.header_page.with_bytes(FileHeader::read_from)?
    }

    /// Number of live records, from the header
    pub fn record_count(&self) -> HeapResult<usize> {
        Ok(self.header()?.record_count as usize)
    }

    pub fn page_count(&self) -> HeapResult<usize> {
        Ok(self.header()?.page_count as usize)
    }

    pub fn first_page_id(&self) -> HeapResult<Option<PageId>> {
        Ok(self.header()?.first_page)
    }

    pub fn last_page_id(&self) -> HeapResult<Option<PageId>> {
        Ok(self.header()?.last_page)
    }

    /// Fetch a record by id, making its page the current page
    pub fn get_record(&mut self, rid: RecordId) -> HeapResult<Record> {
        if rid.page_id == self.header_page.page_id() {
            return Err(RecordError::InvalidSlot(rid.page_id, rid.slot_id).into());
        }

        if self.current_page_id() != Some(rid.page_id) {
            self.release_current()?;
            self.pin_current(rid.page_id)?;
        }

        let record = self.with_current_page(|page| page.get_record(rid.slot_id).map(Record::from))?;
        self.current_record = Some(rid);
        Ok(record)
    }

    /// Release both pins and close the file. Failures are logged.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut page) = self.current.take()
            && let Err(err) = page.release()
        {
            log::warn!(
                "{}: failed to unpin data page {}: {err}",
                self.name,
                page.page_id()
            );
        }
        if let Err(err) = self.header_page.release() {
            log::warn!("{}: failed to unpin header page: {err}", self.name);
        }
        if let Err(err) = lock_pool(&self.pool).close_file(self.file) {
            log::error!("{}: failed to close file: {err}", self.name);
        }

        log::debug!("closed heap file {}", self.name);
    }

    pub(super) fn current_page_id(&self) -> Option<PageId> {
        self.current.as_ref().map(PinnedPage::page_id)
    }

    /// Pin `page_id` as the current page. No page may be current.
    pub(super) fn pin_current(&mut self, page_id: PageId) -> HeapResult<()> {
        debug_assert!(self.current.is_none());
        self.current = Some(PinnedPage::read(&self.pool, self.file, page_id)?);
        Ok(())
    }

    /// Unpin the current page, if any, with its dirty flag
    pub(super) fn release_current(&mut self) -> HeapResult<()> {
        if let Some(mut page) = self.current.take() {
            page.release()?;
        }
        Ok(())
    }

    /// Replace the current page with a freshly pinned one
    pub(super) fn set_current(&mut self, page: PinnedPage<B>) -> HeapResult<()> {
        self.release_current()?;
        self.current = Some(page);
        Ok(())
    }

    /// Allocate and pin a new page at the end of the file
    pub(super) fn allocate_page(&self) -> HeapResult<PinnedPage<B>> {
        Ok(PinnedPage::allocate(&self.pool, self.file)?)
    }

    pub(super) fn mark_current_dirty(&mut self) {
        if let Some(page) = self.current.as_mut() {
            page.mark_dirty();
        }
    }

    pub(super) fn with_current_page<R>(
        &self,
        f: impl FnOnce(&Page<&[u8]>) -> RecordResult<R>,
    ) -> HeapResult<R> {
        let current = self.current.as_ref().ok_or(HeapError::NoCurrentRecord)?;
        let result = current.with_bytes(|bytes| Page::from_buffer(bytes).and_then(|page| f(&page)))?;
        Ok(result?)
    }

    /// Run `f` over the current page. The caller decides whether the page
    /// becomes dirty.
    pub(super) fn with_current_page_mut<R>(
        &mut self,
        f: impl FnOnce(&mut Page<&mut [u8]>) -> RecordResult<R>,
    ) -> HeapResult<R> {
        let current = self.current.as_mut().ok_or(HeapError::NoCurrentRecord)?;
        let result = current
            .with_bytes_mut(|bytes| Page::from_buffer(bytes).and_then(|mut page| f(&mut page)))?;
        Ok(result?)
    }

    /// Read, modify and write back the header page under a single pool
    /// lock. Nothing is written when `f` fails.
    pub(super) fn update_header<R>(
        &mut self,
        f: impl FnOnce(&mut FileHeader) -> HeapResult<R>,
    ) -> HeapResult<R> {
        let result = self.header_page.with_bytes_mut(|bytes| {
            let mut header = FileHeader::read_from(bytes)?;
            let result = f(&mut header)?;
            header.write_to(bytes);
            Ok(result)
        })?;
        if result.is_ok() {
            self.header_page.mark_dirty();
        }
        result
    }
}

impl<B: BufferPool> Drop for HeapFile<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{BufferManager, PagedFileManager};
    use crate::heap::create_heap_file;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn setup() -> (TempDir, SharedPool<BufferManager>, String) {
        let temp_dir = tempfile::tempdir().unwrap();
        let name = temp_dir
            .path()
            .join("heap.db")
            .to_str()
            .unwrap()
            .to_string();
        let pool = Arc::new(Mutex::new(BufferManager::new(PagedFileManager::new())));
        create_heap_file(&pool, &name).unwrap();
        (temp_dir, pool, name)
    }

    #[test]
    fn test_open_fresh_file() {
        let (_temp_dir, pool, name) = setup();

        let file = HeapFile::open(Arc::clone(&pool), &name).unwrap();
        assert_eq!(file.name(), name);
        assert_eq!(file.record_count().unwrap(), 0);
        assert_eq!(file.page_count().unwrap(), 1);
        assert_eq!(file.first_page_id().unwrap(), Some(1));
        assert_eq!(file.last_page_id().unwrap(), Some(1));
        assert_eq!(file.current_page_id(), Some(1));
        assert_eq!(lock_pool(&pool).total_pins(), 2);

        file.close();
        assert_eq!(lock_pool(&pool).total_pins(), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let name = temp_dir.path().join("missing.db");
        let pool = Arc::new(Mutex::new(BufferManager::new(PagedFileManager::new())));

        let result = HeapFile::open(Arc::clone(&pool), name.to_str().unwrap());
        assert!(matches!(result, Err(HeapError::NotFound(_))));
    }

    #[test]
    fn test_open_rejects_non_heap_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plain.db");
        let name = path.to_str().unwrap();
        std::fs::write(&path, vec![0u8; crate::file::PAGE_SIZE]).unwrap();

        let pool = Arc::new(Mutex::new(BufferManager::new(PagedFileManager::new())));
        let result = HeapFile::open(Arc::clone(&pool), name);
        assert!(matches!(result, Err(HeapError::CorruptHeader(_))));

        let bm = lock_pool(&pool);
        assert_eq!(bm.total_pins(), 0);
        assert_eq!(bm.file_manager().open_file_count(), 0);
    }

    #[test]
    fn test_get_record_header_page_is_not_a_record() {
        let (_temp_dir, pool, name) = setup();

        let mut file = HeapFile::open(Arc::clone(&pool), &name).unwrap();
        let result = file.get_record(RecordId::new(0, 0));
        assert!(matches!(
            result,
            Err(HeapError::Record(RecordError::InvalidSlot(0, 0)))
        ));
        assert_eq!(lock_pool(&pool).total_pins(), 2);
    }

    #[test]
    fn test_drop_closes_file() {
        let (_temp_dir, pool, name) = setup();

        {
            let _file = HeapFile::open(Arc::clone(&pool), &name).unwrap();
            assert_eq!(lock_pool(&pool).file_manager().open_file_count(), 1);
        }
        let bm = lock_pool(&pool);
        assert_eq!(bm.total_pins(), 0);
        assert_eq!(bm.file_manager().open_file_count(), 0);
    }
}
