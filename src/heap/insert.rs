use super::error::{HeapError, HeapResult};
use super::heap_file::HeapFile;
use crate::file::{BufferPool, SharedPool};
use crate::record::{MAX_RECORD_LEN, Page, RecordError, RecordId};

/// Appends records to a heap file.
///
/// Inserts always go to the last page of the chain; when it is full a new
/// page is linked after it. Space freed on earlier pages is not reused.
pub struct InsertFileScan<B: BufferPool> {
    file: HeapFile<B>,
}

impl<B: BufferPool> InsertFileScan<B> {
    pub fn open(pool: SharedPool<B>, name: &str) -> HeapResult<Self> {
        Ok(Self {
            file: HeapFile::open(pool, name)?,
        })
    }

    pub fn insert_record(&mut self, data: &[u8]) -> HeapResult<RecordId> {
        if data.len() > MAX_RECORD_LEN {
            return Err(HeapError::OversizeRecord {
                len: data.len(),
                max: MAX_RECORD_LEN,
            });
        }

        self.position_on_last_page()?;

        let rid = match self
            .file
            .with_current_page_mut(|page| page.insert_record(data))
        {
            Ok(rid) => rid,
            Err(HeapError::Record(RecordError::PageFull(_))) => {
                self.append_page()?;
                self.file
                    .with_current_page_mut(|page| page.insert_record(data))?
            }
            Err(err) => return Err(err),
        };

        self.file.mark_current_dirty();
        self.file.current_record = Some(rid);
        self.file.update_header(|header| {
            header.record_count += 1;
            Ok(())
        })?;
        Ok(rid)
    }

    /// Make the chain's last page current. Another handle may have appended
    /// since the previous insert. A file without data pages gets its first
    /// one here.
    fn position_on_last_page(&mut self) -> HeapResult<()> {
        match self.file.last_page_id()? {
            None => self.append_page(),
            Some(last) if self.file.current_page_id() != Some(last) => {
                self.file.release_current()?;
                self.file.pin_current(last)
            }
            Some(_) => Ok(()),
        }
    }

    /// Link a new empty page after the last page and make it current. The
    /// last page must be current.
    fn append_page(&mut self) -> HeapResult<()> {
        let mut new_page = self.file.allocate_page()?;
        let page_id = new_page.page_id();
        new_page.with_bytes_mut(|bytes| Page::init(bytes, page_id).map(|_| ()))??;
        new_page.mark_dirty();

        if self.file.last_page_id()?.is_some() {
            self.file.with_current_page_mut(|page| {
                page.set_next_page(Some(page_id));
                Ok(())
            })?;
            self.file.mark_current_dirty();
        }

        let page_count = self.file.update_header(|header| {
            if header.first_page.is_none() {
                header.first_page = Some(page_id);
            }
            header.last_page = Some(page_id);
            header.page_count += 1;
            Ok(header.page_count)
        })?;

        self.file.set_current(new_page)?;
        self.file.current_record = None;

        log::debug!(
            "{}: appended page {page_id}, chain is {page_count} pages",
            self.file.name()
        );
        Ok(())
    }

    pub fn record_count(&self) -> HeapResult<usize> {
        self.file.record_count()
    }

    pub fn heap_file(&self) -> &HeapFile<B> {
        &self.file
    }

    pub fn heap_file_mut(&mut self) -> &mut HeapFile<B> {
        &mut self.file
    }

    pub fn close(self) {
        self.file.close();
    }
}
