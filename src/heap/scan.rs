use super::error::{HeapError, HeapResult};
use super::heap_file::HeapFile;
use super::predicate::{Datatype, Operator, ScanPredicate};
use crate::file::{BufferPool, PageId, SharedPool};
use crate::record::{Record, RecordId};

/// Saved scan position
#[derive(Debug, Clone, Copy)]
struct ScanMark {
    page_id: Option<PageId>,
    record: Option<RecordId>,
    exhausted: bool,
}

/// Sequential scan over a heap file, optionally filtered by a
/// single-attribute predicate.
///
/// Records are visited in page-chain order, then slot order. The page
/// holding the record last returned by `scan_next` stays pinned until the
/// scan moves off it.
pub struct HeapFileScan<'a, B: BufferPool> {
    file: HeapFile<B>,
    predicate: Option<ScanPredicate<'a>>,
    marked: Option<ScanMark>,
    exhausted: bool,
}

impl<'a, B: BufferPool> HeapFileScan<'a, B> {
    pub fn open(pool: SharedPool<B>, name: &str) -> HeapResult<Self> {
        Ok(Self {
            file: HeapFile::open(pool, name)?,
            predicate: None,
            marked: None,
            exhausted: false,
        })
    }

    /// Set the scan filter. A `None` literal disables filtering and skips
    /// validation of the other parameters.
    pub fn start_scan(
        &mut self,
        offset: usize,
        length: usize,
        datatype: Datatype,
        literal: Option<&'a [u8]>,
        op: Operator,
    ) -> HeapResult<()> {
        self.predicate = match literal {
            Some(literal) => Some(ScanPredicate::new(offset, length, datatype, literal, op)?),
            None => None,
        };
        Ok(())
    }

    /// Advance to the next matching record. `Ok(None)` marks the end of the
    /// file, and repeats until the scan is reset or ended.
    pub fn scan_next(&mut self) -> HeapResult<Option<RecordId>> {
        if self.exhausted {
            return Ok(None);
        }

        if self.file.current_page_id().is_none() {
            let Some(first) = self.file.first_page_id()? else {
                return Ok(self.finish());
            };
            self.file.pin_current(first)?;
            self.file.current_record = None;
        }

        loop {
            let cursor = self.cursor_on_current_page();
            let candidate = self.file.with_current_page(|page| {
                Ok(match cursor {
                    Some(rid) => page.next_record(rid.slot_id),
                    None => page.first_record(),
                })
            })?;

            match candidate {
                Some(rid) => {
                    self.file.current_record = Some(rid);
                    let matched = match &self.predicate {
                        Some(predicate) => self.file.with_current_page(|page| {
                            Ok(predicate.matches(page.get_record(rid.slot_id)?))
                        })?,
                        None => true,
                    };
                    if matched {
                        return Ok(Some(rid));
                    }
                }
                None => {
                    let next = self.file.with_current_page(|page| Ok(page.next_page()))?;
                    let Some(next) = next else {
                        return Ok(self.finish());
                    };
                    self.file.release_current()?;
                    self.file.pin_current(next)?;
                    self.file.current_record = None;
                }
            }
        }
    }

    fn finish(&mut self) -> Option<RecordId> {
        self.exhausted = true;
        self.file.current_record = None;
        None
    }

    fn cursor_on_current_page(&self) -> Option<RecordId> {
        let page_id = self.file.current_page_id()?;
        self.file
            .current_record
            .filter(|rid| rid.page_id == page_id)
    }

    fn cursor(&self) -> HeapResult<RecordId> {
        if self.exhausted {
            return Err(HeapError::NoCurrentRecord);
        }
        self.cursor_on_current_page()
            .ok_or(HeapError::NoCurrentRecord)
    }

    /// Record at the cursor; the cursor does not move
    pub fn get_record(&self) -> HeapResult<Record> {
        let rid = self.cursor()?;
        self.file
            .with_current_page(|page| page.get_record(rid.slot_id).map(Record::from))
    }

    /// Delete the record at the cursor. The next `scan_next` continues with
    /// the following record.
    ///
    /// A header that counts zero records while one is live is corrupt; the
    /// delete is then refused before the page is touched.
    pub fn delete_record(&mut self) -> HeapResult<()> {
        let rid = self.cursor()?;
        if self.file.record_count()? == 0 {
            log::error!(
                "{}: header counts no records but {rid:?} is live",
                self.file.name()
            );
            return Err(self.negative_count());
        }

        self.file
            .with_current_page_mut(|page| page.delete_record(rid.slot_id))?;
        self.file.mark_current_dirty();

        let corrupt = self.negative_count();
        self.file.update_header(|header| {
            header.record_count = header.record_count.checked_sub(1).ok_or(corrupt)?;
            Ok(())
        })
    }

    fn negative_count(&self) -> HeapError {
        HeapError::CorruptHeader(format!("{}: record count below zero", self.file.name()))
    }

    /// Mutate the record at the cursor in place. Its length cannot change.
    pub fn update_record_in_place(&mut self, f: impl FnOnce(&mut [u8])) -> HeapResult<()> {
        let rid = self.cursor()?;
        self.file.with_current_page_mut(|page| {
            f(page.get_record_mut(rid.slot_id)?);
            Ok(())
        })?;
        self.file.mark_current_dirty();
        Ok(())
    }

    /// Flag the current page as modified
    pub fn mark_dirty(&mut self) {
        self.file.mark_current_dirty();
    }

    pub fn mark_scan(&mut self) {
        self.marked = Some(ScanMark {
            page_id: self.file.current_page_id(),
            record: self.file.current_record,
            exhausted: self.exhausted,
        });
    }

    /// Return to the last mark, or to the beginning if there is none
    pub fn reset_scan(&mut self) -> HeapResult<()> {
        let Some(mark) = self.marked else {
            self.file.release_current()?;
            self.file.current_record = None;
            self.exhausted = false;
            return Ok(());
        };

        if self.file.current_page_id() != mark.page_id {
            self.file.release_current()?;
            if let Some(page_id) = mark.page_id {
                self.file.pin_current(page_id)?;
            }
        }
        self.file.current_record = mark.record;
        self.exhausted = mark.exhausted;
        Ok(())
    }

    /// Drop the scan position and mark. Calling it twice is harmless.
    pub fn end_scan(&mut self) -> HeapResult<()> {
        self.file.release_current()?;
        self.file.current_record = None;
        self.marked = None;
        self.exhausted = false;
        Ok(())
    }

    pub fn record_count(&self) -> HeapResult<usize> {
        self.file.record_count()
    }

    pub fn heap_file(&self) -> &HeapFile<B> {
        &self.file
    }

    /// The underlying handle, for random lookups. A lookup moves the cursor.
    pub fn heap_file_mut(&mut self) -> &mut HeapFile<B> {
        &mut self.file
    }

    pub fn close(self) {
        self.file.close();
    }
}
