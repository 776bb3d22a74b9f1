use super::error::{RecordError, RecordResult};
use super::record::{RecordId, SlotId};
use crate::file::{PAGE_SIZE, PageId};

/// On-disk encoding of "no page" in page links
pub const NO_PAGE: u32 = u32::MAX;

pub fn encode_page_id(page_id: Option<PageId>) -> u32 {
    page_id.map_or(NO_PAGE, |id| id as u32)
}

pub fn decode_page_id(raw: u32) -> Option<PageId> {
    (raw != NO_PAGE).then_some(raw as PageId)
}

/// Page header stored at the beginning of each data page
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_id: u32,    // 4 bytes - Id of this page
    pub next_page: u32,  // 4 bytes - Link to next page (NO_PAGE = end of chain)
    pub slot_count: u16, // 2 bytes - Slot directory entries, live or empty
    pub free_ptr: u16,   // 2 bytes - Start of the record area
    pub free_space: u16, // 2 bytes - Free bytes, holes included
    _padding: [u8; 2],   // 2 bytes - Padding to 16 bytes
}

impl PageHeader {
    pub const SIZE: usize = 16;

    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id: page_id as u32,
            next_page: NO_PAGE,
            slot_count: 0,
            free_ptr: PAGE_SIZE as u16,
            free_space: (PAGE_SIZE - Self::SIZE) as u16,
            _padding: [0; 2],
        }
    }

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        result[4..8].copy_from_slice(&self.next_page.to_le_bytes());
        result[8..10].copy_from_slice(&self.slot_count.to_le_bytes());
        result[10..12].copy_from_slice(&self.free_ptr.to_le_bytes());
        result[12..14].copy_from_slice(&self.free_space.to_le_bytes());
        result
    }

    pub fn deserialize(data: &[u8]) -> RecordResult<Self> {
        if data.len() < Self::SIZE {
            return Err(RecordError::Deserialization(format!(
                "Not enough data for page header: {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            page_id: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            next_page: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            slot_count: u16::from_le_bytes([data[8], data[9]]),
            free_ptr: u16::from_le_bytes([data[10], data[11]]),
            free_space: u16::from_le_bytes([data[12], data[13]]),
            _padding: [0; 2],
        })
    }
}

/// Slot directory entry. Offset 0 lies inside the page header, so it marks
/// an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    offset: u16,
    length: u16,
}

impl Slot {
    const SIZE: usize = 4;
    const EMPTY: Slot = Slot {
        offset: 0,
        length: 0,
    };

    fn is_empty(&self) -> bool {
        self.offset == 0
    }
}

/// Fixed per-page overhead: the page header plus one slot entry
pub const DP_FIXED: usize = PageHeader::SIZE + Slot::SIZE;

/// Largest record that fits on an empty page
pub const MAX_RECORD_LEN: usize = PAGE_SIZE - DP_FIXED;

/// Slotted page of variable-length records, operating in place on a page
/// buffer (`&[u8]` for reads, `&mut [u8]` for writes).
///
/// Layout: header, then the slot directory growing up, then free space,
/// then record bytes packed down from the end of the page.
pub struct Page<T> {
    buffer: T,
    header: PageHeader,
}

impl<T: AsRef<[u8]>> Page<T> {
    /// Wrap an existing page buffer
    pub fn from_buffer(buffer: T) -> RecordResult<Self> {
        let data = buffer.as_ref();
        if data.len() != PAGE_SIZE {
            return Err(RecordError::Deserialization(format!(
                "Invalid page size: {} bytes",
                data.len()
            )));
        }

        let header = PageHeader::deserialize(&data[..PageHeader::SIZE])?;

        let directory_end = PageHeader::SIZE + header.slot_count as usize * Slot::SIZE;
        let free_ptr = header.free_ptr as usize;
        if directory_end > free_ptr
            || free_ptr > PAGE_SIZE
            || header.free_space as usize > PAGE_SIZE - directory_end
        {
            return Err(RecordError::Deserialization(format!(
                "Corrupted page header on page {}",
                header.page_id
            )));
        }

        Ok(Self { buffer, header })
    }

    pub fn page_id(&self) -> PageId {
        self.header.page_id as PageId
    }

    /// Next page in the chain, `None` at the end
    pub fn next_page(&self) -> Option<PageId> {
        decode_page_id(self.header.next_page)
    }

    /// Number of slot directory entries, including empty ones
    pub fn slot_count(&self) -> usize {
        self.header.slot_count as usize
    }

    /// Free bytes on the page, including holes left by deletes
    pub fn free_space(&self) -> usize {
        self.header.free_space as usize
    }

    /// Number of live records
    pub fn record_count(&self) -> usize {
        (0..self.slot_count())
            .filter(|&slot_id| !self.slot(slot_id).is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.first_record().is_none()
    }

    fn slot(&self, slot_id: SlotId) -> Slot {
        let base = PageHeader::SIZE + slot_id * Slot::SIZE;
        let data = self.buffer.as_ref();
        Slot {
            offset: u16::from_le_bytes([data[base], data[base + 1]]),
            length: u16::from_le_bytes([data[base + 2], data[base + 3]]),
        }
    }

    fn live_slot(&self, slot_id: SlotId) -> RecordResult<Slot> {
        if slot_id >= self.slot_count() {
            return Err(RecordError::InvalidSlot(self.page_id(), slot_id));
        }
        let slot = self.slot(slot_id);
        if slot.is_empty() {
            return Err(RecordError::InvalidSlot(self.page_id(), slot_id));
        }
        Ok(slot)
    }

    /// Get record data from a slot
    pub fn get_record(&self, slot_id: SlotId) -> RecordResult<&[u8]> {
        let slot = self.live_slot(slot_id)?;
        let start = slot.offset as usize;
        Ok(&self.buffer.as_ref()[start..start + slot.length as usize])
    }

    /// First live record in slot order
    pub fn first_record(&self) -> Option<RecordId> {
        self.live_slot_from(0)
    }

    /// First live record after `slot_id`. `slot_id` itself need not be live,
    /// so iteration may continue from a record that was just deleted.
    pub fn next_record(&self, slot_id: SlotId) -> Option<RecordId> {
        self.live_slot_from(slot_id + 1)
    }

    fn live_slot_from(&self, start: SlotId) -> Option<RecordId> {
        (start..self.slot_count())
            .find(|&slot_id| !self.slot(slot_id).is_empty())
            .map(|slot_id| RecordId::new(self.page_id(), slot_id))
    }

    fn contiguous_free(&self) -> usize {
        self.header.free_ptr as usize - (PageHeader::SIZE + self.slot_count() * Slot::SIZE)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Page<T> {
    /// Format the buffer as an empty page with no successor
    pub fn init(mut buffer: T, page_id: PageId) -> RecordResult<Self> {
        let data = buffer.as_mut();
        if data.len() != PAGE_SIZE {
            return Err(RecordError::Deserialization(format!(
                "Buffer must be PAGE_SIZE ({}) bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        data.fill(0);
        let header = PageHeader::new(page_id);
        data[..PageHeader::SIZE].copy_from_slice(&header.serialize());

        Ok(Self { buffer, header })
    }

    fn sync_header(&mut self) {
        let header = self.header.serialize();
        self.buffer.as_mut()[..PageHeader::SIZE].copy_from_slice(&header);
    }

    fn write_slot(&mut self, slot_id: SlotId, slot: Slot) {
        let base = PageHeader::SIZE + slot_id * Slot::SIZE;
        let data = self.buffer.as_mut();
        data[base..base + 2].copy_from_slice(&slot.offset.to_le_bytes());
        data[base + 2..base + 4].copy_from_slice(&slot.length.to_le_bytes());
    }

    /// Set the next page ID
    pub fn set_next_page(&mut self, next_page: Option<PageId>) {
        self.header.next_page = encode_page_id(next_page);
        self.sync_header();
    }

    /// Insert a record, reusing an empty slot if there is one
    pub fn insert_record(&mut self, data: &[u8]) -> RecordResult<RecordId> {
        if data.len() > MAX_RECORD_LEN {
            return Err(RecordError::InvalidRecord(format!(
                "Record of {} bytes can never fit on a page",
                data.len()
            )));
        }

        let reusable = (0..self.slot_count()).find(|&slot_id| self.slot(slot_id).is_empty());
        let needed = data.len() + if reusable.is_some() { 0 } else { Slot::SIZE };
        if needed > self.free_space() {
            return Err(RecordError::PageFull(self.page_id()));
        }
        if needed > self.contiguous_free() {
            self.compact();
        }

        let slot_id = match reusable {
            Some(slot_id) => slot_id,
            None => {
                self.header.slot_count += 1;
                self.slot_count() - 1
            }
        };

        let offset = self.header.free_ptr as usize - data.len();
        self.buffer.as_mut()[offset..offset + data.len()].copy_from_slice(data);
        self.write_slot(
            slot_id,
            Slot {
                offset: offset as u16,
                length: data.len() as u16,
            },
        );

        self.header.free_ptr = offset as u16;
        self.header.free_space -= needed as u16;
        self.sync_header();

        Ok(RecordId::new(self.page_id(), slot_id))
    }

    /// Delete the record in a slot. Trailing empty slots are trimmed from the
    /// directory; record bytes are reclaimed by the next compaction.
    pub fn delete_record(&mut self, slot_id: SlotId) -> RecordResult<()> {
        let slot = self.live_slot(slot_id)?;
        self.write_slot(slot_id, Slot::EMPTY);
        self.header.free_space += slot.length;

        while self.header.slot_count > 0 && self.slot(self.slot_count() - 1).is_empty() {
            self.header.slot_count -= 1;
            self.header.free_space += Slot::SIZE as u16;
        }
        if self.header.slot_count == 0 {
            self.header.free_ptr = PAGE_SIZE as u16;
        }

        self.sync_header();
        Ok(())
    }

    /// Mutable view of a record's bytes, for same-length updates in place
    pub fn get_record_mut(&mut self, slot_id: SlotId) -> RecordResult<&mut [u8]> {
        let slot = self.live_slot(slot_id)?;
        let start = slot.offset as usize;
        Ok(&mut self.buffer.as_mut()[start..start + slot.length as usize])
    }

    /// Pack live records against the end of the page, closing holes
    fn compact(&mut self) {
        let mut live: Vec<(SlotId, Slot)> = (0..self.slot_count())
            .map(|slot_id| (slot_id, self.slot(slot_id)))
            .filter(|(_, slot)| !slot.is_empty())
            .collect();

        let mut scratch = vec![0u8; PAGE_SIZE];
        let mut free_ptr = PAGE_SIZE;
        {
            let data = self.buffer.as_ref();
            for (_, slot) in live.iter_mut() {
                let start = slot.offset as usize;
                let len = slot.length as usize;
                free_ptr -= len;
                scratch[free_ptr..free_ptr + len].copy_from_slice(&data[start..start + len]);
                slot.offset = free_ptr as u16;
            }
        }

        self.buffer.as_mut()[free_ptr..].copy_from_slice(&scratch[free_ptr..]);
        for (slot_id, slot) in live {
            self.write_slot(slot_id, slot);
        }

        self.header.free_ptr = free_ptr as u16;
        self.sync_header();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_page(buffer: &mut [u8], page_id: PageId) -> Page<&mut [u8]> {
        Page::init(buffer, page_id).unwrap()
    }

    #[test]
    fn test_page_creation() {
        let mut buffer = vec![0xAAu8; PAGE_SIZE];
        let page = new_page(&mut buffer, 7);
        assert_eq!(page.page_id(), 7);
        assert_eq!(page.next_page(), None);
        assert_eq!(page.slot_count(), 0);
        assert_eq!(page.free_space(), PAGE_SIZE - PageHeader::SIZE);
        assert!(page.is_empty());
        assert_eq!(page.first_record(), None);
    }

    #[test]
    fn test_insert_and_get() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 3);

        let a = page.insert_record(b"hello").unwrap();
        let b = page.insert_record(b"world!!!").unwrap();
        let c = page.insert_record(b"").unwrap();

        assert_eq!(a, RecordId::new(3, 0));
        assert_eq!(b, RecordId::new(3, 1));
        assert_eq!(c, RecordId::new(3, 2));
        assert_eq!(page.get_record(0).unwrap(), b"hello");
        assert_eq!(page.get_record(1).unwrap(), b"world!!!");
        assert_eq!(page.get_record(2).unwrap(), b"");
        assert_eq!(page.record_count(), 3);
        assert_eq!(
            page.free_space(),
            PAGE_SIZE - PageHeader::SIZE - 3 * Slot::SIZE - 13
        );
    }

    #[test]
    fn test_delete_and_slot_reuse() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 1);

        page.insert_record(b"first").unwrap();
        page.insert_record(b"second").unwrap();
        page.insert_record(b"third").unwrap();

        page.delete_record(1).unwrap();
        assert!(matches!(
            page.get_record(1),
            Err(RecordError::InvalidSlot(1, 1))
        ));
        assert!(matches!(
            page.delete_record(1),
            Err(RecordError::InvalidSlot(1, 1))
        ));
        assert_eq!(page.slot_count(), 3);

        let rid = page.insert_record(b"again").unwrap();
        assert_eq!(rid.slot_id, 1);
        assert_eq!(page.get_record(1).unwrap(), b"again");
        assert_eq!(page.get_record(0).unwrap(), b"first");
        assert_eq!(page.get_record(2).unwrap(), b"third");
    }

    #[test]
    fn test_trailing_slots_trimmed() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 1);

        page.insert_record(b"a").unwrap();
        page.insert_record(b"b").unwrap();
        page.insert_record(b"c").unwrap();

        page.delete_record(1).unwrap();
        page.delete_record(2).unwrap();
        assert_eq!(page.slot_count(), 1);

        page.delete_record(0).unwrap();
        assert_eq!(page.slot_count(), 0);
        assert_eq!(page.free_space(), PAGE_SIZE - PageHeader::SIZE);
        assert!(page.is_empty());
    }

    #[test]
    fn test_record_iteration_skips_holes() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 2);

        for i in 0..5u8 {
            page.insert_record(&[i; 8]).unwrap();
        }
        page.delete_record(0).unwrap();
        page.delete_record(2).unwrap();

        let first = page.first_record().unwrap();
        assert_eq!(first.slot_id, 1);
        let second = page.next_record(first.slot_id).unwrap();
        assert_eq!(second.slot_id, 3);
        // continuing from a deleted slot still works
        assert_eq!(page.next_record(2).unwrap().slot_id, 3);
        let third = page.next_record(second.slot_id).unwrap();
        assert_eq!(third.slot_id, 4);
        assert_eq!(page.next_record(third.slot_id), None);
        assert_eq!(page.next_record(100), None);
    }

    #[test]
    fn test_page_full() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 9);

        let record = vec![1u8; 1000];
        let mut inserted = 0;
        while page.insert_record(&record).is_ok() {
            inserted += 1;
        }
        assert_eq!(inserted, (PAGE_SIZE - PageHeader::SIZE) / (1000 + Slot::SIZE));
        assert!(matches!(
            page.insert_record(&record),
            Err(RecordError::PageFull(9))
        ));
        // a small record still fits in the remainder
        assert!(page.insert_record(&[0u8; 16]).is_ok());
    }

    #[test]
    fn test_max_record_fits_empty_page() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 1);

        let record = vec![7u8; MAX_RECORD_LEN];
        let rid = page.insert_record(&record).unwrap();
        assert_eq!(page.get_record(rid.slot_id).unwrap(), &record[..]);
        assert_eq!(page.free_space(), 0);
        assert!(matches!(
            page.insert_record(b""),
            Err(RecordError::PageFull(1))
        ));

        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 1);
        let too_big = vec![7u8; MAX_RECORD_LEN + 1];
        assert!(matches!(
            page.insert_record(&too_big),
            Err(RecordError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_compaction_reclaims_holes() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 4);

        let mut rids = Vec::new();
        for i in 0..8u8 {
            rids.push(page.insert_record(&vec![i; 1000]).unwrap());
        }
        page.delete_record(rids[2].slot_id).unwrap();
        page.delete_record(rids[5].slot_id).unwrap();

        // needs both holes, so the page has to compact
        let big = vec![0xEEu8; 1900];
        let rid = page.insert_record(&big).unwrap();
        assert_eq!(page.get_record(rid.slot_id).unwrap(), &big[..]);

        for (i, rid) in rids.iter().enumerate() {
            if i == 2 || i == 5 {
                continue;
            }
            assert_eq!(page.get_record(rid.slot_id).unwrap(), &vec![i as u8; 1000][..]);
        }
    }

    #[test]
    fn test_next_page_link() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 1);

        page.set_next_page(Some(42));
        assert_eq!(page.next_page(), Some(42));
        page.set_next_page(None);
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn test_from_buffer_round_trip() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        {
            let mut page = new_page(&mut buffer, 5);
            page.insert_record(b"persisted").unwrap();
            page.set_next_page(Some(6));
        }

        let page = Page::from_buffer(&buffer[..]).unwrap();
        assert_eq!(page.page_id(), 5);
        assert_eq!(page.next_page(), Some(6));
        assert_eq!(page.get_record(0).unwrap(), b"persisted");
    }

    #[test]
    fn test_get_record_mut_updates_in_place() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = new_page(&mut buffer, 1);

        let rid = page.insert_record(b"abcd").unwrap();
        page.get_record_mut(rid.slot_id).unwrap()[0] = b'z';
        assert_eq!(page.get_record(rid.slot_id).unwrap(), b"zbcd");
    }

    #[test]
    fn test_from_buffer_rejects_bad_input() {
        let short = vec![0u8; PAGE_SIZE - 1];
        assert!(Page::from_buffer(&short[..]).is_err());

        let mut buffer = vec![0u8; PAGE_SIZE];
        new_page(&mut buffer, 1);
        // slot count running past the free pointer
        buffer[8..10].copy_from_slice(&u16::MAX.to_le_bytes());
        assert!(matches!(
            Page::from_buffer(&buffer[..]),
            Err(RecordError::Deserialization(_))
        ));
    }
}
