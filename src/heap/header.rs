use super::error::{HeapError, HeapResult};
use crate::file::{PAGE_SIZE, PageId};
use crate::record::{decode_page_id, encode_page_id};

/// Maximum number of file-name bytes kept in the header
pub const MAX_NAME_SIZE: usize = 50;

const MAGIC: [u8; 4] = *b"HEAP";

const NAME_LEN_OFFSET: usize = 4;
const NAME_OFFSET: usize = 5;
const PAGE_COUNT_OFFSET: usize = NAME_OFFSET + MAX_NAME_SIZE + 1;
const RECORD_COUNT_OFFSET: usize = PAGE_COUNT_OFFSET + 4;
const FIRST_PAGE_OFFSET: usize = RECORD_COUNT_OFFSET + 4;
const LAST_PAGE_OFFSET: usize = FIRST_PAGE_OFFSET + 4;
const HEADER_LEN: usize = LAST_PAGE_OFFSET + 4;

/// Per-file metadata kept on the header page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub file_name: String,
    /// Number of data pages in the chain
    pub page_count: u32,
    /// Number of live records
    pub record_count: u32,
    pub first_page: Option<PageId>,
    pub last_page: Option<PageId>,
}

impl FileHeader {
    /// Header of a file whose chain is the single page `page_id`
    pub fn new(file_name: &str, page_id: PageId) -> Self {
        Self {
            file_name: truncate_name(file_name).to_string(),
            page_count: 1,
            record_count: 0,
            first_page: Some(page_id),
            last_page: Some(page_id),
        }
    }

    pub fn read_from(data: &[u8]) -> HeapResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(HeapError::CorruptHeader(format!(
                "header page holds {} bytes",
                data.len()
            )));
        }
        if data[..4] != MAGIC {
            return Err(HeapError::CorruptHeader(
                "missing heap file magic".to_string(),
            ));
        }

        let name_len = data[NAME_LEN_OFFSET] as usize;
        if name_len > MAX_NAME_SIZE {
            return Err(HeapError::CorruptHeader(format!(
                "file name length {name_len}"
            )));
        }
        let file_name = String::from_utf8_lossy(&data[NAME_OFFSET..NAME_OFFSET + name_len])
            .into_owned();

        let header = Self {
            file_name,
            page_count: read_u32(data, PAGE_COUNT_OFFSET),
            record_count: read_u32(data, RECORD_COUNT_OFFSET),
            first_page: decode_page_id(read_u32(data, FIRST_PAGE_OFFSET)),
            last_page: decode_page_id(read_u32(data, LAST_PAGE_OFFSET)),
        };

        if header.first_page.is_some() != header.last_page.is_some() {
            return Err(HeapError::CorruptHeader(
                "first and last page disagree".to_string(),
            ));
        }
        Ok(header)
    }

    pub fn write_to(&self, data: &mut [u8]) {
        debug_assert!(data.len() == PAGE_SIZE);

        let name = truncate_name(&self.file_name).as_bytes();
        data[..HEADER_LEN].fill(0);
        data[..4].copy_from_slice(&MAGIC);
        data[NAME_LEN_OFFSET] = name.len() as u8;
        data[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);
        write_u32(data, PAGE_COUNT_OFFSET, self.page_count);
        write_u32(data, RECORD_COUNT_OFFSET, self.record_count);
        write_u32(data, FIRST_PAGE_OFFSET, encode_page_id(self.first_page));
        write_u32(data, LAST_PAGE_OFFSET, encode_page_id(self.last_page));
    }
}

/// Longest prefix of `name` within MAX_NAME_SIZE bytes, cut on a char boundary
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_SIZE {
        return name;
    }
    let mut end = MAX_NAME_SIZE;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
