pub mod config;
pub mod file;
pub mod heap;
pub mod record;

pub use config::{ConfigError, ConfigResult, StorageConfig};
pub use file::{
    BUFFER_POOL_SIZE, BufferManager, BufferPool, FileError, FileHandle, FileResult, PAGE_SIZE,
    PageId, PagedFileManager, SharedPool,
};
pub use heap::{
    Datatype, HeapError, HeapFile, HeapFileScan, HeapResult, InsertFileScan, Operator,
    create_heap_file, destroy_heap_file,
};
pub use record::{MAX_RECORD_LEN, Page, Record, RecordError, RecordId, RecordResult, SlotId};
