//! Heap files: unordered record collections stored as a chain of slotted
//! pages behind a header page.

mod error;
mod guard;
mod header;
mod heap_file;
mod insert;
mod lifecycle;
mod predicate;
mod scan;

pub use error::{HeapError, HeapResult};
pub use guard::PinnedPage;
pub use header::{FileHeader, MAX_NAME_SIZE};
pub use heap_file::HeapFile;
pub use insert::InsertFileScan;
pub use lifecycle::{create_heap_file, destroy_heap_file};
pub use predicate::{Datatype, Operator, ScanPredicate};
pub use scan::HeapFileScan;
