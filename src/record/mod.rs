mod error;
mod page;
mod record;

pub use error::{RecordError, RecordResult};
pub use page::{
    DP_FIXED, MAX_RECORD_LEN, NO_PAGE, Page, PageHeader, decode_page_id, encode_page_id,
};
pub use record::{Record, RecordId, SlotId};
