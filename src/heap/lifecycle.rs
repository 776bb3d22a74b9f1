use super::error::{HeapError, HeapResult};
use super::header::FileHeader;
use crate::file::{BufferPool, FileError, SharedPool, lock_pool};
use crate::record::Page;

/// Create an empty heap file: a header page plus one empty data page.
///
/// A failure part-way through is returned as-is and may leave a partially
/// initialized file behind.
pub fn create_heap_file<B: BufferPool>(pool: &SharedPool<B>, name: &str) -> HeapResult<()> {
    let mut pool = lock_pool(pool);

    match pool.open_file(name) {
        Ok(file) => {
            pool.close_file(file)?;
            return Err(HeapError::AlreadyExists(name.to_string()));
        }
        Err(FileError::FileNotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    pool.create_file(name)?;
    let file = pool.open_file(name)?;

    let header_page = pool.allocate_page(file)?;
    let data_page = pool.allocate_page(file)?;

    Page::init(pool.page_mut(file, data_page)?, data_page)?;
    FileHeader::new(name, data_page).write_to(pool.page_mut(file, header_page)?);

    pool.unpin_page(file, data_page, true)?;
    pool.unpin_page(file, header_page, true)?;
    pool.flush_file(file)?;
    pool.close_file(file)?;

    log::debug!("created heap file {name}");
    Ok(())
}

/// Remove a heap file. The file must not be open.
pub fn destroy_heap_file<B: BufferPool>(pool: &SharedPool<B>, name: &str) -> HeapResult<()> {
    lock_pool(pool).destroy_file(name).map_err(|err| match err {
        FileError::FileNotFound(_) => HeapError::NotFound(name.to_string()),
        other => other.into(),
    })?;

    log::debug!("destroyed heap file {name}");
    Ok(())
}
