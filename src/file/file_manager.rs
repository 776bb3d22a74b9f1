use ahash::AHashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageId};

/// Handle to an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

/// Paged access to files on disk.
///
/// Opening a path that is already open hands back the same handle and bumps
/// its open count, so several heap-file handles can share one OS file.
pub struct PagedFileManager {
    open_files: AHashMap<FileHandle, FileEntry>,
    /// Canonical path of every open file
    handles_by_path: AHashMap<PathBuf, FileHandle>,
    next_handle: usize,
    max_open_files: usize,
}

struct FileEntry {
    file: File,
    path: PathBuf,
    open_count: usize,
}

impl FileEntry {
    fn page_count(&self) -> FileResult<usize> {
        let len = self.file.metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64) as usize)
    }

    fn seek_to(&mut self, page_id: PageId) -> FileResult<()> {
        self.file
            .seek(SeekFrom::Start((page_id * PAGE_SIZE) as u64))?;
        Ok(())
    }
}

fn check_page_buffer(len: usize) -> FileResult<()> {
    if len != PAGE_SIZE {
        return Err(FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

impl PagedFileManager {
    pub fn new() -> Self {
        Self::with_max_files(128)
    }

    /// File manager that refuses to hold more than `max_open_files` files
    pub fn with_max_files(max_open_files: usize) -> Self {
        Self {
            open_files: AHashMap::new(),
            handles_by_path: AHashMap::new(),
            next_handle: 0,
            max_open_files,
        }
    }

    fn entry(&self, handle: FileHandle) -> FileResult<&FileEntry> {
        self.open_files
            .get(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    fn entry_mut(&mut self, handle: FileHandle) -> FileResult<&mut FileEntry> {
        self.open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    /// Create a new, empty file. Missing parent directories are created.
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => {
                    FileError::FileAlreadyExists(path.display().to_string())
                }
                _ => FileError::Io(err),
            })?;
        Ok(())
    }

    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let requested = path.as_ref();
        let path = requested
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(requested.display().to_string()))?;

        if let Some(&handle) = self.handles_by_path.get(&path) {
            self.entry_mut(handle)?.open_count += 1;
            return Ok(handle);
        }

        if self.open_files.len() >= self.max_open_files {
            return Err(FileError::TooManyOpenFiles);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let handle = FileHandle(self.next_handle);
        self.next_handle += 1;

        self.handles_by_path.insert(path.clone(), handle);
        self.open_files.insert(
            handle,
            FileEntry {
                file,
                path,
                open_count: 1,
            },
        );
        Ok(handle)
    }

    /// Close one reference to a file. The OS file is released once the last
    /// reference is closed.
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let entry = self.entry_mut(handle)?;
        entry.open_count -= 1;

        if entry.open_count == 0
            && let Some(entry) = self.open_files.remove(&handle)
        {
            self.handles_by_path.remove(&entry.path);
        }
        Ok(())
    }

    /// Delete a file from disk. Files that are still open are refused.
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if self.handle_for(path).is_some() {
            return Err(FileError::FileInUse(path.display().to_string()));
        }

        fs::remove_file(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => FileError::FileNotFound(path.display().to_string()),
            _ => FileError::Io(err),
        })
    }

    /// Handle of an open file, looked up by path
    pub fn handle_for<P: AsRef<Path>>(&self, path: P) -> Option<FileHandle> {
        let canonical = path.as_ref().canonicalize().ok()?;
        self.handles_by_path.get(&canonical).copied()
    }

    /// Number of outstanding opens of a file
    pub fn open_count(&self, handle: FileHandle) -> FileResult<usize> {
        Ok(self.entry(handle)?.open_count)
    }

    /// Extend a file by one zeroed page and return the new page's id
    pub fn allocate_page(&mut self, handle: FileHandle) -> FileResult<PageId> {
        let entry = self.entry_mut(handle)?;
        let page_id = entry.page_count()?;
        entry.file.set_len(((page_id + 1) * PAGE_SIZE) as u64)?;
        Ok(page_id)
    }

    /// Id of the first page of a file
    pub fn first_page_id(&self, handle: FileHandle) -> FileResult<PageId> {
        match self.page_count(handle)? {
            0 => Err(FileError::PageNotFound(0)),
            _ => Ok(0),
        }
    }

    pub fn page_count(&self, handle: FileHandle) -> FileResult<usize> {
        self.entry(handle)?.page_count()
    }

    /// Read an allocated page into `buffer`
    pub fn read_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        check_page_buffer(buffer.len())?;

        let entry = self.entry_mut(handle)?;
        if page_id >= entry.page_count()? {
            return Err(FileError::PageNotFound(page_id));
        }
        entry.seek_to(page_id)?;
        entry.file.read_exact(buffer)?;
        Ok(())
    }

    /// Overwrite an allocated page. Pages are only created by `allocate_page`.
    pub fn write_page(&mut self, handle: FileHandle, page_id: PageId, buffer: &[u8]) -> FileResult<()> {
        check_page_buffer(buffer.len())?;

        let entry = self.entry_mut(handle)?;
        if page_id >= entry.page_count()? {
            return Err(FileError::PageNotFound(page_id));
        }
        entry.seek_to(page_id)?;
        entry.file.write_all(buffer)?;
        Ok(())
    }

    /// Flush a file's data to disk
    pub fn sync_file(&mut self, handle: FileHandle) -> FileResult<()> {
        self.entry_mut(handle)?.file.sync_data()?;
        Ok(())
    }

    pub fn sync_all(&mut self) -> FileResult<()> {
        self.open_files
            .values_mut()
            .try_for_each(|entry| entry.file.sync_data())?;
        Ok(())
    }

    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.open_files.contains_key(&handle)
    }

    /// Number of distinct files currently open
    pub fn open_file_count(&self) -> usize {
        self.open_files.len()
    }
}

impl Default for PagedFileManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_with_file() -> (TempDir, PathBuf, PagedFileManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("pages.db");
        let mut manager = PagedFileManager::new();
        manager.create_file(&path).unwrap();
        (temp_dir, path, manager)
    }

    #[test]
    fn test_create_file_twice() {
        let (_temp_dir, path, mut manager) = manager_with_file();
        assert!(path.exists());

        let result = manager.create_file(&path);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::new();

        let result = manager.open_file(temp_dir.path().join("absent.db"));
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_opens_are_reference_counted() {
        let (_temp_dir, path, mut manager) = manager_with_file();

        let first = manager.open_file(&path).unwrap();
        let second = manager.open_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.open_file_count(), 1);
        assert_eq!(manager.open_count(first).unwrap(), 2);
        assert_eq!(manager.handle_for(&path), Some(first));

        manager.close_file(first).unwrap();
        assert!(manager.is_file_open(first));

        manager.close_file(second).unwrap();
        assert!(!manager.is_file_open(first));
        assert_eq!(manager.handle_for(&path), None);
        assert!(matches!(
            manager.close_file(first),
            Err(FileError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_allocate_then_read_and_write() {
        let (_temp_dir, path, mut manager) = manager_with_file();
        let handle = manager.open_file(&path).unwrap();

        assert!(matches!(
            manager.first_page_id(handle),
            Err(FileError::PageNotFound(0))
        ));
        for expected in 0..3 {
            assert_eq!(manager.allocate_page(handle).unwrap(), expected);
        }
        assert_eq!(manager.page_count(handle).unwrap(), 3);
        assert_eq!(manager.first_page_id(handle).unwrap(), 0);

        let mut page = vec![0xFFu8; PAGE_SIZE];
        manager.read_page(handle, 2, &mut page).unwrap();
        assert!(page.iter().all(|&b| b == 0));

        page[0] = 42;
        page[PAGE_SIZE - 1] = 7;
        manager.write_page(handle, 1, &page).unwrap();

        let mut read_back = vec![0u8; PAGE_SIZE];
        manager.read_page(handle, 1, &mut read_back).unwrap();
        assert_eq!(read_back, page);
    }

    #[test]
    fn test_unallocated_pages_are_refused() {
        let (_temp_dir, path, mut manager) = manager_with_file();
        let handle = manager.open_file(&path).unwrap();
        manager.allocate_page(handle).unwrap();

        let mut page = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            manager.read_page(handle, 7, &mut page),
            Err(FileError::PageNotFound(7))
        ));
        assert!(matches!(
            manager.write_page(handle, 1, &page),
            Err(FileError::PageNotFound(1))
        ));
    }

    #[test]
    fn test_remove_file() {
        let (_temp_dir, path, mut manager) = manager_with_file();
        let handle = manager.open_file(&path).unwrap();

        let result = manager.remove_file(&path);
        assert!(matches!(result, Err(FileError::FileInUse(_))));
        assert!(path.exists());

        manager.close_file(handle).unwrap();
        manager.remove_file(&path).unwrap();
        assert!(!path.exists());
        assert!(matches!(
            manager.remove_file(&path),
            Err(FileError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_wrong_buffer_size() {
        let (_temp_dir, path, mut manager) = manager_with_file();
        let handle = manager.open_file(&path).unwrap();
        manager.allocate_page(handle).unwrap();

        let mut short = vec![0u8; PAGE_SIZE - 1];
        assert!(matches!(
            manager.read_page(handle, 0, &mut short),
            Err(FileError::InvalidPageSize { .. })
        ));
        let long = vec![0u8; PAGE_SIZE + 1];
        assert!(matches!(
            manager.write_page(handle, 0, &long),
            Err(FileError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_open_file_limit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::with_max_files(2);

        let paths: Vec<PathBuf> = (0..3)
            .map(|i| temp_dir.path().join(format!("file{i}.db")))
            .collect();
        for path in &paths {
            manager.create_file(path).unwrap();
        }

        manager.open_file(&paths[0]).unwrap();
        let handle = manager.open_file(&paths[1]).unwrap();
        assert!(matches!(
            manager.open_file(&paths[2]),
            Err(FileError::TooManyOpenFiles)
        ));

        // reopening an open file does not count against the limit
        manager.open_file(&paths[1]).unwrap();
        manager.close_file(handle).unwrap();
        manager.close_file(handle).unwrap();
        manager.open_file(&paths[2]).unwrap();
    }
}
