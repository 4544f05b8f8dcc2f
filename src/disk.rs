use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Durable byte storage for the pages of one table.
///
/// Page numbers start at 0 and are dense: `allocate_page` always returns
/// `num_pages()` before the call.
pub trait PageStore: Send {
    fn page_size(&self) -> usize;
    fn read_page(&mut self, page_number: u32, data: &mut [u8]) -> Result<()>;
    fn write_page(&mut self, page_number: u32, data: &[u8]) -> Result<()>;
    fn num_pages(&self) -> Result<u32>;
    fn allocate_page(&mut self) -> Result<u32>;
}

fn check_buffer(page_size: usize, data: &[u8]) -> Result<()> {
    if data.len() != page_size {
        return Err(Error::invalid_state(format!(
            "page buffer is {} bytes, expected {}",
            data.len(),
            page_size
        )));
    }
    Ok(())
}

pub struct DiskManager {
    path: PathBuf,
    data_file: File,
    page_size: usize,
}

impl DiskManager {
    pub fn new(data_file_path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let path = data_file_path.as_ref().to_path_buf();
        if page_size == 0 {
            return Err(Error::invalid_state("page size must be positive"));
        }
        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let size = data_file.metadata()?.len();
        if size % page_size as u64 != 0 {
            return Err(Error::invalid_state(format!(
                "{} is {} bytes, not a multiple of the page size {}",
                path.display(),
                size,
                page_size
            )));
        }
        Ok(Self {
            path,
            data_file,
            page_size,
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    fn offset(&self, page_number: u32) -> u64 {
        page_number as u64 * self.page_size as u64
    }
}

impl PageStore for DiskManager {
    fn page_size(&self) -> usize {
        self.page_size
    }
    fn read_page(&mut self, page_number: u32, data: &mut [u8]) -> Result<()> {
        check_buffer(self.page_size, data)?;
        let offset = self.offset(page_number);
        self.data_file.seek(SeekFrom::Start(offset))?;
        self.data_file.read_exact(data)?;
        Ok(())
    }
    fn write_page(&mut self, page_number: u32, data: &[u8]) -> Result<()> {
        check_buffer(self.page_size, data)?;
        let offset = self.offset(page_number);
        self.data_file.seek(SeekFrom::Start(offset))?;
        self.data_file.write_all(data)?;
        self.data_file.sync_all()?;
        Ok(())
    }
    fn num_pages(&self) -> Result<u32> {
        let size = self.data_file.metadata()?.len();
        Ok((size / self.page_size as u64) as u32)
    }
    fn allocate_page(&mut self) -> Result<u32> {
        let page_number = self.num_pages()?;
        let offset = self.offset(page_number);
        self.data_file.seek(SeekFrom::Start(offset))?;
        self.data_file.write_all(&vec![0; self.page_size])?;
        self.data_file.sync_all()?;
        Ok(page_number)
    }
}

fn unallocated(page_number: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("page {} has not been allocated", page_number),
    )
}

/// Page store that lives entirely in memory. Contents vanish on drop.
pub struct MemoryStore {
    pages: Vec<Box<[u8]>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            page_size,
        }
    }
}

impl PageStore for MemoryStore {
    fn page_size(&self) -> usize {
        self.page_size
    }
    fn read_page(&mut self, page_number: u32, data: &mut [u8]) -> Result<()> {
        check_buffer(self.page_size, data)?;
        let page = self
            .pages
            .get(page_number as usize)
            .ok_or_else(|| unallocated(page_number))?;
        data.copy_from_slice(page);
        Ok(())
    }
    fn write_page(&mut self, page_number: u32, data: &[u8]) -> Result<()> {
        check_buffer(self.page_size, data)?;
        let page = self
            .pages
            .get_mut(page_number as usize)
            .ok_or_else(|| unallocated(page_number))?;
        page.copy_from_slice(data);
        Ok(())
    }
    fn num_pages(&self) -> Result<u32> {
        Ok(self.pages.len() as u32)
    }
    fn allocate_page(&mut self) -> Result<u32> {
        self.pages.push(vec![0; self.page_size].into_boxed_slice());
        Ok(self.pages.len() as u32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PAGE_SIZE;
    use tempfile::tempdir;

    #[test]
    fn test_write_read() -> Result<()> {
        let dir = tempdir()?;
        let data_file_path = dir.path().join("data");
        let mut disk_manager = DiskManager::new(&data_file_path, PAGE_SIZE)?;

        let write_data1 = vec![1; PAGE_SIZE];
        disk_manager.write_page(0, &write_data1)?;
        let write_data2 = vec![2; PAGE_SIZE];
        disk_manager.write_page(1, &write_data2)?;

        let mut read_data1 = vec![0; PAGE_SIZE];
        disk_manager.read_page(0, &mut read_data1)?;
        let mut read_data2 = vec![0; PAGE_SIZE];
        disk_manager.read_page(1, &mut read_data2)?;
        assert_eq!(read_data1, vec![1; PAGE_SIZE]);
        assert_eq!(read_data2, vec![2; PAGE_SIZE]);
        assert_eq!(disk_manager.num_pages()?, 2);

        Ok(())
    }

    #[test]
    fn test_fail_read() -> Result<()> {
        let dir = tempdir()?;
        let data_file_path = dir.path().join("data");
        let mut disk_manager = DiskManager::new(&data_file_path, PAGE_SIZE)?;

        let mut read_data = vec![0; PAGE_SIZE];
        let result = disk_manager.read_page(0, &mut read_data);
        assert!(matches!(result, Err(Error::StorageIO(_))));

        let result = disk_manager.read_page(1, &mut read_data);
        assert!(matches!(result, Err(Error::StorageIO(_))));

        Ok(())
    }

    #[test]
    fn test_wrong_buffer_size() -> Result<()> {
        let dir = tempdir()?;
        let mut disk_manager = DiskManager::new(dir.path().join("data"), PAGE_SIZE)?;
        let result = disk_manager.write_page(0, &[0; 16]);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        Ok(())
    }

    #[test]
    fn test_file_exists() -> Result<()> {
        let dir = tempdir()?;
        let data_file_path = dir.path().join("data");
        let mut disk_manager = DiskManager::new(&data_file_path, PAGE_SIZE)?;

        let write_data = vec![1; PAGE_SIZE];
        disk_manager.write_page(0, &write_data)?;

        let mut disk_manager = DiskManager::new(&data_file_path, PAGE_SIZE)?;
        let mut read_data = vec![0; PAGE_SIZE];
        disk_manager.read_page(0, &mut read_data)?;
        assert_eq!(read_data, vec![1; PAGE_SIZE]);

        Ok(())
    }

    #[test]
    fn test_reject_torn_file() -> Result<()> {
        let dir = tempdir()?;
        let data_file_path = dir.path().join("data");
        std::fs::write(&data_file_path, vec![0u8; PAGE_SIZE + 10])?;
        let result = DiskManager::new(&data_file_path, PAGE_SIZE);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        Ok(())
    }

    #[test]
    fn test_allocate_page() -> Result<()> {
        let dir = tempdir()?;
        let data_file_path = dir.path().join("data");
        let mut disk_manager = DiskManager::new(&data_file_path, PAGE_SIZE)?;

        let page_number1 = disk_manager.allocate_page()?;
        let page_number2 = disk_manager.allocate_page()?;
        assert_eq!(page_number1, 0);
        assert_eq!(page_number2, 1);

        let mut disk_manager = DiskManager::new(&data_file_path, PAGE_SIZE)?;
        let page_number3 = disk_manager.allocate_page()?;
        assert_eq!(page_number3, 2);
        assert_eq!(
            std::fs::metadata(&data_file_path)?.len(),
            3 * PAGE_SIZE as u64
        );

        let mut read_data = vec![1; PAGE_SIZE];
        disk_manager.read_page(2, &mut read_data)?;
        assert_eq!(read_data, vec![0; PAGE_SIZE]);

        Ok(())
    }

    #[test]
    fn test_memory_store() -> Result<()> {
        let mut store = MemoryStore::new(32);
        assert_eq!(store.num_pages()?, 0);
        assert_eq!(store.allocate_page()?, 0);
        store.write_page(0, &[7; 32])?;
        let mut data = vec![0; 32];
        store.read_page(0, &mut data)?;
        assert_eq!(data, vec![7; 32]);
        assert!(matches!(
            store.read_page(1, &mut data),
            Err(Error::StorageIO(_))
        ));
        Ok(())
    }

    #[test]
    fn test_memory_store_rejects_write_past_end() -> Result<()> {
        let mut store = MemoryStore::new(32);
        assert!(matches!(
            store.write_page(0, &[1; 32]),
            Err(Error::StorageIO(_))
        ));
        store.allocate_page()?;
        assert!(matches!(
            store.write_page(3, &[1; 32]),
            Err(Error::StorageIO(_))
        ));
        assert_eq!(store.num_pages()?, 1);
        Ok(())
    }

    #[test]
    fn test_reject_zero_page_size() -> Result<()> {
        let dir = tempdir()?;
        let result = DiskManager::new(dir.path().join("data"), 0);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        Ok(())
    }
}
