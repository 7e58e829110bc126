use crate::pages::{PageData, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[cfg(test)]
pub fn test_path() -> String {
    use uuid::Uuid;

    let id = Uuid::new_v4();
    std::env::temp_dir()
        .join(format!("marlin_test_{}.db", id))
        .to_str()
        .unwrap()
        .to_string()
}

/// Single-file page store. Page `p` lives at byte offset
/// `p * PAGE_SIZE`; reads past the end of the file come back zeroed so
/// freshly allocated pages need no eager write.
#[derive(Debug)]
pub struct DiskManager {
    file: Mutex<std::fs::File>,
    path: String,
}

impl DiskManager {
    pub fn new(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .context("failed to open the backing file")?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write_page(&self, page_id: PageId, data: &PageData) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(anyhow!("asked to write a page with invalid ID"));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    pub fn read_page(&self, page_id: PageId, data: &mut PageData) -> Result<()> {
        if page_id == INVALID_PAGE_ID {
            return Err(anyhow!("asked to read a page with invalid ID"));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;

        let buf = data.as_bytes_mut();
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                // never written, the rest of the page is zeros
                buf[filled..].fill(0);
                break;
            }
            filled += n;
        }
        Ok(())
    }

    /// Reclaiming file space is not this store's problem; the hook only
    /// exists so the buffer pool can signal that an id went away.
    pub fn deallocate_page(&self, _page_id: PageId) {}
}
