use crate::error::{Error, Result};
use crate::page::{read_bytes, read_u64};
use crate::page_layout::{
    META_PAGE_COUNT_OFFSET, META_ROOT_OFFSET, META_SIGNATURE, META_SIGNATURE_SIZE, META_SIZE,
};
use crate::pager::PagePtr;

/// The record at the start of the file naming the current tree version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub root: PagePtr,
    /// Pages in use, the meta page included.
    pub page_count: u64,
}

impl Meta {
    pub fn encode(&self) -> [u8; META_SIZE] {
        let mut data = [0u8; META_SIZE];
        data[..META_SIGNATURE_SIZE].copy_from_slice(META_SIGNATURE);
        data[META_ROOT_OFFSET..META_PAGE_COUNT_OFFSET].copy_from_slice(&self.root.to_le_bytes());
        data[META_PAGE_COUNT_OFFSET..].copy_from_slice(&self.page_count.to_le_bytes());
        data
    }

    pub fn decode(bytes: &[u8]) -> Result<Meta> {
        let signature = read_bytes(bytes, 0, META_SIGNATURE_SIZE)?;
        if signature != META_SIGNATURE {
            return Err(Error::Corruption(format!(
                "bad signature {:?}",
                String::from_utf8_lossy(signature)
            )));
        }
        Ok(Meta {
            root: read_u64(bytes, META_ROOT_OFFSET)?,
            page_count: read_u64(bytes, META_PAGE_COUNT_OFFSET)?,
        })
    }

    /// Checks the record against a file of `file_pages` whole pages.
    pub fn validate(&self, file_pages: u64) -> Result<()> {
        if self.page_count == 0 || self.page_count > file_pages {
            return Err(Error::Corruption(format!(
                "meta page claims {} pages, the file holds {}",
                self.page_count, file_pages
            )));
        }
        if self.root >= self.page_count {
            return Err(Error::Corruption(format!(
                "root {} is outside of the {} used pages",
                self.root, self.page_count
            )));
        }
        Ok(())
    }
}
