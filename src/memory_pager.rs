use crate::error::{Error, Result};
use crate::node::Node;
use crate::pager::{PageManager, PagePtr, NIL_PAGE};
use std::collections::HashMap;
use tracing::error;

/// Keeps pages in a map. Meant for testing the tree: any misuse of a
/// handle is reported as an error instead of being tolerated.
#[derive(Debug, Default)]
pub struct MemoryPager {
    pages: HashMap<PagePtr, Node>,
    last: PagePtr,
}

impl MemoryPager {
    pub fn new() -> MemoryPager {
        MemoryPager::default()
    }

    /// Number of live pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl PageManager for MemoryPager {
    fn get(&self, ptr: PagePtr) -> Result<Node> {
        match self.pages.get(&ptr) {
            Some(node) => Ok(node.clone()),
            None => {
                error!(ptr, "get of a page that does not exist");
                Err(Error::BadPointer(ptr))
            }
        }
    }

    fn new(&mut self, node: Node) -> Result<PagePtr> {
        if !node.fits_page() {
            error!(size = node.num_bytes(), "node exceeds the page size");
            return Err(Error::Corruption(format!(
                "node of {} bytes exceeds the page size",
                node.num_bytes()
            )));
        }
        let ptr = self.last + 1;
        if ptr == NIL_PAGE || self.pages.contains_key(&ptr) {
            error!(ptr, "page already exists");
            return Err(Error::Corruption(format!("page {} already exists", ptr)));
        }
        self.pages.insert(ptr, node);
        self.last = ptr;
        Ok(ptr)
    }

    fn del(&mut self, ptr: PagePtr) -> Result<()> {
        match self.pages.remove(&ptr) {
            Some(_) => Ok(()),
            None => {
                error!(ptr, "del of a page that does not exist");
                Err(Error::BadPointer(ptr))
            }
        }
    }
}
