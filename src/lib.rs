//! A copy-on-write B+Tree stored in fixed size pages.
//!
//! `BTree` holds the algorithms and works over any `PageManager`:
//! `MemoryPager` keeps pages in a map, `DiskPager` reads them from an
//! mmapped file. `Kv` ties a `BTree` to a `DiskPager` and makes every
//! update durable with an ordered write of pages and meta page.

pub mod btree;
pub mod config;
pub mod disk_pager;
pub mod error;
pub mod key_value_pair;
pub mod kv;
pub mod memory_pager;
pub mod meta;
pub mod node;
pub mod node_builder;
pub mod node_type;
pub mod page;
pub mod page_layout;
pub mod pager;

pub use btree::BTree;
pub use config::Options;
pub use disk_pager::DiskPager;
pub use error::{Error, Result};
pub use key_value_pair::KeyValuePair;
pub use kv::Kv;
pub use memory_pager::MemoryPager;
pub use node::Node;
pub use node_type::NodeType;
pub use pager::{PageManager, PagePtr, NIL_PAGE};

/// The interface shared by the tree structures of this crate's family
/// (Merkle trees and the like): insert a keyed value, read back a digest
/// of the root.
pub trait Tree {
    fn insert(&mut self, key: u64, value: &str) -> Result<()>;

    /// Bytes identifying the current root, empty for an empty tree.
    fn get_root(&self) -> Result<Vec<u8>>;
}
