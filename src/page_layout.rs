/// A single page size.
/// Each page represents a node in the BTree.
pub const PAGE_SIZE: usize = 4096;

/// Node header layout (four bytes in total):
/// | type | nkeys |
/// |  2B  |  2B   |
pub const NODE_TYPE_OFFSET: usize = 0;
pub const NODE_TYPE_SIZE: usize = 2;
pub const NUM_KEYS_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
pub const NUM_KEYS_SIZE: usize = 2;
pub const HEADER_SIZE: usize = NODE_TYPE_SIZE + NUM_KEYS_SIZE;

/// Every node carries `nkeys` child pointers followed by `nkeys` offsets.
/// Leaves keep the pointer slots zeroed.
pub const PTR_SIZE: usize = 8;
pub const OFFSET_SIZE: usize = 2;

/// Entry layout:
/// | klen | vlen | key | val |
/// |  2B  |  2B  | ... | ... |
pub const KEY_LEN_SIZE: usize = 2;
pub const VAL_LEN_SIZE: usize = 2;
pub const ENTRY_HEADER_SIZE: usize = KEY_LEN_SIZE + VAL_LEN_SIZE;

/// Key, Value sizes.
pub const MAX_KEY_SIZE: usize = 1000;
pub const MAX_VAL_SIZE: usize = 3000;

// A node holding a single maximal entry has to fit a page.
const _: () = assert!(
    HEADER_SIZE + PTR_SIZE + OFFSET_SIZE + ENTRY_HEADER_SIZE + MAX_KEY_SIZE + MAX_VAL_SIZE
        <= PAGE_SIZE
);

/// Meta page layout (32 bytes at file offset zero):
/// | signature | root | page_count |
/// |    16B    |  8B  |     8B     |
pub const META_SIGNATURE: &[u8; META_SIGNATURE_SIZE] = b"CowBTreeMeta0001";
pub const META_SIGNATURE_SIZE: usize = 16;
pub const META_ROOT_OFFSET: usize = META_SIGNATURE_SIZE;
pub const META_PAGE_COUNT_OFFSET: usize = META_ROOT_OFFSET + PTR_SIZE;
pub const META_SIZE: usize = META_PAGE_COUNT_OFFSET + PTR_SIZE;

/// Size in bytes of the pointer and offset tables of a node with `nkeys` keys.
pub const fn tables_size(nkeys: usize) -> usize {
    nkeys * (PTR_SIZE + OFFSET_SIZE)
}
