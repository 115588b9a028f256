//! Byte layout of a B-tree node.
//!
//! A node includes:
//! 1. A fixed-size header holding the node type and the number of keys.
//! 2. `nkeys` child pointers (zero in leaves).
//! 3. `nkeys` offsets; offset `i` is where entry `i + 1` starts, counted
//!    from the beginning of the entry region. Entry 0 starts at zero.
//! 4. The entries themselves.
//!
//! | type | nkeys |  pointers  |  offsets   | entries | unused |
//! |  2B  |   2B  | nkeys * 8B | nkeys * 2B |   ...   |        |
//!
//! with each entry laid out as
//!
//! | klen | vlen | key | val |
//! |  2B  |  2B  | ... | ... |

use crate::error::{Error, Result};
use crate::key_value_pair::KeyValuePair;
use crate::node_type::NodeType;
use crate::page::{read_bytes, read_u16, read_u64, write_u16, write_u64};
use crate::page_layout::{
    tables_size, ENTRY_HEADER_SIZE, HEADER_SIZE, KEY_LEN_SIZE, NODE_TYPE_OFFSET, NUM_KEYS_OFFSET,
    OFFSET_SIZE, PAGE_SIZE, PTR_SIZE,
};
use crate::pager::PagePtr;
use std::cmp::Ordering;
use std::fmt;

/// An owned node buffer. The buffer is exactly as long as the encoded node,
/// which may exceed a page while an insert is in flight.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    data: Vec<u8>,
}

impl Node {
    /// A node with a header and zeroed pointer/offset tables but no entries.
    pub(crate) fn with_header(node_type: NodeType, nkeys: u16) -> Node {
        let mut data = vec![0u8; HEADER_SIZE + tables_size(nkeys as usize)];
        data[NODE_TYPE_OFFSET..NODE_TYPE_OFFSET + 2]
            .copy_from_slice(&u16::from(node_type).to_le_bytes());
        data[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + 2].copy_from_slice(&nkeys.to_le_bytes());
        Node { data }
    }

    /// Decodes a node from untrusted bytes, usually a full page.
    ///
    /// Every offset and entry is checked against the buffer, so a damaged
    /// page yields `Error::Corruption` instead of an out of range read.
    pub fn from_page(bytes: &[u8]) -> Result<Node> {
        let node_type = NodeType::try_from(read_u16(bytes, NODE_TYPE_OFFSET)?)?;
        let nkeys = read_u16(bytes, NUM_KEYS_OFFSET)? as usize;
        let kv_start = HEADER_SIZE + tables_size(nkeys);
        if kv_start > bytes.len() {
            return Err(Error::Corruption(format!(
                "{:?} node with {} keys does not fit {} bytes",
                node_type,
                nkeys,
                bytes.len()
            )));
        }

        let offsets_start = HEADER_SIZE + nkeys * PTR_SIZE;
        let mut entry_start = 0usize;
        for i in 0..nkeys {
            let entry_end = read_u16(bytes, offsets_start + i * OFFSET_SIZE)? as usize;
            let pos = kv_start + entry_start;
            let klen = read_u16(bytes, pos)? as usize;
            let vlen = read_u16(bytes, pos + KEY_LEN_SIZE)? as usize;
            if entry_start + ENTRY_HEADER_SIZE + klen + vlen != entry_end {
                return Err(Error::Corruption(format!(
                    "entry {} spans {}..{} but the offset table says it ends at {}",
                    i,
                    entry_start,
                    entry_start + ENTRY_HEADER_SIZE + klen + vlen,
                    entry_end
                )));
            }
            entry_start = entry_end;
        }

        let num_bytes = kv_start + entry_start;
        let data = read_bytes(bytes, 0, num_bytes)
            .map_err(|_| Error::Corruption(format!("node of {} bytes is truncated", num_bytes)))?;
        Ok(Node {
            data: data.to_vec(),
        })
    }

    pub fn node_type(&self) -> Result<NodeType> {
        NodeType::try_from(read_u16(&self.data, NODE_TYPE_OFFSET)?)
    }

    pub fn num_keys(&self) -> u16 {
        u16::from_le_bytes([self.data[NUM_KEYS_OFFSET], self.data[NUM_KEYS_OFFSET + 1]])
    }

    /// Encoded size in bytes.
    pub fn num_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn fits_page(&self) -> bool {
        self.num_bytes() <= PAGE_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn check_index(&self, idx: u16) -> Result<()> {
        if idx >= self.num_keys() {
            return Err(Error::OutOfRange {
                index: idx as usize,
                num_keys: self.num_keys(),
            });
        }
        Ok(())
    }

    // pointers
    pub fn get_ptr(&self, idx: u16) -> Result<PagePtr> {
        self.check_index(idx)?;
        read_u64(&self.data, HEADER_SIZE + PTR_SIZE * idx as usize)
    }

    pub(crate) fn set_ptr(&mut self, idx: u16, ptr: PagePtr) -> Result<()> {
        self.check_index(idx)?;
        write_u64(&mut self.data, HEADER_SIZE + PTR_SIZE * idx as usize, ptr)
    }

    // offset list, valid for 1..=nkeys
    fn offset_pos(&self, idx: u16) -> Result<usize> {
        if idx == 0 || idx > self.num_keys() {
            return Err(Error::OutOfRange {
                index: idx as usize,
                num_keys: self.num_keys(),
            });
        }
        let nkeys = self.num_keys() as usize;
        Ok(HEADER_SIZE + PTR_SIZE * nkeys + OFFSET_SIZE * (idx as usize - 1))
    }

    pub(crate) fn get_offset(&self, idx: u16) -> Result<u16> {
        if idx == 0 {
            return Ok(0);
        }
        read_u16(&self.data, self.offset_pos(idx)?)
    }

    pub(crate) fn set_offset(&mut self, idx: u16, offset: u16) -> Result<()> {
        if idx == 0 {
            return Ok(());
        }
        let pos = self.offset_pos(idx)?;
        write_u16(&mut self.data, pos, offset)
    }

    // key-values
    pub(crate) fn kv_pos(&self, idx: u16) -> Result<usize> {
        if idx > self.num_keys() {
            return Err(Error::OutOfRange {
                index: idx as usize,
                num_keys: self.num_keys(),
            });
        }
        Ok(HEADER_SIZE + tables_size(self.num_keys() as usize) + self.get_offset(idx)? as usize)
    }

    pub fn get_key(&self, idx: u16) -> Result<&[u8]> {
        self.check_index(idx)?;
        let pos = self.kv_pos(idx)?;
        let klen = read_u16(&self.data, pos)? as usize;
        read_bytes(&self.data, pos + ENTRY_HEADER_SIZE, klen)
    }

    pub fn get_val(&self, idx: u16) -> Result<&[u8]> {
        self.check_index(idx)?;
        let pos = self.kv_pos(idx)?;
        let klen = read_u16(&self.data, pos)? as usize;
        let vlen = read_u16(&self.data, pos + KEY_LEN_SIZE)? as usize;
        read_bytes(&self.data, pos + ENTRY_HEADER_SIZE + klen, vlen)
    }

    /// Writes the entry `idx`, growing the buffer as needed. The offset of
    /// `idx` must already be in place.
    pub(crate) fn write_entry(&mut self, idx: u16, key: &[u8], val: &[u8]) -> Result<usize> {
        let pos = self.kv_pos(idx)?;
        let len = ENTRY_HEADER_SIZE + key.len() + val.len();
        if self.data.len() < pos + len {
            self.data.resize(pos + len, 0);
        }
        write_u16(&mut self.data, pos, key.len() as u16)?;
        write_u16(&mut self.data, pos + KEY_LEN_SIZE, val.len() as u16)?;
        let key_start = pos + ENTRY_HEADER_SIZE;
        self.data[key_start..key_start + key.len()].copy_from_slice(key);
        self.data[key_start + key.len()..pos + len].copy_from_slice(val);
        Ok(len)
    }

    /// Returns the largest index whose key is less than or equal to `key`.
    ///
    /// The first key is a copy from the parent node (or the empty sentinel),
    /// thus it's always less than or equal to the key.
    pub fn lookup_le(&self, key: &[u8]) -> Result<u16> {
        let mut found = 0;
        for i in 1..self.num_keys() {
            match self.get_key(i)?.cmp(key) {
                Ordering::Less => found = i,
                Ordering::Equal => return Ok(i),
                Ordering::Greater => break,
            }
        }
        Ok(found)
    }

    /// All entries in key order.
    pub fn pairs(&self) -> Result<Vec<KeyValuePair>> {
        (0..self.num_keys())
            .map(|i| Ok(KeyValuePair::new(self.get_key(i)?, self.get_val(i)?)))
            .collect()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_type", &self.node_type().ok())
            .field("num_keys", &self.num_keys())
            .field("num_bytes", &self.num_bytes())
            .finish()
    }
}
