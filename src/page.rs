use crate::error::{Error, Result};
use crate::node::Node;
use crate::page_layout::PAGE_SIZE;
use byteorder::{ByteOrder, LittleEndian};

/// Page is a wrapper for a single page of memory,
/// the unit the disk pager stages and writes.
#[derive(Clone)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Pads `node` to a full page. Fails if the node does not fit.
    pub fn from_node(node: &Node) -> Result<Page> {
        let bytes = node.as_bytes();
        if bytes.len() > PAGE_SIZE {
            return Err(Error::Corruption(format!(
                "node of {} bytes does not fit a page",
                bytes.len()
            )));
        }
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Page { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn to_node(&self) -> Result<Node> {
        Node::from_page(self.as_bytes())
    }
}

// Bounds-checked little endian helpers. Reading past the end of `buf`
// yields `Error::Truncated` instead of a panic.

fn slice(buf: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    buf.get(pos..pos + len).ok_or(Error::Truncated {
        needed: pos + len,
        available: buf.len(),
    })
}

fn slice_mut(buf: &mut [u8], pos: usize, len: usize) -> Result<&mut [u8]> {
    let available = buf.len();
    buf.get_mut(pos..pos + len).ok_or(Error::Truncated {
        needed: pos + len,
        available,
    })
}

pub(crate) fn read_bytes(buf: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    slice(buf, pos, len)
}

pub(crate) fn read_u16(buf: &[u8], pos: usize) -> Result<u16> {
    Ok(LittleEndian::read_u16(slice(buf, pos, 2)?))
}

pub(crate) fn read_u64(buf: &[u8], pos: usize) -> Result<u64> {
    Ok(LittleEndian::read_u64(slice(buf, pos, 8)?))
}

pub(crate) fn write_u16(buf: &mut [u8], pos: usize, value: u16) -> Result<()> {
    LittleEndian::write_u16(slice_mut(buf, pos, 2)?, value);
    Ok(())
}

pub(crate) fn write_u64(buf: &mut [u8], pos: usize, value: u64) -> Result<()> {
    LittleEndian::write_u64(slice_mut(buf, pos, 8)?, value);
    Ok(())
}
