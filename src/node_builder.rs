use crate::error::{Error, Result};
use crate::key_value_pair::KeyValuePair;
use crate::node::Node;
use crate::node_type::NodeType;
use crate::pager::PagePtr;

/// Builds a node entry by entry. Entries must be appended in index order,
/// since the position of each entry depends on the one before it.
pub struct NodeBuilder {
    node: Node,
    appended: u16,
}

impl NodeBuilder {
    pub fn new(node_type: NodeType, nkeys: u16) -> NodeBuilder {
        NodeBuilder {
            node: Node::with_header(node_type, nkeys),
            appended: 0,
        }
    }

    /// A leaf holding `pairs` in the given order.
    pub fn leaf(pairs: &[KeyValuePair]) -> Result<Node> {
        let nkeys = u16::try_from(pairs.len())
            .map_err(|_| Error::Corruption(format!("{} entries in one node", pairs.len())))?;
        let mut builder = NodeBuilder::new(NodeType::Leaf, nkeys);
        for (i, pair) in pairs.iter().enumerate() {
            builder.append_kv(i as u16, 0, &pair.key, &pair.value)?;
        }
        builder.build()
    }

    /// Copies a pointer and an entry into position `idx`.
    pub fn append_kv(&mut self, idx: u16, ptr: PagePtr, key: &[u8], val: &[u8]) -> Result<&mut Self> {
        if idx != self.appended {
            return Err(Error::Corruption(format!(
                "entry {} appended while expecting entry {}",
                idx, self.appended
            )));
        }
        self.node.set_ptr(idx, ptr)?;
        let len = self.node.write_entry(idx, key, val)?;
        let end = self.node.get_offset(idx)? as usize + len;
        let end = u16::try_from(end)
            .map_err(|_| Error::Corruption(format!("entry region of {} bytes", end)))?;
        self.node.set_offset(idx + 1, end)?;
        self.appended += 1;
        Ok(self)
    }

    /// Copies `n` pointers and entries from `old[src..]` into `dst..`.
    pub fn append_range(&mut self, old: &Node, dst: u16, src: u16, n: u16) -> Result<&mut Self> {
        for i in 0..n {
            self.append_kv(
                dst + i,
                old.get_ptr(src + i)?,
                old.get_key(src + i)?,
                old.get_val(src + i)?,
            )?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Node> {
        let nkeys = self.node.num_keys();
        if self.appended != nkeys {
            return Err(Error::Corruption(format!(
                "node declares {} keys but {} were appended",
                nkeys, self.appended
            )));
        }
        Ok(self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_node_keeps_pointers() {
        let mut builder = NodeBuilder::new(NodeType::Internal, 2);
        builder
            .append_kv(0, 7, b"", b"")
            .unwrap()
            .append_kv(1, 9, b"m", b"")
            .unwrap();
        let node = builder.build().unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Internal);
        assert_eq!(node.get_ptr(0).unwrap(), 7);
        assert_eq!(node.get_ptr(1).unwrap(), 9);
        assert_eq!(node.get_key(1).unwrap(), b"m");
        assert_eq!(node.lookup_le(b"z").unwrap(), 1);
        assert_eq!(node.lookup_le(b"a").unwrap(), 0);
    }

    #[test]
    fn append_range_copies_a_slice() {
        let old = NodeBuilder::leaf(&[
            KeyValuePair::new("a", "1"),
            KeyValuePair::new("b", "2"),
            KeyValuePair::new("c", "3"),
        ])
        .unwrap();
        let mut builder = NodeBuilder::new(NodeType::Leaf, 2);
        builder.append_range(&old, 0, 1, 2).unwrap();
        let node = builder.build().unwrap();
        assert_eq!(
            node.pairs().unwrap(),
            vec![KeyValuePair::new("b", "2"), KeyValuePair::new("c", "3")]
        );
    }

    #[test]
    fn out_of_order_and_incomplete_builds_fail() {
        let mut builder = NodeBuilder::new(NodeType::Leaf, 2);
        assert!(matches!(
            builder.append_kv(1, 0, b"a", b""),
            Err(Error::Corruption(_))
        ));
        builder.append_kv(0, 0, b"a", b"").unwrap();
        assert!(matches!(builder.build(), Err(Error::Corruption(_))));

        let mut builder = NodeBuilder::new(NodeType::Leaf, 1);
        builder.append_kv(0, 0, b"a", b"").unwrap();
        assert!(matches!(
            builder.append_kv(1, 0, b"b", b""),
            Err(Error::OutOfRange { index: 1, .. })
        ));
    }
}
