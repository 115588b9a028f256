use crate::error::Error;

// NodeType Represents different node types in the BTree.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NodeType {
    /// Internal nodes contain child pointers and the first key of each child.
    Internal,

    /// Leaf nodes contain keys and values.
    Leaf,
}

// Converts an on-disk tag to a NodeType.
impl TryFrom<u16> for NodeType {
    type Error = Error;

    fn try_from(orig: u16) -> Result<NodeType, Error> {
        match orig {
            0x01 => Ok(NodeType::Internal),
            0x02 => Ok(NodeType::Leaf),
            tag => Err(Error::Corruption(format!("unknown node type {}", tag))),
        }
    }
}

// Converts a NodeType to its on-disk tag.
impl From<NodeType> for u16 {
    fn from(orig: NodeType) -> u16 {
        match orig {
            NodeType::Internal => 0x01,
            NodeType::Leaf => 0x02,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for node_type in [NodeType::Internal, NodeType::Leaf] {
            let tag: u16 = node_type.into();
            assert_eq!(NodeType::try_from(tag).unwrap(), node_type);
        }
    }

    #[test]
    fn unknown_tag_is_corruption() {
        assert!(matches!(NodeType::try_from(0), Err(Error::Corruption(_))));
        assert!(matches!(NodeType::try_from(7), Err(Error::Corruption(_))));
    }
}
