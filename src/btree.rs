use crate::error::{Error, Result};
use crate::key_value_pair::KeyValuePair;
use crate::node::Node;
use crate::node_builder::NodeBuilder;
use crate::node_type::NodeType;
use crate::page_layout::{tables_size, HEADER_SIZE, MAX_KEY_SIZE, MAX_VAL_SIZE, PAGE_SIZE};
use crate::pager::{PageManager, PagePtr, NIL_PAGE};
use crate::Tree;
use tracing::trace;

/// A copy-on-write B+Tree over a page manager.
///
/// Mutations never touch a stored page: every node on the path from the
/// root to the updated leaf is rebuilt, allocated with `new` and the
/// superseded pages are released with `del`.
pub struct BTree<P: PageManager> {
    // pointer to the root page, NIL_PAGE for an empty tree.
    root: PagePtr,
    pager: P,
}

/// Rejects keys and values that cannot be stored.
pub fn validate(key: &[u8], val: &[u8]) -> Result<()> {
    validate_key(key)?;
    if val.len() > MAX_VAL_SIZE {
        return Err(Error::ValueTooLong(val.len()));
    }
    Ok(())
}

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::KeyTooLong(key.len()));
    }
    Ok(())
}

impl<P: PageManager> BTree<P> {
    pub fn new(pager: P) -> BTree<P> {
        BTree::with_root(pager, NIL_PAGE)
    }

    /// A tree over pages that already exist, rooted at `root`.
    pub fn with_root(pager: P, root: PagePtr) -> BTree<P> {
        BTree { root, pager }
    }

    pub fn root(&self) -> PagePtr {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: PagePtr) {
        self.root = root;
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL_PAGE
    }

    pub fn pager(&self) -> &P {
        &self.pager
    }

    pub fn pager_mut(&mut self) -> &mut P {
        &mut self.pager
    }

    /// Looks up the value of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() || self.root == NIL_PAGE {
            return Ok(None);
        }
        let mut node = self.pager.get(self.root)?;
        loop {
            let idx = node.lookup_le(key)?;
            match node.node_type()? {
                NodeType::Leaf => {
                    if node.num_keys() > 0 && node.get_key(idx)? == key {
                        return Ok(Some(node.get_val(idx)?.to_vec()));
                    }
                    return Ok(None);
                }
                NodeType::Internal => node = self.pager.get(node.get_ptr(idx)?)?,
            }
        }
    }

    /// Inserts or updates `key`.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        validate(key, val)?;

        let root = if self.root == NIL_PAGE {
            // The empty sentinel key makes the first leaf cover the whole key space.
            let mut builder = NodeBuilder::new(NodeType::Leaf, 1);
            builder.append_kv(0, NIL_PAGE, &[], &[])?;
            builder.build()?
        } else {
            self.pager.get(self.root)?
        };

        let updated = self.tree_insert(&root, key, val)?;
        let mut parts = split3(updated)?;
        let new_root = if parts.len() > 1 {
            // the root was split, add a new level.
            let mut builder = NodeBuilder::new(NodeType::Internal, parts.len() as u16);
            for (i, part) in parts.into_iter().enumerate() {
                let first = part.get_key(0)?.to_vec();
                let ptr = self.pager.new(part)?;
                builder.append_kv(i as u16, ptr, &first, &[])?;
            }
            trace!("root split, tree grows one level");
            self.pager.new(builder.build()?)?
        } else {
            let part = parts
                .pop()
                .ok_or_else(|| Error::Corruption("split produced no nodes".to_string()))?;
            self.pager.new(part)?
        };

        if self.root != NIL_PAGE {
            self.pager.del(self.root)?;
        }
        self.root = new_root;
        Ok(())
    }

    /// Deletes `key`. Returns false if it was not in the tree, in which case
    /// nothing was modified.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        validate_key(key)?;
        if self.root == NIL_PAGE {
            return Ok(false);
        }

        let root = self.pager.get(self.root)?;
        let updated = match self.tree_delete(&root, key)? {
            Some(updated) => updated,
            None => return Ok(false),
        };

        self.pager.del(self.root)?;
        self.root = self.shrink(updated)?;
        Ok(true)
    }

    // Allocates the root left by a delete. Levels whose root has a single
    // child are removed, and a leaf holding only the sentinel empties the tree.
    fn shrink(&mut self, mut node: Node) -> Result<PagePtr> {
        // the page `node` was read from, None while it is not allocated
        let mut stored: Option<PagePtr> = None;
        loop {
            let node_type = node.node_type()?;
            let only_sentinel = node_type == NodeType::Leaf
                && node.num_keys() == 1
                && node.get_key(0)?.is_empty();
            if node.num_keys() == 0 || only_sentinel {
                if let Some(ptr) = stored {
                    self.pager.del(ptr)?;
                }
                trace!("last key deleted, the tree is empty");
                return Ok(NIL_PAGE);
            }
            if node_type == NodeType::Internal && node.num_keys() == 1 {
                let kid = node.get_ptr(0)?;
                if let Some(ptr) = stored {
                    self.pager.del(ptr)?;
                }
                trace!(kid, "root has a single child, tree shrinks one level");
                node = self.pager.get(kid)?;
                stored = Some(kid);
                continue;
            }
            return match stored {
                Some(ptr) => Ok(ptr),
                None => self.pager.new(node),
            };
        }
    }

    /// All entries in key order.
    pub fn entries(&self) -> Result<Vec<KeyValuePair>> {
        let mut out = Vec::new();
        if self.root != NIL_PAGE {
            self.collect(self.root, &mut out)?;
        }
        Ok(out)
    }

    fn collect(&self, ptr: PagePtr, out: &mut Vec<KeyValuePair>) -> Result<()> {
        let node = self.pager.get(ptr)?;
        match node.node_type()? {
            NodeType::Leaf => {
                out.extend(node.pairs()?.into_iter().filter(|pair| !pair.key.is_empty()));
            }
            NodeType::Internal => {
                for i in 0..node.num_keys() {
                    self.collect(node.get_ptr(i)?, out)?;
                }
            }
        }
        Ok(())
    }

    // insert a KV into a node, the result might be split.
    // the caller is responsible for deallocating the input node
    // and splitting and allocating result nodes.
    fn tree_insert(&mut self, node: &Node, key: &[u8], val: &[u8]) -> Result<Node> {
        let idx = node.lookup_le(key)?;
        match node.node_type()? {
            NodeType::Leaf => {
                if node.get_key(idx)? == key {
                    leaf_update(node, idx, key, val)
                } else {
                    leaf_insert(node, idx + 1, key, val)
                }
            }
            NodeType::Internal => self.node_insert(node, idx, key, val),
        }
    }

    fn node_insert(&mut self, node: &Node, idx: u16, key: &[u8], val: &[u8]) -> Result<Node> {
        let kptr = node.get_ptr(idx)?;
        let kid = self.pager.get(kptr)?;
        let updated = self.tree_insert(&kid, key, val)?;
        let parts = split3(updated)?;
        self.pager.del(kptr)?;
        self.replace_kid_n(node, idx, parts)
    }

    // replace the link at `idx` with one or multiple links
    fn replace_kid_n(&mut self, old: &Node, idx: u16, kids: Vec<Node>) -> Result<Node> {
        let inc = kids.len() as u16;
        let mut builder = NodeBuilder::new(NodeType::Internal, old.num_keys() + inc - 1);
        builder.append_range(old, 0, 0, idx)?;
        for (i, kid) in kids.into_iter().enumerate() {
            let first = kid.get_key(0)?.to_vec();
            let ptr = self.pager.new(kid)?;
            builder.append_kv(idx + i as u16, ptr, &first, &[])?;
        }
        builder.append_range(old, idx + inc, idx + 1, old.num_keys() - (idx + 1))?;
        builder.build()
    }

    // delete a key from the subtree, None if the key is not there
    fn tree_delete(&mut self, node: &Node, key: &[u8]) -> Result<Option<Node>> {
        let idx = node.lookup_le(key)?;
        match node.node_type()? {
            NodeType::Leaf => {
                if node.get_key(idx)? != key {
                    return Ok(None);
                }
                leaf_delete(node, idx).map(Some)
            }
            NodeType::Internal => self.node_delete(node, idx, key),
        }
    }

    fn node_delete(&mut self, node: &Node, idx: u16, key: &[u8]) -> Result<Option<Node>> {
        let kptr = node.get_ptr(idx)?;
        let kid = self.pager.get(kptr)?;
        let updated = match self.tree_delete(&kid, key)? {
            Some(updated) => updated,
            None => return Ok(None),
        };
        self.pager.del(kptr)?;

        let new = match self.should_merge(node, idx, &updated)? {
            Merge::Left(sibling) => {
                let merged = merge(&sibling, &updated)?;
                self.pager.del(node.get_ptr(idx - 1)?)?;
                trace!(idx, "merged with the left sibling");
                let first = merged.get_key(0)?.to_vec();
                let ptr = self.pager.new(merged)?;
                replace_2_kid(node, idx - 1, ptr, &first)?
            }
            Merge::Right(sibling) => {
                let merged = merge(&updated, &sibling)?;
                self.pager.del(node.get_ptr(idx + 1)?)?;
                trace!(idx, "merged with the right sibling");
                let first = merged.get_key(0)?.to_vec();
                let ptr = self.pager.new(merged)?;
                replace_2_kid(node, idx, ptr, &first)?
            }
            Merge::None if updated.num_keys() == 0 => {
                // an empty kid without siblings, the parent becomes empty too
                if node.num_keys() != 1 || idx != 0 {
                    return Err(Error::Corruption(format!(
                        "empty child {} of a node with {} keys was not merged",
                        idx,
                        node.num_keys()
                    )));
                }
                NodeBuilder::new(NodeType::Internal, 0).build()?
            }
            Merge::None => self.replace_kid_n(node, idx, vec![updated])?,
        };
        Ok(Some(new))
    }

    // should the updated kid be merged with a sibling?
    fn should_merge(&self, node: &Node, idx: u16, updated: &Node) -> Result<Merge> {
        if updated.num_bytes() > PAGE_SIZE / 4 {
            return Ok(Merge::None);
        }
        if idx > 0 {
            let sibling = self.pager.get(node.get_ptr(idx - 1)?)?;
            if sibling.num_bytes() + updated.num_bytes() - HEADER_SIZE <= PAGE_SIZE {
                return Ok(Merge::Left(sibling));
            }
        }
        if idx + 1 < node.num_keys() {
            let sibling = self.pager.get(node.get_ptr(idx + 1)?)?;
            if sibling.num_bytes() + updated.num_bytes() - HEADER_SIZE <= PAGE_SIZE {
                return Ok(Merge::Right(sibling));
            }
        }
        Ok(Merge::None)
    }
}

enum Merge {
    Left(Node),
    Right(Node),
    None,
}

impl<P: PageManager> Tree for BTree<P> {
    fn insert(&mut self, key: u64, value: &str) -> Result<()> {
        BTree::insert(self, &key.to_be_bytes(), value.as_bytes())
    }

    fn get_root(&self) -> Result<Vec<u8>> {
        if self.root == NIL_PAGE {
            return Ok(Vec::new());
        }
        Ok(self.pager.get(self.root)?.as_bytes().to_vec())
    }
}

// add a new key to a leaf node
fn leaf_insert(old: &Node, idx: u16, key: &[u8], val: &[u8]) -> Result<Node> {
    let mut builder = NodeBuilder::new(NodeType::Leaf, old.num_keys() + 1);
    builder
        .append_range(old, 0, 0, idx)?
        .append_kv(idx, NIL_PAGE, key, val)?
        .append_range(old, idx + 1, idx, old.num_keys() - idx)?;
    builder.build()
}

// replace the value of an existing key
fn leaf_update(old: &Node, idx: u16, key: &[u8], val: &[u8]) -> Result<Node> {
    let mut builder = NodeBuilder::new(NodeType::Leaf, old.num_keys());
    builder
        .append_range(old, 0, 0, idx)?
        .append_kv(idx, NIL_PAGE, key, val)?
        .append_range(old, idx + 1, idx + 1, old.num_keys() - (idx + 1))?;
    builder.build()
}

// remove a key from a leaf node
fn leaf_delete(old: &Node, idx: u16) -> Result<Node> {
    let mut builder = NodeBuilder::new(NodeType::Leaf, old.num_keys() - 1);
    builder
        .append_range(old, 0, 0, idx)?
        .append_range(old, idx, idx + 1, old.num_keys() - (idx + 1))?;
    builder.build()
}

/// Merges two adjacent nodes of the same type into one.
pub fn merge(left: &Node, right: &Node) -> Result<Node> {
    let node_type = left.node_type()?;
    if right.node_type()? != node_type {
        return Err(Error::Corruption(
            "merging nodes of different types".to_string(),
        ));
    }
    let mut builder = NodeBuilder::new(node_type, left.num_keys() + right.num_keys());
    builder
        .append_range(left, 0, 0, left.num_keys())?
        .append_range(right, left.num_keys(), 0, right.num_keys())?;
    let merged = builder.build()?;
    if !merged.fits_page() {
        return Err(Error::Corruption(format!(
            "merged node of {} bytes exceeds the page size",
            merged.num_bytes()
        )));
    }
    Ok(merged)
}

// replace 2 adjacent links with 1
fn replace_2_kid(old: &Node, idx: u16, ptr: PagePtr, key: &[u8]) -> Result<Node> {
    let mut builder = NodeBuilder::new(NodeType::Internal, old.num_keys() - 1);
    builder
        .append_range(old, 0, 0, idx)?
        .append_kv(idx, ptr, key, &[])?
        .append_range(old, idx + 1, idx + 2, old.num_keys() - (idx + 2))?;
    builder.build()
}

// split an oversized node into 2 so that the 2nd node always fits on a page
fn split2(old: &Node) -> Result<(Node, Node)> {
    let nkeys = old.num_keys();
    if nkeys < 2 {
        return Err(Error::Corruption(format!(
            "cannot split a node with {} keys",
            nkeys
        )));
    }

    let left_bytes = |nleft: u16| -> Result<usize> {
        Ok(HEADER_SIZE + tables_size(nleft as usize) + old.get_offset(nleft)? as usize)
    };

    // the initial guess, then try to fit the left half
    let mut nleft = nkeys / 2;
    while left_bytes(nleft)? > PAGE_SIZE {
        nleft -= 1;
    }
    // then try to fit the right half
    while old.num_bytes() - left_bytes(nleft)? + HEADER_SIZE > PAGE_SIZE {
        nleft += 1;
    }
    if nleft == 0 || nleft >= nkeys {
        return Err(Error::Corruption(format!(
            "no split point for a node of {} bytes",
            old.num_bytes()
        )));
    }

    let node_type = old.node_type()?;
    let mut left = NodeBuilder::new(node_type, nleft);
    left.append_range(old, 0, 0, nleft)?;
    let mut right = NodeBuilder::new(node_type, nkeys - nleft);
    right.append_range(old, 0, nleft, nkeys - nleft)?;
    Ok((left.build()?, right.build()?))
}

/// Splits a node if it's too big. The result is 1 to 3 nodes, each of them
/// fitting a page, with keys in the original order.
pub fn split3(old: Node) -> Result<Vec<Node>> {
    if old.fits_page() {
        return Ok(vec![old]);
    }
    let (left, right) = split2(&old)?;
    if left.fits_page() {
        trace!(size = old.num_bytes(), "split into 2 nodes");
        return Ok(vec![left, right]);
    }
    let (leftleft, middle) = split2(&left)?;
    if !leftleft.fits_page() {
        return Err(Error::Corruption(format!(
            "split left a node of {} bytes",
            leftleft.num_bytes()
        )));
    }
    trace!(size = old.num_bytes(), "split into 3 nodes");
    Ok(vec![leftleft, middle, right])
}
