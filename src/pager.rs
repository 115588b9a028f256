use crate::error::Result;
use crate::node::Node;

/// Handle of a page. Handles are allocated monotonically and never reused
/// while anything still refers to them.
pub type PagePtr = u64;

/// "No page": the root of an empty tree. On disk it is the meta page.
pub const NIL_PAGE: PagePtr = 0;

/// The page operations the B-tree is built on.
///
/// Pages are immutable once handed to `new`; the tree copies on write and
/// releases superseded pages with `del`.
pub trait PageManager {
    /// Dereferences a handle.
    fn get(&self, ptr: PagePtr) -> Result<Node>;

    /// Allocates a fresh handle for `node`, which must fit a page.
    fn new(&mut self, node: Node) -> Result<PagePtr>;

    /// Releases a handle. The caller never dereferences it again.
    fn del(&mut self, ptr: PagePtr) -> Result<()>;
}
