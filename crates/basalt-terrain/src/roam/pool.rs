use basalt_core::allocator::{AllocId32, BumpAllocator32};
use basalt_core::static_assertions::const_assert_eq;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};

pub use basalt_core::allocator::Exhausted as PoolExhausted;

/// Identifies a [`TriTreeNode`] in a [`TriNodePool`]. Only valid until the next [`TriNodePool::reset_all`].
pub type NodeId = AllocId32;

/// A triangle in a binary triangle tree.
///
/// Children are either both present or both absent. Neighbor links do not own anything and may point into another
/// patch's tree; they are only absent along the map border.
///
/// ```text
///        apex
///        /|\
///  left /  |  \ right
///      /   |   \
///     / LC | RC \
///    /_____|_____\
///  left  center  right
///       (base)
/// ```
///
/// The base neighbor shares the hypotenuse (left to right), the left neighbor shares the apex to left edge and the right
/// neighbor shares the right to apex edge.
///
/// Links are atomics so that patches in the same tessellation sub-block can split their trees from different threads.
/// Concurrent patches never touch the same nodes, so relaxed ordering is enough; the fork-join between sub-blocks
/// publishes everything.
#[derive(Debug, Default)]
pub struct TriTreeNode {
    left_child: AtomicU32,
    right_child: AtomicU32,
    base_neighbor: AtomicU32,
    left_neighbor: AtomicU32,
    right_neighbor: AtomicU32,
}

const_assert_eq!(mem::size_of::<TriTreeNode>(), 5 * mem::size_of::<u32>());

#[inline]
fn load(link: &AtomicU32) -> Option<NodeId> {
    NodeId::new(link.load(Ordering::Relaxed))
}

#[inline]
fn store(link: &AtomicU32, id: Option<NodeId>) {
    link.store(id.map_or(0, NodeId::get), Ordering::Relaxed)
}

impl TriTreeNode {
    #[inline]
    pub fn left_child(&self) -> Option<NodeId> {
        load(&self.left_child)
    }

    #[inline]
    pub fn right_child(&self) -> Option<NodeId> {
        load(&self.right_child)
    }

    #[inline]
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        self.left_child().zip(self.right_child())
    }

    #[inline]
    pub fn base_neighbor(&self) -> Option<NodeId> {
        load(&self.base_neighbor)
    }

    #[inline]
    pub fn left_neighbor(&self) -> Option<NodeId> {
        load(&self.left_neighbor)
    }

    #[inline]
    pub fn right_neighbor(&self) -> Option<NodeId> {
        load(&self.right_neighbor)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.left_child().is_none()
    }

    #[inline]
    pub fn is_branch(&self) -> bool {
        !self.is_leaf()
    }

    /// Forgets children and neighbors.
    pub fn clear(&self) {
        store(&self.left_child, None);
        store(&self.right_child, None);
        store(&self.base_neighbor, None);
        store(&self.left_neighbor, None);
        store(&self.right_neighbor, None);
    }

    #[inline]
    pub(crate) fn set_children(&self, left: NodeId, right: NodeId) {
        store(&self.left_child, Some(left));
        store(&self.right_child, Some(right));
    }

    #[inline]
    pub(crate) fn set_base_neighbor(&self, id: Option<NodeId>) {
        store(&self.base_neighbor, id)
    }

    #[inline]
    pub(crate) fn set_left_neighbor(&self, id: Option<NodeId>) {
        store(&self.left_neighbor, id)
    }

    #[inline]
    pub(crate) fn set_right_neighbor(&self, id: Option<NodeId>) {
        store(&self.right_neighbor, id)
    }

    /// Whichever of this node's neighbor links points at `old` now points at `new`.
    pub(crate) fn replace_neighbor(&self, old: NodeId, new: NodeId) {
        if self.base_neighbor() == Some(old) {
            self.set_base_neighbor(Some(new));
        } else if self.left_neighbor() == Some(old) {
            self.set_left_neighbor(Some(new));
        } else if self.right_neighbor() == Some(old) {
            self.set_right_neighbor(Some(new));
        }
    }
}

/// The fixed-capacity node arena of one mesh grid.
///
/// The first `2 * num_patches` slots hold the base triangles and survive [`reset_all`](Self::reset_all); everything
/// after them is handed out by split operations and discarded together at the start of each retessellation pass.
pub struct TriNodePool {
    nodes: BumpAllocator32<TriTreeNode>,
    first_base: NodeId,
    num_patches: u32,
}

impl TriNodePool {
    /// A pool holding the base triangles of `num_patches` patches plus `capacity` split nodes.
    pub fn new(num_patches: u32, capacity: u32) -> Result<Self, PoolExhausted> {
        let total = capacity.checked_add(2 * num_patches).ok_or(PoolExhausted)?;
        let mut nodes = BumpAllocator32::new(total);
        let first_base = nodes.reserve(2 * num_patches)?;
        Ok(Self {
            nodes,
            first_base,
            num_patches,
        })
    }

    /// The base left and base right triangles of patch `patch_index`.
    pub fn base_pair(&self, patch_index: usize) -> (NodeId, NodeId) {
        assert!(patch_index < self.num_patches as usize);
        let first = BumpAllocator32::<TriTreeNode>::id_to_index(self.first_base) + 2 * patch_index;
        (
            BumpAllocator32::<TriTreeNode>::index_to_id(first),
            BumpAllocator32::<TriTreeNode>::index_to_id(first + 1),
        )
    }

    pub fn is_base(&self, id: NodeId) -> bool {
        BumpAllocator32::<TriTreeNode>::id_to_index(id) < self.nodes.num_reserved() as usize
    }

    #[inline]
    pub fn allocate(&self) -> Result<NodeId, PoolExhausted> {
        let id = self.nodes.allocate()?;
        self.nodes[id].clear();
        Ok(id)
    }

    /// Both children of a split, or neither.
    #[inline]
    pub fn allocate_pair(&self) -> Result<(NodeId, NodeId), PoolExhausted> {
        let [left, right] = self.nodes.allocate_pair()?;
        self.nodes[left].clear();
        self.nodes[right].clear();
        Ok((left, right))
    }

    /// Releases every split node at once. Base triangles keep their slots but must be relinked before reuse.
    pub fn reset_all(&mut self) {
        self.nodes.reset();
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &TriTreeNode {
        &self.nodes[id]
    }

    /// Split nodes available per pass.
    pub fn capacity(&self) -> u32 {
        self.nodes.capacity() - self.nodes.num_reserved()
    }

    /// Split nodes handed out since the last reset.
    pub fn nodes_used(&self) -> u32 {
        self.nodes.len() - self.nodes.num_reserved()
    }

    /// True if an allocation failed since the last reset.
    pub fn is_exhausted(&self) -> bool {
        self.nodes.is_exhausted()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
