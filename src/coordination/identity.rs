/// The position of a node inside its group, fixed once the node joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    rank: usize,
    group_size: usize,
}

impl NodeIdentity {
    pub(super) fn new(rank: usize, group_size: usize) -> Self {
        Self { rank, group_size }
    }

    /// The rank of the node, in `[0, group_size)`.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }
}

impl Default for NodeIdentity {
    /// The identity of a node outside of any group.
    fn default() -> Self {
        Self::new(0, 1)
    }
}
