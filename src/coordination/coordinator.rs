use std::num::NonZeroUsize;

use log::info;
use parking_lot::Mutex;

use super::NodeIdentity;
use crate::{
    Key,
    error::{KvError, Result},
};

/// Hands out ranks to the nodes sharing a server and decides how many
/// contributions make up a complete round.
#[derive(Debug)]
pub struct Coordinator {
    group_size: NonZeroUsize,
    members: Mutex<Vec<bool>>,
}

impl Coordinator {
    /// Creates a new `Coordinator`.
    ///
    /// # Arguments
    /// * `group_size` - The amount of nodes taking part in every round.
    pub fn new(group_size: NonZeroUsize) -> Self {
        Self {
            group_size,
            members: Mutex::new(vec![false; group_size.get()]),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size.get()
    }

    /// Registers a node in the group, giving it the lowest free rank.
    ///
    /// # Returns
    /// The identity of the node or `GroupFull` if every rank is taken.
    pub fn join(&self) -> Result<NodeIdentity> {
        let mut members = self.members.lock();
        let group_size = self.group_size();

        let Some(rank) = members.iter().position(|taken| !taken) else {
            return Err(KvError::GroupFull { group_size });
        };

        members[rank] = true;
        info!(rank = rank, group_size = group_size; "node joined the group");
        Ok(NodeIdentity::new(rank, group_size))
    }

    /// Releases `rank` so another node may join with it.
    ///
    /// # Returns
    /// The amount of nodes still in the group.
    pub fn leave(&self, rank: usize) -> usize {
        let mut members = self.members.lock();

        if let Some(taken) = members.get_mut(rank) {
            *taken = false;
        }

        let remaining = members.iter().filter(|taken| **taken).count();
        info!(rank = rank, remaining = remaining; "node left the group");
        remaining
    }

    /// The amount of nodes currently in the group.
    pub fn members(&self) -> usize {
        self.members.lock().iter().filter(|taken| **taken).count()
    }

    /// The amount of contributions that complete a round of `key`.
    ///
    /// Every node of the group pushes once per round, for every key.
    pub fn round_size(&self, _key: Key) -> usize {
        self.group_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(group_size: usize) -> Coordinator {
        Coordinator::new(NonZeroUsize::new(group_size).unwrap())
    }

    #[test]
    fn test_ranks_follow_join_order() {
        let coordinator = coordinator(3);

        let ranks: Vec<_> = (0..3).map(|_| coordinator.join().unwrap().rank()).collect();

        assert_eq!(ranks, [0, 1, 2]);
        assert_eq!(coordinator.members(), 3);
    }

    #[test]
    fn test_full_group_rejects_join() {
        let coordinator = coordinator(1);
        coordinator.join().unwrap();

        assert_eq!(coordinator.join(), Err(KvError::GroupFull { group_size: 1 }));
    }

    #[test]
    fn test_released_rank_is_reused() {
        let coordinator = coordinator(2);
        coordinator.join().unwrap();
        coordinator.join().unwrap();

        assert_eq!(coordinator.leave(0), 1);

        let identity = coordinator.join().unwrap();
        assert_eq!(identity.rank(), 0);
        assert_eq!(identity.group_size(), 2);
    }

    #[test]
    fn test_round_size_is_group_size() {
        assert_eq!(coordinator(4).round_size(0), 4);
    }
}
