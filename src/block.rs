//! Blocks and the identifiers used to refer to them

use std::fmt::Display;

/// Which mining pool produced a [`Block`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Producer {
    #[default]
    Honest,
    Selfish,
}

impl Producer {
    /// Returns the other producer.
    #[inline]
    pub fn opposite(&self) -> Producer {
        match self {
            Producer::Honest => Producer::Selfish,
            Producer::Selfish => Producer::Honest,
        }
    }

    #[inline]
    pub fn is_selfish(&self) -> bool {
        matches!(self, Producer::Selfish)
    }
}

impl Display for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Producer::Honest => write!(f, "Honest"),
            Producer::Selfish => write!(f, "Selfish"),
        }
    }
}

/// Opaque unique identifier of a [`Block`]. Not a hash; ids are handed out
/// sequentially within a simulation run, and `BlockId(0)` is the genesis
/// block.
#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) u64);

impl BlockId {
    pub const GENESIS: BlockId = BlockId(0);

    /// Returns the [`u64`] corresponding to this [`BlockId`].
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for BlockId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Rewards credited to a single block.
///
/// # Invariants
/// `total == mined + nephew + uncle` after every update made through the
/// methods of this type.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RewardBreakdown {
    pub mined: f64,
    pub nephew: f64,
    pub uncle: f64,
    pub total: f64,
}

impl RewardBreakdown {
    /// Sets the rewards a block earns when it is created or accepted.
    pub fn set_own(&mut self, mined: f64, nephew: f64) {
        self.mined = mined;
        self.nephew = nephew;
        self.recalc();
    }

    /// Sets the reward a block earns for being referenced as an uncle.
    pub fn set_uncle(&mut self, uncle: f64) {
        self.uncle = uncle;
        self.recalc();
    }

    /// Removes the nephew credit of a block whose uncle references were
    /// revoked.
    pub fn revoke_nephew(&mut self) {
        self.nephew = 0.0;
        self.recalc();
    }

    /// Removes the mining reward of a block which left the canonical chain.
    pub fn forfeit_mined(&mut self) {
        self.mined = 0.0;
        self.recalc();
    }

    #[inline]
    fn recalc(&mut self) {
        self.total = self.mined + self.nephew + self.uncle;
    }
}

/// Lightweight pointer to a block, enough for a miner to extend it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub id: BlockId,
    pub depth: u64,
    pub producer: Producer,
}

/// A mined block.
///
/// Parent and uncle relationships are stored as [`BlockId`]s rather than
/// references; the full uncle blocks live in the
/// [`Chain`](crate::blockchain::Chain) they were credited in.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    /// `None` only for the genesis block.
    pub parent_id: Option<BlockId>,
    /// Distance from the genesis block.
    pub depth: u64,
    pub producer: Producer,
    /// Stale blocks credited by this block, at most
    /// [`MAX_UNCLES`](crate::reward::MAX_UNCLES).
    pub uncles: Vec<BlockId>,
    pub reward: RewardBreakdown,
}

impl Block {
    /// Creates the genesis block.
    pub fn genesis() -> Self {
        Block {
            id: BlockId::GENESIS,
            parent_id: None,
            depth: 0,
            producer: Producer::Honest,
            uncles: vec![],
            reward: RewardBreakdown::default(),
        }
    }

    /// Creates a new block mined by `producer` on top of `parent`.
    pub fn extending(id: BlockId, parent: &BlockRef, producer: Producer) -> Self {
        Block {
            id,
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
            producer,
            uncles: vec![],
            reward: RewardBreakdown::default(),
        }
    }

    /// Returns a [`BlockRef`] pointing at this block.
    #[inline]
    pub fn to_ref(&self) -> BlockRef {
        BlockRef { id: self.id, depth: self.depth, producer: self.producer }
    }

    #[inline]
    pub fn is_genesis(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parent = match self.parent_id {
            Some(id) => id.to_string(),
            None => "-".to_string(),
        };

        write!(
            f,
            "id: {}\tparent: {}\tdepth: {}\tselfish: {}\tuncles: {}\treward: {:.6}",
            self.id,
            parent,
            self.depth,
            self.producer.is_selfish(),
            self.uncles.len(),
            self.reward.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_total_tracks_components() {
        let mut reward = RewardBreakdown::default();
        reward.set_own(5.0, 0.25);
        assert_eq!(reward.total, 5.25);

        reward.set_uncle(2.5);
        assert_eq!(reward.total, 7.75);

        reward.revoke_nephew();
        reward.forfeit_mined();
        assert_eq!(reward.total, 2.5);
        assert_eq!(reward.total, reward.mined + reward.nephew + reward.uncle);
    }

    #[test]
    fn extending_block_is_one_deeper() {
        let genesis = Block::genesis();
        let block = Block::extending(7.into(), &genesis.to_ref(), Producer::Selfish);

        assert_eq!(block.depth, 1);
        assert_eq!(block.parent_id, Some(BlockId::GENESIS));
        assert!(!block.is_genesis());
        assert_eq!(block.reward, RewardBreakdown::default());
    }
}
