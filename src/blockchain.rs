//! The canonical chain ledger and the read-only view published to miners

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    block::{Block, BlockId, BlockRef, Producer},
    reward::{DisplacedReward, RewardSchedule, MAX_UNCLES},
};

/// Representation of the public blockchain, as maintained by the
/// [`Arbiter`](crate::arbiter::Arbiter).
///
/// # Invariants
/// - `blocks[i].depth == i` for every canonical block, and every canonical
///   block is the child of the block before it.
/// - Every stale candidate lies within the reward window of the chain head.
/// - A block is referenced as an uncle at most once.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Canonical blocks, indexed by depth. Index 0 is the genesis block.
    blocks: Vec<Block>,
    /// Unreferenced stale blocks, keyed by depth.
    stale_candidates: BTreeMap<u64, Block>,
    /// Stale blocks which have been referenced as uncles, in the order they
    /// were referenced.
    referenced_stale: Vec<Block>,
    schedule: RewardSchedule,
    displaced_reward: DisplacedReward,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    #[error("block {id} has depth {depth}, but the next depth is {expected}")]
    UnexpectedDepth { id: BlockId, depth: u64, expected: u64 },
    #[error("block {id} does not extend the chain head {head}")]
    ParentMismatch { id: BlockId, head: BlockId },
    #[error("cannot displace depth {0}")]
    InvalidDisplacement(u64),
}

impl Chain {
    /// Creates a chain containing only the genesis block.
    pub fn new(
        schedule: RewardSchedule,
        displaced_reward: DisplacedReward,
    ) -> Self {
        Chain {
            blocks: vec![Block::genesis()],
            stale_candidates: BTreeMap::new(),
            referenced_stale: vec![],
            schedule,
            displaced_reward,
        }
    }

    /// Number of canonical blocks, including the genesis block.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; the genesis block cannot be removed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the block at the tip of the canonical chain.
    #[inline]
    pub fn head(&self) -> &Block {
        // Genesis is never displaced
        &self.blocks[self.blocks.len() - 1]
    }

    /// Returns the canonical block at `depth`.
    #[inline]
    pub fn get(&self, depth: u64) -> Option<&Block> {
        self.blocks.get(depth as usize)
    }

    /// Returns true iff `id` is a stale candidate or a referenced uncle.
    pub fn is_tracked(&self, id: BlockId) -> bool {
        self.stale_candidates.values().any(|b| b.id == id)
            || self.referenced_stale.iter().any(|b| b.id == id)
    }

    /// Canonical blocks in order of depth.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Unreferenced stale blocks, in ascending order of depth.
    pub fn stale_candidates(&self) -> impl Iterator<Item = &Block> {
        self.stale_candidates.values()
    }

    /// Stale blocks which were referenced as uncles.
    #[inline]
    pub fn referenced_stale(&self) -> &[Block] {
        &self.referenced_stale
    }

    #[inline]
    pub fn schedule(&self) -> &RewardSchedule {
        &self.schedule
    }

    /// Returns the view of this chain handed to miners, without any fork.
    pub fn view(&self) -> ChainView {
        ChainView {
            head: self.head().to_ref(),
            fork: None,
            schedule: self.schedule,
        }
    }

    /// Returns up to [`MAX_UNCLES`] stale candidates which a block at `depth`
    /// may reference, oldest first.
    pub fn find_stale(&self, depth: u64) -> Vec<&Block> {
        let start = depth.saturating_sub(self.schedule.window);

        self.stale_candidates
            .range(start..depth)
            .map(|(_, block)| block)
            .take(MAX_UNCLES)
            .collect()
    }

    /// Appends `block` to the tip of the chain, crediting it with any stale
    /// candidates it can reference as uncles.
    ///
    /// Stale candidates which have fallen out of the reward window of
    /// `block` are purged without being rewarded.
    pub fn append_accepted(
        &mut self,
        mut block: Block,
    ) -> Result<&Block, LedgerError> {
        let expected = self.blocks.len() as u64;
        if block.depth != expected {
            return Err(LedgerError::UnexpectedDepth {
                id: block.id,
                depth: block.depth,
                expected,
            });
        }
        let head = self.head().id;
        if block.parent_id != Some(head) {
            return Err(LedgerError::ParentMismatch { id: block.id, head });
        }

        self.purge(block.depth);

        let depths: Vec<u64> =
            self.find_stale(block.depth).iter().map(|b| b.depth).collect();

        block.uncles.clear();
        for depth in depths {
            if let Some(mut uncle) = self.stale_candidates.remove(&depth) {
                self.schedule.credit_uncle(&mut uncle, block.depth);
                block.uncles.push(uncle.id);
                self.referenced_stale.push(uncle);
            }
        }
        self.schedule.credit_block(&mut block);

        self.blocks.push(block);
        Ok(self.head())
    }

    /// Removes the canonical block at `depth` and all deeper blocks. The block
    /// at `depth` becomes a stale candidate, and the uncle references of every
    /// removed block are revoked. Returns the removed blocks.
    pub fn displace(&mut self, depth: u64) -> Result<Vec<Block>, LedgerError> {
        if depth == 0 || depth >= self.blocks.len() as u64 {
            return Err(LedgerError::InvalidDisplacement(depth));
        }

        let mut removed = self.blocks.split_off(depth as usize);
        let mut revoked = vec![];
        for block in removed.iter_mut() {
            for uncle_id in block.uncles.drain(..) {
                let pos = self
                    .referenced_stale
                    .iter()
                    .position(|uncle| uncle.id == uncle_id);

                if let Some(pos) = pos {
                    let mut uncle = self.referenced_stale.remove(pos);
                    uncle.reward.set_uncle(0.0);
                    revoked.push(uncle);
                }
            }

            block.reward.revoke_nephew();
            if self.displaced_reward == DisplacedReward::Forfeit {
                block.reward.forfeit_mined();
            }
        }

        self.register_stale(removed[0].clone());
        for uncle in revoked {
            self.register_stale(uncle);
        }

        Ok(removed)
    }

    /// Records `block` as a stale candidate. Returns false, leaving the chain
    /// unchanged, if `block` is not the child of a canonical block, is
    /// already canonical or tracked, is outside of the reward window of the
    /// chain head, or if another candidate already occupies its depth.
    ///
    /// A registered block keeps only the rewards a stale block can hold.
    pub fn register_stale(&mut self, mut block: Block) -> bool {
        let Some(parent) = block.depth.checked_sub(1) else {
            return false;
        };

        let parent_canonical = self
            .get(parent)
            .is_some_and(|p| Some(p.id) == block.parent_id);
        let canonical =
            self.get(block.depth).is_some_and(|b| b.id == block.id);
        let head_depth = self.head().depth;
        let in_window =
            block.depth.saturating_add(self.schedule.window) >= head_depth;

        if !parent_canonical
            || canonical
            || !in_window
            || self.stale_candidates.contains_key(&block.depth)
            || self.is_tracked(block.id)
        {
            return false;
        }

        block.uncles.clear();
        block.reward.revoke_nephew();
        if self.displaced_reward == DisplacedReward::Forfeit {
            block.reward.forfeit_mined();
        }

        self.stale_candidates.insert(block.depth, block);
        true
    }

    /// Drops every stale candidate which a block at `depth` can no longer
    /// reference.
    fn purge(&mut self, depth: u64) {
        let window = self.schedule.window;
        self.stale_candidates
            .retain(|&d, _| d.saturating_add(window) >= depth);
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(RewardSchedule::default(), DisplacedReward::default())
    }
}

/// Snapshot of the public chain state, published by the
/// [`Arbiter`](crate::arbiter::Arbiter) after every block it processes.
/// This is the only chain state a [`Miner`](crate::miner::Miner) sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainView {
    /// Tip of the canonical chain.
    pub head: BlockRef,
    /// Present while two blocks contest the tip of the chain.
    pub fork: Option<ForkView>,
    pub schedule: RewardSchedule,
}

/// The publicly visible part of an open fork.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForkView {
    /// Producer whose branch is not (yet) canonical.
    pub shadow_side: Producer,
    /// Last block of the non-canonical branch.
    pub shadow_tip: BlockRef,
}

impl ChainView {
    /// Returns the block `side` mines on: the shadow branch tip if `side` owns
    /// the shadow branch of an open fork, the canonical head otherwise.
    pub fn tip_for(&self, side: Producer) -> BlockRef {
        match self.fork {
            Some(fork) if fork.shadow_side == side => fork.shadow_tip,
            _ => self.head,
        }
    }

    /// Returns true if an open fork's shadow branch belongs to `side`.
    #[inline]
    pub fn shadowed_by(&self, side: Producer) -> bool {
        self.fork.is_some_and(|fork| fork.shadow_side == side)
    }
}

impl Default for ChainView {
    fn default() -> Self {
        Chain::default().view()
    }
}
