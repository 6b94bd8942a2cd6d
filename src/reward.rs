/*!
Block, nephew and uncle rewards

Rewards follow the GHOST-style schedule used by Ethereum: every canonical
block earns the block subsidy `B`, a canonical block earns a small nephew
bonus for each stale block it references, and a referenced stale block (an
uncle) earns a share of `B` which decays linearly with its distance from the
referencing block, reaching zero at the edge of the lookback window.
*/

use crate::{
    block::{Block, Producer},
    blockchain::Chain,
};

/// Maximum number of uncles a single block may reference.
pub const MAX_UNCLES: usize = 2;

/// Constants of the reward schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardSchedule {
    /// Block subsidy `B`.
    pub block_reward: f64,
    /// A block referencing `n` uncles earns `n / nephew_divisor * B`.
    pub nephew_divisor: f64,
    /// Maximum depth distance at which a stale block may be referenced.
    pub window: u64,
}

impl RewardSchedule {
    pub const DEFAULT_BLOCK_REWARD: f64 = 5.0;
    pub const DEFAULT_NEPHEW_DIVISOR: f64 = 36.0;
    pub const DEFAULT_WINDOW: u64 = 6;
    /// Largest lookback window accepted by
    /// [`SimulationBuilder`](crate::simulation::SimulationBuilder).
    pub const MAX_WINDOW: u64 = u32::MAX as u64;

    /// Mining reward of a newly accepted block.
    #[inline]
    pub fn mined(&self) -> f64 {
        self.block_reward
    }

    /// Nephew reward of a block referencing `uncle_count` uncles.
    #[inline]
    pub fn nephew(&self, uncle_count: usize) -> f64 {
        uncle_count as f64 / self.nephew_divisor * self.block_reward
    }

    /// Reward of an uncle at depth `uncle_depth` referenced by a block at
    /// depth `nephew_depth`. Zero outside of the lookback window.
    pub fn uncle(&self, nephew_depth: u64, uncle_depth: u64) -> f64 {
        let window = self.window as f64;
        match nephew_depth.checked_sub(uncle_depth) {
            Some(distance) if distance > 0 && distance <= self.window => {
                (window - distance as f64) / window * self.block_reward
            }
            _ => 0.0,
        }
    }

    /// Returns true if a stale block at `uncle_depth` can still be
    /// referenced by a block at `nephew_depth`.
    #[inline]
    pub fn in_window(&self, nephew_depth: u64, uncle_depth: u64) -> bool {
        uncle_depth < nephew_depth
            && nephew_depth - uncle_depth <= self.window
    }

    /// Assigns the reward a block earns at acceptance, based on the uncles
    /// currently attached to it.
    pub fn credit_block(&self, block: &mut Block) {
        block.reward.set_own(self.mined(), self.nephew(block.uncles.len()));
    }

    /// Assigns the reward `uncle` earns for being referenced by a block at
    /// `nephew_depth`.
    pub fn credit_uncle(&self, uncle: &mut Block, nephew_depth: u64) {
        uncle.reward.set_uncle(self.uncle(nephew_depth, uncle.depth));
    }
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            block_reward: Self::DEFAULT_BLOCK_REWARD,
            nephew_divisor: Self::DEFAULT_NEPHEW_DIVISOR,
            window: Self::DEFAULT_WINDOW,
        }
    }
}

/// What happens to the mining reward of a block which is pushed off the
/// canonical chain by a reorganization.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DisplacedReward {
    /// The block's `mined` reward is zeroed. Only uncle rewards remain.
    #[default]
    Forfeit,
    /// The block keeps the `mined` reward it was credited at acceptance.
    /// Aggregated revenue is unaffected; only the block's own
    /// [`RewardBreakdown::total`](crate::block::RewardBreakdown) differs.
    Retain,
}

/// Chain-wide reward totals, split by [`Producer`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RewardTotals {
    pub total: f64,
    pub total_selfish: f64,
    pub total_honest: f64,
    pub uncle_selfish: f64,
    pub uncle_honest: f64,
    pub nephew_selfish: f64,
    pub nephew_honest: f64,
    pub mined_selfish: f64,
    pub mined_honest: f64,
    /// `total_selfish` normalized by the sum of all mined rewards.
    pub share_selfish: f64,
    /// `total_honest` normalized by the sum of all mined rewards.
    pub share_honest: f64,
}

impl RewardTotals {
    /// Total reward of `producer`.
    pub fn total_of(&self, producer: Producer) -> f64 {
        match producer {
            Producer::Honest => self.total_honest,
            Producer::Selfish => self.total_selfish,
        }
    }

    /// Normalized revenue share of `producer`.
    pub fn share_of(&self, producer: Producer) -> f64 {
        match producer {
            Producer::Honest => self.share_honest,
            Producer::Selfish => self.share_selfish,
        }
    }
}

/// Sums the rewards of every canonical block (genesis excluded) and of every
/// referenced uncle, split by producer.
pub fn aggregate_rewards(chain: &Chain) -> RewardTotals {
    let mut tots = RewardTotals::default();

    for block in chain.blocks().iter().skip(1) {
        match block.producer {
            Producer::Selfish => {
                tots.mined_selfish += block.reward.mined;
                tots.nephew_selfish += block.reward.nephew;
            }
            Producer::Honest => {
                tots.mined_honest += block.reward.mined;
                tots.nephew_honest += block.reward.nephew;
            }
        }
    }

    for uncle in chain.referenced_stale() {
        match uncle.producer {
            Producer::Selfish => tots.uncle_selfish += uncle.reward.uncle,
            Producer::Honest => tots.uncle_honest += uncle.reward.uncle,
        }
    }

    tots.total_selfish =
        tots.mined_selfish + tots.nephew_selfish + tots.uncle_selfish;
    tots.total_honest =
        tots.mined_honest + tots.nephew_honest + tots.uncle_honest;
    tots.total = tots.total_selfish + tots.total_honest;

    let mined = tots.mined_selfish + tots.mined_honest;
    if mined > 0.0 {
        tots.share_selfish = tots.total_selfish / mined;
        tots.share_honest = tots.total_honest / mined;
    }

    tots
}
