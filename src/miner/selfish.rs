//! Selfish mining implementation

use std::{cmp::Ordering, collections::VecDeque};

use tracing::trace;

use crate::{
    block::{Block, BlockId, Producer},
    blockchain::ChainView,
    miner::{Action, Miner},
};

/// Follows the selfish mining strategy described by
/// [Eyal and Sirer](https://doi.org/10.48550/arXiv.1311.0243), adapted to a
/// chain where contested tips are resolved by the
/// [`Arbiter`](crate::arbiter::Arbiter).
///
/// Found blocks are withheld on a private chain. Once the public chain
/// catches up with the oldest withheld block, the private chain is released
/// according to the lead it still holds:
/// - behind: the private chain is abandoned.
/// - tied: the newest private block is published to force a fork.
/// - one ahead: the whole private chain is published.
/// - two or more ahead: every private block at or below the public head is
///   published and the rest are kept.
#[derive(Debug, Clone)]
pub struct Selfish {
    hidden_blocks: VecDeque<Block>,
    side: Producer,
}

impl Selfish {
    /// Creates a new selfish miner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks mined but not yet published, oldest first.
    pub fn hidden_blocks(&self) -> &VecDeque<Block> {
        &self.hidden_blocks
    }

    fn release(&mut self, view: &ChainView) -> Action {
        let (Some(front), Some(back)) =
            (self.hidden_blocks.front(), self.hidden_blocks.back())
        else {
            return Action::Wait;
        };

        let public = view.head.depth;
        let (oldest, newest) = (front.depth, back.depth);
        if public < oldest {
            return Action::Wait;
        }

        match newest.cmp(&public) {
            Ordering::Less => {
                trace!(newest, public, "selfish miner abandons private chain");
                self.hidden_blocks.clear();
                Action::Wait
            }
            Ordering::Equal => {
                trace!(newest, public, "selfish miner releases tied block");
                let block = self.hidden_blocks.pop_back();
                self.hidden_blocks.clear();
                block.map_or(Action::Wait, Action::Publish)
            }
            Ordering::Greater if newest == public + 1 => {
                trace!(newest, public, "selfish miner releases private chain");
                Action::PublishSet(self.hidden_blocks.drain(..).collect())
            }
            Ordering::Greater => {
                let count = (public - oldest + 1) as usize;
                trace!(newest, public, count, "selfish miner releases blocks");
                Action::PublishSet(self.hidden_blocks.drain(..count).collect())
            }
        }
    }
}

impl Default for Selfish {
    fn default() -> Self {
        Self { hidden_blocks: VecDeque::new(), side: Producer::Selfish }
    }
}

impl Miner for Selfish {
    fn name(&self) -> String {
        "Selfish".to_string()
    }

    fn side(&self) -> Producer {
        self.side
    }

    fn set_side(&mut self, side: Producer) {
        self.side = side;
    }

    fn get_action(
        &mut self,
        view: &ChainView,
        block_mined: Option<BlockId>,
    ) -> Action {
        if let Some(block_id) = block_mined {
            let parent = match self.hidden_blocks.back() {
                Some(block) => block.to_ref(),
                None => view.tip_for(self.side),
            };
            let block = Block::extending(block_id, &parent, self.side);

            // Win an open race outright instead of withholding
            if self.hidden_blocks.is_empty() && view.fork.is_some() {
                return Action::Publish(block);
            }

            self.hidden_blocks.push_back(block);
        }

        self.release(view)
    }
}
