//! Honest mining strategy

use crate::{
    block::{Block, BlockId, Producer},
    blockchain::ChainView,
    miner::{Action, Miner},
};

/// Publishes every block as soon as it is found, on the tip of the branch its
/// own side is mining on.
#[derive(Debug, Default, Clone)]
pub struct Honest {
    side: Producer,
}

impl Honest {
    /// Creates a new honest miner.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Miner for Honest {
    fn name(&self) -> String {
        "Honest".to_string()
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
        match block_mined {
            Some(block_id) => {
                let parent = view.tip_for(self.side);
                let mut block = Block::extending(block_id, &parent, self.side);
                view.schedule.credit_block(&mut block);

                Action::Publish(block)
            }
            None => Action::Wait,
        }
    }
}
