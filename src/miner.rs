/*!
Definitions for miner implementations

A miner is any type which implements the [`Miner`] trait. Each miner keeps
track of any internal state necessary to produce the desired strategic
behavior, and sees the public chain only through the [`ChainView`] published
by the [`Arbiter`](crate::arbiter::Arbiter).

# Examples
A miner which publishes every block it finds on the canonical head, even
during a fork.

```
use uncle_sim::prelude::*;

#[derive(Debug, Clone)]
struct Eager {
    side: Producer,
}

impl Miner for Eager {
    fn name(&self) -> String {
        "Eager".to_string()
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
            Some(id) => Action::Publish(Block::extending(id, &view.head, self.side)),
            None => Action::Wait,
        }
    }
}
```

# Built-In Strategies
- Honest Mining [`honest::Honest`]
- Selfish Mining [`selfish::Selfish`]
*/

use std::fmt::Debug;

use crate::{
    block::{Block, BlockId, Producer},
    blockchain::ChainView,
};

pub mod honest;
pub mod selfish;

/// An action taken by a miner on the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Don't publish a block.
    Wait,
    /// Publish the given block.
    Publish(Block),
    /// Publish the given blocks in order.
    PublishSet(Vec<Block>),
}

impl Action {
    /// Returns the blocks published by this action, in order.
    pub fn into_blocks(self) -> Vec<Block> {
        match self {
            Action::Wait => vec![],
            Action::Publish(block) => vec![block],
            Action::PublishSet(blocks) => blocks,
        }
    }
}

/// Defines the behavior of a mining pool.
pub trait Miner: Debug + dyn_clone::DynClone + Send + Sync {
    /// Returns the name of this miner's strategy.
    ///
    /// The return value of this method will appear in the "Strategy" columns
    /// of [`ResultsTable`](crate::results::ResultsTable).
    fn name(&self) -> String;

    /// Returns the [`Producer`] recorded on this miner's blocks.
    fn side(&self) -> Producer;

    /// Sets the [`Producer`] recorded on this miner's blocks.
    ///
    /// This method is guaranteed to be called when a [`Miner`]
    /// implementation is added to a
    /// [`SimulationBuilder`](crate::simulation::SimulationBuilder).
    fn set_side(&mut self, side: Producer);

    /// Returns the action taken by this miner in this tick.
    ///
    /// Called once per tick. `view` is the latest state published by the
    /// arbiter. `block_mined` is `Some(block_id)` if this miner found a block
    /// in the current tick, and `None` otherwise.
    fn get_action(
        &mut self,
        view: &ChainView,
        block_mined: Option<BlockId>,
    ) -> Action;
}

dyn_clone::clone_trait_object!(Miner);
