//! Mining pool tasks

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::{
    block::{Block, BlockId, Producer},
    blockchain::ChainView,
    miner::Miner,
    power_dist::{PowerValue, POWER_TOTAL},
};

/// Hands out unique [`BlockId`]s to every pool of a run. Id 0 belongs to the
/// genesis block.
#[derive(Debug, Clone)]
pub(crate) struct BlockIds(Arc<AtomicU64>);

impl BlockIds {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU64::new(BlockId::GENESIS.get() + 1)))
    }

    pub(crate) fn next(&self) -> BlockId {
        BlockId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Returns the random number generator of `side` in run `run_id`.
pub(crate) fn rng_for(
    seed: Option<u64>,
    run_id: usize,
    side: Producer,
) -> StdRng {
    match seed {
        Some(seed) => {
            let stream = 2 * run_id as u64 + side.is_selfish() as u64;
            StdRng::seed_from_u64(seed.wrapping_add(stream))
        }
        None => StdRng::from_entropy(),
    }
}

/// A mining pool: tries to find a block once per tick and forwards whatever
/// its [`Miner`] publishes to the arbiter.
#[derive(Debug)]
pub(crate) struct MinerActor {
    pub(crate) miner: Box<dyn Miner>,
    pub(crate) power: PowerValue,
    pub(crate) rng: StdRng,
    pub(crate) ids: BlockIds,
    pub(crate) view_rx: watch::Receiver<ChainView>,
    pub(crate) block_tx: mpsc::Sender<Block>,
    pub(crate) tick_interval: Duration,
}

impl MinerActor {
    /// Mines until the arbiter stops receiving blocks.
    pub(crate) async fn run(mut self) {
        let side = self.miner.side();

        while !self.block_tx.is_closed() {
            tokio::time::sleep(self.tick_interval).await;

            let found = self.rng.gen_range(0..POWER_TOTAL) < self.power;
            let block_id = found.then(|| self.ids.next());

            let view = *self.view_rx.borrow();
            let blocks = self.miner.get_action(&view, block_id).into_blocks();

            for block in blocks {
                trace!(%side, id = %block.id, depth = block.depth, "publishing");
                if self.block_tx.send(block).await.is_err() {
                    return;
                }
            }
        }
    }
}
