//! Building/running simulations and collecting their output

use std::{collections::HashMap, num::NonZeroUsize, time::Duration};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    arbiter::{Arbiter, ArbiterReport},
    block::Producer,
    blockchain::Chain,
    miner::Miner,
    power_dist::PowerSplit,
    results::ResultsBuilder,
    reward::{aggregate_rewards, DisplacedReward, RewardSchedule, RewardTotals},
};

mod actor;
pub mod builder;

use actor::{BlockIds, MinerActor};
pub use builder::{SimulationBuildError, SimulationBuilder};

/// Container for a group of simulations which share the same miners and
/// settings. Simulations should be run using this struct's `run_all` method.
#[derive(Debug, Clone)]
pub struct SimulationGroup {
    honest_miner: Box<dyn Miner>,
    selfish_miner: Box<dyn Miner>,
    splits: Vec<PowerSplit>,
    repeat_all: NonZeroUsize,
    settings: RunSettings,
}

/// Settings shared by every run of a [`SimulationGroup`].
#[derive(Debug, Clone, Copy)]
struct RunSettings {
    target_length: NonZeroUsize,
    tick_interval: Duration,
    poll_interval: Duration,
    seed: Option<u64>,
    schedule: RewardSchedule,
    displaced_reward: DisplacedReward,
}

impl SimulationGroup {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    /// Add another power split to the group.
    pub fn add(&mut self, split: PowerSplit) {
        self.splits.push(split);
    }

    /// Returns one [`Simulation`] per run, ordered by power split and then
    /// by repetition.
    pub fn simulations(&self) -> Vec<Simulation> {
        let repeats = self.repeat_all.get();

        self.splits
            .iter()
            .flat_map(|&split| std::iter::repeat(split).take(repeats))
            .enumerate()
            .map(|(run_id, split)| Simulation {
                run_id,
                split,
                honest_miner: self.honest_miner.clone(),
                selfish_miner: self.selfish_miner.clone(),
                settings: self.settings,
            })
            .collect()
    }

    /// Executes every run of this group, in parallel when the `rayon`
    /// feature is enabled.
    pub fn run_all(self) -> Result<ResultsBuilder, SimulationError> {
        let sims = self.simulations();
        info!(runs = sims.len(), "starting simulation group");

        #[cfg(feature = "rayon")]
        let outputs: Result<Vec<_>, _> =
            sims.into_par_iter().map(Simulation::run).collect();
        #[cfg(not(feature = "rayon"))]
        let outputs: Result<Vec<_>, _> =
            sims.into_iter().map(Simulation::run).collect();

        Ok(ResultsBuilder::new(outputs?, self.repeat_all))
    }
}

/// A single run of the selfish mining game.
///
/// # Details
/// The run spawns one task per mining pool and drives the [`Arbiter`] until
/// the chain reaches the target length. Pools publish blocks over bounded
/// channels of capacity 1 and read the public chain through the arbiter's
/// [`ChainView`](crate::blockchain::ChainView) only.
#[derive(Debug, Clone)]
pub struct Simulation {
    run_id: usize,
    split: PowerSplit,
    honest_miner: Box<dyn Miner>,
    selfish_miner: Box<dyn Miner>,
    settings: RunSettings,
}

/// Contains the output data from a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// Position of the run within its [`SimulationGroup`].
    pub run_id: usize,
    pub chain: Chain,
    pub split: PowerSplit,
    /// Number of blocks each pool delivered to the arbiter.
    pub published: HashMap<Producer, usize>,
    /// Number of delivered blocks the arbiter discarded.
    pub dropped: usize,
    pub totals: RewardTotals,
    pub honest_strategy: String,
    pub selfish_strategy: String,
}

impl SimulationOutput {
    /// Number of blocks delivered by `producer`.
    pub fn published_by(&self, producer: Producer) -> usize {
        self.published.get(&producer).copied().unwrap_or_default()
    }

    /// Total number of blocks delivered by both pools.
    pub fn published_total(&self) -> usize {
        self.published.values().sum()
    }

    /// Name of the strategy followed by `producer`.
    pub fn strategy_of(&self, producer: Producer) -> &str {
        match producer {
            Producer::Honest => &self.honest_strategy,
            Producer::Selfish => &self.selfish_strategy,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("could not start the async runtime")]
    Runtime(#[from] std::io::Error),
    #[error("run {run_id} stopped at length {len}, short of the target {target}")]
    Incomplete { run_id: usize, len: usize, target: usize },
}

impl Simulation {
    #[inline]
    pub fn run_id(&self) -> usize {
        self.run_id
    }

    #[inline]
    pub fn split(&self) -> PowerSplit {
        self.split
    }

    /// Executes the run on a new current-thread runtime.
    pub fn run(self) -> Result<SimulationOutput, SimulationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        runtime.block_on(self.run_async())
    }

    /// Executes the run on the current runtime.
    pub async fn run_async(self) -> Result<SimulationOutput, SimulationError> {
        let Simulation {
            run_id,
            split,
            honest_miner,
            selfish_miner,
            settings,
        } = self;
        let honest_strategy = honest_miner.name();
        let selfish_strategy = selfish_miner.name();

        debug!(run_id, ?split, "starting run");

        let arbiter = Arbiter::new(Chain::new(
            settings.schedule,
            settings.displaced_reward,
        ));
        let ids = BlockIds::new();

        let (honest_tx, honest_rx) = mpsc::channel(1);
        let (selfish_tx, selfish_rx) = mpsc::channel(1);

        let mut tasks = Vec::with_capacity(2);
        for (miner, block_tx) in
            [(honest_miner, honest_tx), (selfish_miner, selfish_tx)]
        {
            let side = miner.side();
            let actor = MinerActor {
                power: split.power_of(side),
                rng: actor::rng_for(settings.seed, run_id, side),
                miner,
                ids: ids.clone(),
                view_rx: arbiter.subscribe(),
                block_tx,
                tick_interval: settings.tick_interval,
            };
            tasks.push(tokio::spawn(actor.run()));
        }

        let target = settings.target_length.get();
        let ArbiterReport { chain, published, dropped } = arbiter
            .run(selfish_rx, honest_rx, target, settings.poll_interval)
            .await;

        for task in tasks {
            task.abort();
        }

        if chain.len() < target {
            return Err(SimulationError::Incomplete {
                run_id,
                len: chain.len(),
                target,
            });
        }

        let totals = aggregate_rewards(&chain);
        debug!(run_id, len = chain.len(), dropped, "finished run");

        Ok(SimulationOutput {
            run_id,
            chain,
            split,
            published,
            dropped,
            totals,
            honest_strategy,
            selfish_strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    use crate::block::BlockId;

    fn group(selfish_power: u32, target: usize, seed: u64) -> SimulationGroup {
        SimulationBuilder::new()
            .selfish_power(selfish_power)
            .target_length(target)
            .tick_interval(Duration::from_millis(10))
            .poll_interval(Duration::from_millis(5))
            .seed(seed)
            .build()
            .unwrap()
    }

    async fn run_first(group: &SimulationGroup) -> SimulationOutput {
        let sim = group.simulations().remove(0);
        sim.run_async().await.unwrap()
    }

    #[test]
    fn runs_ordered_by_split_then_repeat() {
        let group = SimulationBuilder::new()
            .selfish_power_iter([100, 300])
            .repeat_all(2)
            .build()
            .unwrap();

        let runs: Vec<_> = group
            .simulations()
            .iter()
            .map(|sim| (sim.run_id(), sim.split()))
            .collect();

        assert_eq!(
            runs,
            vec![
                (0, PowerSplit::Selfish(100)),
                (1, PowerSplit::Selfish(100)),
                (2, PowerSplit::Selfish(300)),
                (3, PowerSplit::Selfish(300)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_reaches_target_length() {
        let output = run_first(&group(300, 60, 7)).await;
        let chain = &output.chain;

        assert!(chain.len() >= 60);
        for (i, block) in chain.blocks().iter().enumerate() {
            assert_eq!(block.depth, i as u64);
            if i > 0 {
                assert_eq!(block.parent_id, Some(chain.blocks()[i - 1].id));
            }
        }
        assert!(output.published_total() >= chain.len() - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reward_invariants_hold() {
        let output = run_first(&group(400, 80, 11)).await;
        let chain = &output.chain;
        let schedule = chain.schedule();

        let mined: f64 = chain.blocks().iter().map(|b| b.reward.mined).sum();
        let expected = schedule.block_reward * (chain.len() - 1) as f64;
        assert!((mined - expected).abs() < 1e-9);

        for block in chain.blocks().iter().chain(chain.referenced_stale()) {
            let r = block.reward;
            assert!((r.total - (r.mined + r.nephew + r.uncle)).abs() < 1e-9);
        }

        let mut seen = HashSet::new();
        for uncle in chain.referenced_stale() {
            assert!(seen.insert(uncle.id), "uncle {} referenced twice", uncle.id);
        }

        let referenced: Vec<BlockId> =
            chain.blocks().iter().flat_map(|b| b.uncles.clone()).collect();
        assert_eq!(referenced.len(), chain.referenced_stale().len());
        for nephew in chain.blocks() {
            assert!(nephew.uncles.len() <= crate::reward::MAX_UNCLES);
            for id in &nephew.uncles {
                let uncle = chain
                    .referenced_stale()
                    .iter()
                    .find(|u| u.id == *id)
                    .unwrap();
                assert!(schedule.in_window(nephew.depth, uncle.depth));
            }
        }

        let tots = output.totals;
        assert_eq!(tots, aggregate_rewards(chain));
        assert!((tots.total - (tots.total_selfish + tots.total_honest)).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn honest_only_network_has_no_forks() {
        let output = run_first(&group(0, 40, 3)).await;

        assert_eq!(output.published_by(Producer::Selfish), 0);
        assert_eq!(output.dropped, 0);
        assert!(output.chain.referenced_stale().is_empty());
        assert_eq!(output.totals.share_honest, 1.0);
        assert_eq!(output.strategy_of(Producer::Selfish), "Selfish");
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let group = group(350, 50, 42);
        let run = || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            runtime.block_on(run_first(&group))
        };

        let first = run();
        let second = run();

        let ids = |out: &SimulationOutput| -> Vec<_> {
            out.chain.blocks().iter().map(|b| (b.id, b.producer)).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.totals, second.totals);
        assert_eq!(first.dropped, second.dropped);
    }
}
