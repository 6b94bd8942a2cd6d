use std::{num::NonZeroUsize, time::Duration};

use crate::{
    block::Producer,
    miner::{honest::Honest, selfish::Selfish, Miner},
    power_dist::{PowerSplit, PowerSplitError, PowerValue},
    reward::{DisplacedReward, RewardSchedule},
};

use super::{RunSettings, SimulationGroup};

/// Builds a [`SimulationGroup`].
#[derive(Debug, Default)]
pub struct SimulationBuilder {
    splits: Vec<PowerSplit>,
    repeat_all: Option<usize>,
    target_length: Option<usize>,
    tick_interval: Option<Duration>,
    poll_interval: Option<Duration>,
    seed: Option<u64>,
    schedule: Option<RewardSchedule>,
    displaced_reward: DisplacedReward,
    honest_miner: Option<Box<dyn Miner>>,
    selfish_miner: Option<Box<dyn Miner>>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SimulationBuildError {
    #[error("target chain length must be greater than 0")]
    ZeroTargetLength,
    #[error("number of repeated runs must be greater than 0")]
    ZeroRepeats,
    #[error("block reward must be positive, got {0}")]
    BadBlockReward(f64),
    #[error("nephew divisor must be positive, got {0}")]
    BadNephewDivisor(f64),
    #[error("reward window must be greater than 0")]
    ZeroWindow,
    #[error("reward window {0} exceeds the maximum {max}", max = RewardSchedule::MAX_WINDOW)]
    WindowTooLarge(u64),
    #[error(transparent)]
    PowerSplitError(#[from] PowerSplitError),
}

impl SimulationBuilder {
    /// Canonical chain length (genesis included) used when none is given.
    pub const DEFAULT_TARGET_LENGTH: usize = 1000;
    /// Time between mining attempts of a pool.
    pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);
    /// Time the arbiter sleeps when no block is pending.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Creates a new [`SimulationBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `miner` for the honest pool ([`Honest`] otherwise).
    pub fn honest_miner<M: Miner + 'static>(mut self, mut miner: M) -> Self {
        miner.set_side(Producer::Honest);
        self.honest_miner = Some(Box::new(miner));

        self
    }

    /// Use `miner` for the selfish pool ([`Selfish`] otherwise).
    pub fn selfish_miner<M: Miner + 'static>(mut self, mut miner: M) -> Self {
        miner.set_side(Producer::Selfish);
        self.selfish_miner = Some(Box::new(miner));

        self
    }

    /// Run every split `num` times.
    pub fn repeat_all(mut self, num: usize) -> Self {
        self.repeat_all = Some(num);

        self
    }

    /// Each run ends once the canonical chain holds `length` blocks,
    /// genesis included.
    pub fn target_length(mut self, length: usize) -> Self {
        self.target_length = Some(length);

        self
    }

    /// Sets the time between mining attempts of each pool.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);

        self
    }

    /// Sets the time the arbiter waits when no block is pending.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);

        self
    }

    /// Seeds the random number generators of every run.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    pub fn reward_schedule(mut self, schedule: RewardSchedule) -> Self {
        self.schedule = Some(schedule);

        self
    }

    /// Decides whether blocks pushed off the canonical chain keep their
    /// mining reward.
    pub fn displaced_reward(mut self, displaced: DisplacedReward) -> Self {
        self.displaced_reward = displaced;

        self
    }

    /// Add a run with the given split of hash power.
    pub fn power_split(mut self, split: PowerSplit) -> Self {
        self.splits.push(split);

        self
    }

    /// Add a run in which both pools have the same power (this is the
    /// default behavior).
    pub fn equal_power(self) -> Self {
        self.power_split(PowerSplit::Equal)
    }

    /// Add a run in which the selfish pool has power `value` and the honest
    /// pool has the rest.
    pub fn selfish_power(self, value: PowerValue) -> Self {
        self.power_split(PowerSplit::Selfish(value))
    }

    /// Call [`SimulationBuilder::selfish_power`] once for each element of
    /// `values`.
    pub fn selfish_power_iter<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = PowerValue>,
    {
        self.splits.extend(values.into_iter().map(PowerSplit::Selfish));

        self
    }

    /// Creates a [`SimulationGroup`] from the specified parameters.
    pub fn build(self) -> Result<SimulationGroup, SimulationBuildError> {
        use SimulationBuildError::*;

        let SimulationBuilder {
            mut splits,
            repeat_all,
            target_length,
            tick_interval,
            poll_interval,
            seed,
            schedule,
            displaced_reward,
            honest_miner,
            selfish_miner,
        } = self;

        if splits.is_empty() {
            splits.push(PowerSplit::Equal);
        }
        for split in splits.iter() {
            split.validate()?;
        }

        let repeat_all = NonZeroUsize::new(repeat_all.unwrap_or(1))
            .ok_or(ZeroRepeats)?;
        let target_length = NonZeroUsize::new(
            target_length.unwrap_or(Self::DEFAULT_TARGET_LENGTH),
        )
        .ok_or(ZeroTargetLength)?;

        let schedule = schedule.unwrap_or_default();
        if !schedule.block_reward.is_finite() || schedule.block_reward <= 0.0 {
            return Err(BadBlockReward(schedule.block_reward));
        }
        if !schedule.nephew_divisor.is_finite()
            || schedule.nephew_divisor <= 0.0
        {
            return Err(BadNephewDivisor(schedule.nephew_divisor));
        }
        if schedule.window == 0 {
            return Err(ZeroWindow);
        }
        if schedule.window > RewardSchedule::MAX_WINDOW {
            return Err(WindowTooLarge(schedule.window));
        }

        let honest_miner =
            honest_miner.unwrap_or_else(|| Box::new(Honest::new()));
        let selfish_miner =
            selfish_miner.unwrap_or_else(|| Box::new(Selfish::new()));

        Ok(SimulationGroup {
            honest_miner,
            selfish_miner,
            splits,
            repeat_all,
            settings: RunSettings {
                target_length,
                tick_interval: tick_interval
                    .unwrap_or(Self::DEFAULT_TICK_INTERVAL),
                poll_interval: poll_interval
                    .unwrap_or(Self::DEFAULT_POLL_INTERVAL),
                seed,
                schedule,
                displaced_reward,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_build() {
        let group = SimulationBuilder::new().build().unwrap();
        let sims = group.simulations();

        assert_eq!(sims.len(), 1);
        assert_eq!(sims[0].split(), PowerSplit::Equal);
    }

    #[test]
    fn miners_are_assigned_their_side() {
        let group = SimulationBuilder::new()
            .honest_miner(Selfish::new())
            .selfish_miner(Honest::new())
            .build()
            .unwrap();

        assert_eq!(group.honest_miner.side(), Producer::Honest);
        assert_eq!(group.selfish_miner.side(), Producer::Selfish);
    }

    #[test]
    fn rejects_invalid_settings() {
        type E = SimulationBuildError;

        let err = |builder: SimulationBuilder| builder.build().unwrap_err();

        assert_eq!(
            err(SimulationBuilder::new().target_length(0)),
            E::ZeroTargetLength
        );
        assert_eq!(err(SimulationBuilder::new().repeat_all(0)), E::ZeroRepeats);
        assert_eq!(
            err(SimulationBuilder::new().selfish_power(1000)),
            E::PowerSplitError(PowerSplitError::NoHonestPower)
        );

        let no_reward =
            RewardSchedule { block_reward: 0.0, ..Default::default() };
        assert_eq!(
            err(SimulationBuilder::new().reward_schedule(no_reward)),
            E::BadBlockReward(0.0)
        );

        let endless = RewardSchedule {
            block_reward: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(
            err(SimulationBuilder::new().reward_schedule(endless)),
            E::BadBlockReward(f64::INFINITY)
        );

        for divisor in [0.0, -36.0] {
            let schedule =
                RewardSchedule { nephew_divisor: divisor, ..Default::default() };
            assert_eq!(
                err(SimulationBuilder::new().reward_schedule(schedule)),
                E::BadNephewDivisor(divisor)
            );
        }
        let nan_divisor =
            RewardSchedule { nephew_divisor: f64::NAN, ..Default::default() };
        assert!(matches!(
            err(SimulationBuilder::new().reward_schedule(nan_divisor)),
            E::BadNephewDivisor(d) if d.is_nan()
        ));

        let no_window = RewardSchedule { window: 0, ..Default::default() };
        assert_eq!(
            err(SimulationBuilder::new().reward_schedule(no_window)),
            E::ZeroWindow
        );

        let huge_window =
            RewardSchedule { window: u64::MAX, ..Default::default() };
        assert_eq!(
            err(SimulationBuilder::new().reward_schedule(huge_window)),
            E::WindowTooLarge(u64::MAX)
        );

        let widest = RewardSchedule {
            window: RewardSchedule::MAX_WINDOW,
            ..Default::default()
        };
        assert!(SimulationBuilder::new().reward_schedule(widest).build().is_ok());
    }
}
