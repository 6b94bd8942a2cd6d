/*!
Re-export of common values and datatypes used for running and analyzing
simulations. Must be imported manually.

```
use uncle_sim::prelude::*;
```
*/

use crate::{
    arbiter, block, blockchain, miner, power_dist, results, reward, simulation,
};

pub use arbiter::{Arbiter, ForkContext, Outcome};

pub use block::{Block, BlockId, BlockRef, Producer, RewardBreakdown};

pub use blockchain::{Chain, ChainView, ForkView, LedgerError};

pub use miner::{honest::Honest, selfish::Selfish, Action, Miner};

pub use power_dist::{PowerSplit, PowerSplitError, PowerValue, POWER_TOTAL};

pub use results::{
    selfish_revenue, Average, ChainDump, Format, ResultsBuilder, ResultsTable,
};

pub use reward::{
    aggregate_rewards, DisplacedReward, RewardSchedule, RewardTotals,
};

pub use simulation::{
    Simulation, SimulationBuildError, SimulationBuilder, SimulationError,
    SimulationGroup, SimulationOutput,
};
