/*!
Simulator for selfish mining against a blockchain which rewards stale blocks.

Two mining pools, one honest and one selfish, race to extend a shared chain.
Stale blocks which lose a race can still be referenced as uncles by later
canonical blocks, earning a reward which decays with distance, while the
referencing block earns a small nephew bonus. Runs report how the total
reward was split between the pools.

```no_run
use uncle_sim::prelude::*;

let results = SimulationBuilder::new()
    .selfish_power_iter((25..=40).step_by(5).map(|p| p * 10))
    .repeat_all(4)
    .build()
    .unwrap()
    .run_all()
    .unwrap()
    .all()
    .average(Average::Mean)
    .build();

println!("{}", results);
```
*/

pub mod arbiter;
pub mod block;
pub mod blockchain;
pub mod miner;
pub mod power_dist;
pub mod prelude;
pub mod results;
pub mod reward;
pub mod simulation;

pub(crate) mod utils;
