use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;
use uncle_sim::prelude::*;

const GAMMA: f64 = 0.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let start = Instant::now();

    let group = SimulationBuilder::new()
        .selfish_power_iter((100..=450).step_by(50))
        .repeat_all(4)
        .target_length(500)
        .tick_interval(Duration::from_millis(2))
        .poll_interval(Duration::from_millis(1))
        .build()?;

    let results = group
        .run_all()?
        .all()
        .average(Average::Mean)
        .constant("Gamma", GAMMA)
        .mining_power_func(
            Producer::Selfish,
            "Ideal SM Revenue",
            selfish_revenue(GAMMA),
        )
        .build();

    println!("{}", results);
    println!("Elapsed time: {:.4} secs", start.elapsed().as_secs_f64());

    Ok(())
}
