use anyhow::Result;
use clap::Parser;
use dam_examples::{run_basis_pursuit, BasisPursuitConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conf = BasisPursuitConfig::parse();
    let final_tick = run_basis_pursuit(conf);

    println!("{final_tick}");

    Ok(())
}
