use anyhow::Result;
use clap::Parser;
use dam_examples::{run_gemv, GemvConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conf = GemvConfig::parse();
    let (results, final_tick) = run_gemv(conf);

    println!("{final_tick}");
    for (row, value) in results.iter().enumerate() {
        println!("{row}, {value}");
    }

    Ok(())
}
