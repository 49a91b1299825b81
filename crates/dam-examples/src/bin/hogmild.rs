use anyhow::Result;
use clap::Parser;
use dam_examples::{run_hogmild, HogmildConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conf = HogmildConfig::parse();
    let (update_log, final_tick) = run_hogmild(conf);

    println!("{final_tick}");
    for sample in &update_log {
        println!("{}, {}", sample.sample_id, sample.weight_version);
    }

    Ok(())
}
