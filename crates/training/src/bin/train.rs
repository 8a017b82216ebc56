use clap::Parser;
use cli_support::{init_tracing, ToolConfig};
use training::util::{run_train, validate_backend_choice, TrainArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = TrainArgs::parse();
    validate_backend_choice(args.backend)?;
    let run = args.into_run(&ToolConfig::load()?);
    let outcome = run_train(&run)?;
    println!("best weights: {}", outcome.best.display());
    Ok(())
}
