use clap::Parser;
use cli_support::{init_tracing, ToolConfig};
use inference::{run_predict, PredictArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = PredictArgs::parse();
    let run = args.into_run(&ToolConfig::load()?);
    let outcome = run_predict(&run)?;
    if let Some(path) = &outcome.image {
        println!("saved {}", path.display());
    }
    Ok(())
}
