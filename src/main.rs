use clap::Parser;
use netguard::cli::{run_predict, run_train, Cli, Commands};
use netguard::logging::init_logging_simple;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Train => run_train(&cli.config_dir).await?,
        Commands::Predict {
            bundle,
            input,
            output,
        } => {
            init_logging_simple();
            run_predict(bundle, input, output.as_deref())?;
        }
    }
    Ok(())
}
