use anyhow::Result;
use clap::Parser;
use deep_research_rs::cli::Args;
use deep_research_rs::launch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.into_config()?;
    let request = args.launch_request()?;

    let level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("deep_research_rs={}", level).parse()?),
        )
        .with_target(false)
        .init();

    launch(&config, request).await
}
