mod api;
mod cli;
mod jobs;
mod router;
mod runners;
mod startup;
mod state;
mod ticker;

use clap::Parser;
use tracing::info;

use logwarden_core::Config;

use crate::cli::{CliArgs, Command};

fn load_config() -> Config {
    logwarden_core::config::load_dotenv();
    Config::from_env()
}

async fn serve(config: Config, no_tick: bool) -> anyhow::Result<()> {
    config.log_summary();
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let tick_loop = config.scheduler.tick_loop && !no_tick;

    let state = startup::build_app_state(config).await?;
    if tick_loop {
        tokio::spawn(ticker::run_tick_loop(state.clone()));
    } else {
        info!("tick loop disabled; POST /tick or an external scheduler drives the jobs");
    }

    let app = router::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config();

    match args.command {
        Command::Serve { no_tick } => serve(config, no_tick).await,
        command => cli::dispatch(config, command).await,
    }
}
