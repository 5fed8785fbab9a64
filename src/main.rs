use anyhow::Context;
use clap::Parser;
use gridcore::{Function, GridConfig, LocalGrid};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runs a set of in-process grid members behind the function REST endpoint.
#[derive(Debug, Parser)]
#[command(name = "gridcore", version, about)]
struct Args {
    /// JSON configuration file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated member names
    #[arg(long, value_delimiter = ',')]
    members: Vec<String>,

    /// Address the REST endpoint binds to
    #[arg(long)]
    bind: Option<String>,
}

impl Args {
    fn grid_config(&self) -> anyhow::Result<GridConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                GridConfig::from_json_str(&raw)?
            }
            None => GridConfig::new(),
        };
        if !self.members.is_empty() {
            config = config.members(self.members.iter().cloned());
        }
        if let Some(bind) = &self.bind {
            config = config.bind_address(bind);
        }
        if config.members.is_empty() {
            config = config.members(["m1", "m2", "m3", "m4"]);
        }
        config.validate()?;
        Ok(config)
    }
}

fn builtin_functions() -> Vec<Function> {
    vec![
        Function::new("ping", |ctx| ctx.result_sender().last_result(ctx.member())),
        Function::new("echo", |ctx| {
            ctx.result_sender()
                .last_result(ctx.arguments().cloned().unwrap_or_default())
        })
        .with_ha(false),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().grid_config()?;
    let addr = config.socket_addr()?;

    let grid = LocalGrid::start(config).await?;
    for function in builtin_functions() {
        grid.register_function(function)?;
    }

    let served = gridcore::web::serve(addr, grid.router());
    tokio::select! {
        result = served => result.context("REST endpoint failed")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    let released = grid.shutdown()?;
    tracing::info!(released, "grid stopped");
    Ok(())
}
