//! Serve command - run the web interface.

use std::net::{IpAddr, SocketAddr};

use clap::Args;
use console::style;

use invex_core::Pipeline;

use super::load_config;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "8501")]
    port: u16,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let pipeline = Pipeline::from_config(&config)?;
    let addr = SocketAddr::new(args.host, args.port);

    println!(
        "{} Serving on http://{} (model {})",
        style("✓").green(),
        addr,
        config.gemini.model
    );

    invex_web::serve(pipeline, addr).await?;
    Ok(())
}
