use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use relaychat::{
    cli::{Cli, Command},
    client,
    config::{Config, BIND_INTERFACE},
    relay::Relay,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server => {
            let config = Config::default();
            let relay = Relay::bind(
                (BIND_INTERFACE, config.chat_port),
                (BIND_INTERFACE, config.feed_port),
            )
            .await?;
            info!("chat endpoint listening on {}", relay.chat_addr()?);
            info!("feed endpoint listening on {}", relay.feed_addr()?);
            if let Err(err) = relay.run_until_ctrl_c().await {
                warn!("relay exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => {
            let config = Config::load(args.config_file.as_deref())?;
            client::run(args, config).await?;
        }
    }

    Ok(())
}
