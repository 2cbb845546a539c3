use args::Args;
use clap::Parser;
use config::Config;
use tokio_util::sync::CancellationToken;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    config.validate()?;

    let listen_address = args
        .listen
        .unwrap_or_else(|| config.server.listen_address_or_default());

    let shutdown_signal = CancellationToken::new();

    tokio::spawn({
        let shutdown_signal = shutdown_signal.clone();

        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received, shutting down");
                shutdown_signal.cancel();
            }
        }
    });

    server::serve(server::ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await
}
