use clap::Parser;
use log::info;

use server::config::ServerArgs;
use server::network::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();
    shared::cli::init_logging(args.log_file.as_deref());

    let config = args.resolve();

    info!("starting server on {}:{}", config.bind_ip, config.port);
    info!(
        "sim_tick_rate={}Hz net_tick_rate={}Hz max_players={}",
        config.sim_tick_rate, config.net_tick_rate, config.max_players
    );

    let mut server = Server::bind(config).await?;
    server.spawn_signal_handler();
    server.run().await?;

    info!("server shut down");
    Ok(())
}
