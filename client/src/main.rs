//! Client application entry point

mod config;
mod game;
mod input;
mod network;
mod rendering;

use clap::Parser;
use config::ClientArgs;
use log::info;
use macroquad::prelude::*;

/// Configures the game window
fn window_conf() -> Conf {
    Conf {
        window_title: "Snake Netcode - Client".to_owned(),
        window_width: 800,
        window_height: 600,
        window_resizable: true,
        ..Default::default()
    }
}

/// Main client application entry point
#[macroquad::main(window_conf)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClientArgs::parse();
    shared::cli::init_logging(args.log_file.as_deref());

    info!("starting client");
    info!("connecting to {} as {}", args.server_addr(), args.name);
    info!("controls: A/D or arrow keys to steer, Space to boost, R to reconnect");

    let mut client = network::Client::new()?;
    client.run(&args.server_addr(), args.name.clone()).await?;

    Ok(())
}
