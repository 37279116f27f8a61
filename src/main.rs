//! Unified front door for the workspace: picks between running the client, the server, both at
//! once in one process, or handing off to the workspace's test/benchmark suites.

use clap::{Parser, Subcommand};
use log::{error, info};
use macroquad::prelude::Conf;

use client::config::ClientArgs;
use server::config::{ServerArgs, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the client only
    Client(ClientArgs),
    /// Run the server only
    Server(ServerArgs),
    /// Run a server and a client against it in the same process
    ClientAndServer(ClientAndServerArgs),
    /// Run the workspace's integration test suite
    Tests,
    /// Run the workspace's benchmark suite
    Benchmarks,
}

#[derive(Parser, Debug)]
struct ClientAndServerArgs {
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    #[arg(long, default_value_t = 5555)]
    port: u16,

    /// Username sent in the join request
    #[arg(long, default_value = "player")]
    name: String,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    log_file: Option<String>,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Snake Netcode - Client".to_owned(),
        window_width: 800,
        window_height: 600,
        window_resizable: true,
        ..Default::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.mode {
        Mode::Client(client_args) => {
            shared::cli::init_logging(client_args.log_file.as_deref());
            run_client(client_args.server_addr(), client_args.name)
        }
        Mode::Server(server_args) => {
            shared::cli::init_logging(server_args.log_file.as_deref());
            run_server(server_args.resolve())
        }
        Mode::ClientAndServer(both_args) => {
            shared::cli::init_logging(both_args.log_file.as_deref());
            run_client_and_server(both_args)
        }
        Mode::Tests => run_cargo_subcommand(&["test", "--test", "integration_tests"]),
        Mode::Benchmarks => run_cargo_subcommand(&["test", "--test", "benchmark_tests"]),
    }
}

/// Runs the client to completion on the calling thread. macroquad owns the event loop, so this
/// never returns while the window is open; a client-side failure logs and exits the process
/// directly rather than unwinding back through `Window::from_config`.
fn run_client(server_addr: String, name: String) -> Result<(), Box<dyn std::error::Error>> {
    info!("starting client");
    info!("connecting to {server_addr} as {name}");
    info!("controls: A/D or arrow keys to steer, Space to boost, R to reconnect");

    macroquad::Window::from_config(window_conf(), async move {
        let mut client = match client::network::Client::new() {
            Ok(client) => client,
            Err(err) => {
                error!("client init failed: {err}");
                std::process::exit(1);
            }
        };
        if let Err(err) = client.run(&server_addr, name).await {
            error!("client exited with error: {err}");
            std::process::exit(1);
        }
    });
    Ok(())
}

fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("starting server on {}:{}", config.bind_ip, config.port);
    info!(
        "sim_tick_rate={}Hz net_tick_rate={}Hz max_players={}",
        config.sim_tick_rate, config.net_tick_rate, config.max_players
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let mut server = server::network::Server::bind(config).await?;
        server.spawn_signal_handler();
        server.run().await
    })?;

    info!("server shut down");
    Ok(())
}

/// Starts the server on a background OS thread with its own `tokio` runtime, then runs the
/// client on the calling thread the same way `run_client` does. macroquad needs the main thread
/// for its window, so the server can't share it; the client's own join-retry loop covers the
/// brief window before the embedded server finishes binding.
fn run_client_and_server(args: ClientAndServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::load(args.config.as_deref().map(std::path::Path::new));
    if let Ok(ip) = args.ip.parse() {
        config.bind_ip = ip;
    }
    config.port = args.port;

    let server_addr = format!("{}:{}", args.ip, args.port);

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("embedded server runtime failed to start: {err}");
                return;
            }
        };
        runtime.block_on(async move {
            match server::network::Server::bind(config).await {
                Ok(mut server) => {
                    server.spawn_signal_handler();
                    if let Err(err) = server.run().await {
                        error!("embedded server exited with error: {err}");
                    }
                }
                Err(err) => error!("embedded server failed to bind: {err}"),
            }
        });
    });

    run_client(server_addr, args.name)
}

fn run_cargo_subcommand(cargo_args: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    let status = std::process::Command::new("cargo").args(cargo_args).status()?;
    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
