//! Command-line arguments for the client binary.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// Server address to join
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,

    #[arg(long, default_value_t = 5555)]
    pub port: u16,

    /// Username sent in the join request
    #[arg(long, default_value = "player")]
    pub name: String,

    #[arg(long)]
    pub log_file: Option<String>,
}

impl ClientArgs {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
