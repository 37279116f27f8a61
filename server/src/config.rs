//! Server configuration: defaults, INI file loading, and CLI overrides.
//!
//! Config-file parsing is explicitly an "interfaces only" concern — this module implements just
//! enough line-based `[section] key = value` parsing to satisfy the external interface without
//! pulling in a full INI crate or adding gameplay-relevant scope.

use std::net::IpAddr;
use std::path::Path;

use clap::Parser;
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub max_players: usize,
    pub max_username_len: usize,
    pub sim_tick_rate: u8,
    pub net_tick_rate: u8,
    pub port: u16,
    pub bind_ip: IpAddr,
    pub banned_ips: Vec<IpAddr>,
    pub client_timeout_net_ticks: u32,
    pub malicious_timeout_net_ticks: u32,
    pub initial_buffer_frames: u16,
    pub proximity_radius_units: i32,
    pub food_cluster_count: u32,
    pub food_points_per_cluster: u32,
    pub food_span_x: i32,
    pub food_jitter_y: i32,
    pub food_seed: u64,
    pub food_pickup_radius_units: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            max_players: 64,
            max_username_len: 16,
            sim_tick_rate: 60,
            net_tick_rate: 20,
            port: 5555,
            bind_ip: "0.0.0.0".parse().unwrap(),
            banned_ips: Vec::new(),
            client_timeout_net_ticks: 100,
            malicious_timeout_net_ticks: 200,
            initial_buffer_frames: 3,
            proximity_radius_units: 1,
            food_cluster_count: 8,
            food_points_per_cluster: 12,
            food_span_x: 200,
            food_jitter_y: 20,
            food_seed: 1,
            food_pickup_radius_units: 1,
        }
    }
}

impl ServerConfig {
    /// Load from an INI file at `path`, falling back to defaults field-by-field when the file is
    /// missing or a line can't be parsed. Unknown keys are warned about and ignored rather than
    /// treated as a fatal error.
    pub fn load(path: Option<&Path>) -> ServerConfig {
        let mut cfg = ServerConfig::default();
        let Some(path) = path else { return cfg };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("could not read config file {}: {err}; using defaults", path.display());
                return cfg;
            }
        };

        let mut in_server_section = false;
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_server_section = line.eq_ignore_ascii_case("[server]");
                continue;
            }
            if !in_server_section {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("ignoring unparseable config line: {raw_line}");
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            apply_key(&mut cfg, key, value);
        }
        cfg
    }
}

fn apply_key(cfg: &mut ServerConfig, key: &str, value: &str) {
    match key {
        "max_players" => parse_into(value, &mut cfg.max_players, key),
        "max_username_len" => parse_into(value, &mut cfg.max_username_len, key),
        "sim_tick_rate" => parse_into(value, &mut cfg.sim_tick_rate, key),
        "net_tick_rate" => parse_into(value, &mut cfg.net_tick_rate, key),
        "port" => parse_into(value, &mut cfg.port, key),
        "food_cluster_count" => parse_into(value, &mut cfg.food_cluster_count, key),
        "food_points_per_cluster" => parse_into(value, &mut cfg.food_points_per_cluster, key),
        "food_span_x" => parse_into(value, &mut cfg.food_span_x, key),
        "food_jitter_y" => parse_into(value, &mut cfg.food_jitter_y, key),
        "food_seed" => parse_into(value, &mut cfg.food_seed, key),
        "food_pickup_radius_units" => parse_into(value, &mut cfg.food_pickup_radius_units, key),
        "banned_ips" => match value.parse::<IpAddr>() {
            Ok(ip) => cfg.banned_ips.push(ip),
            Err(err) => warn!("ignoring invalid banned_ips entry {value:?}: {err}"),
        },
        _ => warn!("unknown config key {key:?}, ignoring"),
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T, key: &str)
where
    T::Err: std::fmt::Display,
{
    match value.parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(err) => warn!("ignoring invalid value for {key}: {value:?} ({err})"),
    }
}

/// CLI overrides for the server binary, matching the reference's `clap::Parser` derive idiom.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    #[arg(long, default_value = "0.0.0.0")]
    pub ip: String,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub log_file: Option<String>,
}

impl ServerArgs {
    pub fn resolve(&self) -> ServerConfig {
        let mut cfg = ServerConfig::load(self.config.as_deref().map(Path::new));
        if let Ok(ip) = self.ip.parse() {
            cfg.bind_ip = ip;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        cfg
    }
}
