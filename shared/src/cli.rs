//! The pieces of the CLI surface every binary shares: which role a process takes on, and how it
//! bootstraps logging. Per-crate argument structs (`ServerArgs`, `ClientArgs`) live next to the
//! code that consumes them; this module only holds what's genuinely common.

use clap::ValueEnum;

/// Which role a process takes on. The combined front-door binary parses this to decide which
/// session(s) to start; the standalone `client`/`server` binaries each pin one variant implicitly.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Client,
    Server,
    ClientAndServer,
    Tests,
    Benchmarks,
}

/// Initializes `env_logger`, matching the reference's logging idiom, redirecting output to
/// `log_file` when given instead of stderr. Falls back to stderr with a warning if the file can't
/// be opened, rather than treating that as fatal.
pub fn init_logging(log_file: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(path) = log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => {
                eprintln!("could not open log file {path:?}: {err}; logging to stderr instead");
            }
        }
    }
    builder.init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }
}
