//! # Game Server Library
//!
//! The authoritative server for the networked snake simulation. It owns the canonical
//! [`shared::world::World`], drives it at a fixed tick rate, and is the single source of truth
//! every client reconciles against.
//!
//! ## Module Organization
//!
//! ### Config (`config`)
//! Startup configuration: defaults, INI file loading, and CLI overrides via `clap`.
//!
//! ### Client Manager (`client_manager`)
//! Per-client bookkeeping: the connected-client table, the command-buffer-fullness window used
//! by the CBF control loop, and the malicious/banned address tables.
//!
//! ### Tick (`tick`)
//! The fixed-rate tick driver shared by the simulation and network loops.
//!
//! ### Network (`network`)
//! The server session itself: socket I/O, message dispatch, the CBF control loop, and the
//! per-tick world step. Single-threaded cooperative — one task owns the socket, the client
//! table, and the world outright, so there is no cross-task locking anywhere in this crate.

pub mod client_manager;
pub mod config;
pub mod network;
pub mod tick;
