//! # Networked Snake Simulation — Shared Library
//!
//! This crate holds everything the client and server sessions both need to agree on bit-for-bit:
//! the deterministic fixed-point math, the snake body simulation, the command queue, the wire
//! protocol, and the authoritative world model. Nothing in here touches a socket, a clock, or a
//! terminal — those live in `server` and `client`.
//!
//! ## Determinism
//!
//! The server and every client run the exact same [`snake::Snake::step`] on the exact same
//! [`fixed::Qw`]/[`fixed::Qa`] types. No floating-point trigonometry and no platform-dependent
//! rounding crosses into the simulation path; the only place `f64` appears is at the edges
//! (constructing constants, and the non-deterministic rendering-facing bézier sampling in
//! [`snake::Snake::sampled_points`]).
//!
//! ## Module map
//!
//! - [`wrap`] — wrapping comparisons for `u16` frame numbers and `u8` angles.
//! - [`fixed`] — `Qw`/`Qa`/`QwPos`/`QwAabb` and the cosine lookup table.
//! - [`cmd`] — `Command`, `Action`, and the per-snake `CommandQueue`.
//! - [`snake`] — `BezierHandle`, `SnakeParam`, and the `Snake` step/rollback algorithm.
//! - [`food`] — deterministic food cluster placement.
//! - [`world`] — the authoritative `World` (snake table + food).
//! - [`net_addr`] — hashable, opaque peer-address blob.
//! - [`protocol`] — message types, payloads, and datagram framing.
//! - [`error`] — `NetcodeError`, shared by both sessions.
//! - [`cli`] — the `Mode` selector and the `env_logger` bootstrap every binary shares.

pub mod cli;
pub mod cmd;
pub mod error;
pub mod fixed;
pub mod food;
pub mod net_addr;
pub mod protocol;
pub mod snake;
pub mod wrap;
pub mod world;
