//! # Game Client Library
//!
//! The client half of the networked snake simulation: client-side prediction of the locally
//! owned snake, reconciliation against the server's authoritative head updates, and rendering of
//! every visible snake.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! [`config::ClientArgs`] — the `clap`-derived CLI surface (`--ip`/`--port`/`--name`/`--log-file`).
//!
//! ### Game Module (`game`)
//! [`ClientGameState`](game::ClientGameState) — the predicted-and-reconciled owned snake plus
//! rendering-only tracking of every other visible snake.
//!
//! ### Input Module (`input`)
//! [`input::InputSource`] is the external-interface trait (raw button state only);
//! [`input::MacroquadInput`] is its concrete implementation. [`input::InputManager`] sits one
//! layer in from that boundary, turning a stream of raw samples into `shared::cmd::Command`.
//!
//! ### Network Module (`network`)
//! The session state machine (`Disconnected` / `Joining` / `Connected`), the per-net-tick
//! `Commands` packing and resend cycle, and dispatch of inbound `SnakeHead` / `Feedback` /
//! `JoinAccept` messages into [`game::ClientGameState`].
//!
//! ### Rendering Module (`rendering`)
//! [`rendering::Renderer`] is the external-interface trait (`render(&self, view: &RenderView)`);
//! [`rendering::MacroquadRenderer`] is its concrete implementation, containing no simulation
//! logic of its own.
//!
//! ## Design Philosophy
//!
//! ### Deterministic Simulation
//! The client runs the exact same fixed-point snake stepping as the server, from the shared
//! crate, so replaying commands during reconciliation reproduces the server's result exactly.
//!
//! ### Responsiveness First
//! Locally issued commands are applied to the owned snake immediately; the client never waits
//! for a server round trip before showing the result of player input.

pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
