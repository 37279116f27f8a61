//! Client-side game state: the locally predicted snake plus reconciliation against the server's
//! authoritative head updates, and lightweight tracking of every other visible snake for
//! rendering.
//!
//! Unlike the server, the client never runs [`shared::world::World`] — it has no reason to assign
//! snake ids or manage food clusters, and only ever simulates the one snake it owns. Every other
//! snake is rendering state only: the last few heads the server reported, interpolated between
//! net ticks rather than simulated.

use std::collections::HashMap;

use shared::cmd::Command;
use shared::fixed::QwPos;
use shared::snake::{BezierHandle, Snake};
use shared::wrap::u16_lt_wrap;

/// How many recent head samples a remote snake keeps for interpolation.
const REMOTE_SAMPLE_CAP: usize = 4;

/// A remote (non-owned) snake's rendering trail: just enough recent server-reported heads to
/// interpolate motion smoothly between net ticks instead of snapping.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnake {
    samples: Vec<(u16, BezierHandle)>,
}

impl RemoteSnake {
    fn push_sample(&mut self, frame: u16, head: BezierHandle) {
        if let Some(&(last_frame, _)) = self.samples.last() {
            if !u16_lt_wrap(last_frame, frame) {
                return; // stale or duplicate relative to what we've already seen
            }
        }
        self.samples.push((frame, head));
        if self.samples.len() > REMOTE_SAMPLE_CAP {
            self.samples.remove(0);
        }
    }

    pub fn latest(&self) -> Option<BezierHandle> {
        self.samples.last().map(|(_, h)| *h)
    }

    /// The two most recent samples, oldest first, for linear interpolation between them.
    pub fn interpolation_pair(&self) -> Option<(BezierHandle, BezierHandle)> {
        if self.samples.len() < 2 {
            return None;
        }
        let n = self.samples.len();
        Some((self.samples[n - 2].1, self.samples[n - 1].1))
    }
}

/// The client's view of the world: its own predicted-and-reconciled snake, and everyone else it
/// currently has visibility into.
pub struct ClientGameState {
    pub own_snake_id: u16,
    pub own_snake: Snake,
    others: HashMap<u16, RemoteSnake>,
}

impl ClientGameState {
    pub fn new(own_snake_id: u16, spawn: QwPos, frame: u16) -> ClientGameState {
        ClientGameState { own_snake_id, own_snake: Snake::spawn(spawn, frame), others: HashMap::new() }
    }

    /// Record a locally-issued command and step the predicted snake forward by it immediately,
    /// so input feels instant rather than waiting for a server round trip.
    pub fn predict_local_command(&mut self, frame: u16, cmd: Command, sim_tick_rate: u8) {
        self.own_snake.cmdq.put(cmd, frame);
        let stale = self.own_snake.step(cmd, sim_tick_rate, frame);
        let pivot = self.own_snake.head_ack.map(|(f, _)| f).unwrap_or(frame);
        self.own_snake.remove_stale_segments_with_rollback_constraint(pivot, stale);
    }

    /// Every locally-recorded command strictly newer than `since_frame`, oldest first.
    pub fn commands_since(&self, since_frame: u16) -> Vec<(u16, Command)> {
        self.own_snake.cmdq.iter().filter(|(frame, _)| u16_lt_wrap(since_frame, *frame)).collect()
    }

    /// Apply a server-reported head for `snake_id` at `frame`. For the owned snake this is the
    /// reconciliation step: stale updates (at or before the last ack) are dropped, and anything
    /// newer rolls the snake back to the server's head and replays every command since. For any
    /// other snake it is purely a rendering sample.
    pub fn apply_snake_head(&mut self, snake_id: u16, frame: u16, head: BezierHandle, sim_tick_rate: u8) {
        if snake_id == self.own_snake_id {
            if let Some((ack_frame, _)) = self.own_snake.head_ack {
                if !u16_lt_wrap(ack_frame, frame) {
                    return;
                }
            }
            self.own_snake.rollback_and_replay(frame, head, sim_tick_rate);
            self.own_snake.cmdq.discard_through(frame);
        } else {
            self.others.entry(snake_id).or_default().push_sample(frame, head);
        }
    }

    /// Drop a remote snake the server has stopped reporting (left proximity range, or
    /// disconnected). No-op for the owned snake.
    pub fn forget_snake(&mut self, snake_id: u16) {
        if snake_id != self.own_snake_id {
            self.others.remove(&snake_id);
        }
    }

    pub fn remote_snakes(&self) -> impl Iterator<Item = (u16, &RemoteSnake)> {
        self.others.iter().map(|(id, r)| (*id, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::cmd::Action;
    use shared::fixed::Qw;

    fn straight() -> Command {
        Command { angle: 0, speed: 255, action: Action::None }
    }

    #[test]
    fn predicted_command_moves_the_owned_snake() {
        let mut game = ClientGameState::new(7, QwPos::ZERO, 0);
        let before = game.own_snake.head.pos;
        game.predict_local_command(1, straight(), 60);
        assert_ne!(game.own_snake.head.pos, before);
    }

    #[test]
    fn stale_head_update_is_dropped() {
        let mut game = ClientGameState::new(1, QwPos::ZERO, 0);
        for f in 1..=10u16 {
            game.predict_local_command(f, straight(), 60);
        }
        game.apply_snake_head(1, 5, game.own_snake.head, 60);
        let ack_after_first = game.own_snake.head_ack;
        game.apply_snake_head(1, 3, BezierHandle::new(QwPos::ZERO, Default::default(), 1), 60);
        assert_eq!(game.own_snake.head_ack, ack_after_first);
    }

    #[test]
    fn newer_head_update_reconciles_and_trims_cmdq() {
        let mut game = ClientGameState::new(1, QwPos::ZERO, 0);
        for f in 1..=10u16 {
            game.predict_local_command(f, straight(), 60);
        }
        let server_head = game.own_snake.head;
        game.apply_snake_head(1, 10, server_head, 60);
        assert_eq!(game.own_snake.head_ack, Some((10, server_head)));
        assert!(game.own_snake.cmdq.is_empty());
    }

    #[test]
    fn other_snakes_are_tracked_separately_from_own() {
        let mut game = ClientGameState::new(1, QwPos::ZERO, 0);
        let head = BezierHandle::new(QwPos::new(Qw::from_int(3), Qw::ZERO), Default::default(), 1);
        game.apply_snake_head(2, 1, head, 60);
        let remote = game.remote_snakes().find(|(id, _)| *id == 2).unwrap().1;
        assert_eq!(remote.latest(), Some(head));
        assert_eq!(game.own_snake.head_ack, None);
    }

    #[test]
    fn forget_snake_removes_only_remote_entries() {
        let mut game = ClientGameState::new(1, QwPos::ZERO, 0);
        let head = BezierHandle::new(QwPos::ZERO, Default::default(), 1);
        game.apply_snake_head(2, 1, head, 60);
        game.forget_snake(2);
        assert!(game.remote_snakes().next().is_none());
        game.forget_snake(1); // no-op, owned snake is never forgotten
        assert_eq!(game.own_snake_id, 1);
    }
}
