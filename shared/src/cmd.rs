//! Per-snake command queue: an append-only, frame-tagged buffer of player inputs.
//!
//! Inputs arrive over the network out of order relative to the simulation's needs, and the
//! simulation must keep stepping even when a batch is late. `CommandQueue` enforces a single
//! invariant — new commands may only be appended at exactly `first_frame + count` — and offers
//! two read strategies: a destructive one that advances the queue's base frame
//! ([`CommandQueue::take_or_predict`]) and a peeking one that does not
//! ([`CommandQueue::find_or_predict`]).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::wrap::u16_lt_wrap;

/// What a snake does on a given frame beyond turning and moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Action {
    #[default]
    None,
    Boost,
    Shoot,
    Split,
}

/// A single frame's player input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Command {
    pub angle: u8,
    pub speed: u8,
    pub action: Action,
}

/// Frame-tagged, append-only ring of commands for one snake.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    first_frame: u16,
    commands: VecDeque<Command>,
    last_command_read: Command,
}

impl Default for CommandQueue {
    fn default() -> Self {
        CommandQueue {
            first_frame: 0,
            commands: VecDeque::new(),
            last_command_read: Command::default(),
        }
    }
}

impl CommandQueue {
    pub fn new() -> CommandQueue {
        CommandQueue::default()
    }

    pub fn count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn first_frame(&self) -> u16 {
        self.first_frame
    }

    pub fn last_command_read(&self) -> Command {
        self.last_command_read
    }

    /// Append `cmd` for `frame`. No-op unless the queue is empty or `frame` is exactly the next
    /// contiguous frame after the current tail.
    pub fn put(&mut self, cmd: Command, frame: u16) {
        if self.commands.is_empty() {
            self.first_frame = frame;
            self.commands.push_back(cmd);
            return;
        }
        let expected = self.first_frame.wrapping_add(self.commands.len() as u16);
        if frame == expected {
            self.commands.push_back(cmd);
        }
    }

    /// Returns the command at `frame` if present, peeking at the newest entry otherwise (or
    /// `last_command_read` if the queue is empty). The newest committed command is the
    /// best-available prediction once the requested frame is beyond what the queue holds.
    pub fn find_or_predict(&self, frame: u16) -> Command {
        if self.commands.is_empty() {
            return self.last_command_read;
        }
        if u16_lt_wrap(frame, self.first_frame) {
            return self.last_command_read;
        }
        let offset = frame.wrapping_sub(self.first_frame) as usize;
        match self.commands.get(offset) {
            Some(cmd) => *cmd,
            None => *self.commands.back().unwrap(),
        }
    }

    /// Destructively advance the queue up to and including `frame`, returning the command
    /// applied to `frame`. Drops everything at or before `frame`; if `frame` precedes the
    /// queue's base, returns `last_command_read` without modifying anything.
    pub fn take_or_predict(&mut self, frame: u16) -> Command {
        if u16_lt_wrap(frame, self.first_frame) {
            return self.last_command_read;
        }
        let mut taken = self.last_command_read;
        loop {
            let Some(front) = self.commands.front().copied() else {
                break;
            };
            taken = front;
            self.commands.pop_front();
            self.last_command_read = front;
            let consumed_frame = self.first_frame;
            self.first_frame = self.first_frame.wrapping_add(1);
            if consumed_frame == frame {
                return taken;
            }
        }
        // Queue ran dry before reaching `frame`: repeat the last taken command as the prediction.
        self.last_command_read = taken;
        taken
    }

    /// Drops all commands with frame `<= frame` without returning anything, used after a
    /// reconciliation accept on the client to forget commands the server has confirmed.
    pub fn discard_through(&mut self, frame: u16) {
        while let Some(front) = self.commands.front().copied() {
            if u16_lt_wrap(frame, self.first_frame) {
                break;
            }
            self.last_command_read = front;
            self.commands.pop_front();
            self.first_frame = self.first_frame.wrapping_add(1);
        }
    }

    /// Iterate remaining commands in frame order, yielding `(frame, command)`.
    pub fn iter(&self) -> impl Iterator<Item = (u16, Command)> + '_ {
        self.commands
            .iter()
            .enumerate()
            .map(move |(i, cmd)| (self.first_frame.wrapping_add(i as u16), *cmd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(angle: u8) -> Command {
        Command { angle, speed: 200, action: Action::None }
    }

    #[test]
    fn put_on_empty_queue_sets_first_frame() {
        let mut q = CommandQueue::new();
        q.put(cmd(1), 100);
        assert_eq!(q.first_frame(), 100);
        assert_eq!(q.count(), 1);
    }

    #[test]
    fn put_rejects_noncontiguous_frame() {
        let mut q = CommandQueue::new();
        q.put(cmd(1), 100);
        q.put(cmd(2), 102); // not 101, rejected
        assert_eq!(q.count(), 1);
        q.put(cmd(2), 101);
        assert_eq!(q.count(), 2);
    }

    #[test]
    fn sequential_puts_then_take_or_predict_in_order() {
        let mut q = CommandQueue::new();
        for i in 0..5u8 {
            q.put(cmd(i), 10 + i as u16);
        }
        assert_eq!(q.count(), 5);
        for i in 0..5u8 {
            let taken = q.take_or_predict(10 + i as u16);
            assert_eq!(taken, cmd(i));
            assert_eq!(q.count(), 4 - i as usize);
        }
    }

    #[test]
    fn take_or_predict_before_first_frame_is_noop() {
        let mut q = CommandQueue::new();
        q.put(cmd(9), 50);
        let before = q.count();
        let result = q.take_or_predict(40);
        assert_eq!(result, Command::default());
        assert_eq!(q.count(), before);
    }

    #[test]
    fn take_or_predict_past_tail_repeats_last_command() {
        let mut q = CommandQueue::new();
        q.put(cmd(7), 10);
        let result = q.take_or_predict(15);
        assert_eq!(result, cmd(7));
        assert!(q.is_empty());
        // Further prediction keeps repeating it.
        assert_eq!(q.take_or_predict(20), cmd(7));
    }

    #[test]
    fn find_or_predict_does_not_mutate_queue() {
        let mut q = CommandQueue::new();
        q.put(cmd(1), 10);
        q.put(cmd(2), 11);
        assert_eq!(q.find_or_predict(10), cmd(1));
        assert_eq!(q.find_or_predict(11), cmd(2));
        assert_eq!(q.count(), 2);
        // Beyond the tail, predicts the newest entry.
        assert_eq!(q.find_or_predict(50), cmd(2));
    }

    #[test]
    fn discard_through_drops_acked_prefix() {
        let mut q = CommandQueue::new();
        for i in 0..5u8 {
            q.put(cmd(i), 10 + i as u16);
        }
        q.discard_through(12);
        assert_eq!(q.first_frame(), 13);
        assert_eq!(q.count(), 2);
    }
}
