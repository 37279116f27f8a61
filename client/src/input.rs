//! Translates raw input into the `Command`s the simulation understands.
//!
//! Input plumbing sits outside the deterministic contract the client and server share. The
//! external interface boundary is [`InputSource`], which only ever hands back raw button state;
//! turning that into a heading (stateful, accumulated across ticks) is [`InputManager`]'s job, one
//! layer in from the boundary.

use macroquad::prelude::*;
use shared::cmd::{Action, Command};

/// Heading change applied per tick while a turn key is held, in the `Qa` 8-bit angle space (256
/// per full turn).
const TURN_STEP: u8 = 4;

/// Raw input state for one sample, with no notion of heading or command shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawInput {
    pub turn_left: bool,
    pub turn_right: bool,
    pub boost: bool,
}

/// The external interface seam between whatever reads physical input and the simulation: nothing
/// past this trait knows or cares that macroquad exists.
pub trait InputSource {
    fn sample(&mut self) -> RawInput;
}

/// The concrete macroquad-backed input source used by the client binary. Reads raw keyboard state
/// only; contains no simulation logic.
#[derive(Debug, Default)]
pub struct MacroquadInput;

impl MacroquadInput {
    pub fn new() -> MacroquadInput {
        MacroquadInput
    }
}

impl InputSource for MacroquadInput {
    fn sample(&mut self) -> RawInput {
        RawInput {
            turn_left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            turn_right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            boost: is_key_down(KeyCode::Space),
        }
    }
}

/// Accumulates a heading from a stream of [`RawInput`] samples and packages it, plus boost state,
/// into the `Command` the simulation understands.
pub struct InputManager {
    source: Box<dyn InputSource>,
    angle: u8,
}

impl InputManager {
    pub fn new(source: Box<dyn InputSource>) -> InputManager {
        InputManager { source, angle: 0 }
    }

    /// Sample the underlying input source and produce this sim tick's command.
    pub fn sample(&mut self) -> Command {
        let raw = self.source.sample();
        if raw.turn_left {
            self.angle = self.angle.wrapping_sub(TURN_STEP);
        }
        if raw.turn_right {
            self.angle = self.angle.wrapping_add(TURN_STEP);
        }
        let action = if raw.boost { Action::Boost } else { Action::None };
        Command { angle: self.angle, speed: 255, action }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoInput;
    impl InputSource for NoInput {
        fn sample(&mut self) -> RawInput {
            RawInput::default()
        }
    }

    struct TurnRight;
    impl InputSource for TurnRight {
        fn sample(&mut self) -> RawInput {
            RawInput { turn_right: true, ..Default::default() }
        }
    }

    #[test]
    fn new_manager_starts_facing_angle_zero() {
        let mut mgr = InputManager::new(Box::new(NoInput));
        let cmd = mgr.sample();
        assert_eq!(cmd.angle, 0);
        assert_eq!(cmd.speed, 255);
    }

    #[test]
    fn turning_accumulates_angle_across_samples() {
        let mut mgr = InputManager::new(Box::new(TurnRight));
        mgr.sample();
        let cmd = mgr.sample();
        assert_eq!(cmd.angle, TURN_STEP.wrapping_mul(2));
    }
}
