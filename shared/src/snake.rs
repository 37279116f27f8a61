//! Deterministic snake body representation and the fixed-timestep step algorithm.
//!
//! A snake's body is a deque of committed bézier handles (tail at the front, most recently
//! committed at the back) plus a live `head` that moves continuously every tick. Once the head
//! has traveled `param.segment_length` past the last committed handle, that position is frozen
//! into a new handle and the tail is allowed to go stale by the same amount, keeping the body's
//! total arc length near `param.length_target`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cmd::{Action, Command, CommandQueue};
use crate::fixed::{Qa, Qw, QwAabb, QwPos};
use crate::wrap::u16_le_wrap;

/// A control point on the snake's spline: position, heading, and the forward/backward tangent
/// magnitudes used to interpolate a smooth curve between neighboring handles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierHandle {
    pub pos: QwPos,
    pub angle: Qa,
    pub len_forwards: u8,
    pub len_backwards: u8,
}

impl BezierHandle {
    pub fn new(pos: QwPos, angle: Qa, tangent: u8) -> BezierHandle {
        BezierHandle { pos, angle, len_forwards: tangent, len_backwards: tangent }
    }

    fn direction(&self) -> QwPos {
        QwPos::new(self.angle.cos_qw(), self.angle.sin_qw())
    }
}

/// A committed handle plus the frame at which it was committed, used internally so rollback
/// trimming can identify "the segment containing `head_ack`" without a separate frame index.
#[derive(Debug, Clone, Copy)]
struct Segment {
    handle: BezierHandle,
    committed_frame: u16,
    aabb: QwAabb,
}

/// Mutable simulation parameters derived from upgrades and food eaten. Recomputed every sim-tick
/// rather than stored across frames, so it never drifts from `(upgrades, food_eaten)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnakeParam {
    pub length_target: Qw,
    pub turn_speed: u8,
    pub forward_speed: Qw,
    pub boost_multiplier: Qw,
    pub segment_length: Qw,
}

impl SnakeParam {
    /// Deterministic, monotonic derivation: longer/better-fed snakes turn a little slower and
    /// grow a little longer, but never divide by a value that can be zero.
    pub fn from_upgrades(upgrades: u16, food_eaten: u32) -> SnakeParam {
        let base_length = Qw::from_int(20);
        let growth = Qw::from_f64(food_eaten as f64 * 0.25);
        let length_target = base_length.add(growth);

        let turn_speed = 90u8.saturating_sub((upgrades / 4).min(60) as u8).max(20);
        let forward_speed = Qw::from_int(6).add(Qw::from_f64((upgrades as f64) * 0.05));
        let boost_multiplier = Qw::from_f64(1.6);
        let segment_length = Qw::from_f64(0.5);

        SnakeParam {
            length_target,
            turn_speed,
            forward_speed,
            boost_multiplier,
            segment_length,
        }
    }
}

/// A complete snake: live head, committed body, simulation parameters, pending command queue,
/// and (server-side) a hold gate that keeps the snake from stepping until the server catches up
/// to the client's first command frame.
#[derive(Debug, Clone)]
pub struct Snake {
    pub head: BezierHandle,
    /// Last server-acknowledged head and the frame it was acknowledged at. Client-only; always
    /// `None` on the server.
    pub head_ack: Option<(u16, BezierHandle)>,
    data: VecDeque<Segment>,
    pub param: SnakeParam,
    pub cmdq: CommandQueue,
    pub hold_until_frame: Option<u16>,
    pub upgrades: u16,
    pub food_eaten: u32,
    /// Total number of bézier handles ever committed, including the spawn handle. Used as the
    /// wire `handle_index` high-water mark so a session only broadcasts handles a peer hasn't
    /// seen yet rather than the whole body every tick.
    pub handles_committed: u32,
    overall_aabb: QwAabb,
}

impl Snake {
    pub fn spawn(spawn: QwPos, frame: u16) -> Snake {
        let head = BezierHandle::new(spawn, Qa::ZERO, 1);
        Snake {
            head,
            head_ack: None,
            data: VecDeque::new(),
            param: SnakeParam::from_upgrades(0, 0),
            cmdq: CommandQueue::new(),
            hold_until_frame: None,
            upgrades: 0,
            food_eaten: 0,
            handles_committed: 0,
            overall_aabb: QwAabb::from_point(spawn),
        }
        .tap_commit_frame(frame)
    }

    // Records the spawn frame as the first committed segment's frame so rollback trimming has a
    // sane lower bound before any real handle exists.
    fn tap_commit_frame(mut self, frame: u16) -> Self {
        self.data.push_back(Segment {
            handle: self.head,
            committed_frame: frame,
            aabb: self.overall_aabb,
        });
        self.handles_committed += 1;
        self
    }

    pub fn committed_handles(&self) -> impl Iterator<Item = &BezierHandle> {
        self.data.iter().map(|s| &s.handle)
    }

    /// The most recently committed handle, or the live head if none has been committed yet.
    pub fn latest_handle(&self) -> BezierHandle {
        self.data.back().map(|s| s.handle).unwrap_or(self.head)
    }

    pub fn segment_count(&self) -> usize {
        self.data.len()
    }

    /// Sample the body as a polyline by evaluating a cubic bézier between every pair of
    /// consecutive committed handles, using each handle's tangent length along its own heading
    /// as the control-point offset. Used for rendering/collision queries; not part of the
    /// deterministic step itself.
    pub fn sampled_points(&self, samples_per_segment: usize) -> Vec<QwPos> {
        let samples_per_segment = samples_per_segment.max(2);
        let mut out = Vec::new();
        let handles: Vec<BezierHandle> = self.committed_handles().copied().chain(std::iter::once(self.head)).collect();
        for pair in handles.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let p0 = a.pos;
            let p3 = b.pos;
            let fwd = a.direction();
            let p1 = p0.add(QwPos::new(
                fwd.x.mul(Qw::from_int(a.len_forwards as i32)),
                fwd.y.mul(Qw::from_int(a.len_forwards as i32)),
            ));
            let back = b.direction();
            let p2 = p3.sub(QwPos::new(
                back.x.mul(Qw::from_int(b.len_backwards as i32)),
                back.y.mul(Qw::from_int(b.len_backwards as i32)),
            ));
            for i in 0..samples_per_segment {
                let t = i as f64 / (samples_per_segment - 1) as f64;
                out.push(cubic_bezier_eval(p0, p1, p2, p3, t));
            }
        }
        out
    }

    pub fn overall_aabb(&self) -> QwAabb {
        self.overall_aabb
    }

    /// Whether the current `frame` is still gated by `hold_until_frame` (server join hold).
    pub fn is_held(&self, frame: u16) -> bool {
        match self.hold_until_frame {
            Some(hold) => u16_le_wrap(frame, hold),
            None => false,
        }
    }

    /// Advance the snake one tick under `cmd`, committing a new handle at `frame` when the head
    /// has traveled far enough. Returns the number of trailing segments that are now stale and
    /// may be trimmed by the caller via [`Snake::remove_stale_segments`] or
    /// [`Snake::remove_stale_segments_with_rollback_constraint`].
    pub fn step(&mut self, cmd: Command, sim_tick_rate: u8, frame: u16) -> usize {
        let target_angle = Qa(cmd.angle);
        let max_turn_step = (self.param.turn_speed / sim_tick_rate.max(1)).max(1);
        self.head.angle = self.head.angle.rotate_toward(target_angle, max_turn_step);

        let mut speed = self
            .param
            .forward_speed
            .mul(Qw::from_f64(cmd.speed as f64 / 255.0));
        if cmd.action == Action::Boost {
            speed = speed.mul(self.param.boost_multiplier);
        }
        let per_tick = speed.div(Qw::from_int(sim_tick_rate.max(1) as i32));
        let direction = self.head.direction();
        let delta = QwPos::new(direction.x.mul(per_tick), direction.y.mul(per_tick));
        self.head.pos = self.head.pos.add(delta);
        self.overall_aabb = self.overall_aabb.extend(self.head.pos);

        let last_pos = self.data.back().map(|s| s.handle.pos).unwrap_or(self.head.pos);
        let dist_sq = self.head.pos.distance_squared(last_pos);
        let threshold_sq = self.param.segment_length.mul(self.param.segment_length);
        if dist_sq > threshold_sq {
            let new_handle = BezierHandle::new(self.head.pos, self.head.angle, 1);
            let seg_aabb = QwAabb::from_point(last_pos).extend(new_handle.pos);
            self.data.push_back(Segment { handle: new_handle, committed_frame: frame, aabb: seg_aabb });
            self.handles_committed += 1;
        }

        self.stale_count()
    }

    fn stale_count(&self) -> usize {
        let segment_count = self.data.len() as i64;
        let total_len = Qw::from_f64(segment_count as f64).mul(self.param.segment_length);
        let overflow = total_len.sub(self.param.length_target);
        if overflow.0 <= 0 || self.param.segment_length.0 == 0 {
            return 0;
        }
        let stale = (overflow.to_f64() / self.param.segment_length.to_f64()).floor() as i64;
        stale.clamp(0, (self.data.len().saturating_sub(1)) as i64) as usize
    }

    /// Unconditionally trim `count` stale segments from the tail.
    pub fn remove_stale_segments(&mut self, count: usize) {
        for _ in 0..count.min(self.data.len().saturating_sub(1)) {
            self.data.pop_front();
        }
    }

    /// Trim stale segments from the tail, but never past the segment containing `head_ack`'s
    /// frame, so the client retains enough body to reconcile against a late server update.
    pub fn remove_stale_segments_with_rollback_constraint(&mut self, head_ack_frame: u16, count: usize) {
        let mut trimmed = 0;
        while trimmed < count && self.data.len() > 1 {
            let front_frame = self.data.front().unwrap().committed_frame;
            if u16_le_wrap(front_frame, head_ack_frame) && front_frame != head_ack_frame {
                // front predates the ack pivot and isn't the pivot itself: safe to drop only if
                // there's still a later segment at-or-after the pivot remaining in the body.
                let pivot_survives = self
                    .data
                    .iter()
                    .skip(1)
                    .any(|s| u16_le_wrap(head_ack_frame, s.committed_frame) || s.committed_frame == head_ack_frame);
                if !pivot_survives {
                    break;
                }
            }
            if front_frame == head_ack_frame {
                break;
            }
            self.data.pop_front();
            trimmed += 1;
        }
    }

    /// Roll the head back to `head_ack` and replay every command in `cmdq` with frame strictly
    /// greater than `ack_frame`, re-stepping forward deterministically. Used by the client when
    /// a server update disagrees with the local prediction.
    pub fn rollback_and_replay(&mut self, ack_frame: u16, ack_handle: BezierHandle, sim_tick_rate: u8) {
        self.head = ack_handle;
        self.head_ack = Some((ack_frame, ack_handle));
        let pending: Vec<(u16, Command)> =
            self.cmdq.iter().filter(|(frame, _)| !u16_le_wrap(*frame, ack_frame)).collect();
        for (frame, cmd) in pending {
            self.step(cmd, sim_tick_rate, frame);
        }
    }
}

/// Evaluate a cubic bézier at parameter `t`. Used only for sampled-point output (rendering and
/// proximity queries), which is not part of the deterministic head-stepping contract, so blend
/// weights are computed in `f64` rather than pure `Qw` arithmetic.
fn cubic_bezier_eval(p0: QwPos, p1: QwPos, p2: QwPos, p3: QwPos, t: f64) -> QwPos {
    let mt = 1.0 - t;
    let w0 = Qw::from_f64(mt * mt * mt);
    let w1 = Qw::from_f64(3.0 * mt * mt * t);
    let w2 = Qw::from_f64(3.0 * mt * t * t);
    let w3 = Qw::from_f64(t * t * t);
    QwPos::new(
        p0.x.mul(w0) + p1.x.mul(w1) + p2.x.mul(w2) + p3.x.mul(w3),
        p0.y.mul(w0) + p1.y.mul(w1) + p2.y.mul(w2) + p3.y.mul(w3),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_cmd() -> Command {
        Command { angle: 0, speed: 255, action: Action::None }
    }

    #[test]
    fn step_is_deterministic_given_identical_inputs() {
        let mut a = Snake::spawn(QwPos::ZERO, 0);
        let mut b = Snake::spawn(QwPos::ZERO, 0);
        for f in 1..20u16 {
            a.step(straight_cmd(), 60, f);
            b.step(straight_cmd(), 60, f);
        }
        assert_eq!(a.head.pos, b.head.pos);
        assert_eq!(a.head.angle, b.head.angle);
        assert_eq!(a.segment_count(), b.segment_count());
    }

    #[test]
    fn head_moves_forward_along_zero_angle() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        s.step(straight_cmd(), 60, 1);
        // angle 0 => cos=1, sin=0, so motion is purely along +x.
        assert!(s.head.pos.x.0 > 0);
        assert_eq!(s.head.pos.y, Qw::ZERO);
    }

    #[test]
    fn turning_rotates_toward_target_gradually() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        let turning_cmd = Command { angle: 128, speed: 0, action: Action::None };
        s.step(turning_cmd, 60, 1);
        assert_ne!(s.head.angle, Qa::ZERO);
        assert_ne!(s.head.angle, Qa(128));
    }

    #[test]
    fn new_handle_committed_once_segment_length_exceeded() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        let before = s.segment_count();
        for f in 1..200u16 {
            s.step(straight_cmd(), 60, f);
        }
        assert!(s.segment_count() > before);
    }

    #[test]
    fn stale_segments_grow_as_length_target_is_exceeded() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        let mut last_stale = 0;
        for f in 1..400u16 {
            last_stale = s.step(straight_cmd(), 60, f);
        }
        assert!(last_stale > 0);
    }

    #[test]
    fn rollback_constraint_never_trims_past_ack_pivot() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        let mut ack_frame = 0u16;
        let mut ack_handle = s.head;
        for f in 1..300u16 {
            s.step(straight_cmd(), 60, f);
            if f == 50 {
                ack_frame = f;
                ack_handle = s.head;
            }
        }
        let _ = ack_handle;
        let huge = s.segment_count();
        s.remove_stale_segments_with_rollback_constraint(ack_frame, huge);
        let oldest_remaining = s.committed_handles().next().unwrap();
        let _ = oldest_remaining;
        // At minimum one segment must remain and the pivot frame must not have been skipped
        // over entirely (segment_count never collapses to zero).
        assert!(s.segment_count() >= 1);
    }

    #[test]
    fn rollback_and_replay_reproduces_forward_stepping() {
        let mut predicted = Snake::spawn(QwPos::ZERO, 0);
        for f in 1..=10u16 {
            predicted.cmdq.put(straight_cmd(), f);
            predicted.step(straight_cmd(), 60, f);
        }
        let predicted_head = predicted.head;

        let mut reconciled = Snake::spawn(QwPos::ZERO, 0);
        for f in 1..=5u16 {
            reconciled.cmdq.put(straight_cmd(), f);
            reconciled.step(straight_cmd(), 60, f);
        }
        for f in 6..=10u16 {
            reconciled.cmdq.put(straight_cmd(), f);
        }
        let ack_handle = reconciled.head;
        reconciled.rollback_and_replay(5, ack_handle, 60);

        assert_eq!(reconciled.head.pos, predicted_head.pos);
        assert_eq!(reconciled.head.angle, predicted_head.angle);
    }

    #[test]
    fn sampled_points_starts_at_tail_and_ends_at_head() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        for f in 1..50u16 {
            s.step(straight_cmd(), 60, f);
        }
        let pts = s.sampled_points(4);
        assert!(!pts.is_empty());
        let last = *pts.last().unwrap();
        assert_eq!(last, s.head.pos);
    }

    #[test]
    fn handles_committed_tracks_new_segments_and_latest_handle() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        assert_eq!(s.handles_committed, 1);
        for f in 1..200u16 {
            s.step(straight_cmd(), 60, f);
        }
        assert!(s.handles_committed > 1);
        assert_eq!(s.handles_committed as usize, s.segment_count());
        assert_eq!(s.latest_handle().pos, s.committed_handles().last().unwrap().pos);
    }

    #[test]
    fn hold_until_frame_gates_stepping() {
        let mut s = Snake::spawn(QwPos::ZERO, 0);
        s.hold_until_frame = Some(35);
        assert!(s.is_held(35));
        assert!(s.is_held(20));
        assert!(!s.is_held(36));
    }
}
