//! Deterministic fixed-point arithmetic used by the simulation.
//!
//! `Qw` is a `Q16.16` signed fixed-point scalar: all simulation math runs through it so that a
//! server and every client produce byte-identical results regardless of platform or compiler,
//! which plain `f32`/`f64` do not guarantee. `Qa` is an 8-bit wrapping angle (0..255 maps to a
//! full turn); trigonometry is a 256-entry lookup table built once, never `f32::sin`/`cos`.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::wrap::{u8_gt_wrap, u8_sub_wrap};

/// Number of fractional bits in `Qw`.
pub const QW_FRAC_BITS: i32 = 16;
/// Scale factor such that `Qw(raw) == raw as f64 / QW_ONE as f64`.
pub const QW_ONE: i64 = 1 << QW_FRAC_BITS;

/// `Q16.16` signed fixed-point scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Qw(pub i32);

impl Qw {
    pub const ZERO: Qw = Qw(0);
    pub const ONE: Qw = Qw(QW_ONE as i32);

    pub fn from_int(v: i32) -> Qw {
        Qw(v.wrapping_mul(QW_ONE as i32))
    }

    pub fn from_f64(v: f64) -> Qw {
        Qw((v * QW_ONE as f64).round() as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / QW_ONE as f64
    }

    pub fn to_int(self) -> i32 {
        (self.0 as i64 >> QW_FRAC_BITS) as i32
    }

    pub fn add(self, other: Qw) -> Qw {
        Qw(self.0.wrapping_add(other.0))
    }

    pub fn sub(self, other: Qw) -> Qw {
        Qw(self.0.wrapping_sub(other.0))
    }

    pub fn neg(self) -> Qw {
        Qw(self.0.wrapping_neg())
    }

    /// Multiply two `Qw` values, rounding toward zero after rescaling.
    pub fn mul(self, other: Qw) -> Qw {
        let wide = self.0 as i64 * other.0 as i64;
        Qw((wide >> QW_FRAC_BITS) as i32)
    }

    /// Divide two `Qw` values. Panics on division by zero, matching integer-division semantics
    /// of the rest of the simulation rather than silently saturating.
    pub fn div(self, other: Qw) -> Qw {
        let wide = (self.0 as i64) << QW_FRAC_BITS;
        Qw((wide / other.0 as i64) as i32)
    }

    /// Multiply by an integer scalar, then truncate fractional bits away (used to scale a speed
    /// by an integer tick rate divisor without round-tripping through `div`).
    pub fn mul_int_trunc(self, scalar: i32) -> Qw {
        Qw(self.0.wrapping_mul(scalar))
    }

    pub fn abs(self) -> Qw {
        Qw(self.0.wrapping_abs())
    }
}

impl std::ops::Add for Qw {
    type Output = Qw;
    fn add(self, rhs: Qw) -> Qw {
        Qw::add(self, rhs)
    }
}

impl std::ops::Sub for Qw {
    type Output = Qw;
    fn sub(self, rhs: Qw) -> Qw {
        Qw::sub(self, rhs)
    }
}

impl std::ops::Mul for Qw {
    type Output = Qw;
    fn mul(self, rhs: Qw) -> Qw {
        Qw::mul(self, rhs)
    }
}

impl std::ops::Div for Qw {
    type Output = Qw;
    fn div(self, rhs: Qw) -> Qw {
        Qw::div(self, rhs)
    }
}

impl std::ops::Neg for Qw {
    type Output = Qw;
    fn neg(self) -> Qw {
        Qw::neg(self)
    }
}

/// 8-bit wrapping angle: `0..=255` maps onto `0..2*PI`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Qa(pub u8);

impl Qa {
    pub const ZERO: Qa = Qa(0);

    /// Signed angular distance `self - other`, wrapping through `i8`.
    pub fn sub_wrap(self, other: Qa) -> i8 {
        u8_sub_wrap(self.0, other.0)
    }

    pub fn gt_wrap(self, other: Qa) -> bool {
        u8_gt_wrap(self.0, other.0)
    }

    pub fn wrapping_add_signed(self, delta: i8) -> Qa {
        Qa(self.0.wrapping_add(delta as u8))
    }

    /// Rotate `self` toward `target` by at most `max_step` (magnitude), never overshooting.
    pub fn rotate_toward(self, target: Qa, max_step: u8) -> Qa {
        let diff = target.sub_wrap(self);
        if diff == 0 {
            return self;
        }
        let step = (diff.unsigned_abs()).min(max_step) as i8;
        let signed_step = if diff < 0 { -step } else { step };
        self.wrapping_add_signed(signed_step)
    }

    pub fn cos_qw(self) -> Qw {
        trig_table().cos[self.0 as usize]
    }

    /// `sin(theta) == cos(theta - quarter_turn)`; a quarter turn is 64 of the 256 table slots.
    pub fn sin_qw(self) -> Qw {
        trig_table().cos[self.0.wrapping_sub(64) as usize]
    }
}

/// Lazily-built 256-entry cosine table in `Qw`. Sine is derived as a quarter-turn phase shift of
/// cosine at lookup time, so only one table is stored.
struct TrigTable {
    cos: [Qw; 256],
}

static TRIG_TABLE: OnceLock<TrigTable> = OnceLock::new();

fn trig_table() -> &'static TrigTable {
    TRIG_TABLE.get_or_init(|| {
        let mut cos = [Qw::ZERO; 256];
        for (i, slot) in cos.iter_mut().enumerate() {
            let radians = (i as f64) * std::f64::consts::TAU / 256.0;
            *slot = Qw::from_f64(radians.cos());
        }
        TrigTable { cos }
    })
}

/// World-space position as a pair of `Qw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct QwPos {
    pub x: Qw,
    pub y: Qw,
}

impl QwPos {
    pub const ZERO: QwPos = QwPos { x: Qw::ZERO, y: Qw::ZERO };

    pub fn new(x: Qw, y: Qw) -> QwPos {
        QwPos { x, y }
    }

    pub fn add(self, other: QwPos) -> QwPos {
        QwPos::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: QwPos) -> QwPos {
        QwPos::new(self.x - other.x, self.y - other.y)
    }

    /// Squared distance, used to avoid a square root in comparisons (segment_length checks use
    /// this against a squared threshold).
    pub fn distance_squared(self, other: QwPos) -> Qw {
        let d = self.sub(other);
        d.x * d.x + d.y * d.y
    }
}

/// Axis-aligned bounding box in `Qw` space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QwAabb {
    pub min: QwPos,
    pub max: QwPos,
}

impl QwAabb {
    pub fn from_point(p: QwPos) -> QwAabb {
        QwAabb { min: p, max: p }
    }

    pub fn extend(mut self, p: QwPos) -> QwAabb {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self
    }

    pub fn union(self, other: QwAabb) -> QwAabb {
        self.extend(other.min).extend(other.max)
    }

    pub fn intersects(self, other: QwAabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn qw_round_trips_through_float() {
        let v = Qw::from_f64(3.25);
        assert_approx_eq!(v.to_f64(), 3.25, 1e-4);
    }

    #[test]
    fn qw_mul_and_div_are_inverses_for_nonzero() {
        let a = Qw::from_int(6);
        let b = Qw::from_int(3);
        assert_eq!(a.div(b), Qw::from_int(2));
    }

    #[test]
    fn qw_add_sub_are_exact() {
        let a = Qw::from_int(5);
        let b = Qw::from_int(2);
        assert_eq!(a.add(b).sub(b), a);
    }

    #[test]
    fn qa_rotate_toward_clamps_to_max_step() {
        let start = Qa(0);
        let target = Qa(100);
        let next = start.rotate_toward(target, 10);
        assert_eq!(next, Qa(10));
    }

    #[test]
    fn qa_rotate_toward_shortest_path_wraps() {
        // 250 is closer to 0 going forward (+6) than backward (-250).
        let start = Qa(250);
        let target = Qa(0);
        let next = start.rotate_toward(target, 10);
        assert_eq!(next, Qa(0));
    }

    #[test]
    fn cos_table_matches_float_cosine_closely() {
        let table_zero = Qa(0).cos_qw().to_f64();
        assert_approx_eq!(table_zero, 1.0, 1e-3);
        let table_half = Qa(128).cos_qw().to_f64();
        assert_approx_eq!(table_half, -1.0, 1e-3);
    }

    #[test]
    fn sin_table_matches_float_sine_closely() {
        let zero = Qa(0).sin_qw().to_f64();
        assert_approx_eq!(zero, 0.0, 1e-3);
        let quarter = Qa(64).sin_qw().to_f64();
        assert_approx_eq!(quarter, 1.0, 1e-3);
    }

    #[test]
    fn trig_table_is_deterministic_across_calls() {
        let a = Qa(37).cos_qw();
        let b = Qa(37).cos_qw();
        assert_eq!(a, b);
    }

    #[test]
    fn aabb_union_covers_both_boxes() {
        let a = QwAabb::from_point(QwPos::new(Qw::from_int(0), Qw::from_int(0)));
        let b = QwAabb::from_point(QwPos::new(Qw::from_int(5), Qw::from_int(5)));
        let u = a.union(b);
        assert_eq!(u.min, QwPos::new(Qw::from_int(0), Qw::from_int(0)));
        assert_eq!(u.max, QwPos::new(Qw::from_int(5), Qw::from_int(5)));
    }
}
