//! Draws whatever [`crate::game::ClientGameState`] can currently see.
//!
//! Rendering is an external interface to the simulation, not part of its deterministic contract,
//! so this stays deliberately thin: turn a handful of sampled positions into lines on screen.

use macroquad::prelude::*;

use shared::fixed::{Qw, QwPos};

/// Everything a [`Renderer`] needs for one frame: the locally owned snake's body samples, tail
/// first, and the same for every other currently-visible snake.
pub struct RenderView<'a> {
    pub own_points: &'a [QwPos],
    pub other_points: &'a [Vec<QwPos>],
}

/// The external interface seam between the simulation and whatever draws it: nothing past this
/// trait knows or cares that macroquad exists.
pub trait Renderer {
    fn render(&self, view: &RenderView);
}

/// The concrete macroquad-backed renderer used by the client binary. Holds no simulation state.
pub struct MacroquadRenderer;

impl MacroquadRenderer {
    pub fn new() -> Result<MacroquadRenderer, Box<dyn std::error::Error>> {
        Ok(MacroquadRenderer)
    }
}

impl Renderer for MacroquadRenderer {
    /// `view.own_points` and each entry of `view.other_points` are body samples from
    /// [`shared::snake::Snake::sampled_points`], tail first.
    fn render(&self, view: &RenderView) {
        clear_background(Color::from_rgba(10, 10, 18, 255));
        for points in view.other_points {
            draw_polyline(points, Color::from_rgba(200, 70, 70, 255));
        }
        draw_polyline(view.own_points, GREEN);
    }
}

fn draw_polyline(points: &[QwPos], color: Color) {
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        draw_line(to_screen_x(a.x), to_screen_y(a.y), to_screen_x(b.x), to_screen_y(b.y), 2.0, color);
    }
}

fn to_screen_x(x: Qw) -> f32 {
    x.to_f64() as f32 + screen_width() / 2.0
}

fn to_screen_y(y: Qw) -> f32 {
    y.to_f64() as f32 + screen_height() / 2.0
}
