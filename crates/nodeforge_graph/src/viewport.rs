// SPDX-License-Identifier: MIT OR Apache-2.0
//! Viewport: world <-> screen mapping, zoom and smooth transitions.
//!
//! Screen space is the host window in pixels with the origin at its top-left
//! corner. The mapping is `screen = world * scale + pan`.

use crate::config::EditorConfig;
use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Pan and scale of a view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Screen-space offset of the world origin
    pub pan: Vec2,
    /// Uniform scale factor
    pub scale: f32,
}

impl ViewportState {
    /// Identity mapping
    pub const IDENTITY: Self = Self {
        pan: Vec2::ZERO,
        scale: 1.0,
    };

    /// Interpolate towards `other`
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            pan: self.pan + (other.pan - self.pan) * t,
            scale: self.scale + (other.scale - self.scale) * t,
        }
    }

    /// Whether both states agree within `tolerance`
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        (self.pan - other.pan).length() <= tolerance && (self.scale - other.scale).abs() <= tolerance
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Easing curve of a viewport transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Easing {
    /// Jump straight to the target
    Instant,
    /// Constant speed
    Linear,
    /// Smoothstep in and out
    #[default]
    EaseInOut,
}

impl Easing {
    /// Map linear progress `t` in [0, 1] to eased progress
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Instant => 1.0,
            Self::Linear => t,
            Self::EaseInOut => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// An in-flight tween between two viewport states
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransition {
    /// State when the tween started
    pub from: ViewportState,
    /// Target state
    pub to: ViewportState,
    /// Seconds elapsed
    pub elapsed: f32,
    /// Total seconds
    pub duration: f32,
    /// Easing curve
    pub easing: Easing,
}

impl ViewportTransition {
    /// Eased progress in [0, 1]
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        self.easing.apply(self.elapsed / self.duration)
    }

    /// Whether the tween has reached its target
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration || self.easing == Easing::Instant
    }
}

/// The editor viewport
#[derive(Debug, Clone)]
pub struct Viewport {
    state: ViewportState,
    min_scale: f32,
    max_scale: f32,
    zoom_step: f32,
    window: Vec2,
    transition: Option<ViewportTransition>,
}

impl Viewport {
    /// Create a viewport at identity using the configured zoom range
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            state: ViewportState::IDENTITY,
            min_scale: config.min_zoom,
            max_scale: config.max_zoom,
            zoom_step: config.zoom_step,
            window: Vec2::new(1280.0, 720.0),
            transition: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ViewportState {
        self.state
    }

    /// Current pan
    pub fn pan(&self) -> Vec2 {
        self.state.pan
    }

    /// Current scale
    pub fn scale(&self) -> f32 {
        self.state.scale
    }

    /// Allowed scale range
    pub fn scale_range(&self) -> (f32, f32) {
        (self.min_scale, self.max_scale)
    }

    /// Window size in pixels
    pub fn window_size(&self) -> Vec2 {
        self.window
    }

    /// Update the window size
    pub fn set_window_size(&mut self, size: Vec2) {
        self.window = size;
    }

    /// Window rectangle in screen space
    pub fn window_rect(&self) -> Rect {
        Rect::from_min_size(Pos2::ZERO, self.window)
    }

    /// Replace the state directly. Cancels any tween.
    pub fn set_state(&mut self, state: ViewportState) {
        self.transition = None;
        self.state = self.clamped(state);
    }

    /// Return to identity. Cancels any tween.
    pub fn reset(&mut self) {
        self.set_state(ViewportState::IDENTITY);
    }

    fn clamped(&self, state: ViewportState) -> ViewportState {
        ViewportState {
            pan: state.pan,
            scale: state.scale.clamp(self.min_scale, self.max_scale),
        }
    }

    /// Convert screen position to world position
    pub fn screen_to_world(&self, screen: Pos2) -> Pos2 {
        ((screen.to_vec2() - self.state.pan) / self.state.scale).to_pos2()
    }

    /// Convert world position to screen position
    pub fn world_to_screen(&self, world: Pos2) -> Pos2 {
        (world.to_vec2() * self.state.scale + self.state.pan).to_pos2()
    }

    /// Convert a world rectangle to screen space
    pub fn world_rect_to_screen(&self, rect: Rect) -> Rect {
        Rect::from_min_max(self.world_to_screen(rect.min), self.world_to_screen(rect.max))
    }

    /// Convert a screen rectangle to world space
    pub fn screen_rect_to_world(&self, rect: Rect) -> Rect {
        Rect::from_min_max(self.screen_to_world(rect.min), self.screen_to_world(rect.max))
    }

    /// World-space region currently visible
    pub fn visible_world_rect(&self) -> Rect {
        self.screen_rect_to_world(self.window_rect())
    }

    /// Translate by a screen-space delta. Cancels any tween.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.transition = None;
        self.state.pan += delta;
    }

    /// Zoom about a screen-space point by `steps` wheel notches (positive
    /// zooms in). The world point under `pointer` stays under it.
    /// Returns `false` when the scale is already at its bound.
    pub fn zoom_at(&mut self, pointer: Pos2, steps: f32) -> bool {
        let target = self.state.scale * self.zoom_step.powf(steps);
        self.set_scale_about(pointer, target)
    }

    /// Set the scale keeping `pointer` fixed. Cancels any tween.
    ///
    /// `pointer` is in screen space relative to the canvas origin, the same
    /// space as `pan`. The update is exactly
    /// `pan' = pointer - (pointer - pan) * (scale' / scale)`, which keeps
    /// `screen_to_world(pointer)` unchanged. No window-centre term is added:
    /// the world origin is anchored at the canvas origin, not the centre, and
    /// a centre correction would drift the point under the pointer.
    pub fn set_scale_about(&mut self, pointer: Pos2, scale: f32) -> bool {
        let old = self.state.scale;
        let new = scale.clamp(self.min_scale, self.max_scale);
        if (new - old).abs() <= f32::EPSILON {
            return false;
        }
        self.transition = None;
        let pointer = pointer.to_vec2();
        self.state.pan = pointer - (pointer - self.state.pan) * (new / old);
        self.state.scale = new;
        true
    }

    /// State that frames `bounds` (world space) with `padding` world units
    /// around it, centered in the window. Empty input yields identity.
    pub fn fit_state(&self, bounds: Option<Rect>, padding: f32) -> ViewportState {
        let Some(bounds) = bounds.filter(Rect::is_finite) else {
            return ViewportState::IDENTITY;
        };
        let padded = bounds.expand(padding);
        let size = padded.size().max(Vec2::splat(1.0));
        let scale = (self.window.x / size.x)
            .min(self.window.y / size.y)
            .clamp(self.min_scale, self.max_scale);
        let center = padded.center().to_vec2();
        ViewportState {
            pan: self.window * 0.5 - center * scale,
            scale,
        }
    }

    /// State that centers `world` in the window at the current scale
    pub fn centered_on(&self, world: Pos2) -> ViewportState {
        ViewportState {
            pan: self.window * 0.5 - world.to_vec2() * self.state.scale,
            scale: self.state.scale,
        }
    }

    /// Start a tween towards `target`
    pub fn animate_to(&mut self, target: ViewportState, duration: f32, easing: Easing) {
        let target = self.clamped(target);
        if easing == Easing::Instant || duration <= 0.0 {
            self.set_state(target);
            return;
        }
        self.transition = Some(ViewportTransition {
            from: self.state,
            to: target,
            elapsed: 0.0,
            duration,
            easing,
        });
    }

    /// In-flight tween, if any
    pub fn transition(&self) -> Option<&ViewportTransition> {
        self.transition.as_ref()
    }

    /// Whether a tween is running
    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    /// Advance the tween by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        let Some(transition) = self.transition.as_mut() else {
            return;
        };
        transition.elapsed += dt.max(0.0);
        let t = transition.progress();
        self.state = transition.from.lerp(&transition.to, t);
        if transition.is_finished() {
            self.state = transition.to;
            self.transition = None;
        }
    }
}
