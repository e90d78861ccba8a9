//! World/screen mapping and viewport physics.

use crate::config::CameraConfig;
use crate::library::{Bounds, Vec2};

const ZOOM_REST_VELOCITY: f32 = 0.000_01;
const ZOOM_OUT_OF_RANGE: f32 = 0.001;
const ZOOM_SNAP_DISTANCE: f32 = 0.002;
const ZOOM_ELASTIC_LOW: f32 = 0.5;
const ZOOM_ELASTIC_HIGH: f32 = 1.3;
/// Frames per second the per-frame lerp constants were tuned for.
const REFERENCE_FPS: f32 = 60.0;

/// Look-at point and scale of the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec2,
    /// Screen pixels per world unit.
    pub zoom: f32,
}

impl Camera {
    pub fn new(position: Vec2, zoom: f32) -> Self {
        Self { position, zoom }
    }
}

/// Size of the drawing surface plus the strips reserved for overlays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub top_margin: f32,
    pub bottom_margin: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            top_margin: 0.0,
            bottom_margin: 0.0,
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn usable_height(&self) -> f32 {
        (self.height - self.top_margin - self.bottom_margin).max(1.0)
    }

    /// Screen-space vertical offset of the usable area's centre from the
    /// viewport centre.
    fn usable_offset(&self) -> f32 {
        (self.top_margin - self.bottom_margin) / 2.0
    }

    /// `true` if the screen point lies inside the area not covered by margins.
    pub fn contains_usable(&self, point: Vec2) -> bool {
        point.x >= 0.0
            && point.x <= self.width
            && point.y >= self.top_margin
            && point.y <= self.height - self.bottom_margin
    }
}

/// `cubic-bezier(x1, y1, x2, y2)` timing curve with fixed end points.
#[derive(Debug, Clone, Copy)]
pub struct CubicBezier {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl CubicBezier {
    /// The standard material easing, `cubic-bezier(0.4, 0, 0.2, 1)`.
    pub const STANDARD: CubicBezier = CubicBezier {
        x1: 0.4,
        y1: 0.0,
        x2: 0.2,
        y2: 1.0,
    };

    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    fn component(a: f32, b: f32, t: f32) -> f32 {
        let u = 1.0 - t;
        3.0 * u * u * t * a + 3.0 * u * t * t * b + t * t * t
    }

    fn slope(a: f32, b: f32, t: f32) -> f32 {
        let u = 1.0 - t;
        3.0 * u * u * a + 6.0 * u * t * (b - a) + 3.0 * t * t * (1.0 - b)
    }

    /// Eased progress for linear progress `x` in `[0, 1]`.
    pub fn ease(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        if x == 0.0 || x == 1.0 {
            return x;
        }

        let mut t = x;
        for _ in 0..8 {
            let error = Self::component(self.x1, self.x2, t) - x;
            if error.abs() < 1e-6 {
                return Self::component(self.y1, self.y2, t);
            }
            let slope = Self::slope(self.x1, self.x2, t);
            if slope.abs() < 1e-6 {
                break;
            }
            t -= error / slope;
        }

        // newton stalled, bisect
        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        t = x;
        for _ in 0..32 {
            let value = Self::component(self.x1, self.x2, t);
            if (value - x).abs() < 1e-6 {
                break;
            }
            if value < x {
                lo = t;
            } else {
                hi = t;
            }
            t = (lo + hi) / 2.0;
        }
        Self::component(self.y1, self.y2, t)
    }
}

#[derive(Debug, Clone, Copy)]
struct FitAnimation {
    from: Camera,
    to: Camera,
    elapsed: f32,
}

/// Owns the camera and every input-driven motion applied to it.
#[derive(Debug, Clone)]
pub struct CameraController {
    config: CameraConfig,
    camera: Camera,
    viewport: Viewport,
    pan_velocity: Vec2,
    zoom_velocity: f32,
    zoom_focal: Vec2,
    dragging: bool,
    drag_last: Vec2,
    follow: Option<Vec2>,
    fit: Option<FitAnimation>,
    dynamic_min: f32,
}

impl CameraController {
    pub fn new(config: CameraConfig, viewport: Viewport) -> Self {
        let mut viewport = viewport;
        viewport.top_margin = config.top_margin;
        viewport.bottom_margin = config.bottom_margin;
        Self {
            camera: Camera::new(Vec2::ZERO, config.initial_zoom),
            viewport,
            pan_velocity: Vec2::ZERO,
            zoom_velocity: 0.0,
            zoom_focal: viewport.center(),
            dragging: false,
            drag_last: Vec2::ZERO,
            follow: None,
            fit: None,
            dynamic_min: config.zoom_floor,
            config,
        }
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn dynamic_min_zoom(&self) -> f32 {
        self.dynamic_min
    }

    pub fn max_zoom(&self) -> f32 {
        self.config.zoom_max
    }

    pub fn zoom_velocity(&self) -> f32 {
        self.zoom_velocity
    }

    pub fn pan_velocity(&self) -> Vec2 {
        self.pan_velocity
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_following(&self) -> bool {
        self.follow.is_some()
    }

    pub fn is_fitting(&self) -> bool {
        self.fit.is_some()
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    pub fn set_margins(&mut self, top: f32, bottom: f32) {
        self.viewport.top_margin = top.max(0.0);
        self.viewport.bottom_margin = bottom.max(0.0);
    }

    pub fn reset(&mut self) {
        self.camera = Camera::new(Vec2::ZERO, self.config.initial_zoom);
        self.pan_velocity = Vec2::ZERO;
        self.zoom_velocity = 0.0;
        self.dragging = false;
        self.follow = None;
        self.fit = None;
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        (world - self.camera.position) * self.camera.zoom + self.viewport.center()
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        (screen - self.viewport.center()) * (1.0 / self.camera.zoom) + self.camera.position
    }

    pub fn begin_drag(&mut self, screen: Vec2) {
        self.dragging = true;
        self.drag_last = screen;
        self.pan_velocity = Vec2::ZERO;
        self.follow = None;
        self.fit = None;
    }

    pub fn drag_to(&mut self, screen: Vec2) {
        if !self.dragging {
            return;
        }
        let step = (screen - self.drag_last) * (-1.0 / self.camera.zoom);
        self.camera.position += step;
        self.pan_velocity = step;
        self.drag_last = screen;
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// Wheel input; negative `delta_y` zooms in around `focal`.
    pub fn wheel(&mut self, delta_y: f32, focal: Vec2) {
        self.zoom_focal = focal;
        self.zoom_velocity += delta_y * self.config.zoom_wheel_sensitivity * self.camera.zoom;
        self.fit = None;
    }

    /// Keeps easing the camera toward `target` until cancelled.
    pub fn follow(&mut self, target: Vec2) {
        if self.follow.is_none() {
            self.pan_velocity = Vec2::ZERO;
            self.zoom_velocity = 0.0;
        }
        self.fit = None;
        self.follow = Some(target);
    }

    pub fn stop_follow(&mut self) {
        self.follow = None;
    }

    /// Camera state that frames `bounds` within the usable area.
    pub fn fit_target(&self, bounds: Bounds) -> Camera {
        let fit = self.fit_zoom(bounds);
        let zoom = fit.max(self.config.zoom_floor).min(self.config.zoom_max);
        let y = bounds.center.y - self.viewport.usable_offset() / zoom;
        Camera::new(Vec2::new(bounds.center.x, y), zoom)
    }

    /// Starts the eased transition toward [`CameraController::fit_target`].
    pub fn zoom_to_fit(&mut self, bounds: Bounds) {
        let to = self.fit_target(bounds);
        self.fit = Some(FitAnimation {
            from: self.camera,
            to,
            elapsed: 0.0,
        });
        self.follow = None;
        self.pan_velocity = Vec2::ZERO;
        self.zoom_velocity = 0.0;
        tracing::debug!(zoom = to.zoom, x = to.position.x, y = to.position.y, "zoom to fit");
    }

    fn fit_zoom(&self, bounds: Bounds) -> f32 {
        let fit_x = self.viewport.width / (bounds.half_extent.x * 2.0).max(f32::EPSILON);
        let fit_y = self.viewport.usable_height() / (bounds.half_extent.y * 2.0).max(f32::EPSILON);
        fit_x.min(fit_y)
    }

    /// One frame of camera motion. `bounds` are the padded node bounds.
    pub fn update(&mut self, dt: f32, bounds: Bounds) {
        self.dynamic_min =
            (self.fit_zoom(bounds) * self.config.min_zoom_headroom).max(self.config.zoom_floor);

        if let Some(mut fit) = self.fit.take() {
            fit.elapsed += dt;
            let progress = (fit.elapsed / self.config.fit_duration.max(f32::EPSILON)).min(1.0);
            let eased = CubicBezier::STANDARD.ease(progress);
            self.camera = Camera::new(
                fit.from.position.lerp(fit.to.position, eased),
                fit.from.zoom + (fit.to.zoom - fit.from.zoom) * eased,
            );
            self.pan_velocity = Vec2::ZERO;
            self.zoom_velocity = 0.0;
            if progress < 1.0 {
                self.fit = Some(fit);
            } else {
                self.camera = fit.to;
            }
            return;
        }

        self.apply_inertia();
        self.apply_follow(dt);
        self.apply_zoom();
        self.apply_pan_bounds(bounds);
    }

    fn apply_inertia(&mut self) {
        if self.dragging {
            return;
        }
        self.camera.position += self.pan_velocity;
        self.pan_velocity = self.pan_velocity * self.config.pan_friction;
        if self.pan_velocity.x.abs() < self.config.pan_rest_threshold {
            self.pan_velocity.x = 0.0;
        }
        if self.pan_velocity.y.abs() < self.config.pan_rest_threshold {
            self.pan_velocity.y = 0.0;
        }
    }

    fn apply_follow(&mut self, dt: f32) {
        let Some(target) = self.follow else {
            return;
        };
        if self.dragging {
            return;
        }
        let t = 1.0 - (1.0 - self.config.follow_lerp).powf(dt * REFERENCE_FPS);
        self.camera.position = self.camera.position.lerp(target, t);
        self.pan_velocity = Vec2::ZERO;
    }

    fn apply_zoom(&mut self) {
        let (min, max) = (self.dynamic_min, self.config.zoom_max);
        let active = self.zoom_velocity.abs() > ZOOM_REST_VELOCITY;
        let legal = self.camera.zoom.clamp(min, max);
        let out_of_range = (self.camera.zoom - legal).abs() > ZOOM_OUT_OF_RANGE;
        if !active && !out_of_range {
            return;
        }

        let focal_world = self.screen_to_world(self.zoom_focal);

        self.camera.zoom = (self.camera.zoom + self.zoom_velocity)
            .clamp(min * ZOOM_ELASTIC_LOW, max * ZOOM_ELASTIC_HIGH);
        let spring = (self.camera.zoom.clamp(min, max) - self.camera.zoom)
            * self.config.zoom_snap_back_stiffness;
        self.zoom_velocity = (self.zoom_velocity + spring) * self.config.zoom_friction;
        if self.zoom_velocity.abs() < ZOOM_REST_VELOCITY {
            self.zoom_velocity = 0.0;
        }

        let settled = self.camera.zoom.clamp(min, max);
        if self.zoom_velocity == 0.0 && (self.camera.zoom - settled).abs() < ZOOM_SNAP_DISTANCE {
            self.camera.zoom = settled;
        }

        self.camera.position =
            focal_world - (self.zoom_focal - self.viewport.center()) * (1.0 / self.camera.zoom);
    }

    fn apply_pan_bounds(&mut self, bounds: Bounds) {
        let zoom = self.camera.zoom;
        let strength = if self.dragging {
            self.config.pan_pull_dragging
        } else {
            self.config.pan_pull_released
        };
        let offset = Vec2::new(0.0, self.viewport.usable_offset() / zoom);
        let usable_center = self.camera.position + offset;
        let view_half = Vec2::new(
            self.viewport.width / 2.0 / zoom,
            self.viewport.usable_height() / 2.0 / zoom,
        );

        let target_x = pull_target(
            usable_center.x,
            bounds.center.x,
            bounds.half_extent.x,
            view_half.x,
        );
        let target_y = pull_target(
            usable_center.y,
            bounds.center.y,
            bounds.half_extent.y,
            view_half.y,
        );
        self.camera.position.x += (target_x - usable_center.x) * strength;
        self.camera.position.y += (target_y - usable_center.y) * strength;
    }
}

/// Where the view centre should be on one axis, given the bounds.
fn pull_target(current: f32, center: f32, half_extent: f32, view_half: f32) -> f32 {
    let low = center - half_extent + view_half;
    let high = center + half_extent - view_half;
    if low > high {
        center
    } else {
        current.clamp(low, high)
    }
}
