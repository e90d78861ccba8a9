use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the engine.
///
/// Every section is `#[serde(default)]` so a config file only needs to name
/// the values it wants to override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub camera: CameraConfig,
    pub ring: RingConfig,
    pub audio: AudioConfig,
    pub sequencer: SequencerConfig,
}

impl EngineConfig {
    /// Reads a (possibly partial) JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Force simulation and k-NN graph parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Half of the world span the larger projected axis is scaled to.
    pub world_half_span: f32,
    pub neighbor_k: usize,
    pub link_distance_min: f32,
    pub link_distance_max: f32,
    pub link_strength: f32,
    pub position_strength: f32,
    pub charge_strength: f32,
    pub collide_radius: f32,
    pub velocity_decay: f32,
    pub pre_settle_ticks: usize,
    pub ticks_per_frame: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            world_half_span: 200.0,
            neighbor_k: 5,
            link_distance_min: 8.0,
            link_distance_max: 60.0,
            link_strength: 0.4,
            position_strength: 0.12,
            charge_strength: -40.0,
            collide_radius: 14.0,
            velocity_decay: 0.35,
            pre_settle_ticks: 400,
            ticks_per_frame: 1,
        }
    }
}

/// Viewport physics and animation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub initial_zoom: f32,
    pub zoom_max: f32,
    pub zoom_floor: f32,
    pub zoom_friction: f32,
    pub zoom_snap_back_stiffness: f32,
    pub zoom_wheel_sensitivity: f32,
    /// Fraction of the exact fit zoom allowed as the dynamic minimum.
    pub min_zoom_headroom: f32,
    /// World units of padding around the node bounding box.
    pub bounds_padding: f32,
    pub pan_friction: f32,
    pub pan_rest_threshold: f32,
    pub pan_pull_dragging: f32,
    pub pan_pull_released: f32,
    pub follow_lerp: f32,
    pub fit_duration: f32,
    pub top_margin: f32,
    pub bottom_margin: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            initial_zoom: 1.5,
            zoom_max: 5.0,
            zoom_floor: 0.05,
            zoom_friction: 0.88,
            zoom_snap_back_stiffness: 0.12,
            zoom_wheel_sensitivity: -0.000055,
            min_zoom_headroom: 0.8,
            bounds_padding: 80.0,
            pan_friction: 0.92,
            pan_rest_threshold: 0.01,
            pan_pull_dragging: 0.02,
            pan_pull_released: 0.08,
            follow_lerp: 0.08,
            fit_duration: 0.6,
            top_margin: 0.0,
            bottom_margin: 0.0,
        }
    }
}

/// Selection ring spring constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub vertex_count: usize,
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub base_stiffness: f32,
    pub stiffness_variation: f32,
    pub damping: f32,
    pub near_boost: f32,
    pub stretch_range: f32,
    pub appear_speed: f32,
    pub inner_stiffness_mult: f32,
    pub outer_stiffness_mult: f32,
    pub neighbor_stiffness: f32,
    pub neighbor_damping: f32,
    pub nav_max_distance: f32,
    /// Half-angle of the navigation cone, in radians.
    pub nav_cone_half: f32,
    pub nav_angle_weight: f32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            vertex_count: 32,
            inner_radius: 14.0,
            outer_radius: 20.0,
            base_stiffness: 180.0,
            stiffness_variation: 12.0,
            damping: 11.0,
            near_boost: 8.0,
            stretch_range: 80.0,
            appear_speed: 40.0,
            inner_stiffness_mult: 1.3,
            outer_stiffness_mult: 0.85,
            neighbor_stiffness: 40.0,
            neighbor_damping: 2.0,
            nav_max_distance: 300.0,
            nav_cone_half: std::f32::consts::FRAC_PI_3,
            nav_angle_weight: 0.6,
        }
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub max_voices: usize,
    pub peak_gain: f32,
    /// Fade-in applied to every new voice, in seconds.
    pub attack: f32,
    /// Fade-out applied to an evicted voice, in seconds.
    pub eviction_fade: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            max_voices: 8,
            peak_gain: 0.6,
            attack: 0.02,
            eviction_fade: 0.05,
        }
    }
}

/// Transport defaults and per-track limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub bpm: f32,
    pub swing: f32,
    pub bars: usize,
    pub default_scatter_radius: f32,
    /// Longest tail kept after the last step of a bounce, in seconds.
    pub bounce_max_tail: f32,
    /// Ring and follow the first node of every step that plays.
    pub follow_hits: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            swing: 0.0,
            bars: 1,
            default_scatter_radius: 30.0,
            bounce_max_tail: 2.0,
            follow_hits: false,
        }
    }
}
