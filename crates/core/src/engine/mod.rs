//! The `SampleMap` ties every subsystem to one frame loop.
//!
//! Hosts forward pointer and keyboard events, call [`SampleMap::advance`]
//! once per display frame and [`SampleMap::poll_sequencer`] from whatever
//! clock drives playback. Nothing here blocks or spawns threads.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::audio::{AudioEngine, SampleBuffer, TriggerKind};
use crate::camera::{CameraController, Viewport};
use crate::config::EngineConfig;
use crate::layout::LayoutEngine;
use crate::library::{NodeId, NodeTable, SampleNode, SampleRecord, SampleSource, Vec2};
use crate::preset::Preset;
use crate::record::{self, Bounce, RecordingSettings};
use crate::render::{DrawList, Renderer, Scene, SAMPLE_RADIUS};
use crate::ring::{navigate, Direction, SelectionRing};
use crate::sequencer::{Sequencer, StepHits};
use crate::{Result, SampleMapError};

/// Frames longer than this are treated as this long.
pub const MAX_FRAME_DT: f32 = 0.05;
/// Pointer travel in pixels below which a press counts as a click.
pub const CLICK_SLOP: f32 = 5.0;
/// Extra hit radius around a dot, in world units.
const HIT_SLACK: f32 = 8.0;

#[derive(Debug, Clone, Copy)]
struct Press {
    origin: Vec2,
    distance: f32,
}

pub struct SampleMap {
    config: EngineConfig,
    nodes: NodeTable,
    layout: LayoutEngine,
    camera: CameraController,
    ring: SelectionRing,
    audio: AudioEngine,
    sequencer: Sequencer,
    renderer: Renderer,
    rng: StdRng,
    pointer: Option<Vec2>,
    press: Option<Press>,
    hovered: Option<NodeId>,
    running: bool,
    elapsed: f32,
}

impl SampleMap {
    /// Builds the node table, pre-settles the layout and frames the camera
    /// on the origin.
    pub fn new(
        records: &[SampleRecord],
        source: Box<dyn SampleSource>,
        config: EngineConfig,
        viewport: Viewport,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(SampleMapError::EmptyLibrary);
        }

        let mut nodes = NodeTable::from_records(records, config.layout.world_half_span);
        let mut layout = LayoutEngine::new(config.layout.clone());
        layout.rebuild(nodes.as_mut_slice());
        tracing::info!(samples = nodes.len(), "sample map loaded");

        Ok(Self {
            camera: CameraController::new(config.camera.clone(), viewport),
            ring: SelectionRing::new(config.ring.clone()),
            audio: AudioEngine::new(config.audio.clone(), source),
            sequencer: Sequencer::new(config.sequencer.clone()),
            renderer: Renderer::new(),
            rng: StdRng::from_entropy(),
            pointer: None,
            press: None,
            hovered: None,
            running: true,
            elapsed: 0.0,
            nodes,
            layout,
            config,
        })
    }

    /// Replaces the random source used for scatter and sample substitution.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    pub fn layout(&self) -> &LayoutEngine {
        &self.layout
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn ring(&self) -> &SelectionRing {
        &self.ring
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.audio
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    /// Last draw list produced by [`SampleMap::advance`].
    pub fn frame(&self) -> &DrawList {
        self.renderer.frame()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Seconds of frame time since load or the last reset.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Audio stays silent until the first user gesture calls this.
    pub fn unlock_audio(&mut self) {
        self.audio.unlock();
    }

    /// One display frame.
    pub fn advance(&mut self, dt: f32) -> &DrawList {
        if !self.running {
            return self.renderer.frame();
        }
        let dt = dt.clamp(0.0, MAX_FRAME_DT);
        self.elapsed += dt;

        self.layout.tick(self.nodes.as_mut_slice());
        for node in self.nodes.iter_mut() {
            node.decay_glow(dt);
        }
        self.update_hover();
        self.ring.update(dt, self.nodes.as_slice());
        self.camera
            .update(dt, self.nodes.bounds(self.config.camera.bounds_padding));

        self.audio.pump();
        self.audio.advance(dt);

        self.renderer.set_highlighted(
            self.sequencer
                .tracks()
                .iter()
                .filter_map(|track| track.sample),
        );
        self.renderer.draw(Scene {
            nodes: self.nodes.as_slice(),
            camera: &self.camera,
            ring: &self.ring,
            hovered: self.hovered,
            time: self.elapsed,
        })
    }

    fn hit_test(&self, screen: Vec2) -> Option<NodeId> {
        let world = self.camera.screen_to_world(screen);
        let radius = SAMPLE_RADIUS / self.camera.camera().zoom + HIT_SLACK;
        self.nodes
            .iter()
            .map(|node| (node.id, node.position.distance(world)))
            .filter(|&(_, distance)| distance < radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn update_hover(&mut self) {
        let Some(pointer) = self.pointer else {
            for node in self.nodes.iter_mut() {
                node.hovered = false;
            }
            self.hovered = None;
            self.audio.set_intended(None);
            return;
        };

        let hit = self.hit_test(pointer);
        for node in self.nodes.iter_mut() {
            node.hovered = Some(node.id) == hit;
        }

        if !self.ring.is_active() {
            match hit.and_then(|id| self.nodes.get_mut(id)) {
                Some(node) => {
                    node.flash();
                    if self.audio.intended() != Some(node.id) {
                        self.audio.set_intended(Some(node.id));
                        self.audio.trigger(node, 1.0, TriggerKind::Hover);
                    }
                }
                None => self.audio.set_intended(None),
            }
        }
        self.hovered = hit;
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.camera.resize(width, height);
    }

    /// Reserves strips at the top and bottom of the viewport for overlays.
    pub fn set_margins(&mut self, top: f32, bottom: f32) {
        self.camera.set_margins(top, bottom);
    }

    pub fn on_pointer_down(&mut self, screen: Vec2) {
        self.audio.unlock();
        self.pointer = Some(screen);
        self.press = Some(Press {
            origin: screen,
            distance: 0.0,
        });
        self.camera.begin_drag(screen);
    }

    pub fn on_pointer_move(&mut self, screen: Vec2) {
        self.pointer = Some(screen);
        let Some(press) = self.press.as_mut() else {
            return;
        };
        self.camera.drag_to(screen);
        press.distance = screen.distance(press.origin);
        if press.distance >= CLICK_SLOP && self.ring.is_active() {
            self.ring.dismiss();
            self.camera.stop_follow();
        }
    }

    /// Ends a press. A press that barely moved is a click; returns the node
    /// it selected.
    pub fn on_pointer_up(&mut self, screen: Option<Vec2>) -> Option<NodeId> {
        self.camera.end_drag();
        let press = self.press.take()?;
        let at = screen?;
        if press.distance >= CLICK_SLOP {
            return None;
        }

        match self.hit_test(at) {
            Some(id) => {
                self.select(id);
                Some(id)
            }
            None => {
                self.dismiss_selection();
                None
            }
        }
    }

    pub fn on_pointer_leave(&mut self) {
        self.pointer = None;
        if self.press.take().is_some() {
            self.camera.end_drag();
        }
    }

    pub fn on_wheel(&mut self, delta_y: f32, screen: Vec2) {
        self.camera.wheel(delta_y, screen);
    }

    pub fn on_escape(&mut self) {
        self.dismiss_selection();
    }

    /// Moves the selection to the best node in `direction`. Samples already
    /// used by other tracks are skipped while a track is armed.
    pub fn on_arrow_key(&mut self, direction: Direction) -> Option<NodeId> {
        if !self.ring.is_active() {
            return None;
        }
        let from = self.ring.node()?;
        let excluded = self
            .sequencer
            .armed()
            .map(|track| self.sequencer.excluded_for(track))
            .unwrap_or_default();

        let target = navigate(
            &self.config.ring,
            self.nodes.as_slice(),
            from,
            direction,
            &excluded,
        )?;
        self.select(target);
        Some(target)
    }

    /// Rings, plays and follows `id`. Returns `false` for unknown ids.
    pub fn focus_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.flash();
        let node = &*node;
        self.ring.select(node);
        self.audio.set_intended(Some(id));
        self.audio.trigger(node, 1.0, TriggerKind::Forced);
        self.camera.follow(node.position);
        true
    }

    fn select(&mut self, id: NodeId) {
        if !self.focus_node(id) {
            return;
        }
        if let Some(track) = self.sequencer.assign_armed(id) {
            tracing::debug!(track, node = %id, "assigned selection to armed track");
        }
    }

    fn dismiss_selection(&mut self) {
        if self.ring.is_active() {
            self.ring.dismiss();
            self.camera.stop_follow();
        }
    }

    pub fn zoom_to_fit(&mut self) {
        let bounds = self.nodes.bounds(self.config.camera.bounds_padding);
        self.camera.zoom_to_fit(bounds);
    }

    /// Turns the force simulation on or off.
    pub fn set_layout_enabled(&mut self, enabled: bool) {
        self.layout.set_enabled(enabled, self.nodes.as_mut_slice());
    }

    /// Starts the transport and plays step 0.
    pub fn start_sequencer(&mut self, now_ms: f64) -> StepHits {
        self.audio.unlock();
        let hits = self
            .sequencer
            .start(now_ms, &self.nodes, &mut self.rng);
        self.play_hits(&hits);
        hits
    }

    /// Fires the next step if it is due.
    pub fn poll_sequencer(&mut self, now_ms: f64) -> Option<StepHits> {
        if !self.running {
            return None;
        }
        let hits = self.sequencer.poll(now_ms, &self.nodes, &mut self.rng)?;
        self.play_hits(&hits);
        Some(hits)
    }

    pub fn stop_sequencer(&mut self) {
        self.sequencer.stop();
    }

    fn play_hits(&mut self, hits: &StepHits) {
        for hit in &hits.hits {
            let Some(node) = self.nodes.get_mut(hit.node) else {
                continue;
            };
            node.flash();
            self.audio.trigger(node, hit.volume, TriggerKind::Forced);
        }

        if self.config.sequencer.follow_hits {
            if let Some(node) = hits.hits.first().and_then(|hit| self.nodes.get(hit.node)) {
                self.ring.select(node);
                self.camera.follow(node.position);
            }
        }
    }

    pub fn randomize_tracks(&mut self) {
        self.sequencer.randomize(&self.nodes, &mut self.rng);
    }

    pub fn apply_preset(&mut self, preset: &Preset) {
        preset.apply(&mut self.sequencer, &self.nodes, &mut self.rng);
    }

    pub fn capture_preset(&self, name: impl Into<String>) -> Preset {
        Preset::capture(name, &self.sequencer, &self.nodes)
    }

    /// Decoded buffer for `id`, loading it now if needed.
    pub fn sample_buffer(&mut self, id: NodeId) -> Result<Arc<SampleBuffer>> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| SampleMapError::msg(format!("no sample {id}")))?;
        self.audio.buffer_for(node)
    }

    /// Renders one pass of the current pattern offline.
    pub fn bounce(&mut self, settings: &RecordingSettings) -> Result<Bounce> {
        let audio = &mut self.audio;
        record::bounce(
            &self.sequencer,
            &self.nodes,
            settings,
            &mut self.rng,
            |node: &SampleNode| audio.buffer_for(node),
        )
    }

    /// Clears selection, hover, playback and the camera without reloading.
    pub fn reset(&mut self) {
        self.sequencer.stop();
        self.audio.stop_all();
        self.audio.set_intended(None);
        self.ring = SelectionRing::new(self.config.ring.clone());
        self.camera.reset();
        self.pointer = None;
        self.press = None;
        self.hovered = None;
        self.elapsed = 0.0;
        for node in self.nodes.iter_mut() {
            node.glow = 0.0;
            node.hovered = false;
        }
    }

    /// Stops the frame loop and everything it drives.
    pub fn teardown(&mut self) {
        self.running = false;
        self.sequencer.stop();
        self.audio.stop_all();
        self.layout.release();
        tracing::info!("sample map torn down");
    }
}

impl std::fmt::Debug for SampleMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleMap")
            .field("nodes", &self.nodes.len())
            .field("camera", &self.camera.camera())
            .field("selected", &self.ring.node())
            .field("hovered", &self.hovered)
            .field("audio", &self.audio)
            .field("running", &self.running)
            .finish()
    }
}
