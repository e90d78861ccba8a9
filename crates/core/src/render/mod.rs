//! Per-frame draw list in screen space.
//!
//! The renderer does no drawing itself. Hosts walk the [`DrawList`] and paint
//! it with whatever backend they have.

use std::collections::HashSet;

use crate::camera::CameraController;
use crate::library::{NodeId, Rgb, SampleNode, Vec2};
use crate::ring::SelectionRing;

/// Dot radius in world units.
pub const SAMPLE_RADIUS: f32 = 6.0;
const GLOW_CULL_MARGIN: f32 = 50.0;
const CORE_CULL_MARGIN: f32 = 30.0;
const DIMMED: f32 = 0.35;
const RING_MIN_VISIBILITY: f32 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct Dot {
    pub node: NodeId,
    pub position: Vec2,
    pub radius: f32,
    pub color: Rgb,
    pub alpha: f32,
    pub glow_radius: f32,
    pub glow_alpha: f32,
    pub hovered: bool,
}

/// The ring as two closed screen-space polygons; fill the area between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RingShape {
    pub inner: Vec<Vec2>,
    pub outer: Vec<Vec2>,
    pub alpha: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hud {
    pub sample_count: usize,
    pub hovered: Option<String>,
    pub selected: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    pub dots: Vec<Dot>,
    pub ring: Option<RingShape>,
    /// Outline through the samples the sequencer uses, sorted by angle.
    pub sequence_outline: Vec<Vec2>,
    pub hud: Hud,
}

/// Everything a frame is drawn from.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub nodes: &'a [SampleNode],
    pub camera: &'a CameraController,
    pub ring: &'a SelectionRing,
    pub hovered: Option<NodeId>,
    /// Seconds since start, drives the idle pulse.
    pub time: f32,
}

#[derive(Debug, Default)]
pub struct Renderer {
    highlighted: HashSet<NodeId>,
    frame: DrawList,
    frames_drawn: u64,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes outside a non-empty highlight set are drawn dimmed.
    pub fn set_highlighted(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.highlighted = nodes.into_iter().collect();
    }

    pub fn frame(&self) -> &DrawList {
        &self.frame
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn draw(&mut self, scene: Scene<'_>) -> &DrawList {
        let viewport = scene.camera.viewport();
        let zoom = scene.camera.camera().zoom;
        let glow_scale = zoom.min(1.2);
        let dimming = !self.highlighted.is_empty();

        let visible = |p: Vec2, margin: f32| {
            p.x >= -margin
                && p.x <= viewport.width + margin
                && p.y >= -margin
                && p.y <= viewport.height + margin
        };

        let mut dots = Vec::with_capacity(scene.nodes.len());
        for node in scene.nodes {
            let position = scene.camera.world_to_screen(node.position);
            if !visible(position, GLOW_CULL_MARGIN) {
                continue;
            }
            let dim = if dimming && !self.highlighted.contains(&node.id) {
                DIMMED
            } else {
                1.0
            };
            let pulse = 0.5 + 0.5 * (scene.time * 2.0 + node.anchor.x * 0.05).sin();
            let core_visible = visible(position, CORE_CULL_MARGIN);
            dots.push(Dot {
                node: node.id,
                position,
                radius: if core_visible { SAMPLE_RADIUS * zoom } else { 0.0 },
                color: node.color,
                alpha: (0.85 + node.glow * 0.15) * dim,
                glow_radius: SAMPLE_RADIUS * (2.5 + node.glow * 4.0) * glow_scale,
                glow_alpha: (0.04 + pulse * 0.03 + node.glow * 0.25) * dim,
                hovered: node.hovered,
            });
        }

        let ring = (scene.ring.is_active() && scene.ring.visibility() >= RING_MIN_VISIBILITY)
            .then(|| RingShape {
                inner: scene
                    .ring
                    .vertices()
                    .iter()
                    .map(|v| scene.camera.world_to_screen(v.inner))
                    .collect(),
                outer: scene
                    .ring
                    .vertices()
                    .iter()
                    .map(|v| scene.camera.world_to_screen(v.outer))
                    .collect(),
                alpha: scene.ring.visibility() * 0.6,
            });

        let name_of = |id: Option<NodeId>| {
            id.and_then(|id| scene.nodes.get(id.0))
                .map(|node| node.name.clone())
        };

        self.frame = DrawList {
            dots,
            ring,
            sequence_outline: self.outline(scene),
            hud: Hud {
                sample_count: scene.nodes.len(),
                hovered: name_of(scene.hovered),
                selected: name_of(scene.ring.node()),
            },
        };
        self.frames_drawn += 1;
        &self.frame
    }

    fn outline(&self, scene: Scene<'_>) -> Vec<Vec2> {
        if self.highlighted.len() < 2 {
            return Vec::new();
        }
        let points: Vec<Vec2> = self
            .highlighted
            .iter()
            .filter_map(|id| scene.nodes.get(id.0))
            .map(|node| node.position)
            .collect();
        let centroid =
            points.iter().fold(Vec2::ZERO, |acc, p| acc + *p) * (1.0 / points.len() as f32);
        let mut sorted = points;
        sorted.sort_by(|a, b| {
            let angle = |p: &Vec2| (p.y - centroid.y).atan2(p.x - centroid.x);
            angle(a).total_cmp(&angle(b))
        });
        sorted
            .into_iter()
            .map(|p| scene.camera.world_to_screen(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Viewport;
    use crate::config::{CameraConfig, RingConfig};
    use crate::fixtures::record;
    use crate::library::NodeTable;

    fn scene_parts() -> (NodeTable, CameraController, SelectionRing) {
        let records = vec![
            record("a", "kick", 0.0, 0.0),
            record("b", "kick", 10.0, 0.0),
            record("c", "snare", 0.0, 10.0),
            record("east", "snare", 1000.0, 0.0),
            record("west", "snare", -1000.0, 0.0),
        ];
        let nodes = NodeTable::from_records(&records, 200.0);
        let camera = CameraController::new(CameraConfig::default(), Viewport::new(200.0, 200.0));
        (nodes, camera, SelectionRing::new(RingConfig::default()))
    }

    #[test]
    fn culls_offscreen_nodes_and_dims_unhighlighted() {
        let (nodes, camera, ring) = scene_parts();
        let mut renderer = Renderer::new();
        renderer.set_highlighted([NodeId(0), NodeId(1)]);

        let frame = renderer.draw(Scene {
            nodes: nodes.as_slice(),
            camera: &camera,
            ring: &ring,
            hovered: Some(NodeId(2)),
            time: 0.0,
        });

        // east and west sit 300 px either side of a 200 px viewport
        assert_eq!(frame.dots.len(), 3);
        assert!(frame.dots.iter().all(|d| d.node.0 < 3));
        let dimmed = frame.dots.iter().find(|d| d.node == NodeId(2)).unwrap();
        assert!((dimmed.alpha - 0.85 * DIMMED).abs() < 1e-6);
        assert_eq!(frame.sequence_outline.len(), 2);
        assert_eq!(frame.hud.hovered.as_deref(), Some("c"));
        assert_eq!(frame.hud.selected, None);
        assert!(frame.ring.is_none());
    }

    #[test]
    fn ring_is_drawn_once_visible() {
        let (nodes, camera, mut ring) = scene_parts();
        ring.select(nodes.get(NodeId(0)).unwrap());
        for _ in 0..10 {
            ring.update(1.0 / 60.0, nodes.as_slice());
        }
        let mut renderer = Renderer::new();
        let frame = renderer.draw(Scene {
            nodes: nodes.as_slice(),
            camera: &camera,
            ring: &ring,
            hovered: None,
            time: 1.0,
        });

        let shape = frame.ring.as_ref().unwrap();
        assert_eq!(shape.inner.len(), 32);
        assert_eq!(shape.outer.len(), 32);
        assert_eq!(frame.hud.selected.as_deref(), Some("a"));
        assert_eq!(renderer.frames_drawn(), 1);
    }
}
