//! Spring-physics focus indicator and keyboard navigation between nodes.

use std::collections::HashSet;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::config::RingConfig;
use crate::library::{NodeId, SampleNode, Vec2};

/// Below this visibility a dismissing ring switches itself off.
const VANISH_THRESHOLD: f32 = 0.005;
/// Candidates closer than this count as the same spot.
const NAV_MIN_DISTANCE: f32 = 0.01;

/// Arrow-key direction in screen space (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn angle(self) -> f32 {
        match self {
            Direction::Right => 0.0,
            Direction::Down => FRAC_PI_2,
            Direction::Left => PI,
            Direction::Up => -FRAC_PI_2,
        }
    }
}

/// Spring state of one inner/outer vertex pair.
#[derive(Debug, Clone, Copy)]
pub struct RingVertex {
    pub inner: Vec2,
    pub inner_velocity: Vec2,
    pub outer: Vec2,
    pub outer_velocity: Vec2,
    stiffness_bias: f32,
}

impl RingVertex {
    fn reset(&mut self, center: Vec2) {
        self.inner = center;
        self.outer = center;
        self.inner_velocity = Vec2::ZERO;
        self.outer_velocity = Vec2::ZERO;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct VertexForce {
    inner: Vec2,
    outer: Vec2,
}

/// Two concentric polygons that spring toward circles around the focused
/// node.
#[derive(Debug, Clone)]
pub struct SelectionRing {
    config: RingConfig,
    active: bool,
    node: Option<NodeId>,
    visibility: f32,
    target_visibility: f32,
    vertices: Vec<RingVertex>,
    forces: Vec<VertexForce>,
}

impl SelectionRing {
    pub fn new(config: RingConfig) -> Self {
        let count = config.vertex_count.max(3);
        let vertices = (0..count)
            .map(|i| {
                let phase = i as f32 / count as f32 * TAU;
                RingVertex {
                    inner: Vec2::ZERO,
                    inner_velocity: Vec2::ZERO,
                    outer: Vec2::ZERO,
                    outer_velocity: Vec2::ZERO,
                    stiffness_bias: config.base_stiffness
                        + (phase * 2.7 + 1.3).sin() * config.stiffness_variation,
                }
            })
            .collect();
        Self {
            forces: vec![VertexForce::default(); count],
            config,
            active: false,
            node: None,
            visibility: 0.0,
            target_visibility: 0.0,
            vertices,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn visibility(&self) -> f32 {
        self.visibility
    }

    pub fn vertices(&self) -> &[RingVertex] {
        &self.vertices
    }

    /// Gap between the polygons that the constraint keeps open.
    pub fn min_thickness(&self) -> f32 {
        (self.config.outer_radius - self.config.inner_radius) * self.visibility
    }

    /// Binds the ring to `node`. A ring that was hidden grows out of the node
    /// centre; a visible ring springs over from where it is.
    pub fn select(&mut self, node: &SampleNode) {
        let was_active = self.active;
        self.active = true;
        self.node = Some(node.id);
        self.target_visibility = 1.0;

        if !was_active {
            self.visibility = 0.0;
            for vertex in &mut self.vertices {
                vertex.reset(node.position);
            }
        }
    }

    pub fn dismiss(&mut self) {
        self.target_visibility = 0.0;
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.node = None;
        self.visibility = 0.0;
        self.target_visibility = 0.0;
    }

    fn vertex_angle(&self, index: usize) -> f32 {
        index as f32 / self.vertices.len() as f32 * TAU - FRAC_PI_2
    }

    /// One integration step. `nodes` is the live node table.
    pub fn update(&mut self, dt: f32, nodes: &[SampleNode]) {
        if !self.active {
            return;
        }
        let Some(center) = self.node.and_then(|id| nodes.get(id.0)).map(|n| n.position) else {
            tracing::debug!("focused node vanished, hiding ring");
            self.deactivate();
            return;
        };

        self.visibility +=
            (self.target_visibility - self.visibility) * (self.config.appear_speed * dt).min(1.0);
        if self.target_visibility == 0.0 && self.visibility < VANISH_THRESHOLD {
            self.deactivate();
            return;
        }

        let inner_radius = self.config.inner_radius * self.visibility;
        let outer_radius = self.config.outer_radius * self.visibility;
        let min_thickness = self.min_thickness();

        self.compute_forces(center, inner_radius, outer_radius);

        for index in 0..self.vertices.len() {
            let radial = Vec2::from_angle(self.vertex_angle(index));
            let force = self.forces[index];
            let vertex = &mut self.vertices[index];

            vertex.inner_velocity += force.inner * dt;
            vertex.inner += vertex.inner_velocity * dt;
            vertex.outer_velocity += force.outer * dt;
            vertex.outer += vertex.outer_velocity * dt;

            if min_thickness > 0.0 && vertex.outer.distance(vertex.inner) < min_thickness {
                vertex.outer = vertex.inner + radial * min_thickness;
                let closing = (vertex.outer_velocity - vertex.inner_velocity).dot(radial);
                if closing < 0.0 {
                    vertex.outer_velocity -= radial * closing;
                }
            }
        }
    }

    /// Reads every vertex before any is moved.
    fn compute_forces(&mut self, center: Vec2, inner_radius: f32, outer_radius: f32) {
        let count = self.vertices.len();
        let cfg = &self.config;

        for index in 0..count {
            let vertex = &self.vertices[index];
            let prev = &self.vertices[(index + count - 1) % count];
            let next = &self.vertices[(index + 1) % count];
            let radial = Vec2::from_angle(index as f32 / count as f32 * TAU - FRAC_PI_2);

            let spring = |position: Vec2, velocity: Vec2, radius: f32, mult: f32| {
                let offset = center + radial * radius - position;
                let closeness = 1.0 - (offset.length() / cfg.stretch_range).min(1.0);
                let factor = 1.0 + cfg.near_boost * closeness * closeness;
                let stiffness = vertex.stiffness_bias * mult * factor;
                let damping = cfg.damping * factor.powf(0.75);
                offset * stiffness - velocity * damping
            };
            let cohesion =
                |position: Vec2, velocity: Vec2, prev: (Vec2, Vec2), next: (Vec2, Vec2)| {
                    let midpoint = (prev.0 + next.0) * 0.5;
                    (midpoint - position) * cfg.neighbor_stiffness
                        + (prev.1 + next.1 - velocity * 2.0) * cfg.neighbor_damping
                };

            let inner = spring(
                vertex.inner,
                vertex.inner_velocity,
                inner_radius,
                cfg.inner_stiffness_mult,
            ) + cohesion(
                vertex.inner,
                vertex.inner_velocity,
                (prev.inner, prev.inner_velocity),
                (next.inner, next.inner_velocity),
            );
            let outer = spring(
                vertex.outer,
                vertex.outer_velocity,
                outer_radius,
                cfg.outer_stiffness_mult,
            ) + cohesion(
                vertex.outer,
                vertex.outer_velocity,
                (prev.outer, prev.outer_velocity),
                (next.outer, next.outer_velocity),
            );

            self.forces[index] = VertexForce { inner, outer };
        }
    }
}

/// Picks the node an arrow key should move the selection to, or `None` when
/// nothing qualifies.
pub fn navigate(
    config: &RingConfig,
    nodes: &[SampleNode],
    from: NodeId,
    direction: Direction,
    excluded: &HashSet<NodeId>,
) -> Option<NodeId> {
    let origin = nodes.get(from.0)?.position;
    let heading = direction.angle();

    let mut best: Option<(f32, NodeId)> = None;
    for node in nodes {
        if node.id == from || excluded.contains(&node.id) {
            continue;
        }
        let offset = node.position - origin;
        let distance = offset.length();
        if distance < NAV_MIN_DISTANCE || distance > config.nav_max_distance {
            continue;
        }
        let deviation = wrap_angle(offset.y.atan2(offset.x) - heading).abs();
        if deviation > config.nav_cone_half {
            continue;
        }
        let score = distance * (1.0 + deviation * config.nav_angle_weight);
        // strict comparison keeps the lowest index on ties
        if best.map_or(true, |(best_score, _)| score < best_score) {
            best = Some((score, node.id));
        }
    }
    best.map(|(_, id)| id)
}

fn wrap_angle(mut angle: f32) -> f32 {
    while angle > PI {
        angle -= TAU;
    }
    while angle < -PI {
        angle += TAU;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Rgb;

    fn node(index: usize, x: f32, y: f32) -> SampleNode {
        SampleNode {
            id: NodeId(index),
            name: format!("n{index}"),
            relative_path: format!("n{index}.wav"),
            category: "kick".to_string(),
            zone: "kick".to_string(),
            color: Rgb { r: 0, g: 0, b: 0 },
            anchor: Vec2::new(x, y),
            position: Vec2::new(x, y),
            velocity: Vec2::ZERO,
            glow: 0.0,
            hovered: false,
        }
    }

    fn assert_thickness(ring: &SelectionRing) {
        let min = ring.min_thickness();
        for vertex in ring.vertices() {
            assert!(vertex.outer.distance(vertex.inner) >= min - 1e-3);
        }
    }

    #[test]
    fn grows_from_centre_and_keeps_minimum_thickness() {
        let nodes = vec![node(0, 10.0, -5.0), node(1, 120.0, 40.0)];
        let mut ring = SelectionRing::new(RingConfig::default());
        ring.select(&nodes[0]);
        assert!(ring.vertices().iter().all(|v| v.inner == nodes[0].position));

        for _ in 0..90 {
            ring.update(1.0 / 60.0, &nodes);
            assert_thickness(&ring);
        }
        assert!(ring.visibility() > 0.99);
        let top = ring.vertices()[0];
        assert!(top.inner.distance(Vec2::new(10.0, -19.0)) < 1.0);

        // re-target while visible keeps the vertices where they are
        ring.select(&nodes[1]);
        assert!(ring.vertices()[0].inner.distance(top.inner) < 1e-6);
        for _ in 0..180 {
            ring.update(1.0 / 60.0, &nodes);
            assert_thickness(&ring);
        }
        assert!(ring.vertices()[0].outer.distance(Vec2::new(120.0, 20.0)) < 1.5);
    }

    #[test]
    fn dismiss_fades_out_then_drops_node() {
        let nodes = vec![node(0, 0.0, 0.0)];
        let mut ring = SelectionRing::new(RingConfig::default());
        ring.select(&nodes[0]);
        for _ in 0..30 {
            ring.update(1.0 / 60.0, &nodes);
        }
        ring.dismiss();
        for _ in 0..60 {
            ring.update(1.0 / 60.0, &nodes);
        }
        assert!(!ring.is_active());
        assert_eq!(ring.node(), None);
    }

    #[test]
    fn missing_node_deactivates() {
        let nodes = vec![node(0, 0.0, 0.0), node(1, 5.0, 0.0)];
        let mut ring = SelectionRing::new(RingConfig::default());
        ring.select(&nodes[1]);
        ring.update(1.0 / 60.0, &nodes[..1]);
        assert!(!ring.is_active());
    }

    #[test]
    fn navigation_prefers_close_aligned_nodes() {
        let config = RingConfig::default();
        let nodes = vec![
            node(0, 0.0, 0.0),
            node(1, 50.0, 0.0),
            node(2, 90.0, 5.0),
            node(3, 80.0, 40.0),
            node(4, 0.0, -60.0),
            node(5, 400.0, 0.0),
        ];
        let none = HashSet::new();

        assert_eq!(navigate(&config, &nodes, NodeId(0), Direction::Right, &none), Some(NodeId(1)));
        assert_eq!(navigate(&config, &nodes, NodeId(1), Direction::Right, &none), Some(NodeId(2)));
        assert_eq!(navigate(&config, &nodes, NodeId(2), Direction::Down, &none), Some(NodeId(3)));
        assert_eq!(navigate(&config, &nodes, NodeId(0), Direction::Up, &none), Some(NodeId(4)));
        assert_eq!(navigate(&config, &nodes, NodeId(0), Direction::Left, &none), None);

        let excluded: HashSet<NodeId> = [NodeId(1)].into_iter().collect();
        assert_eq!(
            navigate(&config, &nodes, NodeId(0), Direction::Right, &excluded),
            Some(NodeId(2))
        );
    }

    #[test]
    fn navigation_ties_go_to_lowest_index() {
        let config = RingConfig::default();
        let nodes = vec![node(0, 0.0, 0.0), node(1, 30.0, 10.0), node(2, 30.0, -10.0)];
        let picked = navigate(&config, &nodes, NodeId(0), Direction::Right, &HashSet::new());
        assert_eq!(picked, Some(NodeId(1)));
    }
}
