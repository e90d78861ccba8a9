//! Force-directed refinement of the projected sample positions.
//!
//! The projection already places similar samples near each other; the
//! simulation only untangles overlaps and pulls each sample toward its nearest
//! neighbours so that clusters read clearly on screen.

use crate::config::LayoutConfig;
use crate::library::{SampleNode, Vec2};

const ALPHA_MIN: f32 = 0.001;
const ALPHA_DECAY_TICKS: f32 = 300.0;

/// Spring between two nodes of the neighbour graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborLink {
    pub source: usize,
    pub target: usize,
    /// Rest length of the spring in world units.
    pub distance: f32,
}

/// Undirected k-nearest-neighbour graph over the anchor coordinates.
#[derive(Debug, Clone, Default)]
pub struct NeighborGraph {
    pub links: Vec<NeighborLink>,
    pub neighbor_counts: Vec<usize>,
}

impl NeighborGraph {
    /// Every node links to its `k` closest anchors. Each undirected pair is
    /// emitted once; rest lengths scale with the distance relative to the
    /// largest pairwise distance.
    pub fn build(anchors: &[Vec2], config: &LayoutConfig) -> Self {
        let n = anchors.len();
        let mut graph = NeighborGraph {
            links: Vec::new(),
            neighbor_counts: vec![0; n],
        };
        if n < 2 {
            return graph;
        }

        let mut distances = vec![0.0_f32; n * n];
        let mut max_distance = 0.0_f32;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = anchors[i].distance(anchors[j]);
                distances[i * n + j] = d;
                distances[j * n + i] = d;
                max_distance = max_distance.max(d);
            }
        }
        if max_distance == 0.0 {
            max_distance = 1.0;
        }

        let mut linked = std::collections::HashSet::new();
        let span = config.link_distance_max - config.link_distance_min;
        for i in 0..n {
            let mut nearest: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            nearest.sort_by(|&a, &b| distances[i * n + a].total_cmp(&distances[i * n + b]));

            for &j in nearest.iter().take(config.neighbor_k) {
                let key = (i.min(j), i.max(j));
                if !linked.insert(key) {
                    continue;
                }
                let normalized = distances[i * n + j] / max_distance;
                graph.links.push(NeighborLink {
                    source: i,
                    target: j,
                    distance: config.link_distance_min + normalized * span,
                });
                graph.neighbor_counts[i] += 1;
                graph.neighbor_counts[j] += 1;
            }
        }

        graph
    }
}

/// Live force simulation over the node table.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
    graph: NeighborGraph,
    charges: Vec<f32>,
    alpha: f32,
    alpha_decay: f32,
    enabled: bool,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        let alpha_decay = 1.0 - ALPHA_MIN.powf(1.0 / ALPHA_DECAY_TICKS);
        Self {
            config,
            graph: NeighborGraph::default(),
            charges: Vec::new(),
            alpha: 1.0,
            alpha_decay,
            enabled: true,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn graph(&self) -> &NeighborGraph {
        &self.graph
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Builds the neighbour graph for a freshly loaded table and runs the
    /// synchronous pre-settle.
    pub fn rebuild(&mut self, nodes: &mut [SampleNode]) {
        let anchors: Vec<Vec2> = nodes.iter().map(|node| node.anchor).collect();
        self.graph = NeighborGraph::build(&anchors, &self.config);
        self.charges = self
            .graph
            .neighbor_counts
            .iter()
            .map(|&count| {
                let missing = self.config.neighbor_k as f32 - count as f32;
                self.config.charge_strength * (1.0 + missing * 0.15).max(0.5)
            })
            .collect();
        self.alpha = 1.0;

        for node in nodes.iter_mut() {
            node.position = node.anchor;
            node.velocity = Vec2::ZERO;
        }

        if !self.enabled {
            return;
        }
        for _ in 0..self.config.pre_settle_ticks {
            self.step(nodes);
        }
        tracing::debug!(
            nodes = nodes.len(),
            links = self.graph.links.len(),
            alpha = self.alpha,
            "layout pre-settled"
        );
    }

    /// Per-frame relaxation.
    pub fn tick(&mut self, nodes: &mut [SampleNode]) {
        if !self.enabled || nodes.len() != self.charges.len() {
            return;
        }
        for _ in 0..self.config.ticks_per_frame {
            self.step(nodes);
        }
    }

    /// Turning the simulation off snaps every node onto its anchor; turning it
    /// back on rebuilds and re-settles from scratch.
    pub fn set_enabled(&mut self, enabled: bool, nodes: &mut [SampleNode]) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.rebuild(nodes);
        } else {
            for node in nodes.iter_mut() {
                node.position = node.anchor;
                node.velocity = Vec2::ZERO;
            }
        }
    }

    /// Drops the graph; the engine calls this on teardown and reload.
    pub fn release(&mut self) {
        self.graph = NeighborGraph::default();
        self.charges.clear();
        self.alpha = 1.0;
    }

    fn step(&mut self, nodes: &mut [SampleNode]) {
        self.alpha += (0.0 - self.alpha) * self.alpha_decay;
        let alpha = self.alpha;

        self.apply_anchor_force(nodes, alpha);
        self.apply_links(nodes, alpha);
        self.apply_charge(nodes, alpha);
        self.apply_collisions(nodes);

        let keep = 1.0 - self.config.velocity_decay;
        for node in nodes.iter_mut() {
            node.velocity = node.velocity * keep;
            node.position += node.velocity;
        }
    }

    fn apply_anchor_force(&self, nodes: &mut [SampleNode], alpha: f32) {
        let strength = self.config.position_strength * alpha;
        for node in nodes.iter_mut() {
            let pull = (node.anchor - node.position) * strength;
            node.velocity += pull;
        }
    }

    fn apply_links(&self, nodes: &mut [SampleNode], alpha: f32) {
        let counts = &self.graph.neighbor_counts;
        for (index, link) in self.graph.links.iter().enumerate() {
            let (s, t) = (link.source, link.target);
            let mut delta = (nodes[t].position + nodes[t].velocity)
                - (nodes[s].position + nodes[s].velocity);
            if delta == Vec2::ZERO {
                delta = jiggle(index);
            }
            let length = delta.length();
            let stretch = (length - link.distance) / length * alpha * self.config.link_strength;
            let correction = delta * stretch;

            let bias = counts[s] as f32 / (counts[s] + counts[t]) as f32;
            nodes[t].velocity -= correction * bias;
            nodes[s].velocity += correction * (1.0 - bias);
        }
    }

    fn apply_charge(&self, nodes: &mut [SampleNode], alpha: f32) {
        let n = nodes.len();
        let positions: Vec<Vec2> = nodes.iter().map(|node| node.position).collect();
        for i in 0..n {
            let mut push = Vec2::ZERO;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mut delta = positions[j] - positions[i];
                if delta == Vec2::ZERO {
                    delta = jiggle(i * n + j);
                }
                let d2 = (delta.x * delta.x + delta.y * delta.y).max(1.0);
                push += delta * (self.charges[j] * alpha / d2);
            }
            nodes[i].velocity += push;
        }
    }

    fn apply_collisions(&self, nodes: &mut [SampleNode]) {
        let n = nodes.len();
        let radius = self.config.collide_radius;
        let reach = radius * 2.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let predicted_i = nodes[i].position + nodes[i].velocity;
                let predicted_j = nodes[j].position + nodes[j].velocity;
                let mut delta = predicted_i - predicted_j;
                if delta == Vec2::ZERO {
                    delta = jiggle(i * n + j);
                }
                let length = delta.length();
                if length >= reach {
                    continue;
                }
                // equal radii: each node takes half of the overlap
                let correction = delta * ((reach - length) / length * 0.5);
                nodes[i].velocity += correction;
                nodes[j].velocity -= correction;
            }
        }
    }
}

/// Deterministic stand-in for a random nudge when two points coincide.
fn jiggle(seed: usize) -> Vec2 {
    let angle = seed as f32 * 2.399_963;
    Vec2::from_angle(angle) * 1e-3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{NodeTable, SampleRecord};

    fn table(points: &[(f32, f32)]) -> NodeTable {
        let records: Vec<SampleRecord> = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| SampleRecord {
                name: format!("s{i}"),
                relative_path: format!("s{i}.wav"),
                category: "perc".to_string(),
                zone: None,
                x,
                y,
            })
            .collect();
        NodeTable::from_records(&records, 200.0)
    }

    #[test]
    fn link_lengths_follow_distance_rank() {
        let anchors = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(100.0, 0.0),
        ];
        let config = LayoutConfig {
            neighbor_k: 1,
            ..Default::default()
        };
        let graph = NeighborGraph::build(&anchors, &config);

        // 0<->1 once, 2 picks 1
        assert_eq!(graph.links.len(), 2);
        assert_eq!(graph.neighbor_counts, vec![1, 2, 1]);
        let short = graph.links[0].distance;
        let long = graph.links[1].distance;
        assert!((short - (8.0 + 0.1 * 52.0)).abs() < 1e-4);
        assert!((long - (8.0 + 0.9 * 52.0)).abs() < 1e-4);
    }

    #[test]
    fn corners_settle_without_overlap() {
        let mut nodes = table(&[
            (100.0, 100.0),
            (-100.0, 100.0),
            (100.0, -100.0),
            (-100.0, -100.0),
        ]);
        let config = LayoutConfig {
            neighbor_k: 3,
            ..Default::default()
        };
        let radius = config.collide_radius;
        let mut layout = LayoutEngine::new(config);
        layout.rebuild(nodes.as_mut_slice());

        assert_eq!(layout.graph().links.len(), 6);
        let slice = nodes.as_slice();
        for i in 0..slice.len() {
            for j in (i + 1)..slice.len() {
                let d = slice[i].position.distance(slice[j].position);
                assert!(d >= radius, "nodes {i} and {j} are {d} apart");
            }
        }
    }

    #[test]
    fn coincident_samples_are_separated() {
        let mut nodes = table(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (50.0, 50.0)]);
        let config = LayoutConfig::default();
        let radius = config.collide_radius;
        let mut layout = LayoutEngine::new(config);
        layout.rebuild(nodes.as_mut_slice());

        let slice = nodes.as_slice();
        assert!(slice[0].position.distance(slice[1].position) >= radius);
        assert!(slice[1].position.distance(slice[2].position) >= radius);
    }

    #[test]
    fn disabling_snaps_to_anchors_and_reenabling_resettles() {
        let mut nodes = table(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (5.0, 5.0)]);
        let mut layout = LayoutEngine::new(LayoutConfig::default());
        layout.rebuild(nodes.as_mut_slice());
        assert!(nodes.iter().any(|node| node.position != node.anchor));

        layout.set_enabled(false, nodes.as_mut_slice());
        assert!(nodes.iter().all(|node| node.position == node.anchor));
        layout.tick(nodes.as_mut_slice());
        assert!(nodes.iter().all(|node| node.position == node.anchor));

        layout.set_enabled(true, nodes.as_mut_slice());
        assert!(layout.alpha() < 0.01);
        assert!(nodes.iter().any(|node| node.position != node.anchor));
    }
}
