//! Sample records, the live node table and the collaborators that feed it.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, SampleMapError};

/// Seconds for a full glow to fade back to zero is `1 / GLOW_DECAY`.
pub const GLOW_DECAY: f32 = 2.0;

/// Plain 2D vector used for both world and screen space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (self - other).length()
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        self + (other - self) * t
    }

    pub fn from_angle(angle: f32) -> Vec2 {
        Vec2::new(angle.cos(), angle.sin())
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

/// Index of a node in the authoritative node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample-{}", self.0)
    }
}

/// One entry of the externally produced sample list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    pub name: String,
    pub relative_path: String,
    pub category: String,
    #[serde(default)]
    pub zone: Option<String>,
    pub x: f32,
    pub y: f32,
}

impl SampleRecord {
    fn is_usable(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && !self.relative_path.is_empty()
    }
}

/// Parses a sample list, dropping every entry that is malformed.
pub fn parse_sample_list(json: &str) -> Result<Vec<SampleRecord>> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let total = raw.len();
    let records: Vec<SampleRecord> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value::<SampleRecord>(value).ok())
        .filter(SampleRecord::is_usable)
        .collect();

    if records.len() < total {
        tracing::warn!(
            dropped = total - records.len(),
            kept = records.len(),
            "dropped malformed sample list entries"
        );
    }
    Ok(records)
}

/// sRGB colour assigned to a node once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Converts HSL (hue in degrees, saturation and lightness in percent).
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let s = (saturation / 100.0).clamp(0.0, 1.0);
        let l = (lightness / 100.0).clamp(0.0, 1.0);
        let a = s * l.min(1.0 - l);
        let channel = |n: f32| {
            let k = (n + hue / 30.0).rem_euclid(12.0);
            let value = l - a * (k - 3.0).min(9.0 - k).clamp(-1.0, 1.0);
            (value * 255.0).round().clamp(0.0, 255.0) as u8
        };
        Self {
            r: channel(0.0),
            g: channel(8.0),
            b: channel(4.0),
        }
    }

    /// Angle around the origin picks the hue, distance picks saturation and
    /// lightness.
    pub fn from_polar(position: Vec2, half_span: f32) -> Self {
        let angle = position.y.atan2(position.x);
        let hue = (angle / PI + 1.0) / 2.0 * 360.0;
        let radial = (position.length() / half_span.max(f32::EPSILON)).min(1.0);
        Self::from_hsl(hue, 55.0 + 30.0 * radial, 58.0 + 12.0 * radial)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A sample on the map.
#[derive(Debug, Clone)]
pub struct SampleNode {
    pub id: NodeId,
    pub name: String,
    pub relative_path: String,
    pub category: String,
    pub zone: String,
    pub color: Rgb,
    /// Normalised projection coordinate; never changes after load.
    pub anchor: Vec2,
    pub position: Vec2,
    pub velocity: Vec2,
    pub glow: f32,
    pub hovered: bool,
}

impl SampleNode {
    /// Lights the node up; the glow then fades in [`SampleNode::decay_glow`].
    pub fn flash(&mut self) {
        self.glow = 1.0;
    }

    pub fn decay_glow(&mut self, dt: f32) {
        if self.glow > 0.0 {
            self.glow = (self.glow - GLOW_DECAY * dt).max(0.0);
        }
    }
}

/// Centres raw projected coordinates and scales the larger axis to
/// `±half_span`.
pub fn normalize_coordinates(points: &[(f32, f32)], half_span: f32) -> Vec<Vec2> {
    if points.is_empty() {
        return Vec::new();
    }

    let (mut min_x, mut max_x) = (f32::INFINITY, f32::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f32::INFINITY, f32::NEG_INFINITY);
    for &(x, y) in points {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    let range_x = non_zero(max_x - min_x);
    let range_y = non_zero(max_y - min_y);
    let mid = Vec2::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
    let scale = half_span / range_x.max(range_y) * 2.0;

    points
        .iter()
        .map(|&(x, y)| (Vec2::new(x, y) - mid) * scale)
        .collect()
}

fn non_zero(range: f32) -> f32 {
    if range > 0.0 {
        range
    } else {
        1.0
    }
}

/// The authoritative, ordered table of nodes for one loaded library.
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    nodes: Vec<SampleNode>,
    by_path: HashMap<String, NodeId>,
}

impl NodeTable {
    /// Builds the node table from the sample list. Live positions start at
    /// the anchors.
    pub fn from_records(records: &[SampleRecord], half_span: f32) -> Self {
        let raw: Vec<(f32, f32)> = records.iter().map(|r| (r.x, r.y)).collect();
        let anchors = normalize_coordinates(&raw, half_span);

        let nodes: Vec<SampleNode> = records
            .iter()
            .zip(anchors)
            .enumerate()
            .map(|(index, (record, anchor))| SampleNode {
                id: NodeId(index),
                name: record.name.clone(),
                relative_path: record.relative_path.clone(),
                category: record.category.clone(),
                zone: record
                    .zone
                    .clone()
                    .unwrap_or_else(|| record.category.clone()),
                color: Rgb::from_polar(anchor, half_span),
                anchor,
                position: anchor,
                velocity: Vec2::ZERO,
                glow: 0.0,
                hovered: false,
            })
            .collect();

        let by_path = nodes
            .iter()
            .map(|node| (node.relative_path.clone(), node.id))
            .collect();

        Self { nodes, by_path }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&SampleNode> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SampleNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleNode> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SampleNode> {
        self.nodes.iter_mut()
    }

    pub fn as_slice(&self) -> &[SampleNode] {
        &self.nodes
    }

    pub fn as_mut_slice(&mut self) -> &mut [SampleNode] {
        &mut self.nodes
    }

    pub fn by_path(&self, relative_path: &str) -> Option<NodeId> {
        self.by_path.get(relative_path).copied()
    }

    /// Nodes whose category matches, compared case-insensitively.
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.category.eq_ignore_ascii_case(category))
            .map(|node| node.id)
    }

    /// Nodes in the same zone as `id`.
    pub fn in_zone_of(&self, id: NodeId) -> Vec<NodeId> {
        let Some(zone) = self.get(id).map(|node| node.zone.as_str()) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|node| node.zone == zone)
            .map(|node| node.id)
            .collect()
    }

    /// Other nodes whose anchor lies within `radius` of the anchor of `id`.
    pub fn anchor_neighborhood(&self, id: NodeId, radius: f32) -> Vec<NodeId> {
        let Some(center) = self.get(id).map(|node| node.anchor) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|node| node.id != id && node.anchor.distance(center) <= radius)
            .map(|node| node.id)
            .collect()
    }

    /// Padded bounding box over live positions.
    pub fn bounds(&self, padding: f32) -> Bounds {
        if self.nodes.is_empty() {
            return Bounds {
                center: Vec2::ZERO,
                half_extent: Vec2::new(200.0, 200.0),
            };
        }
        let (mut min, mut max) = (
            Vec2::new(f32::INFINITY, f32::INFINITY),
            Vec2::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
        );
        for node in &self.nodes {
            min.x = min.x.min(node.position.x);
            min.y = min.y.min(node.position.y);
            max.x = max.x.max(node.position.x);
            max.y = max.y.max(node.position.y);
        }
        Bounds {
            center: (min + max) * 0.5,
            half_extent: (max - min) * 0.5 + Vec2::new(padding, padding),
        }
    }
}

/// Axis-aligned box described by its centre and half extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: Vec2,
    pub half_extent: Vec2,
}

/// Supplies raw audio bytes for a relative sample path.
pub trait SampleSource {
    fn fetch(&self, relative_path: &str) -> Result<Vec<u8>>;
}

/// Content type inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mpeg,
    Wav,
}

impl AudioFormat {
    pub fn from_path(relative_path: &str) -> Self {
        let ext = Path::new(relative_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("mp3") => AudioFormat::Mpeg,
            _ => AudioFormat::Wav,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mpeg => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Serves sample bytes from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SampleMapError::PathEscapesRoot(relative_path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl SampleSource for DirectorySource {
    fn fetch(&self, relative_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative_path)?;
        Ok(std::fs::read(path)?)
    }
}

/// Reads and parses a sample list file.
pub fn load_sample_list(path: &Path) -> Result<Vec<SampleRecord>> {
    let text = std::fs::read_to_string(path)?;
    let records = parse_sample_list(&text)?;
    tracing::info!(count = records.len(), ?path, "loaded sample list");
    if records.is_empty() {
        return Err(SampleMapError::EmptyLibrary);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, category: &str, x: f32, y: f32) -> SampleRecord {
        SampleRecord {
            name: name.to_string(),
            relative_path: format!("{category}/{name}.wav"),
            category: category.to_string(),
            zone: None,
            x,
            y,
        }
    }

    #[test]
    fn drops_malformed_entries() {
        let json = r#"[
            {"name": "a", "relativePath": "kick/a.wav", "category": "kick", "x": 1, "y": 2},
            {"name": "b", "category": "kick", "x": 1, "y": 2},
            {"name": "c", "relativePath": "kick/c.wav", "category": "kick", "x": "oops", "y": 2},
            {"name": "d", "relativePath": "snare/d.wav", "category": "snare", "zone": "top",
             "x": -3, "y": 0}
        ]"#;
        let records = parse_sample_list(json).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a");
        assert_eq!(records[1].zone.as_deref(), Some("top"));
    }

    #[test]
    fn normalizes_larger_axis_to_world_span() {
        let anchors = normalize_coordinates(&[(0.0, 0.0), (10.0, 5.0), (20.0, 10.0)], 200.0);

        assert_eq!(anchors[0], Vec2::new(-200.0, -100.0));
        assert_eq!(anchors[1], Vec2::new(0.0, 0.0));
        assert_eq!(anchors[2], Vec2::new(200.0, 100.0));
    }

    #[test]
    fn single_point_normalizes_to_origin() {
        let anchors = normalize_coordinates(&[(7.0, -3.0)], 200.0);
        assert_eq!(anchors, vec![Vec2::ZERO]);
    }

    #[test]
    fn colour_depends_on_polar_position() {
        let right = Rgb::from_polar(Vec2::new(200.0, 0.0), 200.0);
        let left = Rgb::from_polar(Vec2::new(-200.0, 0.0), 200.0);

        assert_ne!(right, left);
        assert_eq!(format!("{}", Rgb::from_hsl(0.0, 100.0, 50.0)), "#ff0000");
    }

    #[test]
    fn zone_falls_back_to_category_and_neighbourhood_uses_anchors() {
        let records = vec![
            record("a", "kick", 0.0, 0.0),
            record("b", "kick", 1.0, 0.0),
            record("c", "snare", 100.0, 100.0),
        ];
        let mut table = NodeTable::from_records(&records, 200.0);
        assert_eq!(table.get(NodeId(0)).unwrap().zone, "kick");

        // moving the live position must not change anchor queries
        table.get_mut(NodeId(1)).unwrap().position = Vec2::new(500.0, 500.0);
        let near = table.anchor_neighborhood(NodeId(0), 10.0);
        assert_eq!(near, vec![NodeId(1)]);
        assert_eq!(table.in_category("KICK").count(), 2);
        assert_eq!(table.by_path("snare/c.wav"), Some(NodeId(2)));
    }

    #[test]
    fn glow_decays_linearly_to_zero() {
        let mut table = NodeTable::from_records(&[record("a", "kick", 0.0, 0.0)], 200.0);
        let node = table.get_mut(NodeId(0)).unwrap();
        node.flash();
        node.decay_glow(0.25);
        assert!((node.glow - 0.5).abs() < 1e-6);
        node.decay_glow(1.0);
        assert_eq!(node.glow, 0.0);
    }

    #[test]
    fn directory_source_rejects_escaping_paths() {
        let source = DirectorySource::new("/tmp/samples");
        let err = source.fetch("../etc/passwd").unwrap_err();
        assert!(matches!(err, SampleMapError::PathEscapesRoot(_)));
        assert_eq!(AudioFormat::from_path("kick/a.MP3"), AudioFormat::Mpeg);
        assert_eq!(AudioFormat::from_path("kick/a.wav"), AudioFormat::Wav);
    }
}
