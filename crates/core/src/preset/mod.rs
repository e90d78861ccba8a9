//! Saved patterns and the rules that map them back onto a library.

use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::library::{NodeId, NodeTable};
use crate::sequencer::Sequencer;
use crate::timeline::STEPS_PER_BAR;
use crate::{Result, SampleMapError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub bpm: f32,
    #[serde(default)]
    pub swing: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bars: Option<usize>,
    pub tracks: Vec<PresetTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetTrack {
    /// Empty when the preset only names a category.
    #[serde(default)]
    pub sample_path: String,
    #[serde(default)]
    pub sample_category: String,
    pub pattern: Vec<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scatter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scatter_radius: Option<f32>,
}

impl Preset {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Looks `name_or_path` up among the factory presets first, then reads it
    /// as a file.
    pub fn find(name_or_path: &str) -> Result<Self> {
        if let Some(preset) = factory_presets()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name_or_path))
        {
            return Ok(preset);
        }
        let path = Path::new(name_or_path);
        if path.exists() {
            return Self::load(path);
        }
        Err(SampleMapError::msg(format!("unknown preset `{name_or_path}`")))
    }

    /// Bar count, falling back to the longest pattern.
    pub fn bar_count(&self) -> usize {
        self.bars.unwrap_or_else(|| {
            let longest = self.tracks.iter().map(|t| t.pattern.len()).max().unwrap_or(0);
            (longest + STEPS_PER_BAR - 1) / STEPS_PER_BAR
        })
    }

    /// Snapshot of the grid, naming samples by path and category.
    pub fn capture(name: impl Into<String>, sequencer: &Sequencer, nodes: &NodeTable) -> Self {
        let tracks = sequencer
            .tracks()
            .iter()
            .map(|track| {
                let node = track.sample.and_then(|id| nodes.get(id));
                PresetTrack {
                    sample_path: node.map(|n| n.relative_path.clone()).unwrap_or_default(),
                    sample_category: node.map(|n| n.category.clone()).unwrap_or_default(),
                    pattern: track.steps.clone(),
                    volume: Some(track.volume),
                    scatter: Some(track.scatter),
                    scatter_radius: Some(track.scatter_radius),
                }
            })
            .collect();
        Self {
            id: None,
            name: name.into(),
            bpm: sequencer.bpm(),
            swing: sequencer.swing(),
            bars: Some(sequencer.bars()),
            tracks,
        }
    }

    /// Replaces the sequencer's tracks and tempo with this preset.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        sequencer: &mut Sequencer,
        nodes: &NodeTable,
        rng: &mut R,
    ) {
        let previous: Vec<NodeId> = sequencer.tracks().iter().filter_map(|t| t.sample).collect();
        let samples = resolve_samples(&self.tracks, nodes, &previous, rng);

        while sequencer.remove_track(0).is_some() {}
        sequencer.set_bpm(self.bpm);
        sequencer.set_swing(self.swing);
        sequencer.set_bars(self.bar_count());

        for (track, sample) in self.tracks.iter().zip(samples) {
            let index = sequencer.add_track(sample);
            sequencer.set_pattern(index, &track.pattern);
            sequencer.set_volume(index, track.volume.unwrap_or(1.0));
            let radius = track
                .scatter_radius
                .unwrap_or_else(|| sequencer.tracks()[index].scatter_radius);
            sequencer.set_scatter(index, track.scatter.unwrap_or(false), radius);
        }
        tracing::info!(preset = %self.name, tracks = self.tracks.len(), "applied preset");
    }
}

/// Picks a sample for every preset track: the exact path, else a same
/// category sample that was loaded before, else a random one in the
/// category, else any sample at all.
pub fn resolve_samples<R: Rng + ?Sized>(
    tracks: &[PresetTrack],
    nodes: &NodeTable,
    previous: &[NodeId],
    rng: &mut R,
) -> Vec<Option<NodeId>> {
    let mut reusable: Vec<NodeId> = previous.to_vec();
    let mut chosen: Vec<NodeId> = Vec::new();
    let all: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();

    tracks
        .iter()
        .map(|track| {
            let pick = resolve_one(track, nodes, &mut reusable, &chosen, &all, rng);
            if let Some(id) = pick {
                chosen.push(id);
            }
            pick
        })
        .collect()
}

fn resolve_one<R: Rng + ?Sized>(
    track: &PresetTrack,
    nodes: &NodeTable,
    reusable: &mut Vec<NodeId>,
    chosen: &[NodeId],
    all: &[NodeId],
    rng: &mut R,
) -> Option<NodeId> {
    if !track.sample_path.is_empty() {
        if let Some(id) = nodes.by_path(&track.sample_path) {
            return Some(id);
        }
        tracing::debug!(path = %track.sample_path, "preset sample not in library");
    }

    let category = track.sample_category.as_str();
    let same_category = |id: &NodeId| {
        nodes
            .get(*id)
            .map_or(false, |n| n.category.eq_ignore_ascii_case(category))
    };
    if let Some(pos) = reusable.iter().position(same_category) {
        return Some(reusable.remove(pos));
    }

    let in_category: Vec<NodeId> = nodes.in_category(category).collect();
    let fresh: Vec<NodeId> = in_category
        .iter()
        .copied()
        .filter(|id| !chosen.contains(id))
        .collect();
    if let Some(&id) = fresh.choose(rng).or_else(|| in_category.choose(rng)) {
        return Some(id);
    }
    all.choose(rng).copied()
}

fn row(category: &str, pattern: &str, volume: Option<f32>) -> PresetTrack {
    PresetTrack {
        sample_path: String::new(),
        sample_category: category.to_string(),
        pattern: pattern
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c == 'x')
            .collect(),
        volume,
        scatter: None,
        scatter_radius: None,
    }
}

fn preset(index: usize, name: &str, bpm: f32, swing: f32, tracks: Vec<PresetTrack>) -> Preset {
    Preset {
        id: Some(format!("factory-{index}")),
        name: name.to_string(),
        bpm,
        swing,
        bars: Some(1),
        tracks,
    }
}

/// Built-in starting points. Tracks only name a category.
#[rustfmt::skip]
pub fn factory_presets() -> Vec<Preset> {
    const EMPTY: &str = "................";
    let four = "x... x... x... x...";
    vec![
        preset(0, "Hip Hop", 90.0, 0.0, vec![
            row("kick", "x... .... ..x. ....", None),
            row("snare", ".... x... .... x..x", None),
            row("hihat", "x.x. x..x x.x. x..x", None),
            row("perc", "...x .... ...x ....", None),
        ]),
        preset(1, "Boom Bap", 90.0, 45.0, vec![
            row("kick", "x... .... ..x. ....", None),
            row("snare", ".... x..x .... x...", None),
            row("hihat", "x.xx x.xx x.xx x.xx", None),
            row("perc", ".... .x.. .... .x..", None),
        ]),
        preset(2, "Trap", 140.0, 0.0, vec![
            row("kick", "x... .... x..x ....", None),
            row("snare", ".... x... .... x...", None),
            row("hihat", "xx.x xx.x xx.x xxxx", None),
            row("perc", ".... ..x. .... x.x.", None),
        ]),
        preset(3, "Afrobeat Starter", 100.0, 0.0, vec![
            row("kick", "x... ..x. ..x. ....", None),
            row("snare", "...x .... .... x...", None),
            row("perc", ".... .... x... ....", None),
            row("perc", ".... .... .... x...", None),
            row("perc", "...x .... .... ....", None),
        ]),
        preset(4, "Afrobeat 1", 95.0, 0.0, vec![
            row("kick", four, None),
            row("hihat", "x..x ..x. ..x. x...", None),
            row("snare", "...x ..x. ...x ..x.", None),
            row("hihat", "x.x. x.x. x.x. x.x.", None),
        ]),
        preset(5, "Afrobeat 2", 95.0, 0.0, vec![
            row("kick", four, None),
            row("hihat", "x..x ..x. ...x ..x.", None),
            row("hihat", "...x ..x. ...x ..x.", None),
            row("hihat", "x.x. x.x. x.x. x.x.", None),
            row("hihat", ".... ..xx .... ..xx", Some(0.83)),
        ]),
        preset(6, "Afrobeat 3", 115.0, 0.0, vec![
            row("kick", four, None),
            row("snare", "x..x ..x. x..x ..x.", None),
            row("hihat", "..x. ..x. .... ....", None),
            row("hihat", "x..x .... x..x ..x.", None),
            row("hihat", ".... .... ..x. ....", None),
        ]),
        preset(7, "Afrobeat 4", 105.0, 0.0, vec![
            row("kick", four, None),
            row("snare", ".... ..x. ..x. ..x.", None),
            row("hihat", "..x. .... .... ....", None),
            row("hihat", "x..x ..x. .... ....", None),
            row("perc", ".... .... ..x. x...", None),
            row("perc", ".... .... .... x...", None),
        ]),
        preset(8, "Afrobeat 5", 113.0, 0.0, vec![
            row("kick", four, None),
            row("snare", ".... x..x ..x. ....", None),
            row("hihat", "..x. .... .... ..x.", None),
            row("hihat", ".... .x.. .... ....", None),
            row("perc", ".... x... .... ....", None),
            row("perc", ".... ...x .... ....", None),
            row("hihat", ".... .... ..x. ....", None),
            row("snare", "..x. ..x. ..x. ..x.", None),
        ]),
        preset(9, "Dembow Starter", 98.0, 0.0, vec![
            row("kick", "x... .... x... ....", None),
            row("snare", "...x ..x. ...x ..x.", None),
            row("hihat", "x.x. x.x. x.x. x.x.", None),
            row("perc", ".x.. .x.. .x.. .x..", None),
        ]),
        preset(10, "Reggaeton Starter", 100.0, 0.0, vec![
            row("kick", four, None),
            row("perc", "...x ..x. ...x ..x.", None),
        ]),
        preset(11, "Reggaeton 1", 100.0, 0.0, vec![
            row("kick", "x... .... x... ....", None),
            row("perc", "...x ..x. ...x ..x.", None),
            row("hihat", "..x. ..x. ..x. ..x.", Some(0.6)),
            row("perc", four, Some(0.77)),
        ]),
        preset(12, "Reggaeton 2", 100.0, 0.0, vec![
            row("kick", four, None),
            row("perc", "...x ..x. ...x ..x.", None),
            row("hihat", "..x. ..x. ..x. ..x.", Some(0.6)),
        ]),
        preset(13, "Reggaeton 3", 92.0, 0.0, vec![
            row("kick", "x... .... x... ....", None),
            row("kick", ".... x... .... x...", None),
            row("perc", ".xxx .... .xxx ....", Some(0.55)),
            row("snare", "...x ..x. ...x ..x.", None),
            row("snare", ".... .... .... .xxx", None),
        ]),
        preset(14, "Perreo", 100.0, 0.0, vec![
            row("kick", "x..x .... x..x ....", None),
            row("snare", ".... x..x .... x..x", None),
            row("hihat", "xxx. xxx. xxx. xxx.", None),
            row("perc", ".... ..x. .... ..x.", None),
        ]),
        preset(15, "Clear", 120.0, 0.0, vec![
            row("kick", EMPTY, None),
            row("snare", EMPTY, None),
            row("hihat", EMPTY, None),
            row("perc", EMPTY, None),
        ]),
    ]
}
