//! Step grid: tracks, tempo and the hits each step produces.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::SequencerConfig;
use crate::library::{NodeId, NodeTable};
use crate::timeline::{FiredStep, Transport, STEPS_PER_BAR};

pub const MIN_BPM: f32 = 40.0;
pub const MAX_BPM: f32 = 300.0;
pub const MAX_BARS: usize = 4;
pub const MIN_SCATTER_RADIUS: f32 = 5.0;
pub const MAX_SCATTER_RADIUS: f32 = 200.0;

/// One row of the grid together with everything that belongs to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub sample: Option<NodeId>,
    pub steps: Vec<bool>,
    /// Protects the sample from randomisation.
    pub locked: bool,
    pub volume: f32,
    /// Each hit plays a random neighbour of the sample instead of the sample.
    pub scatter: bool,
    pub scatter_radius: f32,
}

impl Track {
    pub fn new(sample: Option<NodeId>, total_steps: usize, scatter_radius: f32) -> Self {
        Self {
            sample,
            steps: vec![false; total_steps],
            locked: false,
            volume: 1.0,
            scatter: false,
            scatter_radius,
        }
    }

    pub fn is_active(&self, step: usize) -> bool {
        self.steps.get(step).copied().unwrap_or(false)
    }

    pub fn has_hits(&self) -> bool {
        self.sample.is_some() && self.steps.iter().any(|&on| on)
    }

    /// Node to play for one hit of this track.
    pub fn pick_target<R: Rng + ?Sized>(&self, nodes: &NodeTable, rng: &mut R) -> Option<NodeId> {
        let sample = self.sample?;
        if !self.scatter {
            return Some(sample);
        }
        let nearby = nodes.anchor_neighborhood(sample, self.scatter_radius);
        Some(nearby.choose(rng).copied().unwrap_or(sample))
    }
}

/// A single trigger produced by a fired step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub track: usize,
    pub node: NodeId,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepHits {
    pub step: usize,
    pub next_fire_ms: f64,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    config: SequencerConfig,
    tracks: Vec<Track>,
    bpm: f32,
    swing: f32,
    bars: usize,
    armed: Option<usize>,
    transport: Transport,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        let mut sequencer = Self {
            tracks: Vec::new(),
            bpm: MIN_BPM,
            swing: 0.0,
            bars: 1,
            armed: None,
            transport: Transport::new(),
            config,
        };
        sequencer.set_bpm(sequencer.config.bpm);
        sequencer.set_swing(sequencer.config.swing);
        sequencer.set_bars(sequencer.config.bars);
        sequencer
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn swing(&self) -> f32 {
        self.swing
    }

    pub fn bars(&self) -> usize {
        self.bars
    }

    pub fn total_steps(&self) -> usize {
        self.bars * STEPS_PER_BAR
    }

    pub fn cursor(&self) -> Option<usize> {
        self.transport.cursor()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_running()
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        if bpm.is_finite() {
            self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
    }

    pub fn set_swing(&mut self, swing: f32) {
        if swing.is_finite() {
            self.swing = swing.clamp(0.0, 100.0);
        }
    }

    /// Resizes every row, padding with rests or truncating.
    pub fn set_bars(&mut self, bars: usize) {
        self.bars = bars.clamp(1, MAX_BARS);
        let total = self.total_steps();
        for track in &mut self.tracks {
            track.steps.resize(total, false);
        }
    }

    pub fn add_track(&mut self, sample: Option<NodeId>) -> usize {
        self.tracks.push(Track::new(
            sample,
            self.total_steps(),
            self.config.default_scatter_radius,
        ));
        self.tracks.len() - 1
    }

    pub fn remove_track(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        self.armed = match self.armed {
            Some(armed) if armed == index => None,
            Some(armed) if armed > index => Some(armed - 1),
            other => other,
        };
        Some(self.tracks.remove(index))
    }

    pub fn move_track(&mut self, from: usize, to: usize) {
        if from >= self.tracks.len() || to >= self.tracks.len() || from == to {
            return;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        if let Some(armed) = self.armed {
            self.armed = Some(if armed == from {
                to
            } else if from < armed && armed <= to {
                armed - 1
            } else if to <= armed && armed < from {
                armed + 1
            } else {
                armed
            });
        }
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) {
        if let Some(cell) = self.tracks.get_mut(track).and_then(|t| t.steps.get_mut(step)) {
            *cell = !*cell;
        }
    }

    pub fn set_step(&mut self, track: usize, step: usize, on: bool) {
        if let Some(cell) = self.tracks.get_mut(track).and_then(|t| t.steps.get_mut(step)) {
            *cell = on;
        }
    }

    pub fn clear_track(&mut self, track: usize) {
        if let Some(track) = self.tracks.get_mut(track) {
            track.steps.fill(false);
        }
    }

    /// Replaces one track's row; the pattern is fitted to the current length.
    pub fn set_pattern(&mut self, track: usize, pattern: &[bool]) {
        let total = self.total_steps();
        if let Some(track) = self.tracks.get_mut(track) {
            track.steps = pattern
                .iter()
                .copied()
                .chain(std::iter::repeat(false))
                .take(total)
                .collect();
        }
    }

    pub fn set_sample(&mut self, track: usize, sample: Option<NodeId>) {
        if let Some(track) = self.tracks.get_mut(track) {
            track.sample = sample;
        }
    }

    pub fn set_volume(&mut self, track: usize, volume: f32) {
        if let Some(track) = self.tracks.get_mut(track) {
            track.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        }
    }

    pub fn set_locked(&mut self, track: usize, locked: bool) {
        if let Some(track) = self.tracks.get_mut(track) {
            track.locked = locked;
        }
    }

    pub fn set_scatter(&mut self, track: usize, enabled: bool, radius: f32) {
        if let Some(track) = self.tracks.get_mut(track) {
            track.scatter = enabled;
            if radius.is_finite() {
                track.scatter_radius = radius.clamp(MIN_SCATTER_RADIUS, MAX_SCATTER_RADIUS);
            }
        }
    }

    /// Arms `track` so the next map selection becomes its sample. Arming the
    /// armed track again disarms it.
    pub fn arm(&mut self, track: usize) {
        if track >= self.tracks.len() {
            return;
        }
        self.armed = if self.armed == Some(track) { None } else { Some(track) };
    }

    pub fn armed(&self) -> Option<usize> {
        self.armed
    }

    /// Hands a selected node to the armed track. Returns the track index.
    pub fn assign_armed(&mut self, node: NodeId) -> Option<usize> {
        let track = self.armed?;
        self.set_sample(track, Some(node));
        Some(track)
    }

    /// Samples used by every track except `track`.
    pub fn excluded_for(&self, track: usize) -> HashSet<NodeId> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != track)
            .filter_map(|(_, t)| t.sample)
            .collect()
    }

    /// Swaps the sample of every unlocked track for another one in the same
    /// zone that no other track uses.
    pub fn randomize<R: Rng + ?Sized>(&mut self, nodes: &NodeTable, rng: &mut R) {
        for index in 0..self.tracks.len() {
            let track = &self.tracks[index];
            if track.locked {
                continue;
            }
            let Some(sample) = track.sample else {
                continue;
            };
            let taken = self.excluded_for(index);
            let candidates: Vec<NodeId> = nodes
                .in_zone_of(sample)
                .into_iter()
                .filter(|id| *id != sample && !taken.contains(id))
                .collect();
            if let Some(&pick) = candidates.choose(rng) {
                self.tracks[index].sample = Some(pick);
            }
        }
    }

    pub fn has_hits(&self) -> bool {
        self.tracks.iter().any(Track::has_hits)
    }

    /// Everything that plays on `step`.
    pub fn hits_at<R: Rng + ?Sized>(
        &self,
        step: usize,
        nodes: &NodeTable,
        rng: &mut R,
    ) -> Vec<Hit> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, track)| track.is_active(step))
            .filter_map(|(index, track)| {
                track.pick_target(nodes, rng).map(|node| Hit {
                    track: index,
                    node,
                    volume: track.volume,
                })
            })
            .collect()
    }

    /// When the next step is due; `None` when stopped.
    pub fn next_fire_ms(&self) -> Option<f64> {
        self.transport.next_fire_ms()
    }

    pub fn start<R: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        nodes: &NodeTable,
        rng: &mut R,
    ) -> StepHits {
        let fired = self.transport.start(now_ms, self.bpm, self.swing);
        tracing::info!(bpm = self.bpm, swing = self.swing, bars = self.bars, "transport started");
        self.collect(fired, nodes, rng)
    }

    /// Fires the next step if it is due at `now_ms`. The step is stamped
    /// with its due time, so polling late never stretches the tempo.
    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        nodes: &NodeTable,
        rng: &mut R,
    ) -> Option<StepHits> {
        if !self.transport.is_due(now_ms) {
            return None;
        }
        let due_ms = self.transport.next_fire_ms()?;
        let fired = self
            .transport
            .fire(due_ms, self.total_steps(), self.bpm, self.swing)?;
        Some(self.collect(fired, nodes, rng))
    }

    fn collect<R: Rng + ?Sized>(
        &self,
        fired: FiredStep,
        nodes: &NodeTable,
        rng: &mut R,
    ) -> StepHits {
        StepHits {
            step: fired.step,
            next_fire_ms: fired.next_fire_ms,
            hits: self.hits_at(fired.step, nodes, rng),
        }
    }

    pub fn stop(&mut self) {
        if self.transport.is_running() {
            tracing::info!("transport stopped");
        }
        self.transport.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::record;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table() -> NodeTable {
        let records = vec![
            record("k0", "kick", 0.0, 0.0),
            record("k1", "kick", 1.0, 0.0),
            record("k2", "kick", 2.0, 0.0),
            record("s0", "snare", 100.0, 100.0),
        ];
        NodeTable::from_records(&records, 200.0)
    }

    #[test]
    fn values_are_clamped() {
        let mut seq = Sequencer::new(SequencerConfig::default());
        seq.set_bpm(10.0);
        assert_eq!(seq.bpm(), MIN_BPM);
        seq.set_bpm(999.0);
        assert_eq!(seq.bpm(), MAX_BPM);
        seq.set_swing(150.0);
        assert_eq!(seq.swing(), 100.0);
        seq.set_bars(9);
        assert_eq!(seq.total_steps(), 64);

        let t = seq.add_track(None);
        seq.set_scatter(t, true, 1.0);
        assert_eq!(seq.track(t).unwrap().scatter_radius, MIN_SCATTER_RADIUS);
        seq.set_scatter(t, true, 1000.0);
        assert_eq!(seq.track(t).unwrap().scatter_radius, MAX_SCATTER_RADIUS);
    }

    #[test]
    fn changing_bars_resizes_every_row() {
        let mut seq = Sequencer::new(SequencerConfig::default());
        let a = seq.add_track(Some(NodeId(0)));
        seq.toggle_step(a, 3);
        seq.set_bars(2);
        assert_eq!(seq.track(a).unwrap().steps.len(), 32);
        seq.toggle_step(a, 20);
        seq.set_bars(1);
        let steps = &seq.track(a).unwrap().steps;
        assert_eq!(steps.len(), 16);
        assert!(steps[3]);
    }

    #[test]
    fn track_edits_keep_state_together() {
        let mut seq = Sequencer::new(SequencerConfig::default());
        let a = seq.add_track(Some(NodeId(0)));
        let b = seq.add_track(Some(NodeId(1)));
        let c = seq.add_track(Some(NodeId(2)));
        seq.set_volume(b, 0.25);
        seq.arm(c);

        seq.move_track(c, 0);
        assert_eq!(seq.armed(), Some(0));
        assert_eq!(seq.tracks()[0].sample, Some(NodeId(2)));
        assert_eq!(seq.tracks()[2].volume, 0.25);

        seq.remove_track(a + 1);
        assert_eq!(seq.tracks().len(), 2);
        assert_eq!(seq.armed(), Some(0));
        assert_eq!(seq.assign_armed(NodeId(3)), Some(0));
        assert_eq!(seq.tracks()[0].sample, Some(NodeId(3)));
        assert_eq!(seq.excluded_for(0), HashSet::from([NodeId(1)]));
    }

    #[test]
    fn scatter_picks_within_radius_and_falls_back_to_self() {
        let nodes = table();
        let mut rng = StdRng::seed_from_u64(7);
        let mut track = Track::new(Some(NodeId(3)), 16, 30.0);
        track.scatter = true;
        assert_eq!(track.pick_target(&nodes, &mut rng), Some(NodeId(3)));

        track.sample = Some(NodeId(0));
        track.scatter_radius = 200.0;
        for _ in 0..20 {
            let picked = track.pick_target(&nodes, &mut rng).unwrap();
            assert!(picked == NodeId(1) || picked == NodeId(2));
        }
    }

    #[test]
    fn randomize_skips_locked_and_taken_samples() {
        let nodes = table();
        let mut rng = StdRng::seed_from_u64(1);
        let mut seq = Sequencer::new(SequencerConfig::default());
        let a = seq.add_track(Some(NodeId(0)));
        let b = seq.add_track(Some(NodeId(1)));
        let c = seq.add_track(Some(NodeId(3)));
        seq.set_locked(b, true);

        seq.randomize(&nodes, &mut rng);

        // the only free kick besides itself is k2
        assert_eq!(seq.track(a).unwrap().sample, Some(NodeId(2)));
        assert_eq!(seq.track(b).unwrap().sample, Some(NodeId(1)));
        // lone snare has nothing to swap with
        assert_eq!(seq.track(c).unwrap().sample, Some(NodeId(3)));
    }

    #[test]
    fn polling_fires_hits_on_schedule() {
        let nodes = table();
        let mut rng = StdRng::seed_from_u64(3);
        let mut seq = Sequencer::new(SequencerConfig::default());
        let kick = seq.add_track(Some(NodeId(0)));
        let snare = seq.add_track(Some(NodeId(3)));
        for step in [0, 4, 8, 12] {
            seq.toggle_step(kick, step);
        }
        seq.toggle_step(snare, 4);
        seq.set_volume(snare, 0.5);

        let first = seq.start(0.0, &nodes, &mut rng);
        assert_eq!(first.hits.len(), 1);
        assert_eq!(first.next_fire_ms, 125.0);
        assert!(seq.poll(100.0, &nodes, &mut rng).is_none());

        let mut now = 0.0;
        let mut kick_times = vec![0.0];
        while now < 1_600.0 {
            now += 125.0;
            if let Some(step) = seq.poll(now, &nodes, &mut rng) {
                if step.hits.iter().any(|hit| hit.track == kick) {
                    kick_times.push(now);
                }
                if step.step == 4 {
                    assert_eq!(step.hits.len(), 2);
                    assert_eq!(step.hits[1].volume, 0.5);
                }
            }
        }
        assert_eq!(kick_times, vec![0.0, 500.0, 1000.0, 1500.0]);

        seq.stop();
        assert_eq!(seq.cursor(), None);
        assert!(seq.poll(1e6, &nodes, &mut rng).is_none());
    }

    #[test]
    fn frame_rate_polling_keeps_the_tempo() {
        let nodes = table();
        let mut rng = StdRng::seed_from_u64(5);
        let mut seq = Sequencer::new(SequencerConfig::default());
        let kick = seq.add_track(Some(NodeId(0)));
        for step in [0, 4, 8, 12] {
            seq.toggle_step(kick, step);
        }

        seq.start(0.0, &nodes, &mut rng);
        let mut kick_times = vec![0.0];
        let mut frame = 0u32;
        while kick_times.len() < 4 && frame < 600 {
            frame += 1;
            let now = f64::from(frame) * 1000.0 / 60.0;
            while let Some(due) = seq.next_fire_ms().filter(|at| *at <= now) {
                let step = seq.poll(now, &nodes, &mut rng).unwrap();
                if !step.hits.is_empty() {
                    kick_times.push(due);
                }
            }
        }

        assert_eq!(kick_times.len(), 4);
        for (got, want) in kick_times.iter().zip([0.0, 500.0, 1000.0, 1500.0]) {
            assert!((got - want).abs() < 1e-6, "{got} != {want}");
        }
    }

    #[test]
    fn tempo_changes_apply_from_the_next_step() {
        let nodes = table();
        let mut rng = StdRng::seed_from_u64(0);
        let mut seq = Sequencer::new(SequencerConfig::default());
        seq.add_track(Some(NodeId(0)));

        let first = seq.start(0.0, &nodes, &mut rng);
        assert_eq!(first.next_fire_ms, 125.0);

        seq.set_bpm(60.0);
        seq.set_swing(50.0);
        assert_eq!(seq.next_fire_ms(), Some(125.0));
        assert!(seq.poll(124.0, &nodes, &mut rng).is_none());

        // step 1 is odd, so swing shortens the interval after it
        let second = seq.poll(130.0, &nodes, &mut rng).unwrap();
        assert_eq!(second.step, 1);
        let interval = second.next_fire_ms - 125.0;
        assert!((interval - (250.0 - 250.0 * 0.5 * 0.33)).abs() < 1e-9);

        seq.set_swing(0.0);
        let third = seq.poll(second.next_fire_ms, &nodes, &mut rng).unwrap();
        assert!((third.next_fire_ms - second.next_fire_ms - 250.0).abs() < 1e-9);
    }
}
