//! Sample decoding, caching and polyphonic playback.
//!
//! The engine is driven by its host: [`AudioEngine::pump`] resolves pending
//! loads once per frame and [`AudioEngine::render`] pulls mixed frames.

mod buffer;
mod voice;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub use buffer::{decode_sample, resample_linear, SampleBuffer, StereoFrame};
pub use voice::{PlayId, Voice};

use crate::config::AudioConfig;
use crate::library::{NodeId, SampleNode, SampleSource};
use crate::Result;

/// Output clock created on first user interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioContext {
    sample_rate: u32,
    frames_rendered: u64,
}

impl AudioContext {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio rendered so far.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate.max(1) as f64
    }

    fn frames(&self, seconds: f32) -> usize {
        (seconds.max(0.0) * self.sample_rate as f32).round() as usize
    }
}

/// How a trigger relates to what the user is pointing at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Hover preview; skipped if the pointer moved on before it could start.
    Hover,
    /// Selection and sequencer hits; always played.
    Forced,
}

/// Result of a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started(PlayId),
    /// Buffer not cached yet; playback starts from a later [`AudioEngine::pump`].
    Queued,
    /// No output context yet.
    Dropped,
}

#[derive(Debug, Clone)]
struct PendingLoad {
    node: NodeId,
    relative_path: String,
    volume: f32,
    kind: TriggerKind,
}

pub struct AudioEngine {
    config: AudioConfig,
    source: Box<dyn SampleSource>,
    context: Option<AudioContext>,
    cache: HashMap<NodeId, Arc<SampleBuffer>>,
    pending: VecDeque<PendingLoad>,
    voices: VecDeque<Voice>,
    releasing: Vec<Voice>,
    next_play_id: u64,
    intended: Option<NodeId>,
    scratch: Vec<StereoFrame>,
}

impl AudioEngine {
    pub fn new(config: AudioConfig, source: Box<dyn SampleSource>) -> Self {
        Self {
            config,
            source,
            context: None,
            cache: HashMap::new(),
            pending: VecDeque::new(),
            voices: VecDeque::new(),
            releasing: Vec::new(),
            next_play_id: 0,
            intended: None,
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Creates the output context. Safe to call repeatedly.
    pub fn unlock(&mut self) {
        if self.context.is_none() {
            tracing::info!(sample_rate = self.config.sample_rate, "audio output unlocked");
            self.context = Some(AudioContext::new(self.config.sample_rate));
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    pub fn tracked_voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    pub fn tracked_count(&self) -> usize {
        self.voices.len()
    }

    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_cached(&self, node: NodeId) -> bool {
        self.cache.contains_key(&node)
    }

    /// The node the latest hover or selection was aimed at.
    pub fn intended(&self) -> Option<NodeId> {
        self.intended
    }

    pub fn set_intended(&mut self, node: Option<NodeId>) {
        self.intended = node;
    }

    pub fn trigger(&mut self, node: &SampleNode, volume: f32, kind: TriggerKind) -> TriggerOutcome {
        if self.context.is_none() {
            tracing::debug!(node = %node.id, "audio locked, dropping trigger");
            return TriggerOutcome::Dropped;
        }
        if kind == TriggerKind::Hover {
            self.intended = Some(node.id);
        }

        match self.cache.get(&node.id).cloned() {
            Some(buffer) => TriggerOutcome::Started(self.start_voice(node.id, buffer, volume)),
            None => {
                self.pending.push_back(PendingLoad {
                    node: node.id,
                    relative_path: node.relative_path.clone(),
                    volume,
                    kind,
                });
                TriggerOutcome::Queued
            }
        }
    }

    /// Resolves queued loads and starts the voices still wanted. Returns the
    /// number of voices started.
    pub fn pump(&mut self) -> usize {
        let mut started = 0;
        while let Some(load) = self.pending.pop_front() {
            let buffer = match self.cache.get(&load.node).cloned() {
                Some(buffer) => buffer,
                None => match self.load(&load.relative_path) {
                    Ok(buffer) => {
                        self.cache.insert(load.node, buffer.clone());
                        buffer
                    }
                    Err(err) => {
                        tracing::debug!(path = %load.relative_path, %err, "sample failed to load");
                        continue;
                    }
                },
            };

            if load.kind == TriggerKind::Hover && self.intended != Some(load.node) {
                tracing::debug!(node = %load.node, "hover moved on, skipping playback");
                continue;
            }
            self.start_voice(load.node, buffer, load.volume);
            started += 1;
        }
        started
    }

    /// Returns the cached buffer for `node`, loading it synchronously on a miss.
    pub fn buffer_for(&mut self, node: &SampleNode) -> Result<Arc<SampleBuffer>> {
        if let Some(buffer) = self.cache.get(&node.id) {
            return Ok(buffer.clone());
        }
        let buffer = self.load(&node.relative_path)?;
        self.cache.insert(node.id, buffer.clone());
        Ok(buffer)
    }

    fn load(&self, relative_path: &str) -> Result<Arc<SampleBuffer>> {
        let bytes = self.source.fetch(relative_path)?;
        let buffer = decode_sample(bytes, relative_path, self.config.sample_rate)?;
        Ok(Arc::new(buffer))
    }

    fn start_voice(&mut self, node: NodeId, buffer: Arc<SampleBuffer>, volume: f32) -> PlayId {
        let Some(context) = self.context else {
            return PlayId(self.next_play_id);
        };

        let cap = self.config.max_voices.max(1);
        while self.voices.len() >= cap {
            let Some(mut oldest) = self.voices.pop_front() else {
                break;
            };
            tracing::debug!(
                play = oldest.id.0,
                node = %oldest.node,
                "voice cap reached, fading oldest"
            );
            oldest.release(context.frames(self.config.eviction_fade));
            self.releasing.push(oldest);
        }

        let id = PlayId(self.next_play_id);
        self.next_play_id += 1;
        let peak = self.config.peak_gain * volume.clamp(0.0, 1.0);
        self.voices.push_back(Voice::new(
            id,
            node,
            buffer,
            peak,
            context.frames(self.config.attack),
        ));
        id
    }

    /// Mixes every voice into `out`, replacing its contents.
    pub fn render(&mut self, out: &mut [StereoFrame]) {
        out.fill(StereoFrame::ZERO);
        let Some(context) = self.context.as_mut() else {
            return;
        };
        context.frames_rendered += out.len() as u64;

        for voice in self.voices.iter_mut().chain(self.releasing.iter_mut()) {
            voice.render_into(out);
        }
        self.voices.retain(|voice| !voice.is_finished());
        self.releasing.retain(|voice| !voice.is_finished());
    }

    /// Renders `dt` seconds into an internal buffer, for hosts without an
    /// output device.
    pub fn advance(&mut self, dt: f32) {
        let frames = match self.context {
            Some(context) => context.frames(dt),
            None => return,
        };
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(frames, StereoFrame::ZERO);
        self.render(&mut scratch);
        self.scratch = scratch;
    }

    pub fn stop_all(&mut self) {
        let stopped = self.voices.len() + self.releasing.len();
        self.voices.clear();
        self.releasing.clear();
        if stopped > 0 {
            tracing::debug!(stopped, "stopped all voices");
        }
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("context", &self.context)
            .field("cached", &self.cache.len())
            .field("pending", &self.pending.len())
            .field("voices", &self.voices.len())
            .field("releasing", &self.releasing.len())
            .finish()
    }
}
