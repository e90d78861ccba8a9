//! Core library for the Sample Map explorer.
//!
//! A library of short samples is laid out on a 2D map where distance follows
//! timbre. The crate owns everything between the sample list and the pixels:
//! the force layout that relaxes the projection, the camera, the selection
//! ring, polyphonic playback and the step sequencer. [`SampleMap`] ties them
//! to one frame loop; hosts only forward input and paint the draw list.

pub mod audio;
pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod layout;
pub mod library;
pub mod preset;
pub mod record;
pub mod render;
pub mod ring;
pub mod sequencer;
pub mod timeline;

pub use audio::{AudioEngine, PlayId, SampleBuffer, StereoFrame, TriggerKind, TriggerOutcome};
pub use camera::{Camera, CameraController, Viewport};
pub use config::{
    AudioConfig, CameraConfig, EngineConfig, LayoutConfig, RingConfig, SequencerConfig,
};
pub use engine::SampleMap;
pub use error::{Result, SampleMapError};
pub use layout::{LayoutEngine, NeighborGraph};
pub use library::{
    load_sample_list, parse_sample_list, DirectorySource, NodeId, NodeTable, SampleNode,
    SampleRecord, SampleSource, Vec2,
};
pub use preset::{factory_presets, Preset, PresetTrack};
pub use record::{bounce, Bounce, RecordingSettings};
pub use render::{DrawList, Renderer};
pub use ring::{Direction, SelectionRing};
pub use sequencer::{Hit, Sequencer, StepHits, Track};
pub use timeline::{PlaybackClock, Transport};
