//! Offline bounce of the step grid to a stereo mix.

use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::audio::{PlayId, SampleBuffer, StereoFrame, Voice};
use crate::config::{AudioConfig, SequencerConfig};
use crate::library::{NodeTable, SampleNode};
use crate::sequencer::Sequencer;
use crate::timeline::{step_duration_ms, step_times_ms};
use crate::{Result, SampleMapError};

/// Configuration options for the bounce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub sample_rate: u32,
    pub peak_gain: f32,
    /// Seconds.
    pub attack: f32,
    /// Longest sample tail kept after the loop, in seconds.
    pub max_tail: f32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default(), &SequencerConfig::default())
    }
}

impl RecordingSettings {
    pub fn from_config(audio: &AudioConfig, sequencer: &SequencerConfig) -> Self {
        Self {
            sample_rate: 44_100,
            peak_gain: audio.peak_gain,
            attack: audio.attack,
            max_tail: sequencer.bounce_max_tail,
        }
    }

    fn frames(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }
}

/// A rendered mix.
#[derive(Debug, Clone)]
pub struct Bounce {
    pub frames: Vec<StereoFrame>,
    pub sample_rate: u32,
}

impl Bounce {
    pub fn duration_secs(&self) -> f32 {
        self.frames.len() as f32 / self.sample_rate.max(1) as f32
    }

    pub fn peak(&self) -> f32 {
        self.frames
            .iter()
            .map(|f| f.left.abs().max(f.right.abs()))
            .fold(0.0, f32::max)
    }

    pub fn write_wav_file(&self, path: &Path) -> Result<()> {
        let writer = hound::WavWriter::create(path, self.wav_spec())?;
        self.write_samples(writer)?;
        tracing::info!(?path, seconds = self.duration_secs(), "wrote bounce");
        Ok(())
    }

    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        let writer = hound::WavWriter::new(&mut cursor, self.wav_spec())?;
        self.write_samples(writer)?;
        Ok(cursor.into_inner())
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    fn write_samples<W: Write + Seek>(&self, mut writer: hound::WavWriter<W>) -> Result<()> {
        for frame in &self.frames {
            writer.write_sample(to_i16(frame.left))?;
            writer.write_sample(to_i16(frame.right))?;
        }
        writer.finalize()?;
        Ok(())
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample * i16::MAX as f32)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Renders one pass of the pattern plus the sample tails.
///
/// `load` supplies decoded buffers; nodes it fails on are left out of the mix.
pub fn bounce<R, F>(
    sequencer: &Sequencer,
    nodes: &NodeTable,
    settings: &RecordingSettings,
    rng: &mut R,
    mut load: F,
) -> Result<Bounce>
where
    R: Rng + ?Sized,
    F: FnMut(&SampleNode) -> Result<Arc<SampleBuffer>>,
{
    if !sequencer.has_hits() {
        return Err(SampleMapError::EmptyPattern);
    }

    let rate = settings.sample_rate;
    let mut fetch = |node: &SampleNode| -> Option<Arc<SampleBuffer>> {
        match load(node) {
            Ok(buffer) if buffer.sample_rate == rate => Some(buffer),
            Ok(buffer) => Some(Arc::new(buffer.resampled(rate))),
            Err(err) => {
                tracing::warn!(path = %node.relative_path, %err, "leaving sample out of bounce");
                None
            }
        }
    };

    let total_steps = sequencer.total_steps();
    let bpm = sequencer.bpm();
    let times = step_times_ms(total_steps, bpm, sequencer.swing());

    let tail = sequencer
        .tracks()
        .iter()
        .filter_map(|track| track.sample.and_then(|id| nodes.get(id)))
        .filter_map(&mut fetch)
        .map(|buffer| buffer.duration_secs())
        .fold(0.0_f32, f32::max)
        .min(settings.max_tail);

    let loop_end_ms = times.last().copied().unwrap_or(0.0) + step_duration_ms(bpm);
    let length = (loop_end_ms / 1000.0 + tail as f64) * rate as f64;
    let mut frames = vec![StereoFrame::ZERO; length.ceil() as usize];
    let attack = settings.frames(settings.attack as f64);

    let mut voices = 0u64;
    for track in sequencer.tracks() {
        for (step, &at_ms) in times.iter().enumerate() {
            if !track.is_active(step) {
                continue;
            }
            let Some(node) = track.pick_target(nodes, rng).and_then(|id| nodes.get(id)) else {
                continue;
            };
            let Some(buffer) = fetch(node) else {
                continue;
            };
            let start = settings.frames(at_ms / 1000.0).min(frames.len());
            let mut voice = Voice::new(
                PlayId(voices),
                node.id,
                buffer,
                settings.peak_gain * track.volume,
                attack,
            );
            voice.render_into(&mut frames[start..]);
            voices += 1;
        }
    }

    tracing::info!(voices, frames = frames.len(), "bounced pattern");
    Ok(Bounce {
        frames,
        sample_rate: rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode_sample;
    use crate::fixtures::{clip, record, MemorySource};
    use crate::library::{NodeId, SampleSource};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (NodeTable, MemorySource) {
        let records = vec![record("k0", "kick", 0.0, 0.0), record("s0", "snare", 1.0, 1.0)];
        let nodes = NodeTable::from_records(&records, 200.0);
        let source = MemorySource::default()
            .with("kick/k0.wav", clip(0.1, 0.5))
            .with("snare/s0.wav", clip(3.0, 0.25));
        (nodes, source)
    }

    fn loader(source: &MemorySource) -> impl FnMut(&SampleNode) -> Result<Arc<SampleBuffer>> + '_ {
        move |node| {
            let bytes = source.fetch(&node.relative_path)?;
            Ok(Arc::new(decode_sample(bytes, &node.relative_path, 44_100)?))
        }
    }

    #[test]
    fn empty_pattern_is_an_error() {
        let (nodes, source) = setup();
        let mut seq = Sequencer::new(SequencerConfig::default());
        seq.add_track(Some(NodeId(0)));
        let mut rng = StdRng::seed_from_u64(0);

        let err = bounce(&seq, &nodes, &RecordingSettings::default(), &mut rng, loader(&source))
            .unwrap_err();
        assert!(matches!(err, SampleMapError::EmptyPattern));
    }

    #[test]
    fn length_covers_loop_plus_capped_tail() {
        let (nodes, source) = setup();
        let mut seq = Sequencer::new(SequencerConfig::default());
        let kick = seq.add_track(Some(NodeId(0)));
        let snare = seq.add_track(Some(NodeId(1)));
        seq.toggle_step(kick, 0);
        seq.toggle_step(kick, 8);
        seq.toggle_step(snare, 4);
        seq.set_volume(snare, 0.5);
        let mut rng = StdRng::seed_from_u64(0);

        let mix = bounce(&seq, &nodes, &RecordingSettings::default(), &mut rng, loader(&source))
            .unwrap();

        // 16 steps of 125 ms, then the 3 s snare capped to 2 s
        assert_eq!(mix.frames.len(), (4.0 * 44_100.0) as usize);
        // kick alone once its 20 ms attack is done
        assert!((mix.frames[2000].left - 0.3).abs() < 1e-3);
        // snare enters at 500 ms at 0.25 * 0.6 * 0.5
        let snare_frame = 22_050 + 4000;
        assert!((mix.frames[snare_frame].left - 0.075).abs() < 1e-3);
        // kick on step 8 lands while the snare is still ringing
        assert!((mix.frames[44_100 + 2000].left - 0.375).abs() < 1e-3);
        assert!((mix.peak() - 0.375).abs() < 1e-3);

        let wav = mix.to_wav_bytes().unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.duration() as usize, mix.frames.len());
    }

    #[test]
    fn failed_samples_are_left_out() {
        let (nodes, _) = setup();
        let source = MemorySource::default().with("kick/k0.wav", clip(0.1, 0.5));
        let mut seq = Sequencer::new(SequencerConfig::default());
        let kick = seq.add_track(Some(NodeId(0)));
        let snare = seq.add_track(Some(NodeId(1)));
        seq.toggle_step(kick, 0);
        seq.toggle_step(snare, 4);
        let mut rng = StdRng::seed_from_u64(0);

        let mix = bounce(&seq, &nodes, &RecordingSettings::default(), &mut rng, loader(&source))
            .unwrap();
        assert!((mix.duration_secs() - 2.1).abs() < 1e-3);
        assert_eq!(mix.frames[22_050 + 4000], StereoFrame::ZERO);
    }
}
