use std::io::{Cursor, ErrorKind};

use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::library::AudioFormat;
use crate::{Result, SampleMapError};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub const ZERO: StereoFrame = StereoFrame {
        left: 0.0,
        right: 0.0,
    };

    pub fn mono(value: f32) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    fn lerp(self, other: StereoFrame, t: f32) -> StereoFrame {
        StereoFrame {
            left: self.left + (other.left - self.left) * t,
            right: self.right + (other.right - self.right) * t,
        }
    }
}

/// Decoded stereo PCM at a known rate.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub frames: Vec<StereoFrame>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(frames: Vec<StereoFrame>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f32 / self.sample_rate as f32
    }

    /// Copy of this buffer at `target_rate`.
    pub fn resampled(&self, target_rate: u32) -> SampleBuffer {
        SampleBuffer::new(
            resample_linear(&self.frames, self.sample_rate, target_rate),
            target_rate,
        )
    }
}

/// Linear-interpolation resampler.
pub fn resample_linear(
    frames: &[StereoFrame],
    source_rate: u32,
    target_rate: u32,
) -> Vec<StereoFrame> {
    if source_rate == 0 || target_rate == 0 || source_rate == target_rate {
        return frames.to_vec();
    }
    let Some(last) = frames.last().copied() else {
        return Vec::new();
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (frames.len() as f64 * ratio).ceil() as usize;
    (0..out_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let index = src_pos.floor() as usize;
            if index + 1 >= frames.len() {
                last
            } else {
                frames[index].lerp(frames[index + 1], (src_pos - index as f64) as f32)
            }
        })
        .collect()
}

/// Decodes an in-memory audio file into stereo frames at `target_rate`.
///
/// `relative_path` only supplies the container hint and the error context.
pub fn decode_sample(
    bytes: Vec<u8>,
    relative_path: &str,
    target_rate: u32,
) -> Result<SampleBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(AudioFormat::from_path(relative_path).extension());

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| SampleMapError::decode(relative_path, err))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| SampleMapError::decode(relative_path, "no default track"))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SampleMapError::decode(relative_path, "missing sample rate"))?;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| SampleMapError::decode(relative_path, err))?;

    let mut frames = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(SampleMapError::decode(relative_path, err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(path = relative_path, reason, "skipping corrupt packet");
                continue;
            }
            Err(err) => return Err(SampleMapError::decode(relative_path, err)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            continue;
        }
        let mut pcm = PcmBuffer::<f32>::new(decoded.capacity() as u64, spec);
        pcm.copy_interleaved_ref(decoded);
        frames.extend(pcm.samples().chunks_exact(channels).map(|chunk| {
            if channels == 1 {
                StereoFrame::mono(chunk[0])
            } else {
                StereoFrame {
                    left: chunk[0],
                    right: chunk[1],
                }
            }
        }));
    }

    if frames.is_empty() {
        return Err(SampleMapError::decode(relative_path, "no audio frames"));
    }

    let buffer = SampleBuffer::new(frames, source_rate);
    Ok(if source_rate == target_rate {
        buffer
    } else {
        buffer.resampled(target_rate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::wav_bytes;

    #[test]
    fn decodes_mono_wav_into_stereo_frames() {
        let bytes = wav_bytes(1, 22_050, &[0.5; 2205]);
        let buffer = decode_sample(bytes, "kick/a.wav", 22_050).unwrap();

        assert_eq!(buffer.len(), 2205);
        assert!((buffer.duration_secs() - 0.1).abs() < 1e-4);
        let first = buffer.frames[0];
        assert!((first.left - 0.5).abs() < 1e-3);
        assert_eq!(first.left, first.right);
    }

    #[test]
    fn decoding_resamples_to_target_rate() {
        let bytes = wav_bytes(2, 22_050, &[0.25; 2 * 2205]);
        let buffer = decode_sample(bytes, "hat.wav", 44_100).unwrap();

        assert_eq!(buffer.sample_rate, 44_100);
        assert_eq!(buffer.len(), 4410);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode_sample(vec![1, 2, 3, 4], "broken.wav", 44_100).unwrap_err();
        assert!(matches!(err, SampleMapError::Decode { .. }));
    }

    #[test]
    fn linear_resampling_interpolates_between_frames() {
        let frames = vec![StereoFrame::mono(0.0), StereoFrame::mono(1.0)];
        let out = resample_linear(&frames, 1, 2);

        assert_eq!(out.len(), 4);
        assert!((out[1].left - 0.5).abs() < 1e-6);
        assert_eq!(out[3], StereoFrame::mono(1.0));
    }
}
