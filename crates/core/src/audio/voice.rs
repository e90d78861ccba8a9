use std::sync::Arc;

use super::buffer::{SampleBuffer, StereoFrame};
use crate::library::NodeId;

/// Key of one playing voice. Two triggers of the same sample get two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayId(pub u64);

/// Linear gain ramp, advanced one frame at a time.
#[derive(Debug, Clone, Copy)]
struct Ramp {
    value: f32,
    target: f32,
    step: f32,
    remaining: usize,
}

impl Ramp {
    fn new(from: f32, to: f32, frames: usize) -> Self {
        let mut ramp = Self {
            value: from,
            target: from,
            step: 0.0,
            remaining: 0,
        };
        ramp.retarget(to, frames);
        ramp
    }

    fn retarget(&mut self, to: f32, frames: usize) {
        self.target = to;
        if frames == 0 {
            self.value = to;
            self.step = 0.0;
            self.remaining = 0;
        } else {
            self.step = (to - self.value) / frames as f32;
            self.remaining = frames;
        }
    }

    fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.value += self.step;
            self.remaining -= 1;
            if self.remaining == 0 {
                self.value = self.target;
            }
        }
        self.value
    }

    fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}

/// One playback of a decoded buffer.
#[derive(Debug, Clone)]
pub struct Voice {
    pub id: PlayId,
    pub node: NodeId,
    buffer: Arc<SampleBuffer>,
    position: usize,
    gain: Ramp,
    releasing: bool,
    finished: bool,
}

impl Voice {
    pub fn new(
        id: PlayId,
        node: NodeId,
        buffer: Arc<SampleBuffer>,
        peak_gain: f32,
        attack_frames: usize,
    ) -> Self {
        Self {
            id,
            node,
            buffer,
            position: 0,
            gain: Ramp::new(0.0, peak_gain, attack_frames),
            releasing: false,
            finished: false,
        }
    }

    /// Fades to silence over `frames`, then stops.
    pub fn release(&mut self, frames: usize) {
        self.releasing = true;
        self.gain.retarget(0.0, frames);
        if frames == 0 {
            self.finished = true;
        }
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn gain(&self) -> f32 {
        self.gain.value
    }

    /// Mixes this voice into `out`.
    pub fn render_into(&mut self, out: &mut [StereoFrame]) {
        for frame in out.iter_mut() {
            if self.finished {
                return;
            }
            let Some(sample) = self.buffer.frames.get(self.position) else {
                self.finished = true;
                return;
            };
            let gain = self.gain.next();
            frame.left += sample.left * gain;
            frame.right += sample.right * gain;
            self.position += 1;

            if self.releasing && self.gain.is_settled() {
                self.finished = true;
            }
        }
        if self.position >= self.buffer.frames.len() {
            self.finished = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(frames: usize) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![StereoFrame::mono(1.0); frames], 1000))
    }

    #[test]
    fn attack_ramps_linearly_to_peak() {
        let mut voice = Voice::new(PlayId(0), NodeId(0), buffer(100), 0.6, 20);
        let mut out = vec![StereoFrame::ZERO; 40];
        voice.render_into(&mut out);

        assert!((out[9].left - 0.3).abs() < 1e-5);
        assert!((out[19].left - 0.6).abs() < 1e-5);
        assert!((out[39].left - 0.6).abs() < 1e-5);
        assert!(!voice.is_finished());
    }

    #[test]
    fn finishes_at_end_of_buffer() {
        let mut voice = Voice::new(PlayId(0), NodeId(0), buffer(10), 1.0, 0);
        let mut out = vec![StereoFrame::ZERO; 16];
        voice.render_into(&mut out);

        assert!(voice.is_finished());
        assert_eq!(out[9].left, 1.0);
        assert_eq!(out[10].left, 0.0);
    }

    #[test]
    fn release_fades_then_stops() {
        let mut voice = Voice::new(PlayId(0), NodeId(0), buffer(1000), 0.5, 0);
        voice.release(50);
        let mut out = vec![StereoFrame::ZERO; 80];
        voice.render_into(&mut out);

        assert!(voice.is_finished());
        assert!((out[24].left - 0.25).abs() < 1e-4);
        assert_eq!(out[60].left, 0.0);
    }
}
