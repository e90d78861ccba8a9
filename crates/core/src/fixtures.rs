//! Shared test helpers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;

use crate::library::{SampleRecord, SampleSource};
use crate::{Result, SampleMapError};

/// Encodes interleaved samples as a 16-bit PCM WAV file.
pub fn wav_bytes(channels: u16, sample_rate: u32, samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer
                .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A constant-level mono clip of `seconds` at 44.1 kHz.
pub fn clip(seconds: f32, level: f32) -> Vec<u8> {
    let frames = (seconds * 44_100.0) as usize;
    wav_bytes(1, 44_100, &vec![level; frames])
}

/// Per-path fetch counts, shared with the source that fills them.
#[derive(Debug, Clone, Default)]
pub struct FetchLog(Rc<RefCell<HashMap<String, usize>>>);

impl FetchLog {
    pub fn count(&self, path: &str) -> usize {
        self.0.borrow().get(path).copied().unwrap_or(0)
    }
}

/// In-memory [`SampleSource`] that counts fetches per path.
#[derive(Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
    log: FetchLog,
}

impl MemorySource {
    pub fn with(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), bytes);
        self
    }

    /// Handle that keeps counting after the source is boxed away.
    pub fn log(&self) -> FetchLog {
        self.log.clone()
    }
}

impl SampleSource for MemorySource {
    fn fetch(&self, relative_path: &str) -> Result<Vec<u8>> {
        *self
            .log
            .0
            .borrow_mut()
            .entry(relative_path.to_string())
            .or_default() += 1;
        self.files
            .get(relative_path)
            .cloned()
            .ok_or_else(|| SampleMapError::msg(format!("missing {relative_path}")))
    }
}

pub fn record(name: &str, category: &str, x: f32, y: f32) -> SampleRecord {
    SampleRecord {
        name: name.to_string(),
        relative_path: format!("{category}/{name}.wav"),
        category: category.to_string(),
        zone: None,
        x,
        y,
    }
}
