use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Deserialize;

use crate::error::{Result, SketchError};
use crate::types::HandReading;

/// Boundary to the hand-landmark detector.
///
/// Returns `None` when no hand is visible in `frame`.
pub trait FingerStateReader {
    fn read(&mut self, frame: &RgbImage) -> Option<HandReading>;
}

impl<F> FingerStateReader for F
where
    F: FnMut(&RgbImage) -> Option<HandReading>,
{
    fn read(&mut self, frame: &RgbImage) -> Option<HandReading> {
        self(frame)
    }
}

/// Supplier of camera frames.
///
/// `Ok(None)` marks the end of the stream; `Err` means the camera failed and
/// the frame loop has to stop.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// One line of a detector recording.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RecordedFrame {
    /// Capture time relative to the start of the recording
    #[serde(default)]
    pub timestamp_ms: Option<f64>,
    #[serde(default)]
    pub hand: Option<HandReading>,
}

/// Replays detector output recorded as JSON lines, one record per frame.
///
/// ```text
/// {"timestamp_ms": 0, "hand": {"fingers": [0,1,0,0,0], "landmarks": [[..], ..]}}
/// {"timestamp_ms": 33}
/// ```
#[derive(Debug, Clone)]
pub struct ReplayReader {
    records: Vec<RecordedFrame>,
    cursor: usize,
}

impl ReplayReader {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let reader = Self::parse(&text)?;
        log::info!(
            "Loaded {} recorded frames from {}",
            reader.len(),
            path.display()
        );
        Ok(reader)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: RecordedFrame = serde_json::from_str(line)
                .map_err(|source| SketchError::Replay { line: i + 1, source })?;
            records.push(record);
        }
        Ok(Self { records, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.records.len()
    }

    /// Timestamp of the record that the next `read` will return.
    pub fn next_timestamp_ms(&self) -> Option<f64> {
        self.records.get(self.cursor).and_then(|r| r.timestamp_ms)
    }
}

impl FingerStateReader for ReplayReader {
    fn read(&mut self, _frame: &RgbImage) -> Option<HandReading> {
        let record = self.records.get(self.cursor)?;
        self.cursor += 1;
        record.hand.clone()
    }
}

/// Frames read from image files in a directory, in file-name order.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
}

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .map_err(|e| SketchError::CameraUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SketchError::CameraUnavailable(format!(
                "no frames in {}",
                dir.display()
            )));
        }
        log::info!("Found {} frames in {}", files.len(), dir.display());
        Ok(Self { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let frame = image::open(path)
            .map_err(|e| SketchError::CameraUnavailable(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        Ok(Some(frame))
    }
}

/// Black frames of a fixed size, for replaying detector recordings without
/// camera footage.
pub struct BlankFrameSource {
    width: u32,
    height: u32,
    remaining: Option<usize>,
}

impl BlankFrameSource {
    /// `count` frames, or an endless stream for `None`.
    pub fn new(width: u32, height: u32, count: Option<usize>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SketchError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            remaining: count,
        })
    }
}

impl FrameSource for BlankFrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.remaining {
            Some(0) => return Ok(None),
            Some(n) => *n -= 1,
            None => {}
        }
        Ok(Some(RgbImage::new(self.width, self.height)))
    }
}
