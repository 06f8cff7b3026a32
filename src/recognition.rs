use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canvas::encode_png;
use crate::constants::{HISTORY_LIMIT, SKETCH_CONTEXT};
use crate::error::{Result, SketchError};
use crate::utils;

/// Failure reported by the recognition collaborator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("AI not configured. Please provide API key.")]
    NotConfigured,
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("No response from AI")]
    EmptyResponse,
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::NotConfigured => FailureKind::NotConfigured,
            BackendError::Authentication(_) => FailureKind::Authentication,
            BackendError::Timeout => FailureKind::Timeout,
            BackendError::Http { .. } | BackendError::Transport(_) => FailureKind::Unavailable,
            BackendError::MalformedResponse(_) => FailureKind::MalformedResponse,
            BackendError::EmptyResponse => FailureKind::EmptyResponse,
        }
    }
}

/// Something that can look at a PNG and answer a prompt about it.
pub trait RecognitionBackend {
    fn describe(&self, prompt: &str, png: &[u8]) -> std::result::Result<String, BackendError>;
}

/// Canned instructions sent with the sketch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptProfile {
    #[default]
    Simple,
    Detailed,
    Creative,
    Educational,
}

impl PromptProfile {
    pub const ALL: [PromptProfile; 4] = [
        PromptProfile::Simple,
        PromptProfile::Detailed,
        PromptProfile::Creative,
        PromptProfile::Educational,
    ];

    pub fn prompt(&self) -> &'static str {
        match self {
            PromptProfile::Simple => {
                "What is this drawing? Respond with just the name of the object."
            }
            PromptProfile::Detailed => {
                "Analyze this drawing and provide a detailed description including what it might be, artistic style, and confidence level."
            }
            PromptProfile::Creative => {
                "Look at this drawing and tell me what creative story or idea it represents."
            }
            PromptProfile::Educational => {
                "Identify this drawing and provide educational information about the subject."
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptProfile::Simple => "simple",
            PromptProfile::Detailed => "detailed",
            PromptProfile::Creative => "creative",
            PromptProfile::Educational => "educational",
        }
    }
}

impl fmt::Display for PromptProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptProfile {
    type Err = SketchError;

    fn from_str(s: &str) -> Result<Self> {
        PromptProfile::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SketchError::UnknownPromptProfile(s.to_string()))
    }
}

const COMPLEXITY_PROMPT: &str = "Analyze this drawing and rate its complexity on a scale of 1-10 where:
1-3: Very simple (basic shapes, stick figures)
4-6: Moderate (recognizable objects with some detail)
7-10: Complex (detailed, artistic, multiple elements)

Provide the rating and a brief explanation.";

const SUGGESTION_PROMPT: &str = "Look at this drawing and provide 3 constructive suggestions for improvement.
Focus on:
1. Adding details that would make it more recognizable
2. Improving proportions or structure
3. Enhancing artistic elements

Keep suggestions encouraging and specific.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotConfigured,
    Authentication,
    Timeout,
    Unavailable,
    MalformedResponse,
    EmptyResponse,
    NoImage,
    Encoding,
}

/// Result of a recognition request. Failures are values, not errors, so a
/// bad response never interrupts the drawing session.
#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionOutcome {
    Recognized { text: String, latency: Duration },
    Cached { text: String },
    Failed { kind: FailureKind, message: String },
}

impl RecognitionOutcome {
    fn failed(err: &BackendError) -> Self {
        let message = match err {
            BackendError::NotConfigured | BackendError::EmptyResponse => err.to_string(),
            other => format!("AI recognition error: {other}"),
        };
        RecognitionOutcome::Failed {
            kind: err.kind(),
            message,
        }
    }

    /// Text shown to the user.
    pub fn display_text(&self) -> String {
        match self {
            RecognitionOutcome::Recognized { text, .. } => text.clone(),
            RecognitionOutcome::Cached { text } => format!("{text} (cached)"),
            RecognitionOutcome::Failed { message, .. } => message.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, RecognitionOutcome::Failed { .. })
    }
}

/// Exact-byte digest of an image, dimensions included.
pub fn content_hash(img: &RgbImage) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&img.width().to_le_bytes());
    hasher.update(&img.height().to_le_bytes());
    hasher.update(img.as_raw());
    hasher.finalize().to_hex().to_string()
}

#[derive(Clone, Debug)]
pub struct RecognitionCacheEntry {
    pub content_hash: String,
    pub result_text: String,
    pub timestamp: DateTime<Local>,
    pub latency: Duration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub result: String,
    /// Seconds, two decimals
    pub processing_time: f64,
    pub prompt_type: PromptProfile,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RecognitionStats {
    pub total_recognitions: usize,
    pub average_processing_time: f64,
    pub cache_size: usize,
    pub prompt_type_usage: BTreeMap<String, usize>,
    pub api_configured: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Sends canvas snapshots to the recognition backend, deduplicating
/// identical snapshots through an in-memory cache.
///
/// The cache never evicts; call [`clear_cache`](Self::clear_cache) in long
/// sessions.
pub struct RecognitionDispatcher {
    backend: Option<Box<dyn RecognitionBackend>>,
    profile: PromptProfile,
    cache: HashMap<String, RecognitionCacheEntry>,
    history: VecDeque<HistoryEntry>,
    history_file: Option<PathBuf>,
}

impl RecognitionDispatcher {
    pub fn new(backend: Option<Box<dyn RecognitionBackend>>) -> Self {
        Self {
            backend,
            profile: PromptProfile::default(),
            cache: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            history_file: None,
        }
    }

    /// Persist history to `path`, loading whatever is already there.
    pub fn with_history_file(mut self, path: PathBuf) -> Self {
        self.history = load_history(&path);
        self.history_file = Some(path);
        self
    }

    pub fn set_backend(&mut self, backend: Box<dyn RecognitionBackend>) {
        self.backend = Some(backend);
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn set_prompt_profile(&mut self, profile: PromptProfile) {
        self.profile = profile;
    }

    pub fn prompt_profile(&self) -> PromptProfile {
        self.profile
    }

    /// Identify the sketch using the current prompt profile.
    pub fn recognize(&mut self, snapshot: &RgbImage) -> RecognitionOutcome {
        self.recognize_with_prompt(snapshot, None)
    }

    /// Identify the sketch with `custom_prompt` instead of the profile prompt.
    pub fn recognize_with_prompt(
        &mut self,
        snapshot: &RgbImage,
        custom_prompt: Option<&str>,
    ) -> RecognitionOutcome {
        let Some(backend) = self.backend.as_deref() else {
            return RecognitionOutcome::failed(&BackendError::NotConfigured);
        };

        let key = content_hash(snapshot);
        if let Some(entry) = self.cache.get(&key) {
            log::debug!("Recognition cache hit {}", &key[..12]);
            return RecognitionOutcome::Cached {
                text: entry.result_text.clone(),
            };
        }

        let png = match encode_png(snapshot) {
            Ok(png) => png,
            Err(e) => {
                log::error!("Failed to encode snapshot: {}", e);
                return RecognitionOutcome::Failed {
                    kind: FailureKind::Encoding,
                    message: format!("AI recognition error: {e}"),
                };
            }
        };

        let base = custom_prompt.unwrap_or_else(|| self.profile.prompt());
        let prompt = format!("{base}\n\n{SKETCH_CONTEXT}");

        let started = Instant::now();
        let result = backend.describe(&prompt, &png);
        let latency = started.elapsed();

        match result {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return RecognitionOutcome::failed(&BackendError::EmptyResponse);
                }
                log::info!(
                    "Recognized sketch in {:.2}s: {}",
                    latency.as_secs_f64(),
                    text
                );
                self.cache.insert(
                    key.clone(),
                    RecognitionCacheEntry {
                        content_hash: key,
                        result_text: text.clone(),
                        timestamp: Local::now(),
                        latency,
                    },
                );
                self.add_to_history(&text, latency);
                RecognitionOutcome::Recognized { text, latency }
            }
            Err(e) => {
                log::warn!("Recognition failed: {}", e);
                RecognitionOutcome::failed(&e)
            }
        }
    }

    /// Ask for a 1-10 complexity rating. Not cached.
    pub fn analyze_complexity(&self, snapshot: &RgbImage) -> RecognitionOutcome {
        self.ask_once(snapshot, COMPLEXITY_PROMPT)
    }

    /// Ask for three improvement suggestions. Not cached.
    pub fn suggest_improvements(&self, snapshot: &RgbImage) -> RecognitionOutcome {
        self.ask_once(snapshot, SUGGESTION_PROMPT)
    }

    fn ask_once(&self, snapshot: &RgbImage, prompt: &str) -> RecognitionOutcome {
        let Some(backend) = self.backend.as_deref() else {
            return RecognitionOutcome::failed(&BackendError::NotConfigured);
        };
        let png = match encode_png(snapshot) {
            Ok(png) => png,
            Err(e) => {
                return RecognitionOutcome::Failed {
                    kind: FailureKind::Encoding,
                    message: format!("AI recognition error: {e}"),
                }
            }
        };
        let started = Instant::now();
        match backend.describe(prompt, &png) {
            Ok(text) if !text.trim().is_empty() => RecognitionOutcome::Recognized {
                text: text.trim().to_string(),
                latency: started.elapsed(),
            },
            Ok(_) => RecognitionOutcome::failed(&BackendError::EmptyResponse),
            Err(e) => RecognitionOutcome::failed(&e),
        }
    }

    fn add_to_history(&mut self, result: &str, latency: Duration) {
        self.history.push_back(HistoryEntry {
            timestamp: Local::now(),
            result: result.to_string(),
            processing_time: utils::round_to(latency.as_secs_f64(), 2),
            prompt_type: self.profile,
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.save_history();
    }

    fn save_history(&self) {
        let Some(path) = &self.history_file else {
            return;
        };
        let write = || -> Result<()> {
            utils::ensure_parent_dir(path)?;
            let entries: Vec<&HistoryEntry> = self.history.iter().collect();
            fs::write(path, serde_json::to_string_pretty(&entries)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            log::warn!("Error saving history to {}: {}", path.display(), e);
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_entry(&self, snapshot: &RgbImage) -> Option<&RecognitionCacheEntry> {
        self.cache.get(&content_hash(snapshot))
    }

    pub fn clear_cache(&mut self) {
        log::info!("Clearing {} cached recognitions", self.cache.len());
        self.cache.clear();
    }

    /// Forget history, including the persisted file.
    pub fn clear_history(&mut self) {
        self.history.clear();
        if let Some(path) = &self.history_file {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    log::warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }

    pub fn stats(&self) -> RecognitionStats {
        let total = self.history.len();
        let average = if total > 0 {
            self.history.iter().map(|e| e.processing_time).sum::<f64>() / total as f64
        } else {
            0.0
        };

        let mut usage = BTreeMap::new();
        for entry in &self.history {
            *usage.entry(entry.prompt_type.to_string()).or_insert(0) += 1;
        }

        RecognitionStats {
            total_recognitions: total,
            average_processing_time: utils::round_to(average, 2),
            cache_size: self.cache.len(),
            prompt_type_usage: usage,
            api_configured: self.is_configured(),
        }
    }

    /// Write history and stats to `dir` as `recognition_export_<stamp>.<ext>`.
    pub fn export(&self, format: ExportFormat, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        match format {
            ExportFormat::Json => {
                let path = dir.join(utils::timestamped_filename("recognition_export", "json"));
                let entries: Vec<&HistoryEntry> = self.history.iter().collect();
                let doc = serde_json::json!({
                    "export_timestamp": Local::now(),
                    "total_entries": entries.len(),
                    "history": entries,
                    "stats": self.stats(),
                });
                fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
                Ok(path)
            }
            ExportFormat::Csv => {
                let path = dir.join(utils::timestamped_filename("recognition_export", "csv"));
                let mut writer = BufWriter::new(fs::File::create(&path)?);
                writeln!(writer, "Timestamp,Result,Processing Time,Prompt Type")?;
                for e in &self.history {
                    writeln!(
                        writer,
                        "{},{},{},{}",
                        e.timestamp.to_rfc3339(),
                        csv_field(&e.result),
                        e.processing_time,
                        e.prompt_type
                    )?;
                }
                writer.flush()?;
                Ok(path)
            }
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn load_history(path: &Path) -> VecDeque<HistoryEntry> {
    if !path.exists() {
        return VecDeque::new();
    }
    let parsed = fs::read_to_string(path)
        .map_err(SketchError::from)
        .and_then(|text| Ok(serde_json::from_str::<Vec<HistoryEntry>>(&text)?));
    match parsed {
        Ok(entries) => {
            let skip = entries.len().saturating_sub(HISTORY_LIMIT);
            entries.into_iter().skip(skip).collect()
        }
        Err(e) => {
            log::warn!("Error loading history from {}: {}", path.display(), e);
            VecDeque::new()
        }
    }
}
