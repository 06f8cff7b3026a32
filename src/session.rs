use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::canvas::DrawingStatistics;
use crate::constants::{EFFICIENCY_HIGH_GESTURES, EFFICIENCY_MEDIUM_GESTURES, FPS_WINDOW};
use crate::error::Result;
use crate::recognition::RecognitionStats;
use crate::types::GestureLabel;
use crate::utils;

/// Rolling frames-per-second estimate.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    times: VecDeque<Instant>,
}

impl FrameClock {
    pub fn tick(&mut self, now: Instant) {
        if self.times.len() == FPS_WINDOW {
            self.times.pop_front();
        }
        self.times.push_back(now);
    }

    /// Average rate over the window; 0.0 with fewer than two frames.
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.times.front(), self.times.back()) else {
            return 0.0;
        };
        if self.times.len() < 2 {
            return 0.0;
        }
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (self.times.len() - 1) as f64 / span
    }
}

/// Per-session gesture tallies and timing.
#[derive(Debug, Clone)]
pub struct SessionAnalytics {
    started_at: DateTime<Local>,
    started: Instant,
    gestures: BTreeMap<GestureLabel, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub start_time: DateTime<Local>,
    pub duration_minutes: f64,
    pub end_time: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GestureAnalytics {
    pub total_gestures: u64,
    pub gesture_breakdown: BTreeMap<GestureLabel, u64>,
    pub most_used_gesture: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductivityMetrics {
    pub gestures_per_minute: f64,
    pub drawing_efficiency: &'static str,
}

/// Flat session report written on demand.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_info: SessionInfo,
    pub drawing_statistics: Option<DrawingStatistics>,
    pub gesture_analytics: GestureAnalytics,
    pub ai_performance: RecognitionStats,
    pub productivity_metrics: ProductivityMetrics,
}

impl Default for SessionAnalytics {
    fn default() -> Self {
        Self::start()
    }
}

impl SessionAnalytics {
    pub fn start() -> Self {
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            gestures: BTreeMap::new(),
        }
    }

    /// Count one activation of `label`. IDLE and UNKNOWN are ignored.
    pub fn track_gesture(&mut self, label: GestureLabel) {
        if label.is_actionable() {
            *self.gestures.entry(label).or_insert(0) += 1;
        }
    }

    pub fn total_gestures(&self) -> u64 {
        self.gestures.values().sum()
    }

    pub fn gesture_count(&self, label: GestureLabel) -> u64 {
        self.gestures.get(&label).copied().unwrap_or(0)
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Most frequent gesture; ties go to the label listed first.
    pub fn most_used(&self) -> Option<GestureLabel> {
        let mut best: Option<(GestureLabel, u64)> = None;
        for (&label, &count) in &self.gestures {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label)
    }

    pub fn report(
        &self,
        drawing_statistics: Option<DrawingStatistics>,
        ai_performance: RecognitionStats,
    ) -> SessionReport {
        self.report_at(self.elapsed(), drawing_statistics, ai_performance)
    }

    pub(crate) fn report_at(
        &self,
        elapsed: Duration,
        drawing_statistics: Option<DrawingStatistics>,
        ai_performance: RecognitionStats,
    ) -> SessionReport {
        let seconds = elapsed.as_secs_f64();
        let total = self.total_gestures();
        let per_minute = if seconds > 0.0 {
            total as f64 / seconds * 60.0
        } else {
            0.0
        };
        let efficiency = if total > EFFICIENCY_HIGH_GESTURES {
            "High"
        } else if total > EFFICIENCY_MEDIUM_GESTURES {
            "Medium"
        } else {
            "Low"
        };

        SessionReport {
            session_info: SessionInfo {
                start_time: self.started_at,
                duration_minutes: utils::round_to(seconds / 60.0, 2),
                end_time: Local::now(),
            },
            drawing_statistics,
            gesture_analytics: GestureAnalytics {
                total_gestures: total,
                gesture_breakdown: self.gestures.clone(),
                most_used_gesture: self
                    .most_used()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "None".to_string()),
            },
            ai_performance,
            productivity_metrics: ProductivityMetrics {
                gestures_per_minute: utils::round_to(per_minute, 2),
                drawing_efficiency: efficiency,
            },
        }
    }

    /// Default report file name, stamped with the session start.
    pub fn report_filename(&self) -> String {
        format!(
            "session_report_{}.json",
            self.started_at.format("%Y%m%d_%H%M%S")
        )
    }
}

impl SessionReport {
    pub fn write(&self, path: &Path) -> Result<PathBuf> {
        utils::ensure_parent_dir(path)?;
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Wrote session report to {}", path.display());
        Ok(path.to_path_buf())
    }
}
