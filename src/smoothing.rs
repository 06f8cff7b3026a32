// Majority-vote smoothing of per-frame finger states
use std::collections::VecDeque;

use crate::constants::{FINGER_COUNT, MAX_SMOOTHING_BUFFER_SIZE, SMOOTHING_BUFFER_SIZE};
use crate::types::FingerState;

/// Sliding window over recent finger states.
///
/// Each finger is smoothed independently: it counts as up when strictly more
/// than half of the samples in the window have it up.
#[derive(Debug, Clone)]
pub struct GestureSmoother {
    window: VecDeque<FingerState>,
    buffer_size: usize,
}

impl Default for GestureSmoother {
    fn default() -> Self {
        Self::new(SMOOTHING_BUFFER_SIZE)
    }
}

impl GestureSmoother {
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            window: VecDeque::with_capacity(buffer_size.min(MAX_SMOOTHING_BUFFER_SIZE)),
            buffer_size,
        }
    }

    /// Feed one detector reading and return the smoothed state.
    ///
    /// `None` means no hand was visible: the window is dropped so smoothing
    /// never spans a hand-loss event, and the neutral state is returned.
    pub fn observe(&mut self, reading: Option<FingerState>) -> FingerState {
        let Some(fingers) = reading else {
            self.window.clear();
            return FingerState::NEUTRAL;
        };

        if self.window.len() == self.buffer_size {
            self.window.pop_front();
        }
        self.window.push_back(fingers);

        self.smoothed()
    }

    /// Current majority vote without adding a sample.
    pub fn smoothed(&self) -> FingerState {
        if self.window.is_empty() {
            return FingerState::NEUTRAL;
        }

        let half = self.window.len() / 2;
        let mut result = [false; FINGER_COUNT];
        for (finger, slot) in result.iter_mut().enumerate() {
            let ups = self.window.iter().filter(|s| s.is_up(finger)).count();
            *slot = ups > half;
        }
        FingerState(result)
    }

    /// Fraction of samples equal to the newest one; 0.0 until the window is full.
    pub fn confidence(&self) -> f32 {
        if self.window.len() < self.buffer_size {
            return 0.0;
        }
        let Some(reference) = self.window.back() else {
            return 0.0;
        };
        let matches = self.window.iter().filter(|s| *s == reference).count();
        matches as f32 / self.window.len() as f32
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}
