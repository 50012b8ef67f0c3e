//! Abstractions for time and for sequence models to enable testing.
//!
//! This module provides traits for:
//! - `Clock`: Abstracting time access for deterministic testing
//! - `SequenceModel`: The window → next value contract the forecaster drives

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

// ==================== Clock Trait ====================

/// Trait for abstracting time access.
///
/// Model artifacts are stamped with the clock's time, and cache staleness
/// is measured against it, so tests can inject a fixed clock.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Set the mock clock to a new time.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock() = time;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock();
        *time += duration;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock()
    }
}

// ==================== SequenceModel Trait ====================

/// A fitted sequence-to-one regressor over scaled values.
///
/// Implementations see only the window they are handed; the forecaster owns
/// how that window is built and slid forward.
pub trait SequenceModel: Send + Sync {
    /// Number of values the model expects per window.
    fn window_size(&self) -> usize;

    /// Predict the next scaled value following `window`.
    ///
    /// `window` must hold exactly [`window_size`](Self::window_size) values.
    fn predict_next(&self, window: &[f64]) -> f64;
}

/// Mock sequence model that records every window it is asked about.
///
/// Predicts `last value + step`, which makes autoregressive feedback easy to
/// see in assertions.
#[derive(Debug, Clone)]
pub struct RecordingModel {
    window_size: usize,
    step: f64,
    windows: Arc<Mutex<Vec<Vec<f64>>>>,
}

impl RecordingModel {
    /// Create a new recording model.
    pub fn new(window_size: usize, step: f64) -> Self {
        Self {
            window_size,
            step,
            windows: Arc::default(),
        }
    }

    /// Get all windows seen so far, in call order.
    pub fn windows(&self) -> Vec<Vec<f64>> {
        self.windows.lock().clone()
    }

    /// Get the number of predictions made.
    pub fn call_count(&self) -> usize {
        self.windows.lock().len()
    }
}

impl SequenceModel for RecordingModel {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn predict_next(&self, window: &[f64]) -> f64 {
        self.windows.lock().push(window.to_vec());
        window.last().copied().unwrap_or(0.0) + self.step
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_system_clock_returns_current_time() {
        let clock = SystemClock;
        let before = Utc::now();
        let clock_time = clock.now_utc();
        let after = Utc::now();

        assert!(clock_time >= before);
        assert!(clock_time <= after);
    }

    #[test]
    fn test_mock_clock_can_be_updated() {
        let time1 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let time2 = Utc.with_ymd_and_hms(2024, 6, 15, 14, 0, 0).unwrap();

        let clock = MockClock::new(time1);
        assert_eq!(clock.now_utc(), time1);

        clock.set_time(time2);
        assert_eq!(clock.now_utc(), time2);
    }

    #[test]
    fn test_mock_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let clock = MockClock::new(start);

        clock.advance(chrono::Duration::hours(2));

        let expected = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(clock.now_utc(), expected);
    }

    #[test]
    fn test_recording_model_records_windows() {
        let model = RecordingModel::new(2, 0.5);

        assert_eq!(model.call_count(), 0);
        assert_eq!(model.predict_next(&[0.25, 0.5]), 1.0);
        assert_eq!(model.predict_next(&[0.5, 1.0]), 1.5);

        assert_eq!(model.call_count(), 2);
        assert_eq!(model.windows(), vec![vec![0.25, 0.5], vec![0.5, 1.0]]);
    }

    #[test]
    fn test_recording_model_clones_share_history() {
        let model = RecordingModel::new(1, 1.0);
        let clone = model.clone();

        clone.predict_next(&[3.0]);
        assert_eq!(model.call_count(), 1);
    }
}
