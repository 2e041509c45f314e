//! Frame timing statistics.
//!
//! Wall time per frame is accumulated over a fixed window; once the frame
//! counter exceeds the interval a summary is emitted and both counters reset.

use std::fmt;
use std::time::Duration;

use crate::compute::{DeviceClass, DispatchParameters, StorageMode};

/// Frames per reporting window.
pub const DEFAULT_REPORT_INTERVAL: u32 = 30;

/// Mean latency and rate over one window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRate {
    pub latency_ms: f64,
    pub rate_hz: f64,
    pub frames: u32,
}

/// Running accumulator.
#[derive(Clone, Debug)]
pub struct StatsAccumulator {
    elapsed: f64,
    frames: u32,
    interval: u32,
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}

impl StatsAccumulator {
    pub fn new(interval: u32) -> Self {
        Self { elapsed: 0.0, frames: 0, interval }
    }

    /// Add one frame. Returns a summary when the window closes.
    pub fn record(&mut self, elapsed_seconds: f64) -> Option<FrameRate> {
        self.elapsed += elapsed_seconds;
        self.frames += 1;

        if self.frames <= self.interval {
            return None;
        }

        let latency_ms = 1000.0 * self.elapsed / self.frames as f64;
        let rate = FrameRate {
            latency_ms,
            rate_hz: 1.0 / (latency_ms / 1000.0),
            frames: self.frames,
        };
        self.elapsed = 0.0;
        self.frames = 0;
        Some(rate)
    }

    pub fn record_duration(&mut self, elapsed: Duration) -> Option<FrameRate> {
        self.record(elapsed.as_secs_f64())
    }

    pub fn accumulated(&self) -> f64 {
        self.elapsed
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }
}

/// Formatted stats line shown in the window title.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsReport {
    pub rate: FrameRate,
    pub class: DeviceClass,
    pub mode: StorageMode,
    pub zoom: f32,
    pub center: [f32; 2],
}

impl StatsReport {
    pub fn new(rate: FrameRate, class: DeviceClass, mode: StorageMode, params: &DispatchParameters) -> Self {
        let c = params.center();
        Self { rate, class, mode, zoom: params.zoom(), center: [c.x, c.y] }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Compute: {:3.2} ms Display: {:3.2} fps ({}) Zoom: {:.6} Position: ({:.6}, {:.6})",
            self.class,
            self.rate.latency_ms,
            self.rate.rate_hz,
            self.mode.label(),
            self.zoom,
            self.center[0],
            self.center[1],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_report_within_interval() {
        let mut s = StatsAccumulator::new(30);
        for _ in 0..30 {
            assert!(s.record(0.01).is_none());
        }
        assert_eq!(s.frames(), 30);
    }

    #[test]
    fn test_report_after_interval() {
        let mut s = StatsAccumulator::new(30);
        let times: Vec<f64> = (0..31).map(|i| 0.001 * (i + 1) as f64).collect();
        let mut reports = Vec::new();
        for t in &times {
            if let Some(r) = s.record(*t) {
                reports.push(r);
            }
        }
        assert_eq!(reports.len(), 1);

        let expected = 1000.0 * times.iter().sum::<f64>() / times.len() as f64;
        let r = reports[0];
        assert!((r.latency_ms - expected).abs() < 1e-9);
        assert!((r.rate_hz - 1000.0 / expected).abs() < 1e-6);
        assert_eq!(r.frames, 31);
        assert_eq!(s.frames(), 0);
        assert_eq!(s.accumulated(), 0.0);
    }

    #[test]
    fn test_windows_repeat() {
        let mut s = StatsAccumulator::new(2);
        let emitted = (0..9).filter_map(|_| s.record(0.5)).count();
        assert_eq!(emitted, 3);
    }

    #[test]
    fn test_report_format() {
        let params = DispatchParameters::default();
        let rate = FrameRate { latency_ms: 3.2, rate_hz: 312.5, frames: 31 };
        let report = StatsReport::new(rate, DeviceClass::Gpu, StorageMode::Shared, &params);
        assert_eq!(
            report.to_string(),
            "[GPU] Compute: 3.20 ms Display: 312.50 fps (attached) Zoom: 3.000000 Position: (-0.750000, 0.000000)"
        );
    }
}
