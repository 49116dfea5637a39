use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audio_models::AudioLevels;

/// Per-session figures gathered by one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSample {
    pub application_id: String,
    /// Interval length divided by the frame cycles completed in it.
    pub latency_ms: f64,
    pub cycles: u64,
    pub levels: AudioLevels,
    pub outputs: usize,
}

/// Aggregate status published once per sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub sampled_at: DateTime<Utc>,
    pub sessions: Vec<SessionSample>,
}

impl LatencyReport {
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Mean latency over all sessions, 0 when none are active.
    pub fn average_latency_ms(&self) -> f64 {
        if self.sessions.is_empty() {
            return 0.0;
        }
        let total: f64 = self.sessions.iter().map(|s| s.latency_ms).sum();
        total / self.sessions.len() as f64
    }

    /// One-line status text, e.g. for a persistent notification.
    pub fn summary(&self) -> String {
        format!(
            "Controlling {} apps. Latency: {}ms",
            self.active_sessions(),
            self.average_latency_ms() as u64
        )
    }
}

/// Latency over one interval: interval length per completed cycle.
///
/// Zero cycles count as one so an idle session reports the whole interval.
pub fn latency_ms(interval_ms: u64, cycles: u64) -> f64 {
    interval_ms as f64 / cycles.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(app: &str, latency_ms: f64) -> SessionSample {
        SessionSample {
            application_id: app.into(),
            latency_ms,
            cycles: 0,
            levels: AudioLevels::default(),
            outputs: 1,
        }
    }

    #[test]
    fn latency_divides_interval_by_cycles() {
        assert_relative_eq!(latency_ms(1000, 10), 100.0);
        assert_relative_eq!(latency_ms(1000, 20), 50.0);
        assert_relative_eq!(latency_ms(1000, 30), 33.333_333, epsilon = 1e-3);
    }

    #[test]
    fn zero_cycles_is_floored_to_one() {
        assert_relative_eq!(latency_ms(1000, 0), 1000.0);
    }

    #[test]
    fn report_average_and_summary() {
        let report = LatencyReport {
            sampled_at: Utc::now(),
            sessions: vec![sample("a.b", 20.0), sample("c.d", 40.0)],
        };
        assert_relative_eq!(report.average_latency_ms(), 30.0);
        assert_eq!(report.summary(), "Controlling 2 apps. Latency: 30ms");
    }

    #[test]
    fn empty_report_averages_to_zero() {
        let report = LatencyReport {
            sampled_at: Utc::now(),
            sessions: Vec::new(),
        };
        assert_eq!(report.average_latency_ms(), 0.0);
    }
}
