// Aggregate statistics over per-session metrics

use serde::Serialize;

use crate::session::SessionMetrics;

/// Mean / median / 95th percentile over one series.
#[derive(Debug, Clone, Serialize)]
pub struct StatLine {
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
}

impl StatLine {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            avg: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50: median(&sorted),
            p95: percentile(&sorted, 0.95),
        })
    }
}

/// Batch-level summary computed after all sessions complete.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub n: usize,
    pub failures: usize,
    pub wall_s: Option<StatLine>,
    /// End-to-end TTFB, over sessions that produced audio only.
    pub ttfb_s: Option<StatLine>,
    /// Server-origin TTFB, over sessions that produced audio only.
    pub server_ttfb_s: Option<StatLine>,
    pub rtf: Option<StatLine>,
    pub avg_audio_s: f64,
    pub avg_xrt: f64,
    pub total_audio_s: f64,
    pub elapsed_s: f64,
    /// Audio seconds synthesized per elapsed wall second.
    pub throughput: f64,
}

impl Summary {
    pub fn compute(metrics: &[&SessionMetrics], failures: usize, elapsed_s: f64) -> Self {
        let wall: Vec<f64> = metrics.iter().map(|m| m.wall_s).collect();
        let ttfb: Vec<f64> = metrics.iter().filter_map(|m| m.ttfb_s).collect();
        let server_ttfb: Vec<f64> = metrics.iter().filter_map(|m| m.server_ttfb_s).collect();
        let rtf: Vec<f64> = metrics.iter().filter_map(|m| m.rtf).collect();
        let audio: Vec<f64> = metrics.iter().map(|m| m.audio_s).collect();
        let total_audio_s: f64 = audio.iter().sum();

        Self {
            n: metrics.len(),
            failures,
            wall_s: StatLine::from_values(&wall),
            ttfb_s: StatLine::from_values(&ttfb),
            server_ttfb_s: StatLine::from_values(&server_ttfb),
            rtf: StatLine::from_values(&rtf),
            avg_audio_s: mean(&audio),
            avg_xrt: mean(&metrics.iter().map(|m| m.xrt).collect::<Vec<_>>()),
            total_audio_s,
            elapsed_s,
            throughput: if elapsed_s > 0.0 {
                total_audio_s / elapsed_s
            } else {
                0.0
            },
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Nearest-rank percentile on a sorted series.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let k = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[k.min(sorted.len() - 1)]
}
