//! Pass/fail evaluation.
//!
//! Consecutive [`Snapshot`]s are compared per endpoint: an endpoint passes an
//! interval iff its receive counter strictly increased. An interval passes iff
//! every evaluated endpoint passed. Throughput is the sum of all deltas,
//! rate-normalized by the time between the two snapshots, so a counter reset
//! pulls the interval's figure down.
//!
//! The run keeps the best interval throughput as its headline number, and the
//! final verdict adds channel checks: the AP must have started on the
//! requested channel and must have left the DFS band by the end.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use dfs_common::models::{
    ChannelState, RadarEvent, RunResult, Snapshot, TestConfiguration, Verdict,
};

/// Endpoints listed in the best/worst drop rankings.
pub const RANK_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DropSummary {
    /// Mean of the non-zero drop percentages; zero when nothing dropped.
    pub mean_pct: f64,
    /// Lowest drop first, padded with "no data".
    pub best: Vec<String>,
    /// Highest drop first, padded with "no data".
    pub worst: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IntervalReport {
    pub index: u32,
    pub passed: bool,
    pub throughput_mbps: f64,
    pub deltas: BTreeMap<String, i64>,
    /// Endpoints that did not increase, or that were missing on one side.
    pub failing: Vec<String>,
    pub drop: DropSummary,
    /// Window offset of the newer snapshot.
    pub at: Duration,
}

fn rank(entries: &[(&str, f64)]) -> Vec<String> {
    let mut ranked: Vec<String> = entries
        .iter()
        .take(RANK_DEPTH)
        .map(|(name, pct)| format!("{name}: {pct:.3}%"))
        .collect();
    ranked.resize(RANK_DEPTH, "no data".to_string());
    ranked
}

pub fn drop_summary(snapshot: &Snapshot) -> DropSummary {
    let mut entries: Vec<(&str, f64)> = snapshot
        .endpoints
        .iter()
        .map(|(name, c)| (name.as_str(), c.rx_drop_pct))
        .collect();
    let nonzero: Vec<f64> = entries.iter().map(|e| e.1).filter(|p| *p != 0.0).collect();
    let mean_pct = if nonzero.is_empty() {
        0.0
    } else {
        nonzero.iter().sum::<f64>() / nonzero.len() as f64
    };

    entries.sort_by(|a, b| a.1.total_cmp(&b.1));
    let best = rank(&entries);
    entries.reverse();
    let worst = rank(&entries);
    DropSummary {
        mean_pct,
        best,
        worst,
    }
}

/// Compare two snapshots of the same endpoint set.
pub fn compare(old: &Snapshot, new: &Snapshot) -> IntervalReport {
    let mut failing = Vec::new();
    let mut deltas = BTreeMap::new();

    if !old.same_membership(new) {
        for name in old.endpoints.keys().filter(|k| !new.endpoints.contains_key(*k)) {
            tracing::warn!(endpoint = %name, "endpoint missing from newer snapshot");
            failing.push(name.clone());
        }
        for name in new.endpoints.keys().filter(|k| !old.endpoints.contains_key(*k)) {
            tracing::warn!(endpoint = %name, "endpoint missing from older snapshot");
            failing.push(name.clone());
        }
    }

    let mut total_bytes: i64 = 0;
    for (name, newer) in &new.endpoints {
        let Some(older) = old.endpoints.get(name) else {
            continue;
        };
        let delta = newer.rx_bytes as i64 - older.rx_bytes as i64;
        deltas.insert(name.clone(), delta);
        total_bytes += delta;
        if delta <= 0 {
            tracing::warn!(
                endpoint = %name,
                old = older.rx_bytes,
                new = newer.rx_bytes,
                "endpoint rx bytes did not increase"
            );
            failing.push(name.clone());
        }
    }

    let secs = new.elapsed.saturating_sub(old.elapsed).as_secs_f64();
    let throughput_mbps = if secs > 0.0 {
        total_bytes as f64 * 8.0 / secs / 1_000_000.0
    } else {
        0.0
    };

    IntervalReport {
        index: 0,
        passed: failing.is_empty(),
        throughput_mbps,
        deltas,
        failing,
        drop: drop_summary(new),
        at: new.elapsed,
    }
}

/// Channel checks applied when the monitoring window closes.
pub fn channel_findings(
    config: &TestConfiguration,
    initial: &ChannelState,
    final_state: &ChannelState,
) -> Vec<String> {
    let requested = config.active_channel();
    let mut reasons = Vec::new();
    match initial.primary() {
        None => reasons.push("initial channel unknown".to_string()),
        Some(ch) if ch != requested => reasons.push(format!(
            "initial channel {ch} does not match requested {requested} (DFS lockout or stale config)"
        )),
        Some(_) => {}
    }
    match final_state.primary() {
        None => reasons.push("final channel unknown".to_string()),
        Some(ch) if final_state.on_dfs_channel() => {
            reasons.push(format!("final channel {ch} is still a DFS channel"))
        }
        Some(ch) if config.is_dfs() && initial.primary() == Some(ch) => {
            reasons.push(format!("AP did not vacate channel {ch}"))
        }
        Some(_) => {}
    }
    reasons
}

/// Everything [`RunEvaluator::finish`] needs beyond the interval history.
pub struct RunContext<'a> {
    pub config: &'a TestConfiguration,
    pub test_id: String,
    pub expected_throughput_mbps: f64,
    pub initial_channel: ChannelState,
    pub final_channel: ChannelState,
    pub radar: Option<RadarEvent>,
    /// Shutdown arrived before the window closed.
    pub cancelled: bool,
}

/// Accumulates interval verdicts across one monitoring window.
#[derive(Debug, Clone)]
pub struct RunEvaluator {
    tolerated_failures: u32,
    intervals: u32,
    passed: u32,
    best_mbps: f64,
    first: Option<Snapshot>,
    last: Option<Snapshot>,
}

impl RunEvaluator {
    pub fn new(tolerated_failures: u32) -> Self {
        Self {
            tolerated_failures,
            intervals: 0,
            passed: 0,
            best_mbps: 0.0,
            first: None,
            last: None,
        }
    }

    /// Record the window's first snapshot.
    pub fn baseline(&mut self, snapshot: Snapshot) {
        self.first = Some(snapshot.clone());
        self.last = Some(snapshot);
    }

    /// Compare `snapshot` against the previous one and record the verdict.
    /// Returns `None` until a baseline exists.
    pub fn observe(&mut self, snapshot: Snapshot) -> Option<IntervalReport> {
        let Some(previous) = self.last.replace(snapshot.clone()) else {
            self.first = Some(snapshot);
            return None;
        };
        self.intervals += 1;
        let mut report = compare(&previous, &snapshot);
        report.index = self.intervals;
        if report.passed {
            self.passed += 1;
        } else {
            tracing::warn!(
                interval = report.index,
                failing = ?report.failing,
                "interval failed"
            );
        }
        if report.throughput_mbps > self.best_mbps {
            self.best_mbps = report.throughput_mbps;
        }
        Some(report)
    }

    pub fn intervals(&self) -> u32 {
        self.intervals
    }

    pub fn passed(&self) -> u32 {
        self.passed
    }

    pub fn best_throughput_mbps(&self) -> f64 {
        self.best_mbps
    }

    fn window_deltas(&self) -> BTreeMap<String, i64> {
        match (&self.first, &self.last) {
            (Some(first), Some(last)) => last
                .endpoints
                .iter()
                .filter_map(|(name, c)| {
                    first
                        .endpoints
                        .get(name)
                        .map(|f| (name.clone(), c.rx_bytes as i64 - f.rx_bytes as i64))
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    pub fn finish(self, ctx: RunContext<'_>) -> RunResult {
        let mut reasons = channel_findings(ctx.config, &ctx.initial_channel, &ctx.final_channel);
        let failed = self.intervals - self.passed;
        if ctx.cancelled {
            reasons.push("cancelled during monitoring".to_string());
        } else if self.intervals == 0 {
            reasons.push("no complete polling interval".to_string());
        } else if failed > self.tolerated_failures {
            reasons.push(format!(
                "{failed} of {} intervals failed (tolerated {})",
                self.intervals, self.tolerated_failures
            ));
        }
        let verdict = if ctx.cancelled {
            Verdict::Incomplete
        } else if reasons.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        RunResult {
            config: ctx.config.clone(),
            test_id: ctx.test_id,
            verdict,
            reasons,
            best_throughput_mbps: self.best_mbps,
            expected_throughput_mbps: ctx.expected_throughput_mbps,
            intervals: self.intervals,
            passed_intervals: self.passed,
            deltas: self.window_deltas(),
            initial_channel: ctx.initial_channel,
            final_channel: ctx.final_channel,
            radar: ctx.radar,
            finished_at: Utc::now(),
        }
    }
}
