//! Telemetry polling loop.
//!
//! One snapshot at window open, then one per polling tick until the test
//! duration is reached. Each snapshot is filtered to the endpoints evaluated
//! for the configured direction and fed to the [`RunEvaluator`].
//!
//! The radar burst is launched at the DFS trigger offset as a separate task,
//! at most once per window, so the tick cadence is unaffected by how long the
//! RF tool takes. Shutdown is checked on every tick.

use std::sync::Arc;
use std::time::Duration;

use dfs_common::models::{ConnectionEndpoint, Direction, RadarEvent, Snapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::client::TelemetrySource;
use crate::evaluator::{IntervalReport, RunEvaluator};
use crate::radar::{self, Stimulus};

#[derive(Debug, Clone)]
pub struct MonitorPlan {
    pub endpoints: Vec<ConnectionEndpoint>,
    pub direction: Direction,
    pub polling_interval: Duration,
    pub duration: Duration,
    pub dfs_trigger_offset: Duration,
    /// Channel to inject radar on; `None` disables injection.
    pub radar_channel: Option<u16>,
}

pub struct MonitorOutcome {
    pub evaluator: RunEvaluator,
    pub reports: Vec<IntervalReport>,
    pub radar: Option<RadarEvent>,
    pub cancelled: bool,
}

pub struct Monitor<'a, T, S> {
    telemetry: &'a T,
    stimulus: Arc<S>,
}

impl<'a, T, S> Monitor<'a, T, S>
where
    T: TelemetrySource,
    S: Stimulus,
{
    pub fn new(telemetry: &'a T, stimulus: Arc<S>) -> Self {
        Self {
            telemetry,
            stimulus,
        }
    }

    async fn snapshot(&self, names: &[String], plan: &MonitorPlan, elapsed: Duration) -> Option<Snapshot> {
        match self.telemetry.fetch(names).await {
            Ok(counters) => Some(Snapshot::new(elapsed, counters).for_direction(plan.direction)),
            Err(e) => {
                tracing::warn!(
                    elapsed_s = elapsed.as_secs(),
                    error = %e,
                    "telemetry poll failed, skipping tick"
                );
                None
            }
        }
    }

    fn launch_radar(&self, channel: u16, shutdown: &watch::Receiver<bool>) -> JoinHandle<RadarEvent> {
        let stimulus = Arc::clone(&self.stimulus);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { stimulus.emit(channel, shutdown).await })
    }

    pub async fn run(
        &self,
        plan: &MonitorPlan,
        mut evaluator: RunEvaluator,
        mut shutdown: watch::Receiver<bool>,
    ) -> MonitorOutcome {
        let names: Vec<String> = plan.endpoints.iter().map(|e| e.name.clone()).collect();
        let start = Instant::now();
        let mut reports = Vec::new();

        match self.snapshot(&names, plan, Duration::ZERO).await {
            Some(first) => evaluator.baseline(first),
            None => tracing::warn!("no baseline snapshot, first interval starts at first tick"),
        }

        let mut ticker = tokio::time::interval_at(start + plan.polling_interval, plan.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let trigger = tokio::time::sleep_until(start + plan.dfs_trigger_offset);
        tokio::pin!(trigger);
        let mut radar_task: Option<JoinHandle<RadarEvent>> = None;
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                _ = radar::cancelled(&mut shutdown) => {
                    tracing::info!("monitoring cancelled");
                    cancelled = true;
                    break;
                }
                _ = &mut trigger, if radar_task.is_none() && plan.radar_channel.is_some() => {
                    if let Some(channel) = plan.radar_channel {
                        tracing::info!(
                            channel,
                            elapsed_s = start.elapsed().as_secs(),
                            "DFS trigger reached"
                        );
                        radar_task = Some(self.launch_radar(channel, &shutdown));
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            let elapsed = start.elapsed();

            if let Some(snapshot) = self.snapshot(&names, plan, elapsed).await {
                if let Some(report) = evaluator.observe(snapshot) {
                    tracing::info!(
                        interval = report.index,
                        elapsed_s = elapsed.as_secs(),
                        passed = report.passed,
                        throughput_mbps = report.throughput_mbps,
                        drop_mean_pct = report.drop.mean_pct,
                        "interval evaluated"
                    );
                    tracing::debug!(best = ?report.drop.best, worst = ?report.drop.worst, "drop ranking");
                    reports.push(report);
                }
            }

            if elapsed >= plan.duration {
                break;
            }
        }

        let radar = match radar_task {
            Some(task) => match task.await {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "radar task failed");
                    None
                }
            },
            None => None,
        };

        MonitorOutcome {
            evaluator,
            reports,
            radar,
            cancelled,
        }
    }
}
