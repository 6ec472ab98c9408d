//! Sweep driver.
//!
//! Runs every enumerated configuration in order against one controller
//! session. Per configuration the phases are strictly linear:
//!
//! ```text
//! Idle → ConfiguringController → WaitingCac → BuildingStations → Monitoring → Evaluating → CleaningUp
//! ```
//!
//! `WaitingCac` is entered only when the controller was reconfigured. Once
//! connections exist, cleaning up happens whatever the outcome, and the next
//! configuration starts only after it. A sequencing failure, or stations
//! that never get an IP, record the configuration as INCOMPLETE and the sweep
//! moves on. The radar burst is aimed at the channel read back from the
//! controller, not the requested one.

use std::sync::Arc;

use chrono::Utc;
use dfs_common::ids;
use dfs_common::models::{Band, ChannelState, RunResult, TestConfiguration, Verdict};
use tokio::sync::watch;
use tracing::Instrument;

use crate::config::RunnerConfig;
use crate::controller::console::ApConsole;
use crate::controller::sequencer::{Applied, Sequencer};
use crate::controller::{CommandRunner, ControllerSession};
use crate::evaluator::{RunContext, RunEvaluator};
use crate::matrix::Matrix;
use crate::radar::{self, Stimulus};
use crate::report::{ReportError, ResultsWriter};
use crate::telemetry::{Monitor, MonitorOutcome, MonitorPlan, TelemetrySource};
use crate::traffic::{self, ConnectionSet, TrafficControl, TrafficError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    ConfiguringController,
    WaitingCac,
    BuildingStations,
    Monitoring,
    Evaluating,
    CleaningUp,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::ConfiguringController => "configuring-controller",
            Phase::WaitingCac => "waiting-cac",
            Phase::BuildingStations => "building-stations",
            Phase::Monitoring => "monitoring",
            Phase::Evaluating => "evaluating",
            Phase::CleaningUp => "cleaning-up",
        };
        f.write_str(s)
    }
}

fn advance(phase: &mut Phase, next: Phase) {
    debug_assert!(next > *phase, "phase {next} after {phase}");
    tracing::debug!(from = %phase, to = %next, "phase");
    *phase = next;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub runs: usize,
    pub passed: usize,
    pub failed: usize,
    pub incomplete: usize,
    /// Band/mode combinations never run.
    pub skipped: usize,
    pub cancelled: bool,
}

impl SweepSummary {
    fn record(&mut self, result: &RunResult) {
        self.runs += 1;
        match result.verdict {
            Verdict::Pass => self.passed += 1,
            Verdict::Fail => self.failed += 1,
            Verdict::Incomplete => self.incomplete += 1,
        }
    }
}

fn incomplete(
    config: &TestConfiguration,
    test_id: String,
    expected_throughput_mbps: f64,
    initial_channel: ChannelState,
    reason: String,
) -> RunResult {
    RunResult {
        config: config.clone(),
        test_id,
        verdict: Verdict::Incomplete,
        reasons: vec![reason],
        best_throughput_mbps: 0.0,
        expected_throughput_mbps,
        intervals: 0,
        passed_intervals: 0,
        initial_channel,
        final_channel: ChannelState::empty(),
        deltas: Default::default(),
        radar: None,
        finished_at: Utc::now(),
    }
}

pub struct Driver<'a, R, T, X, S> {
    config: &'a RunnerConfig,
    runner: &'a R,
    telemetry: &'a T,
    traffic: &'a X,
    stimulus: Arc<S>,
    console: Option<ApConsole>,
}

impl<'a, R, T, X, S> Driver<'a, R, T, X, S>
where
    R: CommandRunner,
    T: TelemetrySource,
    X: TrafficControl,
    S: Stimulus,
{
    pub fn new(
        config: &'a RunnerConfig,
        runner: &'a R,
        telemetry: &'a T,
        traffic: &'a X,
        stimulus: Arc<S>,
    ) -> Self {
        let console = config
            .ap_console
            .clone()
            .map(|c| ApConsole::new(c, config.controller.command_timeout));
        Self {
            config,
            runner,
            telemetry,
            traffic,
            stimulus,
            console,
        }
    }

    /// Run the whole matrix. Only report write failures end the sweep early;
    /// shutdown is honoured between configurations and inside the window.
    pub async fn run(
        &self,
        matrix: &Matrix,
        writer: &mut ResultsWriter,
        shutdown: watch::Receiver<bool>,
    ) -> Result<SweepSummary, ReportError> {
        let mut session = ControllerSession::new(self.config.controller.clone());
        let sequencer = Sequencer::new(self.runner, &self.config.timing, self.console.as_ref());
        let mut summary = SweepSummary {
            skipped: matrix.skipped,
            ..Default::default()
        };
        let total = matrix.configurations.len();
        if let Some(first) = matrix.configurations.first() {
            sequencer.preflight(&session, &first.ap).await;
        }

        for (index, config) in matrix.configurations.iter().enumerate() {
            if *shutdown.borrow() {
                tracing::info!(remaining = total - index, "sweep cancelled");
                summary.cancelled = true;
                break;
            }
            let test_id = ids::test_id(config);
            let span = tracing::info_span!("run", n = index + 1, of = total, test_id = %test_id);
            let result = self
                .run_one(&sequencer, &mut session, config, test_id, writer, shutdown.clone())
                .instrument(span)
                .await?;
            summary.record(&result);
        }
        sequencer.release(&session).await;

        tracing::info!(
            runs = summary.runs,
            passed = summary.passed,
            failed = summary.failed,
            incomplete = summary.incomplete,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "sweep finished"
        );
        Ok(summary)
    }

    async fn run_one(
        &self,
        sequencer: &Sequencer<'_, R>,
        session: &mut ControllerSession,
        config: &TestConfiguration,
        test_id: String,
        writer: &mut ResultsWriter,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunResult, ReportError> {
        let mut phase = Phase::Idle;
        let expected = traffic::expected_throughput_mbps(&self.config.traffic, config);
        tracing::info!(
            ap = %config.ap,
            band = %config.band,
            channel = config.active_channel(),
            width = config.chan_width,
            direction = %config.direction,
            clients = config.client_density,
            "starting configuration"
        );

        advance(&mut phase, Phase::ConfiguringController);
        match sequencer.ensure(session, config).await {
            Ok(Applied::Reconfigured) => {
                advance(&mut phase, Phase::WaitingCac);
                let waited = sequencer
                    .wait_for_availability(&config.controller_fields())
                    .await;
                tracing::info!(waited_s = waited.as_secs(), "channel available");
            }
            Ok(Applied::Reused) => {}
            Err(e) => {
                tracing::error!(error = %e, "controller sequencing failed, configuration incomplete");
                let result = incomplete(config, test_id, expected, ChannelState::empty(), e.to_string());
                writer.write_result(&result)?;
                return Ok(result);
            }
        }

        let initial = sequencer.read_channel(session, &config.ap, config.band).await;
        let requested = config.active_channel();
        if initial.primary() != Some(requested) {
            tracing::warn!(
                requested,
                actual = %initial,
                "initial channel does not match configuration, possible DFS lockout"
            );
        }

        advance(&mut phase, Phase::BuildingStations);
        let set = match self.traffic.build(config).await {
            Ok(set) => set,
            Err(e) => {
                tracing::error!(error = %e, "could not build stations, configuration incomplete");
                let result = incomplete(config, test_id, expected, initial, e.to_string());
                writer.write_result(&result)?;
                return Ok(result);
            }
        };

        advance(&mut phase, Phase::Monitoring);
        let monitored = self.monitor_window(config, &initial, &set, shutdown).await;

        let result = match monitored {
            Ok(outcome) => {
                advance(&mut phase, Phase::Evaluating);
                let final_channel = sequencer.read_channel(session, &config.ap, config.band).await;
                for report in &outcome.reports {
                    writer.write_interval(config, &test_id, expected, report)?;
                }
                outcome.evaluator.finish(RunContext {
                    config,
                    test_id,
                    expected_throughput_mbps: expected,
                    initial_channel: initial,
                    final_channel,
                    radar: outcome.radar,
                    cancelled: outcome.cancelled,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "could not start traffic, configuration incomplete");
                incomplete(config, test_id, expected, initial, e.to_string())
            }
        };

        advance(&mut phase, Phase::CleaningUp);
        if let Err(e) = self.traffic.stop(&set).await {
            tracing::warn!(error = %e, "failed to stop connections");
        }
        self.traffic.cleanup(&set).await;

        match result.verdict {
            Verdict::Pass => tracing::info!(
                best_mbps = result.best_throughput_mbps,
                pass_ratio = result.pass_ratio(),
                expected_mbps = expected,
                initial = %result.initial_channel,
                final_channel = %result.final_channel,
                "PASS"
            ),
            verdict => tracing::warn!(
                verdict = %verdict,
                reasons = ?result.reasons,
                pass_ratio = result.pass_ratio(),
                initial = %result.initial_channel,
                final_channel = %result.final_channel,
                "configuration did not pass"
            ),
        }
        writer.write_result(&result)?;
        Ok(result)
    }

    async fn monitor_window(
        &self,
        config: &TestConfiguration,
        initial: &ChannelState,
        set: &ConnectionSet,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<MonitorOutcome, TrafficError> {
        self.traffic.start(set).await?;

        let timing = &self.config.timing;
        tokio::select! {
            _ = tokio::time::sleep(timing.traffic_warmup) => {}
            _ = radar::cancelled(&mut shutdown) => {}
        }

        // Radar goes where the AP actually is, which differs from the
        // request under a DFS lockout.
        let radar_channel = (config.band == Band::FiveGhz).then(|| match initial.primary() {
            Some(channel) => channel,
            None => {
                tracing::warn!(
                    channel = config.chan_5ghz,
                    "initial channel unknown, aiming radar at requested channel"
                );
                config.chan_5ghz
            }
        });
        let plan = MonitorPlan {
            endpoints: set.endpoints.clone(),
            direction: config.direction,
            polling_interval: timing.polling_interval,
            duration: timing.test_duration,
            dfs_trigger_offset: timing.dfs_trigger_offset,
            radar_channel,
        };
        let monitor = Monitor::new(self.telemetry, Arc::clone(&self.stimulus));
        Ok(monitor
            .run(
                &plan,
                RunEvaluator::new(timing.tolerated_failed_intervals),
                shutdown,
            )
            .await)
    }
}
