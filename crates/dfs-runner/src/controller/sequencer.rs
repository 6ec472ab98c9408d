//! Controller configuration sequencing.
//!
//! Drives the controller through the series' ordered [`Step`]s, waits out
//! the settle / channel availability period, and reads the AP table back.
//!
//! - Any failing step aborts the sequence; nothing is retried and the session
//!   forgets its applied state, so the next configuration starts over.
//! - Consecutive configurations with equal controller fields reuse the
//!   applied state and only read the channel back.
//!
//! [`Step`]: super::series::Step

use std::time::Duration;

use dfs_common::channels;
use dfs_common::error::{Classify, Severity};
use dfs_common::models::{Band, ChannelState, ControllerFields, TestConfiguration};
use thiserror::Error;

use super::command::{execute, Action, CommandRunner, ControllerError};
use super::console::ApConsole;
use super::ControllerSession;
use crate::config::TimingConfig;

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("step {index} ({action}) failed: {source}")]
    Step {
        index: usize,
        action: Action,
        value: Option<String>,
        #[source]
        source: ControllerError,
    },
}

impl Classify for SequenceError {
    fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// Whether [`Sequencer::ensure`] touched the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Reconfigured,
    Reused,
}

pub struct Sequencer<'a, R> {
    runner: &'a R,
    timing: &'a TimingConfig,
    console: Option<&'a ApConsole>,
}

impl<'a, R: CommandRunner> Sequencer<'a, R> {
    pub fn new(runner: &'a R, timing: &'a TimingConfig, console: Option<&'a ApConsole>) -> Self {
        Self {
            runner,
            timing,
            console,
        }
    }

    /// Read the AP table. Failures are logged and yield an empty state.
    pub async fn read_channel(&self, session: &ControllerSession, ap: &str, band: Band) -> ChannelState {
        let invocation = session.invocation(ap, band, Action::Advanced, None);
        match execute(self.runner, &invocation).await {
            Ok(text) => {
                let state = session.series().parse_channel_state(&text, ap, band);
                if state.is_known() {
                    tracing::info!(ap, band = %band, channel = %state, "controller channel state");
                } else {
                    tracing::warn!(ap, band = %band, "AP not found in controller table, channel unknown");
                }
                state
            }
            Err(e) => {
                tracing::warn!(ap, band = %band, error = %e, "channel read failed, channel unknown");
                ChannelState::empty()
            }
        }
    }

    /// Log the controller's AP summary before the sweep starts. Failures are
    /// warnings.
    pub async fn preflight(&self, session: &ControllerSession, ap: &str) {
        let invocation = session.invocation(ap, Band::FiveGhz, Action::Summary, None);
        match execute(self.runner, &invocation).await {
            Ok(text) => {
                tracing::info!(ap, lines = text.lines().count(), "controller reachable");
                tracing::debug!(summary = %text, "controller AP summary");
            }
            Err(e) => tracing::warn!(ap, error = %e, "controller summary failed"),
        }
    }

    /// Hand the last configured radio back to automatic RF management.
    pub async fn release(&self, session: &ControllerSession) {
        let Some(fields) = session.applied() else {
            return;
        };
        if !session.series().pins_rf_role() {
            return;
        }
        let invocation = session.invocation(&fields.ap, fields.band, Action::Auto, None);
        match execute(self.runner, &invocation).await {
            Ok(_) => tracing::info!(ap = %fields.ap, band = %fields.band, "RF role returned to auto"),
            Err(e) => tracing::warn!(ap = %fields.ap, error = %e, "could not return RF role to auto"),
        }
    }

    /// Apply `config`'s controller fields unless the session already holds them.
    pub async fn ensure(
        &self,
        session: &mut ControllerSession,
        config: &TestConfiguration,
    ) -> Result<Applied, SequenceError> {
        let fields = config.controller_fields();
        if !session.needs_reconfigure(&fields) {
            tracing::info!(ap = %fields.ap, "no change to controller config, reusing");
            let state = self.read_channel(session, &fields.ap, fields.band).await;
            let expected = fields.active_channel();
            if state.is_known() && state.primary() != Some(expected) {
                tracing::warn!(
                    expected,
                    actual = %state,
                    "controller channel differs from configured channel"
                );
            }
            return Ok(Applied::Reused);
        }
        self.apply(session, &fields).await?;
        Ok(Applied::Reconfigured)
    }

    /// Run every step of the series sequence, in order.
    pub async fn apply(
        &self,
        session: &mut ControllerSession,
        fields: &ControllerFields,
    ) -> Result<(), SequenceError> {
        let before = self.read_channel(session, &fields.ap, fields.band).await;
        tracing::info!(
            ap = %fields.ap,
            band = %fields.band,
            series = %session.series(),
            current = %before,
            channel = fields.active_channel(),
            width = fields.chan_width,
            tx_power = fields.tx_power,
            "configuring controller"
        );

        session.invalidate();
        let steps = session.series().sequence_steps(fields);
        for (index, step) in steps.iter().enumerate() {
            let invocation =
                session.invocation(&fields.ap, fields.band, step.action, step.value.as_deref());
            if let Err(source) = execute(self.runner, &invocation).await {
                return Err(SequenceError::Step {
                    index,
                    action: step.action,
                    value: step.value.clone(),
                    source,
                });
            }
        }
        session.mark_applied(fields.clone());
        tracing::info!(ap = %fields.ap, steps = steps.len(), "controller configured");
        Ok(())
    }

    /// Wait until traffic is valid on the configured channel: a fixed settle
    /// after enable, then the channel availability check on DFS channels or a
    /// shorter settle elsewhere. Returns the total time waited.
    pub async fn wait_for_availability(&self, fields: &ControllerFields) -> Duration {
        tokio::time::sleep(self.timing.settle_after_enable).await;
        let mut waited = self.timing.settle_after_enable;

        let dfs = fields.band == Band::FiveGhz && channels::is_dfs(fields.chan_5ghz);
        if !dfs {
            tokio::time::sleep(self.timing.non_dfs_settle).await;
            return waited + self.timing.non_dfs_settle;
        }

        if let Some(console) = self.console {
            if let Err(e) = console.clear_log(self.runner).await {
                tracing::warn!(error = %e, "could not clear AP log before CAC");
            }
        }
        tracing::info!(
            channel = fields.chan_5ghz,
            cac_secs = self.timing.cac_wait.as_secs(),
            "waiting for channel availability check"
        );
        tokio::time::sleep(self.timing.cac_wait).await;
        waited += self.timing.cac_wait;

        if let Some(console) = self.console {
            match console.cac_expiry(self.runner).await {
                Ok(Some(channel)) if channel == fields.chan_5ghz => {
                    tracing::info!(channel, "AP reported CAC expiry");
                }
                Ok(Some(channel)) => tracing::warn!(
                    channel,
                    expected = fields.chan_5ghz,
                    "AP reported CAC expiry on another channel"
                ),
                Ok(None) => tracing::warn!("no CAC expiry event in AP log"),
                Err(e) => tracing::warn!(error = %e, "could not read AP log after CAC"),
            }
        }
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApConsoleConfig;
    use crate::controller::testing::{controller_config, ScriptedRunner};
    use crate::controller::{ControllerSeries, Scheme};
    use dfs_common::models::{Direction, TrafficType, WifiMode};

    const TABLE_3504: &str = include_str!("../../fixtures/show_advanced_802_11a_summary_3504.txt");

    fn test_config(chan_5ghz: u16, client_density: usize, packet_size: u32) -> TestConfiguration {
        TestConfiguration {
            ap: "APA453.0E7B.CF9C".into(),
            band: Band::FiveGhz,
            wifi_mode: WifiMode::Auto,
            tx_power: 1,
            chan_5ghz,
            chan_24ghz: 6,
            chan_width: 20,
            encryption: "open".into(),
            ap_mode: "local".into(),
            client_density,
            traffic_type: TrafficType::LfUdp,
            direction: Direction::Upstream,
            packet_size,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn series_3504_dfs_channel_configures_waits_cac_and_reads_back() {
        let runner = ScriptedRunner::with_table(TABLE_3504);
        let timing = TimingConfig::default();
        let sequencer = Sequencer::new(&runner, &timing, None);
        let mut session = ControllerSession::new(controller_config(ControllerSeries::Series3504));
        let config = test_config(52, 1, 1024);

        let applied = sequencer.ensure(&mut session, &config).await.unwrap();
        assert_eq!(applied, Applied::Reconfigured);

        let start = tokio::time::Instant::now();
        let waited = sequencer.wait_for_availability(&config.controller_fields()).await;
        assert_eq!(waited, Duration::from_secs(75));
        assert!(start.elapsed() >= Duration::from_secs(75));

        let state = sequencer
            .read_channel(&session, &config.ap, config.band)
            .await;
        assert_eq!(state.primary(), Some(52));
        assert_eq!(state.bandwidth_mhz, Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn non_dfs_channel_skips_cac() {
        let runner = ScriptedRunner::with_table(TABLE_3504);
        let timing = TimingConfig::default();
        let sequencer = Sequencer::new(&runner, &timing, None);
        let waited = sequencer
            .wait_for_availability(&test_config(36, 1, 1024).controller_fields())
            .await;
        assert_eq!(waited, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn identical_controller_fields_configure_once() {
        let runner = ScriptedRunner::with_table(TABLE_3504);
        let timing = TimingConfig::default();
        let sequencer = Sequencer::new(&runner, &timing, None);
        let mut session = ControllerSession::new(controller_config(ControllerSeries::Series3504));

        let first = sequencer.ensure(&mut session, &test_config(52, 1, 1024)).await.unwrap();
        let second = sequencer.ensure(&mut session, &test_config(52, 2, 88)).await.unwrap();
        assert_eq!(first, Applied::Reconfigured);
        assert_eq!(second, Applied::Reused);
        assert_eq!(runner.count(Action::Enable), 1);
        assert_eq!(runner.count(Action::Channel), 1);
    }

    #[tokio::test]
    async fn failing_step_aborts_without_retry() {
        let runner = ScriptedRunner::with_table(TABLE_3504).failing_on(Action::Channel);
        let timing = TimingConfig::default();
        let sequencer = Sequencer::new(&runner, &timing, None);
        let mut session = ControllerSession::new(controller_config(ControllerSeries::Series3504));
        let config = test_config(52, 1, 1024);

        let err = sequencer.ensure(&mut session, &config).await.unwrap_err();
        let SequenceError::Step { index, action, .. } = &err;
        assert_eq!(*index, 5);
        assert_eq!(*action, Action::Channel);
        assert!(err.severity().is_fatal());
        assert_eq!(runner.count(Action::Channel), 1);
        assert_eq!(runner.count(Action::Enable), 0);
        assert!(session.applied().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn console_is_consulted_around_cac() {
        let runner = ScriptedRunner::with_table(TABLE_3504)
            .with_log("[*01/22/2021 18:10:04.5511] CAC_EXPIRY_EVT: CAC finished on DFS channel 52\n");
        let timing = TimingConfig::default();
        let console = ApConsole::new(
            ApConsoleConfig {
                program: "./cisco_ap_ctl.py".into(),
                scheme: Scheme::Serial,
                prompt: "APA453.0E7B.CF9C".into(),
                host: "0".into(),
                port: 0,
                user: "admin".into(),
                password: "secret".into(),
                tty: "/dev/ttyUSB2".into(),
                baud: 9600,
            },
            Duration::from_secs(30),
        );
        let sequencer = Sequencer::new(&runner, &timing, Some(&console));
        sequencer
            .wait_for_availability(&test_config(52, 1, 1024).controller_fields())
            .await;
        assert_eq!(
            runner.actions(),
            vec![Action::ClearLog, Action::CacExpiryEvt]
        );
    }

    #[tokio::test]
    async fn release_returns_pinned_radio_to_auto() {
        let runner = ScriptedRunner::with_table(TABLE_3504);
        let timing = TimingConfig::default();
        let sequencer = Sequencer::new(&runner, &timing, None);

        let mut session = ControllerSession::new(controller_config(ControllerSeries::Series9800));
        sequencer.release(&session).await;
        assert_eq!(runner.count(Action::Auto), 0);

        sequencer.ensure(&mut session, &test_config(52, 1, 1024)).await.unwrap();
        sequencer.release(&session).await;
        assert_eq!(runner.count(Action::Manual), 1);
        assert_eq!(runner.count(Action::Auto), 1);

        let mut legacy = ControllerSession::new(controller_config(ControllerSeries::Series3504));
        sequencer.ensure(&mut legacy, &test_config(52, 1, 1024)).await.unwrap();
        sequencer.release(&legacy).await;
        assert_eq!(runner.count(Action::Auto), 1);
    }

    #[tokio::test]
    async fn preflight_reads_summary_and_tolerates_failure() {
        let runner = ScriptedRunner::with_table(TABLE_3504).failing_on(Action::Summary);
        let timing = TimingConfig::default();
        let sequencer = Sequencer::new(&runner, &timing, None);
        let session = ControllerSession::new(controller_config(ControllerSeries::Series3504));

        sequencer.preflight(&session, "APA453.0E7B.CF9C").await;
        assert_eq!(runner.actions(), vec![Action::Summary]);
    }
}
