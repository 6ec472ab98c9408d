//! Radar stimulus session.
//!
//! The RF tool is interactive: it asks for a credential, initializes the
//! radio, prints a ready prompt, emits until told to stop, then quits. The
//! conversation is an explicit state machine over any async byte stream:
//!
//! ```text
//! Spawned → AwaitingFirstPrompt → AwaitingReadyPrompt → Emitting → AwaitingStopAck → Done
//! ```
//!
//! Every waiting state has its own timeout. A timeout, a closed stream or a
//! cancellation ends the session with a warning that names the state reached;
//! none of them stop the monitoring window.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use dfs_common::channels::{self, Frequency};
use dfs_common::error::{Classify, Severity};
use dfs_common::models::{RadarEvent, RadarOutcome, RadarState};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::config::RadarConfig;

#[derive(Error, Debug)]
pub enum RadarError {
    #[error("timed out in state {state} waiting for '{expected}'")]
    Timeout { state: RadarState, expected: String },
    #[error("radar tool closed its output in state {state}")]
    Closed { state: RadarState },
    #[error("i/o error in state {state}: {source}")]
    Io {
        state: RadarState,
        source: std::io::Error,
    },
    #[error("failed to spawn radar tool: {0}")]
    Spawn(std::io::Error),
    #[error("cancelled")]
    Cancelled,
}

impl Classify for RadarError {
    fn severity(&self) -> Severity {
        Severity::Warning
    }
}

/// Injects one radar burst on a channel. Implementations never fail; the
/// returned event records how far the attempt got.
pub trait Stimulus: Send + Sync + 'static {
    fn emit(
        &self,
        channel: u16,
        shutdown: watch::Receiver<bool>,
    ) -> impl Future<Output = RadarEvent> + Send;
}

// ── Conversation ────────────────────────────────────────────────────

/// The scripted exchange with the tool over its stdout (`reader`) and
/// stdin (`writer`).
pub struct Conversation<R, W> {
    reader: R,
    writer: W,
    buf: Vec<u8>,
    state: RadarState,
}

impl<R, W> Conversation<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
            state: RadarState::Spawned,
        }
    }

    pub fn state(&self) -> RadarState {
        self.state
    }

    fn enter(&mut self, state: RadarState) {
        tracing::debug!(from = %self.state, to = %state, "radar session transition");
        self.state = state;
    }

    /// Read until `pattern` appears, consuming output up to its end.
    async fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<(), RadarError> {
        let state = self.state;
        let needle = pattern.as_bytes();
        let read = async {
            let mut chunk = [0u8; 1024];
            loop {
                if let Some(pos) = find(&self.buf, needle) {
                    self.buf.drain(..pos + needle.len());
                    return Ok(());
                }
                let n = self
                    .reader
                    .read(&mut chunk)
                    .await
                    .map_err(|source| RadarError::Io { state, source })?;
                if n == 0 {
                    return Err(RadarError::Closed { state });
                }
                self.buf.extend_from_slice(&chunk[..n]);
            }
        };
        match tokio::time::timeout(timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(RadarError::Timeout {
                state,
                expected: pattern.to_string(),
            }),
        }
    }

    async fn send_line(&mut self, token: &str) -> Result<(), RadarError> {
        let state = self.state;
        let line = format!("{token}\n");
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|source| RadarError::Io { state, source })?;
        self.writer
            .flush()
            .await
            .map_err(|source| RadarError::Io { state, source })
    }

    /// Run the whole exchange.
    pub async fn drive(&mut self, config: &RadarConfig) -> Result<(), RadarError> {
        if let Some(prompt) = &config.credential_prompt {
            self.enter(RadarState::AwaitingFirstPrompt);
            self.expect(prompt, config.first_prompt_timeout).await?;
            self.send_line(&config.credential).await?;
        }

        self.enter(RadarState::AwaitingReadyPrompt);
        self.expect(&config.ready_prompt, config.ready_prompt_timeout)
            .await?;

        self.enter(RadarState::Emitting);
        tokio::time::sleep(config.dwell).await;
        self.send_line(&config.stop_token).await?;

        self.enter(RadarState::AwaitingStopAck);
        self.expect(&config.ready_prompt, config.stop_ack_timeout)
            .await?;
        self.send_line(&config.quit_token).await?;

        self.enter(RadarState::Done);
        Ok(())
    }

    /// [`Conversation::drive`], abandoned as soon as `shutdown` flips.
    pub async fn drive_until_cancelled(
        &mut self,
        config: &RadarConfig,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), RadarError> {
        tokio::select! {
            result = self.drive(config) => result,
            _ = cancelled(shutdown) => Err(RadarError::Cancelled),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Resolves once shutdown is requested; never resolves if the sender is gone.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ── Tool process ────────────────────────────────────────────────────

/// Drives the external RF tool as a child process.
#[derive(Debug, Clone)]
pub struct RadarTool {
    config: RadarConfig,
}

impl RadarTool {
    pub fn new(config: RadarConfig) -> Self {
        Self { config }
    }

    /// Full argument list for one emission at `frequency`.
    pub fn arguments(&self, frequency: Frequency) -> Vec<String> {
        let p = &self.config.params;
        let mut args = self.config.args.clone();
        args.extend([
            "--pulse_width".to_string(),
            p.pulse_width_us.to_string(),
            "--pulse_interval".into(),
            p.pulse_interval_us.to_string(),
            "--pulse_count".into(),
            p.pulse_count.to_string(),
            "--sweep_time".into(),
            p.sweep_time_ms.to_string(),
            "--freq".into(),
            frequency.to_string(),
            "--if_gain".into(),
            p.if_gain.to_string(),
            "--bb_gain".into(),
            p.bb_gain.to_string(),
            "--gain".into(),
            p.gain.to_string(),
        ]);
        args
    }

    async fn converse(
        &self,
        frequency: Frequency,
        shutdown: &mut watch::Receiver<bool>,
    ) -> (RadarState, Result<(), RadarError>) {
        let mut child = match tokio::process::Command::new(&self.config.program)
            .args(self.arguments(frequency))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return (RadarState::Spawned, Err(RadarError::Spawn(e))),
        };
        let (Some(stdout), Some(stdin)) = (child.stdout.take(), child.stdin.take()) else {
            return (
                RadarState::Spawned,
                Err(RadarError::Closed {
                    state: RadarState::Spawned,
                }),
            );
        };

        let mut conversation = Conversation::new(stdout, stdin);
        let result = conversation
            .drive_until_cancelled(&self.config, shutdown)
            .await;
        let state = conversation.state();
        drop(conversation);

        if result.is_ok() {
            if tokio::time::timeout(Duration::from_secs(2), child.wait())
                .await
                .is_err()
            {
                tracing::debug!("radar tool did not exit after quit, killing");
                let _ = child.kill().await;
            }
        } else {
            let _ = child.kill().await;
        }
        (state, result)
    }
}

impl Stimulus for RadarTool {
    async fn emit(&self, channel: u16, mut shutdown: watch::Receiver<bool>) -> RadarEvent {
        let scheduled_at = Utc::now();
        let frequency = match channels::frequency_for(channel) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(channel, error = %e, "radar target has no frequency");
                return RadarEvent {
                    channel,
                    frequency_khz: 0,
                    scheduled_at,
                    completed_at: None,
                    state: RadarState::Spawned,
                    outcome: RadarOutcome::Failed(e.to_string()),
                };
            }
        };

        tracing::info!(
            channel,
            freq = %frequency,
            pulse_width = self.config.params.pulse_width_us,
            pulse_interval = self.config.params.pulse_interval_us,
            pulse_count = self.config.params.pulse_count,
            "injecting radar"
        );
        let (state, result) = self.converse(frequency, &mut shutdown).await;
        let outcome = match &result {
            Ok(()) => RadarOutcome::Completed,
            Err(RadarError::Timeout { .. }) => RadarOutcome::TimedOut,
            Err(RadarError::Cancelled) => RadarOutcome::Cancelled,
            Err(e) => RadarOutcome::Failed(e.to_string()),
        };
        match &result {
            Ok(()) => tracing::info!(channel, "radar burst complete"),
            Err(e) => tracing::warn!(
                channel,
                state = %state,
                severity = %e.severity(),
                error = %e,
                "radar session ended early"
            ),
        }
        RadarEvent {
            channel,
            frequency_khz: frequency.khz(),
            scheduled_at,
            completed_at: result.is_ok().then(Utc::now),
            state,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn config() -> RadarConfig {
        RadarConfig::default()
    }

    /// Plays the tool side of a conversation over a duplex pipe.
    async fn tool(
        stream: tokio::io::DuplexStream,
        replies: Vec<(&'static str, Option<&'static str>)>,
    ) -> Vec<String> {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut received = Vec::new();
        for (prompt, expect_line) in replies {
            write.write_all(prompt.as_bytes()).await.unwrap();
            if expect_line.is_some() {
                match lines.next_line().await.unwrap() {
                    Some(line) => received.push(line),
                    None => break,
                }
            }
        }
        // Keep the pipe open until the session side finishes.
        let _ = lines.next_line().await;
        received
    }

    #[tokio::test(start_paused = true)]
    async fn full_conversation_reaches_done() {
        let (ours, theirs) = tokio::io::duplex(1024);
        let tool = tokio::spawn(tool(
            theirs,
            vec![
                ("[sudo] password for lanforge: ", Some("lanforge")),
                ("tuning 5260000\n>>> ", Some("s")),
                ("stopped\n>>> ", Some("q")),
            ],
        ));
        let (read, write) = tokio::io::split(ours);
        let mut conversation = Conversation::new(read, write);
        conversation.drive(&config()).await.unwrap();
        assert_eq!(conversation.state(), RadarState::Done);
        drop(conversation);
        assert_eq!(tool.await.unwrap(), vec!["lanforge", "s", "q"]);
    }

    #[tokio::test(start_paused = true)]
    async fn skips_credential_when_no_prompt_configured() {
        let (ours, theirs) = tokio::io::duplex(1024);
        let tool = tokio::spawn(tool(theirs, vec![(">>> ", Some("s")), (">>> ", Some("q"))]));
        let (read, write) = tokio::io::split(ours);
        let mut conversation = Conversation::new(read, write);
        let cfg = RadarConfig {
            credential_prompt: None,
            ..config()
        };
        conversation.drive(&cfg).await.unwrap();
        drop(conversation);
        assert_eq!(tool.await.unwrap(), vec!["s", "q"]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ready_prompt_times_out_with_state() {
        let (ours, theirs) = tokio::io::duplex(1024);
        let _tool = tokio::spawn(tool(
            theirs,
            vec![("[sudo] password for lanforge: ", Some("lanforge"))],
        ));
        let (read, write) = tokio::io::split(ours);
        let mut conversation = Conversation::new(read, write);
        let err = conversation.drive(&config()).await.unwrap_err();
        match err {
            RadarError::Timeout { state, expected } => {
                assert_eq!(state, RadarState::AwaitingReadyPrompt);
                assert_eq!(expected, ">>>");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(conversation.state(), RadarState::AwaitingReadyPrompt);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_is_reported() {
        let (ours, theirs) = tokio::io::duplex(64);
        drop(theirs);
        let (read, write) = tokio::io::split(ours);
        let mut conversation = Conversation::new(read, write);
        let err = conversation.drive(&config()).await.unwrap_err();
        assert!(matches!(
            err,
            RadarError::Closed {
                state: RadarState::AwaitingFirstPrompt
            }
        ));
        assert_eq!(err.severity(), Severity::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_emission() {
        let (ours, theirs) = tokio::io::duplex(1024);
        let _tool = tokio::spawn(tool(
            theirs,
            vec![("password for lanforge:", Some("lanforge")), (">>>", None)],
        ));
        let (read, write) = tokio::io::split(ours);
        let mut conversation = Conversation::new(read, write);
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = tx.send(true);
        });
        let err = conversation
            .drive_until_cancelled(&config(), &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, RadarError::Cancelled));
        assert_eq!(conversation.state(), RadarState::Emitting);
    }

    #[test]
    fn arguments_carry_pulse_parameters_and_frequency() {
        let tool = RadarTool::new(config());
        let freq = channels::frequency_for(52).unwrap();
        let args = tool.arguments(freq).join(" ");
        assert!(args.starts_with("python lf_hackrf.py --pulse_width 1 --pulse_interval 1428"));
        assert!(args.contains("--pulse_count 18"));
        assert!(args.contains("--freq 5260000"));
        assert!(args.ends_with("--if_gain 40 --bb_gain 20 --gain 0"));
    }

    #[tokio::test]
    async fn unmapped_channel_fails_without_spawning() {
        let tool = RadarTool::new(RadarConfig {
            program: "/nonexistent/radar-tool".into(),
            ..config()
        });
        let (_tx, rx) = watch::channel(false);
        let event = tool.emit(37, rx).await;
        assert!(matches!(event.outcome, RadarOutcome::Failed(_)));
        assert_eq!(event.state, RadarState::Spawned);
        assert!(!event.completed());
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_not_raised() {
        let tool = RadarTool::new(RadarConfig {
            program: "/nonexistent/radar-tool".into(),
            ..config()
        });
        let (_tx, rx) = watch::channel(false);
        let event = tool.emit(52, rx).await;
        assert_eq!(event.frequency_khz, 5_260_000);
        assert!(matches!(event.outcome, RadarOutcome::Failed(_)));
    }
}
