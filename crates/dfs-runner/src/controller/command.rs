//! Controller command execution.
//!
//! Every device interaction is one invocation of an external command tool
//! (controller CLI or AP console helper). The [`CommandRunner`] trait is the
//! seam between sequencing logic and the process that talks to hardware;
//! [`CliRunner`] spawns the tool as a child process bounded by the
//! invocation's timeout.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use dfs_common::error::{Classify, Severity};
use dfs_common::models::Band;
use thiserror::Error;

use super::Scheme;

/// Actions understood by the controller and AP console tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Summary,
    /// Per-band AP radio table (channel, width, power).
    Advanced,
    Disable,
    Enable,
    DisableWlan,
    EnableWlan,
    DisableNetwork5ghz,
    DisableNetwork24ghz,
    EnableNetwork5ghz,
    EnableNetwork24ghz,
    Manual,
    Auto,
    TxPower,
    Bandwidth,
    Channel,
    CreateWlan,
    WirelessTagPolicy,
    /// Raw controller command passed as the value.
    Cmd,
    ClearLog,
    ShowLog,
    CacExpiryEvt,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Summary => "summary",
            Action::Advanced => "advanced",
            Action::Disable => "disable",
            Action::Enable => "enable",
            Action::DisableWlan => "disable_wlan",
            Action::EnableWlan => "enable_wlan",
            Action::DisableNetwork5ghz => "disable_network_5ghz",
            Action::DisableNetwork24ghz => "disable_network_24ghz",
            Action::EnableNetwork5ghz => "enable_network_5ghz",
            Action::EnableNetwork24ghz => "enable_network_24ghz",
            Action::Manual => "manual",
            Action::Auto => "auto",
            Action::TxPower => "txPower",
            Action::Bandwidth => "bandwidth",
            Action::Channel => "channel",
            Action::CreateWlan => "create_wlan",
            Action::WirelessTagPolicy => "wireless_tag_policy",
            Action::Cmd => "cmd",
            Action::ClearLog => "clear_log",
            Action::ShowLog => "show_log",
            Action::CacExpiryEvt => "cac_expiry_evt",
        }
    }

    pub fn uses_wlan(self) -> bool {
        matches!(
            self,
            Action::DisableWlan | Action::EnableWlan | Action::CreateWlan | Action::WirelessTagPolicy
        )
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully resolved tool invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub action: Action,
    pub value: Option<String>,
    pub scheme: Scheme,
    pub host: String,
    /// AP name (controller) or console prompt (AP console).
    pub target: String,
    pub band: Option<Band>,
    pub timeout: Duration,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("action {action} exited with status {code:?}: {output}")]
    NonZero {
        action: Action,
        code: Option<i32>,
        output: String,
    },
    #[error("action {action} timed out after {timeout:?}")]
    Timeout { action: Action, timeout: Duration },
}

impl Classify for ControllerError {
    /// Remote reconfiguration is not idempotent, so nothing here is retried.
    fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// Executes tool invocations and returns captured stdout.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<String, ControllerError>> + Send;
}

/// Runs invocations as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliRunner;

impl CommandRunner for CliRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, ControllerError> {
        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(invocation.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| ControllerError::Spawn {
                program: invocation.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ControllerError::Timeout {
                    action: invocation.action,
                    timeout: invocation.timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ControllerError::NonZero {
                action: invocation.action,
                code: output.status.code(),
                output: format!("{}{}", stdout.trim_end(), stderr.trim_end()),
            });
        }
        Ok(stdout)
    }
}

/// Run one invocation, logging the full context on both outcomes.
pub async fn execute<R: CommandRunner>(
    runner: &R,
    invocation: &Invocation,
) -> Result<String, ControllerError> {
    let band = invocation.band.map(|b| b.to_string()).unwrap_or_default();
    let value = invocation.value.as_deref().unwrap_or("");
    tracing::debug!(
        scheme = %invocation.scheme,
        host = %invocation.host,
        target = %invocation.target,
        band = %band,
        action = %invocation.action,
        value,
        "controller command"
    );
    match runner.run(invocation).await {
        Ok(output) => {
            tracing::trace!(action = %invocation.action, output = %output, "controller output");
            Ok(output)
        }
        Err(e) => {
            tracing::error!(
                scheme = %invocation.scheme,
                host = %invocation.host,
                target = %invocation.target,
                band = %band,
                action = %invocation.action,
                value,
                error = %e,
                "controller command failed"
            );
            Err(e)
        }
    }
}
