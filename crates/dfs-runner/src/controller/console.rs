//! AP console access.
//!
//! When an AP console is configured, its log is cleared before the channel
//! availability check and read afterwards for the `CAC_EXPIRY_EVT` line, which
//! names the channel the AP finished its check on. All failures here are
//! warnings: the console is a cross-check, not a precondition for traffic.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use super::command::{execute, Action, CommandRunner, ControllerError, Invocation};
use crate::config::ApConsoleConfig;

fn cac_expiry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"CAC_EXPIRY_EVT:\s+\S+\s+\S+\s+\S+\s\S+\s\S+\s(\S+)")
            .expect("static regex is valid")
    })
}

/// Channel reported by the first `CAC_EXPIRY_EVT` line in an AP log.
pub fn parse_cac_expiry(log: &str) -> Option<u16> {
    log.lines()
        .filter_map(|line| cac_expiry_re().captures(line))
        .find_map(|caps| caps[1].trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}

#[derive(Debug, Clone)]
pub struct ApConsole {
    config: ApConsoleConfig,
    timeout: Duration,
}

impl ApConsole {
    pub fn new(config: ApConsoleConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn invocation(&self, action: Action) -> Invocation {
        let c = &self.config;
        Invocation {
            program: c.program.clone(),
            args: vec![
                "--scheme".into(),
                c.scheme.to_string(),
                "--prompt".into(),
                c.prompt.clone(),
                "--dest".into(),
                c.host.clone(),
                "--port".into(),
                c.port.to_string(),
                "--user".into(),
                c.user.clone(),
                "--passwd".into(),
                c.password.clone(),
                "--tty".into(),
                c.tty.clone(),
                "--baud".into(),
                c.baud.to_string(),
                "--action".into(),
                action.as_str().into(),
            ],
            action,
            value: None,
            scheme: c.scheme,
            host: c.host.clone(),
            target: c.prompt.clone(),
            band: None,
            timeout: self.timeout,
        }
    }

    pub async fn clear_log<R: CommandRunner>(&self, runner: &R) -> Result<(), ControllerError> {
        execute(runner, &self.invocation(Action::ClearLog)).await.map(|_| ())
    }

    /// Read the AP log and extract the CAC expiry channel, if present.
    pub async fn cac_expiry<R: CommandRunner>(
        &self,
        runner: &R,
    ) -> Result<Option<u16>, ControllerError> {
        let log = execute(runner, &self.invocation(Action::CacExpiryEvt)).await?;
        Ok(parse_cac_expiry(&log))
    }
}
