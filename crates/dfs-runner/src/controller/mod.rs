//! AP controller interaction.
//!
//! - [`command`]: action vocabulary, invocation building, the
//!   [`CommandRunner`] seam and the child-process runner
//! - [`series`]: per-series step sequences and status parsing
//! - [`parser`]: AP table parsers for each controller series
//! - [`sequencer`]: ordered configuration, settling, readback
//! - [`console`]: optional AP console log reads (CAC expiry events)

pub mod command;
pub mod console;
pub mod parser;
pub mod sequencer;
pub mod series;

pub use command::{Action, CliRunner, CommandRunner, ControllerError, Invocation};
pub use series::ControllerSeries;

use dfs_common::models::{Band, ControllerFields};

use crate::config::ControllerConfig;

/// Transport the controller tool uses to reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Serial,
    Telnet,
    Ssh,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Serial => 2043,
            Scheme::Telnet => 23,
            Scheme::Ssh => 22,
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Serial => write!(f, "serial"),
            Scheme::Telnet => write!(f, "telnet"),
            Scheme::Ssh => write!(f, "ssh"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Scheme::Serial),
            "telnet" => Ok(Scheme::Telnet),
            "ssh" => Ok(Scheme::Ssh),
            other => Err(format!("unknown scheme: {other}")),
        }
    }
}

/// The serially reused command channel to one controller.
///
/// Remembers the last controller fields applied successfully, which is what
/// lets consecutive configurations skip reconfiguration.
#[derive(Debug, Clone)]
pub struct ControllerSession {
    config: ControllerConfig,
    applied: Option<ControllerFields>,
}

impl ControllerSession {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            applied: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn series(&self) -> ControllerSeries {
        self.config.series
    }

    pub fn applied(&self) -> Option<&ControllerFields> {
        self.applied.as_ref()
    }

    /// Whether `fields` differ from what the controller currently holds.
    pub fn needs_reconfigure(&self, fields: &ControllerFields) -> bool {
        self.applied.as_ref() != Some(fields)
    }

    pub(crate) fn mark_applied(&mut self, fields: ControllerFields) {
        self.applied = Some(fields);
    }

    /// Forget the applied state; the device may be half-configured.
    pub(crate) fn invalidate(&mut self) {
        self.applied = None;
    }

    /// Build the tool invocation for one action against `ap` on `band`.
    pub fn invocation(&self, ap: &str, band: Band, action: Action, value: Option<&str>) -> Invocation {
        let c = &self.config;
        let mut args = vec![
            "--scheme".to_string(),
            c.scheme.to_string(),
            "--prompt".into(),
            c.prompt.clone(),
            "--port".into(),
            c.port.to_string(),
            "-d".into(),
            c.host.clone(),
            "-u".into(),
            c.user.clone(),
            "-p".into(),
            c.password.clone(),
            "-a".into(),
            ap.to_string(),
            "--series".into(),
            c.series.to_string(),
            "--band".into(),
            band.to_string(),
            "--action".into(),
            action.as_str().to_string(),
        ];
        if let Some(v) = value {
            args.push("--value".into());
            args.push(v.to_string());
        }
        if action.uses_wlan() {
            args.extend([
                "--wlan".to_string(),
                c.wlan.name.clone(),
                "--wlanID".into(),
                c.wlan.id.to_string(),
                "--wlanSSID".into(),
                c.wlan.ssid.clone(),
            ]);
        }
        Invocation {
            program: c.program.clone(),
            args,
            action,
            value: value.map(str::to_string),
            scheme: c.scheme,
            host: c.host.clone(),
            target: ap.to_string(),
            band: Some(band),
            timeout: c.command_timeout,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for controller tests.

    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::config::WlanConfig;

    /// Records invocations; answers AP table and log reads from canned text.
    #[derive(Default)]
    pub struct ScriptedRunner {
        calls: Mutex<Vec<Invocation>>,
        table: Mutex<String>,
        log: String,
        fail_on: Option<Action>,
    }

    impl ScriptedRunner {
        pub fn with_table(table: &str) -> Self {
            Self {
                table: Mutex::new(table.to_string()),
                ..Default::default()
            }
        }

        pub fn failing_on(mut self, action: Action) -> Self {
            self.fail_on = Some(action);
            self
        }

        pub fn with_log(mut self, log: &str) -> Self {
            self.log = log.to_string();
            self
        }

        pub fn set_table(&self, table: &str) {
            *self.table.lock().unwrap() = table.to_string();
        }

        pub fn actions(&self) -> Vec<Action> {
            self.calls.lock().unwrap().iter().map(|c| c.action).collect()
        }

        pub fn count(&self, action: Action) -> usize {
            self.actions().into_iter().filter(|a| *a == action).count()
        }
    }

    impl CommandRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> Result<String, ControllerError> {
            self.calls.lock().unwrap().push(invocation.clone());
            if self.fail_on == Some(invocation.action) {
                return Err(ControllerError::NonZero {
                    action: invocation.action,
                    code: Some(1),
                    output: "% Invalid input detected".into(),
                });
            }
            Ok(match invocation.action {
                Action::Advanced => self.table.lock().unwrap().clone(),
                Action::CacExpiryEvt | Action::ShowLog => self.log.clone(),
                _ => String::new(),
            })
        }
    }

    pub fn controller_config(series: ControllerSeries) -> ControllerConfig {
        ControllerConfig {
            program: "./cisco_wifi_ctl.py".into(),
            scheme: Scheme::Ssh,
            host: "192.168.100.112".into(),
            port: 22,
            user: "admin".into(),
            password: "secret".into(),
            prompt: "WLC1".into(),
            series,
            command_timeout: Duration::from_secs(120),
            wlan: WlanConfig {
                name: "open-wlan".into(),
                id: 1,
                ssid: "open-wlan".into(),
            },
        }
    }
}
