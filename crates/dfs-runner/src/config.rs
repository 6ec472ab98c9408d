//! Runner configuration.
//!
//! Loaded from one TOML file. Every section is parsed into an `…Input`
//! struct of optional fields and then resolved into the validated
//! [`RunnerConfig`]. Resolution is where all fatal preconditions are checked,
//! so nothing touches a device until the whole file is known to be usable.

use std::path::Path;
use std::time::Duration;

use dfs_common::channels::{self, ChannelError};
use dfs_common::error::{Classify, Severity};
use dfs_common::models::{Band, Direction, TrafficType, WifiMode};
use serde::Deserialize;
use thiserror::Error;

use crate::controller::{ControllerSeries, Scheme};
use crate::traffic::StationSecurity;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("missing required key '{0}'")]
    MissingKey(String),
    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl Classify for ConfigError {
    fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn required(value: Option<String>, key: &str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingKey(key.to_string())),
    }
}

fn parse_list<T>(values: Vec<String>, key: &str) -> Result<Vec<T>, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    values
        .iter()
        .map(|v| v.parse::<T>().map_err(|e| invalid(key, e)))
        .collect()
}

// ── Input (as written in TOML) ──────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunnerConfigInput {
    pub controller: ControllerInput,
    pub ap_console: Option<ApConsoleInput>,
    pub radar: RadarInput,
    pub telemetry: TelemetryInput,
    pub traffic: TrafficInput,
    pub timing: TimingInput,
    pub matrix: MatrixInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerInput {
    pub program: Option<String>,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub prompt: Option<String>,
    pub series: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub wlan: Option<String>,
    pub wlan_id: Option<u32>,
    pub wlan_ssid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApConsoleInput {
    pub program: Option<String>,
    pub scheme: Option<String>,
    pub prompt: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub tty: Option<String>,
    pub baud: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RadarInput {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub pulse_width_us: Option<u32>,
    pub pulse_interval_us: Option<u32>,
    pub pulse_count: Option<u32>,
    pub sweep_time_ms: Option<u32>,
    pub if_gain: Option<u32>,
    pub bb_gain: Option<u32>,
    pub gain: Option<u32>,
    /// Set to an empty string to skip the credential exchange.
    pub credential_prompt: Option<String>,
    pub credential: Option<String>,
    pub ready_prompt: Option<String>,
    pub first_prompt_timeout_secs: Option<u64>,
    pub ready_prompt_timeout_secs: Option<u64>,
    pub dwell_secs: Option<u64>,
    pub stop_ack_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryInput {
    pub url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrafficInput {
    pub upstream_port: Option<String>,
    pub radio: Option<String>,
    pub stations: Vec<String>,
    pub ssid: Option<String>,
    pub passphrase: Option<String>,
    pub security: Option<String>,
    pub station_ip_timeout_secs: Option<u64>,
    pub tos: Option<String>,
    pub name_prefix: Option<String>,
    pub side_a_min_bps: Option<u64>,
    pub side_b_min_bps: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimingInput {
    pub polling_interval_secs: Option<u64>,
    pub dfs_trigger_offset_secs: Option<u64>,
    pub test_duration_secs: Option<u64>,
    pub settle_after_enable_secs: Option<u64>,
    pub cac_wait_secs: Option<u64>,
    pub non_dfs_settle_secs: Option<u64>,
    pub traffic_warmup_secs: Option<u64>,
    pub tolerated_failed_intervals: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MatrixInput {
    pub aps: Vec<String>,
    pub bands: Vec<String>,
    pub wifi_modes: Vec<String>,
    pub tx_powers: Vec<u8>,
    pub chan_5ghz: Vec<u16>,
    pub chan_24ghz: Vec<u16>,
    pub chan_widths: Vec<u16>,
    pub encryptions: Vec<String>,
    pub ap_modes: Vec<String>,
    pub client_densities: Vec<usize>,
    pub traffic_types: Vec<String>,
    pub directions: Vec<String>,
    pub packet_sizes: Vec<u32>,
}

// ── Resolved ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub controller: ControllerConfig,
    pub ap_console: Option<ApConsoleConfig>,
    pub radar: RadarConfig,
    pub telemetry: TelemetryConfig,
    pub traffic: TrafficConfig,
    pub timing: TimingConfig,
    pub matrix: MatrixConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WlanConfig {
    pub name: String,
    pub id: u32,
    pub ssid: String,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller command tool.
    pub program: String,
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub prompt: String,
    pub series: ControllerSeries,
    /// Upper bound for every controller command.
    pub command_timeout: Duration,
    pub wlan: WlanConfig,
}

#[derive(Debug, Clone)]
pub struct ApConsoleConfig {
    pub program: String,
    pub scheme: Scheme,
    pub prompt: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub tty: String,
    pub baud: u32,
}

/// Pulse parameters passed to the radar tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadarParams {
    pub pulse_width_us: u32,
    pub pulse_interval_us: u32,
    pub pulse_count: u32,
    pub sweep_time_ms: u32,
    pub if_gain: u32,
    pub bb_gain: u32,
    pub gain: u32,
}

impl Default for RadarParams {
    /// FCC type 0 pulse train.
    fn default() -> Self {
        Self {
            pulse_width_us: 1,
            pulse_interval_us: 1428,
            pulse_count: 18,
            sweep_time_ms: 0,
            if_gain: 40,
            bb_gain: 20,
            gain: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RadarConfig {
    pub program: String,
    pub args: Vec<String>,
    pub params: RadarParams,
    pub credential_prompt: Option<String>,
    pub credential: String,
    pub ready_prompt: String,
    pub stop_token: String,
    pub quit_token: String,
    pub first_prompt_timeout: Duration,
    pub ready_prompt_timeout: Duration,
    pub dwell: Duration,
    pub stop_ack_timeout: Duration,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            program: "sudo".into(),
            args: vec!["python".into(), "lf_hackrf.py".into()],
            params: RadarParams::default(),
            credential_prompt: Some("lanforge:".into()),
            credential: "lanforge".into(),
            ready_prompt: ">>>".into(),
            stop_token: "s".into(),
            quit_token: "q".into(),
            first_prompt_timeout: Duration::from_secs(2),
            ready_prompt_timeout: Duration::from_secs(5),
            dwell: Duration::from_secs(5),
            stop_ack_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TrafficConfig {
    pub upstream_port: String,
    /// Radio the stations are created on.
    pub radio: String,
    /// Station names, created per configuration and removed afterwards.
    pub stations: Vec<String>,
    pub ssid: String,
    pub passphrase: String,
    /// Security used when a configuration enables encryption.
    pub security: StationSecurity,
    pub station_ip_timeout: Duration,
    pub ip_poll_interval: Duration,
    pub tos: String,
    pub name_prefix: String,
    pub side_a_min_bps: u64,
    pub side_b_min_bps: u64,
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub polling_interval: Duration,
    /// How far into the monitoring window the radar burst is injected.
    pub dfs_trigger_offset: Duration,
    pub test_duration: Duration,
    pub settle_after_enable: Duration,
    /// Channel availability check on DFS channels.
    pub cac_wait: Duration,
    pub non_dfs_settle: Duration,
    /// Pause between building connections and the first snapshot.
    pub traffic_warmup: Duration,
    /// Failed intervals a run may have (channel-move blackout) and still pass.
    pub tolerated_failed_intervals: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(60),
            dfs_trigger_offset: Duration::from_secs(30),
            test_duration: Duration::from_secs(240),
            settle_after_enable: Duration::from_secs(10),
            cac_wait: Duration::from_secs(65),
            non_dfs_settle: Duration::from_secs(30),
            traffic_warmup: Duration::from_secs(30),
            tolerated_failed_intervals: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub aps: Vec<String>,
    pub bands: Vec<Band>,
    pub wifi_modes: Vec<WifiMode>,
    pub tx_powers: Vec<u8>,
    pub chan_5ghz: Vec<u16>,
    pub chan_24ghz: Vec<u16>,
    pub chan_widths: Vec<u16>,
    pub encryptions: Vec<String>,
    pub ap_modes: Vec<String>,
    pub client_densities: Vec<usize>,
    pub traffic_types: Vec<TrafficType>,
    pub directions: Vec<Direction>,
    pub packet_sizes: Vec<u32>,
}

// ── Resolution ──────────────────────────────────────────────────────

fn or_default<T>(values: Vec<T>, default: T) -> Vec<T> {
    if values.is_empty() {
        vec![default]
    } else {
        values
    }
}

fn secs(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_secs).unwrap_or(default)
}

impl ControllerInput {
    fn resolve(self) -> Result<ControllerConfig, ConfigError> {
        let scheme: Scheme = self
            .scheme
            .as_deref()
            .unwrap_or("ssh")
            .parse()
            .map_err(|e: String| invalid("controller.scheme", e))?;
        let series: ControllerSeries = self
            .series
            .as_deref()
            .unwrap_or("9800")
            .parse()
            .map_err(|e: String| invalid("controller.series", e))?;
        let wlan_name = self.wlan.unwrap_or_else(|| "dfs-open".into());
        Ok(ControllerConfig {
            program: self.program.unwrap_or_else(|| "./cisco_wifi_ctl.py".into()),
            port: self.port.unwrap_or_else(|| scheme.default_port()),
            scheme,
            host: required(self.host, "controller.host")?,
            user: required(self.user, "controller.user")?,
            password: required(self.password, "controller.password")?,
            prompt: self.prompt.unwrap_or_else(|| "WLC".into()),
            series,
            command_timeout: secs(self.command_timeout_secs, Duration::from_secs(120)),
            wlan: WlanConfig {
                ssid: self.wlan_ssid.unwrap_or_else(|| wlan_name.clone()),
                id: self.wlan_id.unwrap_or(1),
                name: wlan_name,
            },
        })
    }
}

impl ApConsoleInput {
    /// Every key is required once the section exists.
    fn resolve(self) -> Result<ApConsoleConfig, ConfigError> {
        let scheme = required(self.scheme, "ap_console.scheme")?
            .parse::<Scheme>()
            .map_err(|e| invalid("ap_console.scheme", e))?;
        Ok(ApConsoleConfig {
            program: self.program.unwrap_or_else(|| "./cisco_ap_ctl.py".into()),
            scheme,
            prompt: required(self.prompt, "ap_console.prompt")?,
            host: required(self.host, "ap_console.host")?,
            port: self
                .port
                .ok_or_else(|| ConfigError::MissingKey("ap_console.port".into()))?,
            user: required(self.user, "ap_console.user")?,
            password: required(self.password, "ap_console.password")?,
            tty: required(self.tty, "ap_console.tty")?,
            baud: self
                .baud
                .ok_or_else(|| ConfigError::MissingKey("ap_console.baud".into()))?,
        })
    }
}

impl RadarInput {
    fn resolve(self) -> RadarConfig {
        let defaults = RadarConfig::default();
        let p = RadarParams::default();
        RadarConfig {
            program: self.program.unwrap_or(defaults.program),
            args: self.args.unwrap_or(defaults.args),
            params: RadarParams {
                pulse_width_us: self.pulse_width_us.unwrap_or(p.pulse_width_us),
                pulse_interval_us: self.pulse_interval_us.unwrap_or(p.pulse_interval_us),
                pulse_count: self.pulse_count.unwrap_or(p.pulse_count),
                sweep_time_ms: self.sweep_time_ms.unwrap_or(p.sweep_time_ms),
                if_gain: self.if_gain.unwrap_or(p.if_gain),
                bb_gain: self.bb_gain.unwrap_or(p.bb_gain),
                gain: self.gain.unwrap_or(p.gain),
            },
            credential_prompt: match self.credential_prompt {
                Some(prompt) if prompt.is_empty() => None,
                Some(prompt) => Some(prompt),
                None => defaults.credential_prompt,
            },
            credential: self.credential.unwrap_or(defaults.credential),
            ready_prompt: self.ready_prompt.unwrap_or(defaults.ready_prompt),
            stop_token: defaults.stop_token,
            quit_token: defaults.quit_token,
            first_prompt_timeout: secs(self.first_prompt_timeout_secs, defaults.first_prompt_timeout),
            ready_prompt_timeout: secs(self.ready_prompt_timeout_secs, defaults.ready_prompt_timeout),
            dwell: secs(self.dwell_secs, defaults.dwell),
            stop_ack_timeout: secs(self.stop_ack_timeout_secs, defaults.stop_ack_timeout),
        }
    }
}

impl TimingInput {
    fn resolve(self) -> Result<TimingConfig, ConfigError> {
        let d = TimingConfig::default();
        let timing = TimingConfig {
            polling_interval: secs(self.polling_interval_secs, d.polling_interval),
            dfs_trigger_offset: secs(self.dfs_trigger_offset_secs, d.dfs_trigger_offset),
            test_duration: secs(self.test_duration_secs, d.test_duration),
            settle_after_enable: secs(self.settle_after_enable_secs, d.settle_after_enable),
            cac_wait: secs(self.cac_wait_secs, d.cac_wait),
            non_dfs_settle: secs(self.non_dfs_settle_secs, d.non_dfs_settle),
            traffic_warmup: secs(self.traffic_warmup_secs, d.traffic_warmup),
            tolerated_failed_intervals: self
                .tolerated_failed_intervals
                .unwrap_or(d.tolerated_failed_intervals),
        };
        if timing.polling_interval.is_zero() {
            return Err(invalid("timing.polling_interval_secs", "must be positive"));
        }
        if timing.test_duration < timing.polling_interval {
            return Err(invalid(
                "timing.test_duration_secs",
                "must cover at least one polling interval",
            ));
        }
        if timing.dfs_trigger_offset + timing.polling_interval > timing.test_duration {
            return Err(invalid(
                "timing.dfs_trigger_offset_secs",
                "must leave a full polling interval before the test ends",
            ));
        }
        Ok(timing)
    }
}

impl MatrixInput {
    fn resolve(self) -> Result<MatrixConfig, ConfigError> {
        if self.aps.is_empty() {
            return Err(ConfigError::MissingKey("matrix.aps".into()));
        }
        let bands = parse_list::<Band>(or_default(self.bands, "a".into()), "matrix.bands")?;
        let chan_5ghz = or_default(self.chan_5ghz, 52);
        if bands.contains(&Band::FiveGhz) {
            for &ch in &chan_5ghz {
                channels::frequency_for(ch)?;
            }
        }
        let chan_widths = or_default(self.chan_widths, 20);
        if let Some(w) = chan_widths.iter().find(|w| ![20, 40, 80, 160].contains(*w)) {
            return Err(invalid("matrix.chan_widths", format!("unsupported width {w}")));
        }
        Ok(MatrixConfig {
            aps: self.aps,
            bands,
            wifi_modes: parse_list(
                or_default(self.wifi_modes, "auto".into()),
                "matrix.wifi_modes",
            )?,
            tx_powers: or_default(self.tx_powers, 1),
            chan_5ghz,
            chan_24ghz: or_default(self.chan_24ghz, 6),
            chan_widths,
            encryptions: or_default(self.encryptions, "open".into()),
            ap_modes: or_default(self.ap_modes, "local".into()),
            client_densities: or_default(self.client_densities, 1),
            traffic_types: parse_list(
                or_default(self.traffic_types, "lf_udp".into()),
                "matrix.traffic_types",
            )?,
            directions: parse_list(
                or_default(self.directions, "upstream".into()),
                "matrix.directions",
            )?,
            packet_sizes: or_default(self.packet_sizes, 1024),
        })
    }
}

impl RunnerConfigInput {
    pub fn resolve(self) -> Result<RunnerConfig, ConfigError> {
        let controller = self.controller.resolve()?;
        let ap_console = self.ap_console.map(ApConsoleInput::resolve).transpose()?;
        let matrix = self.matrix.resolve()?;

        let security = self
            .traffic
            .security
            .as_deref()
            .unwrap_or("wpa2")
            .parse::<StationSecurity>()
            .map_err(|e| invalid("traffic.security", e))?;
        if let Some(enc) = matrix
            .encryptions
            .iter()
            .find(|e| StationSecurity::for_encryption(e, security).is_none())
        {
            return Err(invalid(
                "matrix.encryptions",
                format!("unknown encryption '{enc}'"),
            ));
        }
        let traffic = TrafficConfig {
            upstream_port: self.traffic.upstream_port.unwrap_or_else(|| "eth1".into()),
            radio: self.traffic.radio.unwrap_or_else(|| "wiphy0".into()),
            stations: self.traffic.stations,
            ssid: self
                .traffic
                .ssid
                .unwrap_or_else(|| controller.wlan.ssid.clone()),
            passphrase: self.traffic.passphrase.unwrap_or_else(|| "[BLANK]".into()),
            security,
            station_ip_timeout: secs(self.traffic.station_ip_timeout_secs, Duration::from_secs(120)),
            ip_poll_interval: Duration::from_secs(1),
            tos: self.traffic.tos.unwrap_or_else(|| "BE".into()),
            name_prefix: self.traffic.name_prefix.unwrap_or_else(|| "dfs-".into()),
            side_a_min_bps: self.traffic.side_a_min_bps.unwrap_or(256_000),
            side_b_min_bps: self.traffic.side_b_min_bps.unwrap_or(560_000),
        };
        if let Some(&max) = matrix.client_densities.iter().max() {
            if max == 0 || max > traffic.stations.len() {
                return Err(invalid(
                    "matrix.client_densities",
                    format!(
                        "density {max} needs between 1 and {} configured stations",
                        traffic.stations.len()
                    ),
                ));
            }
        }

        Ok(RunnerConfig {
            controller,
            ap_console,
            radar: self.radar.resolve(),
            telemetry: TelemetryConfig {
                url: self
                    .telemetry
                    .url
                    .unwrap_or_else(|| "http://localhost:8080".into())
                    .trim_end_matches('/')
                    .to_string(),
                request_timeout: secs(self.telemetry.request_timeout_secs, Duration::from_secs(10)),
            },
            traffic,
            timing: self.timing.resolve()?,
            matrix,
        })
    }
}

impl RunnerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: RunnerConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
[controller]
host = "192.168.100.112"
user = "admin"
password = "secret"
series = "3504"
scheme = "telnet"

[traffic]
stations = ["sta0000", "sta0001"]

[matrix]
aps = ["APA453.0E7B.CF9C"]
chan_5ghz = [52, 36]
client_densities = [1, 2]
"#;

    #[test]
    fn parse_basic_config_with_defaults() {
        let cfg = RunnerConfig::from_toml_str(BASIC).unwrap();
        assert_eq!(cfg.controller.series, ControllerSeries::Series3504);
        assert_eq!(cfg.controller.scheme, Scheme::Telnet);
        assert_eq!(cfg.controller.port, 23);
        assert_eq!(cfg.controller.command_timeout, Duration::from_secs(120));
        assert_eq!(cfg.timing.cac_wait, Duration::from_secs(65));
        assert_eq!(cfg.timing.polling_interval, Duration::from_secs(60));
        assert_eq!(cfg.radar.params.pulse_interval_us, 1428);
        assert_eq!(cfg.radar.credential_prompt.as_deref(), Some("lanforge:"));
        assert_eq!(cfg.matrix.bands, vec![Band::FiveGhz]);
        assert_eq!(cfg.matrix.wifi_modes, vec![WifiMode::Auto]);
        assert!(cfg.ap_console.is_none());
    }

    #[test]
    fn missing_controller_host_is_fatal() {
        let err = RunnerConfig::from_toml_str(&BASIC.replace("host = \"192.168.100.112\"", ""))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref k) if k == "controller.host"));
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn unmapped_channel_rejected_before_any_session() {
        let err =
            RunnerConfig::from_toml_str(&BASIC.replace("[52, 36]", "[52, 37]")).unwrap_err();
        assert!(matches!(err, ConfigError::Channel(ChannelError::Unmapped(37))));
    }

    #[test]
    fn partial_ap_console_bundle_is_rejected() {
        let text = format!(
            "{BASIC}\n[ap_console]\nscheme = \"serial\"\nprompt = \"APA4\"\nhost = \"10.0.0.5\"\n"
        );
        let err = RunnerConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref k) if k == "ap_console.port"));
    }

    #[test]
    fn density_beyond_stations_is_rejected() {
        let err = RunnerConfig::from_toml_str(&BASIC.replace("[1, 2]", "[3]")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "matrix.client_densities"));
    }

    #[test]
    fn empty_credential_prompt_disables_exchange() {
        let text = format!("{BASIC}\n[radar]\ncredential_prompt = \"\"\n");
        let cfg = RunnerConfig::from_toml_str(&text).unwrap();
        assert!(cfg.radar.credential_prompt.is_none());
    }

    #[test]
    fn radar_offset_must_leave_a_polling_interval() {
        let text = format!(
            "{BASIC}\n[timing]\npolling_interval_secs = 60\ndfs_trigger_offset_secs = 30\ntest_duration_secs = 60\n"
        );
        let err = RunnerConfig::from_toml_str(&text).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "timing.dfs_trigger_offset_secs")
        );

        let text = text.replace("test_duration_secs = 60", "test_duration_secs = 90");
        let cfg = RunnerConfig::from_toml_str(&text).unwrap();
        assert_eq!(cfg.timing.test_duration, Duration::from_secs(90));
    }

    #[test]
    fn station_settings_default_from_controller_wlan() {
        let cfg = RunnerConfig::from_toml_str(BASIC).unwrap();
        assert_eq!(cfg.traffic.ssid, "dfs-open");
        assert_eq!(cfg.traffic.radio, "wiphy0");
        assert_eq!(cfg.traffic.passphrase, "[BLANK]");
        assert_eq!(cfg.traffic.security, StationSecurity::Wpa2);
        assert_eq!(cfg.traffic.station_ip_timeout, Duration::from_secs(120));
    }

    #[test]
    fn unknown_encryption_is_rejected() {
        let text = BASIC.replace("aps = [", "encryptions = [\"open\", \"wep\"]\naps = [");
        let err = RunnerConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "matrix.encryptions"));
    }

    #[test]
    fn unknown_wifi_mode_is_rejected() {
        let text = BASIC.replace("aps = [", "wifi_modes = [\"ac\"]\naps = [");
        let err = RunnerConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "matrix.wifi_modes"));
    }
}
