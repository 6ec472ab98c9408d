//! Data models for the DFS verification runner.
//!
//! A sweep enumerates [`TestConfiguration`]s, drives the controller into
//! each one, watches [`Snapshot`]s of connection counters while a radar
//! burst is injected, and records one [`RunResult`] per configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels;

// ── Radio ───────────────────────────────────────────────────────────

/// Radio band, named the way controllers name them (`a` = 5 GHz, `b` = 2.4 GHz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "a")]
    FiveGhz,
    #[serde(rename = "b")]
    TwoGhz,
}

impl Band {
    /// Radio slot the band occupies on a dual-radio AP.
    pub fn slot(self) -> u8 {
        match self {
            Band::FiveGhz => 1,
            Band::TwoGhz => 0,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::FiveGhz => write!(f, "a"),
            Band::TwoGhz => write!(f, "b"),
        }
    }
}

impl std::str::FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" | "5g" | "5ghz" => Ok(Band::FiveGhz),
            "b" | "24g" | "2.4ghz" => Ok(Band::TwoGhz),
            other => Err(format!("unknown band: {other}")),
        }
    }
}

/// WiFi PHY mode of the client stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WifiMode {
    Auto,
    A,
    B,
    G,
    Abg,
    Abgn,
    Bgn,
    Bg,
    AbgnAc,
    AnAc,
    An,
    BgnAc,
    AbgnAx,
    BgnAx,
    AnAx,
}

/// Which bands a mode can operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandSupport {
    FiveGhzOnly,
    TwoGhzOnly,
    Dual,
}

impl WifiMode {
    pub const ALL: [WifiMode; 15] = [
        WifiMode::Auto,
        WifiMode::A,
        WifiMode::B,
        WifiMode::G,
        WifiMode::Abg,
        WifiMode::Abgn,
        WifiMode::Bgn,
        WifiMode::Bg,
        WifiMode::AbgnAc,
        WifiMode::AnAc,
        WifiMode::An,
        WifiMode::BgnAc,
        WifiMode::AbgnAx,
        WifiMode::BgnAx,
        WifiMode::AnAx,
    ];

    /// Numeric mode code used by the traffic service when creating stations.
    pub fn code(self) -> u8 {
        match self {
            WifiMode::Auto => 0,
            WifiMode::A => 1,
            WifiMode::B => 2,
            WifiMode::G => 3,
            WifiMode::Abg => 4,
            WifiMode::Abgn => 5,
            WifiMode::Bgn => 6,
            WifiMode::Bg => 7,
            WifiMode::AbgnAc => 8,
            WifiMode::AnAc => 9,
            WifiMode::An => 10,
            WifiMode::BgnAc => 11,
            WifiMode::AbgnAx => 12,
            WifiMode::BgnAx => 13,
            WifiMode::AnAx => 14,
        }
    }

    pub fn band_support(self) -> BandSupport {
        match self {
            WifiMode::A | WifiMode::An | WifiMode::AnAc | WifiMode::AnAx => {
                BandSupport::FiveGhzOnly
            }
            WifiMode::B
            | WifiMode::G
            | WifiMode::Bg
            | WifiMode::Bgn
            | WifiMode::BgnAc
            | WifiMode::BgnAx => BandSupport::TwoGhzOnly,
            WifiMode::Auto
            | WifiMode::Abg
            | WifiMode::Abgn
            | WifiMode::AbgnAc
            | WifiMode::AbgnAx => BandSupport::Dual,
        }
    }

    /// Whether stations in this mode can associate on `band`.
    pub fn supports(self, band: Band) -> bool {
        match (self.band_support(), band) {
            (BandSupport::Dual, _) => true,
            (BandSupport::FiveGhzOnly, Band::FiveGhz) => true,
            (BandSupport::TwoGhzOnly, Band::TwoGhz) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for WifiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WifiMode::Auto => "auto",
            WifiMode::A => "a",
            WifiMode::B => "b",
            WifiMode::G => "g",
            WifiMode::Abg => "abg",
            WifiMode::Abgn => "abgn",
            WifiMode::Bgn => "bgn",
            WifiMode::Bg => "bg",
            WifiMode::AbgnAc => "abgnAC",
            WifiMode::AnAc => "anAC",
            WifiMode::An => "an",
            WifiMode::BgnAc => "bgnAC",
            WifiMode::AbgnAx => "abgnAX",
            WifiMode::BgnAx => "bgnAX",
            WifiMode::AnAx => "anAX",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for WifiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WifiMode::ALL
            .into_iter()
            .find(|mode| mode.to_string() == s)
            .ok_or_else(|| format!("unknown wifi mode: {s}"))
    }
}

// ── Traffic ─────────────────────────────────────────────────────────

/// Which side of each connection carries the offered load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Stations transmit; the upstream port receives on the `-B` endpoints.
    Upstream,
    /// The upstream port transmits; stations receive on the `-A` endpoints.
    Downstream,
}

impl Direction {
    /// Endpoint side whose counters are not evaluated in this direction.
    pub fn excluded_side(self) -> EndpointSide {
        match self {
            Direction::Upstream => EndpointSide::A,
            Direction::Downstream => EndpointSide::B,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upstream => write!(f, "upstream"),
            Direction::Downstream => write!(f, "downstream"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upstream" => Ok(Direction::Upstream),
            "downstream" => Ok(Direction::Downstream),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Layer-3 endpoint protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficType {
    LfUdp,
    LfUdp6,
    LfTcp,
    LfTcp6,
    McUdp,
    McUdp6,
}

impl std::fmt::Display for TrafficType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrafficType::LfUdp => "lf_udp",
            TrafficType::LfUdp6 => "lf_udp6",
            TrafficType::LfTcp => "lf_tcp",
            TrafficType::LfTcp6 => "lf_tcp6",
            TrafficType::McUdp => "mc_udp",
            TrafficType::McUdp6 => "mc_udp6",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TrafficType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lf_udp" => Ok(TrafficType::LfUdp),
            "lf_udp6" => Ok(TrafficType::LfUdp6),
            "lf_tcp" => Ok(TrafficType::LfTcp),
            "lf_tcp6" => Ok(TrafficType::LfTcp6),
            "mc_udp" => Ok(TrafficType::McUdp),
            "mc_udp6" => Ok(TrafficType::McUdp6),
            other => Err(format!("unknown traffic type: {other}")),
        }
    }
}

// ── Test configuration ──────────────────────────────────────────────

/// One point in the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub ap: String,
    pub band: Band,
    pub wifi_mode: WifiMode,
    pub tx_power: u8,
    pub chan_5ghz: u16,
    pub chan_24ghz: u16,
    /// Channel width in MHz.
    pub chan_width: u16,
    pub encryption: String,
    pub ap_mode: String,
    pub client_density: usize,
    pub traffic_type: TrafficType,
    pub direction: Direction,
    pub packet_size: u32,
}

impl TestConfiguration {
    /// Column names matching [`TestConfiguration::key_values`].
    pub const KEY_HEADERS: [&'static str; 13] = [
        "AP",
        "Band",
        "wifi_mode",
        "tx_power",
        "chan_5ghz",
        "chan_24ghz",
        "BW",
        "encryption",
        "ap_mode",
        "clients",
        "packet_type",
        "direction",
        "packet_size",
    ];

    pub fn key_values(&self) -> Vec<String> {
        vec![
            self.ap.clone(),
            self.band.to_string(),
            self.wifi_mode.to_string(),
            self.tx_power.to_string(),
            self.chan_5ghz.to_string(),
            self.chan_24ghz.to_string(),
            self.chan_width.to_string(),
            self.encryption.clone(),
            self.ap_mode.clone(),
            self.client_density.to_string(),
            self.traffic_type.to_string(),
            self.direction.to_string(),
            self.packet_size.to_string(),
        ]
    }

    /// The subset of fields that requires controller reconfiguration.
    pub fn controller_fields(&self) -> ControllerFields {
        ControllerFields {
            ap: self.ap.clone(),
            band: self.band,
            chan_width: self.chan_width,
            ap_mode: self.ap_mode.clone(),
            tx_power: self.tx_power,
            chan_5ghz: self.chan_5ghz,
            chan_24ghz: self.chan_24ghz,
        }
    }

    /// Channel configured on the band under test.
    pub fn active_channel(&self) -> u16 {
        self.controller_fields().active_channel()
    }

    /// Whether the configuration targets a radar-protected channel.
    pub fn is_dfs(&self) -> bool {
        self.band == Band::FiveGhz && channels::is_dfs(self.chan_5ghz)
    }
}

/// Controller-relevant fields of a [`TestConfiguration`].
///
/// Two configurations with equal fields share one controller setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerFields {
    pub ap: String,
    pub band: Band,
    pub chan_width: u16,
    pub ap_mode: String,
    pub tx_power: u8,
    pub chan_5ghz: u16,
    pub chan_24ghz: u16,
}

impl ControllerFields {
    pub fn active_channel(&self) -> u16 {
        match self.band {
            Band::FiveGhz => self.chan_5ghz,
            Band::TwoGhz => self.chan_24ghz,
        }
    }
}

// ── Channel state ───────────────────────────────────────────────────

/// Radio state read back from the controller's AP table.
///
/// An empty state (no channels) means the read failed; callers treat it as
/// "unknown", which is distinct from "wrong".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    /// Primary channel first; bonded channels follow when the controller
    /// reports a channel group.
    pub channels: Vec<u16>,
    pub bandwidth_mhz: Option<u16>,
    pub tx_power: Option<String>,
    pub signal_dbm: Option<i32>,
    pub mac: Option<String>,
    pub slot: Option<u8>,
}

impl ChannelState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        !self.channels.is_empty()
    }

    pub fn primary(&self) -> Option<u16> {
        self.channels.first().copied()
    }

    /// Whether any reported channel is radar-protected.
    pub fn on_dfs_channel(&self) -> bool {
        self.channels.iter().any(|&ch| channels::is_dfs(ch))
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.primary() {
            None => write!(f, "unknown"),
            Some(ch) => {
                write!(f, "{ch}")?;
                if let Some(bw) = self.bandwidth_mhz {
                    write!(f, " ({bw} MHz)")?;
                }
                Ok(())
            }
        }
    }
}

// ── Radar ───────────────────────────────────────────────────────────

/// Progress of one radar stimulus conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadarState {
    Spawned,
    AwaitingFirstPrompt,
    AwaitingReadyPrompt,
    Emitting,
    AwaitingStopAck,
    Done,
}

impl std::fmt::Display for RadarState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RadarState::Spawned => "spawned",
            RadarState::AwaitingFirstPrompt => "awaiting-first-prompt",
            RadarState::AwaitingReadyPrompt => "awaiting-ready-prompt",
            RadarState::Emitting => "emitting",
            RadarState::AwaitingStopAck => "awaiting-stop-ack",
            RadarState::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RadarOutcome {
    Completed,
    TimedOut,
    Cancelled,
    Failed(String),
}

/// One radar injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarEvent {
    pub channel: u16,
    pub frequency_khz: u32,
    pub scheduled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last state the conversation reached.
    pub state: RadarState,
    pub outcome: RadarOutcome,
}

impl RadarEvent {
    pub fn completed(&self) -> bool {
        self.outcome == RadarOutcome::Completed
    }
}

// ── Telemetry ───────────────────────────────────────────────────────

/// Side of a connection an endpoint belongs to, taken from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointSide {
    A,
    B,
    Multicast,
    Other,
}

impl EndpointSide {
    /// Classify an endpoint by name: multicast transmitters carry `mtx`,
    /// unicast endpoints end in `-A` or `-B`.
    pub fn of(name: &str) -> Self {
        if name.contains("mtx") {
            EndpointSide::Multicast
        } else if name.ends_with("-A") {
            EndpointSide::A
        } else if name.ends_with("-B") {
            EndpointSide::B
        } else {
            EndpointSide::Other
        }
    }
}

/// A traffic endpoint created for one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEndpoint {
    pub name: String,
    pub side: EndpointSide,
    pub tos: String,
}

impl ConnectionEndpoint {
    pub fn new(name: impl Into<String>, tos: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            side: EndpointSide::of(&name),
            name,
            tos: tos.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointCounters {
    pub rx_bytes: u64,
    pub rx_drop_pct: f64,
}

/// Endpoint counters captured at one polling instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    /// Time since the monitoring window opened.
    pub elapsed: Duration,
    pub endpoints: BTreeMap<String, EndpointCounters>,
}

impl Snapshot {
    pub fn new(elapsed: Duration, endpoints: BTreeMap<String, EndpointCounters>) -> Self {
        Self {
            taken_at: Utc::now(),
            elapsed,
            endpoints,
        }
    }

    /// Drop endpoints not evaluated for `direction`: the excluded side and
    /// every multicast endpoint. Applying it twice removes nothing further.
    pub fn for_direction(&self, direction: Direction) -> Snapshot {
        let excluded = direction.excluded_side();
        let endpoints = self
            .endpoints
            .iter()
            .filter(|(name, _)| {
                let side = EndpointSide::of(name);
                side != excluded && side != EndpointSide::Multicast
            })
            .map(|(name, counters)| (name.clone(), *counters))
            .collect();
        Snapshot {
            taken_at: self.taken_at,
            elapsed: self.elapsed,
            endpoints,
        }
    }

    pub fn same_membership(&self, other: &Snapshot) -> bool {
        self.endpoints.len() == other.endpoints.len()
            && self.endpoints.keys().all(|k| other.endpoints.contains_key(k))
    }
}

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    /// Controller sequencing aborted before monitoring.
    Incomplete,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::Incomplete => write!(f, "INCOMPLETE"),
        }
    }
}

/// Outcome of one configuration, written once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub config: TestConfiguration,
    pub test_id: String,
    pub verdict: Verdict,
    /// Why the run did not pass; empty on PASS.
    pub reasons: Vec<String>,
    pub best_throughput_mbps: f64,
    pub expected_throughput_mbps: f64,
    pub intervals: u32,
    pub passed_intervals: u32,
    pub initial_channel: ChannelState,
    pub final_channel: ChannelState,
    /// Received bytes per evaluated endpoint across the whole window.
    pub deltas: BTreeMap<String, i64>,
    pub radar: Option<RadarEvent>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn pass_ratio(&self) -> f64 {
        if self.intervals == 0 {
            0.0
        } else {
            f64::from(self.passed_intervals) / f64::from(self.intervals)
        }
    }
}
