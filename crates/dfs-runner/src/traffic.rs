//! Station and connection lifecycle on the traffic service.
//!
//! Each configuration creates its first *client density* stations on the
//! configured radio, with the configuration's WiFi mode and security, brings
//! them up and waits for every one to hold an IP. It then gets one
//! cross-connect per station: the `-A` endpoint sits on the station, the `-B`
//! endpoint on the upstream port. Only the transmitting side for the
//! configured direction carries a rate. All commands go through the
//! service's JSON CLI (`POST /cli-json/<command>`); port state is read from
//! `GET /port/1/1/<name>`.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use dfs_common::error::{Classify, Severity};
use dfs_common::models::{ConnectionEndpoint, Direction, TestConfiguration};
use serde_json::json;
use thiserror::Error;

use crate::config::TrafficConfig;

const TEST_MANAGER: &str = "default_tm";

// `add_sta` flag bits.
const WPA_ENABLE: u64 = 0x10;
const WPA2_ENABLE: u64 = 0x400;
const CREATE_ADMIN_DOWN: u64 = 0x10_0000_0000;
const USE_WPA3: u64 = 0x100_0000_0000;

// `set_port` current/interest bits.
const USE_DHCP: u64 = 0x8000_0000;
const INTEREST_DHCP: u64 = 0x4000;
const INTEREST_IFDOWN: u64 = 0x80_0000;

/// Station security for configurations with encryption enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationSecurity {
    Open,
    Wpa,
    Wpa2,
    Wpa3,
}

impl StationSecurity {
    pub fn flags(self) -> u64 {
        match self {
            StationSecurity::Open => 0,
            StationSecurity::Wpa => WPA_ENABLE,
            StationSecurity::Wpa2 => WPA2_ENABLE,
            StationSecurity::Wpa3 => USE_WPA3,
        }
    }

    /// Resolve a matrix encryption value. `on`/`enable` select `enabled`.
    pub fn for_encryption(encryption: &str, enabled: StationSecurity) -> Option<Self> {
        match encryption {
            "open" | "off" | "disable" | "disabled" => Some(StationSecurity::Open),
            "on" | "enable" | "enabled" => Some(enabled),
            other => other.parse().ok(),
        }
    }
}

impl std::fmt::Display for StationSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StationSecurity::Open => "open",
            StationSecurity::Wpa => "wpa",
            StationSecurity::Wpa2 => "wpa2",
            StationSecurity::Wpa3 => "wpa3",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for StationSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(StationSecurity::Open),
            "wpa" => Ok(StationSecurity::Wpa),
            "wpa2" => Ok(StationSecurity::Wpa2),
            "wpa3" => Ok(StationSecurity::Wpa3),
            other => Err(format!("unknown station security: {other}")),
        }
    }
}

#[derive(Error, Debug)]
pub enum TrafficError {
    #[error("traffic request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("traffic service rejected {command}: HTTP {status}")]
    Rejected { command: String, status: u16 },
    #[error("{wanted} stations requested but only {have} configured")]
    NotEnoughStations { wanted: usize, have: usize },
    #[error("unknown encryption '{0}'")]
    Encryption(String),
    #[error("stations {stations:?} had no IP after {waited:?}")]
    NoIp {
        stations: Vec<String>,
        waited: Duration,
    },
}

impl Classify for TrafficError {
    fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// Stations and connections created for one configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSet {
    pub stations: Vec<String>,
    pub cross_connects: Vec<String>,
    pub endpoints: Vec<ConnectionEndpoint>,
}

impl ConnectionSet {
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty() && self.cross_connects.is_empty() && self.endpoints.is_empty()
    }
}

pub trait TrafficControl: Send + Sync {
    fn build(
        &self,
        config: &TestConfiguration,
    ) -> impl Future<Output = Result<ConnectionSet, TrafficError>> + Send;

    fn start(&self, set: &ConnectionSet) -> impl Future<Output = Result<(), TrafficError>> + Send;

    fn stop(&self, set: &ConnectionSet) -> impl Future<Output = Result<(), TrafficError>> + Send;

    /// Remove every cross-connect, endpoint and station in `set`. Best effort.
    fn cleanup(&self, set: &ConnectionSet) -> impl Future<Output = ()> + Send;
}

/// Rates for the A and B endpoints, in bits per second.
pub fn endpoint_rates(traffic: &TrafficConfig, direction: Direction) -> (u64, u64) {
    match direction {
        Direction::Upstream => (traffic.side_a_min_bps, 0),
        Direction::Downstream => (0, traffic.side_b_min_bps),
    }
}

/// Offered load for a configuration, in Mbps.
pub fn expected_throughput_mbps(traffic: &TrafficConfig, config: &TestConfiguration) -> f64 {
    let (a, b) = endpoint_rates(traffic, config.direction);
    (config.client_density as u64 * (a + b)) as f64 / 1_000_000.0
}

pub fn cross_connect_name(traffic: &TrafficConfig, station: &str, index: usize) -> String {
    format!("{}{}-{}", traffic.name_prefix, station, index)
}

pub struct HttpTraffic {
    client: reqwest::Client,
    base_url: String,
    traffic: TrafficConfig,
}

impl HttpTraffic {
    pub fn new(base_url: &str, timeout: Duration, traffic: TrafficConfig) -> Result<Self, TrafficError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            traffic,
        })
    }

    async fn post(&self, command: &str, body: serde_json::Value) -> Result<(), TrafficError> {
        tracing::debug!(command, body = %body, "traffic command");
        let response = self
            .client
            .post(format!("{}/cli-json/{}", self.base_url, command))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrafficError::Rejected {
                command: command.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// IPv4 address of a port, if it holds one.
    async fn port_ip(&self, port: &str) -> Result<Option<String>, TrafficError> {
        let response = self
            .client
            .get(format!("{}/port/1/1/{}", self.base_url, port))
            .query(&[("fields", "ip")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrafficError::Rejected {
                command: format!("port/{port}"),
                status: status.as_u16(),
            });
        }
        let body: serde_json::Value = response.json().await?;
        let ip = body["interface"]["ip"].as_str().unwrap_or_default();
        Ok((!ip.is_empty() && ip != "0.0.0.0").then(|| ip.to_string()))
    }

    async fn create_stations(
        &self,
        config: &TestConfiguration,
        security: StationSecurity,
        set: &mut ConnectionSet,
    ) -> Result<(), TrafficError> {
        let flags = security.flags() | CREATE_ADMIN_DOWN;
        let flags_mask = WPA_ENABLE | WPA2_ENABLE | USE_WPA3 | CREATE_ADMIN_DOWN;
        let key = match security {
            StationSecurity::Open => "[BLANK]",
            _ => self.traffic.passphrase.as_str(),
        };
        for station in self.traffic.stations.iter().take(config.client_density) {
            self.post(
                "add_sta",
                json!({
                    "shelf": 1,
                    "resource": 1,
                    "radio": self.traffic.radio,
                    "sta_name": station,
                    "ssid": self.traffic.ssid,
                    "key": key,
                    "mode": config.wifi_mode.code(),
                    "mac": "xx:xx:xx:xx:*:xx",
                    "flags": flags,
                    "flags_mask": flags_mask,
                }),
            )
            .await?;
            set.stations.push(station.clone());
        }
        for station in &set.stations {
            self.post(
                "set_port",
                json!({
                    "shelf": 1,
                    "resource": 1,
                    "port": station,
                    "current_flags": USE_DHCP,
                    "interest": INTEREST_DHCP | INTEREST_IFDOWN,
                }),
            )
            .await?;
        }
        tracing::info!(
            stations = set.stations.len(),
            radio = %self.traffic.radio,
            mode = %config.wifi_mode,
            security = %security,
            "stations created"
        );
        Ok(())
    }

    /// Poll until every station holds an IP or the timeout passes.
    async fn wait_for_ip(&self, stations: &[String]) -> Result<(), TrafficError> {
        let started = tokio::time::Instant::now();
        let mut pending: BTreeSet<&String> = stations.iter().collect();
        loop {
            let mut still = BTreeSet::new();
            for station in pending {
                match self.port_ip(station).await? {
                    Some(ip) => tracing::debug!(station = %station, ip = %ip, "station has IP"),
                    None => {
                        still.insert(station);
                    }
                }
            }
            pending = still;
            if pending.is_empty() {
                tracing::info!(waited_ms = started.elapsed().as_millis() as u64, "station IPs acquired");
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= self.traffic.station_ip_timeout {
                return Err(TrafficError::NoIp {
                    stations: pending.into_iter().cloned().collect(),
                    waited,
                });
            }
            tokio::time::sleep(self.traffic.ip_poll_interval).await;
        }
    }

    fn endpoint_body(&self, alias: &str, port: &str, config: &TestConfiguration, rate: u64) -> serde_json::Value {
        json!({
            "alias": alias,
            "shelf": 1,
            "resource": 1,
            "port": port,
            "type": config.traffic_type.to_string(),
            "min_rate": rate,
            "max_rate": rate,
            "min_pkt": config.packet_size,
            "max_pkt": config.packet_size,
        })
    }

    async fn build_into(&self, config: &TestConfiguration, set: &mut ConnectionSet) -> Result<(), TrafficError> {
        let stations = &self.traffic.stations;
        if config.client_density > stations.len() {
            return Err(TrafficError::NotEnoughStations {
                wanted: config.client_density,
                have: stations.len(),
            });
        }
        let security = StationSecurity::for_encryption(&config.encryption, self.traffic.security)
            .ok_or_else(|| TrafficError::Encryption(config.encryption.clone()))?;
        self.create_stations(config, security, set).await?;
        self.wait_for_ip(&set.stations).await?;

        let (rate_a, rate_b) = endpoint_rates(&self.traffic, config.direction);

        for (index, station) in stations.iter().take(config.client_density).enumerate() {
            let cx = cross_connect_name(&self.traffic, station, index);
            let side_a = format!("{cx}-A");
            let side_b = format!("{cx}-B");

            self.post("add_endp", self.endpoint_body(&side_a, station, config, rate_a))
                .await?;
            set.endpoints.push(ConnectionEndpoint::new(&side_a, &self.traffic.tos));
            self.post(
                "add_endp",
                self.endpoint_body(&side_b, &self.traffic.upstream_port, config, rate_b),
            )
            .await?;
            set.endpoints.push(ConnectionEndpoint::new(&side_b, &self.traffic.tos));

            for name in [&side_a, &side_b] {
                self.post("set_endp_tos", json!({ "name": name, "tos": self.traffic.tos }))
                    .await?;
            }

            self.post(
                "add_cx",
                json!({
                    "alias": cx,
                    "test_mgr": TEST_MANAGER,
                    "tx_endp": side_a,
                    "rx_endp": side_b,
                }),
            )
            .await?;
            set.cross_connects.push(cx);
        }
        Ok(())
    }

    async fn set_state(&self, set: &ConnectionSet, state: &str) -> Result<(), TrafficError> {
        for cx in &set.cross_connects {
            self.post(
                "set_cx_state",
                json!({ "test_mgr": TEST_MANAGER, "cx_name": cx, "cx_state": state }),
            )
            .await?;
        }
        Ok(())
    }
}

impl TrafficControl for HttpTraffic {
    async fn build(&self, config: &TestConfiguration) -> Result<ConnectionSet, TrafficError> {
        let mut set = ConnectionSet::default();
        match self.build_into(config, &mut set).await {
            Ok(()) => {
                tracing::info!(
                    stations = set.stations.len(),
                    connections = set.cross_connects.len(),
                    direction = %config.direction,
                    traffic_type = %config.traffic_type,
                    "connections built"
                );
                Ok(set)
            }
            Err(e) => {
                tracing::error!(error = %e, "station/connection build failed, removing partial set");
                self.cleanup(&set).await;
                Err(e)
            }
        }
    }

    async fn start(&self, set: &ConnectionSet) -> Result<(), TrafficError> {
        self.set_state(set, "RUNNING").await
    }

    async fn stop(&self, set: &ConnectionSet) -> Result<(), TrafficError> {
        self.set_state(set, "STOPPED").await
    }

    async fn cleanup(&self, set: &ConnectionSet) {
        for cx in &set.cross_connects {
            if let Err(e) = self
                .post("rm_cx", json!({ "test_mgr": TEST_MANAGER, "cx_name": cx }))
                .await
            {
                tracing::warn!(cx = %cx, error = %e, "failed to remove cross-connect");
            }
        }
        for endpoint in &set.endpoints {
            if let Err(e) = self
                .post("rm_endp", json!({ "endp_name": endpoint.name }))
                .await
            {
                tracing::warn!(endpoint = %endpoint.name, error = %e, "failed to remove endpoint");
            }
        }
        for station in &set.stations {
            if let Err(e) = self
                .post("rm_vlan", json!({ "shelf": 1, "resource": 1, "port": station }))
                .await
            {
                tracing::warn!(station = %station, error = %e, "failed to remove station");
            }
        }
    }
}
