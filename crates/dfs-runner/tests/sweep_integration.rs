//! End-to-end sweeps against in-process fakes of the controller, the RF
//! tool, the traffic service and its telemetry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dfs_common::models::{
    ConnectionEndpoint, EndpointCounters, RadarEvent, RadarOutcome, RadarState,
    TestConfiguration, Verdict,
};
use dfs_runner::config::RunnerConfig;
use dfs_runner::controller::{Action, CommandRunner, ControllerError, Invocation};
use dfs_runner::driver::{Driver, SweepSummary};
use dfs_runner::matrix;
use dfs_runner::radar::Stimulus;
use dfs_runner::report::ResultsWriter;
use dfs_runner::telemetry::{TelemetryError, TelemetrySource};
use dfs_runner::traffic::{ConnectionSet, TrafficControl, TrafficError};
use tokio::sync::watch;

const AP: &str = "APA453.0E7B.CF9C";

// ── Fakes ───────────────────────────────────────────────────────────

/// 3504-style controller whose AP sits on whatever channel was last set,
/// or on `lockout_channel` when one is given.
struct FakeController {
    channel: Arc<Mutex<u16>>,
    actions: Mutex<Vec<Action>>,
    reject_channel: Option<u16>,
    lockout_channel: Option<u16>,
}

impl FakeController {
    fn new(channel: Arc<Mutex<u16>>) -> Self {
        Self {
            channel,
            actions: Mutex::new(Vec::new()),
            reject_channel: None,
            lockout_channel: None,
        }
    }

    fn count(&self, action: Action) -> usize {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .filter(|a| **a == action)
            .count()
    }

    fn table(&self) -> String {
        let channel = *self.channel.lock().unwrap();
        format!(
            "AP Name            MAC Address        Slot Admin   Oper    Channel   TxPower\n\
             ------------------ ------------------ ---- ------- ------- --------- -----------\n\
             {AP}   a4:53:0e:7b:cf:90  1    ENABLED UP      {channel}*       1/8 ( 22 dBm)\n"
        )
    }
}

impl CommandRunner for FakeController {
    async fn run(&self, invocation: &Invocation) -> Result<String, ControllerError> {
        self.actions.lock().unwrap().push(invocation.action);
        match invocation.action {
            Action::Advanced => Ok(self.table()),
            Action::Channel => {
                let requested: u16 = invocation.value.as_deref().unwrap_or("0").parse().unwrap();
                if self.reject_channel == Some(requested) {
                    return Err(ControllerError::NonZero {
                        action: Action::Channel,
                        code: Some(1),
                        output: "channel not allowed".into(),
                    });
                }
                *self.channel.lock().unwrap() = self.lockout_channel.unwrap_or(requested);
                Ok(String::new())
            }
            _ => Ok(String::new()),
        }
    }
}

/// Moves the AP to `vacate_to` when the burst lands, or leaves it in place.
struct FakeRadar {
    channel: Arc<Mutex<u16>>,
    vacate_to: Option<u16>,
    bursts: AtomicUsize,
    targets: Mutex<Vec<u16>>,
}

impl FakeRadar {
    fn new(channel: Arc<Mutex<u16>>, vacate_to: Option<u16>) -> Self {
        Self {
            channel,
            vacate_to,
            bursts: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        }
    }
}

impl Stimulus for FakeRadar {
    async fn emit(&self, channel: u16, _shutdown: watch::Receiver<bool>) -> RadarEvent {
        self.bursts.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(channel);
        if let Some(to) = self.vacate_to {
            *self.channel.lock().unwrap() = to;
        }
        RadarEvent {
            channel,
            frequency_khz: 5_260_000,
            scheduled_at: Utc::now(),
            completed_at: Some(Utc::now()),
            state: RadarState::Done,
            outcome: RadarOutcome::Completed,
        }
    }
}

#[derive(Default)]
struct FakeTraffic {
    builds: AtomicUsize,
    cleanups: AtomicUsize,
}

impl TrafficControl for FakeTraffic {
    async fn build(&self, config: &TestConfiguration) -> Result<ConnectionSet, TrafficError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let mut set = ConnectionSet::default();
        for i in 0..config.client_density {
            let cx = format!("dfs-sta{i:04}-{i}");
            set.endpoints.push(ConnectionEndpoint::new(format!("{cx}-A"), "BE"));
            set.endpoints.push(ConnectionEndpoint::new(format!("{cx}-B"), "BE"));
            set.cross_connects.push(cx);
        }
        Ok(set)
    }

    async fn start(&self, _set: &ConnectionSet) -> Result<(), TrafficError> {
        Ok(())
    }

    async fn stop(&self, _set: &ConnectionSet) -> Result<(), TrafficError> {
        Ok(())
    }

    async fn cleanup(&self, _set: &ConnectionSet) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeTelemetry {
    polls: AtomicU64,
}

impl TelemetrySource for FakeTelemetry {
    async fn fetch(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, EndpointCounters>, TelemetryError> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    EndpointCounters {
                        rx_bytes: 1_000_000 + n * 250_000,
                        rx_drop_pct: 0.0,
                    },
                )
            })
            .collect())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

fn config(matrix: &str) -> RunnerConfig {
    let text = format!(
        r#"
[controller]
host = "192.168.100.112"
user = "admin"
password = "secret"
series = "3504"

[traffic]
stations = ["sta0000", "sta0001"]

[timing]
polling_interval_secs = 10
dfs_trigger_offset_secs = 15
test_duration_secs = 40
settle_after_enable_secs = 1
cac_wait_secs = 5
non_dfs_settle_secs = 2
traffic_warmup_secs = 1
tolerated_failed_intervals = 1

[matrix]
aps = ["{AP}"]
{matrix}
"#
    );
    RunnerConfig::from_toml_str(&text).unwrap()
}

#[derive(Default)]
struct Scenario {
    vacate_to: Option<u16>,
    reject_channel: Option<u16>,
    lockout_channel: Option<u16>,
}

struct Sweep {
    summary: SweepSummary,
    controller: FakeController,
    radar: Arc<FakeRadar>,
    traffic: FakeTraffic,
    rows: Vec<Vec<String>>,
    details: Vec<Vec<String>>,
}

fn read_csv(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

async fn sweep(matrix_toml: &str, scenario: Scenario) -> Sweep {
    let cfg = config(matrix_toml);
    let channel = Arc::new(Mutex::new(0));
    let mut controller = FakeController::new(Arc::clone(&channel));
    controller.reject_channel = scenario.reject_channel;
    controller.lockout_channel = scenario.lockout_channel;
    let radar = Arc::new(FakeRadar::new(channel, scenario.vacate_to));
    let traffic = FakeTraffic::default();
    let telemetry = FakeTelemetry::default();

    let dir = tempfile::tempdir().unwrap();
    let mut writer = ResultsWriter::create(dir.path(), "dfs", "run_test").unwrap();
    let (_tx, rx) = watch::channel(false);

    let enumerated = matrix::enumerate(&cfg.matrix);
    let summary = {
        let driver = Driver::new(&cfg, &controller, &telemetry, &traffic, Arc::clone(&radar));
        driver.run(&enumerated, &mut writer, rx).await.unwrap()
    };

    Sweep {
        summary,
        controller,
        radar,
        traffic,
        rows: read_csv(writer.results_path()),
        details: read_csv(writer.detail_path()),
    }
}

/// Column of the verdict in the results file.
const VERDICT: usize = 20;

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn vacating_ap_passes() {
    let s = sweep(
        "chan_5ghz = [52]",
        Scenario {
            vacate_to: Some(36),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(s.summary.runs, 1);
    assert_eq!(s.summary.passed, 1);
    assert_eq!(s.radar.bursts.load(Ordering::SeqCst), 1);
    assert_eq!(s.rows.len(), 1);
    assert_eq!(s.rows[0][VERDICT], Verdict::Pass.to_string());
    assert_eq!(s.rows[0][18], "52 (20 MHz)");
    assert_eq!(s.rows[0][19], "36 (20 MHz)");
}

#[tokio::test(start_paused = true)]
async fn ap_staying_on_dfs_channel_fails() {
    let s = sweep("chan_5ghz = [52]", Scenario::default()).await;

    assert_eq!(s.summary.failed, 1);
    assert_eq!(s.rows[0][VERDICT], "FAIL");
    assert!(s.rows[0][21].contains("still a DFS channel"));
    assert_eq!(s.traffic.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dfs_lockout_completes_monitoring_then_fails_on_mismatch() {
    let s = sweep(
        "chan_5ghz = [52]",
        Scenario {
            vacate_to: Some(36),
            lockout_channel: Some(100),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(s.summary.failed, 1);
    // every polling interval of the 40 s window was evaluated
    assert_eq!(s.details.len(), 4);
    // radar goes to the channel the AP is actually on
    assert_eq!(*s.radar.targets.lock().unwrap(), vec![100]);
    assert_eq!(s.rows[0][VERDICT], "FAIL");
    assert_eq!(s.rows[0][18], "100 (20 MHz)");
    assert_eq!(s.rows[0][19], "36 (20 MHz)");
    assert!(s.rows[0][21].contains("initial channel 100 does not match requested 52"));
    assert!(!s.rows[0][21].contains("DFS channel"));
    assert_eq!(s.traffic.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn density_and_packet_size_changes_configure_once() {
    let s = sweep(
        "chan_5ghz = [36]\nclient_densities = [1, 2]\npacket_sizes = [512, 1024]",
        Scenario::default(),
    )
    .await;

    assert_eq!(s.summary.runs, 4);
    assert_eq!(s.controller.count(Action::Enable), 1);
    assert_eq!(s.controller.count(Action::Channel), 1);
    assert_eq!(s.traffic.builds.load(Ordering::SeqCst), 4);
    assert_eq!(s.traffic.cleanups.load(Ordering::SeqCst), 4);
    // channel 36 is outside the DFS set, so every run passes
    assert_eq!(s.summary.passed, 4);
}

#[tokio::test(start_paused = true)]
async fn sequencing_failure_is_incomplete_and_sweep_continues() {
    let s = sweep(
        "chan_5ghz = [100, 52]",
        Scenario {
            vacate_to: Some(149),
            reject_channel: Some(100),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(s.summary.runs, 2);
    assert_eq!(s.summary.incomplete, 1);
    assert_eq!(s.summary.passed, 1);
    assert_eq!(s.rows[0][VERDICT], "INCOMPLETE");
    assert!(s.rows[0][21].contains("step 5"));
    assert_eq!(s.rows[1][VERDICT], "PASS");
    // no connections were built for the aborted configuration
    assert_eq!(s.traffic.builds.load(Ordering::SeqCst), 1);
    assert_eq!(s.controller.count(Action::Enable), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_sweep_stops_between_configurations() {
    let cfg = config("chan_5ghz = [36, 40]");
    let channel = Arc::new(Mutex::new(0));
    let controller = FakeController::new(Arc::clone(&channel));
    let radar = Arc::new(FakeRadar::new(channel, None));
    let traffic = FakeTraffic::default();
    let telemetry = FakeTelemetry::default();
    let dir = tempfile::tempdir().unwrap();
    let mut writer = ResultsWriter::create(dir.path(), "dfs", "run_cancel").unwrap();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let driver = Driver::new(&cfg, &controller, &telemetry, &traffic, radar);
    let summary = driver
        .run(&matrix::enumerate(&cfg.matrix), &mut writer, rx)
        .await
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.runs, 0);
    assert_eq!(controller.count(Action::Disable), 0);
}
