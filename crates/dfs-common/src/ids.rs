//! Identifier generation.
//!
//! Sweep runs are tagged with a `run_` prefix followed by a UUIDv7, so output
//! files from successive sweeps sort by start time. Test identifiers are
//! synthesized from the configuration tuple so a CSV row can be matched to
//! its parameters by eye.

use uuid::Uuid;

use crate::models::TestConfiguration;

/// Generate a sweep run ID: `run_<uuid7>`
pub fn run_id() -> String {
    format!("run_{}", Uuid::now_v7().as_simple())
}

/// Underscore-joined parameter values, with a leading underscore.
pub fn test_id(config: &TestConfiguration) -> String {
    let mut id = String::new();
    for value in config.key_values() {
        id.push('_');
        id.push_str(&value);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Band, Direction, TrafficType, WifiMode};

    #[test]
    fn run_ids_have_prefix_and_sort() {
        let a = run_id();
        let b = run_id();
        assert!(a.starts_with("run_"));
        assert!(b > a, "Expected {b} > {a}");
    }

    #[test]
    fn test_id_joins_values() {
        let config = TestConfiguration {
            ap: "AP1".into(),
            band: Band::FiveGhz,
            wifi_mode: WifiMode::AnAc,
            tx_power: 1,
            chan_5ghz: 52,
            chan_24ghz: 6,
            chan_width: 20,
            encryption: "open".into(),
            ap_mode: "local".into(),
            client_density: 2,
            traffic_type: TrafficType::LfUdp,
            direction: Direction::Upstream,
            packet_size: 1024,
        };
        assert_eq!(
            test_id(&config),
            "_AP1_a_anAC_1_52_6_20_open_local_2_lf_udp_upstream_1024"
        );
    }
}
