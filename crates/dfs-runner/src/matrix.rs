//! Sweep enumeration.
//!
//! The cartesian product of every matrix dimension, outermost first: AP,
//! band, WiFi mode, tx power, 5 GHz channel, 2.4 GHz channel, width,
//! encryption, AP mode, client density, traffic type, direction, packet
//! size. Consecutive entries therefore share controller-relevant fields
//! wherever possible, which is what makes controller reuse effective.

use dfs_common::ids;
use dfs_common::models::TestConfiguration;

use crate::config::MatrixConfig;

#[derive(Debug, Clone, Default)]
pub struct Matrix {
    pub configurations: Vec<TestConfiguration>,
    /// Band/mode combinations dropped before enumeration reached them.
    pub skipped: usize,
}

pub fn enumerate(m: &MatrixConfig) -> Matrix {
    let mut out = Matrix::default();
    for ap in &m.aps {
        for &band in &m.bands {
            for &wifi_mode in &m.wifi_modes {
                let inner = inner_count(m);
                if !wifi_mode.supports(band) {
                    tracing::info!(
                        %band,
                        %wifi_mode,
                        skipped = inner,
                        "skipping incompatible band/mode combination"
                    );
                    out.skipped += inner;
                    continue;
                }
                for &tx_power in &m.tx_powers {
                    for &chan_5ghz in &m.chan_5ghz {
                        for &chan_24ghz in &m.chan_24ghz {
                            for &chan_width in &m.chan_widths {
                                for encryption in &m.encryptions {
                                    for ap_mode in &m.ap_modes {
                                        for &client_density in &m.client_densities {
                                            for &traffic_type in &m.traffic_types {
                                                for &direction in &m.directions {
                                                    for &packet_size in &m.packet_sizes {
                                                        out.configurations.push(TestConfiguration {
                                                            ap: ap.clone(),
                                                            band,
                                                            wifi_mode,
                                                            tx_power,
                                                            chan_5ghz,
                                                            chan_24ghz,
                                                            chan_width,
                                                            encryption: encryption.clone(),
                                                            ap_mode: ap_mode.clone(),
                                                            client_density,
                                                            traffic_type,
                                                            direction,
                                                            packet_size,
                                                        });
                                                    }
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// Configurations under one (ap, band, mode) triple.
fn inner_count(m: &MatrixConfig) -> usize {
    m.tx_powers.len()
        * m.chan_5ghz.len()
        * m.chan_24ghz.len()
        * m.chan_widths.len()
        * m.encryptions.len()
        * m.ap_modes.len()
        * m.client_densities.len()
        * m.traffic_types.len()
        * m.directions.len()
        * m.packet_sizes.len()
}

/// Test ids of every configuration, in sweep order.
pub fn listing(matrix: &Matrix) -> Vec<String> {
    matrix.configurations.iter().map(ids::test_id).collect()
}
