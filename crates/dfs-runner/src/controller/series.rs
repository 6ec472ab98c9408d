//! Controller series.
//!
//! Each series owns its configuration step order and its AP table format.
//! Adding a series means adding a variant here; sequencing code only sees
//! [`Step`] lists and [`ChannelState`]s.

use dfs_common::models::{Band, ChannelState, ControllerFields};

use super::command::Action;
use super::parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerSeries {
    /// Catalyst 9800 (IOS-XE).
    Series9800,
    /// AireOS 3504.
    Series3504,
}

/// One remote command in a configuration sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub value: Option<String>,
}

impl Step {
    fn new(action: Action) -> Self {
        Self {
            action,
            value: None,
        }
    }

    fn with(action: Action, value: impl ToString) -> Self {
        Self {
            action,
            value: Some(value.to_string()),
        }
    }
}

impl ControllerSeries {
    /// Whether the sequence pins the radio to the manual RF role.
    pub fn pins_rf_role(self) -> bool {
        matches!(self, ControllerSeries::Series9800)
    }

    pub fn parse_channel_state(self, text: &str, ap: &str, band: Band) -> ChannelState {
        match self {
            ControllerSeries::Series9800 => parser::parse_9800(text, ap, band.slot()),
            ControllerSeries::Series3504 => parser::parse_3504(text, ap),
        }
    }

    /// Ordered steps that take the controller from an unknown state to
    /// `fields`. Width is forced to 20 MHz before the channel change and set
    /// to its final value afterwards.
    pub fn sequence_steps(self, fields: &ControllerFields) -> Vec<Step> {
        let channel = fields.active_channel();
        match self {
            ControllerSeries::Series9800 => {
                let enable_network = match fields.band {
                    Band::FiveGhz => Action::EnableNetwork5ghz,
                    Band::TwoGhz => Action::EnableNetwork24ghz,
                };
                vec![
                    Step::new(Action::Disable),
                    Step::new(Action::DisableWlan),
                    Step::new(Action::DisableNetwork5ghz),
                    Step::new(Action::DisableNetwork24ghz),
                    Step::new(Action::Manual),
                    Step::with(Action::TxPower, fields.tx_power),
                    Step::with(Action::Bandwidth, 20),
                    Step::with(Action::Channel, channel),
                    Step::with(Action::Bandwidth, fields.chan_width),
                    Step::new(Action::CreateWlan),
                    Step::new(Action::WirelessTagPolicy),
                    Step::new(Action::EnableWlan),
                    Step::new(enable_network),
                    Step::new(Action::Enable),
                ]
            }
            ControllerSeries::Series3504 => {
                let ieee = match fields.band {
                    Band::FiveGhz => "802.11a",
                    Band::TwoGhz => "802.11b",
                };
                vec![
                    Step::new(Action::Disable),
                    Step::with(Action::Cmd, "config 802.11a disable network"),
                    Step::with(Action::Cmd, "config 802.11b disable network"),
                    Step::with(Action::TxPower, fields.tx_power),
                    Step::with(Action::Bandwidth, 20),
                    Step::with(Action::Channel, channel),
                    Step::with(Action::Bandwidth, fields.chan_width),
                    Step::with(Action::Cmd, format!("config {ieee} enable network")),
                    Step::new(Action::Enable),
                ]
            }
        }
    }
}

impl std::fmt::Display for ControllerSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerSeries::Series9800 => write!(f, "9800"),
            ControllerSeries::Series3504 => write!(f, "3504"),
        }
    }
}

impl std::str::FromStr for ControllerSeries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "9800" => Ok(ControllerSeries::Series9800),
            "3504" => Ok(ControllerSeries::Series3504),
            other => Err(format!("unknown controller series: {other}")),
        }
    }
}
