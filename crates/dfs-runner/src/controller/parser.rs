//! AP radio table parsers.
//!
//! Both controller series print a header, a dashed separator line, then one
//! row per AP radio. Rows are only considered after the separator; the first
//! row matching the requested AP (and slot, where the table has one) wins.
//! Any failure yields [`ChannelState::empty`], never an error.

use dfs_common::models::ChannelState;
use regex::Regex;

fn after_separator(text: &str) -> Option<impl Iterator<Item = &str>> {
    let mut lines = text.lines();
    lines
        .by_ref()
        .find(|line| line.trim_start().starts_with("---"))?;
    Some(lines)
}

/// `52*`, `(52)*`, `(132,136,140,144)*` → channel list, primary first.
fn parse_channel_token(token: &str) -> Option<Vec<u16>> {
    let cleaned = token.trim_matches(|c| c == '(' || c == ')' || c == '*');
    let channels = cleaned
        .split(',')
        .map(|c| c.trim().trim_end_matches('*').parse::<u16>().ok())
        .collect::<Option<Vec<_>>>()?;
    (!channels.is_empty()).then_some(channels)
}

/// Catalyst 9800: `show ap dot11 {5ghz|24ghz} summary`.
///
/// Row: `AP  mac  slot  admin  oper  width  txpwr  (dBm)  channel  mode`.
pub fn parse_9800(text: &str, ap: &str, slot: u8) -> ChannelState {
    let pattern = format!(
        r"^\s*{}\s+(\S+)\s+({})\s+\S+\s+\S+\s+(\S+)\s+(\S+)\s+\(\s*(-?\d+)\s+dBm\)\s+(\S+)",
        regex::escape(ap),
        slot
    );
    let Ok(re) = Regex::new(&pattern) else {
        return ChannelState::empty();
    };
    let Some(lines) = after_separator(text) else {
        tracing::debug!(ap, "no header separator in 9800 AP table");
        return ChannelState::empty();
    };
    for line in lines {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let Some(channels) = parse_channel_token(&caps[6]) else {
            tracing::debug!(ap, token = &caps[6], "non-numeric channel in 9800 AP table");
            return ChannelState::empty();
        };
        return ChannelState {
            channels,
            bandwidth_mhz: caps[3].parse().ok(),
            tx_power: Some(caps[4].trim_start_matches('*').to_string()),
            signal_dbm: caps[5].parse().ok(),
            mac: Some(caps[1].to_string()),
            slot: caps[2].parse().ok(),
        };
    }
    ChannelState::empty()
}

/// AireOS 3504: `show advanced 802.11{a|b} summary`.
///
/// Row: `AP  mac  slot  admin  oper  channel  txpower (dBm)`. Width is not
/// printed; it follows from the number of bonded channels.
pub fn parse_3504(text: &str, ap: &str) -> ChannelState {
    let pattern = format!(
        r"^\s*{}\s+(\S+)\s+(\d+)\s+\S+\s+\S+\s+(\S+)\s+(\S+)\s+\(\s*(-?\d+)\s+dBm",
        regex::escape(ap)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return ChannelState::empty();
    };
    let Some(lines) = after_separator(text) else {
        tracing::debug!(ap, "no header separator in 3504 AP table");
        return ChannelState::empty();
    };
    for line in lines {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let Some(channels) = parse_channel_token(&caps[3]) else {
            tracing::debug!(ap, token = &caps[3], "non-numeric channel in 3504 AP table");
            return ChannelState::empty();
        };
        let width = 20 * channels.len() as u16;
        return ChannelState {
            channels,
            bandwidth_mhz: Some(width),
            tx_power: Some(caps[4].trim_start_matches('*').to_string()),
            signal_dbm: caps[5].parse().ok(),
            mac: Some(caps[1].to_string()),
            slot: caps[2].parse().ok(),
        };
    }
    ChannelState::empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_9800: &str = include_str!("../../fixtures/show_ap_dot11_5ghz_summary_9800.txt");
    const TABLE_3504: &str = include_str!("../../fixtures/show_advanced_802_11a_summary_3504.txt");

    #[test]
    fn parses_9800_row_for_requested_slot() {
        let state = parse_9800(TABLE_9800, "APA453.0E7B.CF9C", 1);
        assert_eq!(state.channels, vec![52]);
        assert_eq!(state.bandwidth_mhz, Some(20));
        assert_eq!(state.tx_power.as_deref(), Some("1/8"));
        assert_eq!(state.signal_dbm, Some(22));
        assert_eq!(state.mac.as_deref(), Some("a453.0e7b.cf9c"));
        assert_eq!(state.slot, Some(1));
    }

    #[test]
    fn parses_9800_other_slot_and_bonded_group() {
        let two_four = parse_9800(TABLE_9800, "APA453.0E7B.CF9C", 0);
        assert_eq!(two_four.channels, vec![1]);

        let bonded = parse_9800(TABLE_9800, "APA453.0E7B.CF60", 1);
        assert_eq!(bonded.channels, vec![100, 104]);
        assert_eq!(bonded.bandwidth_mhz, Some(40));
    }

    #[test]
    fn parses_3504_row_and_derives_width() {
        let state = parse_3504(TABLE_3504, "APA453.0E7B.CF9C");
        assert_eq!(state.channels, vec![52]);
        assert_eq!(state.bandwidth_mhz, Some(20));
        assert_eq!(state.signal_dbm, Some(22));
        assert_eq!(state.mac.as_deref(), Some("a4:53:0e:7b:cf:90"));

        let bonded = parse_3504(TABLE_3504, "APA453.0E7B.CF60");
        assert_eq!(bonded.channels, vec![132, 136, 140, 144]);
        assert_eq!(bonded.bandwidth_mhz, Some(80));
    }

    #[test]
    fn unknown_ap_yields_empty_state() {
        assert!(!parse_9800(TABLE_9800, "APFFFF.FFFF.FFFF", 1).is_known());
        assert!(!parse_3504(TABLE_3504, "APFFFF.FFFF.FFFF").is_known());
    }

    #[test]
    fn ap_name_prefix_does_not_match() {
        assert!(!parse_3504(TABLE_3504, "APA453.0E7B.CF9").is_known());
    }

    #[test]
    fn missing_separator_yields_empty_state() {
        let headless: String = TABLE_3504
            .lines()
            .filter(|l| !l.starts_with("---"))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(!parse_3504(&headless, "APA453.0E7B.CF9C").is_known());
        assert!(!parse_9800("", "APA453.0E7B.CF9C", 1).is_known());
    }

    #[test]
    fn non_numeric_channel_yields_empty_state() {
        let text = "---\nAP1  aa:bb  1  ENABLED  UP  auto*  1/8 ( 22 dBm)\n";
        assert!(!parse_3504(text, "AP1").is_known());
    }

    #[test]
    fn channel_tokens() {
        assert_eq!(parse_channel_token("52*"), Some(vec![52]));
        assert_eq!(parse_channel_token("(36,40)*"), Some(vec![36, 40]));
        assert_eq!(parse_channel_token("149"), Some(vec![149]));
        assert_eq!(parse_channel_token("n/a"), None);
    }
}
