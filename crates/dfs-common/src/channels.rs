//! Channel tables.
//!
//! The radar stimulus tool is tuned by center frequency (kHz), so every
//! 5 GHz channel a sweep may target has to resolve through
//! [`frequency_for`]. The lookup fails closed: a channel outside the table
//! is an error, never a default frequency.

use thiserror::Error;

use crate::error::{Classify, Severity};

/// Channels that require radar detection and a channel availability check.
pub const DFS_CHANNELS: &[u16] = &[
    52, 56, 60, 64, 68, 96, 100, 104, 108, 112, 116, 120, 124, 128, 132, 136, 140, 144,
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel {0} has no mapped center frequency")]
    Unmapped(u16),
}

impl Classify for ChannelError {
    fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

/// A center frequency in kHz, formatted the way the radar tool expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency(u32);

impl Frequency {
    pub fn khz(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Center frequency for a 5 GHz channel.
pub fn frequency_for(channel: u16) -> Result<Frequency, ChannelError> {
    let khz = match channel {
        36 => 5_180_000,
        38 => 5_190_000,
        40 => 5_200_000,
        42 => 5_210_000,
        44 => 5_220_000,
        46 => 5_230_000,
        48 => 5_240_000,
        52 => 5_260_000,
        56 => 5_280_000,
        60 => 5_300_000,
        64 => 5_320_000,
        100 => 5_500_000,
        104 => 5_520_000,
        108 => 5_540_000,
        112 => 5_560_000,
        116 => 5_580_000,
        120 => 5_600_000,
        124 => 5_620_000,
        128 => 5_640_000,
        132 => 5_660_000,
        136 => 5_680_000,
        140 => 5_700_000,
        144 => 5_720_000,
        149 => 5_745_000,
        153 => 5_765_000,
        157 => 5_785_000,
        161 => 5_805_000,
        165 => 5_825_000,
        169 => 5_845_000,
        173 => 5_865_000,
        other => return Err(ChannelError::Unmapped(other)),
    };
    Ok(Frequency(khz))
}

pub fn is_dfs(channel: u16) -> bool {
    DFS_CHANNELS.contains(&channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_channels_resolve() {
        assert_eq!(frequency_for(52).unwrap().to_string(), "5260000");
        assert_eq!(frequency_for(149).unwrap().to_string(), "5745000");
        assert_eq!(frequency_for(36).unwrap().khz(), 5_180_000);
        assert_eq!(frequency_for(173).unwrap().khz(), 5_865_000);
    }

    #[test]
    fn unmapped_channel_fails_closed() {
        assert_eq!(frequency_for(37), Err(ChannelError::Unmapped(37)));
        assert!(frequency_for(6).is_err());
        assert_eq!(ChannelError::Unmapped(37).severity(), Severity::Fatal);
    }

    #[test]
    fn lookup_is_total_over_mapped_set() {
        let mapped = [
            36, 38, 40, 42, 44, 46, 48, 52, 56, 60, 64, 100, 104, 108, 112, 116, 120, 124, 128,
            132, 136, 140, 144, 149, 153, 157, 161, 165, 169, 173,
        ];
        let mut last = 0;
        for ch in mapped {
            let f = frequency_for(ch).unwrap().khz();
            assert!(f > last, "frequencies must increase with channel");
            last = f;
        }
    }

    #[test]
    fn dfs_membership() {
        assert!(is_dfs(52));
        assert!(is_dfs(144));
        assert!(!is_dfs(36));
        assert!(!is_dfs(149));
    }
}
