//! Decoder configuration

use crate::runtime::BitState;
use crate::{QspiError, Result};

use super::types::LineMode;

/// Capture channel assignment
///
/// Channel numbers index the host's capture. Enable, DQ2 and DQ3 are optional;
/// DQ0 and DQ1 may be left out too, in which case their bits are omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap {
    pub enable: Option<usize>,
    pub clock: usize,
    pub dq: [Option<usize>; 4],
}

impl ChannelMap {
    /// Assigned channels as `(label, channel)` pairs
    pub fn assigned(&self) -> Vec<(&'static str, usize)> {
        let labels = ["DQ0", "DQ1", "DQ2", "DQ3"];
        let mut assigned = vec![("CLOCK", self.clock)];
        if let Some(enable) = self.enable {
            assigned.insert(0, ("ENABLE", enable));
        }
        for (label, channel) in labels.into_iter().zip(self.dq) {
            if let Some(channel) = channel {
                assigned.push((label, channel));
            }
        }
        assigned
    }

    /// Highest channel number in use
    pub fn max_channel(&self) -> usize {
        self.assigned()
            .into_iter()
            .map(|(_, channel)| channel)
            .max()
            .unwrap_or(self.clock)
    }
}

impl Default for ChannelMap {
    /// CS=0, CLK=1, DQ0..DQ3=2..5
    fn default() -> Self {
        Self {
            enable: Some(0),
            clock: 1,
            dq: [Some(2), Some(3), Some(4), Some(5)],
        }
    }
}

/// Decoder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QspiSettings {
    pub channels: ChannelMap,
    /// Clock level while idle (CPOL)
    pub clock_inactive_state: BitState,
    pub mode: LineMode,
    /// Dummy clock cycles, 1..=15
    pub dummy_cycles: u32,
    /// Address width in bytes, 3 or 4
    pub address_size: u32,
}

impl QspiSettings {
    pub const MIN_DUMMY_CYCLES: u32 = 1;
    pub const MAX_DUMMY_CYCLES: u32 = 15;

    pub fn new(channels: ChannelMap) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: LineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_clock_inactive_state(mut self, state: BitState) -> Self {
        self.clock_inactive_state = state;
        self
    }

    pub fn with_dummy_cycles(mut self, cycles: u32) -> Self {
        self.dummy_cycles = cycles;
        self
    }

    pub fn with_address_size(mut self, bytes: u32) -> Self {
        self.address_size = bytes;
        self
    }

    /// Address phase width in bits
    pub fn address_bits(&self) -> u32 {
        self.address_size * 8
    }

    /// Check ranges and that no channel is assigned twice.
    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_DUMMY_CYCLES..=Self::MAX_DUMMY_CYCLES).contains(&self.dummy_cycles) {
            return Err(QspiError::InvalidSettings(format!(
                "dummy cycle count {} outside {}..={}",
                self.dummy_cycles,
                Self::MIN_DUMMY_CYCLES,
                Self::MAX_DUMMY_CYCLES
            )));
        }

        if !matches!(self.address_size, 3 | 4) {
            return Err(QspiError::InvalidSettings(format!(
                "address size must be 3 or 4 bytes, got {}",
                self.address_size
            )));
        }

        let assigned = self.channels.assigned();
        for (i, (label, channel)) in assigned.iter().enumerate() {
            if let Some((other, _)) = assigned[i + 1..].iter().find(|(_, c)| c == channel) {
                return Err(QspiError::InvalidSettings(format!(
                    "{} and {} both use channel {}; select different channels for each input",
                    label, other, channel
                )));
            }
        }

        Ok(())
    }
}

impl Default for QspiSettings {
    fn default() -> Self {
        Self {
            channels: ChannelMap::default(),
            clock_inactive_state: BitState::Low,
            mode: LineMode::Extended,
            dummy_cycles: 8,
            address_size: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = QspiSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.mode, LineMode::Extended);
        assert_eq!(settings.clock_inactive_state, BitState::Low);
        assert_eq!(settings.dummy_cycles, 8);
        assert_eq!(settings.address_bits(), 24);
    }

    #[test]
    fn test_dummy_cycle_range() {
        assert!(QspiSettings::default().with_dummy_cycles(1).validate().is_ok());
        assert!(QspiSettings::default().with_dummy_cycles(15).validate().is_ok());
        assert!(QspiSettings::default().with_dummy_cycles(0).validate().is_err());
        assert!(QspiSettings::default().with_dummy_cycles(16).validate().is_err());
    }

    #[test]
    fn test_address_size() {
        assert_eq!(
            QspiSettings::default().with_address_size(4).address_bits(),
            32
        );
        assert!(QspiSettings::default().with_address_size(2).validate().is_err());
    }

    #[test]
    fn test_overlapping_channels_rejected() {
        let channels = ChannelMap {
            enable: Some(0),
            clock: 1,
            dq: [Some(2), Some(1), None, None],
        };
        let err = QspiSettings::new(channels).validate().unwrap_err();
        assert!(err.to_string().contains("channel 1"));
    }

    #[test]
    fn test_assigned_channels() {
        let channels = ChannelMap {
            enable: None,
            clock: 4,
            dq: [Some(0), Some(7), None, None],
        };
        assert_eq!(
            channels.assigned(),
            vec![("CLOCK", 4), ("DQ0", 0), ("DQ1", 7)]
        );
        assert_eq!(channels.max_channel(), 7);
    }
}
