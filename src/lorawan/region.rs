use heapless::Vec;

use crate::transport::{ModulationParams, TxParams};

use super::phy::CfList;

/// Data rate and channel indices of a transmission, as used in the 1.1 B1 block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BandIndices {
    /// Data rate index (TxDr)
    pub data_rate: u8,
    /// Channel index (TxCh)
    pub channel: u8,
}

/// Regional plan mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// No enabled channel at this frequency
    #[error("no channel at {frequency} Hz")]
    UnknownChannel {
        /// Frequency in Hz
        frequency: u32,
    },
    /// No data rate with this modulation
    #[error("no data rate for SF{spreading_factor} / {bandwidth} Hz")]
    UnknownDataRate {
        /// Spreading factor
        spreading_factor: u8,
        /// Bandwidth in Hz
        bandwidth: u32,
    },
}

/// Uplink channel of a band plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Channel frequency in Hz
    pub frequency: u32,
    /// Minimum data rate index
    pub min_dr: u8,
    /// Maximum data rate index
    pub max_dr: u8,
    /// Whether the channel is enabled
    pub enabled: bool,
}

impl Channel {
    const fn new(frequency: u32, min_dr: u8, max_dr: u8) -> Self {
        Self {
            frequency,
            min_dr,
            max_dr,
            enabled: true,
        }
    }
}

/// Regional band resolver
pub trait Region {
    /// Band plan name
    fn name(&self) -> &'static str;

    /// Data rate index of a modulation
    fn data_rate_index(&self, modulation: &ModulationParams) -> Option<u8>;

    /// Index of the enabled uplink channel at `frequency`
    fn channel_index(&self, frequency: u32) -> Option<u8>;

    /// Resolve the data rate and channel indices of a transmission
    fn resolve(&self, tx: &TxParams) -> Result<BandIndices, RegionError> {
        let data_rate =
            self.data_rate_index(&tx.modulation)
                .ok_or(RegionError::UnknownDataRate {
                    spreading_factor: tx.modulation.spreading_factor,
                    bandwidth: tx.modulation.bandwidth,
                })?;
        let channel = self
            .channel_index(tx.frequency)
            .ok_or(RegionError::UnknownChannel {
                frequency: tx.frequency,
            })?;
        Ok(BandIndices { data_rate, channel })
    }

    /// Apply a join-accept channel list
    fn apply_cf_list(&mut self, _cf_list: &CfList) {}
}

/// EU863-870 data rates: DR0..DR5 are SF12..SF7 at 125 kHz, DR6 is SF7 at 250 kHz
const EU868_DATA_RATES: [(u8, u32); 7] = [
    (12, 125_000),
    (11, 125_000),
    (10, 125_000),
    (9, 125_000),
    (8, 125_000),
    (7, 125_000),
    (7, 250_000),
];

/// EU863-870 band plan
#[derive(Debug, Clone)]
pub struct EU868 {
    /// Three default channels plus up to 13 added ones
    channels: Vec<Channel, 16>,
}

impl Default for EU868 {
    fn default() -> Self {
        let mut channels = Vec::new();
        for frequency in [868_100_000, 868_300_000, 868_500_000] {
            // Capacity 16 holds the three default channels
            let _ = channels.push(Channel::new(frequency, 0, 5));
        }
        Self { channels }
    }
}

impl EU868 {
    /// Create a band plan with the three default channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the channel at `index`; returns false when out of range
    pub fn set_channel(&mut self, index: usize, frequency: u32) -> bool {
        if index >= self.channels.capacity() {
            return false;
        }
        while self.channels.len() <= index {
            if self.channels.push(Channel::new(0, 0, 5)).is_err() {
                return false;
            }
            if let Some(last) = self.channels.last_mut() {
                last.enabled = false;
            }
        }
        self.channels[index] = Channel {
            frequency,
            min_dr: 0,
            max_dr: 5,
            enabled: frequency != 0,
        };
        true
    }

    /// Uplink channels
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

impl Region for EU868 {
    fn name(&self) -> &'static str {
        "EU868"
    }

    fn data_rate_index(&self, modulation: &ModulationParams) -> Option<u8> {
        EU868_DATA_RATES
            .iter()
            .position(|&(sf, bw)| {
                sf == modulation.spreading_factor && bw == modulation.bandwidth
            })
            .map(|i| i as u8)
    }

    fn channel_index(&self, frequency: u32) -> Option<u8> {
        self.channels
            .iter()
            .position(|c| c.enabled && c.frequency == frequency)
            .map(|i| i as u8)
    }

    fn apply_cf_list(&mut self, cf_list: &CfList) {
        if let CfList::Frequencies(freqs) = cf_list {
            for (i, &frequency) in freqs.iter().enumerate() {
                self.set_channel(3 + i, frequency);
            }
        }
    }
}

/// US902-928 data rate identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    /// DR0
    SF10BW125,
    /// DR1
    SF9BW125,
    /// DR2
    SF8BW125,
    /// DR3
    SF7BW125,
    /// DR4
    SF8BW500,
}

impl DataRate {
    const ALL: [DataRate; 5] = [
        DataRate::SF10BW125,
        DataRate::SF9BW125,
        DataRate::SF8BW125,
        DataRate::SF7BW125,
        DataRate::SF8BW500,
    ];

    /// Get spreading factor
    pub fn spreading_factor(&self) -> u8 {
        match self {
            DataRate::SF10BW125 => 10,
            DataRate::SF9BW125 => 9,
            DataRate::SF8BW125 => 8,
            DataRate::SF7BW125 => 7,
            DataRate::SF8BW500 => 8,
        }
    }

    /// Get bandwidth in Hz
    pub fn bandwidth(&self) -> u32 {
        match self {
            DataRate::SF8BW500 => 500_000,
            _ => 125_000,
        }
    }

    /// Data rate index
    pub fn index(&self) -> u8 {
        *self as u8
    }
}

/// US902-928 band plan
#[derive(Debug, Clone)]
pub struct US915 {
    /// Upstream channels (64 + 8 channels)
    channels: Vec<Channel, 72>,
}

impl Default for US915 {
    fn default() -> Self {
        let mut channels = Vec::new();

        // 64 125 kHz upstream channels
        for i in 0..64u32 {
            let _ = channels.push(Channel::new(902_300_000 + i * 200_000, 0, 3));
        }

        // 8 500 kHz upstream channels
        for i in 0..8u32 {
            let _ = channels.push(Channel::new(903_000_000 + i * 1_600_000, 4, 4));
        }

        Self { channels }
    }
}

impl US915 {
    /// Create a band plan with all 72 channels enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable only the eight 125 kHz channels of one sub-band (0-7) and its 500 kHz channel
    pub fn set_sub_band(&mut self, sub_band: u8) {
        let sub_band = sub_band.min(7) as usize;
        for (i, channel) in self.channels.iter_mut().enumerate() {
            channel.enabled = if i < 64 { i / 8 == sub_band } else { i - 64 == sub_band };
        }
    }

    /// Uplink channels
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

impl Region for US915 {
    fn name(&self) -> &'static str {
        "US915"
    }

    fn data_rate_index(&self, modulation: &ModulationParams) -> Option<u8> {
        DataRate::ALL
            .iter()
            .find(|dr| {
                dr.spreading_factor() == modulation.spreading_factor
                    && dr.bandwidth() == modulation.bandwidth
            })
            .map(DataRate::index)
    }

    fn channel_index(&self, frequency: u32) -> Option<u8> {
        self.channels
            .iter()
            .position(|c| c.enabled && c.frequency == frequency)
            .map(|i| i as u8)
    }

    fn apply_cf_list(&mut self, cf_list: &CfList) {
        if let CfList::ChannelMask(masks) = cf_list {
            for (i, channel) in self.channels.iter_mut().enumerate() {
                let mask = masks.get(i / 16).copied().unwrap_or(0);
                channel.enabled = mask & (1 << (i % 16)) != 0;
            }
        }
    }
}
