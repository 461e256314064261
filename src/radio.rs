// radio.rs — WaveBird radio PHY interface and channel plan

//! The WaveBird air interface:
//!
//! - Modulation: FSK + DSSS (spreading factor 15, chipping code 0x164F)
//! - Base frequency 2404.8 MHz, 2.4 MHz channel spacing, 16 channels used
//! - 96,000 bit/s, one transmission every 4 ms (250 packets/s)
//! - Framing: 0xFAAAAAAA preamble, 0x1234 sync word, then the 19-byte
//!   packet
//!
//! The demodulator strips the preamble and sync word and hands complete
//! packets to the [`Radio`] implementation's FIFO; everything above that
//! (decoding, pairing, channel policy) lives in this crate.

use crate::*;

/// Number of logical WaveBird channels.
pub const WAVEBIRD_CHANNELS: u8 = 16;

/// Mapping from WaveBird channel number to RF channel index, assuming a
/// starting frequency of 2404.8 MHz with 2.4 MHz spacing.
///
/// The map is 0-indexed; the channel dial on an OEM receiver is
/// 1-indexed.
pub const WAVEBIRD_CHANNEL_MAP: [u8; WAVEBIRD_CHANNELS as usize] = [
    31, 29, 0, 2, 6, 4, 8, 10, 14, 12, 17, 19, 23, 21, 25, 27,
];

/// The RF channel index for a logical channel, for PHY implementations.
pub fn rf_channel_index(channel: u8) -> Result<u8, RadioError> {
    WAVEBIRD_CHANNEL_MAP
        .get(channel as usize)
        .copied()
        .ok_or(RadioError::InvalidChannel)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    #[error("radio failure")]
    Failed,
    #[error("radio calibration failed")]
    Calibration,
    #[error("RX completed without a packet")]
    NoPacket,
    #[error("invalid packet length")]
    InvalidPacketLength,
    #[error("invalid channel")]
    InvalidChannel,
}

/// WaveBird radio PHY.
///
/// Implementations latch interrupt-context events (packet received, sync
/// word seen, errors) and surface them through the `take_*` methods, which
/// read and clear; only the interrupt side sets the flags and only the
/// polling side clears them, so single-word latches need no further
/// locking.
pub trait Radio {
    /// Start receiving on a logical WaveBird channel (0-15).
    fn start_rx(&mut self, channel: u8) -> Result<(), RadioError>;

    /// Stop any ongoing reception.
    fn idle(&mut self);

    /// Copy the oldest pending packet out of the RX FIFO, if any.
    fn take_packet(&mut self, packet: &mut Packet) -> bool;

    /// Was a sync word detected since the last call? Used while scanning
    /// channels for activity.
    fn take_sync_detected(&mut self) -> bool;

    /// The latest radio error, if one occurred since the last call.
    fn take_error(&mut self) -> Option<RadioError>;

    /// Monotonic microsecond clock.
    fn now_micros(&self) -> u64;
}

// EOF
