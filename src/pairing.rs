// pairing.rs — virtual pairing and radio event processing

//! An OEM WaveBird receiver binds to its transmitter with a 16-position
//! channel dial. Virtual pairing replaces the dial with software: once
//! started, the receiver sweeps all 16 channels listening for sync words,
//! holds on any channel with activity, and counts packets that pass a
//! qualification policy. Reaching the qualification threshold selects the
//! channel; running out of time falls back to the previous one.

use crate::*;

// Pairing timeouts, in microseconds
const PAIRING_TIMEOUT: u64 = 30_000_000;
const PAIRING_DETECT_TIMEOUT: u64 = 10_000;
const PAIRING_QUALIFY_TIMEOUT: u64 = 200_000;

/// Default number of packets that must qualify before pairing succeeds.
pub const DEFAULT_QUALIFY_THRESHOLD: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    Success,
    Cancelled,
    Timeout,
}

/// Outcome of a pairing attempt that ended on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingFinished {
    pub status: PairingStatus,
    pub channel: u8,
}

/// Qualification applied to packets while holding on a candidate channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualifyPolicy {
    /// Count every received packet.
    #[default]
    AcceptAll,
    /// Count only input state messages with all of these buttons held,
    /// so a receiver only binds to a controller deliberately put into
    /// pairing (e.g. X and Y held down).
    InputWithButtons(u16),
}

impl QualifyPolicy {
    fn qualifies(&self, codec: &PacketCodec, packet: &Packet) -> bool {
        match *self {
            QualifyPolicy::AcceptAll => true,
            QualifyPolicy::InputWithButtons(mask) => match codec.decode(packet) {
                Ok(message) => {
                    message.message_type() == MessageType::InputState
                        && message.buttons() & mask == mask
                }
                Err(_) => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Scanning,
    Qualifying,
    Active,
}

/// WaveBird radio front end: channel control, packet reception, and the
/// virtual pairing scan loop, layered over a [`Radio`] PHY.
pub struct WavebirdRadio<R: Radio> {
    phy: R,
    state: RxState,
    channel: u8,
    qualify: QualifyPolicy,
    qualify_threshold: u8,

    // Pairing scan state
    first_scan: bool,
    candidate: u8,
    timeout: u64,
    detect_timeout: u64,
    qualify_timeout: u64,
    qualified_packets: u8,
}

impl<R: Radio> WavebirdRadio<R> {
    pub fn new(phy: R) -> Self {
        Self {
            phy,
            state: RxState::Idle,
            channel: 0,
            qualify: QualifyPolicy::default(),
            qualify_threshold: DEFAULT_QUALIFY_THRESHOLD,
            first_scan: false,
            candidate: 0,
            timeout: 0,
            detect_timeout: 0,
            qualify_timeout: 0,
            qualified_packets: 0,
        }
    }

    pub fn phy(&self) -> &R {
        &self.phy
    }

    pub fn phy_mut(&mut self) -> &mut R {
        &mut self.phy
    }

    pub fn now_micros(&self) -> u64 {
        self.phy.now_micros()
    }

    /// The currently selected channel, 0-15.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Set the radio channel and start packet reception on it.
    pub fn set_channel(&mut self, channel: u8) -> Result<(), RadioError> {
        if channel >= WAVEBIRD_CHANNELS {
            return Err(RadioError::InvalidChannel);
        }

        self.phy.start_rx(channel)?;
        self.channel = channel;
        self.state = RxState::Active;
        Ok(())
    }

    /// Configure pairing packet qualification.
    pub fn configure_qualification(&mut self, qualify: QualifyPolicy, threshold: u8) {
        self.qualify = qualify;
        self.qualify_threshold = threshold;
    }

    /// Begin the virtual pairing scan.
    pub fn start_pairing(&mut self) {
        self.phy.idle();

        self.timeout = self.phy.now_micros() + PAIRING_TIMEOUT;
        self.first_scan = true;
        self.candidate = 0;
        self.qualified_packets = 0;

        self.state = RxState::Scanning;
        info!("pairing: scanning for a transmitter");
    }

    /// Abort pairing and resume reception on the previous channel.
    pub fn stop_pairing(&mut self) -> Result<(), RadioError> {
        info!("pairing: cancelled");
        self.set_channel(self.channel)
    }

    pub fn pairing_in_progress(&self) -> bool {
        matches!(self.state, RxState::Scanning | RxState::Qualifying)
    }

    /// Drive the scan state machine. Call periodically; returns the
    /// outcome when a pairing attempt finishes on its own.
    pub fn process(&mut self, codec: &PacketCodec) -> Option<PairingFinished> {
        let now = self.phy.now_micros();
        match self.state {
            RxState::Idle | RxState::Active => None,
            RxState::Scanning => self.process_scanning(now),
            RxState::Qualifying => self.process_qualifying(now, codec),
        }
    }

    // Sweep channels, listening for sync words.
    fn process_scanning(&mut self, now: u64) -> Option<PairingFinished> {
        // Activity on the candidate channel: hold and qualify it
        if self.phy.take_sync_detected() {
            self.qualify_timeout = now + PAIRING_QUALIFY_TIMEOUT;
            self.state = RxState::Qualifying;
            debug!("pairing: activity on channel {}", self.candidate + 1);
            return None;
        }

        // Out of time: fall back to the previously selected channel
        if now > self.timeout {
            info!("pairing: timed out");
            if let Err(e) = self.set_channel(self.channel) {
                warn!("pairing: failed to restore channel: {e}");
            }
            return Some(PairingFinished {
                status: PairingStatus::Timeout,
                channel: self.channel,
            });
        }

        // Advance to the next channel once the detect window has elapsed
        if self.first_scan || now > self.detect_timeout {
            if self.first_scan {
                self.first_scan = false;
            } else {
                self.candidate = (self.candidate + 1) % WAVEBIRD_CHANNELS;
            }

            self.detect_timeout = now + PAIRING_DETECT_TIMEOUT;
            if let Err(e) = self.phy.start_rx(self.candidate) {
                warn!("pairing: failed to scan channel {}: {e}", self.candidate + 1);
            }
        }

        None
    }

    // Hold on a channel long enough to count qualifying packets.
    fn process_qualifying(&mut self, now: u64, codec: &PacketCodec) -> Option<PairingFinished> {
        let mut packet = [0u8; PACKET_BYTES];
        while self.phy.take_packet(&mut packet) {
            if self.qualify.qualifies(codec, &packet) {
                self.qualified_packets += 1;
            }

            if self.qualified_packets >= self.qualify_threshold {
                let channel = self.candidate;
                if let Err(e) = self.set_channel(channel) {
                    warn!("pairing: failed to select channel: {e}");
                }
                info!("pairing: paired on channel {}", channel + 1);
                return Some(PairingFinished {
                    status: PairingStatus::Success,
                    channel,
                });
            }
        }

        // No (or not enough) qualifying traffic; resume scanning
        if now > self.qualify_timeout {
            self.qualified_packets = 0;
            self.state = RxState::Scanning;
        }

        None
    }

    /// Copy out the oldest pending packet while actively receiving.
    pub fn take_packet(&mut self, packet: &mut Packet) -> bool {
        self.state == RxState::Active && self.phy.take_packet(packet)
    }

    /// The latest radio error while actively receiving.
    pub fn take_error(&mut self) -> Option<RadioError> {
        if self.state == RxState::Active {
            self.phy.take_error()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Deque;

    struct FakePhy {
        now: u64,
        fifo: Deque<Packet, 8>,
        sync_detected: bool,
        error: Option<RadioError>,
        rx_channel: Option<u8>,
        idled: u32,
    }

    impl FakePhy {
        fn new() -> Self {
            Self {
                now: 0,
                fifo: Deque::new(),
                sync_detected: false,
                error: None,
                rx_channel: None,
                idled: 0,
            }
        }
    }

    impl Radio for FakePhy {
        fn start_rx(&mut self, channel: u8) -> Result<(), RadioError> {
            rf_channel_index(channel)?;
            self.rx_channel = Some(channel);
            Ok(())
        }

        fn idle(&mut self) {
            self.rx_channel = None;
            self.idled += 1;
        }

        fn take_packet(&mut self, packet: &mut Packet) -> bool {
            match self.fifo.pop_front() {
                Some(pending) => {
                    *packet = pending;
                    true
                }
                None => false,
            }
        }

        fn take_sync_detected(&mut self) -> bool {
            core::mem::take(&mut self.sync_detected)
        }

        fn take_error(&mut self) -> Option<RadioError> {
            self.error.take()
        }

        fn now_micros(&self) -> u64 {
            self.now
        }
    }

    fn pairing_packet() -> Packet {
        let message = Message::input_state(
            0x2B1,
            WB_BUTTONS_X | WB_BUTTONS_Y,
            &[0x80, 0x80, 0x80, 0x80, 0, 0],
        );
        PacketCodec::new().encode(&message)
    }

    fn radio_in_scan() -> WavebirdRadio<FakePhy> {
        let mut radio = WavebirdRadio::new(FakePhy::new());
        radio.configure_qualification(
            QualifyPolicy::InputWithButtons(WB_BUTTONS_X | WB_BUTTONS_Y),
            DEFAULT_QUALIFY_THRESHOLD,
        );
        radio.set_channel(3).unwrap();
        radio.start_pairing();
        radio
    }

    #[test]
    fn set_channel_validates_range() {
        let mut radio = WavebirdRadio::new(FakePhy::new());
        assert_eq!(radio.set_channel(16), Err(RadioError::InvalidChannel));
        radio.set_channel(15).unwrap();
        assert_eq!(radio.channel(), 15);
        assert_eq!(radio.phy().rx_channel, Some(15));
    }

    #[test]
    fn scan_advances_channels_on_detect_timeout() {
        let codec = PacketCodec::new();
        let mut radio = radio_in_scan();

        // First tick listens on channel 0 without waiting
        assert!(radio.process(&codec).is_none());
        assert_eq!(radio.phy().rx_channel, Some(0));

        // Nothing heard inside the detect window: move on
        radio.phy_mut().now += PAIRING_DETECT_TIMEOUT + 1;
        radio.process(&codec);
        assert_eq!(radio.phy().rx_channel, Some(1));

        // The sweep wraps around all 16 channels
        for _ in 0..15 {
            radio.phy_mut().now += PAIRING_DETECT_TIMEOUT + 1;
            radio.process(&codec);
        }
        assert_eq!(radio.phy().rx_channel, Some(0));
    }

    #[test]
    fn qualifying_packets_select_the_candidate_channel() {
        let codec = PacketCodec::new();
        let mut radio = radio_in_scan();

        // Sweep to channel 2, then hear a sync word there
        radio.process(&codec);
        for _ in 0..2 {
            radio.phy_mut().now += PAIRING_DETECT_TIMEOUT + 1;
            radio.process(&codec);
        }
        assert_eq!(radio.phy().rx_channel, Some(2));
        radio.phy_mut().sync_detected = true;
        radio.process(&codec);
        assert!(radio.pairing_in_progress());

        // Five qualifying packets complete the pairing
        for _ in 0..DEFAULT_QUALIFY_THRESHOLD {
            radio.phy_mut().fifo.push_back(pairing_packet()).unwrap();
        }
        let finished = radio.process(&codec).unwrap();
        assert_eq!(finished.status, PairingStatus::Success);
        assert_eq!(finished.channel, 2);
        assert_eq!(radio.channel(), 2);
        assert!(!radio.pairing_in_progress());
    }

    #[test]
    fn unqualified_packets_do_not_pair() {
        let codec = PacketCodec::new();
        let mut radio = radio_in_scan();

        radio.process(&codec);
        radio.phy_mut().sync_detected = true;
        radio.process(&codec);

        // Packets without the pairing buttons held are ignored
        let message = Message::input_state(0x2B1, 0, &[0x80, 0x80, 0x80, 0x80, 0, 0]);
        for _ in 0..8 {
            radio
                .phy_mut()
                .fifo
                .push_back(PacketCodec::new().encode(&message))
                .unwrap();
        }
        assert!(radio.process(&codec).is_none());
        assert!(radio.pairing_in_progress());

        // And the qualify window expiring resumes the sweep
        radio.phy_mut().now += PAIRING_QUALIFY_TIMEOUT + 1;
        assert!(radio.process(&codec).is_none());
        assert_eq!(radio.state, RxState::Scanning);
    }

    #[test]
    fn pairing_times_out_to_the_previous_channel() {
        let codec = PacketCodec::new();
        let mut radio = radio_in_scan();

        radio.process(&codec);
        radio.phy_mut().now += PAIRING_TIMEOUT + 1;
        let finished = radio.process(&codec).unwrap();

        assert_eq!(finished.status, PairingStatus::Timeout);
        assert_eq!(finished.channel, 3);
        assert_eq!(radio.phy().rx_channel, Some(3));
    }

    #[test]
    fn stop_pairing_restores_the_previous_channel() {
        let codec = PacketCodec::new();
        let mut radio = radio_in_scan();
        // Starting the scan idles the ongoing reception first
        assert_eq!(radio.phy().idled, 1);
        radio.process(&codec);

        radio.stop_pairing().unwrap();
        assert!(!radio.pairing_in_progress());
        assert_eq!(radio.phy().rx_channel, Some(3));
    }

    #[test]
    fn packets_are_only_surfaced_while_active() {
        let mut radio = WavebirdRadio::new(FakePhy::new());
        radio.phy_mut().fifo.push_back(pairing_packet()).unwrap();

        let mut packet = [0u8; PACKET_BYTES];
        assert!(!radio.take_packet(&mut packet));

        radio.set_channel(0).unwrap();
        assert!(radio.take_packet(&mut packet));
        assert_eq!(packet, pairing_packet());
    }
}
// EOF
