// receiver.rs — ties radio packets, device state, and SI serving together

use crate::*;

/// How long a received input state stays valid, in microseconds. Past
/// this the SI handlers fall back to serving the origin, so a controller
/// going out of range does not leave its last inputs stuck down.
const INPUT_VALID_US: u64 = 100_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStats {
    pub packets: u32,
    pub radio_errors: u32,
    pub decode_errors: u32,
}

/// Events surfaced to the embedding firmware; LED effects and settings
/// storage live there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// A valid packet arrived (blink the status LED).
    PacketReceived,
    /// A pairing attempt ran to completion.
    PairingFinished { status: PairingStatus, channel: u8 },
    /// Settings changed; persist them.
    SettingsChanged,
}

enum ControllerPort {
    GameCube(CommandProcessor<GcController>),
    N64(CommandProcessor<N64Controller>),
}

impl ControllerPort {
    fn process(&mut self, bus: &mut dyn SiBus) {
        match self {
            ControllerPort::GameCube(port) => port.process(bus),
            ControllerPort::N64(port) => port.process(bus),
        }
    }
}

/// WaveBird receiver: decodes radio traffic into controller state and
/// serves it to the console over the SI bus.
pub struct Receiver<R: Radio, B: SiBus> {
    radio: WavebirdRadio<R>,
    bus: B,
    codec: PacketCodec,
    port: ControllerPort,
    settings: Settings,
    stats: PacketStats,
    si_enabled: bool,
    input_valid_until: u64,
    first_seen_id: Option<u16>,
}

impl<R: Radio, B: SiBus> Receiver<R, B> {
    pub fn new(phy: R, bus: B, settings: Settings) -> WbResult<Self> {
        let mut radio = WavebirdRadio::new(phy);
        radio.configure_qualification(
            QualifyPolicy::InputWithButtons(settings.pair_buttons),
            DEFAULT_QUALIFY_THRESHOLD,
        );
        radio.set_channel(settings.channel)?;

        info!(
            "receiver: channel {}, presenting as {:?}",
            settings.channel + 1,
            settings.controller_type
        );

        Ok(Self {
            radio,
            bus,
            codec: PacketCodec::new(),
            port: make_port(settings.controller_type),
            settings,
            stats: PacketStats::default(),
            si_enabled: true,
            input_valid_until: 0,
            first_seen_id: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &PacketStats {
        &self.stats
    }

    pub fn radio(&self) -> &WavebirdRadio<R> {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut WavebirdRadio<R> {
        &mut self.radio
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// The GameCube device record, when presenting as one.
    pub fn gc_device(&self) -> Option<&GcController> {
        match &self.port {
            ControllerPort::GameCube(port) => Some(port.device()),
            ControllerPort::N64(_) => None,
        }
    }

    /// The N64 device record, when presenting as one.
    pub fn n64_device(&self) -> Option<&N64Controller> {
        match &self.port {
            ControllerPort::N64(port) => Some(port.device()),
            ControllerPort::GameCube(_) => None,
        }
    }

    /// Change the radio channel, e.g. from a channel selection wheel.
    pub fn set_channel(&mut self, channel: u8) -> WbResult<()> {
        self.radio.set_channel(channel)?;
        Ok(())
    }

    /// Begin virtual pairing. SI command handling is suspended until the
    /// attempt finishes so a half-configured state is never served.
    pub fn start_pairing(&mut self) {
        self.radio.start_pairing();
        self.si_enabled = false;
    }

    /// Cancel an in-progress pairing and resume on the previous channel.
    pub fn stop_pairing(&mut self) -> WbResult<PairingFinished> {
        self.radio.stop_pairing()?;
        self.si_enabled = true;
        Ok(PairingFinished {
            status: PairingStatus::Cancelled,
            channel: self.radio.channel(),
        })
    }

    pub fn pairing_active(&self) -> bool {
        self.radio.pairing_in_progress()
    }

    /// Main loop body: drive the SI engine, process radio traffic, and
    /// invalidate stale input.
    pub fn poll(&mut self, mut on_event: impl FnMut(ReceiverEvent)) {
        let now = self.radio.now_micros();

        if self.si_enabled {
            self.port.process(&mut self.bus);
        }

        if let Some(finished) = self.radio.process(&self.codec) {
            self.on_pairing_finished(finished, &mut on_event);
        }

        let mut packet = [0u8; PACKET_BYTES];
        while self.radio.take_packet(&mut packet) {
            self.handle_packet(&packet, &mut on_event);
        }

        if let Some(error) = self.radio.take_error() {
            debug!("receiver: radio error: {error}");
            self.stats.radio_errors = self.stats.radio_errors.wrapping_add(1);
        }

        if now >= self.input_valid_until {
            if let ControllerPort::GameCube(port) = &mut self.port {
                port.device_mut().set_input_valid(false);
            }
        }
    }

    fn handle_packet(&mut self, packet: &Packet, on_event: &mut impl FnMut(ReceiverEvent)) {
        self.stats.packets = self.stats.packets.wrapping_add(1);

        let message = match self.codec.decode(packet) {
            Ok(message) => message,
            Err(e) => {
                debug!("receiver: dropping packet: {e}");
                self.stats.decode_errors = self.stats.decode_errors.wrapping_add(1);
                return;
            }
        };

        if self.settings.pin_wireless_id && !self.pin_accepts(message.controller_id()) {
            return;
        }

        on_event(ReceiverEvent::PacketReceived);

        match message.message_type() {
            MessageType::InputState => self.apply_input_state(&message),
            MessageType::Origin => self.apply_origin(&message),
        }
    }

    // Wireless ID pinning: bind to one transmitter and drop the rest.
    fn pin_accepts(&mut self, wireless_id: u16) -> bool {
        if self.settings.controller_type == ControllerType::GcWavebird {
            // Pin exactly as OEM WaveBird receivers do, through the
            // fix-device state in the device info
            if let ControllerPort::GameCube(port) = &mut self.port {
                let device = port.device_mut();
                if device.wireless_id_fixed() {
                    return device.wireless_id() == wireless_id;
                }
                device.set_wireless_id(wireless_id);
            }
            true
        } else {
            // Wired personalities have no fix-device command; latch onto
            // the first transmitter heard instead
            match self.first_seen_id {
                None => {
                    self.first_seen_id = Some(wireless_id);
                    true
                }
                Some(first_seen) => first_seen == wireless_id,
            }
        }
    }

    fn apply_input_state(&mut self, message: &Message) {
        let now = self.radio.now_micros();

        match &mut self.port {
            ControllerPort::GameCube(port) => {
                let device = port.device_mut();
                let wb = message.buttons();

                // Replace the button bits, leaving the origin/error flags
                let buttons = &mut device.input.buttons.0;
                buttons[0] &= !0x1F;
                buttons[1] &= !0x7F;
                buttons[0] |= ((wb >> 7) as u8 & 0x01) | ((wb >> 8) as u8 & 0x0F) << 1;
                buttons[1] |= wb as u8 & 0x7F;

                device.input.stick_x = message.stick_x();
                device.input.stick_y = message.stick_y();
                device.input.substick_x = message.substick_x();
                device.input.substick_y = message.substick_y();
                device.input.trigger_left = message.trigger_left();
                device.input.trigger_right = message.trigger_right();

                device.set_input_valid(true);
            }
            ControllerPort::N64(port) => {
                port.device_mut().apply_wavebird_input(
                    message.buttons(),
                    message.stick_x(),
                    message.stick_y(),
                    message.substick_x(),
                    message.substick_y(),
                );
            }
        }

        // A good input state (re)arms SI command handling
        self.si_enabled = true;
        self.input_valid_until = now + INPUT_VALID_US;
    }

    fn apply_origin(&mut self, message: &Message) {
        let new_origin = [
            message.origin_stick_x(),
            message.origin_stick_y(),
            message.origin_substick_x(),
            message.origin_substick_y(),
            message.origin_trigger_left(),
            message.origin_trigger_right(),
        ];

        match &mut self.port {
            ControllerPort::GameCube(port) => {
                let device = port.device_mut();
                let current = [
                    device.origin.stick_x,
                    device.origin.stick_y,
                    device.origin.substick_x,
                    device.origin.substick_y,
                    device.origin.trigger_left,
                    device.origin.trigger_right,
                ];

                // Only a changed origin asks the host to fetch it again
                if current != new_origin {
                    device.origin.stick_x = new_origin[0];
                    device.origin.stick_y = new_origin[1];
                    device.origin.substick_x = new_origin[2];
                    device.origin.substick_y = new_origin[3];
                    device.origin.trigger_left = new_origin[4];
                    device.origin.trigger_right = new_origin[5];
                    device.input.buttons.set_need_origin(true);
                }
            }
            ControllerPort::N64(port) => {
                port.device_mut().set_stick_origin(new_origin[0], new_origin[1]);
            }
        }
    }

    fn on_pairing_finished(
        &mut self,
        finished: PairingFinished,
        on_event: &mut impl FnMut(ReceiverEvent),
    ) {
        match finished.status {
            PairingStatus::Success => {
                // Adopt the channel and present a fresh device to the
                // console
                self.settings.channel = finished.channel;
                self.port = make_port(self.settings.controller_type);
                if self.settings.controller_type == ControllerType::GcWavebird {
                    self.si_enabled = true;
                }
                on_event(ReceiverEvent::SettingsChanged);
            }
            PairingStatus::Timeout | PairingStatus::Cancelled => {
                self.si_enabled = true;
            }
        }

        on_event(ReceiverEvent::PairingFinished {
            status: finished.status,
            channel: finished.channel,
        });
    }
}

fn make_port(controller_type: ControllerType) -> ControllerPort {
    match controller_type {
        ControllerType::GcWavebird => gc_port(SI_TYPE_GC | SI_GC_WIRELESS | SI_GC_NOMOTOR),
        ControllerType::GcWired => gc_port(SI_TYPE_GC | SI_GC_STANDARD),
        ControllerType::GcWiredNoMotor => gc_port(SI_TYPE_GC | SI_GC_STANDARD | SI_GC_NOMOTOR),
        ControllerType::N64 => ControllerPort::N64(CommandProcessor::new(
            N64Controller::new(),
            N64Controller::command_table(),
        )),
    }
}

fn gc_port(type_flags: u8) -> ControllerPort {
    ControllerPort::GameCube(CommandProcessor::new(
        GcController::new(type_flags),
        GcController::command_table(type_flags),
    ))
}
// EOF
