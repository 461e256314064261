// gc_controller.rs — SI device emulation for GameCube controllers

use crate::*;

// GameCube controller SI commands
pub const SI_CMD_GC_SHORT_POLL: u8 = 0x40;
pub const SI_CMD_GC_SHORT_POLL_LEN: u8 = 3;
pub const SI_CMD_GC_SHORT_POLL_RESP: u8 = 8;

pub const SI_CMD_GC_READ_ORIGIN: u8 = 0x41;
pub const SI_CMD_GC_READ_ORIGIN_LEN: u8 = 1;
pub const SI_CMD_GC_READ_ORIGIN_RESP: u8 = 10;

pub const SI_CMD_GC_CALIBRATE: u8 = 0x42;
pub const SI_CMD_GC_CALIBRATE_LEN: u8 = 3;
pub const SI_CMD_GC_CALIBRATE_RESP: u8 = 10;

pub const SI_CMD_GC_LONG_POLL: u8 = 0x43;
pub const SI_CMD_GC_LONG_POLL_LEN: u8 = 3;
pub const SI_CMD_GC_LONG_POLL_RESP: u8 = 10;

pub const SI_CMD_GC_FIX_DEVICE: u8 = 0x4E;
pub const SI_CMD_GC_FIX_DEVICE_LEN: u8 = 3;
pub const SI_CMD_GC_FIX_DEVICE_RESP: u8 = 3;

// Button/flag bits of input state byte 0
pub const GC_BTN0_A: u8 = 0x01;
pub const GC_BTN0_B: u8 = 0x02;
pub const GC_BTN0_X: u8 = 0x04;
pub const GC_BTN0_Y: u8 = 0x08;
pub const GC_BTN0_START: u8 = 0x10;
pub const GC_BTN0_NEED_ORIGIN: u8 = 0x20;
pub const GC_BTN0_ERROR_LATCH: u8 = 0x40;
pub const GC_BTN0_ERROR: u8 = 0x80;

// Button/flag bits of input state byte 1
pub const GC_BTN1_LEFT: u8 = 0x01;
pub const GC_BTN1_RIGHT: u8 = 0x02;
pub const GC_BTN1_DOWN: u8 = 0x04;
pub const GC_BTN1_UP: u8 = 0x08;
pub const GC_BTN1_Z: u8 = 0x10;
pub const GC_BTN1_R: u8 = 0x20;
pub const GC_BTN1_L: u8 = 0x40;
pub const GC_BTN1_USE_ORIGIN: u8 = 0x80;

/// The two button/flag bytes of a GameCube input state, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcButtons(pub [u8; 2]);

impl GcButtons {
    fn assign(&mut self, byte: usize, mask: u8, value: bool) {
        if value {
            self.0[byte] |= mask;
        } else {
            self.0[byte] &= !mask;
        }
    }

    /// Should the host fetch the origin?
    pub fn need_origin(&self) -> bool {
        self.0[0] & GC_BTN0_NEED_ORIGIN != 0
    }

    pub fn set_need_origin(&mut self, value: bool) {
        self.assign(0, GC_BTN0_NEED_ORIGIN, value);
    }

    /// Should the host apply the origin to the analog values?
    pub fn use_origin(&self) -> bool {
        self.0[1] & GC_BTN1_USE_ORIGIN != 0
    }

    pub fn set_use_origin(&mut self, value: bool) {
        self.assign(1, GC_BTN1_USE_ORIGIN, value);
    }
}

/// GameCube controller input state: 10 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcInputState {
    pub buttons: GcButtons,
    pub stick_x: u8,
    pub stick_y: u8,
    pub substick_x: u8,
    pub substick_y: u8,
    pub trigger_left: u8,
    pub trigger_right: u8,
    pub analog_a: u8,
    pub analog_b: u8,
}

impl GcInputState {
    pub fn to_bytes(&self) -> [u8; 10] {
        [
            self.buttons.0[0],
            self.buttons.0[1],
            self.stick_x,
            self.stick_y,
            self.substick_x,
            self.substick_y,
            self.trigger_left,
            self.trigger_right,
            self.analog_a,
            self.analog_b,
        ]
    }

    /// Pack the full input state into the 8-byte short poll response.
    ///
    /// The full state is 10 bytes, so depending on the analog mode either
    /// one pair of analog inputs is omitted or two pairs are truncated to
    /// 4 bits. All production games except Luigi's Mansion use analog
    /// mode 3, which simply drops the analog A/B values; those buttons
    /// only existed on pre-production controllers.
    pub fn pack_short(&self, analog_mode: u8) -> [u8; 8] {
        let mut packed = [
            self.buttons.0[0],
            self.buttons.0[1],
            self.stick_x,
            self.stick_y,
            0,
            0,
            0,
            0,
        ];

        match analog_mode {
            1 => {
                // Triggers full precision, substick and analog A/B in nibbles
                packed[4] = (self.substick_x & 0xF0) | (self.substick_y >> 4);
                packed[5] = self.trigger_left;
                packed[6] = self.trigger_right;
                packed[7] = (self.analog_a & 0xF0) | (self.analog_b >> 4);
            }
            2 => {
                // Analog A/B full precision, substick and triggers in nibbles
                packed[4] = (self.substick_x & 0xF0) | (self.substick_y >> 4);
                packed[5] = (self.trigger_left & 0xF0) | (self.trigger_right >> 4);
                packed[6] = self.analog_a;
                packed[7] = self.analog_b;
            }
            3 => {
                // Substick and triggers full precision, analog A/B omitted
                packed[4] = self.substick_x;
                packed[5] = self.substick_y;
                packed[6] = self.trigger_left;
                packed[7] = self.trigger_right;
            }
            4 => {
                // Substick and analog A/B full precision, triggers omitted
                packed[4] = self.substick_x;
                packed[5] = self.substick_y;
                packed[6] = self.analog_a;
                packed[7] = self.analog_b;
            }
            _ => {
                // Mode 0: substick full precision, triggers and analog A/B
                // in nibbles
                packed[4] = self.substick_x;
                packed[5] = self.substick_y;
                packed[6] = (self.trigger_left & 0xF0) | (self.trigger_right >> 4);
                packed[7] = (self.analog_a & 0xF0) | (self.analog_b >> 4);
            }
        }

        packed
    }
}

/// GameCube controller device state.
///
/// `info` is the 3-byte block returned by info/reset commands. For
/// wireless devices bytes 1-2 carry the 10-bit wireless ID and the fix/
/// origin flags; for wired devices byte 2 carries the runtime flags
/// (need-origin, motor state, analog mode) instead.
#[derive(Debug, Clone, Copy)]
pub struct GcController {
    pub info: [u8; 3],
    pub origin: GcInputState,
    pub input: GcInputState,
    pub input_valid: bool,
}

impl GcController {
    /// Initialize to present on the SI bus as a GameCube controller with
    /// the given device-type flags.
    pub fn new(type_flags: u8) -> Self {
        let origin = GcInputState {
            stick_x: 0x80,
            stick_y: 0x80,
            substick_x: 0x80,
            substick_y: 0x80,
            ..GcInputState::default()
        };

        let mut device = Self {
            info: [type_flags, 0x00, 0x00],
            origin,
            input: origin,
            input_valid: true,
        };

        // Wired controllers ask the host to fetch the origin
        if type_flags & SI_GC_WIRELESS == 0 {
            device.info[2] = SI_NEED_ORIGIN;
        }

        device
    }

    /// Build the command table for a controller with the given type flags.
    /// The fix-device command only exists on WaveBird receivers.
    pub fn command_table(type_flags: u8) -> CommandTable<GcController> {
        let mut table = CommandTable::new();
        table.register(SI_CMD_INFO, SI_CMD_INFO_LEN, handle_info);
        table.register(SI_CMD_GC_SHORT_POLL, SI_CMD_GC_SHORT_POLL_LEN, handle_short_poll);
        table.register(SI_CMD_GC_READ_ORIGIN, SI_CMD_GC_READ_ORIGIN_LEN, handle_read_origin);
        table.register(SI_CMD_GC_CALIBRATE, SI_CMD_GC_CALIBRATE_LEN, handle_calibrate);
        table.register(SI_CMD_GC_LONG_POLL, SI_CMD_GC_LONG_POLL_LEN, handle_long_poll);
        table.register(SI_CMD_RESET, SI_CMD_RESET_LEN, handle_reset);

        if type_flags & SI_GC_WIRELESS != 0 {
            table.register(SI_CMD_GC_FIX_DEVICE, SI_CMD_GC_FIX_DEVICE_LEN, handle_fix_device);
        }

        table
    }

    /// The current 10-bit wireless ID.
    ///
    /// Wireless IDs identify a WaveBird transmitter. They are not globally
    /// unique, but distinct enough that one player is unlikely to own two
    /// controllers with the same ID; they bind a controller to a port
    /// after reception starts.
    pub fn wireless_id(&self) -> u16 {
        (self.info[1] as u16 & 0xC0) << 2 | self.info[2] as u16
    }

    /// Has the wireless ID been fixed by the host?
    pub fn wireless_id_fixed(&self) -> bool {
        self.info[1] & SI_WIRELESS_FIX_ID != 0
    }

    /// Adopt the wireless ID of a received transmission. Ignored once the
    /// host has fixed the ID.
    pub fn set_wireless_id(&mut self, wireless_id: u16) {
        if self.wireless_id_fixed() {
            return;
        }

        self.info[1] = (self.info[1] & !0xC0) | ((wireless_id >> 2) as u8 & 0xC0);
        self.info[2] = wireless_id as u8;

        self.info[0] |= SI_GC_STANDARD | SI_WIRELESS_RECEIVED;
        self.info[1] |= SI_WIRELESS_ORIGIN;
    }

    pub fn set_input_valid(&mut self, valid: bool) {
        self.input_valid = valid;
    }

    fn is_wireless(&self) -> bool {
        self.info[0] & SI_GC_WIRELESS != 0
    }

    // Latch the analog mode, motor state, and origin flags from a poll
    // command. Wireless devices keep their ID in info[2], so only wired
    // devices store the runtime state there.
    fn apply_poll_flags(&mut self, analog_mode: u8, motor_state: u8) {
        if self.is_wireless() {
            return;
        }

        let need_origin = self.info[2] & SI_NEED_ORIGIN != 0;
        self.input.buttons.set_need_origin(need_origin);
        self.input.buttons.set_use_origin(true);

        self.info[2] &= !(SI_MOTOR_STATE_MASK | SI_ANALOG_MODE_MASK);
        self.info[2] |= motor_state << 3 | analog_mode;
    }

    // Serve the last valid input, falling back to the origin when the
    // input has gone stale.
    fn poll_state(&self) -> &GcInputState {
        if self.input_valid {
            &self.input
        } else {
            &self.origin
        }
    }
}

/// Handle "info" commands.
///
/// Command:  {0x00}
/// Response: the 3-byte device info.
fn handle_info(device: &mut GcController, _command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    bus.write_bytes(&device.info)?;
    Ok(SI_CMD_INFO_RESP)
}

/// Handle "reset" commands.
///
/// Command:  {0xFF}
/// Response: the 3-byte device info.
fn handle_reset(device: &mut GcController, _command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    // TODO: stop the rumble motor, if active

    bus.write_bytes(&device.info)?;
    Ok(SI_CMD_RESET_RESP)
}

/// Handle "short poll" commands, fetching the current input state.
///
/// Command:  {0x40, analog_mode, motor_state}
/// Response: the 8-byte packed input state, see [`GcInputState::pack_short`].
fn handle_short_poll(device: &mut GcController, command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    let analog_mode = command[1] & SI_ANALOG_MODE_MASK;
    let motor_state = command[2] & 0x03;

    device.apply_poll_flags(analog_mode, motor_state);

    let response = device.poll_state().pack_short(analog_mode);
    bus.write_bytes(&response)?;
    Ok(SI_CMD_GC_SHORT_POLL_RESP)
}

/// Handle "read origin" commands.
///
/// Command:  {0x41}
/// Response: a 10-byte input state holding the current origin.
fn handle_read_origin(device: &mut GcController, _command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    // Tell the host it no longer needs to fetch the origin
    if !device.is_wireless() {
        device.info[2] &= !SI_NEED_ORIGIN;
    }
    device.input.buttons.set_need_origin(false);

    let response = device.origin.to_bytes();
    bus.write_bytes(&response)?;
    Ok(SI_CMD_GC_READ_ORIGIN_RESP)
}

/// Handle "calibrate" commands.
///
/// Command:  {0x42, 0x00, 0x00}
/// Response: a 10-byte input state holding the new origin.
fn handle_calibrate(device: &mut GcController, _command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    // The current analog positions become the origin
    device.origin.stick_x = device.input.stick_x;
    device.origin.stick_y = device.input.stick_y;
    device.origin.substick_x = device.input.substick_x;
    device.origin.substick_y = device.input.substick_y;
    device.origin.trigger_left = device.input.trigger_left;
    device.origin.trigger_right = device.input.trigger_right;

    if !device.is_wireless() {
        device.info[2] &= !SI_NEED_ORIGIN;
    }
    device.input.buttons.set_need_origin(false);

    let response = device.origin.to_bytes();
    bus.write_bytes(&response)?;
    Ok(SI_CMD_GC_CALIBRATE_RESP)
}

/// Handle "long poll" commands, fetching the input state at full
/// precision.
///
/// Command:  {0x43, analog_mode, motor_state}
/// Response: a 10-byte input state.
///
/// No shipping game uses this command; it is implemented for
/// completeness.
fn handle_long_poll(device: &mut GcController, command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    let analog_mode = command[1] & SI_ANALOG_MODE_MASK;
    let motor_state = command[2] & 0x03;

    device.apply_poll_flags(analog_mode, motor_state);

    let response = device.poll_state().to_bytes();
    bus.write_bytes(&response)?;
    Ok(SI_CMD_GC_LONG_POLL_RESP)
}

/// Handle "fix device" commands, pinning the receiver to one controller.
///
/// Command:  {0x4E, wireless_id_h | flags, wireless_id_l}
/// Response: the 3-byte device info.
fn handle_fix_device(device: &mut GcController, command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    let wireless_id = (command[1] as u16 & 0xC0) << 2 | command[2] as u16;

    device.info[1] = (device.info[1] & !0xC0) | ((wireless_id >> 2) as u8 & 0xC0);
    device.info[2] = wireless_id as u8;

    device.info[0] |= SI_WIRELESS_STATE;
    device.info[1] |= SI_WIRELESS_FIX_ID;

    bus.write_bytes(&device.info)?;
    Ok(SI_CMD_GC_FIX_DEVICE_RESP)
}

// EOF
