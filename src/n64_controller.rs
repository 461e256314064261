// n64_controller.rs — SI device emulation for N64 controllers

use crate::*;

// N64 controller SI commands
pub const SI_CMD_N64_POLL: u8 = 0x01;
pub const SI_CMD_N64_POLL_LEN: u8 = 1;
pub const SI_CMD_N64_POLL_RESP: u8 = 4;

// Button bits of input state byte 0
pub const N64_BTN0_A: u8 = 0x80;
pub const N64_BTN0_B: u8 = 0x40;
pub const N64_BTN0_Z: u8 = 0x20;
pub const N64_BTN0_START: u8 = 0x10;
pub const N64_BTN0_UP: u8 = 0x08;
pub const N64_BTN0_DOWN: u8 = 0x04;
pub const N64_BTN0_LEFT: u8 = 0x02;
pub const N64_BTN0_RIGHT: u8 = 0x01;

// Button bits of input state byte 1
pub const N64_BTN1_L: u8 = 0x20;
pub const N64_BTN1_R: u8 = 0x10;
pub const N64_BTN1_C_UP: u8 = 0x08;
pub const N64_BTN1_C_DOWN: u8 = 0x04;
pub const N64_BTN1_C_LEFT: u8 = 0x02;
pub const N64_BTN1_C_RIGHT: u8 = 0x01;

// C-button thresholds for the GameCube substick
const SUBSTICK_LOW: u8 = 64;
const SUBSTICK_HIGH: u8 = 192;

/// N64 controller input state: 4 bytes on the wire, with signed stick
/// axes. The resting state is all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct N64InputState {
    pub buttons: [u8; 2],
    pub stick_x: i8,
    pub stick_y: i8,
}

impl N64InputState {
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.buttons[0],
            self.buttons[1],
            self.stick_x as u8,
            self.stick_y as u8,
        ]
    }
}

/// N64 controller device state.
#[derive(Debug, Clone, Copy)]
pub struct N64Controller {
    pub info: [u8; 3],
    pub input: N64InputState,
    stick_origin_x: u8,
    stick_origin_y: u8,
}

impl N64Controller {
    /// Initialize to present on the SI bus as a wired N64 controller with
    /// no accessory pak.
    pub fn new() -> Self {
        Self {
            info: [0x05, 0x00, 0x02],
            input: N64InputState::default(),
            stick_origin_x: 0x80,
            stick_origin_y: 0x80,
        }
    }

    pub fn command_table() -> CommandTable<N64Controller> {
        let mut table = CommandTable::new();
        table.register(SI_CMD_INFO, SI_CMD_INFO_LEN, handle_info);
        table.register(SI_CMD_RESET, SI_CMD_RESET_LEN, handle_reset);
        table.register(SI_CMD_N64_POLL, SI_CMD_N64_POLL_LEN, handle_poll);
        table
    }

    /// Track the transmitter's stick origin so the main stick can be
    /// re-centered.
    pub fn set_stick_origin(&mut self, x: u8, y: u8) {
        self.stick_origin_x = x;
        self.stick_origin_y = y;
    }

    /// Map a WaveBird input state onto the N64 controller.
    ///
    /// Digital buttons map directly; the GameCube substick drives the
    /// four C buttons once deflected past a quarter of its range; and the
    /// main stick is re-centered against the tracked origin.
    pub fn apply_wavebird_input(
        &mut self,
        buttons: u16,
        stick_x: u8,
        stick_y: u8,
        substick_x: u8,
        substick_y: u8,
    ) {
        let pairs = [
            (WB_BUTTONS_A, N64_BTN0_A),
            (WB_BUTTONS_B, N64_BTN0_B),
            (WB_BUTTONS_Z, N64_BTN0_Z),
            (WB_BUTTONS_START, N64_BTN0_START),
            (WB_BUTTONS_UP, N64_BTN0_UP),
            (WB_BUTTONS_DOWN, N64_BTN0_DOWN),
            (WB_BUTTONS_LEFT, N64_BTN0_LEFT),
            (WB_BUTTONS_RIGHT, N64_BTN0_RIGHT),
        ];

        let mut byte0 = 0;
        for (wb, n64) in pairs {
            if buttons & wb != 0 {
                byte0 |= n64;
            }
        }

        let mut byte1 = 0;
        if buttons & WB_BUTTONS_L != 0 {
            byte1 |= N64_BTN1_L;
        }
        if buttons & WB_BUTTONS_R != 0 {
            byte1 |= N64_BTN1_R;
        }

        if substick_x < SUBSTICK_LOW {
            byte1 |= N64_BTN1_C_LEFT;
        }
        if substick_x > SUBSTICK_HIGH {
            byte1 |= N64_BTN1_C_RIGHT;
        }
        if substick_y > SUBSTICK_HIGH {
            byte1 |= N64_BTN1_C_UP;
        }
        if substick_y < SUBSTICK_LOW {
            byte1 |= N64_BTN1_C_DOWN;
        }

        self.input.buttons = [byte0, byte1];
        self.input.stick_x = recenter(stick_x, self.stick_origin_x);
        self.input.stick_y = recenter(stick_y, self.stick_origin_y);
    }
}

impl Default for N64Controller {
    fn default() -> Self {
        Self::new()
    }
}

// Re-center an unsigned GameCube stick axis into the N64's signed range,
// scaled down since N64 sticks only reach about +/-80.
fn recenter(value: u8, origin: u8) -> i8 {
    ((value as i32 - origin as i32) * 4 / 5) as i8
}

/// Handle "info" commands.
///
/// Command:  {0x00}
/// Response: the 3-byte device info.
fn handle_info(device: &mut N64Controller, _command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    bus.write_bytes(&device.info)?;
    Ok(SI_CMD_INFO_RESP)
}

/// Handle "reset" commands.
///
/// Command:  {0xFF}
/// Response: the 3-byte device info.
fn handle_reset(device: &mut N64Controller, _command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    bus.write_bytes(&device.info)?;
    Ok(SI_CMD_RESET_RESP)
}

/// Handle "poll" commands.
///
/// Command:  {0x01}
/// Response: the 4-byte input state.
fn handle_poll(device: &mut N64Controller, _command: &[u8], bus: &mut dyn SiBus) -> Result<u8, SiError> {
    let response = device.input.to_bytes();
    bus.write_bytes(&response)?;
    Ok(SI_CMD_N64_POLL_RESP)
}

// EOF
