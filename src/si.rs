// si.rs — SI (Serial Interface) protocol definitions

//! SI is the half-duplex, asynchronous serial protocol GameCube and N64
//! consoles use to poll controllers: a single open-drain line with an
//! external pull-up, clocked at 250 kHz by OEM controllers and 200 kHz by
//! the console.
//!
//! The host sends a 1-3 byte command, the addressed device answers with a
//! multi-byte response, and both directions are terminated with a stop
//! bit. Clocking bits on and off the wire needs timer/DMA peripherals and
//! lives in the platform layer; this module defines the device-mode
//! interface the protocol engine drives it through.

/// SI transfers are max 64 bytes.
pub const SI_BLOCK_SIZE: usize = 64;

// Common commands
pub const SI_CMD_INFO: u8 = 0x00;
pub const SI_CMD_INFO_LEN: u8 = 1;
pub const SI_CMD_INFO_RESP: u8 = 3;

pub const SI_CMD_RESET: u8 = 0xFF;
pub const SI_CMD_RESET_LEN: u8 = 1;
pub const SI_CMD_RESET_RESP: u8 = 3;

// SI device info flags
// On wireless controllers 0x00C0FF is reserved for the controller ID

// Byte 0
pub const SI_GC_STANDARD: u8 = 0x01;
pub const SI_WIRELESS_STATE: u8 = 0x02;
pub const SI_TYPE_GC: u8 = 0x08;
pub const SI_GC_NOMOTOR: u8 = 0x20;
pub const SI_WIRELESS_RECEIVED: u8 = 0x40;
pub const SI_GC_WIRELESS: u8 = 0x80;

// Byte 1
pub const SI_WIRELESS_FIX_ID: u8 = 0x10;
pub const SI_WIRELESS_ORIGIN: u8 = 0x20;

// Byte 2
pub const SI_HAS_ERROR: u8 = 0x80;
pub const SI_HAS_LATCHED_ERROR: u8 = 0x40;
pub const SI_NEED_ORIGIN: u8 = 0x20;
pub const SI_MOTOR_STATE_MASK: u8 = 0x18;
pub const SI_ANALOG_MODE_MASK: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SiError {
    #[error("SI bus not ready")]
    NotReady,
    #[error("unknown SI command")]
    UnknownCommand,
    #[error("invalid SI command")]
    InvalidCommand,
    #[error("SI transfer failed")]
    TransferFailed,
    #[error("SI transfer timed out")]
    TransferTimeout,
}

/// Device-mode SI bus PHY.
///
/// Implementations keep at most one transfer in flight; `write_bytes`,
/// `read_command` and `read_bytes` start it and [`SiBus::poll_transfer`]
/// reports its completion. Completion flags set from interrupt context
/// must be latched so the polling side observes them exactly once.
pub trait SiBus {
    /// Begin transmitting `data`, terminated with a device-mode stop bit.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), SiError>;

    /// Begin receiving one command: a single opcode byte first, then
    /// `get_length(opcode) - 1` further bytes. An expected length of zero
    /// means the opcode is unknown and the transfer must be aborted with
    /// [`SiError::UnknownCommand`].
    fn read_command(&mut self, get_length: &dyn Fn(u8) -> u8) -> Result<(), SiError>;

    /// Begin receiving exactly `length` bytes.
    fn read_bytes(&mut self, length: u8) -> Result<(), SiError>;

    /// Poll the transfer in flight. `Some(Ok(n))` delivers `n` received
    /// bytes into `out` (`n` is 0 when a write completed); `Some(Err(_))`
    /// reports an aborted or failed transfer. `n` never exceeds
    /// [`SI_BLOCK_SIZE`].
    fn poll_transfer(&mut self, out: &mut [u8]) -> Option<Result<u8, SiError>>;

    /// Block until the line has been high for the 100 µs bus-idle window.
    fn await_bus_idle(&mut self);
}
// EOF
