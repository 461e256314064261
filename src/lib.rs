// lib.rs

#![cfg_attr(not(test), no_std)]

pub use log::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

pub type WbResult<T> = core::result::Result<T, WbError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WbError {
    #[error("codec error: {0}")]
    Bch(#[from] BchError),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("SI error: {0}")]
    Si(#[from] SiError),
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),
}

pub mod bch3121;
pub use bch3121::BchError;

pub mod packet;
pub use packet::{crc_ccitt, CrcFn, Packet, PacketCodec, PacketError, MESSAGE_BYTES, PACKET_BYTES};

mod message;
pub use message::*;

mod si;
pub use si::*;

mod commands;
pub use commands::*;

mod gc_controller;
pub use gc_controller::*;

mod n64_controller;
pub use n64_controller::*;

mod radio;
pub use radio::*;

mod pairing;
pub use pairing::*;

mod receiver;
pub use receiver::*;

mod settings;
pub use settings::*;

// EOF
