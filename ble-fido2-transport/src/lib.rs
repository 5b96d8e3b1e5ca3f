//! FIDO over Bluetooth Low Energy transport
//!
//! This crate provides the BLE side of a FIDO2 authenticator:
//! - Framing (message fragmentation into control point sized frames)
//! - Reassembly of incoming fragments with sequence and length checks
//! - GATT characteristic table of the FIDO service
//! - The service state machine (device lock, command routing, error frames)
//!
//! The platform Bluetooth stack (advertising, MTU negotiation, GATT server
//! registration) stays outside; it forwards reads and writes to
//! [`BleFidoService`] and delivers notifications through a [`Notifier`].
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#ble>

pub mod buffer;
pub mod error;
pub mod framing;
pub mod gatt;
pub mod service;

// Re-export commonly used types
pub use buffer::{FrameBuffer, ReassemblyResult};
pub use error::{Error, Result};
pub use framing::{BleCommand, ErrorCode, Frame, split, split_to_bytes};
pub use gatt::{Characteristic, FIDO_SERVICE_UUID};
pub use service::{
    BleFidoService, CommandHandler, DeviceLock, HandlerError, Notifier, ServiceConfig,
    ServiceListener,
};
