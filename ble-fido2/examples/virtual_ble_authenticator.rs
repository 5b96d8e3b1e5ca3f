//! Virtual BLE FIDO2 Authenticator
//!
//! Runs the FIDO GATT service in-process with a simulated central that
//! writes request frames to the control point and reassembles the status
//! notifications, the way a platform Bluetooth stack would forward them.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example virtual_ble_authenticator
//! ```
//!
//! The central registers a credential over CTAP2 MakeCredential, asks for an
//! assertion with GetAssertion, and prints each response.

use std::sync::Arc;

use ble_fido2::ctap::cbor::{self, MapBuilder, Value};
use ble_fido2::transport::{
    split_to_bytes, BleCommand, Characteristic, FrameBuffer, ReassemblyResult,
};
use ble_fido2::{
    ble, AuthenticatorConfig, AutoConsent, CtapBleService, InternalAuthenticator,
    MemoryCredentialStore, Notifier, ServiceConfig, SoftwareKeyStore,
};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing_subscriber::EnvFilter;

const CENTRAL: &str = "5C:F3:70:00:00:2A";

/// Forwards status notifications to the simulated central
struct ChannelNotifier(UnboundedSender<Vec<u8>>);

impl Notifier for ChannelNotifier {
    fn notify(&self, characteristic: Characteristic, value: &[u8]) {
        if characteristic == Characteristic::Status {
            let _ = self.0.send(value.to_vec());
        }
    }
}

async fn exchange(
    service: &Arc<CtapBleService>,
    notifications: &mut UnboundedReceiver<Vec<u8>>,
    max_frame_size: usize,
    message: &[u8],
) -> Result<(BleCommand, Vec<u8>), Box<dyn std::error::Error>> {
    for frame in split_to_bytes(BleCommand::Msg, message, max_frame_size)? {
        service
            .handle_write(CENTRAL, Characteristic::ControlPoint, &frame)
            .await?;
    }

    let mut buffer = FrameBuffer::new();
    while let Some(frame) = notifications.recv().await {
        match buffer.put_fragment(&frame) {
            ReassemblyResult::InProgress => continue,
            ReassemblyResult::Complete(command, payload) => return Ok((command, payload)),
            ReassemblyResult::Error(err) => return Err(err.into()),
        }
    }
    Err("service closed".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let authenticator = InternalAuthenticator::new(
        AuthenticatorConfig::new(),
        Arc::new(AutoConsent),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(SoftwareKeyStore::new()),
    );

    let (tx, mut notifications) = mpsc::unbounded_channel();
    let config = ServiceConfig::new();
    let max_frame_size = config.max_frame_size;
    let service = ble::internal_service(authenticator, config, Arc::new(ChannelNotifier(tx)))?;

    println!("FIDO service bound: {}", service.on_connected(CENTRAL));
    let frame_size = service.handle_read(CENTRAL, Characteristic::ControlPointLength)?;
    println!("Control point length: {:02x?}", frame_size);

    // authenticatorGetInfo
    let (command, response) = exchange(&service, &mut notifications, max_frame_size, &[0x04]).await?;
    println!("GetInfo -> {:?} status 0x{:02x}", command, response[0]);
    println!("  {:?}", cbor::decode(&response[1..])?);

    // authenticatorMakeCredential
    let mut request = vec![0x01];
    request.extend(
        MapBuilder::new()
            .insert_bytes(1, &[0x11; 32])
            .insert(
                2,
                Value::map([("id", Value::from("example.com")), ("name", Value::from("Example"))]),
            )
            .insert(
                3,
                Value::map([
                    ("id", Value::from(b"user-1".to_vec())),
                    ("name", Value::from("alice")),
                ]),
            )
            .insert(
                4,
                Value::Array(vec![Value::map([
                    ("alg", Value::from(-7)),
                    ("type", Value::from("public-key")),
                ])]),
            )
            .build()?,
    );
    let (_, response) = exchange(&service, &mut notifications, max_frame_size, &request).await?;
    println!("MakeCredential -> status 0x{:02x}, {} bytes", response[0], response.len());

    // authenticatorGetAssertion
    let mut request = vec![0x02];
    request.extend(
        MapBuilder::new()
            .insert(1, "example.com")
            .insert_bytes(2, &[0x22; 32])
            .build()?,
    );
    let (_, response) = exchange(&service, &mut notifications, max_frame_size, &request).await?;
    println!("GetAssertion -> status 0x{:02x}, {} bytes", response[0], response.len());

    service.on_disconnected(CENTRAL).await;
    println!("Service closed: {}", service.is_closed());
    Ok(())
}
