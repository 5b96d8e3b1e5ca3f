//! BLE FIDO service
//!
//! Connects the GATT characteristics to frame reassembly and to a
//! [`CommandHandler`] that understands CTAP messages:
//!
//! - Control point writes are reassembled in a [`FrameBuffer`]
//! - Complete MSG requests are handed to the command handler on a separate
//!   task so a long ceremony never blocks further writes (e.g. Cancel)
//! - Responses are split into frames and sent as status notifications
//! - Framing violations are answered with an Error frame and close the
//!   service
//!
//! Only one device may drive the service at a time. The first device to
//! connect binds it; requests from any other device are refused.

use crate::buffer::{FrameBuffer, ReassemblyResult};
use crate::error::{Error, Result};
use crate::framing::{BleCommand, ErrorCode, MIN_FRAME_SIZE, split_to_bytes};
use crate::gatt::{Characteristic, SERVICE_REVISION_FIDO2};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;

/// Frame size used before any MTU negotiation
pub const DEFAULT_MAX_FRAME_SIZE: usize = 20;

/// Failure reported by a [`CommandHandler`]
///
/// The code is sent to the client in an Error frame. When `close` is set
/// the service shuts down afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerError {
    pub code: ErrorCode,
    pub close: bool,
}

impl HandlerError {
    /// Error that leaves the connection open
    pub fn recoverable(code: ErrorCode) -> Self {
        Self { code, close: false }
    }

    /// Error that terminates the connection
    pub fn fatal(code: ErrorCode) -> Self {
        Self { code, close: true }
    }
}

/// Trait for handling reassembled MSG payloads
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Process one CTAP message (command byte followed by parameters)
    ///
    /// Returns the response payload to send back in a MSG frame.
    async fn handle_message(&self, data: &[u8]) -> std::result::Result<Vec<u8>, HandlerError>;

    /// Abort whatever request is in flight
    async fn cancel(&self);
}

/// Outbound side of the platform BLE stack
pub trait Notifier: Send + Sync {
    /// Push a value to subscribed clients of `characteristic`
    fn notify(&self, characteristic: Characteristic, value: &[u8]);
}

/// Connection lifecycle observer
pub trait ServiceListener: Send + Sync {
    fn on_connected(&self, address: &str);
    fn on_disconnected(&self, address: &str);
    fn on_closed(&self);
}

/// Single-slot lock binding the service to one device address
#[derive(Debug, Default)]
pub struct DeviceLock {
    bound: Mutex<Option<String>>,
}

impl DeviceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `address` if no device holds the lock yet
    pub fn try_bind(&self, address: &str) -> bool {
        let mut bound = self.slot();
        if bound.is_some() {
            return false;
        }
        *bound = Some(address.to_string());
        true
    }

    pub fn is_bound_by(&self, address: &str) -> bool {
        self.slot().as_deref() == Some(address)
    }

    pub fn bound_device(&self) -> Option<String> {
        self.slot().clone()
    }

    /// Clear the slot, returning the previous holder
    pub fn release(&self) -> Option<String> {
        self.slot().take()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Largest frame written to or notified from the control point
    ///
    /// Default: 20 (ATT MTU 23 minus the 3-byte ATT header)
    pub max_frame_size: usize,

    /// Service revision bitfield advertised and accepted
    ///
    /// Default: 0x20 (FIDO2 only)
    pub service_revision: u8,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            service_revision: SERVICE_REVISION_FIDO2,
        }
    }

    /// Set the maximum frame size
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_service_revision(mut self, service_revision: u8) -> Self {
        self.service_revision = service_revision;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// FIDO service state for one advertising session
pub struct BleFidoService<H: CommandHandler> {
    config: ServiceConfig,
    handler: Arc<H>,
    notifier: Arc<dyn Notifier>,
    listener: Option<Arc<dyn ServiceListener>>,
    lock: DeviceLock,
    buffer: Mutex<FrameBuffer>,
    closed: AtomicBool,
}

impl<H: CommandHandler> BleFidoService<H> {
    /// Create a service sending notifications through `notifier`
    pub fn new(config: ServiceConfig, handler: Arc<H>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        if config.max_frame_size < MIN_FRAME_SIZE {
            return Err(Error::InvalidFrameSize(config.max_frame_size));
        }

        Ok(Self {
            config,
            handler,
            notifier,
            listener: None,
            lock: DeviceLock::new(),
            buffer: Mutex::new(FrameBuffer::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Attach a lifecycle listener
    pub fn with_listener(mut self, listener: Arc<dyn ServiceListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Address of the device holding the service, if any
    pub fn bound_device(&self) -> Option<String> {
        self.lock.bound_device()
    }

    /// A device connected; the first one binds the service
    pub fn on_connected(&self, address: &str) -> bool {
        if self.is_closed() {
            tracing::debug!(address, "connection after close ignored");
            return false;
        }
        if !self.lock.try_bind(address) {
            tracing::debug!(
                address,
                bound = ?self.lock.bound_device(),
                "service already locked by another device"
            );
            return false;
        }

        tracing::debug!(address, "device bound");
        if let Some(listener) = &self.listener {
            listener.on_connected(address);
        }
        true
    }

    /// A device disconnected; losing the bound device closes the service
    pub async fn on_disconnected(&self, address: &str) {
        if !self.lock.is_bound_by(address) {
            tracing::trace!(address, "unbound device disconnected");
            return;
        }

        tracing::debug!(address, "bound device disconnected");
        if let Some(listener) = &self.listener {
            listener.on_disconnected(address);
        }
        self.close().await;
    }

    /// Handle a GATT write request
    ///
    /// An `Err` means the write itself must be rejected with a GATT failure.
    /// Framing violations are accepted at the GATT level and reported to the
    /// client in an Error frame instead.
    #[instrument(skip_all, fields(characteristic = ?characteristic))]
    pub async fn handle_write(
        self: &Arc<Self>,
        address: &str,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<()> {
        self.check_access(address)?;

        match characteristic {
            Characteristic::ControlPoint => {
                let result = self.buffer().put_fragment(value);
                match result {
                    ReassemblyResult::InProgress => {}
                    ReassemblyResult::Complete(command, data) => {
                        tracing::debug!(?command, len = data.len(), "message reassembled");
                        self.handle_command(command, data).await;
                    }
                    ReassemblyResult::Error(err) => {
                        tracing::debug!(%err, "framing error");
                        self.close_with_error(err.error_code()).await;
                    }
                }
                Ok(())
            }
            Characteristic::ServiceRevisionBitfield => {
                if value == [self.config.service_revision] {
                    Ok(())
                } else {
                    tracing::warn!(?value, "unsupported service revision bitfield");
                    Err(Error::UnsupportedRevision)
                }
            }
            Characteristic::Status | Characteristic::ControlPointLength => {
                Err(Error::NotPermitted)
            }
        }
    }

    /// Handle a GATT read request
    pub fn handle_read(&self, address: &str, characteristic: Characteristic) -> Result<Vec<u8>> {
        self.check_access(address)?;

        match characteristic {
            Characteristic::ControlPointLength => {
                let len = u16::try_from(self.config.max_frame_size).unwrap_or(u16::MAX);
                Ok(len.to_be_bytes().to_vec())
            }
            Characteristic::ServiceRevisionBitfield => Ok(vec![self.config.service_revision]),
            Characteristic::ControlPoint | Characteristic::Status => {
                tracing::debug!(?characteristic, "characteristic is not readable");
                Err(Error::NotPermitted)
            }
        }
    }

    /// Shut the service down
    ///
    /// Cancels any in-flight request, releases the device lock and notifies
    /// the listener. Calling it again has no effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("already closed");
            return;
        }

        tracing::debug!("close");
        self.buffer().clear();
        self.handler.cancel().await;
        self.lock.release();

        if let Some(listener) = &self.listener {
            listener.on_closed();
        }
    }

    fn check_access(&self, address: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if !self.lock.is_bound_by(address) {
            tracing::warn!(address, "request from unbound device");
            return Err(Error::NotBound);
        }
        Ok(())
    }

    async fn handle_command(self: &Arc<Self>, command: BleCommand, data: Vec<u8>) {
        match command {
            BleCommand::Ping => {
                if let Err(err) = self.send(BleCommand::Ping, &data) {
                    tracing::debug!(%err, "ping response not sent");
                }
            }
            BleCommand::Cancel => {
                tracing::debug!("cancel requested");
                self.handler.cancel().await;
            }
            BleCommand::KeepAlive | BleCommand::Error => {
                tracing::debug!(?command, "command is authenticator to client only");
                self.close_with_error(ErrorCode::InvalidCmd).await;
            }
            BleCommand::Msg => {
                if data.is_empty() {
                    self.close_with_error(ErrorCode::InvalidLen).await;
                    return;
                }
                let service = Arc::clone(self);
                tokio::spawn(async move {
                    service.process_message(data).await;
                });
            }
        }
    }

    async fn process_message(&self, data: Vec<u8>) {
        match self.handler.handle_message(&data).await {
            Ok(response) => {
                if let Err(err) = self.send(BleCommand::Msg, &response) {
                    tracing::warn!(%err, "response not sent");
                    if err != Error::Closed {
                        self.close_with_error(ErrorCode::Other).await;
                    }
                }
            }
            Err(HandlerError { code, close }) => {
                tracing::debug!(?code, close, "message handler failed");
                if close {
                    self.close_with_error(code).await;
                } else if let Err(err) = self.send(BleCommand::Error, &code.to_payload()) {
                    tracing::debug!(%err, "error frame not sent");
                }
            }
        }
    }

    async fn close_with_error(&self, code: ErrorCode) {
        tracing::debug!(?code, "closing with error");
        if let Err(err) = self.send(BleCommand::Error, &code.to_payload()) {
            tracing::debug!(%err, "error frame not sent");
        }
        self.close().await;
    }

    fn send(&self, command: BleCommand, payload: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let frames = split_to_bytes(command, payload, self.config.max_frame_size)?;
        tracing::trace!(?command, frames = frames.len(), "sending response");
        for frame in &frames {
            self.notifier.notify(Characteristic::Status, frame);
        }
        Ok(())
    }

    fn buffer(&self) -> MutexGuard<'_, FrameBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
