//! BLE service wiring
//!
//! Stacks the FIDO GATT service on top of the CTAP dispatcher so a platform
//! Bluetooth stack only has to forward connection events, reads and writes.

use crate::error::Result;

use ble_fido2_ctap::{Authenticator, CommandDispatcher, CtapBridge, InternalAuthenticator};
use ble_fido2_transport::{BleFidoService, Notifier, ServiceConfig};

use std::sync::Arc;
use std::time::Duration;

/// FIDO service answering CTAP2 messages
pub type CtapBleService = BleFidoService<CtapBridge>;

/// Build a FIDO service for `authenticator`
///
/// Ceremonies started over the link live at most `ceremony_timeout`.
pub fn service(
    authenticator: Arc<dyn Authenticator>,
    ceremony_timeout: Duration,
    config: ServiceConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<Arc<CtapBleService>> {
    let dispatcher = CommandDispatcher::new(authenticator, ceremony_timeout);
    let bridge = Arc::new(CtapBridge::new(dispatcher));
    tracing::debug!(max_frame_size = config.max_frame_size, "building FIDO service");
    Ok(Arc::new(BleFidoService::new(config, bridge, notifier)?))
}

/// Build a FIDO service for an internal authenticator
pub fn internal_service(
    authenticator: InternalAuthenticator,
    config: ServiceConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<Arc<CtapBleService>> {
    let timeout = authenticator.config().ceremony_timeout;
    service(Arc::new(authenticator), timeout, config, notifier)
}

