//! Transport-Protocol Bridge
//!
//! Connects the BLE service (ble-fido2-transport) with the CTAP dispatcher
//! by implementing the `CommandHandler` trait.
//!
//! This module is only available when the "transport" feature is enabled.

use crate::dispatcher::CommandDispatcher;
use crate::error::Error;

use async_trait::async_trait;
use ble_fido2_transport::{CommandHandler, ErrorCode, HandlerError};

/// Bridge between the transport `CommandHandler` and the `CommandDispatcher`
///
/// Commands the dispatcher rejects become Error frames. Unknown or
/// unsupported commands terminate the connection; parameter errors and a
/// busy authenticator leave it open.
pub struct CtapBridge {
    dispatcher: CommandDispatcher,
}

impl CtapBridge {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }
}

/// Map a dispatch rejection to the BLE error it travels as
pub fn handler_error(err: &Error) -> HandlerError {
    match err {
        Error::InvalidCommand | Error::Unsupported => HandlerError::fatal(ErrorCode::InvalidCmd),
        Error::InvalidParameters(_) | Error::MalformedEncoding(_) => {
            HandlerError::recoverable(ErrorCode::InvalidPar)
        }
        Error::BadOperation => HandlerError::recoverable(ErrorCode::Busy),
        _ => HandlerError::recoverable(ErrorCode::Other),
    }
}

#[async_trait]
impl CommandHandler for CtapBridge {
    async fn handle_message(&self, data: &[u8]) -> Result<Vec<u8>, HandlerError> {
        self.dispatcher.dispatch(data).await.map_err(|err| {
            tracing::debug!(%err, "CTAP message rejected");
            handler_error(&err)
        })
    }

    async fn cancel(&self) {
        self.dispatcher.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::{AuthenticatorConfig, InternalAuthenticator};
    use crate::callbacks::{AutoConsent, MemoryCredentialStore};

    use ble_fido2_crypto::SoftwareKeyStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn bridge() -> CtapBridge {
        let authenticator = InternalAuthenticator::new(
            AuthenticatorConfig::new(),
            Arc::new(AutoConsent),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(SoftwareKeyStore::new()),
        );
        CtapBridge::new(CommandDispatcher::new(
            Arc::new(authenticator),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_get_info_message() {
        let response = bridge().handle_message(&[0x04]).await.unwrap();
        assert_eq!(response[0], 0x00);
        assert!(response.len() > 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let bridge = bridge();
        assert_eq!(
            bridge.handle_message(&[0x06]).await,
            Err(HandlerError::fatal(ErrorCode::InvalidCmd))
        );
        assert_eq!(
            bridge.handle_message(&[0x55]).await,
            Err(HandlerError::fatal(ErrorCode::InvalidCmd))
        );
        assert_eq!(
            bridge.handle_message(&[0x02, 0x01]).await,
            Err(HandlerError::recoverable(ErrorCode::InvalidPar))
        );
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            handler_error(&Error::BadOperation),
            HandlerError::recoverable(ErrorCode::Busy)
        );
        assert_eq!(
            handler_error(&Error::EncodingFailed),
            HandlerError::recoverable(ErrorCode::Other)
        );
    }
}
