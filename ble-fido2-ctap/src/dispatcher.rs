//! CTAP Command Dispatcher
//!
//! Routes CTAP commands carried in BLE MSG frames to their handlers. GetInfo
//! and Reset answer at once; MakeCredential and GetAssertion run as ceremony
//! operations against the authenticator's sessions, one at a time.
//!
//! A successful dispatch returns the CTAP response: one status byte followed
//! by the CBOR payload, if any. A ceremony that ends in failure is still a
//! CTAP response carrying the matching non-zero status. An `Err` from
//! [`CommandDispatcher::dispatch`] means the command itself was rejected and
//! must travel back as a transport error frame.

use crate::commands::{get_assertion, get_info, make_credential, CommandCode};
use crate::error::{Error, Result};
use crate::operation::{CreateOperation, GetOperation};
use crate::session::Authenticator;
use crate::status::StatusCode;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Clone)]
enum Active {
    Create(Arc<CreateOperation>),
    Get(Arc<GetOperation>),
}

impl Active {
    fn cancel(&self) {
        match self {
            Active::Create(op) => op.cancel(),
            Active::Get(op) => op.cancel(),
        }
    }

    fn is(&self, other: &Active) -> bool {
        match (self, other) {
            (Active::Create(a), Active::Create(b)) => Arc::ptr_eq(a, b),
            (Active::Get(a), Active::Get(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// CTAP command dispatcher
///
/// Receives raw CTAP command bytes (command code followed by CBOR
/// parameters) and produces CTAP response bytes.
pub struct CommandDispatcher {
    authenticator: Arc<dyn Authenticator>,
    timeout: Duration,
    active: Mutex<Option<Active>>,
}

/// Clears the active slot when the ceremony ends or its future is dropped
struct ActiveGuard<'a> {
    dispatcher: &'a CommandDispatcher,
    active: Active,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.dispatcher.active();
        if slot.as_ref().is_some_and(|a| a.is(&self.active)) {
            *slot = None;
        }
    }
}

impl CommandDispatcher {
    /// Create a dispatcher whose ceremonies live at most `timeout`
    pub fn new(authenticator: Arc<dyn Authenticator>, timeout: Duration) -> Self {
        Self {
            authenticator,
            timeout,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a ceremony is in flight
    pub fn is_busy(&self) -> bool {
        self.active().is_some()
    }

    /// Dispatch a CTAP command
    ///
    /// The input data format is:
    /// - First byte: command code
    /// - Remaining bytes: CBOR-encoded command parameters
    pub async fn dispatch(&self, data: &[u8]) -> Result<Vec<u8>> {
        let (&command_code, command_data) = data
            .split_first()
            .ok_or_else(|| Error::invalid_parameters("empty CTAP message"))?;

        let Some(command) = CommandCode::from_u8(command_code) else {
            tracing::debug!(command_code, "unknown CTAP command");
            return Err(Error::InvalidCommand);
        };
        tracing::debug!(?command, len = command_data.len(), "dispatch");

        match command {
            CommandCode::GetInfo => Ok(with_status(StatusCode::Success, get_info::handle()?)),
            CommandCode::MakeCredential => self.make_credential(command_data).await,
            CommandCode::GetAssertion => self.get_assertion(command_data).await,
            CommandCode::Reset => {
                tracing::debug!("reset acknowledged");
                Ok(vec![StatusCode::Success.to_u8()])
            }
            CommandCode::ClientPin | CommandCode::GetNextAssertion => {
                tracing::debug!(?command, "command not supported");
                Err(Error::Unsupported)
            }
        }
    }

    /// Cancel the in-flight ceremony, if any
    pub fn cancel(&self) {
        let active = self.active().clone();
        match active {
            Some(active) => {
                tracing::debug!("cancelling active ceremony");
                active.cancel();
            }
            None => tracing::trace!("cancel with no active ceremony"),
        }
    }

    fn claim(&self, active: Active) -> Result<ActiveGuard<'_>> {
        let mut slot = self.active();
        if slot.is_some() {
            tracing::debug!("ceremony already in progress");
            return Err(Error::BadOperation);
        }
        *slot = Some(active.clone());
        Ok(ActiveGuard {
            dispatcher: self,
            active,
        })
    }

    async fn make_credential(&self, data: &[u8]) -> Result<Vec<u8>> {
        let command = make_credential::parse(data)?;
        let operation = Arc::new(CreateOperation::new(
            command.options,
            command.rp_id,
            self.authenticator.new_make_credential_session(),
            String::new(),
            command.client_data_hash,
            self.timeout,
        ));
        let _guard = self.claim(Active::Create(operation.clone()))?;

        let outcome = operation.start().await;
        Ok(respond(outcome.and_then(|credential| {
            make_credential::encode_response(&credential)
        })))
    }

    async fn get_assertion(&self, data: &[u8]) -> Result<Vec<u8>> {
        let command = get_assertion::parse(data)?;
        let operation = Arc::new(GetOperation::new(
            command.options,
            command.rp_id,
            self.authenticator.new_get_assertion_session(),
            String::new(),
            command.client_data_hash,
            self.timeout,
        ));
        let _guard = self.claim(Active::Get(operation.clone()))?;

        let outcome = operation.start().await;
        Ok(respond(outcome.and_then(|credential| {
            get_assertion::encode_response(&credential)
        })))
    }
}

fn with_status(status: StatusCode, payload: Vec<u8>) -> Vec<u8> {
    let mut response = Vec::with_capacity(1 + payload.len());
    response.push(status.to_u8());
    response.extend(payload);
    response
}

/// Turn a ceremony outcome into a CTAP response
fn respond(outcome: Result<Vec<u8>>) -> Vec<u8> {
    match outcome {
        Ok(payload) => with_status(StatusCode::Success, payload),
        Err(e) => {
            let status = StatusCode::from(&e);
            tracing::debug!(error = %e, %status, "ceremony failed");
            vec![status.to_u8()]
        }
    }
}
