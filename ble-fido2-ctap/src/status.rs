//! CTAP2 response status byte
//!
//! <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#error-responses>

use crate::error::Error;

use thiserror::Error;

/// First byte of every CTAP2 response
///
/// Only the codes this authenticator can produce are listed; anything else
/// read back from the wire collapses to [`StatusCode::Other`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    #[error("success")]
    Success = 0x00,
    #[error("invalid command")]
    InvalidCommand = 0x01,
    #[error("invalid parameter")]
    InvalidParameter = 0x02,
    #[error("channel busy")]
    ChannelBusy = 0x06,
    #[error("invalid CBOR")]
    InvalidCbor = 0x12,
    #[error("unsupported option")]
    UnsupportedOption = 0x2B,
    #[error("cancelled by keepalive")]
    KeepaliveCancel = 0x2D,
    #[error("user action timed out")]
    UserActionTimeout = 0x2F,
    #[error("not allowed")]
    NotAllowed = 0x30,
    #[error("unspecified error")]
    Other = 0x7F,
}

impl StatusCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        [
            Self::Success,
            Self::InvalidCommand,
            Self::InvalidParameter,
            Self::ChannelBusy,
            Self::InvalidCbor,
            Self::UnsupportedOption,
            Self::KeepaliveCancel,
            Self::UserActionTimeout,
            Self::NotAllowed,
        ]
        .into_iter()
        .find(|code| code.to_u8() == value)
        .unwrap_or(Self::Other)
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<&Error> for StatusCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::MalformedEncoding(_) => Self::InvalidCbor,
            Error::InvalidCommand => Self::InvalidCommand,
            Error::InvalidParameters(_) => Self::InvalidParameter,
            Error::Unsupported => Self::UnsupportedOption,
            Error::Timeout => Self::UserActionTimeout,
            Error::NotAllowed => Self::NotAllowed,
            Error::BadOperation => Self::ChannelBusy,
            Error::Cancelled => Self::KeepaliveCancel,
            Error::KeyGenerationFailed | Error::SigningFailed | Error::EncodingFailed => {
                Self::Other
            }
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> u8 {
        status.to_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_values() {
        for code in [
            StatusCode::Success,
            StatusCode::ChannelBusy,
            StatusCode::UserActionTimeout,
            StatusCode::NotAllowed,
        ] {
            assert_eq!(StatusCode::from_u8(code.to_u8()), code);
        }
        assert_eq!(StatusCode::from_u8(0x2E), StatusCode::Other);
        assert_eq!(u8::from(StatusCode::UnsupportedOption), 0x2B);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(StatusCode::from(&Error::Timeout), StatusCode::UserActionTimeout);
        assert_eq!(StatusCode::from(&Error::Cancelled), StatusCode::KeepaliveCancel);
        assert_eq!(StatusCode::from(&Error::SigningFailed), StatusCode::Other);
        assert_eq!(
            StatusCode::from(&Error::MalformedEncoding("truncated".into())),
            StatusCode::InvalidCbor
        );
        assert_eq!(StatusCode::Other.to_string(), "unspecified error");
    }
}
