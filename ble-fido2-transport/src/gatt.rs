//! FIDO GATT service layout
//!
//! Static table of the characteristics exposed by the FIDO service. The
//! platform BLE stack registers these and routes reads and writes to
//! [`BleFidoService`](crate::service::BleFidoService).

/// 16-bit FIDO service UUID
pub const FIDO_SERVICE_UUID: &str = "0xFFFD";

/// Service revision advertised and accepted by this authenticator (FIDO2)
pub const SERVICE_REVISION_FIDO2: u8 = 0x20;

/// Access rights of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Properties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
    /// Requires an encrypted link
    pub secure: bool,
}

/// Characteristics of the FIDO service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Client writes request frames here
    ControlPoint,
    /// Authenticator notifies response frames here
    Status,
    /// Maximum frame size, big-endian u16
    ControlPointLength,
    /// Supported FIDO protocol revisions
    ServiceRevisionBitfield,
}

impl Characteristic {
    /// Every characteristic of the service, in registration order
    pub const ALL: [Characteristic; 4] = [
        Characteristic::ControlPoint,
        Characteristic::Status,
        Characteristic::ControlPointLength,
        Characteristic::ServiceRevisionBitfield,
    ];

    pub fn uuid(self) -> &'static str {
        match self {
            Characteristic::ControlPoint => "F1D0FFF1-DEAA-ECEE-B42F-C9BA7ED623BB",
            Characteristic::Status => "F1D0FFF2-DEAA-ECEE-B42F-C9BA7ED623BB",
            Characteristic::ControlPointLength => "F1D0FFF3-DEAA-ECEE-B42F-C9BA7ED623BB",
            Characteristic::ServiceRevisionBitfield => "F1D0FFF4-DEAA-ECEE-B42F-C9BA7ED623BB",
        }
    }

    /// Look up a characteristic by UUID, ignoring case
    pub fn from_uuid(uuid: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.uuid().eq_ignore_ascii_case(uuid))
    }

    pub fn properties(self) -> Properties {
        match self {
            Characteristic::ControlPoint => Properties {
                read: false,
                write: true,
                notify: false,
                secure: true,
            },
            Characteristic::Status => Properties {
                read: false,
                write: false,
                notify: true,
                secure: true,
            },
            Characteristic::ControlPointLength => Properties {
                read: true,
                write: false,
                notify: false,
                secure: true,
            },
            Characteristic::ServiceRevisionBitfield => Properties {
                read: true,
                write: true,
                notify: false,
                secure: true,
            },
        }
    }
}
