//! End-to-end tests
//!
//! Runs WebAuthn ceremonies through the client layer and CTAP2 commands
//! through the BLE service, both backed by the internal authenticator and
//! the software key store.

use ble_fido2::crypto::ecdsa;
use ble_fido2::ctap::attestation::{AttestationFormat, AttestationObject, AAGUID_OFFSET};
use ble_fido2::ctap::cbor::{self, Value};
use ble_fido2::ctap::types::{AttestationConveyancePreference, UserVerificationRequirement};
use ble_fido2::ctap::{AuthenticatorData, CoseKey};
use ble_fido2::transport::{
    split_to_bytes, BleCommand, Characteristic, ErrorCode, FrameBuffer, ReassemblyResult,
};
use ble_fido2::{
    ble, AuthenticatorConfig, AutoConsent, CtapBleService, Error, InternalAuthenticator,
    MemoryCredentialStore, Notifier, PublicKeyCredentialCreationOptions,
    PublicKeyCredentialDescriptor, PublicKeyCredentialRequestOptions,
    PublicKeyCredentialRpEntity, PublicKeyCredentialUserEntity, ServiceConfig, SoftwareKeyStore,
    WebAuthnClient,
};

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

const ORIGIN: &str = "https://login.example.com";
const CENTRAL: &str = "AA:BB:CC:DD:EE:FF";

fn authenticator(aaguid: [u8; 16]) -> InternalAuthenticator {
    InternalAuthenticator::new(
        AuthenticatorConfig::new().with_aaguid(aaguid),
        Arc::new(AutoConsent),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(SoftwareKeyStore::new()),
    )
}

fn creation_options() -> PublicKeyCredentialCreationOptions {
    let mut options = PublicKeyCredentialCreationOptions::new(
        PublicKeyCredentialRpEntity::new("example.com", "Example"),
        PublicKeyCredentialUserEntity::new(b"user-42".to_vec(), "alice", "Alice"),
        b"registration challenge".to_vec(),
    );
    options.add_pub_key_cred_param(-7);
    options
}

#[tokio::test]
async fn test_discouraged_registration_is_packed() {
    let client = WebAuthnClient::new(ORIGIN, Arc::new(authenticator([0x11; 16]))).unwrap();

    let mut options = creation_options();
    options.attestation = AttestationConveyancePreference::Direct;
    assert!(options.authenticator_selection.is_none());

    let credential = client.create(options).await.unwrap();
    let object = AttestationObject::from_bytes(&credential.response.attestation_object).unwrap();
    assert_eq!(object.format(), AttestationFormat::Packed);
    assert!(object.auth_data.user_present);
    assert!(!object.auth_data.user_verified);

    let attested = object.auth_data.attested_credential_data.unwrap();
    assert_eq!(attested.aaguid, [0x11; 16]);
    assert_eq!(credential.raw_id, attested.credential_id);

    let client_data: serde_json::Value =
        serde_json::from_str(&credential.response.client_data_json).unwrap();
    assert_eq!(client_data["type"], "webauthn.create");
    assert_eq!(client_data["origin"], ORIGIN);
}

#[tokio::test]
async fn test_no_conveyance_reduces_to_none() {
    let client = WebAuthnClient::new(ORIGIN, Arc::new(authenticator([0x11; 16]))).unwrap();

    let credential = client.create(creation_options()).await.unwrap();
    let bytes = &credential.response.attestation_object;
    let object = AttestationObject::from_bytes(bytes).unwrap();
    assert_eq!(object.format(), AttestationFormat::None);

    let encoded = cbor::decode(bytes).unwrap();
    let auth_data = encoded.get_text("authData").and_then(Value::as_bytes).unwrap();
    assert_eq!(&auth_data[AAGUID_OFFSET..AAGUID_OFFSET + 16], &[0u8; 16]);
    assert_eq!(encoded.get_text("attStmt").and_then(Value::as_map), Some(&[][..]));
}

#[tokio::test]
async fn test_assertion_signature_verifies() {
    let client = WebAuthnClient::new(ORIGIN, Arc::new(authenticator([0; 16]))).unwrap();

    let mut options = creation_options();
    options.attestation = AttestationConveyancePreference::Direct;
    let created = client.create(options).await.unwrap();
    let object = AttestationObject::from_bytes(&created.response.attestation_object).unwrap();
    let attested = object.auth_data.attested_credential_data.unwrap();
    let CoseKey::Ec2 { x, y, .. } = attested.credential_public_key else {
        panic!("expected an EC2 credential key");
    };

    let mut request = PublicKeyCredentialRequestOptions::new(b"login challenge".to_vec());
    request.rp_id = Some("example.com".to_string());
    request.add_allow_credential(PublicKeyCredentialDescriptor::new(created.raw_id.clone()));
    request.user_verification = UserVerificationRequirement::Preferred;
    let assertion = client.get(request).await.unwrap();

    assert_eq!(assertion.raw_id, created.raw_id);
    assert_eq!(assertion.response.user_handle.as_deref(), Some(&b"user-42"[..]));

    let data = AuthenticatorData::from_bytes(&assertion.response.authenticator_data).unwrap();
    assert_eq!(data.rp_id_hash, object.auth_data.rp_id_hash);
    assert!(data.user_verified);
    assert_eq!(data.sign_count, 1);

    let mut signed = assertion.response.authenticator_data.clone();
    signed.extend_from_slice(&Sha256::digest(assertion.response.client_data_json.as_bytes()));
    ecdsa::verify(&x, &y, &signed, &assertion.response.signature).unwrap();
}

#[tokio::test]
async fn test_rp_id_must_match_origin() {
    let client = WebAuthnClient::new(ORIGIN, Arc::new(authenticator([0; 16]))).unwrap();

    let mut options = creation_options();
    options.rp.id = Some("other.org".to_string());
    assert!(matches!(
        client.create(options).await,
        Err(Error::RpIdMismatch(_))
    ));

    assert!(matches!(
        WebAuthnClient::new("login.example.com", Arc::new(authenticator([0; 16]))),
        Err(Error::InvalidOrigin(_))
    ));
}

struct ChannelNotifier(UnboundedSender<Vec<u8>>);

impl Notifier for ChannelNotifier {
    fn notify(&self, _characteristic: Characteristic, value: &[u8]) {
        let _ = self.0.send(value.to_vec());
    }
}

fn ble_service() -> (Arc<CtapBleService>, UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let service = ble::internal_service(
        authenticator([0; 16]),
        ServiceConfig::new(),
        Arc::new(ChannelNotifier(tx)),
    )
    .unwrap();
    assert!(service.on_connected(CENTRAL));
    (service, rx)
}

async fn read_message(notifications: &mut UnboundedReceiver<Vec<u8>>) -> (BleCommand, Vec<u8>) {
    let mut buffer = FrameBuffer::new();
    loop {
        let frame = notifications.recv().await.expect("service stopped notifying");
        match buffer.put_fragment(&frame) {
            ReassemblyResult::InProgress => continue,
            ReassemblyResult::Complete(command, payload) => return (command, payload),
            ReassemblyResult::Error(err) => panic!("bad notification: {}", err),
        }
    }
}

#[tokio::test]
async fn test_get_info_over_ble() {
    let (service, mut notifications) = ble_service();

    for frame in split_to_bytes(BleCommand::Msg, &[0x04], 20).unwrap() {
        service
            .handle_write(CENTRAL, Characteristic::ControlPoint, &frame)
            .await
            .unwrap();
    }

    let (command, response) = read_message(&mut notifications).await;
    assert_eq!(command, BleCommand::Msg);
    assert_eq!(response[0], 0x00);

    let info = cbor::decode(&response[1..]).unwrap();
    assert_eq!(info.get_text("versions").and_then(Value::as_text), Some("FIDO_2_0"));
    assert_eq!(info.get_text("aaguid").and_then(Value::as_bytes), Some(&[0u8; 16][..]));
    let options = info.get_text("options").unwrap();
    assert_eq!(options.get_text("plat").and_then(Value::as_bool), Some(false));
    assert_eq!(options.get_text("rk").and_then(Value::as_bool), Some(true));
    assert_eq!(options.get_text("up").and_then(Value::as_bool), Some(true));
    assert_eq!(options.get_text("uv").and_then(Value::as_bool), Some(true));
}

#[tokio::test]
async fn test_client_pin_closes_with_invalid_command() {
    let (service, mut notifications) = ble_service();

    for frame in split_to_bytes(BleCommand::Msg, &[0x06, 0xA0], 20).unwrap() {
        service
            .handle_write(CENTRAL, Characteristic::ControlPoint, &frame)
            .await
            .unwrap();
    }

    let (command, payload) = read_message(&mut notifications).await;
    assert_eq!(command, BleCommand::Error);
    assert_eq!(payload, ErrorCode::InvalidCmd.to_payload().to_vec());

    while !service.is_closed() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_skipped_sequence_closes_with_invalid_seq() {
    let (service, mut notifications) = ble_service();

    let frames = split_to_bytes(BleCommand::Msg, &[0x5A; 100], 20).unwrap();
    assert!(frames.len() > 4);
    for frame in [&frames[0], &frames[1], &frames[2], &frames[4]] {
        service
            .handle_write(CENTRAL, Characteristic::ControlPoint, frame)
            .await
            .unwrap();
    }

    let (command, payload) = read_message(&mut notifications).await;
    assert_eq!(command, BleCommand::Error);
    assert_eq!(payload, ErrorCode::InvalidSeq.to_payload().to_vec());
    assert!(service.is_closed());
}
