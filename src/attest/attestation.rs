use base64::Engine as _;
use sha2::{Digest, Sha256};

use super::authenticator_data;
use super::chain;
use super::nonce;
use super::types::AttestationObject;
use super::AttestError;
use crate::store::{DeviceRecord, DeviceStore};

const APPLE_ATTESTATION_FMT: &str = "apple-appattest";

/// Verification policy derived from service configuration.
#[derive(Debug, Clone, Default)]
pub struct AttestOptions {
    /// Accept only SHA-256(authData || SHA-256(challenge)). The default
    /// additionally accepts the raw-challenge form some clients produce.
    pub strict_nonce: bool,
    /// SHA-256 of the expected App ID (`TEAMID.bundle.id`); when set, the
    /// authenticator data rpIdHash must match it.
    pub rp_id_hash: Option<[u8; 32]>,
}

/// Outcome of a successful enrollment.
pub struct EnrolledKey {
    /// 32-byte credential id, SHA-256 of the attested uncompressed point.
    pub credential_id: [u8; 32],
    /// DER SubjectPublicKeyInfo of the attested P-256 key.
    pub public_key_der: Vec<u8>,
}

/// Verify a one-time App Attest attestation and enroll the device.
///
/// Runs the full pipeline: CBOR envelope, certificate chain to the pinned
/// Apple root, attested-credential checks, credential-id binding, nonce
/// binding. Any failure returns a typed error and writes nothing. On
/// success a fresh record is upserted with counter 0, so resubmitting the
/// same attestation is idempotent.
pub async fn verify_attestation(
    store: &dyn DeviceStore,
    attestation: &[u8],
    challenge: &[u8],
    key_id_b64: &str,
    opts: &AttestOptions,
) -> Result<EnrolledKey, AttestError> {
    let envelope = AttestationObject::try_from(attestation)?;
    if envelope.fmt != APPLE_ATTESTATION_FMT {
        return Err(AttestError::BadFormat);
    }
    if envelope.x5c.len() < 2 {
        return Err(AttestError::ChainTooShort);
    }

    let leaf = chain::verify_chain(&envelope.x5c)?;

    let auth_data = authenticator_data::parse(&envelope.auth_data)?;
    if !auth_data.at_flag() {
        return Err(AttestError::AtFlagUnset);
    }
    // At enrollment the sign counter has never been used.
    if auth_data.counter != 0 {
        return Err(AttestError::BadFormat);
    }
    if let Some(expected) = opts.rp_id_hash {
        if auth_data.rp_id_hash != expected {
            return Err(AttestError::RpIdMismatch);
        }
    }
    let attested = auth_data
        .attested
        .as_ref()
        .ok_or(AttestError::AtFlagUnset)?;

    // The credential id must be SHA-256 of the attested point, and the
    // caller-supplied key id must agree with both.
    let credential_id: [u8; 32] = Sha256::digest(leaf.point).into();
    if attested.credential_id != credential_id {
        return Err(AttestError::CredentialIdMismatch);
    }
    let claimed = base64::engine::general_purpose::STANDARD
        .decode(key_id_b64)
        .map_err(|_| AttestError::CredentialIdMismatch)?;
    if claimed != credential_id {
        return Err(AttestError::CredentialIdMismatch);
    }

    let cert_nonce =
        nonce::extract_cert_nonce(&envelope.x5c[0]).ok_or(AttestError::NonceMissing)?;
    let (spec_form, raw_form) = nonce::expected_nonces(&envelope.auth_data, challenge);
    let accepted = cert_nonce == spec_form || (!opts.strict_nonce && cert_nonce == raw_form);
    if !accepted {
        return Err(AttestError::NonceMismatch);
    }

    let record = DeviceRecord::enrolled(
        base64::engine::general_purpose::STANDARD.encode(credential_id),
        base64::engine::general_purpose::STANDARD.encode(&leaf.spki_der),
    );
    store.put(record).await?;

    tracing::info!(
        key_id = %base64::engine::general_purpose::STANDARD.encode(credential_id),
        "device enrolled"
    );

    Ok(EnrolledKey {
        credential_id,
        public_key_der: leaf.spki_der,
    })
}
