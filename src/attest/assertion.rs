use base64::Engine as _;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};

use super::authenticator_data;
use super::types::AssertionObject;
use super::AttestError;
use crate::store::{DevicePatch, DeviceStore, StoreError};

/// Canonical bound payload. The client signs these exact bytes: two keys,
/// `passportHash` then `evmAddress`, compact JSON, values as received.
/// Any deviation here breaks signature verification for every client.
pub fn bind_payload(passport_hash: &str, evm_address: &str) -> Vec<u8> {
    format!(r#"{{"passportHash":"{passport_hash}","evmAddress":"{evm_address}"}}"#).into_bytes()
}

/// Verify a per-operation assertion binding (passportHash, evmAddress) to
/// an enrolled device, then advance the stored record.
///
/// The store re-checks the counter inside its own critical section, so two
/// racing assertions with the same counter cannot both commit; the check
/// here only reports ErrReplay before signature work is spent.
pub async fn verify_assertion(
    store: &dyn DeviceStore,
    assertion: &[u8],
    key_id_b64: &str,
    passport_hash: &str,
    evm_address: &str,
) -> Result<(), AttestError> {
    let record = store
        .get(key_id_b64)
        .await?
        .ok_or(AttestError::DeviceUnknown)?;

    let envelope = AssertionObject::try_from(assertion)?;
    let auth_data = authenticator_data::parse(&envelope.authenticator_data)?;
    if auth_data.counter <= record.counter {
        return Err(AttestError::Replay);
    }

    let payload = bind_payload(passport_hash, evm_address);
    let client_data_hash = Sha256::digest(&payload);
    let mut hasher = Sha256::new();
    hasher.update(&envelope.authenticator_data);
    hasher.update(client_data_hash);
    let message: [u8; 32] = hasher.finalize().into();

    let spki_der = base64::engine::general_purpose::STANDARD
        .decode(&record.public_key_der)
        .map_err(|e| StoreError::Corrupt(format!("public key for {key_id_b64}: {e}")))?;
    let verifying_key = VerifyingKey::from_public_key_der(&spki_der)
        .map_err(|e| StoreError::Corrupt(format!("public key for {key_id_b64}: {e}")))?;
    let signature =
        Signature::from_der(&envelope.signature).map_err(|_| AttestError::BadSignature)?;
    verifying_key
        .verify_prehash(&message, &signature)
        .map_err(|_| AttestError::BadSignature)?;

    let patch = DevicePatch {
        counter: auth_data.counter,
        evm_address: evm_address.to_ascii_lowercase(),
        passport_hash: passport_hash.to_string(),
    };
    match store.update(key_id_b64, patch).await {
        Ok(()) => {}
        Err(StoreError::CounterConflict) => return Err(AttestError::Replay),
        Err(StoreError::NotFound) => return Err(AttestError::DeviceUnknown),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(key_id = %key_id_b64, counter = auth_data.counter, "binding updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_payload_is_byte_stable() {
        let payload = bind_payload(
            "abcdef0123456789",
            "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
        );
        assert_eq!(
            payload,
            br#"{"passportHash":"abcdef0123456789","evmAddress":"0x742d35Cc6634C0532925a3b844Bc454e4438f44e"}"#
        );
    }

    #[test]
    fn test_bind_payload_has_no_whitespace() {
        let payload = bind_payload("aa", "0xbb");
        assert!(!payload.iter().any(|b| b.is_ascii_whitespace()));
    }
}
