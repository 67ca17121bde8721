use serde::{Deserialize, Serialize};

/// Authoritative row for one enrolled hardware key.
///
/// `credential_id` and `public_key_der` travel and persist as base64 text.
/// The public key never changes after enrollment; only `counter`,
/// `evm_address` and `passport_hash` move, and only through a successful
/// assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub credential_id: String,
    pub public_key_der: String,
    pub counter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport_hash: Option<String>,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl DeviceRecord {
    /// Fresh record as written by a successful attestation: counter 0,
    /// no binding yet.
    pub fn enrolled(credential_id: String, public_key_der: String) -> Self {
        DeviceRecord {
            credential_id,
            public_key_der,
            counter: 0,
            evm_address: None,
            passport_hash: None,
            created_at: unix_now(),
            updated_at: None,
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
