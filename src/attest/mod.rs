pub mod assertion;
pub mod attestation;
pub mod authenticator_data;
pub mod chain;
pub mod nonce;
pub(crate) mod types;

pub use assertion::{bind_payload, verify_assertion};
pub use attestation::{verify_attestation, AttestOptions, EnrolledKey};

#[derive(Debug, thiserror::Error)]
pub enum AttestError {
    #[error("unexpected attestation format")]        BadFormat,
    #[error("certificate chain too short")]          ChainTooShort,
    #[error("certificate chain rejected")]           CertChain,
    #[error("attested credential data flag unset")]  AtFlagUnset,
    #[error("public key is not an uncompressed point")] BadPointFormat,
    #[error("credential id does not match attested key")] CredentialIdMismatch,
    #[error("rpIdHash does not match the configured app id")] RpIdMismatch,
    #[error("nonce extension not found")]            NonceMissing,
    #[error("nonce mismatch")]                       NonceMismatch,
    #[error("counter did not advance")]              Replay,
    #[error("signature rejected")]                   BadSignature,
    #[error("device not enrolled")]                  DeviceUnknown,
    #[error("cbor: {0}")]                            Cbor(String),
    #[error("store: {0}")]                           Store(#[from] crate::store::StoreError),
}

impl AttestError {
    /// Stable wire code. Clients branch on these strings, never on the
    /// display text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadFormat | Self::Cbor(_) => "ErrBadFormat",
            Self::ChainTooShort        => "ErrChainTooShort",
            Self::CertChain            => "ErrCertChain",
            Self::AtFlagUnset          => "ErrAtFlagUnset",
            Self::BadPointFormat       => "ErrBadPointFormat",
            Self::CredentialIdMismatch => "ErrCredentialIdMismatch",
            Self::RpIdMismatch         => "ErrRpIdMismatch",
            Self::NonceMissing         => "ErrNonceMissing",
            Self::NonceMismatch        => "ErrNonceMismatch",
            Self::Replay               => "ErrReplay",
            Self::BadSignature         => "ErrBadSignature",
            Self::DeviceUnknown        => "ErrDeviceUnknown",
            Self::Store(_)             => "ErrStoreUnavailable",
        }
    }
}
