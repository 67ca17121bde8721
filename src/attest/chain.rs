use std::sync::OnceLock;

use x509_parser::prelude::*;

use super::AttestError;

/// Apple App Attestation Root CA, pinned at compile time. All enrollment
/// chains must terminate here.
const APPLE_ROOT_PEM: &str = "-----BEGIN CERTIFICATE-----
MIICITCCAaegAwIBAgIQC/O+DvHN0uD7jG5yH2IXmDAKBggqhkjOPQQDAzBSMSYw
JAYDVQQDDB1BcHBsZSBBcHAgQXR0ZXN0YXRpb24gUm9vdCBDQTETMBEGA1UECgwK
QXBwbGUgSW5jLjETMBEGA1UECAwKQ2FsaWZvcm5pYTAeFw0yMDAzMTgxODMyNTNa
Fw00NTAzMTUwMDAwMDBaMFIxJjAkBgNVBAMMHUFwcGxlIEFwcCBBdHRlc3RhdGlv
biBSb290IENBMRMwEQYDVQQKDApBcHBsZSBJbmMuMRMwEQYDVQQIDApDYWxpZm9y
bmlhMHYwEAYHKoZIzj0CAQYFK4EEACIDYgAERTHhmLW07ATaFQIEVwTtT4dyctdh
NbJhFs/Ii2FdCgAHGbpphY3+d8qjuDngIN3WVhQUBHAoMeQ/cLiP1sOUtgjqK9au
Yen1mMEvRq9Sk3Jm5X8U62H+xTD3FE9TgS41o0IwQDAPBgNVHRMBAf8EBTADAQH/
MB0GA1UdDgQWBBSskRBTM72+aEH/pwyp5frq5eWKoTAOBgNVHQ8BAf8EBAMCAQYw
CgYIKoZIzj0EAwMDaAAwZQIwQgFGnByvsiVbpTKwSga0kP0e8EeDS4+sQmTvb7vn
53O5+FRXgeLhpJ06ysC5PrOyAjEAp5U4xDgEgllF7En3VcE3iexZZtKeYnpqtijV
oyFraWVIyd/dganmrduC1bmTBGwD
-----END CERTIFICATE-----";

/// Public key material lifted from a validated leaf certificate.
#[derive(Debug)]
pub(crate) struct LeafKey {
    /// DER SubjectPublicKeyInfo, exactly as it appears in the leaf.
    pub spki_der: Vec<u8>,
    /// Uncompressed P-256 point, 0x04 || X || Y.
    pub point: [u8; 65],
}

/// DER of the pinned root, decoded once. Public so operators and test
/// tooling can confirm which root the build trusts.
pub fn apple_root_der() -> &'static [u8] {
    static ROOT: OnceLock<Vec<u8>> = OnceLock::new();
    ROOT.get_or_init(|| {
        let (_, pem) = x509_parser::pem::parse_x509_pem(APPLE_ROOT_PEM.as_bytes())
            .expect("pinned root PEM parses");
        pem.contents
    })
}

/// Validate an attestation x5c chain (leaf first) against the pinned root
/// and extract the leaf's public key.
///
/// Only leaf <- intermediate <- pinned-root signatures are checked;
/// certificates beyond the first two are ignored. Each checked certificate
/// must also be inside its own validity window. No revocation checking.
pub(crate) fn verify_chain(x5c: &[Vec<u8>]) -> Result<LeafKey, AttestError> {
    if x5c.len() < 2 {
        return Err(AttestError::ChainTooShort);
    }

    let (_, leaf) =
        parse_x509_certificate(&x5c[0]).map_err(|_| AttestError::CertChain)?;
    let (_, intermediate) =
        parse_x509_certificate(&x5c[1]).map_err(|_| AttestError::CertChain)?;
    let (_, root) =
        parse_x509_certificate(apple_root_der()).map_err(|_| AttestError::CertChain)?;

    intermediate
        .verify_signature(Some(root.public_key()))
        .map_err(|_| AttestError::CertChain)?;
    leaf.verify_signature(Some(intermediate.public_key()))
        .map_err(|_| AttestError::CertChain)?;

    if !leaf.validity().is_valid() || !intermediate.validity().is_valid() {
        return Err(AttestError::CertChain);
    }

    let spki_der = leaf.tbs_certificate.subject_pki.raw.to_vec();
    extract_point(&spki_der).map(|point| LeafKey { spki_der, point })
}

/// The uncompressed EC point is the trailing 65 bytes of a P-256 SPKI and
/// must carry the 0x04 uncompressed-form tag.
fn extract_point(spki_der: &[u8]) -> Result<[u8; 65], AttestError> {
    if spki_der.len() < 65 {
        return Err(AttestError::BadPointFormat);
    }
    let window = &spki_der[spki_der.len() - 65..];
    if window[0] != 0x04 {
        return Err(AttestError::BadPointFormat);
    }
    Ok(window.try_into().expect("65-byte window"))
}
