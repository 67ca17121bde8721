use sha2::{Digest, Sha256};

/// DER encoding of OID 1.2.840.113635.100.8.2, the Apple App Attest
/// nonce extension.
const APPLE_NONCE_OID: [u8; 11] = [
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x63, 0x64, 0x08, 0x02,
];

const MAX_DEPTH: usize = 10;

/// Locate the nonce extension in the leaf certificate's raw DER and return
/// the 32-byte nonce it carries.
///
/// Apple has varied the exact structure inside the extension over time, so
/// instead of committing to one layout this scans for the OID and then
/// walks TLV nodes below it for the first 32-byte OCTET STRING.
pub(crate) fn extract_cert_nonce(leaf_der: &[u8]) -> Option<[u8; 32]> {
    let at = leaf_der
        .windows(APPLE_NONCE_OID.len())
        .position(|w| w == APPLE_NONCE_OID)?;
    let payload = &leaf_der[at + APPLE_NONCE_OID.len()..];
    find_octet32(payload, 0)
}

/// Recursive TLV walk. Constructed nodes (and SEQUENCE / SET / OCTET
/// STRING, which Apple nests the nonce under) are descended into; recursion
/// is capped to keep pathological input from blowing the stack.
fn find_octet32(b: &[u8], depth: usize) -> Option<[u8; 32]> {
    if depth > MAX_DEPTH || b.len() < 2 {
        return None;
    }
    let mut i = 0usize;
    while i < b.len() {
        let tag = b[i];
        i += 1;
        if i >= b.len() {
            break;
        }
        let mut length = b[i] as usize;
        i += 1;
        if length & 0x80 != 0 {
            let n = length & 0x7f;
            if n == 0 || n > 8 || i + n > b.len() {
                break;
            }
            length = 0;
            for &byte in &b[i..i + n] {
                length = length << 8 | byte as usize;
            }
            i += n;
        }
        if length > b.len() || i + length > b.len() {
            break;
        }
        let value = &b[i..i + length];
        i += length;

        if tag == 0x04 && value.len() == 32 {
            return Some(value.try_into().expect("32-byte window"));
        }
        if tag & 0x20 != 0 || matches!(tag, 0x30 | 0x31 | 0x04) {
            if let Some(found) = find_octet32(value, depth + 1) {
                return Some(found);
            }
        }
    }
    None
}

/// The two nonce derivations seen in the wild. Apple's spec mandates
/// `SHA-256(authData || SHA-256(challenge))`; some clients hash the
/// challenge themselves before shipping it and effectively sign
/// `SHA-256(authData || challenge)`.
pub(crate) fn expected_nonces(auth_data: &[u8], challenge: &[u8]) -> ([u8; 32], [u8; 32]) {
    let challenge_hash = Sha256::digest(challenge);

    let mut hasher = Sha256::new();
    hasher.update(auth_data);
    hasher.update(challenge_hash);
    let spec_form: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(auth_data);
    hasher.update(challenge);
    let raw_form: [u8; 32] = hasher.finalize().into();

    (spec_form, raw_form)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn der_len(len: usize) -> Vec<u8> {
        if len < 128 {
            vec![len as u8]
        } else if len < 256 {
            vec![0x81, len as u8]
        } else {
            vec![0x82, (len >> 8) as u8, (len & 0xff) as u8]
        }
    }

    fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&der_len(value.len()));
        out.extend_from_slice(value);
        out
    }

    /// Nonce wrapped in `wrappers` nested OCTET STRING containers, preceded
    /// by the extension OID, the way it sits inside a certificate.
    fn cert_like(wrappers: usize, nonce: &[u8; 32]) -> Vec<u8> {
        let mut inner = tlv(0x04, nonce);
        for _ in 0..wrappers {
            inner = tlv(0x04, &inner);
        }
        let mut der = vec![0x30, 0x82, 0x01, 0x00]; // unrelated leading bytes
        der.extend_from_slice(&APPLE_NONCE_OID);
        der.extend_from_slice(&inner);
        der
    }

    #[test]
    fn test_nonce_found_in_sequence_wrapper() {
        let nonce = [0x5au8; 32];
        let der = cert_like(1, &nonce);
        assert_eq!(extract_cert_nonce(&der), Some(nonce));
    }

    #[test]
    fn test_nonce_found_at_depth_ten() {
        let nonce = [0x11u8; 32];
        let der = cert_like(10, &nonce);
        assert_eq!(extract_cert_nonce(&der), Some(nonce));
    }

    #[test]
    fn test_nonce_rejected_at_depth_eleven() {
        let nonce = [0x22u8; 32];
        let der = cert_like(11, &nonce);
        assert_eq!(extract_cert_nonce(&der), None);
    }

    #[test]
    fn test_missing_oid_yields_none() {
        let nonce = [0x33u8; 32];
        let der = tlv(0x04, &nonce);
        assert_eq!(extract_cert_nonce(&der), None);
    }

    #[test]
    fn test_wrong_size_octet_string_skipped() {
        let mut der = APPLE_NONCE_OID.to_vec();
        der.extend_from_slice(&tlv(0x04, &[0u8; 16]));
        assert_eq!(extract_cert_nonce(&der), None);
    }

    #[test]
    fn test_long_form_length_handled() {
        // A 200-byte constructed wrapper forces the 0x81 long-form length.
        let nonce = [0x44u8; 32];
        let mut padded = tlv(0x04, &nonce);
        padded.extend_from_slice(&tlv(0x05, &vec![0u8; 160])); // NULL-tagged filler
        let mut der = APPLE_NONCE_OID.to_vec();
        der.extend_from_slice(&tlv(0x30, &padded));
        assert_eq!(extract_cert_nonce(&der), Some(nonce));
    }

    #[test]
    fn test_truncated_tlv_does_not_panic() {
        let mut der = APPLE_NONCE_OID.to_vec();
        der.extend_from_slice(&[0x30, 0x82, 0xff]); // length runs past the end
        assert_eq!(extract_cert_nonce(&der), None);
    }

    #[test]
    fn test_expected_nonces_differ() {
        let (spec_form, raw_form) = expected_nonces(b"auth", b"challenge");
        assert_ne!(spec_form, raw_form);
    }
}
