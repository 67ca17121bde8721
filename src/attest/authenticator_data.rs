use super::AttestError;

/// Attested-credential-data present.
pub(crate) const FLAG_AT: u8 = 0x40;

/// Fixed-layout authenticator data blob:
/// rpIdHash (32) || flags (1) || counter (BE u32) || [aaguid (16) ||
/// credentialIdLen (BE u16) || credentialId].
pub(crate) struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    pub attested: Option<AttestedCredential>,
}

pub(crate) struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
}

impl AuthenticatorData {
    pub fn at_flag(&self) -> bool {
        self.flags & FLAG_AT != 0
    }
}

/// Parse `data`, reading the attested credential section only when the AT
/// flag is set. Every read is bounds-checked; truncated input is rejected,
/// never panicked on.
pub(crate) fn parse(data: &[u8]) -> Result<AuthenticatorData, AttestError> {
    if data.len() < 37 {
        return Err(AttestError::BadFormat);
    }
    let rp_id_hash: [u8; 32] = data[..32].try_into().expect("32-byte window");
    let flags = data[32];
    let counter = u32::from_be_bytes(data[33..37].try_into().expect("4-byte window"));

    let attested = if flags & FLAG_AT != 0 {
        if data.len() < 55 {
            return Err(AttestError::BadFormat);
        }
        let aaguid: [u8; 16] = data[37..53].try_into().expect("16-byte window");
        let cred_id_len = u16::from_be_bytes(data[53..55].try_into().expect("2-byte window")) as usize;
        let end = 55usize
            .checked_add(cred_id_len)
            .ok_or(AttestError::BadFormat)?;
        if end > data.len() {
            return Err(AttestError::BadFormat);
        }
        Some(AttestedCredential {
            aaguid,
            credential_id: data[55..end].to_vec(),
        })
    } else {
        None
    };

    Ok(AuthenticatorData { rp_id_hash, flags, counter, attested })
}
