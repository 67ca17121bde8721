use ciborium::value::Value;

use super::AttestError;

/// Attestation object returned by DCAppAttestService at key creation.
pub(crate) struct AttestationObject {
    pub fmt: String,
    pub x5c: Vec<Vec<u8>>,
    pub auth_data: Vec<u8>,
}

/// Per-operation assertion object.
pub(crate) struct AssertionObject {
    pub signature: Vec<u8>,
    pub authenticator_data: Vec<u8>,
}

// CBOR parsing helpers

pub(crate) fn parse_cbor(data: &[u8]) -> Result<Vec<(Value, Value)>, AttestError> {
    let value: Value =
        ciborium::from_reader(data).map_err(|e| AttestError::Cbor(e.to_string()))?;
    match value {
        Value::Map(map) => Ok(map),
        _ => Err(AttestError::Cbor("expected map".into())),
    }
}

pub(crate) fn cbor_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
        .map(|(_, v)| v)
}

pub(crate) fn cbor_bytes(v: &Value) -> Option<&[u8]> {
    match v { Value::Bytes(b) => Some(b), _ => None }
}

pub(crate) fn cbor_text(v: &Value) -> Option<&str> {
    match v { Value::Text(s) => Some(s), _ => None }
}

pub(crate) fn cbor_map(v: &Value) -> Option<&[(Value, Value)]> {
    match v { Value::Map(m) => Some(m), _ => None }
}

pub(crate) fn cbor_array(v: &Value) -> Option<&[Value]> {
    match v { Value::Array(a) => Some(a), _ => None }
}

fn missing(field: &str) -> AttestError {
    AttestError::Cbor(format!("missing {field}"))
}

impl TryFrom<&[u8]> for AttestationObject {
    type Error = AttestError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let map = parse_cbor(data)?;

        let fmt = cbor_get(&map, "fmt")
            .and_then(cbor_text)
            .ok_or_else(|| missing("fmt"))?
            .to_string();

        let att_stmt = cbor_get(&map, "attStmt")
            .and_then(cbor_map)
            .ok_or_else(|| missing("attStmt"))?;
        let x5c = cbor_get(att_stmt, "x5c")
            .and_then(cbor_array)
            .ok_or_else(|| missing("x5c"))?
            .iter()
            .filter_map(|v| cbor_bytes(v).map(|b| b.to_vec()))
            .collect();

        let auth_data = cbor_get(&map, "authData")
            .and_then(cbor_bytes)
            .ok_or_else(|| missing("authData"))?
            .to_vec();

        Ok(AttestationObject { fmt, x5c, auth_data })
    }
}

impl TryFrom<&[u8]> for AssertionObject {
    type Error = AttestError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let map = parse_cbor(data)?;

        let signature = cbor_get(&map, "signature")
            .and_then(cbor_bytes)
            .ok_or_else(|| missing("signature"))?
            .to_vec();
        let authenticator_data = cbor_get(&map, "authenticatorData")
            .and_then(cbor_bytes)
            .ok_or_else(|| missing("authenticatorData"))?
            .to_vec();

        Ok(AssertionObject { signature, authenticator_data })
    }
}
