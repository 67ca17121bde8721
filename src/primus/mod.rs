use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::OnceCell;

type HmacSha256 = Hmac<Sha256>;

const GATEWAY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const ALGORITHM_PROXY_TLS: &str = "proxytls";

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("PRIMUS_APP_ID / PRIMUS_APP_SECRET not configured")]
    MissingCredentials,
    #[error("gateway rejected request: {0}")]
    Gateway(String),
    #[error("gateway unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialize: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Request envelope handed to the client for the zkTLS flow. Serialised
/// compact; the field order is part of the signed bytes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttRequest<'a> {
    app_id: &'a str,
    template_id: &'a str,
    user_address: &'a str,
    timestamp: u64,
    att_mode: AttMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttMode {
    algorithm_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedRequest<'a> {
    #[serde(flatten)]
    request: &'a AttRequest<'a>,
    app_signature: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
}

/// Facade over the Primus attestor SDK. Holds the app secret for the
/// process lifetime; the secret signs request envelopes locally and is
/// never sent to clients or written to logs.
pub struct PrimusBroker {
    app_id: Option<String>,
    app_secret: Option<String>,
    base_url: String,
    http: reqwest::Client,
    init: OnceCell<()>,
}

impl PrimusBroker {
    pub fn new(app_id: Option<String>, app_secret: Option<String>, base_url: String) -> Self {
        PrimusBroker {
            app_id,
            app_secret,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder()
                .timeout(GATEWAY_TIMEOUT)
                .build()
                .expect("build reqwest client"),
            init: OnceCell::new(),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), BrokerError> {
        match (self.app_id.as_deref(), self.app_secret.as_deref()) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(BrokerError::MissingCredentials),
        }
    }

    /// One-time SDK initialisation: authenticate the app credentials with
    /// the gateway. A success is cached for the process lifetime; a
    /// failure is retried on the next call.
    pub async fn init_once(&self) -> Result<(), BrokerError> {
        let (app_id, app_secret) = self.credentials()?;
        self.init
            .get_or_try_init(|| async {
                let resp = self
                    .http
                    .post(format!("{}/api/v1/app/init", self.base_url))
                    .json(&serde_json::json!({
                        "appId": app_id,
                        "signature": sign_hex(app_secret, app_id.as_bytes()),
                    }))
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(BrokerError::Gateway(format!(
                        "init returned {}",
                        resp.status()
                    )));
                }
                tracing::info!("primus broker initialised");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Build and sign an attestation request envelope for the given
    /// template and user. The signature covers the compact JSON encoding
    /// of the envelope.
    pub async fn sign_request(
        &self,
        template_id: &str,
        user_address: &str,
    ) -> Result<String, BrokerError> {
        let (app_id, app_secret) = self.credentials()?;
        self.init_once().await?;

        let request = AttRequest {
            app_id,
            template_id,
            user_address,
            timestamp: unix_now(),
            att_mode: AttMode {
                algorithm_type: ALGORITHM_PROXY_TLS,
            },
        };
        let request_json = serde_json::to_string(&request)?;
        let signed = SignedRequest {
            request: &request,
            app_signature: sign_hex(app_secret, request_json.as_bytes()),
        };
        Ok(serde_json::to_string(&signed)?)
    }

    /// Submit a client-returned attestation artifact to the gateway's
    /// verifier. The artifact's internal structure is the SDK's business;
    /// only the boolean verdict matters here.
    pub async fn verify_artifact(
        &self,
        artifact: &serde_json::Value,
    ) -> Result<bool, BrokerError> {
        self.init_once().await?;

        let resp = self
            .http
            .post(format!("{}/api/v1/attestation/verify", self.base_url))
            .json(&serde_json::json!({ "attestation": artifact }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BrokerError::Gateway(format!(
                "verify returned {}",
                resp.status()
            )));
        }
        let verdict: VerifyResponse = resp.json().await?;
        Ok(verdict.valid)
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn sign_hex(secret: &str, msg: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(msg);
    hex::encode(mac.finalize().into_bytes())
}
