//! Pact endpoint client.
//!
//! The bridge state machine never performs I/O; the runner executes
//! `SubmitBatch` and `PollSettlement` actions through this port. The
//! HTTP implementation speaks the Chainweb Pact REST API; without
//! configured credentials it runs in simulation mode, fabricating
//! request keys locally so the rest of the pipeline exercises the same
//! paths.

use crate::{ChainwebConfig, CredentialError};
use aegen_types::{Batch, Hash, SettlementOutcome, SubmissionResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Port to the external settlement chain.
#[async_trait]
pub trait PactClient: Send + Sync {
    /// Submit the batch commitment. Never errors: every failure mode maps
    /// onto a `SubmissionResult` variant the bridge knows how to handle.
    async fn submit(&self, batch: &Batch) -> SubmissionResult;

    /// Poll a previously returned request key.
    async fn poll(&self, request_key: &str) -> SettlementOutcome;
}

/// Pact code invoking the settlement contract for a batch.
pub fn settlement_code(batch: &Batch) -> String {
    format!(
        "(free.aegen.submit-batch \"{}\" \"{}\" {} {} {})",
        batch.id,
        batch.state_root.to_hex(),
        batch.block_count(),
        batch.start_height.0,
        batch.end_height.0,
    )
}

/// Build the signed command envelope for `/send`.
///
/// The envelope wraps a stringified command, its hash and the signature
/// list, matching what the Pact REST API expects. With credentials
/// configured the command hash is ed25519-signed by the sender key;
/// without them the signature list stays empty (simulation mode never
/// sends the envelope anywhere).
pub fn build_send_body(
    config: &ChainwebConfig,
    batch: &Batch,
    creation_time: u64,
) -> Result<Value, CredentialError> {
    let key = config.signing_key()?;
    let signers = if key.is_some() {
        json!([{ "pubKey": config.sender_public_key }])
    } else {
        json!([])
    };
    let cmd = json!({
        "networkId": config.network_id,
        "payload": {
            "exec": {
                "data": {},
                "code": settlement_code(batch),
            }
        },
        "signers": signers,
        "meta": {
            "creationTime": creation_time,
            "ttl": config.ttl_secs,
            "gasLimit": config.gas_limit,
            "gasPrice": config.gas_price,
            "chainId": config.chain_id,
            "sender": config.sender_account,
        },
        "nonce": format!("{}:{}", batch.id, creation_time),
    })
    .to_string();

    let hash = Hash::of(cmd.as_bytes());
    let sigs = match key {
        Some(key) => json!([{ "sig": key.sign(hash.as_bytes()).to_hex() }]),
        None => json!([]),
    };
    Ok(json!({
        "cmds": [{
            "hash": hash.to_hex(),
            "sigs": sigs,
            "cmd": cmd,
        }]
    }))
}

/// Interpret a `/send` response body.
pub fn parse_send_response(status: u16, body: &str) -> SubmissionResult {
    if status == 200 {
        let parsed: Result<Value, _> = serde_json::from_str(body);
        if let Ok(value) = parsed {
            if let Some(key) = value
                .get("requestKeys")
                .and_then(|keys| keys.get(0))
                .and_then(Value::as_str)
            {
                return SubmissionResult::Accepted {
                    request_key: key.to_string(),
                };
            }
        }
        return SubmissionResult::Rejected {
            reason: format!("send response missing request key: {body}"),
        };
    }

    // The contract enforces batch-id uniqueness; a duplicate submission
    // surfaces as a validation error naming the conflict.
    let lowered = body.to_ascii_lowercase();
    if lowered.contains("duplicate") || lowered.contains("already") {
        return SubmissionResult::AlreadySettled;
    }
    if (400..500).contains(&status) {
        SubmissionResult::Rejected {
            reason: format!("send rejected with status {status}: {body}"),
        }
    } else {
        SubmissionResult::Transient {
            reason: format!("send failed with status {status}"),
        }
    }
}

/// Interpret a `/poll` response body for one request key.
///
/// An empty map means the command is not yet in a block. A result entry
/// without an `error` field counts as success; `"duplicate"` or
/// `"already"` in the error message means a prior submission settled the
/// batch, which is success for our purposes.
pub fn parse_poll_response(body: &str, request_key: &str) -> SettlementOutcome {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return SettlementOutcome::Pending,
    };
    let Some(entry) = parsed.get(request_key) else {
        return SettlementOutcome::Pending;
    };
    let error = entry.get("result").and_then(|r| r.get("error"));
    match error {
        None => SettlementOutcome::Confirmed,
        Some(error) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let lowered = message.to_ascii_lowercase();
            if lowered.contains("duplicate") || lowered.contains("already") {
                SettlementOutcome::Confirmed
            } else {
                SettlementOutcome::Failed {
                    reason: message.to_string(),
                }
            }
        }
    }
}

/// HTTP client against a Chainweb node's Pact API.
pub struct HttpPactClient {
    config: ChainwebConfig,
    http: reqwest::Client,
}

impl HttpPactClient {
    pub fn new(config: ChainwebConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Deterministic request key for simulation mode.
    fn simulated_request_key(batch: &Batch) -> String {
        let digest = Hash::of(settlement_code(batch).as_bytes());
        format!("SIM-{}", &digest.to_hex()[..16])
    }
}

#[async_trait]
impl PactClient for HttpPactClient {
    async fn submit(&self, batch: &Batch) -> SubmissionResult {
        if !self.config.has_credentials() {
            let request_key = Self::simulated_request_key(batch);
            info!(batch_id = %batch.id, %request_key, "no settlement credentials, simulating submit");
            return SubmissionResult::Accepted { request_key };
        }

        let body = match build_send_body(&self.config, batch, Self::now_secs()) {
            Ok(body) => body,
            Err(error) => {
                // A key that does not decode will never decode; retrying
                // is pointless.
                warn!(batch_id = %batch.id, %error, "cannot sign settlement command");
                return SubmissionResult::Rejected {
                    reason: format!("invalid settlement credentials: {error}"),
                };
            }
        };
        debug!(batch_id = %batch.id, url = %self.config.send_url(), "submitting batch");
        match self.http.post(self.config.send_url()).json(&body).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                parse_send_response(status, &text)
            }
            Err(error) => {
                warn!(batch_id = %batch.id, %error, "send request failed");
                SubmissionResult::Transient {
                    reason: error.to_string(),
                }
            }
        }
    }

    async fn poll(&self, request_key: &str) -> SettlementOutcome {
        if request_key.starts_with("SIM-") {
            return SettlementOutcome::Confirmed;
        }

        let body = json!({ "requestKeys": [request_key] });
        match self.http.post(self.config.poll_url()).json(&body).send().await {
            Ok(response) => {
                let text = response.text().await.unwrap_or_default();
                parse_poll_response(&text, request_key)
            }
            Err(error) => {
                // Network trouble is indistinguishable from "not mined
                // yet" for the bridge; the poll budget bounds both.
                warn!(%request_key, %error, "poll request failed");
                SettlementOutcome::Pending
            }
        }
    }
}
