//! Jito block-engine bundle submission.
//!
//! A signed transaction is bincode-serialized, base58-encoded, and wrapped in
//! the block engine's `sendBundle` JSON-RPC envelope. HTTP 200 means the
//! relay accepted the bundle for inclusion, nothing more; landing on chain is
//! observed separately through signature confirmation.

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::json;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

use crate::info_async;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("block engine returned HTTP {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// What the relay told us. `bundle_id` is informational; the transaction
/// signature is the handle for confirmation.
#[derive(Clone, Debug)]
pub struct BundleReceipt {
    pub bundle_id: Option<String>,
}

#[derive(Clone)]
pub struct BundleClient {
    client: Client,
    endpoint: String,
}

impl BundleClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .tcp_nodelay(true)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build reqwest client");
        Self::with_client(client, endpoint)
    }

    /// Share an already-built HTTP client (connection warmers, tests).
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn encode_transaction(tx: &Transaction) -> Result<String, SubmitError> {
        let bytes =
            bincode::serialize(tx).map_err(|err| SubmitError::Serialization(err.to_string()))?;
        Ok(bs58::encode(bytes).into_string())
    }

    /// Submit one signed transaction as a single-entry bundle.
    ///
    /// No retry happens here: the transaction is bound to its blockhash, so a
    /// retry has to restart from a fresh quote, not resubmit the same blob.
    pub async fn send_bundle(&self, tx: &Transaction) -> Result<BundleReceipt, SubmitError> {
        let encoded = Self::encode_transaction(tx)?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [[encoded]]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(SubmitError::Request)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SubmitError::Rejected { status, body: text });
        }

        let bundle_id = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|value| value.get("result")?.as_str().map(str::to_owned));

        info_async!(
            "sendBundle accepted (status {}) bundle_id={}",
            status.as_u16(),
            bundle_id.as_deref().unwrap_or("<none>")
        );
        Ok(BundleReceipt { bundle_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        pubkey::Pubkey,
        signature::{Keypair, Signer},
        system_instruction,
    };

    fn signed_tx() -> Transaction {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        Transaction::new_signed_with_payer(
            &[ix],
            Some(&payer.pubkey()),
            &[&payer],
            Hash::default(),
        )
    }

    #[test]
    fn encoded_transaction_is_base58() {
        let encoded = BundleClient::encode_transaction(&signed_tx()).unwrap();
        assert!(!encoded.is_empty());
        let bytes = bs58::decode(&encoded).into_vec().unwrap();
        let decoded: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.signatures.len(), 1);
    }

    #[tokio::test]
    async fn accepted_bundle_returns_receipt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-type", mockito::Matcher::Regex("application/json".into()))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","result":"a7b1...","id":1}"#)
            .create_async()
            .await;

        let client = BundleClient::new(server.url());
        let receipt = client.send_bundle(&signed_tx()).await.unwrap();
        assert_eq!(receipt.bundle_id.as_deref(), Some("a7b1..."));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(400)
            .with_body(r#"{"error":"bundle too large"}"#)
            .create_async()
            .await;

        let client = BundleClient::new(server.url());
        let err = client.send_bundle(&signed_tx()).await.unwrap_err();
        match err {
            SubmitError::Rejected { status, body } => {
                assert_eq!(status.as_u16(), 400);
                assert!(body.contains("bundle too large"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_transport_error() {
        // Port 9 (discard) is not listening; connect fails fast.
        let client = BundleClient::new("http://127.0.0.1:9");
        let err = client.send_bundle(&signed_tx()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Request(_)));
    }
}
