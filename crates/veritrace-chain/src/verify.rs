/// Verification pipeline: read-only reconstruction of a committed record.
///
/// Lookup → receipt → call-data decode → fingerprint recomputation →
/// issuer check. Ambiguity is reported as not-verified, never as success.

use crate::client::ChainClient;
use crate::contract::decode_store_call;
use crate::error::ChainError;
use ethers::providers::JsonRpcClient;
use ethers::types::H256;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use veritrace_core::types::{DecodedRecord, VerificationResult, VerificationTiming};
use veritrace_crypto::Fingerprinter;

fn millis(elapsed: Duration) -> u64 {
    elapsed.as_millis() as u64
}

/// Steps 5–6 in isolation: recomputed tag vs the committed one.
#[derive(Debug, Clone)]
pub struct FingerprintCheck {
    pub recomputed: String,
    pub on_chain: String,
    pub matches: bool,
}

pub struct VerificationPipeline<P: JsonRpcClient> {
    client: Arc<ChainClient<P>>,
    fingerprinter: Fingerprinter,
}

impl<P: JsonRpcClient> VerificationPipeline<P> {
    pub fn new(client: Arc<ChainClient<P>>, fingerprinter: Fingerprinter) -> Self {
        Self {
            client,
            fingerprinter,
        }
    }

    /// Full verification of a transaction hash.
    ///
    /// Errors only on RPC failure; everything the chain can tell us about
    /// the transaction, including its absence, is a result rather than an
    /// error.
    pub async fn verify(&self, tx_hash: H256) -> Result<VerificationResult, ChainError> {
        let total_start = Instant::now();
        let mut timing = VerificationTiming::default();

        let lookup_start = Instant::now();
        let tx = self.client.get_transaction(tx_hash).await?;
        timing.tx_lookup_ms = millis(lookup_start.elapsed());

        let Some(tx) = tx else {
            debug!("verification: {tx_hash:?} not found");
            timing.total_ms = millis(total_start.elapsed());
            return Ok(VerificationResult::unverified(timing));
        };

        let receipt_start = Instant::now();
        let receipt = self.client.get_receipt(tx_hash).await?;
        timing.receipt_lookup_ms = millis(receipt_start.elapsed());

        let mut result = VerificationResult::unverified(timing);
        result.tx_exists = true;

        let Some(receipt) = receipt else {
            result.tx_pending = true;
            result.timing.total_ms = millis(total_start.elapsed());
            return Ok(result);
        };
        result.tx_success = receipt.status == Some(1u64.into());

        let recompute_start = Instant::now();
        match decode_store_call(&tx.input) {
            Ok(decoded) => {
                let check = self.check_fingerprint(&decoded)?;
                result.fingerprint_matches = check.matches;
                result.recomputed = Some(check.recomputed);
                result.on_chain = Some(check.on_chain);
                result.decoded_record = Some(decoded);
            }
            Err(err) => {
                // Undecodable call data cannot match anything.
                warn!("verification: call data decode failed for {tx_hash:?}: {err}");
            }
        }
        result.timing.recompute_ms = millis(recompute_start.elapsed());

        result.issuer_matches = tx.from == self.client.issuer();
        result.timing.total_ms = millis(total_start.elapsed());
        Ok(result.finalize())
    }

    /// Recompute the fingerprint from already-decoded fields; the entry
    /// point for callers holding Etherscan-style call data.
    ///
    /// A `parameters` string that fails to parse is treated as an empty
    /// object, mirroring how records without parameters are fingerprinted.
    pub fn check_fingerprint(
        &self,
        decoded: &DecodedRecord,
    ) -> Result<FingerprintCheck, ChainError> {
        let parameters: Map<String, Value> =
            match serde_json::from_str::<Value>(&decoded.parameters_json) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };

        let recomputed = self
            .fingerprinter
            .sign_parts(
                &decoded.llm_provider,
                &decoded.model_name,
                &decoded.prompt,
                &decoded.response,
                &parameters,
                &decoded.timestamp,
                &decoded.consensus_votes,
            )?
            .to_hex();
        let on_chain = decoded.fingerprint.trim().to_lowercase();
        let matches = recomputed == on_chain;

        Ok(FingerprintCheck {
            recomputed,
            on_chain: decoded.fingerprint.clone(),
            matches,
        })
    }
}
