/// Commit pipeline: bind a fingerprinted record into a contract call and
/// anchor it on chain.
///
/// CORE INVARIANT:
/// The `timestamp` and `parameters` strings placed in call data are the
/// exact strings the fingerprint was computed over. Both come from the
/// canonicalization module; producing them any other way breaks
/// verification.

use crate::client::ChainClient;
use crate::contract::encode_store_call;
use crate::error::ChainError;
use ethers::providers::JsonRpcClient;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionRequest};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use veritrace_core::types::{
    CommitResult, CommitStatus, CommitTiming, DecodedRecord, GenerationRecord,
};
use veritrace_crypto::{canonical_parameters_json, Fingerprint};

fn millis(elapsed: Duration) -> u64 {
    elapsed.as_millis() as u64
}

pub struct CommitPipeline<P: JsonRpcClient> {
    client: Arc<ChainClient<P>>,
}

impl<P: JsonRpcClient> CommitPipeline<P> {
    pub fn new(client: Arc<ChainClient<P>>) -> Self {
        Self { client }
    }

    /// Build the call data from the canonical field strings.
    pub fn build_call(
        record: &GenerationRecord,
        fingerprint: &Fingerprint,
    ) -> Result<DecodedRecord, ChainError> {
        Ok(DecodedRecord {
            fingerprint: fingerprint.to_hex(),
            prompt: record.prompt.clone(),
            response: record.response.clone(),
            llm_provider: record.llm_provider.clone(),
            model_name: record.model_name.clone(),
            timestamp: record.timestamp_string(),
            parameters_json: canonical_parameters_json(&record.parameters)?,
            consensus_votes: record.consensus_votes.clone(),
        })
    }

    /// Estimate, price, submit, and optionally wait out confirmation.
    ///
    /// Chain failures (funds, gas, nonce, revert, RPC) do not abort the
    /// pipeline: they come back as a `CommitStatus::Error` result carrying
    /// the classified message and whatever telemetry was gathered before
    /// the failure. `Err` is reserved for record serialization problems.
    pub async fn commit(
        &self,
        record: &GenerationRecord,
        fingerprint: &Fingerprint,
        wait_for_confirmation: bool,
    ) -> Result<CommitResult, ChainError> {
        let total_start = Instant::now();

        let call = Self::build_call(record, fingerprint)?;
        let data = encode_store_call(&call)?;

        let request = TransactionRequest::new()
            .from(self.client.signer_address())
            .to(self.client.contract_address())
            .data(Bytes::from(data))
            .chain_id(self.client.chain_id());
        let mut tx: TypedTransaction = request.into();

        let gas_limit = self.client.estimate_gas_or_fallback(&tx).await;
        let gas_price = match self.client.boosted_gas_price().await {
            Ok(price) => price,
            Err(err) => {
                error!("commit aborted before pricing: {err}");
                return Ok(CommitResult::failed(
                    err.to_string(),
                    millis(total_start.elapsed()),
                ));
            }
        };
        tx.set_gas(gas_limit);
        tx.set_gas_price(gas_price);

        let (tx_hash, nonce, submit_time) = match self.client.submit(tx).await {
            Ok(submitted) => submitted,
            Err(err) => {
                error!("commit broadcast failed: {err}");
                let mut failed =
                    CommitResult::failed(err.to_string(), millis(total_start.elapsed()));
                failed.gas_price_wei = Some(gas_price);
                return Ok(failed);
            }
        };
        info!(
            "record committed: tx={tx_hash:?} nonce={nonce} gas_limit={gas_limit} gas_price={gas_price}"
        );

        if !wait_for_confirmation {
            return Ok(CommitResult {
                tx_hash: Some(tx_hash),
                block_number: None,
                gas_used: None,
                gas_price_wei: Some(gas_price),
                // Upper bound until the receipt lands.
                gas_cost_wei: Some(gas_limit * gas_price),
                status: CommitStatus::Pending,
                error_message: None,
                timing: CommitTiming {
                    submit_ms: millis(submit_time),
                    confirm_ms: None,
                    total_ms: millis(total_start.elapsed()),
                },
            });
        }

        let confirm_start = Instant::now();
        let receipt = match self.client.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(err) => {
                // The transaction is broadcast; only the receipt wait
                // failed. Keep the hash so the caller can poll.
                error!("receipt wait failed for {tx_hash:?}: {err}");
                return Ok(CommitResult {
                    tx_hash: Some(tx_hash),
                    block_number: None,
                    gas_used: None,
                    gas_price_wei: Some(gas_price),
                    gas_cost_wei: Some(gas_limit * gas_price),
                    status: CommitStatus::Error,
                    error_message: Some(err.to_string()),
                    timing: CommitTiming {
                        submit_ms: millis(submit_time),
                        confirm_ms: Some(millis(confirm_start.elapsed())),
                        total_ms: millis(total_start.elapsed()),
                    },
                });
            }
        };
        let confirm_time = confirm_start.elapsed();

        match receipt {
            Some(receipt) => {
                let gas_used = receipt.gas_used;
                let status = if receipt.status == Some(1u64.into()) {
                    CommitStatus::ConfirmedSuccess
                } else {
                    CommitStatus::ConfirmedFail
                };
                Ok(CommitResult {
                    tx_hash: Some(tx_hash),
                    block_number: receipt.block_number.map(|b| b.as_u64()),
                    gas_used,
                    gas_price_wei: Some(gas_price),
                    gas_cost_wei: gas_used.map(|used| used * gas_price),
                    status,
                    error_message: None,
                    timing: CommitTiming {
                        submit_ms: millis(submit_time),
                        confirm_ms: Some(millis(confirm_time)),
                        total_ms: millis(total_start.elapsed()),
                    },
                })
            }
            None => {
                // Broadcast succeeded but the receipt never materialized;
                // leave the transaction pending for the caller to poll.
                warn!("no receipt for {tx_hash:?} after confirmation wait");
                Ok(CommitResult {
                    tx_hash: Some(tx_hash),
                    block_number: None,
                    gas_used: None,
                    gas_price_wei: Some(gas_price),
                    gas_cost_wei: Some(gas_limit * gas_price),
                    status: CommitStatus::Pending,
                    error_message: None,
                    timing: CommitTiming {
                        submit_ms: millis(submit_time),
                        confirm_ms: Some(millis(confirm_time)),
                        total_ms: millis(total_start.elapsed()),
                    },
                })
            }
        }
    }
}
