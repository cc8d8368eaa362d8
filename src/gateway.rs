/// Gateway orchestrator: consensus → generation → fingerprint → commit,
/// plus the read-only verification entry point.
///
/// One long-lived `Gateway` owns every cross-request dependency (signer,
/// RPC client, secret, provider registry); requests own their records.

use crate::error::GatewayError;
use chrono::Utc;
use ethers::providers::Http;
use ethers::types::H256;
use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use veritrace_chain::{ChainClient, CommitPipeline, FingerprintCheck, VerificationPipeline};
use veritrace_consensus::ConsensusGate;
use veritrace_core::config::GatewayConfig;
use veritrace_core::types::{
    CommitResult, ConsensusOutcome, DecodedRecord, GenerationRecord, NetworkInfo,
    VerificationResult,
};
use veritrace_crypto::{Fingerprint, Fingerprinter};
use veritrace_llm::{openrouter, ProviderRegistry};

/// One generation request. `commit` defaults on; confirmation waiting
/// defaults off so callers keep a latency ceiling.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub parameters: Map<String, Value>,
    pub commit: bool,
    pub wait_for_confirmation: bool,
}

impl GenerateRequest {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            parameters: Map::new(),
            commit: true,
            wait_for_confirmation: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutput {
    pub content: String,
    /// Lowercase hex HMAC tag over the canonical record.
    pub fingerprint: String,
    pub record: GenerationRecord,
    pub consensus: ConsensusOutcome,
    pub commit: Option<CommitResult>,
}

struct ChainHandles {
    client: Arc<ChainClient<Http>>,
    committer: CommitPipeline<Http>,
    verifier: VerificationPipeline<Http>,
}

pub struct Gateway {
    fingerprinter: Fingerprinter,
    registry: Arc<ProviderRegistry>,
    llm_configured: bool,
    gate: ConsensusGate,
    chain: Option<ChainHandles>,
}

impl Gateway {
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_config(GatewayConfig::from_env()?)
    }

    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        let fingerprinter = Fingerprinter::new(&config.hmac_secret)?;

        let (registry, llm_configured) = match &config.openrouter_api_key {
            Some(api_key) => (openrouter::default_registry(api_key)?, true),
            None => (ProviderRegistry::new(), false),
        };
        let registry = Arc::new(registry);

        let gate = ConsensusGate::new(Arc::clone(&registry), config.consensus.clone())?;

        let chain = match &config.chain {
            Some(settings) => {
                let client = Arc::new(ChainClient::connect(settings)?);
                info!(
                    "chain client ready: chain_id={} issuer={:?} contract={:?}",
                    client.chain_id(),
                    client.issuer(),
                    client.contract_address()
                );
                Some(ChainHandles {
                    committer: CommitPipeline::new(Arc::clone(&client)),
                    verifier: VerificationPipeline::new(
                        Arc::clone(&client),
                        fingerprinter.clone(),
                    ),
                    client,
                })
            }
            None => None,
        };

        Ok(Self {
            fingerprinter,
            registry,
            llm_configured,
            gate,
            chain,
        })
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.registry.provider_ids()
    }

    /// The full generation path: consensus gate, provider call, record
    /// binding, optional on-chain commit.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateOutput, GatewayError> {
        if !self.llm_configured {
            return Err(GatewayError::LlmNotConfigured);
        }

        let consensus = self.gate.evaluate(&request.prompt).await;
        if !consensus.passed {
            warn!("{}", consensus.message());
            return Err(GatewayError::ConsensusRejected(Box::new(consensus)));
        }

        let reply = self
            .registry
            .generate(
                &request.provider,
                &request.model,
                &request.prompt,
                &request.parameters,
            )
            .await?;
        info!(
            "generation complete: provider={} model={} latency={:?}",
            request.provider, request.model, reply.latency
        );

        // The one timestamp: fingerprint and call data both derive from it.
        let timestamp = Utc::now().naive_utc();
        let record = GenerationRecord {
            llm_provider: request.provider,
            model_name: request.model,
            prompt: request.prompt,
            response: reply.content.clone(),
            parameters: request.parameters,
            timestamp,
            consensus_votes: consensus.votes_string(),
        };
        let fingerprint = self.fingerprinter.sign(&record)?;

        let commit = if request.commit {
            Some(
                self.commit_record(&record, &fingerprint, request.wait_for_confirmation)
                    .await?,
            )
        } else {
            None
        };

        Ok(GenerateOutput {
            content: reply.content,
            fingerprint: fingerprint.to_hex(),
            record,
            consensus,
            commit,
        })
    }

    /// Commit an already-fingerprinted record; the retry entry point when
    /// a generate-time commit failed.
    pub async fn commit_record(
        &self,
        record: &GenerationRecord,
        fingerprint: &Fingerprint,
        wait_for_confirmation: bool,
    ) -> Result<CommitResult, GatewayError> {
        let chain = self.chain.as_ref().ok_or(GatewayError::ChainNotConfigured)?;
        Ok(chain
            .committer
            .commit(record, fingerprint, wait_for_confirmation)
            .await?)
    }

    /// Verify a committed transaction hash (with or without 0x prefix).
    pub async fn verify(&self, tx_hash: &str) -> Result<VerificationResult, GatewayError> {
        let chain = self.chain.as_ref().ok_or(GatewayError::ChainNotConfigured)?;
        let hash = parse_tx_hash(tx_hash)?;
        Ok(chain.verifier.verify(hash).await?)
    }

    /// Recompute and compare the fingerprint for call data the caller has
    /// already decoded (Etherscan-style input).
    pub fn verify_decoded(&self, decoded: &DecodedRecord) -> Result<FingerprintCheck, GatewayError> {
        let chain = self.chain.as_ref().ok_or(GatewayError::ChainNotConfigured)?;
        Ok(chain.verifier.check_fingerprint(decoded)?)
    }

    pub async fn network_info(&self) -> Result<NetworkInfo, GatewayError> {
        let chain = self.chain.as_ref().ok_or(GatewayError::ChainNotConfigured)?;
        Ok(chain.client.network_info().await?)
    }
}

fn parse_tx_hash(raw: &str) -> Result<H256, GatewayError> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    format!("0x{hex_part}")
        .parse()
        .map_err(|_| GatewayError::InvalidTxHash(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_hash_parses_with_and_without_prefix() {
        let bare = "aa".repeat(32);
        let prefixed = format!("0x{bare}");
        assert_eq!(parse_tx_hash(&bare).unwrap(), parse_tx_hash(&prefixed).unwrap());
        assert!(parse_tx_hash("0x1234").is_err());
        assert!(parse_tx_hash("not-a-hash").is_err());
    }

    #[test]
    fn request_defaults_commit_without_waiting() {
        let request = GenerateRequest::new("openai", "gpt-5-mini", "Hello");
        assert!(request.commit);
        assert!(!request.wait_for_confirmation);
        assert!(request.parameters.is_empty());
    }
}
