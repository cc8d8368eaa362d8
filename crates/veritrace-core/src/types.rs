/// Core data model for the verifiable generation pipeline.
///
/// Every record produced here is created once per request, flows through the
/// pipeline, and is never mutated afterwards. The only cross-request shared
/// state in the system is the signer, the RPC client, and configuration.

use chrono::NaiveDateTime;
use ethers_core::types::{H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

// ==================== SAFETY CONSENSUS ====================

/// Classification emitted by a single safety rater.
///
/// A rater that errors, times out, or returns an unparseable reply
/// contributes `Error`, which counts toward the non-safe side of the
/// tally (default-deny).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteVerdict {
    Safe,
    Unsafe,
    Error,
}

/// One rater's vote. Produced by exactly one invocation of one rater,
/// immutable after production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVote {
    pub rater_id: String,
    pub verdict: VoteVerdict,
    /// Measured monotonically from call start to reply (or cutoff).
    pub latency: Duration,
    /// The raw rater reply, or the error text for `Error` votes.
    pub raw: String,
}

/// Aggregate result of one consensus evaluation.
///
/// INVARIANTS:
/// 1. safe_votes + unsafe_votes + error_votes == total
/// 2. passed ⇔ safe_votes ≥ threshold (under the default-deny policy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub passed: bool,
    pub safe_votes: usize,
    pub unsafe_votes: usize,
    pub error_votes: usize,
    pub total: usize,
    pub threshold: usize,
    pub votes: Vec<SafetyVote>,
}

impl ConsensusOutcome {
    /// The `"k/N"` string committed on-chain alongside the record.
    pub fn votes_string(&self) -> String {
        format!("{}/{}", self.safe_votes, self.total)
    }

    /// Human-readable outcome line for callers and logs.
    pub fn message(&self) -> String {
        if self.passed {
            format!(
                "Consensus validation passed. {} out of {} models agreed that the prompt is safe.",
                self.safe_votes, self.total
            )
        } else {
            format!(
                "The prompt has been rejected by consensus validation. {} out of {} models identified this as an inappropriate prompt.",
                self.unsafe_votes, self.total
            )
        }
    }
}

/// One safety rater endpoint: `rater_id` labels the vote, `provider` is the
/// generator-registry key the call is routed through, `model` is the model
/// requested from that provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaterDescriptor {
    pub rater_id: String,
    pub provider: String,
    pub model: String,
}

impl RaterDescriptor {
    pub fn new(
        rater_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            rater_id: rater_id.into(),
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// The canonical five-rater set used when no override is configured.
    pub fn canonical_set() -> Vec<RaterDescriptor> {
        vec![
            RaterDescriptor::new("openai", "openai", "gpt-5-mini"),
            RaterDescriptor::new("grok", "grok", "llama-3.3-70b-instruct:free"),
            RaterDescriptor::new("claude", "claude", "claude-3.7-sonnet"),
            RaterDescriptor::new("gemini", "gemini", "gemini-2.5-flash-lite"),
            RaterDescriptor::new("deepseek", "deepseek", "deepseek-chat-v3.1:free"),
        ]
    }
}

// ==================== GENERATION RECORD ====================

/// Render a record timestamp as ISO-8601 with fixed microsecond precision
/// and no timezone suffix (times are UTC by convention).
///
/// This is the single producer of the timestamp string: the fingerprint
/// canonicalization and the on-chain field must both go through it, or
/// verification breaks.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// The content binding unit: one generation, one record, one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub llm_provider: String,
    pub model_name: String,
    pub prompt: String,
    pub response: String,
    /// Free-form generation parameters (temperature, max_tokens, ...).
    /// Already JSON, so canonical serialization can never fail on them.
    pub parameters: Map<String, Value>,
    /// UTC creation instant, microsecond precision.
    pub timestamp: NaiveDateTime,
    /// `"k/N"` consensus tally, or empty when consensus was skipped.
    pub consensus_votes: String,
}

impl GenerationRecord {
    pub fn timestamp_string(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

// ==================== COMMIT TELEMETRY ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitStatus {
    /// Submitted, confirmation not awaited.
    Pending,
    ConfirmedSuccess,
    ConfirmedFail,
    /// A chain failure folded into the result; see `error_message`.
    Error,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CommitTiming {
    /// Raw-transaction broadcast duration.
    pub submit_ms: u64,
    /// Receipt wait duration; absent on the pending path.
    pub confirm_ms: Option<u64>,
    pub total_ms: u64,
}

/// Result of one on-chain commit.
///
/// On the pending path `gas_cost_wei` is an estimate (gas limit × price);
/// after confirmation it is the actual cost (gas used × price). Chain
/// failures during the commit are folded in as `status == Error` with the
/// classified message in `error_message`; `tx_hash` is absent when the
/// failure happened before the broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub tx_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub gas_price_wei: Option<U256>,
    pub gas_cost_wei: Option<U256>,
    pub status: CommitStatus,
    pub error_message: Option<String>,
    pub timing: CommitTiming,
}

impl CommitResult {
    /// Failure before anything reached the chain: no hash, no cost, just
    /// the classified error and the time burned.
    pub fn failed(error_message: impl Into<String>, total_ms: u64) -> Self {
        Self {
            tx_hash: None,
            block_number: None,
            gas_used: None,
            gas_price_wei: None,
            gas_cost_wei: None,
            status: CommitStatus::Error,
            error_message: Some(error_message.into()),
            timing: CommitTiming {
                submit_ms: 0,
                confirm_ms: None,
                total_ms,
            },
        }
    }
}

// ==================== VERIFICATION ====================

/// The eight raw strings ABI-decoded from a commit transaction's call data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRecord {
    pub fingerprint: String,
    pub prompt: String,
    pub response: String,
    pub llm_provider: String,
    pub model_name: String,
    pub timestamp: String,
    pub parameters_json: String,
    pub consensus_votes: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VerificationTiming {
    pub tx_lookup_ms: u64,
    pub receipt_lookup_ms: u64,
    pub recompute_ms: u64,
    pub total_ms: u64,
}

/// Outcome of verifying a transaction hash against the gateway's secret
/// and issuer address.
///
/// INVARIANT:
/// overall_verified ⇔ tx_exists ∧ tx_success ∧ issuer_matches ∧ fingerprint_matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub tx_exists: bool,
    /// The transaction is known but has no receipt yet.
    pub tx_pending: bool,
    pub tx_success: bool,
    pub issuer_matches: bool,
    pub fingerprint_matches: bool,
    pub overall_verified: bool,
    pub decoded_record: Option<DecodedRecord>,
    /// Fingerprint recomputed under the gateway secret, lowercase hex.
    pub recomputed: Option<String>,
    /// Fingerprint carried in the call data, as committed.
    pub on_chain: Option<String>,
    pub timing: VerificationTiming,
}

impl VerificationResult {
    /// A result with every check failed; the pipeline upgrades fields as
    /// each verification step passes.
    pub fn unverified(timing: VerificationTiming) -> Self {
        Self {
            tx_exists: false,
            tx_pending: false,
            tx_success: false,
            issuer_matches: false,
            fingerprint_matches: false,
            overall_verified: false,
            decoded_record: None,
            recomputed: None,
            on_chain: None,
            timing,
        }
    }

    /// Recompute the conjunction; call after setting the component checks.
    pub fn finalize(mut self) -> Self {
        self.overall_verified = self.tx_exists
            && self.tx_success
            && self.issuer_matches
            && self.fingerprint_matches;
        self
    }
}

// ==================== NETWORK STATUS ====================

/// Snapshot of the chain the commit pipeline targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub latest_block: u64,
    pub gas_price_wei: U256,
    pub account_balance_wei: U256,
}

// ==================== TESTS ====================
