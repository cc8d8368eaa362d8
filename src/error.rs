/// Caller-visible error taxonomy for the full gateway.
///
/// Consensus rejection is the only "expected" failure: it carries the whole
/// outcome so callers can show the tally. Everything else wraps the
/// subsystem errors unchanged.

use thiserror::Error;
use veritrace_chain::ChainError;
use veritrace_consensus::GateError;
use veritrace_core::config::ConfigError;
use veritrace_core::types::ConsensusOutcome;
use veritrace_crypto::FingerprintError;
use veritrace_llm::LlmError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{}", .0.message())]
    ConsensusRejected(Box<ConsensusOutcome>),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Generation(#[from] LlmError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("generation requested but OPENROUTER_API_KEY is not configured")]
    LlmNotConfigured,
    #[error("blockchain operation requested but chain settings are not configured")]
    ChainNotConfigured,
    #[error("invalid transaction hash: {0}")]
    InvalidTxHash(String),
}
