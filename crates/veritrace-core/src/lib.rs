// === Shared Data Model ===
pub mod types;

// === Process Configuration ===
pub mod config;

// === Re-exports for broader ecosystem access ===
pub use config::{ChainSettings, ConfigError, ConsensusSettings, GatewayConfig, VarReport};
pub use types::{
    format_timestamp, CommitResult, CommitStatus, CommitTiming, ConsensusOutcome, DecodedRecord,
    GenerationRecord, NetworkInfo, RaterDescriptor, SafetyVote, VerificationResult,
    VerificationTiming, VoteVerdict,
};
