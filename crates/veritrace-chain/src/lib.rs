// === Failure Taxonomy ===
pub mod error;

// === Contract Call Encoding ===
pub mod contract;

// === Keyed RPC Client ===
pub mod client;

// === Commit Pipeline ===
pub mod commit;

// === Verification Pipeline ===
pub mod verify;

// === Re-exports ===
pub use client::{apply_gas_policy, ChainClient, SEPOLIA_CHAIN_ID};
pub use commit::CommitPipeline;
pub use contract::{decode_store_call, encode_store_call, store_function, STORE_FUNCTION_NAME};
pub use error::ChainError;
pub use verify::{FingerprintCheck, VerificationPipeline};
