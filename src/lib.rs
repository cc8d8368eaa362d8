// === Error Taxonomy ===
pub mod error;

// === Gateway Orchestration ===
pub mod gateway;

// === Re-exports ===
pub use error::GatewayError;
pub use gateway::{Gateway, GenerateOutput, GenerateRequest};
